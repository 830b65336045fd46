// fault.rs - fault categories and the fault record
//
// Numeric codes are part of the binary contract with hosts and must not be
// renumbered.

use std::fmt;
use thiserror::Error;

/// Fault category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FaultKind {
    RegisterRead = 1,
    RegisterWrite = 2,
    MemRead8 = 3,
    MemRead16 = 4,
    MemRead32 = 5,
    MemWrite8 = 6,
    MemWrite16 = 7,
    MemWrite32 = 8,
    DivByZero = 9,
    DivByZeroSigned = 10,
    DivOverflow = 11,
    InvalidCondition = 12,
    /// 64-bit register pair read (`isa-64` builds)
    RegisterRead64 = 13,
    /// 64-bit register pair write (`isa-64` builds)
    RegisterWrite64 = 14,
    InvalidOpcode = 255,
}

impl FaultKind {
    /// Stable numeric code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Map a numeric code back to its category
    pub fn from_code(code: u8) -> Option<Self> {
        let kind = match code {
            1 => FaultKind::RegisterRead,
            2 => FaultKind::RegisterWrite,
            3 => FaultKind::MemRead8,
            4 => FaultKind::MemRead16,
            5 => FaultKind::MemRead32,
            6 => FaultKind::MemWrite8,
            7 => FaultKind::MemWrite16,
            8 => FaultKind::MemWrite32,
            9 => FaultKind::DivByZero,
            10 => FaultKind::DivByZeroSigned,
            11 => FaultKind::DivOverflow,
            12 => FaultKind::InvalidCondition,
            13 => FaultKind::RegisterRead64,
            14 => FaultKind::RegisterWrite64,
            255 => FaultKind::InvalidOpcode,
            _ => return None,
        };
        Some(kind)
    }

    /// Memory read category for an access of `width` bytes
    pub(crate) fn mem_read(width: usize) -> Self {
        match width {
            1 => FaultKind::MemRead8,
            2 => FaultKind::MemRead16,
            _ => FaultKind::MemRead32,
        }
    }

    /// Memory write category for an access of `width` bytes
    pub(crate) fn mem_write(width: usize) -> Self {
        match width {
            1 => FaultKind::MemWrite8,
            2 => FaultKind::MemWrite16,
            _ => FaultKind::MemWrite32,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FaultKind::RegisterRead => "register read out of range",
            FaultKind::RegisterWrite => "register write out of range",
            FaultKind::MemRead8 => "8-bit memory read out of range",
            FaultKind::MemRead16 => "16-bit memory read out of range",
            FaultKind::MemRead32 => "32-bit memory read out of range",
            FaultKind::MemWrite8 => "8-bit memory write out of range",
            FaultKind::MemWrite16 => "16-bit memory write out of range",
            FaultKind::MemWrite32 => "32-bit memory write out of range",
            FaultKind::DivByZero => "unsigned division by zero",
            FaultKind::DivByZeroSigned => "signed division by zero",
            FaultKind::DivOverflow => "signed division overflow",
            FaultKind::InvalidCondition => "invalid branch condition",
            FaultKind::RegisterRead64 => "register pair read out of range",
            FaultKind::RegisterWrite64 => "register pair write out of range",
            FaultKind::InvalidOpcode => "invalid opcode",
        };
        f.write_str(text)
    }
}

/// A recorded fault: category, offending value, program counter snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} (code {code}): value {value}, pc 0x{pc:08x}", code = .kind.code())]
pub struct Fault {
    pub kind: FaultKind,
    /// Address, register index, opcode or condition byte, depending on `kind`
    pub value: u32,
    /// Program counter at the moment the fault was recorded
    pub pc: u32,
}
