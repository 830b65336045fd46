// disasm.rs - VPX-2000 disassembler
//
// Decodes program images into structured instructions for listings and
// inspection. Decoding never executes anything and never faults; bytes
// that do not form a valid instruction come back as one-byte data.

use crate::endian;
use crate::opcode::{Condition, OperandKind, Opcode};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("0x{addr:08x}: address outside image")]
    OutOfBounds { addr: u32 },
    #[error("0x{addr:08x}: unknown opcode byte 0x{byte:02x}")]
    UnknownOpcode { addr: u32, byte: u8 },
    #[error("0x{addr:08x}: cjmp with invalid condition {code}")]
    InvalidCondition { addr: u32, code: u8 },
    #[error("0x{addr:08x}: {mnemonic} needs {needed} bytes, {available} left")]
    Truncated {
        addr: u32,
        mnemonic: &'static str,
        needed: usize,
        available: usize,
    },
}

/// A decoded operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(u8),
    Imm(u32),
    Cond(Condition),
}

/// A decoded VPX-2000 instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Address of the opcode byte
    pub addr: u32,
    /// Raw instruction bytes
    pub bytes: Vec<u8>,
    /// Decoded opcode; `None` for a data byte
    pub opcode: Option<Opcode>,
    /// Operands in encoding order. For `cjmp` the condition comes first.
    pub operands: Vec<Operand>,
}

impl Instruction {
    fn data(addr: u32, byte: u8) -> Self {
        Self {
            addr,
            bytes: vec![byte],
            opcode: None,
            operands: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Address of the following instruction
    pub fn next_addr(&self) -> u32 {
        self.addr.wrapping_add(self.len() as u32)
    }

    /// Static target of a PC-relative jump, branch or call. Under `cjmp`
    /// the offset counts from the condition byte.
    pub fn branch_target(&self) -> Option<u32> {
        let op = self.opcode?;
        if !op.is_pc_relative() {
            return None;
        }
        let base = match op {
            Opcode::Cjmp => self.addr.wrapping_add(1),
            _ => self.addr,
        };
        match self.operands.last() {
            Some(Operand::Imm(imm)) => Some(base.wrapping_add(*imm)),
            _ => None,
        }
    }

    /// Does straight-line execution stop after this instruction?
    pub fn ends_block(&self) -> bool {
        self.opcode.is_some_and(Opcode::is_terminator)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}:  ", self.addr)?;
        let Some(op) = self.opcode else {
            return write!(f, ".byte 0x{:02x}", self.bytes[0]);
        };
        f.write_str(op.mnemonic())?;
        for (i, operand) in self.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            match operand {
                Operand::Reg(r) => write!(f, "r{r}")?,
                Operand::Imm(imm) => write!(f, "0x{imm:x}")?,
                Operand::Cond(cond) => f.write_str(cond.name())?,
            }
        }
        if let Some(target) = self.branch_target() {
            write!(f, "  ; -> 0x{target:08x}")?;
        }
        Ok(())
    }
}

/// Decode the instruction at `addr`.
pub fn decode(image: &[u8], addr: u32) -> Result<Instruction, DecodeError> {
    let start = addr as usize;
    let byte = *image.get(start).ok_or(DecodeError::OutOfBounds { addr })?;
    let op = Opcode::try_from(byte).map_err(|byte| DecodeError::UnknownOpcode { addr, byte })?;

    let mut operands = Vec::new();
    let mut cursor = start + 1;
    let mut kinds = op.operands();
    let mut needed = op.encoded_len() as usize;

    if op == Opcode::Cjmp {
        let code = *image.get(cursor).ok_or(DecodeError::Truncated {
            addr,
            mnemonic: op.mnemonic(),
            needed,
            available: image.len() - start,
        })?;
        let cond = Condition::from_code(code).ok_or(DecodeError::InvalidCondition { addr, code })?;
        operands.push(Operand::Cond(cond));
        cursor += 1;
        kinds = cond.operands();
        needed = cond.encoded_len() as usize;
    }

    let available = image.len() - start;
    if available < needed {
        return Err(DecodeError::Truncated {
            addr,
            mnemonic: op.mnemonic(),
            needed,
            available,
        });
    }

    for kind in kinds {
        let size = kind.size() as usize;
        let raw = &image[cursor..cursor + size];
        operands.push(match kind {
            OperandKind::Reg => Operand::Reg(raw[0]),
            OperandKind::Imm8 | OperandKind::Cond => Operand::Imm(raw[0] as u32),
            OperandKind::Imm16 => Operand::Imm(endian::decode16([raw[0], raw[1]]) as u32),
            OperandKind::Imm32 => Operand::Imm(endian::decode32([raw[0], raw[1], raw[2], raw[3]])),
        });
        cursor += size;
    }

    Ok(Instruction {
        addr,
        bytes: image[start..start + needed].to_vec(),
        opcode: Some(op),
        operands,
    })
}

/// Linear sweep from `from` to the end of the image.
pub fn disassemble(image: &[u8], from: u32) -> Vec<Instruction> {
    let mut instructions = Vec::new();
    let mut addr = from;

    while (addr as usize) < image.len() {
        let inst = match decode(image, addr) {
            Ok(inst) => inst,
            Err(_) => Instruction::data(addr, image[addr as usize]),
        };
        addr = inst.next_addr();
        instructions.push(inst);
    }

    instructions
}
