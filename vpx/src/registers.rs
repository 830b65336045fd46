// registers.rs - 64-slot register file
//
// r62 is the program counter and r63 the stack pointer. Every other slot is
// general purpose as far as the core is concerned (hosts reserve r60/r61 by
// convention, see `host`).

use crate::fault::FaultKind;
use crate::posture::Posture;

/// Number of architectural registers
pub const REGISTER_COUNT: usize = 64;
/// Program counter register index
pub const PC: u8 = 62;
/// Stack pointer register index
pub const SP: u8 = 63;

/// The register file. All slots start at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    slots: [u32; REGISTER_COUNT],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    pub fn new() -> Self {
        Self {
            slots: [0; REGISTER_COUNT],
        }
    }

    /// Read register `idx`.
    ///
    /// In the checked posture an index >= 64 is rejected with
    /// [`FaultKind::RegisterRead`]; unchecked, it panics.
    #[inline]
    pub fn read<P: Posture>(&self, idx: u8) -> Result<u32, FaultKind> {
        if P::CHECKED && idx as usize >= REGISTER_COUNT {
            return Err(FaultKind::RegisterRead);
        }
        Ok(self.slots[idx as usize])
    }

    /// Write register `idx`. A rejected write leaves every slot untouched.
    #[inline]
    pub fn write<P: Posture>(&mut self, idx: u8, value: u32) -> Result<(), FaultKind> {
        if P::CHECKED && idx as usize >= REGISTER_COUNT {
            return Err(FaultKind::RegisterWrite);
        }
        self.slots[idx as usize] = value;
        Ok(())
    }

    /// Snapshot of all slots
    pub fn as_slice(&self) -> &[u32] {
        &self.slots
    }

    /// Read register pair `idx` (slots `2*idx` low, `2*idx+1` high).
    #[cfg(feature = "isa-64")]
    pub fn read_pair<P: Posture>(&self, idx: u8) -> Result<u64, FaultKind> {
        if P::CHECKED && idx as usize >= REGISTER_COUNT / 2 {
            return Err(FaultKind::RegisterRead64);
        }
        let base = idx as usize * 2;
        Ok(u64::from(self.slots[base]) | (u64::from(self.slots[base + 1]) << 32))
    }

    /// Write register pair `idx`.
    #[cfg(feature = "isa-64")]
    pub fn write_pair<P: Posture>(&mut self, idx: u8, value: u64) -> Result<(), FaultKind> {
        if P::CHECKED && idx as usize >= REGISTER_COUNT / 2 {
            return Err(FaultKind::RegisterWrite64);
        }
        let base = idx as usize * 2;
        self.slots[base] = value as u32;
        self.slots[base + 1] = (value >> 32) as u32;
        Ok(())
    }
}
