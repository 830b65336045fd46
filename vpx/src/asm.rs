// asm.rs - VPX-2000 instruction encoder
//
// Builds program images one instruction at a time from an opcode and its
// operand values. Operands are checked against the opcode's operand table
// for count and range; multi-byte immediates are written in wire order.

use crate::endian;
use crate::opcode::{Condition, OperandKind, Opcode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("{mnemonic}: expected {expected} operands, got {got}")]
    OperandCount {
        mnemonic: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{mnemonic}: operand {index} value {value:#x} exceeds {max:#x}")]
    OperandRange {
        mnemonic: &'static str,
        index: usize,
        value: u32,
        max: u32,
    },
}

/// Offset from `from` to `to`, as a wrapping 32-bit immediate.
pub fn rel(from: u32, to: u32) -> u32 {
    to.wrapping_sub(from)
}

/// Accumulates encoded instructions starting at offset 0
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    code: Vec<u8>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset the next instruction will be placed at
    pub fn offset(&self) -> u32 {
        self.code.len() as u32
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    /// Append one instruction.
    pub fn emit(&mut self, op: Opcode, operands: &[u32]) -> Result<&mut Self, EncodeError> {
        let kinds = op.operands();
        check(op.mnemonic(), kinds, operands)?;
        self.code.push(op.code());
        self.put_operands(kinds, operands);
        Ok(self)
    }

    /// Append a `cjmp` carrying `cond`; `operands` are those of the
    /// matching direct branch (`r1, imm` for zero, `r1, r2, imm` otherwise).
    pub fn cjmp(&mut self, cond: Condition, operands: &[u32]) -> Result<&mut Self, EncodeError> {
        let kinds = cond.operands();
        check(Opcode::Cjmp.mnemonic(), kinds, operands)?;
        self.code.push(Opcode::Cjmp.code());
        self.code.push(cond.code());
        self.put_operands(kinds, operands);
        Ok(self)
    }

    /// Append raw bytes.
    pub fn data(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    /// Append a 32-bit word in wire order.
    pub fn word(&mut self, value: u32) -> &mut Self {
        self.data(&endian::encode32(value))
    }

    /// Zero-fill up to `offset`. Does nothing if already past it.
    pub fn pad_to(&mut self, offset: u32) -> &mut Self {
        let offset = offset as usize;
        if self.code.len() < offset {
            self.code.resize(offset, 0);
        }
        self
    }

    /// Overwrite the word at `at` (for forward branch targets).
    /// Writes past the end extend the buffer.
    pub fn patch32(&mut self, at: u32, value: u32) {
        let at = at as usize;
        if self.code.len() < at + 4 {
            self.code.resize(at + 4, 0);
        }
        self.code[at..at + 4].copy_from_slice(&endian::encode32(value));
    }

    /// Encoded program padded with zeros to at least `size` bytes
    pub fn image(&self, size: usize) -> Vec<u8> {
        let mut image = self.code.clone();
        if image.len() < size {
            image.resize(size, 0);
        }
        image
    }

    pub fn finish(self) -> Vec<u8> {
        self.code
    }

    fn put_operands(&mut self, kinds: &[OperandKind], operands: &[u32]) {
        for (kind, &value) in kinds.iter().zip(operands) {
            match kind {
                OperandKind::Reg | OperandKind::Imm8 | OperandKind::Cond => {
                    self.code.push(value as u8)
                }
                OperandKind::Imm16 => {
                    self.code.extend_from_slice(&endian::encode16(value as u16))
                }
                OperandKind::Imm32 => self.code.extend_from_slice(&endian::encode32(value)),
            }
        }
    }
}

fn check(
    mnemonic: &'static str,
    kinds: &[OperandKind],
    operands: &[u32],
) -> Result<(), EncodeError> {
    if kinds.len() != operands.len() {
        return Err(EncodeError::OperandCount {
            mnemonic,
            expected: kinds.len(),
            got: operands.len(),
        });
    }
    for (index, (kind, &value)) in kinds.iter().zip(operands).enumerate() {
        let max = kind.max_value();
        if value > max {
            return Err(EncodeError::OperandRange {
                mnemonic,
                index,
                value,
                max,
            });
        }
    }
    Ok(())
}
