// memory.rs - flat byte-addressable memory image
//
// Code and data share this one address space. Addresses are absolute 32-bit
// offsets; multi-byte values go through `endian`.

use crate::endian;
use crate::fault::FaultKind;
use crate::posture::Posture;
use std::ops::Range;
use thiserror::Error;

/// Why an image could not be bound as memory
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InitError {
    #[error("memory image is empty")]
    EmptyImage,
    #[error("memory image of {0} bytes exceeds the 32-bit address space")]
    ImageTooLarge(usize),
}

/// Memory image bound to one CPU instance. Its size never changes while
/// bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Bind an image. Fails if it is empty or not addressable with 32 bits.
    pub fn new(bytes: Vec<u8>) -> Result<Self, InitError> {
        if bytes.is_empty() {
            return Err(InitError::EmptyImage);
        }
        if u32::try_from(bytes.len()).is_err() {
            return Err(InitError::ImageTooLarge(bytes.len()));
        }
        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    /// Byte range of an access of `width` bytes at `addr`, or `None` when
    /// `addr + width` runs past the end (including `len < width`).
    #[inline]
    fn span(&self, addr: u32, width: usize) -> Option<Range<usize>> {
        let start = addr as usize;
        let end = start.checked_add(width)?;
        (end <= self.bytes.len()).then_some(start..end)
    }

    #[inline]
    fn load<P: Posture, const N: usize>(&self, addr: u32) -> Result<[u8; N], FaultKind> {
        let range = if P::CHECKED {
            self.span(addr, N).ok_or(FaultKind::mem_read(N))?
        } else {
            addr as usize..addr as usize + N
        };
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[range]);
        Ok(out)
    }

    #[inline]
    fn store<P: Posture, const N: usize>(
        &mut self,
        addr: u32,
        data: [u8; N],
    ) -> Result<(), FaultKind> {
        let range = if P::CHECKED {
            self.span(addr, N).ok_or(FaultKind::mem_write(N))?
        } else {
            addr as usize..addr as usize + N
        };
        self.bytes[range].copy_from_slice(&data);
        Ok(())
    }

    pub fn read8<P: Posture>(&self, addr: u32) -> Result<u8, FaultKind> {
        self.load::<P, 1>(addr).map(|[b]| b)
    }

    pub fn read16<P: Posture>(&self, addr: u32) -> Result<u16, FaultKind> {
        self.load::<P, 2>(addr).map(endian::decode16)
    }

    pub fn read32<P: Posture>(&self, addr: u32) -> Result<u32, FaultKind> {
        self.load::<P, 4>(addr).map(endian::decode32)
    }

    pub fn write8<P: Posture>(&mut self, addr: u32, value: u8) -> Result<(), FaultKind> {
        self.store::<P, 1>(addr, [value])
    }

    pub fn write16<P: Posture>(&mut self, addr: u32, value: u16) -> Result<(), FaultKind> {
        self.store::<P, 2>(addr, endian::encode16(value))
    }

    pub fn write32<P: Posture>(&mut self, addr: u32, value: u32) -> Result<(), FaultKind> {
        self.store::<P, 4>(addr, endian::encode32(value))
    }
}
