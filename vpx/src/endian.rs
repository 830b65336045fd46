// endian.rs - wire byte order for multi-byte values
//
// Every 16/32-bit value that crosses the memory boundary goes through these
// helpers. The order is chosen at build time with the `big-endian-wire`
// feature and is the same for every value and every run of a compiled core.

/// Is the wire order big-endian for this build?
pub const BIG_ENDIAN_WIRE: bool = cfg!(feature = "big-endian-wire");

#[inline]
pub fn decode16(bytes: [u8; 2]) -> u16 {
    if BIG_ENDIAN_WIRE {
        u16::from_be_bytes(bytes)
    } else {
        u16::from_le_bytes(bytes)
    }
}

#[inline]
pub fn decode32(bytes: [u8; 4]) -> u32 {
    if BIG_ENDIAN_WIRE {
        u32::from_be_bytes(bytes)
    } else {
        u32::from_le_bytes(bytes)
    }
}

#[inline]
pub fn encode16(value: u16) -> [u8; 2] {
    if BIG_ENDIAN_WIRE {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    }
}

#[inline]
pub fn encode32(value: u32) -> [u8; 4] {
    if BIG_ENDIAN_WIRE {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    }
}
