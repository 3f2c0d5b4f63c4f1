//! Compressed unsigned integer encoding used inside signature blobs.
//!
//! The leading byte selects the width:
//! - `0xxxxxxx` holds a 7-bit value in one byte,
//! - `10xxxxxx xxxxxxxx` holds a 14-bit value in two bytes,
//! - `110xxxxx` followed by three bytes holds a 29-bit value.

use crate::error::SigError;

/// Largest value representable by the four-byte form.
pub const MAX_COMPRESSED: u32 = 0x1FFF_FFFF;

/// Decode a single compressed integer starting at `*cursor`, advancing it.
pub fn read_compressed(bytes: &[u8], cursor: &mut usize) -> Result<u32, SigError> {
    let start = *cursor;
    let first = *bytes.get(start).ok_or(SigError::Truncated { offset: start })?;

    let (value, width) = if first & 0x80 == 0 {
        (first as u32, 1)
    } else if first & 0x40 == 0 {
        let second = *bytes.get(start + 1).ok_or(SigError::Truncated { offset: start + 1 })?;
        ((((first & 0x3F) as u32) << 8) | second as u32, 2)
    } else {
        if start + 4 > bytes.len() {
            return Err(SigError::Truncated { offset: bytes.len() });
        }
        let value = (((first & 0x1F) as u32) << 24)
            | ((bytes[start + 1] as u32) << 16)
            | ((bytes[start + 2] as u32) << 8)
            | bytes[start + 3] as u32;
        (value, 4)
    };

    *cursor = start + width;
    Ok(value)
}

/// Decode a signed compressed integer (used for array lower bounds).
///
/// The sign bit is rotated into the least significant position before
/// compression, so the width of the unsigned form decides how far to extend.
pub fn read_compressed_signed(bytes: &[u8], cursor: &mut usize) -> Result<i32, SigError> {
    let start = *cursor;
    let raw = read_compressed(bytes, cursor)?;
    let width = *cursor - start;
    let negative = raw & 1 != 0;
    let magnitude = (raw >> 1) as i32;
    if !negative {
        return Ok(magnitude);
    }
    let bits = match width {
        1 => 6,
        2 => 13,
        _ => 28,
    };
    Ok(magnitude | (-1i32 << bits))
}

/// Decode a whole buffer as a run of compressed integers.
pub fn decode(bytes: &[u8]) -> Result<Vec<u32>, SigError> {
    let mut out = Vec::new();
    let mut cursor = 0usize;
    while cursor < bytes.len() {
        out.push(read_compressed(bytes, &mut cursor)?);
    }
    Ok(out)
}

/// Append the compressed form of `value` to `out`.
pub fn write_compressed(out: &mut Vec<u8>, value: u32) -> Result<(), SigError> {
    match value {
        0..=0x7F => out.push(value as u8),
        0x80..=0x3FFF => {
            out.push(0x80 | (value >> 8) as u8);
            out.push(value as u8);
        }
        0x4000..=MAX_COMPRESSED => {
            out.push(0xC0 | (value >> 24) as u8);
            out.push((value >> 16) as u8);
            out.push((value >> 8) as u8);
            out.push(value as u8);
        }
        _ => return Err(SigError::Overflow(value)),
    }
    Ok(())
}

/// Encode a run of integers into a fresh buffer.
pub fn encode(values: &[u32]) -> Result<Vec<u8>, SigError> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        write_compressed(&mut out, *value)?;
    }
    Ok(out)
}
