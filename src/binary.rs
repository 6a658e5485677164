//! Integer decoding for the index, pack and delta formats.
//!
//! Two incompatible variable-length encodings are in use:
//!
//! * [`read_varint`]: little-endian 7-bit groups, used for object and delta sizes.
//! * [`read_offset_varint`]: big-endian 7-bit groups where every continuation
//!   byte implicitly adds one, used only for offset-delta base distances.

use crate::error::{Error, Result};

#[inline]
fn byte_at(bytes: &[u8], pos: usize) -> Result<u8> {
    bytes
        .get(pos)
        .copied()
        .ok_or_else(|| Error::malformed(format!("unexpected end of data at byte {pos}")))
}

/// Reads 4 bytes at `pos` as big-endian u32.
pub fn be_u32(bytes: &[u8], pos: usize) -> Result<u32> {
    let end = pos
        .checked_add(4)
        .ok_or_else(|| Error::malformed("u32 position overflows"))?;
    let slice = bytes
        .get(pos..end)
        .ok_or_else(|| Error::malformed(format!("unexpected end of data reading u32 at {pos}")))?;

    let mut buf = [0u8; 4];
    buf.copy_from_slice(slice);
    Ok(u32::from_be_bytes(buf))
}

/// Little-endian-group varint. Returns the value and the position after it.
pub fn read_varint(bytes: &[u8], mut pos: usize) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;

    loop {
        let byte = byte_at(bytes, pos)?;
        pos += 1;

        if shift >= 64 {
            return Err(Error::malformed("varint does not fit into 64 bits"));
        }
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((value, pos));
        }
    }
}

/// Big-endian continuation varint used for offset-delta base distances.
///
/// Starts at -1 and increments before every group, so each continuation byte adds one
/// on top of the plain 7-bit concatenation.
pub fn read_offset_varint(bytes: &[u8], mut pos: usize) -> Result<(u64, usize)> {
    let mut offset: i128 = -1;

    loop {
        offset += 1;
        let byte = byte_at(bytes, pos)?;
        pos += 1;

        offset = (offset << 7) + (byte & 0x7F) as i128;
        if offset > u64::MAX as i128 {
            return Err(Error::malformed("offset delta distance overflows"));
        }

        if byte & 0x80 == 0 {
            return Ok((offset as u64, pos));
        }
    }
}
