use crate::binary::read_varint;
use crate::error::{Error, Result};

/// Copy `len` bytes of the base starting at `offset`.
#[derive(PartialEq, Eq)]
pub struct CopyInstruction {
    offset: usize,
    len: usize,
}

impl CopyInstruction {
    fn create(data: &[u8], current_offset: &mut usize) -> Result<CopyInstruction> {
        let copy_instruction = next_byte(data, current_offset)?;

        let mut offset = 0;
        for (bit, shift) in [(0x01, 0), (0x02, 8), (0x04, 16), (0x08, 24)] {
            if (copy_instruction & bit) != 0 {
                offset |= (next_byte(data, current_offset)? as usize) << shift;
            }
        }

        let mut len = 0;
        for (bit, shift) in [(0x10, 0), (0x20, 8), (0x40, 16)] {
            if (copy_instruction & bit) != 0 {
                len |= (next_byte(data, current_offset)? as usize) << shift;
            }
        }

        if len == 0 {
            len = 0x10000;
        }

        Ok(CopyInstruction { offset, len })
    }
}

impl std::fmt::Debug for CopyInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "CopyInstruction. Offset: {} Len: {}",
            &self.offset, &self.len
        ))
    }
}

/// Insert literal bytes carried in the delta stream.
#[derive(Clone, PartialEq, Eq)]
pub struct AddInstruction {
    bytes: Box<[u8]>,
}

impl std::fmt::Debug for AddInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("AddInstruction. Len: {}", self.bytes.len()))
    }
}

impl AddInstruction {
    fn create(data: &[u8], current_offset: &mut usize) -> Result<AddInstruction> {
        let bytes_to_copy = next_byte(data, current_offset)? as usize;
        if bytes_to_copy == 0 {
            return Err(Error::malformed("delta opcode 0 is reserved"));
        }

        let bytes = data
            .get(*current_offset..*current_offset + bytes_to_copy)
            .ok_or_else(|| Error::malformed("delta insert runs past the end of the delta"))?
            .to_owned()
            .into_boxed_slice();
        *current_offset += bytes_to_copy;

        Ok(AddInstruction { bytes })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DiffInstruction {
    Copy(CopyInstruction),
    Add(AddInstruction),
}

/// A parsed delta: expected sizes plus the copy/insert program.
#[derive(Debug)]
pub struct PackDiff {
    pub base_len: usize,
    pub target_len: usize,
    pub instructions: Vec<DiffInstruction>,
}

impl PackDiff {
    /// Parses a delta. Sizes above `max_size` are rejected before any allocation.
    pub fn parse(delta: &[u8], max_size: u64) -> Result<PackDiff> {
        let (base_len, bytes_read) = read_varint(delta, 0)?;
        let (target_len, mut bytes_read) = read_varint(delta, bytes_read)?;

        if base_len > max_size || target_len > max_size {
            return Err(Error::malformed(format!(
                "delta sizes {base_len}/{target_len} exceed the limit of {max_size} bytes"
            )));
        }

        let mut instructions = Vec::new();
        while bytes_read < delta.len() {
            if (delta[bytes_read] & 0x80) != 0 {
                let copy_instruction = CopyInstruction::create(delta, &mut bytes_read)?;
                instructions.push(DiffInstruction::Copy(copy_instruction));
            } else {
                let add_instruction = AddInstruction::create(delta, &mut bytes_read)?;
                instructions.push(DiffInstruction::Add(add_instruction));
            }
        }

        Ok(PackDiff {
            base_len: base_len as usize,
            target_len: target_len as usize,
            instructions,
        })
    }

    /// Runs the program against `base`. Copies outside the base are an error.
    pub fn apply(&self, base: &[u8]) -> Result<Vec<u8>> {
        if base.len() != self.base_len {
            log::debug!(
                "delta expects a base of {} bytes, got {}",
                self.base_len,
                base.len()
            );
        }

        let mut target = Vec::with_capacity(self.target_len);

        for instruction in self.instructions.iter() {
            match instruction {
                DiffInstruction::Add(add) => target.extend_from_slice(&add.bytes),
                DiffInstruction::Copy(copy) => {
                    let source = copy
                        .offset
                        .checked_add(copy.len)
                        .and_then(|end| base.get(copy.offset..end))
                        .ok_or_else(|| {
                            Error::malformed(format!(
                                "delta copies {}..{} from a base of {} bytes",
                                copy.offset,
                                copy.offset.saturating_add(copy.len),
                                base.len()
                            ))
                        })?;
                    target.extend_from_slice(source);
                }
            }
        }

        if target.len() != self.target_len {
            log::debug!(
                "delta declared a result of {} bytes, produced {}",
                self.target_len,
                target.len()
            );
        }

        Ok(target)
    }
}

/// Reconstructs the target of `delta` against `base`.
pub fn apply_delta(delta: &[u8], base: &[u8], max_size: u64) -> Result<Vec<u8>> {
    PackDiff::parse(delta, max_size)?.apply(base)
}

#[inline]
fn next_byte(data: &[u8], current_offset: &mut usize) -> Result<u8> {
    let byte = *data
        .get(*current_offset)
        .ok_or_else(|| Error::malformed("delta instruction runs past the end of the delta"))?;
    *current_offset += 1;
    Ok(byte)
}
