use std::io::{Read, Write};

use libdeflater::Decompressor;

use crate::error::{Error, Result};

/// Inflates a whole zlib stream, e.g. a loose object file.
pub fn inflate(reader: impl Read) -> Result<Vec<u8>> {
    let mut output_buf = Vec::new();
    flate2::read::ZlibDecoder::new(reader)
        .read_to_end(&mut output_buf)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidInput
            | std::io::ErrorKind::InvalidData
            | std::io::ErrorKind::UnexpectedEof => {
                Error::malformed(format!("corrupt zlib stream: {e}"))
            }
            _ => Error::Io(e),
        })?;

    Ok(output_buf)
}

/// Inflates the zlib stream at the start of `data`, which must yield exactly `size` bytes.
/// Trailing bytes after the stream are ignored.
pub fn inflate_exact(data: &[u8], size: usize) -> Result<Box<[u8]>> {
    let mut buf = vec![0u8; size];

    let mut decompressor = Decompressor::new();
    let written = decompressor
        .zlib_decompress(data, &mut buf)
        .map_err(|e| Error::malformed(format!("corrupt pack entry: {e}")))?;

    if written != size {
        return Err(Error::malformed(format!(
            "pack entry inflated to {written} bytes, header announced {size}"
        )));
    }

    Ok(buf.into_boxed_slice())
}

/// Compresses `"<prefix> <len>\0<data>"`, the loose object encoding.
pub fn deflate_object(prefix: &str, data: &[u8], level: u32) -> Result<Vec<u8>> {
    let preamble = format!("{} {}\0", prefix, data.len());

    let mut encoder = flate2::write::ZlibEncoder::new(
        Vec::with_capacity(data.len() / 2 + preamble.len()),
        flate2::Compression::new(level),
    );
    encoder.write_all(preamble.as_bytes())?;
    encoder.write_all(data)?;

    Ok(encoder.finish()?)
}
