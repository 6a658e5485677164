use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use memmap2::Mmap;

use crate::{
    binary::{be_u32, read_offset_varint},
    compression::inflate_exact,
    error::{Error, Result},
    idx_reader::PackIndex,
    lock::LockedFile,
    objs::ObjectType,
    shared::{ObjectHash, HASH_LEN},
};

const PACK_MAGIC: &[u8; 4] = b"PACK";
const PACK_VERSION: u32 = 2;
const PACK_HEADER_LEN: usize = 12;

const TYPE_MASK: u8 = 0b0111_0000;
const MSB: u8 = 0b1000_0000;

/// Variable-length header in front of every pack entry.
#[derive(Debug, PartialEq, Eq)]
pub struct PackObject {
    pub object_type: ObjectType,
    pub header_len: usize,
    pub data_size: u64,
}

impl PackObject {
    /// Size bits start in the low nibble of the first byte, every continuation byte
    /// adds 7 more above them.
    pub fn create(pack: &[u8], offset: usize) -> Result<PackObject> {
        let byte_at = |pos: usize| {
            pack.get(pos)
                .copied()
                .ok_or_else(|| Error::malformed(format!("pack entry header at {offset} is truncated")))
        };

        let mut read_byte = byte_at(offset)?;
        let mut bytes_read = 1;
        let object_type = ObjectType::from_pack_tag((read_byte & TYPE_MASK) >> 4)?;
        let mut data_size = (read_byte & 0b0000_1111) as u64;
        let mut shift = 4;

        while read_byte & MSB != 0 {
            if shift >= 64 {
                return Err(Error::malformed(format!(
                    "pack entry size at {offset} does not fit into 64 bits"
                )));
            }
            read_byte = byte_at(offset + bytes_read)?;
            bytes_read += 1;
            data_size |= ((read_byte & 0x7F) as u64) << shift;
            shift += 7;
        }

        Ok(PackObject {
            object_type,
            header_len: bytes_read,
            data_size,
        })
    }
}

/// One pack entry, inflated but not yet resolved against a delta base.
#[derive(Debug)]
pub enum PackEntry {
    Whole {
        object_type: ObjectType,
        data: Box<[u8]>,
    },
    OffsetDelta {
        base_offset: u64,
        delta: Box<[u8]>,
    },
    RefDelta {
        base: ObjectHash,
        delta: Box<[u8]>,
    },
}

/// A `pack-<hash>.pack` file and its parsed index.
#[derive(Debug)]
pub struct PackFile {
    name: String,
    pack_path: PathBuf,
    index: PackIndex,
}

impl PackFile {
    pub fn open(idx_path: &Path) -> Result<PackFile> {
        let name = idx_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| Error::InvalidPath(idx_path.display().to_string()))?
            .to_string();

        let index = PackIndex::open(idx_path)?;
        log::debug!(
            "loaded {} with {} objects ({:?} index)",
            name,
            index.object_count(),
            index.version()
        );

        Ok(PackFile {
            name,
            pack_path: idx_path.with_extension("pack"),
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn lookup(&self, hash: &ObjectHash) -> Result<Option<u64>> {
        self.index.lookup(hash)
    }

    /// Reads the entry at `offset`. The pack is locked and mapped only for the duration
    /// of this call.
    pub fn read_entry(&self, offset: u64, max_size: u64) -> Result<PackEntry> {
        let locked = LockedFile::open_shared(&self.pack_path)?;
        if locked.file().metadata()?.len() < PACK_HEADER_LEN as u64 {
            return Err(Error::malformed(format!("{} is too short", self.name)));
        }

        // SAFETY: the shared lock keeps cooperating writers out while the map is alive.
        let mmap = unsafe { Mmap::map(locked.file())? };
        check_header(&mmap, &self.name)?;

        let offset = usize::try_from(offset)
            .map_err(|_| Error::malformed(format!("pack offset {offset} out of range")))?;
        if offset < PACK_HEADER_LEN || offset >= mmap.len() {
            return Err(Error::malformed(format!(
                "offset {offset} is outside of {}",
                self.name
            )));
        }

        let pack_object = PackObject::create(&mmap, offset)?;
        if pack_object.data_size > max_size {
            return Err(Error::malformed(format!(
                "pack entry at {offset} announces {} bytes",
                pack_object.data_size
            )));
        }

        let size = pack_object.data_size as usize;
        let mut data_start = offset + pack_object.header_len;

        let entry = match pack_object.object_type {
            ObjectType::OffsetDelta => {
                let (distance, end) = read_offset_varint(&mmap, data_start)?;
                data_start = end;
                if distance == 0 || distance > offset as u64 {
                    return Err(Error::malformed(format!(
                        "offset delta at {offset} points {distance} bytes back"
                    )));
                }
                PackEntry::OffsetDelta {
                    base_offset: offset as u64 - distance,
                    delta: inflate_exact(tail(&mmap, data_start)?, size)?,
                }
            }
            ObjectType::RefDelta => {
                let end = data_start + HASH_LEN;
                let base = mmap
                    .get(data_start..end)
                    .ok_or_else(|| Error::malformed("ref delta base hash is truncated"))?;
                let base = ObjectHash::try_from(base)?;
                data_start = end;
                PackEntry::RefDelta {
                    base,
                    delta: inflate_exact(tail(&mmap, data_start)?, size)?,
                }
            }
            object_type => PackEntry::Whole {
                object_type,
                data: inflate_exact(tail(&mmap, data_start)?, size)?,
            },
        };

        Ok(entry)
    }
}

fn check_header(pack: &[u8], name: &str) -> Result<()> {
    if &pack[0..4] != PACK_MAGIC {
        return Err(Error::malformed(format!("{name} has no PACK signature")));
    }

    let version = be_u32(pack, 4)?;
    if version != PACK_VERSION {
        return Err(Error::malformed(format!(
            "{name} has unsupported version {version}"
        )));
    }

    Ok(())
}

fn tail(pack: &[u8], start: usize) -> Result<&[u8]> {
    pack.get(start..)
        .ok_or_else(|| Error::malformed("pack entry data is truncated"))
}

/// All packs of a repository, searched in discovery order.
#[derive(Debug, Default)]
pub struct PackReader {
    packs: Vec<PackFile>,
}

impl PackReader {
    pub fn create(repository_path: &Path) -> Result<PackReader> {
        let packs = get_packs(repository_path)?
            .iter()
            .map(|idx_path| PackFile::open(idx_path))
            .collect::<Result<Vec<_>>>()?;

        Ok(PackReader { packs })
    }

    pub fn packs(&self) -> &[PackFile] {
        &self.packs
    }

    /// First pack listing `hash`, with the entry offset.
    pub fn find(&self, hash: &ObjectHash) -> Result<Option<(&PackFile, u64)>> {
        for pack in self.packs.iter() {
            if let Some(offset) = pack.lookup(hash)? {
                return Ok(Some((pack, offset)));
            }
        }

        Ok(None)
    }
}

/// `objects/pack/pack-<40hex>.idx` files, sorted by name.
fn get_packs(repository_path: &Path) -> Result<Vec<PathBuf>> {
    let pack_dir = repository_path.join("objects/pack");

    let entries = match fs::read_dir(&pack_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut packs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }

        let path = entry.path();
        let is_pack_index = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix("pack-"))
            .and_then(|name| name.strip_suffix(".idx"))
            .map(|hex| hex.len() == 2 * HASH_LEN && hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .unwrap_or(false);

        if is_pack_index {
            packs.push(path);
        }
    }

    packs.sort();
    Ok(packs)
}
