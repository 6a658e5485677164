use std::{io::Read, path::Path};

use crate::{
    binary::be_u32,
    error::{Error, Result},
    lock::LockedFile,
    shared::{ObjectHash, HASH_LEN},
};

const V2_MAGIC: &[u8; 4] = b"\xfftOc";
const V2_HEADER_LEN: usize = 8;
const FANOUT_ENTRIES: usize = 256;
const FANOUT_LEN: usize = FANOUT_ENTRIES * 4;
const V1_ENTRY_LEN: usize = 4 + HASH_LEN;
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexVersion {
    V1,
    V2,
}

/// A parsed `.idx` file. Lookups go through the fanout table into the sorted hash list.
#[derive(Debug)]
pub struct PackIndex {
    version: IndexVersion,
    object_count: usize,
    data: Vec<u8>,
}

impl PackIndex {
    /// Reads an index file under a shared lock.
    pub fn open(idx_path: &Path) -> Result<PackIndex> {
        let mut locked = LockedFile::open_shared(idx_path)?;
        let mut data = Vec::new();
        locked.file_mut().read_to_end(&mut data)?;
        drop(locked);

        PackIndex::parse(data)
    }

    pub fn parse(data: Vec<u8>) -> Result<PackIndex> {
        let version = if data.len() >= 4 && &data[0..4] == V2_MAGIC {
            let version = be_u32(&data, 4)?;
            if version != 2 {
                return Err(Error::malformed(format!(
                    "unsupported pack index version {version}"
                )));
            }
            IndexVersion::V2
        } else {
            IndexVersion::V1
        };

        let fanout_start = fanout_start(version);
        if data.len() < fanout_start + FANOUT_LEN {
            return Err(Error::malformed("pack index is shorter than its fanout table"));
        }

        let mut previous = 0;
        for i in 0..FANOUT_ENTRIES {
            let count = be_u32(&data, fanout_start + 4 * i)?;
            if count < previous {
                return Err(Error::malformed("pack index fanout table is not monotonic"));
            }
            previous = count;
        }

        let object_count = previous as usize;
        let required = match version {
            IndexVersion::V1 => FANOUT_LEN + V1_ENTRY_LEN * object_count,
            IndexVersion::V2 => V2_HEADER_LEN + FANOUT_LEN + (HASH_LEN + 4 + 4) * object_count,
        };
        if data.len() < required {
            return Err(Error::malformed(format!(
                "pack index holds {} bytes, {} objects need {}",
                data.len(),
                object_count,
                required
            )));
        }

        Ok(PackIndex {
            version,
            object_count,
            data,
        })
    }

    pub fn version(&self) -> IndexVersion {
        self.version
    }

    pub fn object_count(&self) -> usize {
        self.object_count
    }

    /// Byte offset of `hash` inside the pack, `None` when this index does not list it.
    pub fn lookup(&self, hash: &ObjectHash) -> Result<Option<u64>> {
        let (cur, after) = self.fanout_range(hash.first_byte())?;

        let mut low = cur;
        let mut high = after;
        while low < high {
            let mid = low + (high - low) / 2;
            match self.hash_at(mid).cmp(hash.as_bytes()) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return self.offset_at(mid).map(Some),
            }
        }

        Ok(None)
    }

    /// All hashes listed by this index, in sorted order.
    pub fn hashes(&self) -> impl Iterator<Item = ObjectHash> + '_ {
        (0..self.object_count).map(|i| {
            let mut bytes = [0u8; HASH_LEN];
            bytes.copy_from_slice(self.hash_at(i));
            ObjectHash::from(bytes)
        })
    }

    /// `[cur, after)` for a leading byte; byte 0 maps to `[0, fanout[0])`.
    fn fanout_range(&self, first_byte: u8) -> Result<(usize, usize)> {
        let start = fanout_start(self.version);
        let after = be_u32(&self.data, start + 4 * first_byte as usize)? as usize;
        let cur = if first_byte == 0 {
            0
        } else {
            be_u32(&self.data, start + 4 * (first_byte as usize - 1))? as usize
        };

        Ok((cur, after))
    }

    fn hash_at(&self, i: usize) -> &[u8] {
        let pos = match self.version {
            IndexVersion::V1 => FANOUT_LEN + V1_ENTRY_LEN * i + 4,
            IndexVersion::V2 => V2_HEADER_LEN + FANOUT_LEN + HASH_LEN * i,
        };
        &self.data[pos..pos + HASH_LEN]
    }

    fn offset_at(&self, i: usize) -> Result<u64> {
        let offset = match self.version {
            IndexVersion::V1 => be_u32(&self.data, FANOUT_LEN + V1_ENTRY_LEN * i)?,
            IndexVersion::V2 => {
                let table = V2_HEADER_LEN + FANOUT_LEN + (HASH_LEN + 4) * self.object_count;
                be_u32(&self.data, table + 4 * i)?
            }
        };

        if self.version == IndexVersion::V2 && offset & LARGE_OFFSET_FLAG != 0 {
            return Err(Error::Unsupported(
                "64-bit pack offsets are not implemented".to_string(),
            ));
        }

        Ok(offset as u64)
    }
}

fn fanout_start(version: IndexVersion) -> usize {
    match version {
        IndexVersion::V1 => 0,
        IndexVersion::V2 => V2_HEADER_LEN,
    }
}
