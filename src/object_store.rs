use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use bstr::ByteSlice;
use rustc_hash::FxHashMap;

use crate::{
    compression::{deflate_object, inflate},
    config::StoreConfig,
    error::{Error, Result},
    lock::LockedFile,
    objs::ObjectType,
    pack_diff::apply_delta,
    packreader::{PackEntry, PackFile, PackReader},
    shared::ObjectHash,
};

/// Type and payload of a stored object, before it is parsed into a `GitObject`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub object_type: ObjectType,
    pub data: Arc<[u8]>,
}

/// Resolves hashes against the loose objects and packs below `<root>/objects`.
///
/// Every resolved object stays cached for the lifetime of the store.
#[derive(Debug)]
pub struct ObjectStore {
    root: PathBuf,
    packs: PackReader,
    cache: Mutex<FxHashMap<ObjectHash, RawObject>>,
    config: StoreConfig,
}

impl ObjectStore {
    pub fn open(root: impl Into<PathBuf>, config: StoreConfig) -> Result<ObjectStore> {
        let root = root.into();
        let packs = PackReader::create(&root)?;
        log::debug!(
            "opened object store at {} with {} packs",
            root.display(),
            packs.packs().len()
        );

        Ok(ObjectStore {
            root,
            packs,
            cache: Mutex::new(FxHashMap::default()),
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn packs(&self) -> &[PackFile] {
        self.packs.packs()
    }

    /// Loose storage first, then every pack in turn.
    pub fn get(&self, hash: &ObjectHash) -> Result<RawObject> {
        self.get_at_depth(hash, 0)
    }

    /// Whether `hash` is stored, without reading its content.
    pub fn contains(&self, hash: &ObjectHash) -> Result<bool> {
        if self.cached(hash).is_some() || is_stored(&self.loose_path(hash))? {
            return Ok(true);
        }

        Ok(self.packs.find(hash)?.is_some())
    }

    pub fn loose_path(&self, hash: &ObjectHash) -> PathBuf {
        self.root.join("objects").join(hash.loose_path())
    }

    fn cached(&self, hash: &ObjectHash) -> Option<RawObject> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hash)
            .cloned()
    }

    fn get_at_depth(&self, hash: &ObjectHash, depth: usize) -> Result<RawObject> {
        if let Some(object) = self.cached(hash) {
            log::trace!("cache hit for {hash}");
            return Ok(object);
        }

        let object = match self.read_loose(hash)? {
            Some(object) => object,
            None => match self.read_packed(hash, depth)? {
                Some(object) => object,
                None => return Err(Error::NotFound(*hash)),
            },
        };

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*hash, object.clone());

        Ok(object)
    }

    fn read_loose(&self, hash: &ObjectHash) -> Result<Option<RawObject>> {
        let path = self.loose_path(hash);
        if !is_stored(&path)? {
            return Ok(None);
        }

        let locked = LockedFile::open_shared(&path)?;
        let inflated = inflate(locked.file())?;
        drop(locked);

        let (object_type, payload) = split_loose_header(&inflated, self.config.max_object_size)?;
        log::debug!("{hash} served from loose {}", path.display());

        Ok(Some(RawObject {
            object_type,
            data: Arc::from(payload),
        }))
    }

    fn read_packed(&self, hash: &ObjectHash, depth: usize) -> Result<Option<RawObject>> {
        let (pack, offset) = match self.packs.find(hash)? {
            Some(hit) => hit,
            None => return Ok(None),
        };

        log::debug!("{hash} served from {} at offset {offset}", pack.name());
        let (object_type, data) = self.unpack(pack, offset, depth)?;

        Ok(Some(RawObject {
            object_type,
            data: Arc::from(data),
        }))
    }

    /// Resolves the entry at `offset`, following delta bases recursively. No pack lock is
    /// held while a base is resolved.
    fn unpack(&self, pack: &PackFile, offset: u64, depth: usize) -> Result<(ObjectType, Vec<u8>)> {
        if depth > self.config.max_delta_depth {
            return Err(Error::Unsupported(format!(
                "delta chain in {} is deeper than {}",
                pack.name(),
                self.config.max_delta_depth
            )));
        }

        let max_size = self.config.max_object_size;
        match pack.read_entry(offset, max_size)? {
            PackEntry::Whole { object_type, data } => Ok((object_type, data.into_vec())),
            PackEntry::OffsetDelta { base_offset, delta } => {
                log::trace!("offset {offset} is a delta against offset {base_offset}");
                let (object_type, base) = self.unpack(pack, base_offset, depth + 1)?;
                Ok((object_type, apply_delta(&delta, &base, max_size)?))
            }
            PackEntry::RefDelta { base, delta } => {
                log::trace!("offset {offset} is a delta against {base}");
                let base = self.get_at_depth(&base, depth + 1)?;
                Ok((base.object_type, apply_delta(&delta, &base.data, max_size)?))
            }
        }
    }

    /// Stores `payload` as a loose object named `hash`.
    ///
    /// Returns false without touching the file when the object already exists. An empty
    /// file left behind by an interrupted write does not count as stored.
    pub fn write_loose(
        &self,
        object_type: ObjectType,
        hash: &ObjectHash,
        payload: &[u8],
    ) -> Result<bool> {
        let path = self.loose_path(hash);
        if is_stored(&path)? {
            log::debug!("{hash} already stored, skipping write");
            return Ok(false);
        }

        let compressed = deflate_object(
            object_type.name()?,
            payload,
            self.config.compression_level,
        )?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut locked = LockedFile::open_exclusive(&path)?;
        // a concurrent writer finished the same object while we waited for the lock
        if locked.file().metadata()?.len() > 0 {
            log::debug!("{hash} written concurrently, skipping write");
            return Ok(false);
        }

        let written = locked
            .file()
            .set_len(0)
            .and_then(|_| locked.file_mut().write_all(&compressed))
            .and_then(|_| locked.file_mut().flush());
        if let Err(e) = written {
            // never leave a partial object behind for readers or the next writer
            if let Err(truncate_error) = locked.file().set_len(0) {
                log::warn!("could not truncate {}: {truncate_error}", path.display());
            }
            return Err(e.into());
        }

        log::debug!("wrote {} {hash}", object_type.name()?);
        Ok(true)
    }
}

/// A loose file counts as stored once it has content.
fn is_stored(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(metadata) => Ok(metadata.is_file() && metadata.len() > 0),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Splits `"<type> <len>\0<payload>"` and checks the announced length.
fn split_loose_header(inflated: &[u8], max_size: u64) -> Result<(ObjectType, &[u8])> {
    let nul = inflated
        .find_byte(0)
        .ok_or_else(|| Error::malformed("loose object without header terminator"))?;
    let (header, payload) = (&inflated[..nul], &inflated[nul + 1..]);

    let (type_name, len) = header.split_once_str(b" ").ok_or_else(|| {
        Error::malformed(format!("invalid loose object header {:?}", header.as_bstr()))
    })?;

    let object_type = ObjectType::from_name(type_name)?;
    let len: u64 = len
        .to_str()
        .ok()
        .and_then(|len| len.parse().ok())
        .ok_or_else(|| Error::malformed(format!("invalid loose object length {:?}", len.as_bstr())))?;

    if len > max_size || len != payload.len() as u64 {
        return Err(Error::malformed(format!(
            "loose object announces {len} bytes, holds {}",
            payload.len()
        )));
    }

    Ok((object_type, payload))
}
