use std::path::{Path, PathBuf};

use crate::{
    config::StoreConfig,
    error::{Error, Result},
    object_store::{ObjectStore, RawObject},
    objs::{Blob, Commit, GitObject, Tree, WriteObject},
    refs::{self, PackedRef},
    shared::ObjectHash,
};

/// Entry point for reading and writing objects of a repository directory.
#[derive(Debug)]
pub struct Repository {
    path: PathBuf,
    store: ObjectStore,
}

impl Repository {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    /// `path` is the repository directory holding `objects/` (a bare repository or `.git`).
    pub fn open_with_config(path: impl Into<PathBuf>, config: StoreConfig) -> Result<Self> {
        let path = path.into();
        if !path.join("objects").is_dir() {
            return Err(Error::InvalidPath(format!(
                "{} has no objects directory",
                path.display()
            )));
        }

        let store = ObjectStore::open(path.clone(), config)?;
        Ok(Repository { path, store })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &StoreConfig {
        self.store.config()
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn raw(&self, hash: &ObjectHash) -> Result<RawObject> {
        self.store.get(hash)
    }

    /// Loads and parses `hash`. With `verify_hashes` the content must hash back to `hash`.
    pub fn object(&self, hash: &ObjectHash) -> Result<GitObject> {
        let raw = self.store.get(hash)?;
        let object = GitObject::deserialize(raw.object_type, &raw.data)?;

        if self.store.config().verify_hashes {
            let actual = object.hash()?;
            if actual != *hash {
                return Err(Error::HashMismatch {
                    expected: *hash,
                    actual,
                });
            }
        }

        Ok(object)
    }

    pub fn commit(&self, hash: &ObjectHash) -> Result<Commit> {
        match self.object(hash)? {
            GitObject::Commit(commit) => Ok(commit),
            other => Err(unexpected_type(hash, &other, "commit")),
        }
    }

    pub fn tree(&self, hash: &ObjectHash) -> Result<Tree> {
        match self.object(hash)? {
            GitObject::Tree(tree) => Ok(tree),
            other => Err(unexpected_type(hash, &other, "tree")),
        }
    }

    pub fn blob(&self, hash: &ObjectHash) -> Result<Blob> {
        match self.object(hash)? {
            GitObject::Blob(blob) => Ok(blob),
            other => Err(unexpected_type(hash, &other, "blob")),
        }
    }

    /// Hash of the commit the branch `name` points to.
    pub fn tip(&self, name: &str) -> Result<ObjectHash> {
        refs::resolve_tip(&self.path, name)
    }

    pub fn tip_commit(&self, name: &str) -> Result<Commit> {
        self.commit(&self.tip(name)?)
    }

    pub fn packed_refs(&self) -> Result<Vec<PackedRef>> {
        refs::read_packed_refs(&self.path)
    }

    /// Writes a hashed object as a loose file. Returns false when it already existed.
    pub fn write(&self, object: &impl WriteObject) -> Result<bool> {
        object.write(&self.store)
    }
}

fn unexpected_type(hash: &ObjectHash, object: &GitObject, expected: &str) -> Error {
    Error::malformed(format!(
        "{hash} is a {}, expected a {expected}",
        object.object_type().name().unwrap_or("delta")
    ))
}
