use crate::{
    calculate_hash,
    error::{Error, Result},
    object_store::ObjectStore,
    shared::ObjectHash,
};

mod blob;
mod commit;
mod stamp;
mod tree;
mod tree_diff;

pub use blob::Blob;
pub use commit::Commit;
pub use stamp::CommitStamp;
pub use tree::{Tree, TreeNode, TreeUpdate, DIR_MODE, SUBMODULE_MODE};
pub use tree_diff::{tree_diff, TreeChange, TreeDiff};

/// Object kinds as tagged in pack entry headers. The delta kinds only exist inside packs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
    OffsetDelta,
    RefDelta,
}

impl ObjectType {
    pub fn from_name(name: &[u8]) -> Result<ObjectType> {
        match name {
            b"commit" => Ok(ObjectType::Commit),
            b"tree" => Ok(ObjectType::Tree),
            b"blob" => Ok(ObjectType::Blob),
            b"tag" => Ok(ObjectType::Tag),
            _ => Err(Error::malformed(format!(
                "unknown type name: {}",
                String::from_utf8_lossy(name)
            ))),
        }
    }

    /// Text form used in loose headers and hashing. Delta kinds have none.
    pub fn name(&self) -> Result<&'static str> {
        match self {
            ObjectType::Commit => Ok("commit"),
            ObjectType::Tree => Ok("tree"),
            ObjectType::Blob => Ok("blob"),
            ObjectType::Tag => Ok("tag"),
            ObjectType::OffsetDelta | ObjectType::RefDelta => Err(Error::malformed(format!(
                "no string representation of type {}",
                self.pack_tag()
            ))),
        }
    }

    pub fn pack_tag(&self) -> u8 {
        match self {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
            ObjectType::OffsetDelta => 6,
            ObjectType::RefDelta => 7,
        }
    }

    pub fn from_pack_tag(tag: u8) -> Result<ObjectType> {
        match tag {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            4 => Ok(ObjectType::Tag),
            6 => Ok(ObjectType::OffsetDelta),
            7 => Ok(ObjectType::RefDelta),
            _ => Err(Error::malformed(format!("object of unknown type {tag}"))),
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, ObjectType::OffsetDelta | ObjectType::RefDelta)
    }
}

/// Shared contract of the stored object variants.
///
/// The hash is cached on the value: `deserialize` derives it from the exact input
/// bytes, in-memory construction leaves it unset until `rehash`.
pub trait WriteObject: Sized {
    const TYPE: ObjectType;

    fn cached_hash(&self) -> Option<&ObjectHash>;

    fn set_cached_hash(&mut self, hash: Option<ObjectHash>);

    /// Type specific payload, without the `"<type> <len>\0"` header.
    fn serialize(&self) -> Result<Vec<u8>>;

    /// Fills the type specific fields from a payload.
    fn unserialize(data: &[u8]) -> Result<Self>;

    fn deserialize(data: &[u8]) -> Result<Self> {
        let mut object = Self::unserialize(data)?;
        object.set_cached_hash(Some(calculate_hash(data, Self::TYPE.name()?.as_bytes())));
        Ok(object)
    }

    /// The hash last computed for this value. Fails if it was never hashed.
    fn hash(&self) -> Result<ObjectHash> {
        self.cached_hash().copied().ok_or_else(|| {
            Error::InvalidState(format!(
                "{} object has not been hashed yet",
                Self::TYPE.name().unwrap_or("unknown")
            ))
        })
    }

    /// Recomputes the hash from `serialize`. Required after every mutation.
    fn rehash(&mut self) -> Result<ObjectHash> {
        let hash = calculate_hash(&self.serialize()?, Self::TYPE.name()?.as_bytes());
        self.set_cached_hash(Some(hash));
        Ok(hash)
    }

    /// Stores the object as a loose file. Returns false when it already existed.
    ///
    /// Fails with `InvalidState` when `serialize` no longer produces the bytes the
    /// cached hash names, e.g. a parsed commit whose signature was dropped.
    fn write(&self, store: &ObjectStore) -> Result<bool> {
        let hash = self.hash()?;
        let payload = self.serialize()?;
        let computed = calculate_hash(&payload, Self::TYPE.name()?.as_bytes());
        if computed != hash {
            return Err(Error::InvalidState(format!(
                "serialized content hashes to {computed}, not {hash}; rehash before writing"
            )));
        }
        store.write_loose(Self::TYPE, &hash, &payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitObject {
    Commit(Commit),
    Tree(Tree),
    Blob(Blob),
}

impl GitObject {
    /// Empty value of the variant matching `object_type`.
    pub fn create(object_type: ObjectType) -> Result<GitObject> {
        match object_type {
            ObjectType::Commit => Ok(GitObject::Commit(Commit::default())),
            ObjectType::Tree => Ok(GitObject::Tree(Tree::default())),
            ObjectType::Blob => Ok(GitObject::Blob(Blob::default())),
            ObjectType::Tag => Err(Error::Unsupported("tag objects".to_string())),
            ObjectType::OffsetDelta | ObjectType::RefDelta => Err(Error::malformed(format!(
                "unhandled object type {}",
                object_type.pack_tag()
            ))),
        }
    }

    pub fn deserialize(object_type: ObjectType, data: &[u8]) -> Result<GitObject> {
        match object_type {
            ObjectType::Commit => Ok(GitObject::Commit(Commit::deserialize(data)?)),
            ObjectType::Tree => Ok(GitObject::Tree(Tree::deserialize(data)?)),
            ObjectType::Blob => Ok(GitObject::Blob(Blob::deserialize(data)?)),
            other => GitObject::create(other),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            GitObject::Commit(_) => ObjectType::Commit,
            GitObject::Tree(_) => ObjectType::Tree,
            GitObject::Blob(_) => ObjectType::Blob,
        }
    }

    pub fn hash(&self) -> Result<ObjectHash> {
        match self {
            GitObject::Commit(commit) => commit.hash(),
            GitObject::Tree(tree) => tree.hash(),
            GitObject::Blob(blob) => blob.hash(),
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        match self {
            GitObject::Commit(commit) => commit.serialize(),
            GitObject::Tree(tree) => tree.serialize(),
            GitObject::Blob(blob) => blob.serialize(),
        }
    }

    pub fn rehash(&mut self) -> Result<ObjectHash> {
        match self {
            GitObject::Commit(commit) => commit.rehash(),
            GitObject::Tree(tree) => tree.rehash(),
            GitObject::Blob(blob) => blob.rehash(),
        }
    }

    pub fn write(&self, store: &ObjectStore) -> Result<bool> {
        match self {
            GitObject::Commit(commit) => commit.write(store),
            GitObject::Tree(tree) => tree.write(store),
            GitObject::Blob(blob) => blob.write(store),
        }
    }
}

impl From<Commit> for GitObject {
    fn from(value: Commit) -> Self {
        GitObject::Commit(value)
    }
}

impl From<Tree> for GitObject {
    fn from(value: Tree) -> Self {
        GitObject::Tree(value)
    }
}

impl From<Blob> for GitObject {
    fn from(value: Blob) -> Self {
        GitObject::Blob(value)
    }
}
