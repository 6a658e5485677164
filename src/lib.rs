//! Native reader and writer for a git object database: loose objects, packs with
//! v1/v2 indexes and deltas, and the blob/tree/commit object model on top.

use std::hash::Hasher;

use rs_sha1::{HasherContext, Sha1Hasher};

mod binary;
mod commit_walker;
mod compression;
mod config;
mod error;
mod idx_reader;
mod lock;
mod object_store;
mod pack_diff;
mod packreader;
mod refs;
mod repository;
mod shared;

#[cfg(test)]
mod test_support;

pub mod objs;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use idx_reader::{IndexVersion, PackIndex};
pub use object_store::{ObjectStore, RawObject};
pub use objs::{
    tree_diff, Blob, Commit, CommitStamp, GitObject, ObjectType, Tree, TreeChange, TreeDiff,
    TreeNode, TreeUpdate, WriteObject,
};
pub use pack_diff::{apply_delta, AddInstruction, CopyInstruction, DiffInstruction, PackDiff};
pub use packreader::{PackEntry, PackFile};
pub use refs::PackedRef;
pub use repository::Repository;
pub use shared::ObjectHash;

/// SHA-1 over `"<prefix> <len>\0<data>"`, the name of an object.
pub fn calculate_hash(data: &[u8], prefix: &[u8]) -> ObjectHash {
    let mut hasher = Sha1Hasher::default();
    hasher.write(prefix);
    hasher.write(b" ");
    hasher.write(data.len().to_string().as_bytes());
    hasher.write(b"\0");
    hasher.write(data);
    let bytes = HasherContext::finish(&mut hasher);
    let bytes: [u8; 20] = bytes.into();
    ObjectHash::from(bytes)
}
