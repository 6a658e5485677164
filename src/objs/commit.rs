use std::fmt::Display;

use bstr::{BString, ByteSlice, ByteVec};
use once_cell::sync::OnceCell;

use crate::{
    error::{Error, Result},
    repository::Repository,
    shared::ObjectHash,
};

use super::{tree_diff, CommitStamp, ObjectType, Tree, TreeDiff, WriteObject};

#[derive(Debug, Clone, Default)]
pub struct Commit {
    hash: Option<ObjectHash>,
    pub tree: ObjectHash,
    /// Empty for a root commit.
    pub parents: Vec<ObjectHash>,
    pub author: CommitStamp,
    pub committer: CommitStamp,
    /// First line of the message.
    pub summary: BString,
    /// Rest of the message after the summary line.
    pub detail: BString,
    pub(crate) history: OnceCell<Vec<Commit>>,
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.tree == other.tree
            && self.parents == other.parents
            && self.author == other.author
            && self.committer == other.committer
            && self.summary == other.summary
            && self.detail == other.detail
    }
}

impl Eq for Commit {}

impl Display for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.hash {
            Some(hash) => write!(f, "{} {}", hash, self.summary),
            None => write!(f, "(unhashed) {}", self.summary),
        }
    }
}

impl Commit {
    /// An unhashed commit; call `rehash` before writing.
    pub fn new(
        tree: ObjectHash,
        parents: Vec<ObjectHash>,
        author: CommitStamp,
        committer: CommitStamp,
        summary: impl Into<BString>,
        detail: impl Into<BString>,
    ) -> Commit {
        Commit {
            hash: None,
            tree,
            parents,
            author,
            committer,
            summary: summary.into(),
            detail: detail.into(),
            history: OnceCell::new(),
        }
    }

    /// Loads the root tree of this commit.
    pub fn root_tree(&self, repository: &Repository) -> Result<Tree> {
        repository.tree(&self.tree)
    }

    /// Resolves `path` inside the root tree.
    pub fn find(&self, path: impl AsRef<[u8]>, repository: &Repository) -> Result<ObjectHash> {
        self.root_tree(repository)?.find(path, repository)
    }

    /// Diffs the trees of two commits; a missing commit counts as an empty tree.
    pub fn tree_diff(
        a: Option<&Commit>,
        b: Option<&Commit>,
        repository: &Repository,
    ) -> Result<TreeDiff> {
        let a_tree = a.map(|commit| commit.root_tree(repository)).transpose()?;
        let b_tree = b.map(|commit| commit.root_tree(repository)).transpose()?;
        tree_diff(a_tree.as_ref(), b_tree.as_ref(), repository)
    }
}

impl WriteObject for Commit {
    const TYPE: ObjectType = ObjectType::Commit;

    fn cached_hash(&self) -> Option<&ObjectHash> {
        self.hash.as_ref()
    }

    fn set_cached_hash(&mut self, hash: Option<ObjectHash>) {
        self.hash = hash;
        self.history = OnceCell::new();
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut result: Vec<u8> = Vec::with_capacity(
            256 + self.parents.len() * 48 + self.summary.len() + self.detail.len(),
        );

        result.push_str(format!("tree {}\n", self.tree));
        for parent in self.parents.iter() {
            result.push_str(format!("parent {parent}\n"));
        }

        result.push_str(b"author ");
        result.push_str(self.author.serialize()?);
        result.push_str(b"\ncommitter ");
        result.push_str(self.committer.serialize()?);
        result.push_str(b"\n\n");

        result.push_str(&self.summary);
        result.push_byte(b'\n');
        result.push_str(&self.detail);

        Ok(result)
    }

    fn unserialize(data: &[u8]) -> Result<Self> {
        let mut lines = data.split(|c| *c == b'\n');

        let mut tree = None;
        let mut parents = Vec::with_capacity(1);
        let mut author = None;
        let mut committer = None;

        for line in lines.by_ref() {
            if line.is_empty() {
                break;
            }

            // continuation lines of multi-line headers such as gpgsig
            if line.starts_with(b" ") {
                continue;
            }

            let (key, value) = line.split_once_str(b" ").ok_or_else(|| {
                Error::malformed(format!("invalid commit header line {:?}", line.as_bstr()))
            })?;

            match key {
                b"tree" => tree = Some(ObjectHash::from_hex(value)?),
                b"parent" => parents.push(ObjectHash::from_hex(value)?),
                b"author" => author = Some(CommitStamp::parse(value)?),
                b"committer" => committer = Some(CommitStamp::parse(value)?),
                _ => log::trace!("ignoring commit header {:?}", key.as_bstr()),
            }
        }

        let summary = lines.next().map(BString::from).unwrap_or_default();
        let detail = BString::from(lines.collect::<Vec<_>>().join(&b'\n'));

        let missing = |field: &str| Error::malformed(format!("commit without {field} header"));

        Ok(Commit::new(
            tree.ok_or_else(|| missing("tree"))?,
            parents,
            author.ok_or_else(|| missing("author"))?,
            committer.ok_or_else(|| missing("committer"))?,
            summary,
            detail,
        ))
    }
}
