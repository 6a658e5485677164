use std::{cmp::Ordering, collections::BTreeMap, fmt::Display};

use bstr::{BStr, BString, ByteSlice, ByteVec};
use rustc_hash::FxHashSet;

use crate::{
    error::{Error, Result},
    repository::Repository,
    shared::{ObjectHash, HASH_LEN},
};

use super::{ObjectType, WriteObject};

pub const DIR_MODE: u32 = 0o40000;
pub const SUBMODULE_MODE: u32 = 0o160000;

/// One `<mode> <name>\0<hash>` entry of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub mode: u32,
    pub name: BString,
    pub object: ObjectHash,
}

impl TreeNode {
    pub fn new(mode: u32, name: impl Into<BString>, object: ObjectHash) -> TreeNode {
        TreeNode {
            mode,
            name: name.into(),
            object,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & DIR_MODE != 0
    }

    /// A gitlink: a commit of another repository, never descended into.
    pub fn is_submodule(&self) -> bool {
        self.mode == SUBMODULE_MODE
    }

    /// A directory that can be descended into.
    pub fn is_tree(&self) -> bool {
        self.is_dir() && !self.is_submodule()
    }
}

impl Display for TreeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_submodule() {
            "commit"
        } else if self.is_dir() {
            "tree"
        } else {
            "blob"
        };
        write!(f, "{:06o} {} {}\t{}", self.mode, kind, self.object, self.name)
    }
}

/// Directory listing. Nodes keep insertion order in memory and are sorted on write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    hash: Option<ObjectHash>,
    nodes: Vec<TreeNode>,
}

/// Result of [`Tree::update_node`]: the new root plus every new subtree, innermost first.
#[derive(Debug, Clone)]
pub struct TreeUpdate {
    pub root: Tree,
    pub created: Vec<Tree>,
}

impl TreeUpdate {
    /// Writes the new subtrees and then the root. Returns the root hash.
    pub fn write(&self, repository: &Repository) -> Result<ObjectHash> {
        for tree in self.created.iter() {
            tree.write(repository.store())?;
        }
        self.root.write(repository.store())?;
        self.root.hash()
    }
}

impl Tree {
    pub fn new() -> Tree {
        Tree::default()
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn node(&self, name: impl AsRef<[u8]>) -> Option<&TreeNode> {
        let name = name.as_ref();
        self.nodes.iter().find(|node| node.name == name)
    }

    /// Inserts or replaces the entry with the same name. Clears the cached hash.
    pub fn set_node(&mut self, node: TreeNode) {
        match self.nodes.iter_mut().find(|existing| existing.name == node.name) {
            Some(existing) => *existing = node,
            None => self.nodes.push(node),
        }
        self.hash = None;
    }

    pub fn remove_node(&mut self, name: impl AsRef<[u8]>) -> Option<TreeNode> {
        let name = name.as_ref();
        let position = self.nodes.iter().position(|node| node.name == name)?;
        self.hash = None;
        Some(self.nodes.remove(position))
    }

    /// Resolves a `/` separated path below this tree. The empty path yields the tree itself.
    pub fn find(&self, path: impl AsRef<[u8]>, repository: &Repository) -> Result<ObjectHash> {
        let path = path.as_ref();
        let segments: Vec<&[u8]> = split_path(path).collect();
        self.find_segments(&segments, path.as_bstr(), repository)
    }

    fn find_segments(
        &self,
        segments: &[&[u8]],
        path: &BStr,
        repository: &Repository,
    ) -> Result<ObjectHash> {
        let Some((name, rest)) = segments.split_first() else {
            return self.hash();
        };

        let node = self
            .node(name)
            .ok_or_else(|| Error::PathNotFound(path.to_string()))?;

        if rest.is_empty() {
            return Ok(node.object);
        }

        if !node.is_tree() {
            return Err(Error::InvalidPath(format!(
                "{path}: {} is not a directory",
                node.name
            )));
        }

        repository
            .tree(&node.object)?
            .find_segments(rest, path, repository)
    }

    /// Every leaf below this tree by full path. Submodules are leaves, marked by a trailing `/`.
    pub fn list_recursive(&self, repository: &Repository) -> Result<BTreeMap<BString, ObjectHash>> {
        let mut result = BTreeMap::new();
        self.collect_leaves(b"", repository, &mut result)?;
        Ok(result)
    }

    fn collect_leaves(
        &self,
        prefix: &[u8],
        repository: &Repository,
        result: &mut BTreeMap<BString, ObjectHash>,
    ) -> Result<()> {
        for node in self.nodes.iter() {
            let mut path = BString::from(prefix);
            path.push_str(&node.name);

            if node.is_submodule() {
                path.push_byte(b'/');
                result.insert(path, node.object);
            } else if node.is_dir() {
                path.push_byte(b'/');
                repository
                    .tree(&node.object)?
                    .collect_leaves(&path, repository, result)?;
            } else {
                result.insert(path, node.object);
            }
        }

        Ok(())
    }

    /// Sets (or with `mode == 0` removes) the leaf at `path`, creating directories on the way.
    ///
    /// Neither `self` nor any stored subtree is modified: each tree on the path is copied,
    /// changed and rehashed bottom-up.
    pub fn update_node(
        &self,
        path: impl AsRef<[u8]>,
        mode: u32,
        object: ObjectHash,
        repository: &Repository,
    ) -> Result<TreeUpdate> {
        let path = path.as_ref();
        let segments: Vec<&[u8]> = split_path(path).collect();
        if segments.is_empty() {
            return Err(Error::InvalidPath("empty path".to_string()));
        }

        let mut root = self.clone();
        let mut created = Vec::new();
        root.update_segments(&segments, mode, object, path.as_bstr(), repository, &mut created)?;
        root.rehash()?;

        Ok(TreeUpdate { root, created })
    }

    fn update_segments(
        &mut self,
        segments: &[&[u8]],
        mode: u32,
        object: ObjectHash,
        path: &BStr,
        repository: &Repository,
        created: &mut Vec<Tree>,
    ) -> Result<()> {
        let Some((name, rest)) = segments.split_first() else {
            return Ok(());
        };

        if rest.is_empty() {
            if mode != 0 {
                self.set_node(TreeNode::new(mode, *name, object));
            } else {
                self.remove_node(name);
            }
            return Ok(());
        }

        let mut subtree = match self.node(name) {
            Some(node) if node.is_tree() => repository.tree(&node.object)?,
            Some(node) => {
                return Err(Error::InvalidPath(format!(
                    "{path}: {} is not a directory",
                    node.name
                )))
            }
            // nothing to remove below a directory that does not exist
            None if mode == 0 => return Ok(()),
            None => Tree::new(),
        };

        subtree.update_segments(rest, mode, object, path, repository, created)?;
        let hash = subtree.rehash()?;
        self.set_node(TreeNode::new(DIR_MODE, *name, hash));
        created.push(subtree);

        Ok(())
    }

    /// Git's entry order: bytewise by name, directories compare as if suffixed by `/`.
    fn canonical_order(a: &TreeNode, b: &TreeNode) -> Ordering {
        let len = a.name.len().min(b.name.len());
        match a.name[..len].cmp(&b.name[..len]) {
            Ordering::Equal => {}
            other => return other,
        }

        let terminator = |node: &TreeNode| match node.name.get(len) {
            Some(c) => *c,
            None if node.is_tree() => b'/',
            None => 0,
        };
        terminator(a).cmp(&terminator(b))
    }
}

impl WriteObject for Tree {
    const TYPE: ObjectType = ObjectType::Tree;

    fn cached_hash(&self) -> Option<&ObjectHash> {
        self.hash.as_ref()
    }

    fn set_cached_hash(&mut self, hash: Option<ObjectHash>) {
        self.hash = hash;
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut sorted: Vec<&TreeNode> = self.nodes.iter().collect();
        sorted.sort_by(|a, b| Tree::canonical_order(a, b));

        let mut buf = Vec::with_capacity(self.nodes.len() * (HASH_LEN + 32));
        for node in sorted {
            buf.push_str(format!("{:o} ", node.mode));
            buf.push_str(&node.name);
            buf.push_byte(b'\0');
            buf.extend_from_slice(node.object.as_bytes());
        }

        Ok(buf)
    }

    fn unserialize(data: &[u8]) -> Result<Self> {
        let mut tree = Tree::new();
        let mut names: FxHashSet<&[u8]> = FxHashSet::default();
        let mut position = 0;

        while position < data.len() {
            let null_terminator_index = memchr::memchr(b'\0', &data[position..])
                .ok_or_else(|| Error::malformed("tree entry without NUL terminator"))?;
            let text = &data[position..position + null_terminator_index];

            let hash_start = position + null_terminator_index + 1;
            let hash = data
                .get(hash_start..hash_start + HASH_LEN)
                .ok_or_else(|| Error::malformed("tree entry hash is truncated"))?;

            let (mode, name) = text.split_once_str(b" ").ok_or_else(|| {
                Error::malformed(format!("tree entry without mode: {:?}", text.as_bstr()))
            })?;
            let mode = mode
                .to_str()
                .ok()
                .and_then(|mode| u32::from_str_radix(mode, 8).ok())
                .ok_or_else(|| {
                    Error::malformed(format!("invalid tree entry mode {:?}", mode.as_bstr()))
                })?;

            if !names.insert(name) {
                return Err(Error::malformed(format!(
                    "duplicate tree entry {:?}",
                    name.as_bstr()
                )));
            }

            tree.nodes.push(TreeNode::new(mode, name, ObjectHash::try_from(hash)?));
            position = hash_start + HASH_LEN;
        }

        Ok(tree)
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for node in self.nodes.iter() {
            writeln!(f, "{node}")?;
        }
        Ok(())
    }
}

fn split_path(path: &[u8]) -> impl Iterator<Item = &[u8]> {
    path.split(|c| *c == b'/').filter(|segment| !segment.is_empty())
}
