use std::{
    cmp::Ordering,
    collections::BTreeMap,
    iter::Peekable,
};

use bstr::BString;

use crate::{error::Result, repository::Repository, shared::ObjectHash};

use super::Tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeChange {
    /// Only in the old tree.
    Removed,
    /// Only in the new tree.
    Added,
    /// In both, pointing at different objects.
    Changed,
}

impl TreeChange {
    /// Bit set of the sides the path differs on: old = 1, new = 2.
    pub fn bits(&self) -> u8 {
        match self {
            TreeChange::Removed => 0x01,
            TreeChange::Added => 0x02,
            TreeChange::Changed => 0x03,
        }
    }
}

pub type TreeDiff = BTreeMap<BString, TreeChange>;

/// Compares the recursive listings of two trees. A missing tree counts as empty and
/// unchanged paths are omitted.
pub fn tree_diff(a: Option<&Tree>, b: Option<&Tree>, repository: &Repository) -> Result<TreeDiff> {
    let a_blobs = match a {
        Some(tree) => tree.list_recursive(repository)?,
        None => BTreeMap::new(),
    };
    let b_blobs = match b {
        Some(tree) => tree.list_recursive(repository)?,
        None => BTreeMap::new(),
    };

    Ok(merge_listings(a_blobs.into_iter(), b_blobs.into_iter()))
}

/// Merge-join over two listings sorted by path.
fn merge_listings<A, B>(a: A, b: B) -> TreeDiff
where
    A: Iterator<Item = (BString, ObjectHash)>,
    B: Iterator<Item = (BString, ObjectHash)>,
{
    let mut a: Peekable<A> = a.peekable();
    let mut b: Peekable<B> = b.peekable();
    let mut changes = TreeDiff::new();

    loop {
        let order = match (a.peek(), b.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((a_path, _)), Some((b_path, _))) => a_path.cmp(b_path),
        };

        match order {
            Ordering::Less => {
                if let Some((path, _)) = a.next() {
                    changes.insert(path, TreeChange::Removed);
                }
            }
            Ordering::Greater => {
                if let Some((path, _)) = b.next() {
                    changes.insert(path, TreeChange::Added);
                }
            }
            Ordering::Equal => {
                if let (Some((path, a_hash)), Some((_, b_hash))) = (a.next(), b.next()) {
                    if a_hash != b_hash {
                        changes.insert(path, TreeChange::Changed);
                    }
                }
            }
        }
    }

    changes
}

impl Tree {
    /// See [`tree_diff`].
    pub fn diff(a: Option<&Tree>, b: Option<&Tree>, repository: &Repository) -> Result<TreeDiff> {
        tree_diff(a, b, repository)
    }
}
