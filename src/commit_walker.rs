use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    error::{Error, Result},
    objs::{Commit, WriteObject},
    repository::Repository,
    shared::ObjectHash,
};

impl Commit {
    /// This commit and all of its ancestors, each commit before any of its ancestors.
    ///
    /// The order runs newest to oldest: the tip comes first and the root commits last.
    /// Commits are appended as they become ready and never prepended.
    ///
    /// Independent branches are ordered by discovery, not by commit time, so the order
    /// between them depends on parent order. The result is computed once per instance.
    pub fn history(&self, repository: &Repository) -> Result<&[Commit]> {
        self.history
            .get_or_try_init(|| topo_order(self, repository))
            .map(|commits| commits.as_slice())
    }
}

fn topo_order(tip: &Commit, repository: &Repository) -> Result<Vec<Commit>> {
    let tip_hash = tip.hash()?;

    // pass 1: count how many reachable children reference each commit
    let mut commits: FxHashMap<ObjectHash, Commit> = FxHashMap::default();
    let mut references: FxHashMap<ObjectHash, usize> = FxHashMap::default();
    let mut seen: FxHashSet<ObjectHash> = FxHashSet::default();
    let mut queue = VecDeque::from([tip_hash]);
    seen.insert(tip_hash);

    let mut tip = tip.clone();
    tip.history = Default::default();
    commits.insert(tip_hash, tip);

    while let Some(hash) = queue.pop_front() {
        let parents = commits
            .get(&hash)
            .map(|commit| commit.parents.clone())
            .unwrap_or_default();

        for parent in parents {
            *references.entry(parent).or_default() += 1;
            if seen.insert(parent) {
                commits.insert(parent, repository.commit(&parent)?);
                queue.push_back(parent);
            }
        }
    }

    log::debug!(
        "history of {}: {} reachable commits",
        tip_hash,
        commits.len()
    );

    // pass 2: emit a commit once every child referencing it has been emitted
    let mut result = Vec::with_capacity(commits.len());
    let mut stack = vec![tip_hash];

    while let Some(hash) = stack.pop() {
        let commit = commits
            .remove(&hash)
            .ok_or_else(|| Error::InvalidState(format!("commit {hash} visited twice")))?;

        for parent in commit.parents.iter().rev() {
            if let Some(count) = references.get_mut(parent) {
                *count -= 1;
                if *count == 0 {
                    stack.push(*parent);
                }
            }
        }

        result.push(commit);
    }

    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::TestRepo;

    fn position(history: &[Commit], hash: &ObjectHash) -> usize {
        history
            .iter()
            .position(|commit| commit.hash().unwrap() == *hash)
            .unwrap()
    }

    #[test]
    fn diamond() {
        let repo = TestRepo::new();
        let g = repo.commit_files(&[], &[]);
        let p1 = repo.commit_files(&[("a", repo.write_blob(b"a"))], &[g]);
        let p2 = repo.commit_files(&[("b", repo.write_blob(b"b"))], &[g]);
        let c = repo.commit_files(&[], &[p1, p2]);

        let commit = repo.repository().commit(&c).unwrap();
        let history = commit.history(repo.repository()).unwrap();

        assert_eq!(history.len(), 4);
        assert_eq!(history.iter().filter(|x| x.hash().unwrap() == g).count(), 1);
        assert_eq!(position(history, &c), 0);
        assert_eq!(position(history, &g), 3);
        assert!(position(history, &c) < position(history, &p1));
        assert!(position(history, &c) < position(history, &p2));
        assert!(position(history, &p1) < position(history, &g));
        assert!(position(history, &p2) < position(history, &g));
    }

    #[test]
    fn uneven_branches() {
        // c -> (m1 -> m2 -> base), (s1 -> base)
        let repo = TestRepo::new();
        let base = repo.commit_files(&[], &[]);
        let m2 = repo.commit_files(&[("m2", repo.write_blob(b"m2"))], &[base]);
        let m1 = repo.commit_files(&[("m1", repo.write_blob(b"m1"))], &[m2]);
        let s1 = repo.commit_files(&[("s1", repo.write_blob(b"s1"))], &[base]);
        let c = repo.commit_files(&[], &[m1, s1]);

        let commit = repo.repository().commit(&c).unwrap();
        let history = commit.history(repo.repository()).unwrap();
        let hashes: Vec<_> = history.iter().map(|x| x.hash().unwrap()).collect();

        assert_eq!(hashes.len(), 5);
        for (child, parent) in [(c, m1), (c, s1), (m1, m2), (m2, base), (s1, base)] {
            assert!(position(history, &child) < position(history, &parent));
        }
        assert_eq!(*hashes.last().unwrap(), base);
    }

    #[test]
    fn root_commit_history_is_itself() {
        let repo = TestRepo::new();
        let root = repo.commit_files(&[], &[]);
        let commit = repo.repository().commit(&root).unwrap();

        let history = commit.history(repo.repository()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].hash().unwrap(), root);
    }

    #[test]
    fn history_is_cached_per_instance() {
        let repo = TestRepo::new();
        let root = repo.commit_files(&[], &[]);
        let tip = repo.commit_files(&[], &[root]);
        let commit = repo.repository().commit(&tip).unwrap();

        let first = commit.history(repo.repository()).unwrap().as_ptr();
        // a descendant written later is not observed by the cached result
        repo.commit_files(&[("z", repo.write_blob(b"z"))], &[tip]);
        let second = commit.history(repo.repository()).unwrap();
        assert_eq!(first, second.as_ptr());
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn missing_parent_fails() {
        let repo = TestRepo::new();
        let dangling = ObjectHash::from([0xab; 20]);
        let tip = repo.commit_files(&[], &[dangling]);
        let commit = repo.repository().commit(&tip).unwrap();

        assert!(matches!(
            commit.history(repo.repository()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn unhashed_commit_has_no_history() {
        let repo = TestRepo::new();
        let commit = Commit::default();
        assert!(matches!(
            commit.history(repo.repository()),
            Err(Error::InvalidState(_))
        ));
    }
}
