use std::{
    io::{BufReader, ErrorKind, Read},
    path::Path,
};

use bstr::{io::BufReadExt, BString, ByteSlice};

use crate::{
    error::{Error, Result},
    lock::LockedFile,
    shared::ObjectHash,
};

/// A `<hash> <name>` line of `packed-refs`, with the peeled target of annotated tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedRef {
    pub name: BString,
    pub hash: ObjectHash,
    pub peeled: Option<ObjectHash>,
}

/// Hash the branch `name` points to, from `refs/heads/<name>` or `packed-refs`.
pub fn resolve_tip(repository_path: &Path, name: &str) -> Result<ObjectHash> {
    if !is_branch_name(name) {
        log::debug!("refusing to resolve branch name {name:?}");
        return Err(Error::NoSuchBranch(name.to_string()));
    }

    let subpath = format!("refs/heads/{name}");

    if let Some(hash) = read_loose_ref(repository_path, &subpath)? {
        log::debug!("branch {name} resolved from loose ref: {hash}");
        return Ok(hash);
    }

    let packed = read_packed_refs(repository_path)?;
    if let Some(packed_ref) = packed.into_iter().find(|r| r.name == subpath.as_bytes()) {
        log::debug!("branch {name} resolved from packed-refs: {}", packed_ref.hash);
        return Ok(packed_ref.hash);
    }

    Err(Error::NoSuchBranch(name.to_string()))
}

/// Names stay below `refs/heads`: no absolute paths, no `.` or `..` segments.
fn is_branch_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['\\', '\0'])
        && name
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

fn read_loose_ref(repository_path: &Path, subpath: &str) -> Result<Option<ObjectHash>> {
    let path = repository_path.join(subpath);
    if !path.is_file() {
        return Ok(None);
    }

    let mut content = Vec::new();
    LockedFile::open_shared(&path)?
        .file_mut()
        .read_to_end(&mut content)?;

    ObjectHash::from_hex(content.trim()).map(Some)
}

/// All entries of `packed-refs`. A missing file has no entries.
pub fn read_packed_refs(repository_path: &Path) -> Result<Vec<PackedRef>> {
    let locked = match LockedFile::open_shared(&repository_path.join("packed-refs")) {
        Ok(locked) => locked,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut result: Vec<PackedRef> = Vec::new();
    for line in BufReader::new(locked.file()).byte_lines() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() || line.starts_with(b"#") {
            continue;
        }

        if let Some(peeled) = line.strip_prefix(b"^") {
            let peeled = ObjectHash::from_hex(peeled)?;
            match result.last_mut() {
                Some(last) => last.peeled = Some(peeled),
                None => return Err(Error::malformed("packed-refs starts with a peeled line")),
            }
            continue;
        }

        let (hash, name) = line.split_once_str(b" ").ok_or_else(|| {
            Error::malformed(format!("invalid packed-refs line {:?}", line.as_bstr()))
        })?;

        result.push(PackedRef {
            name: BString::from(name),
            hash: ObjectHash::from_hex(hash)?,
            peeled: None,
        });
    }

    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;

    const A: &str = "3b18e512dba79e4c8300dd08aeb37f8e728b8dad";
    const B: &str = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391";
    const C: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

    fn repo_with_packed_refs() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("packed-refs"),
            format!(
                "# pack-refs with: peeled fully-peeled sorted \n{A} refs/heads/main\n{B} refs/tags/v1\n^{C}\n{C} refs/heads/feature/x\n"
            ),
        )
        .unwrap();
        dir
    }

    #[test]
    fn loose_ref_wins() {
        let dir = repo_with_packed_refs();
        std::fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        std::fs::write(dir.path().join("refs/heads/main"), format!("{B}\n")).unwrap();

        assert_eq!(resolve_tip(dir.path(), "main").unwrap().to_string(), B);
    }

    #[test]
    fn packed_ref_fallback() {
        let dir = repo_with_packed_refs();
        assert_eq!(resolve_tip(dir.path(), "main").unwrap().to_string(), A);
        assert_eq!(resolve_tip(dir.path(), "feature/x").unwrap().to_string(), C);
    }

    #[test]
    fn unknown_branch() {
        let dir = repo_with_packed_refs();
        assert!(matches!(
            resolve_tip(dir.path(), "v1"),
            Err(Error::NoSuchBranch(_))
        ));

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_tip(empty.path(), "main"),
            Err(Error::NoSuchBranch(_))
        ));
    }

    #[test]
    fn branch_names_cannot_leave_refs_heads() {
        let dir = repo_with_packed_refs();
        std::fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        std::fs::create_dir_all(dir.path().join("objects")).unwrap();
        std::fs::write(dir.path().join("objects/HEAD"), format!("{A}\n")).unwrap();
        std::fs::write(dir.path().join("refs/heads/main"), format!("{B}\n")).unwrap();

        for name in [
            "../../objects/HEAD",
            "feature/../../../objects/HEAD",
            "./main",
            "/main",
            "feature//x",
            "",
        ] {
            assert!(
                matches!(resolve_tip(dir.path(), name), Err(Error::NoSuchBranch(_))),
                "{name:?} resolved"
            );
        }

        let absolute = dir.path().join("objects/HEAD");
        assert!(matches!(
            resolve_tip(dir.path(), absolute.to_str().unwrap()),
            Err(Error::NoSuchBranch(_))
        ));

        assert_eq!(resolve_tip(dir.path(), "feature/x").unwrap().to_string(), C);
    }

    #[test]
    fn peeled_tags() {
        let dir = repo_with_packed_refs();
        let refs = read_packed_refs(dir.path()).unwrap();

        assert_eq!(refs.len(), 3);
        assert_eq!(refs[1].name, "refs/tags/v1");
        assert_eq!(refs[1].peeled.unwrap().to_string(), C);
        assert_eq!(refs[0].peeled, None);
    }

    #[test]
    fn corrupt_loose_ref() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        std::fs::write(dir.path().join("refs/heads/main"), "ref: refs/heads/other\n").unwrap();

        assert!(matches!(
            resolve_tip(dir.path(), "main"),
            Err(Error::MalformedFormat(_))
        ));
    }
}
