use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

use fs4::FileExt;

/// An open file holding an advisory lock until dropped.
pub(crate) struct LockedFile {
    file: File,
}

impl LockedFile {
    /// Opens `path` for reading under a shared lock.
    pub(crate) fn open_shared(path: &Path) -> io::Result<LockedFile> {
        let file = File::open(path)?;
        FileExt::lock_shared(&file)?;
        Ok(LockedFile { file })
    }

    /// Opens (creating if needed) `path` for writing under an exclusive lock.
    /// The file is not truncated until the lock is held.
    pub(crate) fn open_exclusive(path: &Path) -> io::Result<LockedFile> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        FileExt::lock_exclusive(&file)?;
        Ok(LockedFile { file })
    }

    pub(crate) fn file(&self) -> &File {
        &self.file
    }

    pub(crate) fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::debug!("failed to release file lock: {e}");
        }
    }
}
