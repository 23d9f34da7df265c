use crate::{Error, Result};
use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};

/// An exclusive advisory lock on a file.
///
/// The lock belongs to the open file handle, so two `LockFile`s on the same
/// path conflict even inside one process, and the operating system drops the
/// lock when the holding process dies.
#[derive(Debug)]
pub struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    fn open(path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Write {
                path:   parent.to_path_buf(),
                source: e,
            })?;
        }
        File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::Write {
                path:   path.to_path_buf(),
                source: e,
            })
    }

    /// Block until the lock is acquired.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = Self::open(&path)?;
        file.lock_exclusive().map_err(|e| Error::Lock {
            path:   path.clone(),
            source: e,
        })?;
        Ok(Self { file, path })
    }

    /// Acquire the lock without waiting. Returns [`Error::Contended`] if it is
    /// already held.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = Self::open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file, path }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(Error::Contended { path })
            }
            Err(e) => Err(Error::Lock { path, source: e }),
        }
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Unlock and delete the lock file.
    ///
    /// Only safe when every opener of this path coordinates through an outer
    /// lock, otherwise a concurrent opener may lock an unlinked inode.
    pub fn remove(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Write { path, source: e }),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
