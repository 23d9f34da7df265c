use crate::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Clone, Copy, Debug)]
pub struct AtomicWriteOptions {
    pub sync:        bool,
    pub create_dirs: bool,
}

impl Default for AtomicWriteOptions {
    fn default() -> Self { Self::new() }
}

impl AtomicWriteOptions {
    pub fn new() -> Self {
        Self {
            sync:        true,
            create_dirs: true,
        }
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }
}

pub fn atomic_write(
    path: impl AsRef<Path>,
    content: &[u8],
    options: AtomicWriteOptions,
) -> Result<()> {
    let path = path.as_ref();
    let parent = path
        .parent()
        .ok_or_else(|| Error::NoParent(path.to_path_buf()))?;

    if options.create_dirs {
        fs::create_dir_all(parent).map_err(|e| Error::Write {
            path:   parent.to_path_buf(),
            source: e,
        })?;
    }

    let tmp_path = parent.join(format!(".tmp.{}.sxflow", uuid::Uuid::new_v4()));

    let write_tmp = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content)?;
        if options.sync {
            file.sync_all()?;
        }
        Ok(())
    };

    write_tmp().map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        Error::Write {
            path:   tmp_path.clone(),
            source: e,
        }
    })?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        Error::Write {
            path:   path.to_path_buf(),
            source: e,
        }
    })?;

    Ok(())
}

/// Read a file written by [`atomic_write`]. A missing file yields `None`.
pub fn atomic_read(path: impl AsRef<Path>) -> Result<Option<Vec<u8>>> {
    let path = path.as_ref();
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Read {
            path:   path.to_path_buf(),
            source: e,
        }),
    }
}
