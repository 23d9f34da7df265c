use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// A staging directory next to its destination.
///
/// Files are written under [`Workspace::path`]; [`Workspace::commit`] renames
/// each staged file into the destination directory. An uncommitted workspace
/// removes its staging directory on drop.
pub struct Workspace {
    staging_path:     PathBuf,
    destination_path: PathBuf,
    committed:        bool,
}

impl Workspace {
    /// Create a fresh staging directory inside `destination`.
    pub fn new(destination: impl AsRef<Path>) -> Result<Self> {
        let destination_path = destination.as_ref().to_path_buf();
        let staging_path =
            destination_path.join(format!(".staging.{}", uuid::Uuid::new_v4().simple()));

        std::fs::create_dir_all(&staging_path).map_err(|e| Error::Write {
            path:   staging_path.clone(),
            source: e,
        })?;

        Ok(Self {
            staging_path,
            destination_path,
            committed: false,
        })
    }

    pub fn path(&self) -> &Path { &self.staging_path }

    pub fn destination(&self) -> &Path { &self.destination_path }

    /// Move every staged file into the destination, replacing files of the
    /// same name. Returns the final paths.
    pub fn commit(mut self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.staging_path).map_err(|e| Error::Read {
            path:   self.staging_path.clone(),
            source: e,
        })?;

        let mut placed = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::Read {
                path:   self.staging_path.clone(),
                source: e,
            })?;
            let target = self.destination_path.join(entry.file_name());
            std::fs::rename(entry.path(), &target).map_err(|e| Error::Write {
                path:   target.clone(),
                source: e,
            })?;
            placed.push(target);
        }

        let _ = std::fs::remove_dir(&self.staging_path);
        self.committed = true;
        placed.sort();
        Ok(placed)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_dir_all(&self.staging_path);
        }
    }
}
