//! Model and keyword asset materialization
//!
//! Engines need their model files on the regular filesystem. Packaged assets
//! are copied once into the private data directory and reused afterwards.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Copies packaged assets into a private directory
#[derive(Debug, Clone)]
pub struct AssetLoader {
    source_dir: PathBuf,
    target_dir: PathBuf,
}

impl AssetLoader {
    #[must_use]
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            target_dir: target_dir.into(),
        }
    }

    /// Directory assets are copied into
    #[must_use]
    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Make `name` available under the target directory
    ///
    /// Files and directories are copied recursively. An existing target is
    /// returned as is. Copies go through a `.partial` sibling that is renamed
    /// into place, so an interrupted copy is never reused.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceInit`] if the packaged asset is missing and
    /// [`Error::Asset`] if copying fails
    pub fn copy_if_absent(&self, name: &str) -> Result<PathBuf> {
        let target = self.target_dir.join(name);
        if target.exists() {
            tracing::debug!(asset = name, path = %target.display(), "asset already present");
            return Ok(target);
        }

        let source = self.source_dir.join(name);
        if !source.exists() {
            return Err(Error::ResourceInit(format!(
                "asset {name} not found in {}",
                self.source_dir.display()
            )));
        }

        let partial = self.target_dir.join(format!("{name}.partial"));
        if partial.exists() {
            remove_path(&partial)?;
        }

        std::fs::create_dir_all(&self.target_dir)
            .map_err(|e| Error::Asset(format!("cannot create {}: {e}", self.target_dir.display())))?;
        copy_recursive(&source, &partial)
            .map_err(|e| Error::Asset(format!("cannot copy {name}: {e}")))?;
        std::fs::rename(&partial, &target)
            .map_err(|e| Error::Asset(format!("cannot finalize {name}: {e}")))?;

        tracing::info!(asset = name, path = %target.display(), "asset materialized");
        Ok(target)
    }
}

fn copy_recursive(src: &Path, dest: &Path) -> std::io::Result<()> {
    if !src.is_dir() {
        std::fs::copy(src, dest)?;
        return Ok(());
    }

    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        copy_recursive(&entry.path(), &dest.join(entry.file_name()))?;
    }

    Ok(())
}

fn remove_path(path: &Path) -> Result<()> {
    let removed = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    removed.map_err(|e| Error::Asset(format!("cannot remove {}: {e}", path.display())))
}
