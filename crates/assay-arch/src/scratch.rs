//! Scratch directories for unpacking archives.

use std::fs;
use std::path::{Path, PathBuf};

use assay_core::{AssayError, ErrorInfo};
use tracing::debug;

/// `~/.assay/scratch`, or `override_root` when given.
pub fn scratch_root(override_root: Option<&Path>) -> Result<PathBuf, AssayError> {
    if let Some(root) = override_root {
        return Ok(root.to_path_buf());
    }
    dirs::home_dir()
        .map(|home| home.join(".assay").join("scratch"))
        .ok_or_else(|| {
            AssayError::Io(
                ErrorInfo::new("archive.scratch_home", "home directory not found")
                    .with_hint("pass an explicit scratch directory"),
            )
        })
}

/// A directory that is emptied on creation and removed by [`Scratch::finish`].
///
/// On error it is left in place for inspection and scrubbed on next use.
#[derive(Debug)]
pub struct Scratch {
    path: PathBuf,
}

impl Scratch {
    pub fn create(root: &Path, name: &str) -> Result<Self, AssayError> {
        let path = root.join(name);
        if path.exists() {
            debug!(path = %path.display(), "scrubbing scratch directory");
            fs::remove_dir_all(&path).map_err(|err| AssayError::io("archive.scratch_scrub", &path, err))?;
        }
        fs::create_dir_all(&path).map_err(|err| AssayError::io("archive.scratch_create", &path, err))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn finish(self) -> Result<(), AssayError> {
        fs::remove_dir_all(&self.path).map_err(|err| AssayError::io("archive.scratch_remove", &self.path, err))
    }
}
