pub mod export;
pub mod inspect;
pub mod process;
pub mod refit;

use std::path::PathBuf;

use assay_arch::LoadOptions;

/// Scratch override shared by commands that read archives.
pub fn load_options(scratch: &Option<PathBuf>) -> LoadOptions {
    LoadOptions {
        scratch_root: scratch.clone(),
    }
}
