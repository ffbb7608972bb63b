//! Project archives: one ZIP bundle holding the project configuration,
//! the processed container and every plate layout.
//!
//! Tables are CSV with list-valued cells (see [`cell`]); archives written
//! by older releases are upgraded on load (see [`compat`]).

pub mod archive;
pub mod cell;
pub mod compat;
pub mod frame;
pub mod scratch;
mod tables;

pub use archive::{archive_digest, load_archive, save_archive, LoadOptions, LoadedArchive};
pub use frame::Frame;
pub use scratch::{scratch_root, Scratch};
