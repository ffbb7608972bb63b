//! Assay processing: projects, references, normalisation and fits.
//!
//! [`run_pipeline`] turns a [`Project`] into a [`Container`]; [`refit`]
//! edits a processed record in place, and [`export`] writes result tables.

pub mod container;
pub mod export;
pub mod family;
pub mod pipeline;
pub mod processed;
pub mod project;
pub mod references;
pub mod refit;

pub use container::{Container, PlateRecord, PlateWarning, SampleMeta};
pub use export::{upload_rows, write_results, write_results_csv, write_upload_csv, UploadRow};
pub use family::{AssayFamily, FamilyKind};
pub use pipeline::{run_pipeline, PipelineHandle, PipelineOpts, Progress};
pub use processed::{Derived, Processed, SampleRecord, Show};
pub use project::{
    merge_details, AssayCategory, Details, DetailsOverlay, PlateSpec, Project, SampleSource,
};
pub use references::{compute_references, References};
