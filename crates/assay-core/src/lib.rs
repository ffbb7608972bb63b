#![deny(missing_docs)]
#![doc = "Core error, plate geometry, statistics and unit types shared by the assay pipeline crates."]

pub mod errors;
pub mod plate;
pub mod serde;
pub mod stats;
pub mod units;

pub use errors::{AssayError, ErrorInfo};
pub use plate::{index_to_well, sortable_well, well_to_index, PlateFormat};
pub use stats::Summary;
