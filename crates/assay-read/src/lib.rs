//! Reading raw plate data from instrument exports.
//!
//! [`readers`] holds one reader per supported device; [`rules`] and
//! [`locate`] handle foreign layouts described by a user rule set.

pub mod locate;
pub mod readers;
pub mod rules;
pub mod signal;
pub mod table;

pub use locate::{extract, locate, verify, Block, DatasetLocation, ParsedDataset};
pub use readers::{check_supported, read_raw, reader_for, Device, ReadContext, ReaderFn};
pub use rules::{load_rules, RuleSet, RuleSetFile};
pub use signal::{CapillaryTrace, RawSignal, Series};
pub use table::Table;
