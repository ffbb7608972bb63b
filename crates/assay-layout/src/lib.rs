//! Liquid-handler transfers and well layouts.
//!
//! [`transfer`] parses transfer files into a per-plate well map,
//! [`layout`] holds the user-editable well-type map and [`resolve`] joins
//! both into the metadata the pipeline processes.

pub mod layout;
pub mod resolve;
pub mod transfer;

pub use layout::{Entity, Layout, WellEntry, WellType};
pub use resolve::{resolve_plate, ResolvedPlate, ResolvedWell};
pub use transfer::{
    load_transfer_rules, parse_transfer, parse_transfer_table, Column, ParsedTransfer, Transfer,
    TransferLayout, TransferRow, TransferRules,
};
