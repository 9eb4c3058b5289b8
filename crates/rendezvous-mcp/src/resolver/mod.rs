//! Alias resolution: caller-supplied identifiers to canonical service names.

pub mod default;
pub mod table;

pub use table::*;
