//! Service and tool descriptor types plus naming helpers.

pub mod naming;
pub mod types;

pub use naming::*;
pub use types::*;
