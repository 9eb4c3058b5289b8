//! Peer discovery and tool invocation for an assistant-protocol server.
//!
//! [`DiscoveryService`] finds peer services (registry file, process table,
//! static config), gathers their tools into one catalog, and routes tool calls
//! to the right peer by canonical name or alias over HTTP or a stdio
//! subprocess.

pub mod catalog;
pub mod config;
pub mod discovery;
pub mod error;
pub mod invoke;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod service;

#[cfg(test)]
mod test_support;

pub use error::{DiscoveryError, Result};
pub use service::{DiscoveryService, DiscoverySettings};
