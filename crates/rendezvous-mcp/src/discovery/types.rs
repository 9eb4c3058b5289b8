//! Shared types for discovery sources.

use std::path::PathBuf;

use crate::error::Result;
use crate::model::ServiceDescriptor;

/// Where a service descriptor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Registry,
    ProcessTable,
    Config,
    /// Registered by this process through `register_local_service`.
    Local,
}

/// Origin metadata including source path and human note.
#[derive(Debug, Clone)]
pub struct ServiceOrigin {
    pub source: SourceKind,
    pub path: Option<PathBuf>,
    pub note: Option<String>,
}

/// A candidate service together with its origin.
#[derive(Debug, Clone)]
pub struct DiscoveredService {
    pub descriptor: ServiceDescriptor,
    pub origin: ServiceOrigin,
}

impl DiscoveredService {
    pub fn new(descriptor: ServiceDescriptor, source: SourceKind) -> Self {
        Self {
            descriptor,
            origin: ServiceOrigin {
                source,
                path: None,
                note: None,
            },
        }
    }

    pub fn at(mut self, path: impl Into<PathBuf>) -> Self {
        self.origin.path = Some(path.into());
        self
    }

    pub fn noted(mut self, note: impl Into<String>) -> Self {
        self.origin.note = Some(note.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// One independent producer of candidate services.
///
/// A failing source must not affect the others; the aggregator logs the
/// error and moves on.
pub trait DiscoverySource: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn discover(&self) -> Result<Vec<DiscoveredService>>;
}
