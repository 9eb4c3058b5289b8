//! Registry-file and static-config discovery sources.

use std::fs;
use std::path::PathBuf;

use super::types::{DiscoveredService, DiscoverySource, SourceKind};
use crate::config::{StaticConfig, first_existing};
use crate::error::{DiscoveryError, Result};
use crate::registry::ServiceRegistry;

/// Every entry of the persisted registry.
pub struct RegistrySource {
    registry: ServiceRegistry,
}

impl RegistrySource {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self { registry }
    }
}

impl DiscoverySource for RegistrySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Registry
    }

    fn discover(&self) -> Result<Vec<DiscoveredService>> {
        let path = self.registry.path().to_path_buf();
        Ok(self
            .registry
            .try_load()?
            .into_iter()
            .map(|d| DiscoveredService::new(d, SourceKind::Registry).at(path.clone()))
            .collect())
    }
}

/// `externalServices` of the first static config file that exists.
pub struct ConfigSource {
    candidates: Vec<PathBuf>,
}

impl ConfigSource {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }
}

impl DiscoverySource for ConfigSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Config
    }

    fn discover(&self) -> Result<Vec<DiscoveredService>> {
        let Some(path) = first_existing(&self.candidates) else {
            tracing::debug!(
                "no static config among {} candidate path(s)",
                self.candidates.len()
            );
            return Ok(Vec::new());
        };
        let unavailable = |reason: String| DiscoveryError::SourceUnavailable {
            source_name: "config",
            reason,
        };
        let content = fs::read_to_string(path)
            .map_err(|e| unavailable(format!("read {}: {}", path.display(), e)))?;
        let cfg = StaticConfig::from_json_str(&content)
            .map_err(|e| unavailable(format!("parse {}: {}", path.display(), e)))?;
        Ok(cfg
            .external_services
            .into_iter()
            .map(|d| DiscoveredService::new(d, SourceKind::Config).at(path))
            .collect())
    }
}
