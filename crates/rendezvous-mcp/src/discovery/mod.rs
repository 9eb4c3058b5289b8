//! Service discovery across the registry file, the host process table, and
//! the static config file.
//!
//! Sources are independent: each contributes whatever it can, and a failing
//! source is logged without affecting the rest. No de-duplication happens
//! here; duplicate names may coexist and later lookups take the first match.

pub mod process;
pub mod sources;
pub mod types;

pub use process::{ProcessEntry, ProcessSource, ProcessTable, SystemProcessTable};
pub use sources::{ConfigSource, RegistrySource};
pub use types::*;

/// Runs every configured source in order and concatenates the results.
#[derive(Default)]
pub struct DiscoveryAggregator {
    sources: Vec<Box<dyn DiscoverySource>>,
}

impl DiscoveryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl DiscoverySource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Collect candidates from all sources. Never fails.
    pub fn aggregate(&self) -> Vec<DiscoveredService> {
        let mut out = Vec::new();
        for source in &self.sources {
            match source.discover() {
                Ok(found) => {
                    tracing::info!(
                        "discovered {} service(s) via {:?}",
                        found.len(),
                        source.kind()
                    );
                    for srv in &found {
                        let path = srv
                            .origin
                            .path
                            .as_ref()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| "<none>".to_string());
                        tracing::debug!(
                            "candidate '{}' ({}) @ {} {}",
                            srv.name(),
                            srv.descriptor.transport,
                            path,
                            srv.origin.note.as_deref().unwrap_or("")
                        );
                    }
                    out.extend(found);
                }
                Err(e) => {
                    tracing::warn!("discovery via {:?} failed: {}", source.kind(), e);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DiscoveryError, Result};
    use crate::model::{ServiceDescriptor, Transport};
    use crate::registry::ServiceRegistry;

    struct FailingSource;

    impl DiscoverySource for FailingSource {
        fn kind(&self) -> SourceKind {
            SourceKind::ProcessTable
        }

        fn discover(&self) -> Result<Vec<DiscoveredService>> {
            Err(DiscoveryError::SourceUnavailable {
                source_name: "process table",
                reason: "boom".into(),
            })
        }
    }

    struct FixedSource(Vec<&'static str>);

    impl DiscoverySource for FixedSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Registry
        }

        fn discover(&self) -> Result<Vec<DiscoveredService>> {
            Ok(self
                .0
                .iter()
                .map(|n| {
                    DiscoveredService::new(
                        ServiceDescriptor::new(*n, "", "", Transport::Http),
                        SourceKind::Registry,
                    )
                })
                .collect())
        }
    }

    #[test]
    fn corrupt_registry_does_not_hide_config_services() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ServiceRegistry::new(dir.path().join("services"));
        std::fs::create_dir_all(dir.path().join("services")).unwrap();
        std::fs::write(registry.path(), "garbage").unwrap();
        let config = dir.path().join("mcp-config.json");
        std::fs::write(
            &config,
            r#"{"externalServices":[{"name":"only-mcp","endpoint":"http://localhost:7","transport":"http"}]}"#,
        )
        .unwrap();

        let agg = DiscoveryAggregator::new()
            .with_source(RegistrySource::new(registry))
            .with_source(FailingSource)
            .with_source(ConfigSource::new(vec![config]));
        let found = agg.aggregate();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "only-mcp");
        assert_eq!(found[0].origin.source, SourceKind::Config);
    }

    #[test]
    fn duplicates_across_sources_are_kept_in_order() {
        let agg = DiscoveryAggregator::new()
            .with_source(FixedSource(vec!["a", "b"]))
            .with_source(FixedSource(vec!["a"]));
        let names: Vec<_> = agg.aggregate().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "a"]);
    }
}
