//! Persisted service registry (`<services_dir>/registry.json`).
//!
//! The file holds `{ "services": [ServiceDescriptor, ...] }`. Reads are
//! forgiving: a missing or corrupt file is an empty registry, and individual
//! malformed entries are skipped. Writes replace the whole file; concurrent
//! writers from other processes are last-writer-wins.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{DiscoveryError, Result};
use crate::model::ServiceDescriptor;

pub const REGISTRY_FILE: &str = "registry.json";

#[derive(Debug, Default, Deserialize)]
struct RawRegistryFile {
    #[serde(default)]
    services: Vec<JsonValue>,
}

#[derive(Debug, Serialize)]
struct RegistryFile<'a> {
    services: &'a [ServiceDescriptor],
}

#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    dir: PathBuf,
    path: PathBuf,
}

impl ServiceRegistry {
    pub fn new(services_dir: impl Into<PathBuf>) -> Self {
        let dir = services_dir.into();
        let path = dir.join(REGISTRY_FILE);
        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the services directory if absent. Idempotent.
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        if !self.dir.is_dir() {
            fs::create_dir_all(&self.dir)?;
            tracing::info!("created services directory {}", self.dir.display());
        }
        Ok(())
    }

    /// Read the registry, reporting unreadable or corrupt files as errors.
    ///
    /// A missing file is not an error.
    pub fn try_load(&self) -> Result<Vec<ServiceDescriptor>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DiscoveryError::SourceUnavailable {
                    source_name: "registry",
                    reason: format!("read {}: {}", self.path.display(), e),
                });
            }
        };
        let raw: RawRegistryFile =
            serde_json::from_str(&content).map_err(|e| DiscoveryError::SourceUnavailable {
                source_name: "registry",
                reason: format!("parse {}: {}", self.path.display(), e),
            })?;
        let mut out = Vec::with_capacity(raw.services.len());
        for entry in raw.services {
            match serde_json::from_value::<ServiceDescriptor>(entry) {
                Ok(d) => out.push(d),
                Err(e) => tracing::warn!(
                    "skipping malformed registry entry in {}: {}",
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(out)
    }

    /// Read the registry; any failure is logged and yields an empty list.
    pub fn load(&self) -> Vec<ServiceDescriptor> {
        match self.try_load() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("{} (treating registry as empty)", e);
                Vec::new()
            }
        }
    }

    /// Insert `descriptor`, replacing every existing entry with the same name,
    /// and write the registry back to disk.
    pub fn upsert(&self, descriptor: &ServiceDescriptor) -> Result<()> {
        let write_err = |source: std::io::Error| DiscoveryError::Registry {
            path: self.path.display().to_string(),
            source,
        };
        self.ensure_dir().map_err(write_err)?;

        let mut services = self.load();
        let position = services.iter().position(|s| s.name == descriptor.name);
        services.retain(|s| s.name != descriptor.name);
        match position {
            Some(idx) => services.insert(idx.min(services.len()), descriptor.clone()),
            None => services.push(descriptor.clone()),
        }

        let body = serde_json::to_string_pretty(&RegistryFile {
            services: &services,
        })
        .map_err(|e| write_err(std::io::Error::other(e)))?;
        let tmp = self
            .dir
            .join(format!("{}.{}.tmp", REGISTRY_FILE, std::process::id()));
        fs::write(&tmp, body).map_err(write_err)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(e));
        }
        tracing::debug!(
            "registry {} now holds {} service(s)",
            self.path.display(),
            services.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Transport;
    use proptest::prelude::*;

    fn svc(name: &str, endpoint: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(name, "test service", endpoint, Transport::Http)
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reg = ServiceRegistry::new(dir.path().join("services"));
        assert!(reg.try_load().unwrap().is_empty());
    }

    #[test]
    fn upsert_creates_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let reg = ServiceRegistry::new(dir.path().join("nested").join("services"));
        reg.upsert(&svc("a-mcp", "http://localhost:1")).unwrap();
        assert!(reg.path().is_file());
        assert_eq!(reg.load(), vec![svc("a-mcp", "http://localhost:1")]);
    }

    #[test]
    fn upsert_replaces_and_collapses_stale_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let reg = ServiceRegistry::new(dir.path());
        std::fs::write(
            reg.path(),
            r#"{"services":[
                {"name":"a","endpoint":"http://old","transport":"http"},
                {"name":"b","endpoint":"http://b","transport":"http"},
                {"name":"a","endpoint":"http://older","transport":"http"}
            ]}"#,
        )
        .unwrap();
        let updated = svc("a", "http://new").with_aliases(["alpha"]);
        reg.upsert(&updated).unwrap();
        let loaded = reg.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], updated);
        assert_eq!(loaded[1].name, "b");
    }

    #[test]
    fn upsert_reports_unwritable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "plain file").unwrap();
        let reg = ServiceRegistry::new(blocker.join("services"));
        let err = reg.upsert(&svc("a-mcp", "http://localhost:1")).unwrap_err();
        match err {
            DiscoveryError::Registry { path, .. } => assert!(path.ends_with("registry.json")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!reg.path().exists());
    }

    #[test]
    fn corrupt_file_loads_empty_and_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let reg = ServiceRegistry::new(dir.path());
        std::fs::write(reg.path(), "{ not json").unwrap();
        assert!(matches!(
            reg.try_load(),
            Err(DiscoveryError::SourceUnavailable { .. })
        ));
        assert!(reg.load().is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let reg = ServiceRegistry::new(dir.path());
        std::fs::write(
            reg.path(),
            r#"{"services":[{"description":"no name"},{"name":"ok","transport":"stdio"}]}"#,
        )
        .unwrap();
        let loaded = reg.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "ok");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn upsert_leaves_exactly_one_latest_entry(
            names in proptest::collection::vec("[a-c]", 1..8),
            endpoints in proptest::collection::vec("[a-z]{1,6}", 8),
        ) {
            let dir = tempfile::tempdir().unwrap();
            let reg = ServiceRegistry::new(dir.path());
            for (i, name) in names.iter().enumerate() {
                reg.upsert(&svc(name, &endpoints[i])).unwrap();
            }
            let loaded = reg.load();
            for (i, name) in names.iter().enumerate() {
                let last = names.iter().rposition(|n| n == name).unwrap();
                let matching: Vec<_> = loaded.iter().filter(|s| &s.name == name).collect();
                prop_assert_eq!(matching.len(), 1);
                if i == last {
                    prop_assert_eq!(&matching[0].endpoint, &endpoints[i]);
                }
            }
        }
    }
}
