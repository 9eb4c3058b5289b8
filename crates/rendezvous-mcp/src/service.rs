//! The discovery facade: one owner for the registry, resolver, discovered
//! services, and tool catalog.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::catalog::{ToolCatalog, fetch_tools};
use crate::discovery::{
    ConfigSource, DiscoveredService, DiscoveryAggregator, ProcessSource, RegistrySource,
    SourceKind,
};
use crate::error::{DiscoveryError, Result};
use crate::invoke::{HttpInvoker, Invoker, StdioInvoker, StdioTimeouts};
use crate::model::{ExternalToolDescriptor, ServiceDescriptor, Transport};
use crate::registry::ServiceRegistry;
use crate::resolver::NameResolver;

/// File name of the static service config looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "mcp-config.json";

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub services_dir: PathBuf,
    /// Static config candidates, first existing wins.
    pub config_files: Vec<PathBuf>,
    pub process_scan: bool,
    pub parallel_fetch: bool,
    pub list_timeouts: StdioTimeouts,
    pub call_timeouts: StdioTimeouts,
    pub http_timeout: Duration,
}

impl DiscoverySettings {
    /// Defaults rooted at `mcp_home` (normally `~/.mcp`).
    pub fn with_home(mcp_home: &Path) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            services_dir: mcp_home.join("services"),
            config_files: vec![cwd.join(LOCAL_CONFIG_FILE), mcp_home.join("config.json")],
            process_scan: true,
            parallel_fetch: false,
            list_timeouts: StdioTimeouts::LIST_DEFAULT,
            call_timeouts: StdioTimeouts::CALL_DEFAULT,
            http_timeout: Duration::from_secs(30),
        }
    }
}

pub struct DiscoveryService {
    settings: DiscoverySettings,
    registry: ServiceRegistry,
    resolver: NameResolver,
    services: Vec<DiscoveredService>,
    catalog: ToolCatalog,
    http: HttpInvoker,
    stdio: StdioInvoker,
}

impl DiscoveryService {
    pub fn new(settings: DiscoverySettings) -> Self {
        Self {
            registry: ServiceRegistry::new(&settings.services_dir),
            resolver: NameResolver::new(),
            services: Vec::new(),
            catalog: ToolCatalog::new(),
            http: HttpInvoker::new(settings.http_timeout),
            stdio: StdioInvoker::new(settings.list_timeouts, settings.call_timeouts),
            settings,
        }
    }

    fn aggregator(&self) -> DiscoveryAggregator {
        let mut agg = DiscoveryAggregator::new().with_source(RegistrySource::new(self.registry.clone()));
        if self.settings.process_scan {
            agg = agg.with_source(ProcessSource::system());
        }
        agg.with_source(ConfigSource::new(self.settings.config_files.clone()))
    }

    /// Discover services, rebuild the resolver, and repopulate the catalog.
    ///
    /// Never fails: unreachable sources and services are logged and skipped.
    pub async fn initialize(&mut self) {
        if let Err(e) = self.registry.ensure_dir() {
            tracing::warn!(
                "could not create services directory for {}: {}",
                self.registry.path().display(),
                e
            );
        }

        let agg = self.aggregator();
        let sources = agg.source_count();
        let found = match tokio::task::spawn_blocking(move || agg.aggregate()).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("discovery task failed: {}", e);
                Vec::new()
            }
        };
        tracing::info!("discovered {} service(s) from {} source(s)", found.len(), sources);

        self.resolver.rebuild(&found);
        self.catalog =
            ToolCatalog::populate(&found, &self.http, &self.stdio, self.settings.parallel_fetch)
                .await;
        self.services = found;
        tracing::info!(
            "catalog ready: {} tool(s) across {} service(s)",
            self.catalog.len(),
            self.services.len()
        );
    }

    /// Re-run discovery from scratch, replacing the catalog.
    pub async fn refresh(&mut self) {
        self.initialize().await;
    }

    pub fn get_available_tools(&self) -> &[ExternalToolDescriptor] {
        self.catalog.tools()
    }

    pub fn services(&self) -> &[DiscoveredService] {
        &self.services
    }

    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    /// Canonical names known to the resolver or seen during discovery.
    pub fn known_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.resolver.canonical_names().into_iter().collect();
        names.extend(self.services.iter().map(|s| s.name().to_string()));
        names.into_iter().collect()
    }

    /// Resolve `identifier` and return the first service with that name.
    pub fn find_service(&self, identifier: &str) -> Result<&ServiceDescriptor> {
        let resolved = self.resolver.resolve(identifier);
        self.services
            .iter()
            .find(|s| s.name() == resolved)
            .map(|s| &s.descriptor)
            .ok_or_else(|| DiscoveryError::ServiceNotFound {
                requested: identifier.to_string(),
                resolved: resolved.to_string(),
                known: self.known_names(),
            })
    }

    /// Invoke `tool` on the service named (or aliased) by `service`.
    pub async fn call_external_tool(
        &self,
        tool: &str,
        service: &str,
        params: JsonValue,
    ) -> Result<JsonValue> {
        let desc = self.find_service(service)?;
        tracing::info!("calling '{}' on '{}' via {}", tool, desc.name, desc.transport);
        match &desc.transport {
            Transport::Http => self.http.call_tool(desc, tool, params).await,
            Transport::Stdio => self.stdio.call_tool(desc, tool, params).await,
            Transport::Unsupported(kind) => Err(DiscoveryError::UnsupportedTransport {
                service: desc.name.clone(),
                transport: kind.clone(),
            }),
        }
    }

    /// Persist `descriptor` to the registry and make it usable right away.
    ///
    /// Only the registry write can fail; fetching tools from a freshly
    /// registered HTTP service is best effort.
    pub async fn register_local_service(&mut self, descriptor: ServiceDescriptor) -> Result<()> {
        self.registry.upsert(&descriptor)?;
        tracing::info!("registered service '{}'", descriptor.name);

        self.resolver.register_declared(&descriptor);
        let entry = DiscoveredService::new(descriptor.clone(), SourceKind::Local)
            .at(self.registry.path());
        match self.services.iter().position(|s| s.name() == descriptor.name) {
            Some(idx) => {
                self.services.retain(|s| s.name() != descriptor.name);
                self.services.insert(idx, entry);
            }
            None => self.services.push(entry),
        }

        if descriptor.transport == Transport::Http {
            match fetch_tools(&descriptor, &self.http, &self.stdio).await {
                Ok(items) => {
                    self.catalog.remove_service(&descriptor.name);
                    let n = self.catalog.extend_from(&descriptor.name, &items);
                    tracing::info!("service '{}': {} tool(s)", descriptor.name, n);
                }
                Err(e) => tracing::warn!("failed to list tools of '{}': {}", descriptor.name, e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::serve;

    fn settings(dir: &Path) -> DiscoverySettings {
        DiscoverySettings {
            services_dir: dir.join("services"),
            config_files: vec![dir.join("mcp-config.json")],
            process_scan: false,
            ..DiscoverySettings::with_home(dir)
        }
    }

    fn write_registry(dir: &Path, body: &str) {
        std::fs::create_dir_all(dir.join("services")).unwrap();
        std::fs::write(dir.join("services").join("registry.json"), body).unwrap();
    }

    #[tokio::test]
    async fn alias_call_reaches_http_peer_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let (url, mut bodies) = serve(vec![
            (200, r#"{"tools":[{"name":"read_file","inputSchema":{"type":"object"}}]}"#.into()),
            (200, r#"{"content":[{"type":"text","text":"hello"}]}"#.into()),
        ])
        .await;
        write_registry(
            dir.path(),
            &json!({ "services": [
                { "name": "filesystem-mcp", "transport": "http", "endpoint": url }
            ]})
            .to_string(),
        );

        let mut svc = DiscoveryService::new(settings(dir.path()));
        svc.initialize().await;
        let tools = svc.get_available_tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].service, "filesystem-mcp");
        assert_eq!(tools[0].input_schema, json!({ "type": "object" }));

        let res = svc
            .call_external_tool("read_file", "fs", json!({ "path": "a.txt" }))
            .await
            .unwrap();
        assert_eq!(res, json!({ "content": [{ "type": "text", "text": "hello" }] }));

        let _list = bodies.recv().await.unwrap();
        let call: JsonValue = serde_json::from_str(&bodies.recv().await.unwrap()).unwrap();
        assert_eq!(
            call,
            json!({ "method": "call_tool", "params": { "name": "read_file", "arguments": { "path": "a.txt" } } })
        );
    }

    #[tokio::test]
    async fn unknown_service_lists_known_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut svc = DiscoveryService::new(settings(dir.path()));
        svc.initialize().await;
        let err = svc
            .call_external_tool("anything", "nope", json!({}))
            .await
            .unwrap_err();
        match err {
            DiscoveryError::ServiceNotFound { requested, resolved, known } => {
                assert_eq!(requested, "nope");
                assert_eq!(resolved, "nope");
                assert!(known.contains(&"filesystem-mcp".to_string()), "{known:?}");
                let mut sorted = known.clone();
                sorted.sort();
                sorted.dedup();
                assert_eq!(known, sorted);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn corrupt_registry_does_not_hide_config_services() {
        let dir = tempfile::tempdir().unwrap();
        write_registry(dir.path(), "{ not json");
        std::fs::write(
            dir.path().join("mcp-config.json"),
            r#"{"externalServices":[{"name":"weather-mcp","transport":"socket","endpoint":"/tmp/w.sock"}]}"#,
        )
        .unwrap();

        let mut svc = DiscoveryService::new(settings(dir.path()));
        svc.initialize().await;
        assert_eq!(svc.services().len(), 1);
        assert_eq!(svc.services()[0].origin.source, SourceKind::Config);
        assert!(svc.get_available_tools().is_empty());
        assert_eq!(svc.resolver().resolve("weather"), "weather-mcp");

        let err = svc
            .call_external_tool("forecast", "weather", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::UnsupportedTransport { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn registration_replaces_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut svc = DiscoveryService::new(settings(dir.path()));
        svc.initialize().await;

        let first = ServiceDescriptor::new("notes-server", "v1", "stdio://notes", Transport::Stdio)
            .with_aliases(["nb "]);
        svc.register_local_service(first).await.unwrap();
        let second = ServiceDescriptor::new("notes-server", "v2", "stdio://notes", Transport::Stdio)
            .with_aliases(["nb"]);
        svc.register_local_service(second.clone()).await.unwrap();

        assert_eq!(svc.services().len(), 1);
        assert_eq!(svc.services()[0].origin.source, SourceKind::Local);
        assert_eq!(svc.find_service("nb").unwrap(), &second);

        let mut fresh = DiscoveryService::new(settings(dir.path()));
        fresh.initialize().await;
        let persisted: Vec<_> = fresh
            .services()
            .iter()
            .filter(|s| s.name() == "notes-server")
            .collect();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].descriptor.description, "v2");
        assert_eq!(persisted[0].origin.source, SourceKind::Registry);
    }

    #[tokio::test]
    async fn failed_registration_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "plain file").unwrap();
        let mut svc = DiscoveryService::new(DiscoverySettings {
            services_dir: blocker.join("services"),
            ..settings(dir.path())
        });
        svc.initialize().await;

        let desc = ServiceDescriptor::new("notes-server", "", "stdio://notes", Transport::Stdio)
            .with_aliases(["nb"]);
        let err = svc.register_local_service(desc).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Registry { .. }), "{err:?}");
        assert!(svc.services().is_empty());
        assert!(svc.find_service("nb").is_err());
    }

    #[tokio::test]
    async fn registering_http_service_adds_its_tools() {
        let dir = tempfile::tempdir().unwrap();
        let (url, _bodies) = serve(vec![(200, r#"{"tools":[{"name":"search"}]}"#.into())]).await;
        let mut svc = DiscoveryService::new(settings(dir.path()));
        svc.initialize().await;

        let desc = ServiceDescriptor::new("search-mcp", "", url, Transport::Http);
        svc.register_local_service(desc).await.unwrap();
        let tools = svc.get_available_tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].service, "search-mcp");
    }
}
