//! The in-memory tool catalog and how it is populated from peers.

use serde_json::Value as JsonValue;
use tokio::task::JoinSet;

use crate::discovery::DiscoveredService;
use crate::error::{DiscoveryError, Result};
use crate::invoke::{HttpInvoker, Invoker, StdioInvoker};
use crate::model::{ExternalToolDescriptor, ServiceDescriptor, Transport};

/// Ask `service` for its tools over whatever transport it uses.
pub async fn fetch_tools(
    service: &ServiceDescriptor,
    http: &HttpInvoker,
    stdio: &StdioInvoker,
) -> Result<Vec<JsonValue>> {
    match &service.transport {
        Transport::Http => http.list_tools(service).await,
        Transport::Stdio => stdio.list_tools(service).await,
        Transport::Unsupported(kind) => Err(DiscoveryError::UnsupportedTransport {
            service: service.name.clone(),
            transport: kind.clone(),
        }),
    }
}

/// Tools gathered from every known service, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ExternalToolDescriptor>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tools(&self) -> &[ExternalToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tag raw tool items with `service` and append them. Returns how many
    /// were usable.
    pub fn extend_from(&mut self, service: &str, items: &[JsonValue]) -> usize {
        let before = self.tools.len();
        for item in items {
            match ExternalToolDescriptor::from_item(item, service) {
                Some(tool) => self.tools.push(tool),
                None => tracing::debug!("skipping unnamed tool from '{}': {}", service, item),
            }
        }
        self.tools.len() - before
    }

    /// Drop every tool owned by `service`.
    pub fn remove_service(&mut self, service: &str) {
        self.tools.retain(|t| t.service != service);
    }

    /// Build a fresh catalog by listing tools on every service.
    ///
    /// A service that fails, or uses a transport we cannot drive, contributes
    /// nothing; the rest are unaffected.
    pub async fn populate(
        services: &[DiscoveredService],
        http: &HttpInvoker,
        stdio: &StdioInvoker,
        parallel: bool,
    ) -> Self {
        let results = if parallel {
            fetch_parallel(services, http, stdio).await
        } else {
            let mut out = Vec::with_capacity(services.len());
            for srv in services {
                out.push(fetch_tools(&srv.descriptor, http, stdio).await);
            }
            out
        };

        let mut catalog = Self::new();
        for (srv, res) in services.iter().zip(results) {
            match res {
                Ok(items) => {
                    let n = catalog.extend_from(srv.name(), &items);
                    tracing::info!("service '{}': {} tool(s)", srv.name(), n);
                }
                Err(DiscoveryError::UnsupportedTransport { transport, .. }) => {
                    tracing::warn!(
                        "service '{}' uses unsupported transport '{}'; skipping",
                        srv.name(),
                        transport
                    );
                }
                Err(e) => tracing::warn!("failed to list tools of '{}': {}", srv.name(), e),
            }
        }
        catalog
    }
}

async fn fetch_parallel(
    services: &[DiscoveredService],
    http: &HttpInvoker,
    stdio: &StdioInvoker,
) -> Vec<Result<Vec<JsonValue>>> {
    let mut set = JoinSet::new();
    for (idx, srv) in services.iter().enumerate() {
        let desc = srv.descriptor.clone();
        let http = http.clone();
        let stdio = stdio.clone();
        set.spawn(async move { (idx, fetch_tools(&desc, &http, &stdio).await) });
    }

    let mut slots: Vec<Option<Result<Vec<JsonValue>>>> = services.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, res)) => slots[idx] = Some(res),
            Err(e) => tracing::warn!("tool fetch task failed: {}", e),
        }
    }
    services
        .iter()
        .zip(slots)
        .map(|(srv, slot)| {
            slot.unwrap_or_else(|| {
                Err(DiscoveryError::transport(srv.name(), "tool fetch task aborted"))
            })
        })
        .collect()
}
