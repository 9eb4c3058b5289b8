//! Descriptors shared by the registry, discovery sources, and invokers.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// How a peer service is reached.
///
/// Stored on disk as a lowercase string (`"http"`, `"stdio"`, ...). Kinds this
/// crate cannot drive (including the reserved `"socket"`) are kept verbatim in
/// `Unsupported` so they survive a registry round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Transport {
    Http,
    Stdio,
    Unsupported(String),
}

impl Transport {
    pub fn as_str(&self) -> &str {
        match self {
            Transport::Http => "http",
            Transport::Stdio => "stdio",
            Transport::Unsupported(kind) => kind.as_str(),
        }
    }
}

impl From<String> for Transport {
    fn from(kind: String) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "http" => Transport::Http,
            "stdio" => Transport::Stdio,
            _ => Transport::Unsupported(kind),
        }
    }
}

impl From<Transport> for String {
    fn from(t: Transport) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A peer service as recorded in the registry file or static config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Canonical name; unique within one `DiscoveryService`.
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// URL for `http`, launchable command (optionally `stdio://`-prefixed) for `stdio`.
    #[serde(default)]
    pub endpoint: String,
    pub transport: Transport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
}

impl ServiceDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        endpoint: impl Into<String>,
        transport: Transport,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            endpoint: endpoint.into(),
            transport,
            aliases: None,
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = Some(aliases.into_iter().map(Into::into).collect());
        self
    }
}

/// A tool offered by a peer, tagged with the name of the service that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Owning `ServiceDescriptor::name`.
    #[serde(default)]
    pub service: String,
    /// Passed through unvalidated.
    #[serde(default)]
    pub input_schema: JsonValue,
}

impl ExternalToolDescriptor {
    /// Build a descriptor from one raw tool item returned by a peer.
    ///
    /// Returns `None` for items without a string `name`. A `description`
    /// that is not a string reads as empty, and any `service` field the peer
    /// sent is replaced with `service`.
    pub fn from_item(item: &JsonValue, service: &str) -> Option<Self> {
        let name = item.get("name")?.as_str()?;
        Some(Self {
            name: name.to_string(),
            description: item
                .get("description")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string(),
            service: service.to_string(),
            input_schema: item.get("inputSchema").cloned().unwrap_or(JsonValue::Null),
        })
    }
}
