//! Invocation strategies for peer services.
//!
//! Both transports speak the same `{ "method", "params" }` request shape;
//! they differ in how the request reaches the peer and how the answer is
//! recognised.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::model::ServiceDescriptor;

pub mod http;
pub mod lines;
pub mod stdio;
pub mod target;

pub use http::HttpInvoker;
pub use stdio::{StdioInvoker, StdioTimeouts};
pub use target::StdioTarget;

/// Method name used to ask a peer for its tool list.
pub const LIST_TOOLS: &str = "list_tools";
/// Method name used to invoke a tool on an HTTP peer.
pub const CALL_TOOL: &str = "call_tool";

/// Outbound request written to a peer.
#[derive(Debug, Clone, Serialize)]
pub struct WireRequest<'a> {
    pub method: &'a str,
    pub params: JsonValue,
}

impl<'a> WireRequest<'a> {
    pub fn new(method: &'a str, params: JsonValue) -> Self {
        Self { method, params }
    }

    pub fn list_tools() -> Self {
        Self::new(LIST_TOOLS, JsonValue::Object(Default::default()))
    }
}

#[async_trait]
pub trait Invoker: Send + Sync {
    /// Raw tool items advertised by `service`.
    async fn list_tools(&self, service: &ServiceDescriptor) -> Result<Vec<JsonValue>>;

    /// Invoke `tool` on `service` and return the peer's answer.
    async fn call_tool(
        &self,
        service: &ServiceDescriptor,
        tool: &str,
        params: JsonValue,
    ) -> Result<JsonValue>;
}
