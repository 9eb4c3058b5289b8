//! Request/response invocation over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{Value as JsonValue, json};

use super::{CALL_TOOL, Invoker, WireRequest};
use crate::error::{DiscoveryError, Result};
use crate::model::ServiceDescriptor;

/// One POST per operation, no retries.
#[derive(Debug, Clone)]
pub struct HttpInvoker {
    client: HttpClient,
}

impl HttpInvoker {
    pub fn new(timeout: Duration) -> Self {
        let client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("http client setup failed ({}); using defaults", e);
                HttpClient::new()
            });
        Self { client }
    }

    async fn post(&self, service: &ServiceDescriptor, request: &WireRequest<'_>) -> Result<JsonValue> {
        tracing::debug!(
            "POST {} method={} service={}",
            service.endpoint,
            request.method,
            service.name
        );
        let resp = self
            .client
            .post(&service.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| DiscoveryError::transport(&service.name, format!("request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| DiscoveryError::transport(&service.name, format!("reading body failed: {e}")))?;
        if !status.is_success() {
            return Err(DiscoveryError::transport(
                &service.name,
                format!("HTTP {status}: {body}"),
            ));
        }
        serde_json::from_str(&body)
            .map_err(|e| DiscoveryError::parse(format!("response from '{}'", service.name), e))
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn list_tools(&self, service: &ServiceDescriptor) -> Result<Vec<JsonValue>> {
        let body = self.post(service, &WireRequest::list_tools()).await?;
        Ok(match body.get("tools") {
            Some(JsonValue::Array(items)) => items.clone(),
            _ => Vec::new(),
        })
    }

    async fn call_tool(
        &self,
        service: &ServiceDescriptor,
        tool: &str,
        params: JsonValue,
    ) -> Result<JsonValue> {
        let request = WireRequest::new(CALL_TOOL, json!({ "name": tool, "arguments": params }));
        self.post(service, &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Transport;
    use crate::test_support::serve_once;

    fn http_service(endpoint: String) -> ServiceDescriptor {
        ServiceDescriptor::new("weather-mcp", "", endpoint, Transport::Http)
    }

    #[tokio::test]
    async fn list_tools_returns_tools_array() {
        let (url, mut req) = serve_once(200, r#"{"tools":[{"name":"forecast"}]}"#).await;
        let invoker = HttpInvoker::new(Duration::from_secs(5));
        let tools = invoker.list_tools(&http_service(url)).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "forecast");
        let sent: JsonValue = serde_json::from_str(&req.recv().await.unwrap()).unwrap();
        assert_eq!(sent, json!({ "method": "list_tools", "params": {} }));
    }

    #[tokio::test]
    async fn missing_tools_field_is_empty() {
        let (url, _req) = serve_once(200, r#"{"content":[]}"#).await;
        let invoker = HttpInvoker::new(Duration::from_secs(5));
        assert!(invoker.list_tools(&http_service(url)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_transport_error() {
        let (url, _req) = serve_once(503, "overloaded").await;
        let invoker = HttpInvoker::new(Duration::from_secs(5));
        let err = invoker
            .call_tool(&http_service(url), "forecast", json!({}))
            .await
            .unwrap_err();
        match err {
            DiscoveryError::Transport { service, reason } => {
                assert_eq!(service, "weather-mcp");
                assert!(reason.contains("503"), "{reason}");
                assert!(reason.contains("overloaded"), "{reason}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn undecodable_body_is_parse_error() {
        let (url, _req) = serve_once(200, "<html>").await;
        let invoker = HttpInvoker::new(Duration::from_secs(5));
        let err = invoker
            .call_tool(&http_service(url), "forecast", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Parse { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let invoker = HttpInvoker::new(Duration::from_secs(5));
        let err = invoker.list_tools(&http_service(url)).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Transport { .. }), "{err:?}");
    }
}
