//! Error taxonomy for discovery and invocation.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Which stdio timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// No `initialized` message arrived in time.
    Handshake,
    /// The request was sent but no response arrived in time.
    Response,
    /// The whole exchange exceeded its hard ceiling.
    Ceiling,
}

impl std::fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TimeoutPhase::Handshake => "handshake",
            TimeoutPhase::Response => "response",
            TimeoutPhase::Ceiling => "overall",
        })
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A discovery source could not be read. Contained by the aggregator.
    #[error("discovery source '{source_name}' unavailable: {reason}")]
    SourceUnavailable {
        source_name: &'static str,
        reason: String,
    },

    #[error("{}", not_found_message(.requested, .resolved, .known))]
    ServiceNotFound {
        requested: String,
        resolved: String,
        known: Vec<String>,
    },

    #[error("transport error for service '{service}': {reason}")]
    Transport { service: String, reason: String },

    #[error("service '{service}' {phase} timeout after {}ms", .after.as_millis())]
    ProtocolTimeout {
        service: String,
        phase: TimeoutPhase,
        after: Duration,
    },

    #[error("service '{service}' exited with {status}; stderr: {stderr:?}; stdout: {stdout:?}")]
    ChildExited {
        service: String,
        status: String,
        stderr: String,
        stdout: String,
    },

    #[error("failed to parse {context}: {reason}")]
    Parse { context: String, reason: String },

    #[error("transport '{transport}' of service '{service}' is not supported")]
    UnsupportedTransport { service: String, transport: String },

    #[error("failed to write registry {path}: {source}")]
    Registry {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

fn not_found_message(requested: &str, resolved: &str, known: &[String]) -> String {
    let mut msg = if requested == resolved {
        format!("service not found: '{resolved}'")
    } else {
        format!("service not found: '{resolved}' (requested as '{requested}')")
    };
    if known.is_empty() {
        msg.push_str("; no services are currently known");
    } else {
        msg.push_str("; known services: ");
        msg.push_str(&known.join(", "));
    }
    msg
}

impl DiscoveryError {
    pub fn transport(service: &str, reason: impl Into<String>) -> Self {
        DiscoveryError::Transport {
            service: service.to_string(),
            reason: reason.into(),
        }
    }

    pub fn parse(context: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        DiscoveryError::Parse {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}
