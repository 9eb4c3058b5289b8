//! Best-effort discovery of running servers from the host process table.
//!
//! A process qualifies when its command line carries one of the server
//! markers. The server program is the first non-flag argument after a `node`
//! interpreter, or the marked executable itself. The scan sits behind
//! [`ProcessTable`] so it can be replaced or disabled without touching the
//! other sources.

use std::path::Path;

use super::types::{DiscoveredService, DiscoverySource, SourceKind};
use crate::error::{DiscoveryError, Result};
use crate::model::{ServiceDescriptor, Transport, service_name_from_path};

/// Command-line tokens that mark an assistant-protocol server.
pub const SERVER_MARKERS: &[&str] = &["mcp-server", "mcp_server"];

const INTERPRETERS: &[&str] = &["node", "nodejs"];

/// Prefix used for subprocess-transport endpoints.
pub const STDIO_SCHEME: &str = "stdio://";

/// One row of a process table snapshot.
#[derive(Debug, Clone)]
pub struct ProcessEntry {
    pub pid: u32,
    pub cmd: Vec<String>,
}

pub trait ProcessTable: Send + Sync {
    fn snapshot(&self) -> Result<Vec<ProcessEntry>>;
}

/// Process table of the running host, via `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn snapshot(&self) -> Result<Vec<ProcessEntry>> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(DiscoveryError::SourceUnavailable {
                source_name: "process table",
                reason: format!("unsupported platform {}", std::env::consts::OS),
            });
        }
        let sys = sysinfo::System::new_all();
        Ok(sys
            .processes()
            .values()
            .map(|p| ProcessEntry {
                pid: p.pid().as_u32(),
                cmd: p
                    .cmd()
                    .iter()
                    .map(|s| s.to_string_lossy().into_owned())
                    .collect(),
            })
            .collect())
    }
}

fn is_interpreter(token: &str) -> bool {
    let base = Path::new(token)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    INTERPRETERS.iter().any(|i| base.eq_ignore_ascii_case(i))
}

fn has_marker(token: &str) -> bool {
    SERVER_MARKERS.iter().any(|m| token.contains(m))
}

/// Derive a stdio descriptor from a process command line, if it is a server.
pub fn descriptor_from_cmdline(cmd: &[String]) -> Option<ServiceDescriptor> {
    if !cmd.iter().any(|t| has_marker(t)) {
        return None;
    }
    let server_path = match cmd.iter().position(|t| is_interpreter(t)) {
        Some(idx) => cmd[idx + 1..].iter().find(|t| !t.starts_with('-'))?,
        None => cmd.first().filter(|t| has_marker(t))?,
    };
    let name = service_name_from_path(server_path)?;
    Some(ServiceDescriptor::new(
        name.clone(),
        format!("MCP service discovered in process list: {name}"),
        format!("{STDIO_SCHEME}{server_path}"),
        Transport::Stdio,
    ))
}

pub struct ProcessSource {
    table: Box<dyn ProcessTable>,
    self_pid: u32,
}

impl ProcessSource {
    pub fn new(table: impl ProcessTable + 'static) -> Self {
        Self {
            table: Box::new(table),
            self_pid: std::process::id(),
        }
    }

    pub fn system() -> Self {
        Self::new(SystemProcessTable)
    }
}

impl DiscoverySource for ProcessSource {
    fn kind(&self) -> SourceKind {
        SourceKind::ProcessTable
    }

    fn discover(&self) -> Result<Vec<DiscoveredService>> {
        let entries = self.table.snapshot()?;
        let marked = entries
            .iter()
            .filter(|e| e.cmd.iter().any(|t| has_marker(t)))
            .count();
        tracing::debug!("{} process(es) look like MCP servers", marked);

        let mut out = Vec::new();
        for entry in entries {
            if entry.pid == self.self_pid {
                continue;
            }
            let Some(desc) = descriptor_from_cmdline(&entry.cmd) else {
                if entry.cmd.iter().any(|t| has_marker(t)) {
                    tracing::debug!(
                        "skipping unparseable server process {}: {}",
                        entry.pid,
                        entry.cmd.join(" ")
                    );
                }
                continue;
            };
            out.push(
                DiscoveredService::new(desc, SourceKind::ProcessTable)
                    .noted(format!("pid {}", entry.pid)),
            );
        }
        Ok(out)
    }
}
