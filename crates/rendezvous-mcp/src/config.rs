use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};

use crate::model::ServiceDescriptor;

/// Operator settings read from `<MCP_HOME>/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct UserConfig {
    pub logging: Option<LoggingCfg>,
    pub discovery: Option<DiscoveryCfg>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingCfg {
    pub to_file: Option<bool>,
    pub dir: Option<String>,
    pub json: Option<bool>,
    pub compact: Option<bool>,
    pub pretty: Option<bool>,
    pub level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiscoveryCfg {
    pub services_dir: Option<String>,
    /// Candidate static config paths, first existing wins.
    pub config_files: Option<Vec<String>>,
    pub process_scan: Option<bool>,
    pub parallel_fetch: Option<bool>,

    pub handshake_timeout_ms: Option<u64>,
    pub response_timeout_ms: Option<u64>,
    pub ceiling_ms: Option<u64>,
    pub call_response_timeout_ms: Option<u64>,
    pub call_ceiling_ms: Option<u64>,
    pub http_timeout_ms: Option<u64>,

    pub self_endpoint: Option<String>,
}

pub fn load_user_config(mcp_home: &Path) -> anyhow::Result<Option<UserConfig>> {
    let path = mcp_home.join("config.toml");
    if !path.exists() {
        return Ok(None);
    }
    let s = std::fs::read_to_string(&path)?;
    let cfg: UserConfig = toml::from_str(&s)?;
    Ok(Some(cfg))
}

pub fn expand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(path)
}

/// Static service configuration (`mcp-config.json`).
#[derive(Debug, Default, Clone)]
pub struct StaticConfig {
    pub external_services: Vec<ServiceDescriptor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStaticConfig {
    #[serde(default)]
    external_services: Vec<JsonValue>,
}

impl StaticConfig {
    /// Fails only when the document itself is unusable; a bad entry is
    /// skipped with a warning and its siblings are kept.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        let raw: RawStaticConfig = serde_json::from_str(s)?;
        let external_services = raw
            .external_services
            .into_iter()
            .enumerate()
            .filter_map(|(idx, entry)| match serde_json::from_value(entry) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    tracing::warn!("skipping malformed externalServices[{}]: {}", idx, e);
                    None
                }
            })
            .collect();
        Ok(Self { external_services })
    }
}

/// First candidate path that exists on disk.
pub fn first_existing(candidates: &[PathBuf]) -> Option<&Path> {
    candidates.iter().map(PathBuf::as_path).find(|p| p.is_file())
}
