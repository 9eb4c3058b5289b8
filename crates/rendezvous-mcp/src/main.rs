use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use env_flags::env_flags;
use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

use rendezvous_mcp::config::{UserConfig, expand_home, load_user_config};
use rendezvous_mcp::invoke::StdioTimeouts;
use rendezvous_mcp::model::{ServiceDescriptor, Transport};
use rendezvous_mcp::resolver::default::{SELF_SERVICE_NAME, self_aliases};
use rendezvous_mcp::{DiscoveryService, DiscoverySettings};

env_flags! {
    /// Home for registry, config.toml, and logs. Defaults to $HOME/.mcp
    MCP_HOME: &str = "";
}

fn env_set(key: &str) -> bool {
    std::env::var_os(key).is_some()
}

/// Env flag if explicitly set, else user config, else the flag's default.
fn pick<T>(key: &str, env_value: T, cfg_value: Option<T>) -> T {
    if env_set(key) {
        env_value
    } else {
        cfg_value.unwrap_or(env_value)
    }
}

fn resolve_home() -> PathBuf {
    if !(*MCP_HOME).is_empty() {
        expand_home(*MCP_HOME)
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".mcp")
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".mcp")
    }
}

#[derive(Clone, Copy)]
enum LogFormat {
    Json,
    Compact,
    Pretty,
    Full,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer<W>(writer: W, format: LogFormat, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_target(true)
        .with_ansi(ansi)
        .with_writer(writer);
    match format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Full => base.boxed(),
    }
}

fn init_tracing(mcp_home: &Path, user_cfg: Option<&UserConfig>) {
    env_flags! {
        /// Tracing filter, e.g. "info", "debug", or targets format.
        RUST_LOG: &str = "info";
        /// Preferred filter env (alias). If set, overrides RUST_LOG.
        TRACING_FILTER: &str = "";
        /// Pretty formatting for logs (ignored if TRACING_JSON=true).
        TRACING_PRETTY: bool = false;
        /// Compact single-line formatting for logs (ignored if TRACING_JSON=true)
        TRACING_COMPACT: bool = true;
        /// JSON formatting for logs
        TRACING_JSON: bool = false;
        /// If true, also log to file under <MCP_HOME>/logs or LOG_DIR
        LOG_TO_FILE: bool = false;
        /// Optional explicit log directory. Defaults to <MCP_HOME>/logs
        LOG_DIR: &str = "";
    }

    let mut rust_log = if !(*TRACING_FILTER).is_empty() {
        (*TRACING_FILTER).to_string()
    } else {
        (*RUST_LOG).to_string()
    };
    let mut log_dir: Option<PathBuf> = if !(*LOG_DIR).is_empty() {
        Some(expand_home(*LOG_DIR))
    } else {
        None
    };

    let cfg = user_cfg.and_then(|c| c.logging.as_ref());
    if !(env_set("TRACING_FILTER") || env_set("RUST_LOG"))
        && let Some(level) = cfg.and_then(|c| c.level.as_ref())
    {
        rust_log = level.clone();
    }
    if !env_set("LOG_DIR")
        && let Some(dir) = cfg.and_then(|c| c.dir.as_ref())
    {
        log_dir = Some(expand_home(dir));
    }
    let tracing_json = pick("TRACING_JSON", *TRACING_JSON, cfg.and_then(|c| c.json));
    let tracing_compact = pick("TRACING_COMPACT", *TRACING_COMPACT, cfg.and_then(|c| c.compact));
    let tracing_pretty = pick("TRACING_PRETTY", *TRACING_PRETTY, cfg.and_then(|c| c.pretty));
    let log_to_file = pick("LOG_TO_FILE", *LOG_TO_FILE, cfg.and_then(|c| c.to_file));

    let format = if tracing_json {
        LogFormat::Json
    } else if tracing_compact {
        LogFormat::Compact
    } else if tracing_pretty {
        LogFormat::Pretty
    } else {
        LogFormat::Full
    };

    let filter = EnvFilter::try_new(rust_log).unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries command output; logs always go to stderr.
    let mut layers = vec![fmt_layer(std::io::stderr, format, true)];

    static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
    let mut dir_error = None;
    if log_to_file {
        let dir = log_dir.unwrap_or_else(|| mcp_home.join("logs"));
        match std::fs::create_dir_all(&dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(&dir, "rendezvous-mcp.log");
                let (nb, guard) = tracing_appender::non_blocking(appender);
                let _ = FILE_GUARD.set(guard);
                layers.push(fmt_layer(nb, format, false));
            }
            Err(e) => dir_error = Some((dir, e)),
        }
    }

    if let Err(e) = tracing_subscriber::registry().with(layers).with(filter).try_init() {
        tracing::debug!("tracing already set: {:?}", e);
    }
    if let Some((dir, e)) = dir_error {
        tracing::warn!("failed to create log dir {}: {}", dir.display(), e);
    }
}

fn discovery_settings(mcp_home: &Path, user_cfg: Option<&UserConfig>) -> (DiscoverySettings, String) {
    env_flags! {
        /// Directory holding registry.json. Defaults to <MCP_HOME>/services
        MCP_SERVICES_DIR: &str = "";
        /// Comma-separated static config candidates, first existing wins.
        MCP_CONFIG_FILES: &str = "";
        /// Scan the process table for running servers
        MCP_PROCESS_SCAN: bool = true;
        /// Fetch tool lists from all services concurrently
        MCP_PARALLEL_FETCH: bool = false;
        /// Stdio handshake timeout in milliseconds
        MCP_HANDSHAKE_TIMEOUT_MS: u64 = 5000;
        /// Stdio response timeout for tool listing
        MCP_RESPONSE_TIMEOUT_MS: u64 = 5000;
        /// Hard ceiling for one stdio tool listing
        MCP_CEILING_MS: u64 = 15000;
        /// Stdio response timeout for tool calls
        MCP_CALL_RESPONSE_TIMEOUT_MS: u64 = 30000;
        /// Hard ceiling for one stdio tool call
        MCP_CALL_CEILING_MS: u64 = 35000;
        /// HTTP request timeout
        MCP_HTTP_TIMEOUT_MS: u64 = 30000;
        /// If set, register this assistant under that HTTP endpoint before discovery
        MCP_SELF_ENDPOINT: &str = "";
    }

    let cfg = user_cfg.and_then(|c| c.discovery.as_ref());
    let mut settings = DiscoverySettings::with_home(mcp_home);

    if env_set("MCP_SERVICES_DIR") && !(*MCP_SERVICES_DIR).is_empty() {
        settings.services_dir = expand_home(*MCP_SERVICES_DIR);
    } else if let Some(dir) = cfg.and_then(|c| c.services_dir.as_ref()) {
        settings.services_dir = expand_home(dir);
    }

    if env_set("MCP_CONFIG_FILES") && !(*MCP_CONFIG_FILES).is_empty() {
        settings.config_files = (*MCP_CONFIG_FILES)
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| expand_home(s.trim()))
            .collect();
    } else if let Some(files) = cfg.and_then(|c| c.config_files.as_ref()) {
        settings.config_files = files.iter().map(|s| expand_home(s)).collect();
    }

    settings.process_scan = pick("MCP_PROCESS_SCAN", *MCP_PROCESS_SCAN, cfg.and_then(|c| c.process_scan));
    settings.parallel_fetch = pick(
        "MCP_PARALLEL_FETCH",
        *MCP_PARALLEL_FETCH,
        cfg.and_then(|c| c.parallel_fetch),
    );

    let ms = |key: &str, env_value: u64, cfg_value: Option<u64>| {
        Duration::from_millis(pick(key, env_value, cfg_value))
    };
    let handshake = ms(
        "MCP_HANDSHAKE_TIMEOUT_MS",
        *MCP_HANDSHAKE_TIMEOUT_MS,
        cfg.and_then(|c| c.handshake_timeout_ms),
    );
    settings.list_timeouts = StdioTimeouts {
        handshake,
        response: ms(
            "MCP_RESPONSE_TIMEOUT_MS",
            *MCP_RESPONSE_TIMEOUT_MS,
            cfg.and_then(|c| c.response_timeout_ms),
        ),
        ceiling: ms("MCP_CEILING_MS", *MCP_CEILING_MS, cfg.and_then(|c| c.ceiling_ms)),
    };
    settings.call_timeouts = StdioTimeouts {
        handshake,
        response: ms(
            "MCP_CALL_RESPONSE_TIMEOUT_MS",
            *MCP_CALL_RESPONSE_TIMEOUT_MS,
            cfg.and_then(|c| c.call_response_timeout_ms),
        ),
        ceiling: ms(
            "MCP_CALL_CEILING_MS",
            *MCP_CALL_CEILING_MS,
            cfg.and_then(|c| c.call_ceiling_ms),
        ),
    };
    settings.http_timeout = ms(
        "MCP_HTTP_TIMEOUT_MS",
        *MCP_HTTP_TIMEOUT_MS,
        cfg.and_then(|c| c.http_timeout_ms),
    );

    let self_endpoint = if env_set("MCP_SELF_ENDPOINT") {
        (*MCP_SELF_ENDPOINT).to_string()
    } else {
        cfg.and_then(|c| c.self_endpoint.clone()).unwrap_or_default()
    };
    (settings, self_endpoint)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_flags! {
        /// What to do after discovery: "list" (tools), "services", or "call"
        ACTION: &str = "list";
        /// Tool to invoke when ACTION=call
        CALL_TOOL: &str = "";
        /// Service name or alias to invoke when ACTION=call
        CALL_SERVICE: &str = "";
        /// JSON parameters for the call
        CALL_PARAMS: &str = "{}";
    }

    let mcp_home = resolve_home();
    let user_cfg = match load_user_config(&mcp_home) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ignoring unreadable {}: {e:#}", mcp_home.join("config.toml").display());
            None
        }
    };
    init_tracing(&mcp_home, user_cfg.as_ref());
    tracing::info!("starting rendezvous-mcp (action={})", *ACTION);
    tracing::info!("mcp_home={}", mcp_home.display());

    let (settings, self_endpoint) = discovery_settings(&mcp_home, user_cfg.as_ref());
    tracing::debug!(
        "services_dir={} config_files=[{}] process_scan={} parallel_fetch={}",
        settings.services_dir.display(),
        settings
            .config_files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
        settings.process_scan,
        settings.parallel_fetch
    );

    let mut service = DiscoveryService::new(settings);
    if !self_endpoint.is_empty() {
        let me = ServiceDescriptor::new(
            SELF_SERVICE_NAME,
            "Assistant server that discovers and routes to peer MCP services",
            self_endpoint,
            Transport::Http,
        )
        .with_aliases(self_aliases());
        if let Err(e) = service.register_local_service(me).await {
            tracing::warn!("self-registration failed: {}", e);
        }
    }
    service.initialize().await;

    match *ACTION {
        "list" => print_json(&service.get_available_tools())?,
        "services" => {
            let descriptors: Vec<&ServiceDescriptor> =
                service.services().iter().map(|s| &s.descriptor).collect();
            print_json(&descriptors)?;
        }
        "call" => {
            anyhow::ensure!(!(*CALL_TOOL).is_empty(), "CALL_TOOL is required for ACTION=call");
            anyhow::ensure!(
                !(*CALL_SERVICE).is_empty(),
                "CALL_SERVICE is required for ACTION=call"
            );
            let params: serde_json::Value =
                serde_json::from_str(*CALL_PARAMS).context("CALL_PARAMS is not valid JSON")?;
            let result = service
                .call_external_tool(*CALL_TOOL, *CALL_SERVICE, params)
                .await
                .with_context(|| format!("calling '{}' on '{}'", *CALL_TOOL, *CALL_SERVICE))?;
            print_json(&result)?;
        }
        other => anyhow::bail!("unknown ACTION '{other}' (expected list, services, or call)"),
    }
    Ok(())
}
