//! Line protocol conversation with a spawned peer process.
//!
//! The child is started through the platform shell with all three standard
//! streams piped. It is expected to announce `{"type":"initialized"}`, after
//! which the single request is written to its stdin. The first message that
//! carries a `content` array is the answer. One timer governs failure at a
//! time (handshake, then response) and an outer ceiling bounds the whole
//! exchange. Whatever happens, the child is killed before returning.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use super::lines::{Inbound, LineBuffer, classify};
use super::{Invoker, WireRequest};
use super::target::StdioTarget;
use crate::error::{DiscoveryError, Result, TimeoutPhase};
use crate::model::ServiceDescriptor;

const STDERR_GRACE: Duration = Duration::from_millis(250);
const KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdioTimeouts {
    pub handshake: Duration,
    pub response: Duration,
    /// Hard bound on the whole exchange, spawn to exit.
    pub ceiling: Duration,
}

impl StdioTimeouts {
    pub const LIST_DEFAULT: StdioTimeouts = StdioTimeouts {
        handshake: Duration::from_secs(5),
        response: Duration::from_secs(5),
        ceiling: Duration::from_secs(15),
    };

    pub const CALL_DEFAULT: StdioTimeouts = StdioTimeouts {
        handshake: Duration::from_secs(5),
        response: Duration::from_secs(30),
        ceiling: Duration::from_secs(35),
    };
}

#[derive(Debug, Clone)]
pub struct StdioInvoker {
    list: StdioTimeouts,
    call: StdioTimeouts,
}

impl Default for StdioInvoker {
    fn default() -> Self {
        Self::new(StdioTimeouts::LIST_DEFAULT, StdioTimeouts::CALL_DEFAULT)
    }
}

impl StdioInvoker {
    pub fn new(list: StdioTimeouts, call: StdioTimeouts) -> Self {
        Self { list, call }
    }

    /// Run one conversation. `Ok(None)` means the child exited cleanly
    /// without ever answering.
    pub async fn exchange(
        &self,
        service: &ServiceDescriptor,
        request: &WireRequest<'_>,
        timeouts: StdioTimeouts,
    ) -> Result<Option<JsonValue>> {
        let id = Uuid::new_v4();
        let span = tracing::debug_span!("stdio", service = %service.name, invocation = %id);
        self.exchange_inner(service, request, timeouts)
            .instrument(span)
            .await
    }

    async fn exchange_inner(
        &self,
        service: &ServiceDescriptor,
        request: &WireRequest<'_>,
        timeouts: StdioTimeouts,
    ) -> Result<Option<JsonValue>> {
        let target = StdioTarget::from_endpoint(&service.endpoint, &service.name);
        let mut outbound = serde_json::to_string(request)
            .map_err(|e| DiscoveryError::parse("outbound request", e))?;
        outbound.push('\n');

        tracing::debug!(
            "spawning `{}` in {}",
            target.command,
            target.cwd.display()
        );
        let mut child = spawn(&target).map_err(|e| {
            DiscoveryError::transport(
                &service.name,
                format!("failed to spawn `{}`: {e}", target.command),
            )
        })?;

        let group = ProcessGroup::of(&child);
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_task = collect_stderr(&mut child, Arc::clone(&stderr_buf));

        let outcome = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => {
                let conv = Conversation {
                    service: &service.name,
                    outbound,
                    timeouts,
                    stdin: Some(stdin),
                    stdout,
                    stderr_buf: &stderr_buf,
                    stderr_task,
                };
                match tokio::time::timeout(timeouts.ceiling, conv.run(&mut child)).await {
                    Ok(res) => res,
                    Err(_) => Err(DiscoveryError::ProtocolTimeout {
                        service: service.name.clone(),
                        phase: TimeoutPhase::Ceiling,
                        after: timeouts.ceiling,
                    }),
                }
            }
            _ => {
                if let Some(task) = stderr_task {
                    task.abort();
                }
                Err(DiscoveryError::transport(&service.name, "child stdio was not piped"))
            }
        };

        terminate(&mut child, group).await;
        match &outcome {
            Ok(Some(_)) => tracing::debug!("resolved"),
            Ok(None) => tracing::debug!("child exited cleanly without a response"),
            Err(e) => tracing::debug!("failed: {}", e),
        }
        outcome
    }
}

#[async_trait]
impl Invoker for StdioInvoker {
    async fn list_tools(&self, service: &ServiceDescriptor) -> Result<Vec<JsonValue>> {
        let msg = self
            .exchange(service, &WireRequest::list_tools(), self.list)
            .await?;
        Ok(match msg {
            Some(JsonValue::Object(mut map)) => match map.remove("content") {
                Some(JsonValue::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        })
    }

    async fn call_tool(
        &self,
        service: &ServiceDescriptor,
        tool: &str,
        params: JsonValue,
    ) -> Result<JsonValue> {
        let msg = self
            .exchange(service, &WireRequest::new(tool, params), self.call)
            .await?;
        Ok(msg.unwrap_or_else(|| json!({ "content": [] })))
    }
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(line);
    cmd
}

#[cfg(not(windows))]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}

fn spawn(target: &StdioTarget) -> std::io::Result<Child> {
    let mut cmd = shell_command(&target.command);
    cmd.current_dir(&target.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group so cleanup reaches whatever the shell forks.
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.spawn()
}

fn collect_stderr(child: &mut Child, sink: Arc<Mutex<Vec<u8>>>) -> Option<JoinHandle<()>> {
    let mut stderr = child.stderr.take()?;
    Some(tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match stderr.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        }
    }))
}

/// Process group led by a spawned child.
#[derive(Debug, Clone, Copy)]
struct ProcessGroup(Option<u32>);

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self(child.id())
    }

    #[cfg(unix)]
    fn kill(self) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Some(pgid) = self.0.and_then(|id| i32::try_from(id).ok()) else {
            return;
        };
        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => tracing::debug!("killing process group {} failed: {}", pgid, e),
        }
    }

    #[cfg(not(unix))]
    fn kill(self) {
        let _ = self.0;
    }
}

/// Kill the child's whole process group, then make sure the child itself is
/// gone and reaped.
async fn terminate(child: &mut Child, group: ProcessGroup) {
    group.kill();
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    if let Err(e) = child.start_kill() {
        tracing::debug!("kill failed: {}", e);
    }
    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
        tracing::warn!("child did not exit within {:?} of being killed", KILL_GRACE);
    }
}

struct Conversation<'a> {
    service: &'a str,
    outbound: String,
    timeouts: StdioTimeouts,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
    stderr_buf: &'a Arc<Mutex<Vec<u8>>>,
    stderr_task: Option<JoinHandle<()>>,
}

impl Conversation<'_> {
    async fn run(mut self, child: &mut Child) -> Result<Option<JsonValue>> {
        let mut phase = TimeoutPhase::Handshake;
        let mut deadline = Instant::now() + self.timeouts.handshake;
        let mut lines = LineBuffer::new();
        let mut chunk = [0u8; 8192];
        let mut stdout_open = true;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(DiscoveryError::ProtocolTimeout {
                        service: self.service.to_string(),
                        phase,
                        after: self.phase_bound(phase),
                    });
                }
                read = self.stdout.read(&mut chunk), if stdout_open => {
                    let batch: Vec<String> = match read {
                        Ok(0) => {
                            stdout_open = false;
                            lines.finish().into_iter().collect()
                        }
                        Ok(n) => lines.push(&chunk[..n]),
                        Err(e) => {
                            tracing::debug!("stdout read failed: {}", e);
                            stdout_open = false;
                            lines.finish().into_iter().collect()
                        }
                    };
                    for line in batch {
                        match classify(&line) {
                            Inbound::Response(msg) => {
                                if phase == TimeoutPhase::Handshake {
                                    tracing::debug!("response arrived before handshake");
                                }
                                return Ok(Some(msg));
                            }
                            Inbound::Initialized if phase == TimeoutPhase::Handshake => {
                                self.send_request().await;
                                phase = TimeoutPhase::Response;
                                deadline = Instant::now() + self.timeouts.response;
                            }
                            Inbound::Initialized => tracing::debug!("repeated handshake ignored"),
                            Inbound::Other => tracing::debug!("ignoring message: {}", line),
                            Inbound::Noise => tracing::debug!("ignoring output: {}", line),
                        }
                    }
                }
                status = child.wait(), if !stdout_open => {
                    let status = status.map_err(|e| {
                        DiscoveryError::transport(self.service, format!("wait failed: {e}"))
                    })?;
                    if status.success() {
                        return Ok(None);
                    }
                    let stderr = self.drain_stderr().await;
                    return Err(DiscoveryError::ChildExited {
                        service: self.service.to_string(),
                        status: status.to_string(),
                        stderr,
                        stdout: lines.transcript(),
                    });
                }
            }
        }
    }

    fn phase_bound(&self, phase: TimeoutPhase) -> Duration {
        match phase {
            TimeoutPhase::Handshake => self.timeouts.handshake,
            TimeoutPhase::Response => self.timeouts.response,
            TimeoutPhase::Ceiling => self.timeouts.ceiling,
        }
    }

    /// A failed write is not fatal; the response timer still decides.
    async fn send_request(&mut self) {
        let Some(stdin) = self.stdin.as_mut() else {
            return;
        };
        let outbound = self.outbound.as_bytes();
        let res = match stdin.write_all(outbound).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        match res {
            Ok(()) => tracing::debug!("request sent"),
            Err(e) => tracing::debug!("writing request failed: {}", e),
        }
    }

    async fn drain_stderr(&mut self) -> String {
        if let Some(mut task) = self.stderr_task.take()
            && tokio::time::timeout(STDERR_GRACE, &mut task).await.is_err()
        {
            task.abort();
        }
        self.stderr_buf
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).trim_end().to_string())
            .unwrap_or_default()
    }
}

impl Drop for Conversation<'_> {
    fn drop(&mut self) {
        // Closing stdin lets a well-behaved peer see EOF before the kill.
        self.stdin.take();
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}
