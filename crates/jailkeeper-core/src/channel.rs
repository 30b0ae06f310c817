//! Control channel: one command line in, raw reply text out.
//!
//! [`ControlChannel`] is the seam between jailkeeper and the running
//! fail2ban server. The production implementation, [`ClientChannel`],
//! shells out to `fail2ban-client --socket <path> <tokens...>`; tests swap
//! in a scripted fake. No parsing, retrying or timeouts happen here.

use std::path::PathBuf;
use std::process::Stdio;

use tracing::{debug, warn};

use crate::BoxFuture;

/// Why a command produced no usable reply.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The daemon is not running or its socket cannot be reached.
    #[error("daemon unavailable: {0}")]
    Unavailable(String),

    /// The daemon answered, but reported an error.
    #[error("daemon reported an error (exit code {code:?}): {message}")]
    Daemon { code: Option<i32>, message: String },

    /// Spawning the client or reading its output failed.
    #[error("control channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A request/response channel to the daemon's control socket.
///
/// `command_line` is split on whitespace into protocol tokens. One call is
/// one synchronous round-trip; callers serialize access themselves.
pub trait ControlChannel: Send + Sync {
    fn send<'a>(&'a self, command_line: &'a str) -> BoxFuture<'a, Result<String, ChannelError>>;
}

/// Phrases `fail2ban-client` prints when it cannot reach the server.
const UNREACHABLE_MARKERS: &[&str] = &[
    "failed to access socket",
    "is fail2ban running",
    "no such file or directory",
    "connection refused",
];

/// [`ControlChannel`] backed by the `fail2ban-client` executable.
pub struct ClientChannel {
    client_bin: PathBuf,
    socket_path: PathBuf,
}

impl ClientChannel {
    pub fn new(client_bin: impl Into<PathBuf>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            client_bin: client_bin.into(),
            socket_path: socket_path.into(),
        }
    }

    pub fn from_config(config: &jailkeeper_config::DaemonConfig) -> Self {
        Self::new(&config.client_bin, &config.socket_path)
    }

    fn classify_failure(&self, code: Option<i32>, stdout: &str, stderr: &str) -> ChannelError {
        let message = if stderr.is_empty() { stdout } else { stderr }.to_string();
        let lower = message.to_lowercase();
        if !self.socket_path.exists() || UNREACHABLE_MARKERS.iter().any(|m| lower.contains(m)) {
            return ChannelError::Unavailable(if message.is_empty() {
                format!("socket {} not reachable", self.socket_path.display())
            } else {
                message
            });
        }
        ChannelError::Daemon { code, message }
    }
}

impl ControlChannel for ClientChannel {
    fn send<'a>(&'a self, command_line: &'a str) -> BoxFuture<'a, Result<String, ChannelError>> {
        Box::pin(async move {
            let tokens: Vec<&str> = command_line.split_whitespace().collect();
            if tokens.is_empty() {
                return Err(ChannelError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "empty command line",
                )));
            }

            debug!(
                client = %self.client_bin.display(),
                socket = %self.socket_path.display(),
                command = command_line,
                "sending daemon command"
            );

            let output = tokio::process::Command::new(&self.client_bin)
                .arg("--socket")
                .arg(&self.socket_path)
                .args(&tokens)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await?;

            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

            if output.status.success() {
                debug!(command = command_line, reply = %stdout, "daemon replied");
                Ok(stdout)
            } else {
                let err = self.classify_failure(output.status.code(), &stdout, &stderr);
                warn!(command = command_line, error = %err, "daemon command failed");
                Err(err)
            }
        })
    }
}
