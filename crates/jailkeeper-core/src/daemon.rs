//! Typed facade over the fail2ban control channel.
//!
//! [`Daemon`] owns the shared [`ControlChannel`] and lets exactly one command
//! be in flight at a time, since the control socket is strictly
//! request/response. Long multi-command sequences (stop → start → verify)
//! are serialized one level up by the
//! [`ReconcileEngine`](crate::engine::ReconcileEngine).

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::addr::is_ip_or_cidr;
use crate::channel::{ChannelError, ControlChannel};
use crate::command::{Command, CommandError};
use crate::parser::{self, JailStatus, ParseError, Parsed};

/// Errors from typed daemon operations.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("invalid command argument: {0}")]
    Command(#[from] CommandError),

    #[error("invalid IP address or CIDR block: {0:?}")]
    InvalidAddress(String),
}

/// Result of a query, tagged so consumers match every case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DaemonReply {
    /// Jail names recovered from a status reply.
    Jails(Vec<String>),
    /// Successful reply with no structure to extract.
    RawText(String),
    /// The control socket could not be reached.
    Unavailable(String),
    /// The daemon answered with an error.
    Failed(String),
}

/// What a ban or unban actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "count", rename_all = "snake_case")]
pub enum BanOutcome {
    /// This many addresses changed state.
    Applied(u32),
    /// `banip` reported zero new bans.
    AlreadyBanned,
    /// `unbanip` reported zero removals.
    NotBanned,
}

/// One command and what came back, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    /// Reply text on success, error text on failure.
    pub response: String,
}

fn address_command(
    ip: &str,
    build: impl FnOnce() -> Result<Command, CommandError>,
) -> Result<Command, DaemonError> {
    if !is_ip_or_cidr(ip) {
        return Err(DaemonError::InvalidAddress(ip.to_string()));
    }
    Ok(build()?)
}

/// Serialized access to the daemon's control socket.
pub struct Daemon {
    channel: Arc<dyn ControlChannel>,
    in_flight: Mutex<()>,
}

impl Daemon {
    pub fn new(channel: Arc<dyn ControlChannel>) -> Self {
        Self {
            channel,
            in_flight: Mutex::new(()),
        }
    }

    /// Send one command and return the raw reply.
    pub async fn send(&self, command: &Command) -> Result<String, ChannelError> {
        let line = command.to_string();
        let _guard = self.in_flight.lock().await;
        debug!(command = %line, "daemon command");
        self.channel.send(&line).await
    }

    /// Send one command and parse the reply by its response family.
    pub async fn run(&self, command: &Command) -> Result<Parsed, DaemonError> {
        let text = self.send(command).await?;
        Ok(parser::parse(command.family(), &command.to_string(), &text)?)
    }

    /// Send one command, recording the outcome instead of failing.
    pub async fn report(&self, command: &Command) -> CommandReport {
        let result = self.send(command).await;
        let (ok, response) = match result {
            Ok(text) => (true, text),
            Err(e) => (false, e.to_string()),
        };
        CommandReport {
            command: command.to_string(),
            ok,
            response,
        }
    }

    /// Liveness probe: does the server answer `ping`?
    pub async fn ping(&self) -> bool {
        self.send(&Command::Ping).await.is_ok()
    }

    /// Run `command` and fold the result into a [`DaemonReply`].
    pub async fn query(&self, command: &Command) -> DaemonReply {
        match self.send(command).await {
            Ok(text) if command == &Command::Status => {
                DaemonReply::Jails(parser::parse_jail_list(&text))
            }
            Ok(text) => DaemonReply::RawText(text),
            Err(ChannelError::Unavailable(reason)) => DaemonReply::Unavailable(reason),
            Err(e) => DaemonReply::Failed(e.to_string()),
        }
    }

    pub async fn jail_status(&self, jail: &str) -> Result<JailStatus, DaemonError> {
        let command = Command::jail_status(jail)?;
        match self.run(&command).await? {
            Parsed::JailStatus(status) => Ok(status),
            other => Err(mismatch(&command, &other)),
        }
    }

    /// Ban `ip` (address or CIDR block) in `jail`.
    pub async fn ban(&self, jail: &str, ip: &str) -> Result<BanOutcome, DaemonError> {
        let command = address_command(ip, || Command::ban(jail, ip))?;
        let outcome = self.count(&command, BanOutcome::AlreadyBanned).await?;
        info!(jail, ip, ?outcome, "ban requested");
        Ok(outcome)
    }

    /// Lift a ban on `ip` in `jail`.
    pub async fn unban(&self, jail: &str, ip: &str) -> Result<BanOutcome, DaemonError> {
        let command = address_command(ip, || Command::unban(jail, ip))?;
        let outcome = self.count(&command, BanOutcome::NotBanned).await?;
        info!(jail, ip, ?outcome, "unban requested");
        Ok(outcome)
    }

    /// Run a ban-count command. A bare `0` is the daemon saying "nothing
    /// changed" and maps to `unchanged`; any other non-positive or textual
    /// reply stays an error.
    async fn count(
        &self,
        command: &Command,
        unchanged: BanOutcome,
    ) -> Result<BanOutcome, DaemonError> {
        match self.run(command).await {
            Ok(Parsed::Count(n)) => Ok(BanOutcome::Applied(n)),
            Ok(other) => Err(mismatch(command, &other)),
            Err(DaemonError::Parse(ParseError::UnexpectedResponse { text, .. }))
                if text.trim() == "0" =>
            {
                Ok(unchanged)
            }
            Err(e) => {
                warn!(command = %command, error = %e, "unexpected ban count reply");
                Err(e)
            }
        }
    }
}

/// A reply parsed under a family the command does not belong to.
fn mismatch(command: &Command, parsed: &Parsed) -> DaemonError {
    DaemonError::Parse(ParseError::UnexpectedResponse {
        command: command.to_string(),
        text: format!("{parsed:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxFuture;
    use std::sync::Mutex as StdMutex;

    /// Replies with a fixed text and remembers every command line.
    struct Canned {
        reply: Result<String, &'static str>,
        seen: StdMutex<Vec<String>>,
    }

    impl Canned {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: StdMutex::new(Vec::new()),
            })
        }

        fn unavailable() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("socket missing"),
                seen: StdMutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl ControlChannel for Canned {
        fn send<'a>(&'a self, line: &'a str) -> BoxFuture<'a, Result<String, ChannelError>> {
            self.seen.lock().unwrap().push(line.to_string());
            let reply = self
                .reply
                .clone()
                .map_err(|r| ChannelError::Unavailable(r.to_string()));
            Box::pin(async move { reply })
        }
    }

    #[tokio::test]
    async fn test_ban_applied() {
        let channel = Canned::ok("1");
        let daemon = Daemon::new(channel.clone());
        let outcome = daemon.ban("sshd", "203.0.113.9").await.unwrap();
        assert_eq!(outcome, BanOutcome::Applied(1));
        assert_eq!(channel.seen(), vec!["set sshd banip 203.0.113.9"]);
    }

    #[tokio::test]
    async fn test_ban_zero_means_already_banned() {
        let daemon = Daemon::new(Canned::ok("0"));
        assert_eq!(
            daemon.ban("sshd", "203.0.113.9").await.unwrap(),
            BanOutcome::AlreadyBanned
        );
        assert_eq!(
            daemon.unban("sshd", "203.0.113.9").await.unwrap(),
            BanOutcome::NotBanned
        );
    }

    #[tokio::test]
    async fn test_ban_text_reply_is_unexpected() {
        let daemon = Daemon::new(Canned::ok("203.0.113.9 is already banned"));
        let err = daemon.ban("sshd", "203.0.113.9").await.unwrap_err();
        assert!(matches!(err, DaemonError::Parse(ParseError::UnexpectedResponse { .. })));
    }

    #[tokio::test]
    async fn test_ban_rejects_invalid_address_without_sending() {
        let channel = Canned::ok("1");
        let daemon = Daemon::new(channel.clone());
        let err = daemon.ban("sshd", "999.1.1.1").await.unwrap_err();
        assert!(matches!(err, DaemonError::InvalidAddress(_)));
        assert!(channel.seen().is_empty());
    }

    #[tokio::test]
    async fn test_query_tags_replies() {
        let daemon = Daemon::new(Canned::ok("`- Jail list: sshd, web"));
        assert_eq!(
            daemon.query(&Command::Status).await,
            DaemonReply::Jails(vec!["sshd".to_string(), "web".to_string()])
        );
        assert!(matches!(
            daemon.query(&Command::Reload).await,
            DaemonReply::RawText(_)
        ));

        let down = Daemon::new(Canned::unavailable());
        assert_eq!(
            down.query(&Command::Status).await,
            DaemonReply::Unavailable("socket missing".to_string())
        );
        assert!(!down.ping().await);
    }

    #[tokio::test]
    async fn test_report_records_failures() {
        let daemon = Daemon::new(Canned::unavailable());
        let report = daemon.report(&Command::Stop).await;
        assert_eq!(report.command, "stop");
        assert!(!report.ok);
        assert!(report.response.contains("socket missing"));
    }

    #[tokio::test]
    async fn test_jail_status_parsed() {
        let channel = Canned::ok("`- Banned IP list:\t192.0.2.1");
        let daemon = Daemon::new(channel.clone());
        let status = daemon.jail_status("sshd").await.unwrap();
        assert_eq!(status.jail, "sshd");
        assert_eq!(status.banned_ips, vec!["192.0.2.1"]);
        assert_eq!(channel.seen(), vec!["status sshd"]);
    }

    #[tokio::test]
    async fn test_run_dispatches_by_family() {
        let daemon = Daemon::new(Canned::ok("2"));
        assert_eq!(
            daemon.run(&Command::ban("sshd", "203.0.113.0/31").unwrap()).await.unwrap(),
            Parsed::Count(2)
        );
        assert_eq!(
            daemon.run(&Command::Reload).await.unwrap(),
            Parsed::Text("2".to_string())
        );
        assert!(matches!(
            daemon.run(&Command::Status).await.unwrap(),
            Parsed::Jails(_)
        ));
    }
}
