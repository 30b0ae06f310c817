//! ReconcileEngine: bring the running daemon in line with the jail fragments.
//!
//! Creating a jail runs a fixed sequence:
//!
//! ```text
//! Validating → Writing → Stopping → Starting → Verifying ─┬→ Active
//!                                                         └→ Retrying → Degraded
//! ```
//!
//! The daemon reads its configuration wholesale at startup and has no
//! reliable hot-add, so a new jail needs a full `stop`/`start`. Removing one
//! only needs `stop <jail>` and a `reload`.
//!
//! The daemon signals neither stop nor start completion. Between steps the
//! engine polls `ping` (see [`SettlePolicy`]) instead of sleeping for a fixed
//! time. Every reconciliation holds one global lifecycle lock from the first
//! write to the terminal state, so two requests never interleave their
//! stop/start commands. A reconciliation that has begun always runs to its
//! terminal state.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::daemon::{CommandReport, Daemon};
use crate::jail::JailDefinition;
use crate::parser::parse_jail_list;
use crate::store::{JailConfigStore, StoreError, is_fragment_name};

/// How long to wait for the daemon after lifecycle commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    /// Pause between probes.
    pub interval: Duration,
    /// Probes before giving up on a settle wait.
    pub max_attempts: u32,
    /// `status` queries before a jail is declared absent.
    pub verify_attempts: u32,
}

impl SettlePolicy {
    pub fn from_config(config: &jailkeeper_config::DaemonConfig) -> Self {
        Self {
            interval: config.settle_interval(),
            max_attempts: config.settle_max_attempts.max(1),
            verify_attempts: config.verify_attempts.max(1),
        }
    }

    /// Upper bound on the time one settle wait can take.
    pub fn max_wait(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self::from_config(&jailkeeper_config::DaemonConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    Validating,
    Writing,
    Stopping,
    Starting,
    Verifying,
    Retrying,
    /// The jail was seen in the daemon's jail list.
    Active,
    /// The daemon restarted but the jail was never seen.
    Degraded,
}

/// Everything one create/update reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub jail: String,
    /// States in the order they were entered; the last is terminal.
    pub states: Vec<ReconcileState>,
    pub stop: CommandReport,
    /// Whether the daemon went away within the settle budget.
    pub stop_settled: bool,
    pub start: CommandReport,
    /// Whether the daemon answered `ping` within the settle budget.
    pub start_settled: bool,
    /// Last `status` reply seen while verifying.
    pub status: CommandReport,
    /// Jails reported by that reply.
    pub live_jails: Vec<String>,
    pub active: bool,
    /// The `start <jail> --once` attempt, if verification failed.
    pub fallback: Option<CommandReport>,
}

impl ReconcileOutcome {
    pub fn state(&self) -> ReconcileState {
        self.states
            .last()
            .copied()
            .unwrap_or(ReconcileState::Validating)
    }
}

/// Result of removing a jail. Both reports are `None` when nothing existed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub jail: String,
    pub existed: bool,
    pub stop: Option<CommandReport>,
    pub reload: Option<CommandReport>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("invalid jail definition: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("jail configuration not written: {0}")]
    Filesystem(#[from] StoreError),
}

pub struct ReconcileEngine {
    daemon: Arc<Daemon>,
    store: Arc<JailConfigStore>,
    policy: SettlePolicy,
    lifecycle: Mutex<()>,
}

impl ReconcileEngine {
    pub fn new(daemon: Arc<Daemon>, store: Arc<JailConfigStore>, policy: SettlePolicy) -> Self {
        Self {
            daemon,
            store,
            policy,
            lifecycle: Mutex::new(()),
        }
    }

    pub fn daemon(&self) -> &Arc<Daemon> {
        &self.daemon
    }

    pub fn store(&self) -> &Arc<JailConfigStore> {
        &self.store
    }

    pub fn policy(&self) -> SettlePolicy {
        self.policy
    }

    async fn exclusive(&self) -> MutexGuard<'_, ()> {
        if let Ok(guard) = self.lifecycle.try_lock() {
            return guard;
        }
        debug!("waiting for in-progress reconciliation");
        self.lifecycle.lock().await
    }

    /// Create or overwrite a jail and restart the daemon to load it.
    ///
    /// Returns `Err` only before any daemon command is sent (validation or a
    /// failed fragment write). A jail that never shows up is an `Ok` outcome
    /// in state [`Degraded`](ReconcileState::Degraded).
    pub async fn create(&self, def: JailDefinition) -> Result<ReconcileOutcome, ReconcileError> {
        let def = def.normalized();
        let name = def.name.clone();
        let mut states = Vec::new();

        enter(&mut states, &name, ReconcileState::Validating);
        def.check().map_err(ReconcileError::Validation)?;

        let _lifecycle = self.exclusive().await;

        enter(&mut states, &name, ReconcileState::Writing);
        self.store.write(&def).await?;

        enter(&mut states, &name, ReconcileState::Stopping);
        let stop = self.daemon.report(&Command::Stop).await;
        if !stop.ok {
            warn!(jail = %name, response = %stop.response, "stop failed; continuing");
        }
        let stop_settled = self.settle(false).await;

        enter(&mut states, &name, ReconcileState::Starting);
        let start = self.daemon.report(&Command::Start).await;
        if !start.ok {
            warn!(jail = %name, response = %start.response, "start failed");
        }
        let start_settled = self.settle(true).await;

        enter(&mut states, &name, ReconcileState::Verifying);
        let (status, live_jails) = self.verify(&name).await;
        let active = live_jails.contains(&name);

        let fallback = if active {
            enter(&mut states, &name, ReconcileState::Active);
            None
        } else {
            enter(&mut states, &name, ReconcileState::Retrying);
            let report = match Command::start_jail_once(&name) {
                Ok(command) => self.daemon.report(&command).await,
                Err(e) => CommandReport {
                    command: format!("start {name} --once"),
                    ok: false,
                    response: e.to_string(),
                },
            };
            enter(&mut states, &name, ReconcileState::Degraded);
            warn!(jail = %name, fallback_ok = report.ok, "jail not confirmed active");
            Some(report)
        };

        Ok(ReconcileOutcome {
            jail: name,
            states,
            stop,
            stop_settled,
            start,
            start_settled,
            status,
            live_jails,
            active,
            fallback,
        })
    }

    /// Stop one jail, remove its fragment and reload.
    ///
    /// A jail without a fragment is reported as `existed: false` and the
    /// daemon is not touched.
    pub async fn delete(&self, name: &str) -> Result<DeleteOutcome, ReconcileError> {
        let name = name.trim();
        if !is_fragment_name(name) {
            return Err(ReconcileError::Validation(vec![format!(
                "name: {name:?} is not a valid jail name"
            )]));
        }
        let stop_command =
            Command::stop_jail(name).map_err(|e| ReconcileError::Validation(vec![e.to_string()]))?;

        let _lifecycle = self.exclusive().await;

        if !self.store.exists(name).await? {
            info!(jail = name, "delete requested for unconfigured jail");
            return Ok(DeleteOutcome {
                jail: name.to_string(),
                existed: false,
                stop: None,
                reload: None,
            });
        }

        let stop = self.daemon.report(&stop_command).await;
        if !stop.ok {
            warn!(jail = name, response = %stop.response, "stopping jail failed; deleting anyway");
        }
        let existed = self.store.delete(name).await?;
        self.settle(true).await;
        let reload = self.daemon.report(&Command::Reload).await;
        info!(jail = name, reload_ok = reload.ok, "jail deleted");

        Ok(DeleteOutcome {
            jail: name.to_string(),
            existed,
            stop: Some(stop),
            reload: Some(reload),
        })
    }

    /// Send a lifecycle command (`start`, `stop`, `reload`, per-jail
    /// start/stop) while no reconciliation is running.
    pub async fn control(&self, command: &Command) -> CommandReport {
        let _lifecycle = self.exclusive().await;
        let report = self.daemon.report(command).await;
        info!(command = %report.command, ok = report.ok, "lifecycle command");
        report
    }

    /// Poll `ping` until it reports `running`, within the settle budget.
    async fn settle(&self, running: bool) -> bool {
        for attempt in 1..=self.policy.max_attempts {
            if self.daemon.ping().await == running {
                debug!(running, attempt, "daemon settled");
                return true;
            }
            tokio::time::sleep(self.policy.interval).await;
        }
        warn!(
            running,
            waited = ?self.policy.max_wait(),
            "daemon did not settle; continuing"
        );
        false
    }

    /// Query `status` until `name` shows up or attempts run out.
    async fn verify(&self, name: &str) -> (CommandReport, Vec<String>) {
        let mut attempt = 1;
        loop {
            let report = self.daemon.report(&Command::Status).await;
            let jails = if report.ok {
                parse_jail_list(&report.response)
            } else {
                Vec::new()
            };
            if jails.iter().any(|j| j == name) || attempt >= self.policy.verify_attempts {
                return (report, jails);
            }
            debug!(jail = name, attempt, "jail not listed yet");
            attempt += 1;
            tokio::time::sleep(self.policy.interval).await;
        }
    }
}

fn enter(states: &mut Vec<ReconcileState>, jail: &str, state: ReconcileState) {
    info!(jail, ?state, "reconcile");
    states.push(state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_config() {
        let config = jailkeeper_config::DaemonConfig {
            settle_interval_ms: 250,
            settle_max_attempts: 8,
            verify_attempts: 0,
            ..Default::default()
        };
        let policy = SettlePolicy::from_config(&config);
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert_eq!(policy.max_wait(), Duration::from_secs(2));
        assert_eq!(policy.verify_attempts, 1);
    }

    #[test]
    fn test_outcome_state_is_last_entered() {
        let report = CommandReport {
            command: "status".to_string(),
            ok: true,
            response: String::new(),
        };
        let outcome = ReconcileOutcome {
            jail: "sshd".to_string(),
            states: vec![ReconcileState::Verifying, ReconcileState::Active],
            stop: report.clone(),
            stop_settled: true,
            start: report.clone(),
            start_settled: true,
            status: report,
            live_jails: vec!["sshd".to_string()],
            active: true,
            fallback: None,
        };
        assert_eq!(outcome.state(), ReconcileState::Active);
    }
}
