//! An in-memory fail2ban server behind the [`ControlChannel`] trait.
//!
//! Understands the subset of the control-socket grammar jailkeeper speaks
//! and keeps just enough state (running flag, loaded jails, banned IPs) for
//! the replies to be consistent. On `start` and `reload` it loads one jail per
//! `*.local` fragment in the watched directory, the way the real daemon reads
//! `jail.d`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use jailkeeper_core::BoxFuture;
use jailkeeper_core::channel::{ChannelError, ControlChannel};

const UNREACHABLE: &str =
    "Failed to access socket path: /var/run/fail2ban/fail2ban.sock. Is fail2ban running?";

#[derive(Default)]
struct State {
    running: bool,
    boot_jails: Vec<String>,
    jails: Vec<String>,
    jail_dir: Option<PathBuf>,
    failing: BTreeSet<String>,
    bans: BTreeMap<String, BTreeSet<String>>,
    shutdown_lag: u32,
    pending_lag: u32,
    log: Vec<String>,
}

impl State {
    fn load(&mut self) {
        let mut jails = self.boot_jails.clone();
        if let Some(dir) = &self.jail_dir {
            if let Ok(entries) = std::fs::read_dir(dir) {
                let mut stems: Vec<String> = entries
                    .filter_map(Result::ok)
                    .map(|e| e.path())
                    .filter(|p| p.extension().is_some_and(|x| x == "local"))
                    .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
                    .collect();
                stems.sort();
                jails.extend(stems);
            }
        }
        let mut seen = BTreeSet::new();
        jails.retain(|j| !self.failing.contains(j) && seen.insert(j.clone()));
        self.jails = jails;
    }

    fn fragment_exists(&self, jail: &str) -> bool {
        self.boot_jails.iter().any(|j| j == jail)
            || self
                .jail_dir
                .as_ref()
                .is_some_and(|d| d.join(format!("{jail}.local")).exists())
    }

    fn handle(&mut self, line: &str) -> Result<String, ChannelError> {
        self.log.push(line.to_string());
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if tokens == ["ping"] && self.pending_lag > 0 {
            self.pending_lag -= 1;
            return Ok("Server replied: pong".to_string());
        }
        if !self.running && tokens != ["start"] {
            return Err(ChannelError::Unavailable(UNREACHABLE.to_string()));
        }

        match tokens.as_slice() {
            ["ping"] => Ok("Server replied: pong".to_string()),
            ["start"] if self.running => Err(daemon_error("Server already running")),
            ["start"] => {
                self.running = true;
                self.load();
                Ok(String::new())
            }
            ["stop"] => {
                self.running = false;
                self.jails.clear();
                self.pending_lag = self.shutdown_lag;
                Ok("Shutdown successful".to_string())
            }
            ["reload"] => {
                self.load();
                Ok("OK".to_string())
            }
            ["status"] => Ok(format!(
                "Status\n|- Number of jail:\t{}\n`- Jail list:\t{}",
                self.jails.len(),
                self.jails.join(", ")
            )),
            ["status", jail] => {
                let jail = self.loaded(jail)?;
                let banned = self.bans.get(&jail).cloned().unwrap_or_default();
                Ok(format!(
                    "Status for the jail: {jail}\n\
                     |- Filter\n\
                     |  |- Currently failed:\t0\n\
                     |  |- Total failed:\t0\n\
                     |  `- File list:\t/var/log/{jail}.log\n\
                     `- Actions\n   \
                        |- Currently banned:\t{n}\n   \
                        |- Total banned:\t{n}\n   \
                        `- Banned IP list:\t{ips}",
                    n = banned.len(),
                    ips = banned.into_iter().collect::<Vec<_>>().join(" "),
                ))
            }
            ["start", jail] | ["start", jail, "--once"] => {
                let jail = jail.to_string();
                if self.failing.contains(&jail) || !self.fragment_exists(&jail) {
                    return Err(daemon_error(&format!("Unable to start jail '{jail}'")));
                }
                if !self.jails.contains(&jail) {
                    self.jails.push(jail);
                }
                Ok(String::new())
            }
            ["stop", jail] => {
                let jail = self.loaded(jail)?;
                self.jails.retain(|j| *j != jail);
                Ok(format!("Jail stopped: {jail}"))
            }
            ["set", jail, "banip", ip] => {
                let jail = self.loaded(jail)?;
                let added = self.bans.entry(jail).or_default().insert(ip.to_string());
                Ok(if added { "1" } else { "0" }.to_string())
            }
            ["set", jail, "unbanip", ip] => {
                let jail = self.loaded(jail)?;
                let removed = self.bans.entry(jail).or_default().remove(*ip);
                Ok(if removed { "1" } else { "0" }.to_string())
            }
            _ => Err(daemon_error(&format!("Invalid command: {line}"))),
        }
    }

    fn loaded(&self, jail: &str) -> Result<String, ChannelError> {
        if self.jails.iter().any(|j| j == jail) {
            Ok(jail.to_string())
        } else {
            Err(daemon_error(&format!("Sorry but the jail '{jail}' does not exist")))
        }
    }
}

fn daemon_error(message: &str) -> ChannelError {
    ChannelError::Daemon {
        code: Some(255),
        message: message.to_string(),
    }
}

/// Stateful stand-in for a fail2ban server. Starts out running with no jails.
pub struct FakeDaemon {
    state: Mutex<State>,
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                running: true,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Jails defined outside `jail.d` (think `jail.local`), loaded already.
    pub fn with_jails(self, jails: &[&str]) -> Self {
        {
            let mut state = self.state();
            state.boot_jails = jails.iter().map(|j| j.to_string()).collect();
            state.jails = state.boot_jails.clone();
        }
        self
    }

    /// Load fragments from `dir` on start and reload.
    pub fn watching(self, dir: impl Into<PathBuf>) -> Self {
        self.state().jail_dir = Some(dir.into());
        self
    }

    /// A jail that never loads, for example because its log file is missing.
    pub fn failing_jail(self, jail: &str) -> Self {
        self.state().failing.insert(jail.to_string());
        self
    }

    /// Keep answering `ping` for `pings` probes after `stop`.
    pub fn with_shutdown_lag(self, pings: u32) -> Self {
        self.state().shutdown_lag = pings;
        self
    }

    pub fn stopped(self) -> Self {
        {
            let mut state = self.state();
            state.running = false;
            state.jails.clear();
        }
        self
    }

    /// Every command line received, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state().log.clone()
    }

    /// [`commands`](Self::commands) without the `ping` probes.
    pub fn lifecycle_commands(&self) -> Vec<String> {
        self.commands().into_iter().filter(|c| c != "ping").collect()
    }

    pub fn clear_log(&self) {
        self.state().log.clear();
    }

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    pub fn live_jails(&self) -> Vec<String> {
        self.state().jails.clone()
    }

    pub fn banned(&self, jail: &str) -> Vec<String> {
        self.state()
            .bans
            .get(jail)
            .map(|ips| ips.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for FakeDaemon {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlChannel for FakeDaemon {
    fn send<'a>(&'a self, command_line: &'a str) -> BoxFuture<'a, Result<String, ChannelError>> {
        Box::pin(async move {
            // Give other tasks a chance to interleave, as a real round-trip would.
            tokio::task::yield_now().await;
            self.state().handle(command_line)
        })
    }
}
