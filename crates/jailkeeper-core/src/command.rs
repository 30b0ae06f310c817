//! The fail2ban control-socket command vocabulary.
//!
//! Every command renders to a single whitespace-separated line; the channel
//! splits it back into protocol tokens. Dynamic arguments (jail names, IPs)
//! therefore must be single tokens, which the constructors enforce.

use std::fmt;

/// A dynamic argument could not be used as a protocol token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("{what} must not be empty")]
    Empty { what: &'static str },

    #[error("{what} must be a single token, got {value:?}")]
    NotAToken { what: &'static str, value: String },
}

fn token(what: &'static str, value: &str) -> Result<String, CommandError> {
    if value.is_empty() {
        return Err(CommandError::Empty { what });
    }
    if value.chars().any(char::is_whitespace) {
        return Err(CommandError::NotAToken {
            what,
            value: value.to_string(),
        });
    }
    Ok(value.to_string())
}

/// One request to the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Liveness probe.
    Ping,
    /// Start the server, loading every jail from disk.
    Start,
    /// Stop the server and all jails.
    Stop,
    /// Reload configuration in place.
    Reload,
    /// Global status (jail list).
    Status,
    /// Status of one jail (counters, banned IPs).
    JailStatus(String),
    /// Start a single jail.
    StartJail(String),
    /// Start a single jail with the `--once` modifier.
    StartJailOnce(String),
    /// Stop a single jail.
    StopJail(String),
    BanIp { jail: String, ip: String },
    UnbanIp { jail: String, ip: String },
}

impl Command {
    pub fn jail_status(jail: &str) -> Result<Self, CommandError> {
        Ok(Self::JailStatus(token("jail name", jail)?))
    }

    pub fn start_jail(jail: &str) -> Result<Self, CommandError> {
        Ok(Self::StartJail(token("jail name", jail)?))
    }

    pub fn start_jail_once(jail: &str) -> Result<Self, CommandError> {
        Ok(Self::StartJailOnce(token("jail name", jail)?))
    }

    pub fn stop_jail(jail: &str) -> Result<Self, CommandError> {
        Ok(Self::StopJail(token("jail name", jail)?))
    }

    pub fn ban(jail: &str, ip: &str) -> Result<Self, CommandError> {
        Ok(Self::BanIp {
            jail: token("jail name", jail)?,
            ip: token("IP address", ip)?,
        })
    }

    pub fn unban(jail: &str, ip: &str) -> Result<Self, CommandError> {
        Ok(Self::UnbanIp {
            jail: token("jail name", jail)?,
            ip: token("IP address", ip)?,
        })
    }

    /// The response grammar this command's reply follows.
    pub fn family(&self) -> CommandFamily {
        match self {
            Self::Status => CommandFamily::JailList,
            Self::JailStatus(_) => CommandFamily::JailStatus,
            Self::BanIp { .. } | Self::UnbanIp { .. } => CommandFamily::BanCount,
            _ => CommandFamily::Echo,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => f.write_str("ping"),
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
            Self::Reload => f.write_str("reload"),
            Self::Status => f.write_str("status"),
            Self::JailStatus(jail) => write!(f, "status {jail}"),
            Self::StartJail(jail) => write!(f, "start {jail}"),
            Self::StartJailOnce(jail) => write!(f, "start {jail} --once"),
            Self::StopJail(jail) => write!(f, "stop {jail}"),
            Self::BanIp { jail, ip } => write!(f, "set {jail} banip {ip}"),
            Self::UnbanIp { jail, ip } => write!(f, "set {jail} unbanip {ip}"),
        }
    }
}

/// Response grammars understood by the [`parser`](crate::parser).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFamily {
    JailList,
    JailStatus,
    BanCount,
    /// Opaque success text; only success vs failure matters.
    Echo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_lines() {
        assert_eq!(Command::Stop.to_string(), "stop");
        assert_eq!(
            Command::start_jail_once("sshd").unwrap().to_string(),
            "start sshd --once"
        );
        assert_eq!(
            Command::ban("sshd", "203.0.113.7").unwrap().to_string(),
            "set sshd banip 203.0.113.7"
        );
        assert_eq!(
            Command::unban("nginx", "2001:db8::1").unwrap().to_string(),
            "set nginx unbanip 2001:db8::1"
        );
    }

    #[test]
    fn test_rejects_embedded_whitespace() {
        let err = Command::ban("sshd", "1.2.3.4 5.6.7.8").unwrap_err();
        assert!(matches!(err, CommandError::NotAToken { what: "IP address", .. }));
        assert!(Command::stop_jail("ssh d").is_err());
        assert_eq!(
            Command::jail_status("").unwrap_err(),
            CommandError::Empty { what: "jail name" }
        );
    }

    #[test]
    fn test_families() {
        assert_eq!(Command::Status.family(), CommandFamily::JailList);
        assert_eq!(
            Command::jail_status("sshd").unwrap().family(),
            CommandFamily::JailStatus
        );
        assert_eq!(
            Command::unban("sshd", "1.2.3.4").unwrap().family(),
            CommandFamily::BanCount
        );
        assert_eq!(Command::Reload.family(), CommandFamily::Echo);
    }
}
