#![deny(unsafe_code)]

//! Configuration loading and validation for jailkeeper.
//!
//! Loads a TOML file into [`AppConfig`], filling every omitted key with a
//! default, then validates the result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use jailkeeper_macros::Redact;
use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP control-plane listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// How to reach the fail2ban daemon and how long to wait for it.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// On-disk locations of jail fragments, filters and the allow-list.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration.
///
/// ```toml
/// [server]
/// listen_addr = "0.0.0.0"
/// listen_port = 5000
/// api_token = "change-me"
/// ```
#[derive(Clone, Serialize, Deserialize, Redact)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Bearer token required on every `/api` route. Unset disables the check,
    /// which is only sensible behind an authenticating reverse proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[redact]
    pub api_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            api_token: None,
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    5000
}

/// Control-socket and settle configuration for the fail2ban daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// `fail2ban-client` binary used to talk to the control socket.
    #[serde(default = "default_client_bin")]
    pub client_bin: String,

    /// The daemon's control socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Pause between liveness probes while the daemon stops or starts.
    #[serde(default = "default_settle_interval_ms")]
    pub settle_interval_ms: u64,

    /// Upper bound on liveness probes per settle phase.
    #[serde(default = "default_settle_max_attempts")]
    pub settle_max_attempts: u32,

    /// Upper bound on `status` polls when verifying a freshly started jail.
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            client_bin: default_client_bin(),
            socket_path: default_socket_path(),
            settle_interval_ms: default_settle_interval_ms(),
            settle_max_attempts: default_settle_max_attempts(),
            verify_attempts: default_verify_attempts(),
        }
    }
}

impl DaemonConfig {
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }
}

fn default_client_bin() -> String {
    "fail2ban-client".to_string()
}

fn default_socket_path() -> String {
    "/var/run/fail2ban/fail2ban.sock".to_string()
}

fn default_settle_interval_ms() -> u64 {
    500
}

fn default_settle_max_attempts() -> u32 {
    10
}

fn default_verify_attempts() -> u32 {
    6
}

/// Filesystem layout shared with the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one `<jail>.local` fragment per managed jail.
    #[serde(default = "default_jail_dir")]
    pub jail_dir: String,

    /// Directory holding the daemon's filter definitions (read-only here).
    #[serde(default = "default_filter_dir")]
    pub filter_dir: String,

    /// File name of the allow-list fragment inside `jail_dir`.
    #[serde(default = "default_allowlist_file")]
    pub allowlist_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            jail_dir: default_jail_dir(),
            filter_dir: default_filter_dir(),
            allowlist_file: default_allowlist_file(),
        }
    }
}

impl StoreConfig {
    /// Full path of the allow-list fragment.
    pub fn allowlist_path(&self) -> PathBuf {
        Path::new(&self.jail_dir).join(&self.allowlist_file)
    }
}

fn default_jail_dir() -> String {
    "/etc/fail2ban/jail.d".to_string()
}

fn default_filter_dir() -> String {
    "/etc/fail2ban/filter.d".to_string()
}

fn default_allowlist_file() -> String {
    "ignoreip.conf".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen_port == 0 {
            return Err(ConfigError::Validation(
                "server.listen_port must be non-zero".to_string(),
            ));
        }
        if self.server.listen_addr.is_empty() {
            return Err(ConfigError::Validation(
                "server.listen_addr must not be empty".to_string(),
            ));
        }
        if self.server.api_token.as_deref() == Some("") {
            return Err(ConfigError::Validation(
                "server.api_token must not be empty when set".to_string(),
            ));
        }

        for (key, value) in [
            ("daemon.client_bin", &self.daemon.client_bin),
            ("daemon.socket_path", &self.daemon.socket_path),
            ("store.jail_dir", &self.store.jail_dir),
            ("store.filter_dir", &self.store.filter_dir),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }

        if self.daemon.settle_max_attempts == 0 {
            return Err(ConfigError::Validation(
                "daemon.settle_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.daemon.verify_attempts == 0 {
            return Err(ConfigError::Validation(
                "daemon.verify_attempts must be at least 1".to_string(),
            ));
        }

        let file = &self.store.allowlist_file;
        if file.is_empty() || file.contains(['/', '\\']) || file == "." || file == ".." {
            return Err(ConfigError::Validation(format!(
                "store.allowlist_file must be a bare file name, got {file:?}"
            )));
        }
        // Jail fragments are enumerated by their `.local` suffix.
        if file.ends_with(".local") {
            return Err(ConfigError::Validation(format!(
                "store.allowlist_file must not use the jail fragment suffix .local, got {file:?}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1");
        assert_eq!(config.server.listen_port, 5000);
        assert!(config.server.api_token.is_none());
        assert_eq!(config.daemon.client_bin, "fail2ban-client");
        assert_eq!(config.daemon.settle_interval(), Duration::from_millis(500));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.daemon.socket_path, "/var/run/fail2ban/fail2ban.sock");
        assert_eq!(
            config.store.allowlist_path(),
            PathBuf::from("/etc/fail2ban/jail.d/ignoreip.conf")
        );
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [server]
            listen_addr = "0.0.0.0"
            listen_port = 8080
            api_token = "s3cret"

            [daemon]
            client_bin = "/usr/bin/fail2ban-client"
            socket_path = "/run/f2b.sock"
            settle_interval_ms = 250
            settle_max_attempts = 20
            verify_attempts = 3

            [store]
            jail_dir = "/data/jail.d"
            filter_dir = "/data/filter.d"
            allowlist_file = "00-ignoreip.conf"

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.server.listen_port, 8080);
        assert_eq!(config.server.api_token.as_deref(), Some("s3cret"));
        assert_eq!(config.daemon.settle_max_attempts, 20);
        assert_eq!(config.daemon.verify_attempts, 3);
        assert_eq!(
            config.store.allowlist_path(),
            PathBuf::from("/data/jail.d/00-ignoreip.conf")
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_api_token_is_redacted_in_debug() {
        let config = AppConfig::parse("[server]\napi_token = \"hunter2\"\n").unwrap();
        let debug = format!("{:?}", config.server);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        assert!(AppConfig::parse("[server]\nlisten_port = 0\n").is_err());
    }

    #[test]
    fn test_validation_rejects_empty_token() {
        assert!(AppConfig::parse("[server]\napi_token = \"\"\n").is_err());
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        assert!(AppConfig::parse("[daemon]\nsettle_max_attempts = 0\n").is_err());
        assert!(AppConfig::parse("[daemon]\nverify_attempts = 0\n").is_err());
    }

    #[test]
    fn test_validation_rejects_allowlist_path() {
        assert!(AppConfig::parse("[store]\nallowlist_file = \"../ignore.conf\"\n").is_err());
        assert!(AppConfig::parse("[store]\nallowlist_file = \"ignoreip.local\"\n").is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("jailkeeper.toml");
        tokio::fs::write(&path, b"[store]\njail_dir = \"/srv/jail.d\"\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.store.jail_dir, "/srv/jail.d");
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        let result = AppConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
