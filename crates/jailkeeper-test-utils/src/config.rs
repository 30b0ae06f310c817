//! [`AppConfig`] builder for tests.

use std::path::Path;

use jailkeeper_config::AppConfig;

/// ```ignore
/// let config = TestConfigBuilder::new()
///     .rooted_at(dir.path())
///     .api_token("t0ken")
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        // Tests never wait on a real daemon.
        config.daemon.settle_interval_ms = 0;
        config.daemon.settle_max_attempts = 3;
        config.daemon.verify_attempts = 1;
        Self { config }
    }

    /// Put `jail.d` and `filter.d` under `root`.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        self.config.store.jail_dir = root.join("jail.d").display().to_string();
        self.config.store.filter_dir = root.join("filter.d").display().to_string();
        self
    }

    pub fn api_token(mut self, token: &str) -> Self {
        self.config.server.api_token = Some(token.to_string());
        self
    }

    pub fn listen_port(mut self, port: u16) -> Self {
        self.config.server.listen_port = port;
        self
    }

    pub fn settle(mut self, interval_ms: u64, max_attempts: u32) -> Self {
        self.config.daemon.settle_interval_ms = interval_ms;
        self.config.daemon.settle_max_attempts = max_attempts;
        self
    }

    pub fn verify_attempts(mut self, attempts: u32) -> Self {
        self.config.daemon.verify_attempts = attempts;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
