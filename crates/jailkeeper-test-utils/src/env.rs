//! A self-contained jailkeeper installation in a temp directory.

use std::sync::Arc;
use std::time::Instant;

use jailkeeper_config::AppConfig;
use jailkeeper_core::http::AppState;
use jailkeeper_core::{
    AllowListStore, Daemon, FilterStore, JailConfigStore, ReconcileEngine, SettlePolicy,
};
use tempfile::TempDir;

use crate::config::TestConfigBuilder;
use crate::fake_daemon::FakeDaemon;

/// Stores, engine and a [`FakeDaemon`] sharing one temp directory.
///
/// The directory is removed when the value is dropped.
pub struct TestEnv {
    pub config: AppConfig,
    pub fake: Arc<FakeDaemon>,
    pub daemon: Arc<Daemon>,
    pub store: Arc<JailConfigStore>,
    pub engine: Arc<ReconcileEngine>,
    pub allowlist: Arc<AllowListStore>,
    pub filters: Arc<FilterStore>,
    dir: TempDir,
}

impl TestEnv {
    /// Wire `fake` up so that it loads the fragments this env writes.
    pub fn new(fake: FakeDaemon) -> Self {
        Self::with_config(fake, TestConfigBuilder::new())
    }

    /// Like [`new`](Self::new), with daemon and server settings from
    /// `builder`. The store paths always point into the temp directory.
    pub fn with_config(fake: FakeDaemon, builder: TestConfigBuilder) -> Self {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("failed to create temp dir: {e}"));
        let config = builder.rooted_at(dir.path()).build();

        let fake = Arc::new(fake.watching(&config.store.jail_dir));
        let daemon = Arc::new(Daemon::new(fake.clone()));
        let store = Arc::new(JailConfigStore::from_config(&config.store));
        let engine = Arc::new(ReconcileEngine::new(
            daemon.clone(),
            store.clone(),
            SettlePolicy::from_config(&config.daemon),
        ));

        Self {
            allowlist: Arc::new(AllowListStore::from_config(&config.store)),
            filters: Arc::new(FilterStore::from_config(&config.store)),
            config,
            fake,
            daemon,
            store,
            engine,
            dir,
        }
    }

    /// A running fake with no jails.
    pub fn running() -> Self {
        Self::new(FakeDaemon::new())
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// HTTP state over this env's engine and stores.
    pub fn app_state(&self, api_token: Option<&str>) -> Arc<AppState> {
        Arc::new(AppState {
            engine: self.engine.clone(),
            allowlist: self.allowlist.clone(),
            filters: self.filters.clone(),
            api_token: api_token.map(str::to_string),
            started_at: Instant::now(),
        })
    }
}
