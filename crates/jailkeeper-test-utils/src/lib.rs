#![deny(unsafe_code)]

//! Shared test support for the jailkeeper workspace.
//!
//! - [`FakeDaemon`]: an in-memory fail2ban that speaks the control-socket
//!   command grammar and records every command it receives
//! - [`TestEnv`]: a temp directory with stores, engine and fake wired together
//! - [`TestConfigBuilder`]: `AppConfig` values without boilerplate
//!
//! ```toml
//! [dev-dependencies]
//! jailkeeper-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod env;
pub mod fake_daemon;
pub mod tracing_setup;

pub use config::TestConfigBuilder;
pub use env::TestEnv;
pub use fake_daemon::FakeDaemon;
