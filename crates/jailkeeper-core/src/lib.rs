#![deny(unsafe_code)]

//! jailkeeper core: a control plane for the fail2ban daemon.
//!
//! Commands travel over a [`ControlChannel`] to the daemon's control socket;
//! replies are interpreted by the [`parser`]. Jail definitions are stored as
//! `jail.d` fragments by the [`JailConfigStore`], and the [`ReconcileEngine`]
//! restarts the daemon and verifies the result whenever they change. The
//! [`http`] module exposes all of it as a JSON API.

use std::future::Future;
use std::pin::Pin;

/// A boxed, `Send` future for trait methods used through `dyn Trait`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// IP literal and CIDR predicates.
pub mod addr;
/// The global `ignoreip` fragment.
pub mod allowlist;
/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Transport to the daemon's control socket.
pub mod channel;
/// Typed control-socket commands.
pub mod command;
/// Serialized, typed access to the daemon.
pub mod daemon;
/// Create/delete reconciliation state machine.
pub mod engine;
/// Read-only filter definitions.
pub mod filter;
/// JSON API over axum.
pub mod http;
/// Reader and writer for fail2ban's INI dialect.
pub mod ini;
/// Jail definitions and the fragment format.
pub mod jail;
/// Interpretation of the daemon's textual replies.
pub mod parser;
/// One fragment file per jail.
pub mod store;
/// Built-in jail templates.
pub mod templates;

pub use allowlist::{AllowListError, AllowListStore};
pub use channel::{ChannelError, ClientChannel, ControlChannel};
pub use command::Command;
pub use daemon::{BanOutcome, CommandReport, Daemon, DaemonError, DaemonReply};
pub use engine::{
    DeleteOutcome, ReconcileEngine, ReconcileError, ReconcileOutcome, ReconcileState, SettlePolicy,
};
pub use filter::FilterStore;
pub use jail::JailDefinition;
pub use parser::{JailStatus, ParseError};
pub use store::{JailConfigStore, JailListing, StoreError};
