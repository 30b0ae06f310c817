//! Request and response bodies for the HTTP API.
//!
//! Responses that wrap core types (`ReconcileOutcome`, `JailListing`,
//! `JailStatus`, ...) serialize those directly; only the envelopes live here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::daemon::{BanOutcome, DaemonReply};
use crate::templates::JailTemplate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub git_hash: String,
    pub build_profile: String,
    pub uptime_secs: u64,
    /// Whether the daemon answered `ping`.
    pub daemon_running: bool,
}

/// Live jails as the daemon reports them, next to the configured ones.
#[derive(Debug, Clone, Serialize)]
pub struct JailsResponse {
    pub live: DaemonReply,
    pub configured: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplatesResponse {
    pub templates: BTreeMap<&'static str, JailTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanRequest {
    pub jail: String,
    pub ip: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BanResponse {
    pub jail: String,
    pub ip: String,
    pub outcome: BanOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowListBody {
    pub ignoreip: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable error class.
    pub kind: String,
}
