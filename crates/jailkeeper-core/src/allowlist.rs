//! AllowListStore: the global `ignoreip` fragment.
//!
//! ```ini
//! [DEFAULT]
//! ignoreip = 127.0.0.1/8
//!     ::1
//!     10.0.0.0/8
//! ```
//!
//! Every jail fragment includes this file, so a `reload` applies it
//! everywhere without a restart.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::addr::is_ip_or_cidr;
use crate::command::Command;
use crate::daemon::CommandReport;
use crate::engine::ReconcileEngine;
use crate::ini::{self, Section};
use crate::store::{StoreError, write_atomic};

/// Loopback and RFC 1918 ranges, always present.
pub const RESERVED_ENTRIES: [&str; 5] = [
    "127.0.0.1/8",
    "::1",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
];

#[derive(Debug, thiserror::Error)]
pub enum AllowListError {
    #[error("invalid IP address or CIDR block: {}", .0.join(", "))]
    InvalidEntries(Vec<String>),

    #[error("malformed allow-list file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A saved allow-list and the reload that applied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowListUpdate {
    pub ignoreip: Vec<String>,
    pub reload: CommandReport,
}

/// Reserved entries first, then `entries` in order, without duplicates.
pub fn merge_with_reserved<S: AsRef<str>>(entries: &[S]) -> Vec<String> {
    let mut merged: Vec<String> = RESERVED_ENTRIES.iter().map(|s| s.to_string()).collect();
    for entry in entries {
        let entry = entry.as_ref().trim();
        if !entry.is_empty() && !merged.iter().any(|m| m == entry) {
            merged.push(entry.to_string());
        }
    }
    merged
}

fn render(entries: &[String]) -> String {
    let section = Section::new("DEFAULT").with("ignoreip", format!("\n{}", entries.join("\n")));
    format!(
        "# Managed by jailkeeper; included by every jail fragment.\n{}",
        ini::render(&[section])
    )
}

pub struct AllowListStore {
    path: PathBuf,
    // Read-create and validate-write must not interleave.
    lock: Mutex<()>,
}

impl AllowListStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &jailkeeper_config::StoreConfig) -> Self {
        Self::new(config.allowlist_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current entries. Creates the file with [`RESERVED_ENTRIES`] first if
    /// it does not exist yet.
    pub async fn read(&self) -> Result<Vec<String>, AllowListError> {
        let _guard = self.lock.lock().await;

        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let defaults = merge_with_reserved::<&str>(&[]);
                write_atomic(&self.path, &render(&defaults)).await?;
                info!(path = %self.path.display(), "created allow-list with reserved entries");
                return Ok(defaults);
            }
            Err(e) => return Err(StoreError::io("read", &self.path)(e).into()),
        };

        let sections = ini::parse(&text).map_err(|e| AllowListError::Malformed {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        Ok(sections
            .iter()
            .filter(|s| s.name == "DEFAULT")
            .filter_map(|s| s.get("ignoreip"))
            .last()
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default())
    }

    /// Validate, merge with the reserved entries and replace the file.
    ///
    /// One invalid entry rejects the whole call and leaves the file as it was.
    pub async fn save<S: AsRef<str>>(&self, entries: &[S]) -> Result<Vec<String>, AllowListError> {
        let invalid: Vec<String> = entries
            .iter()
            .map(|e| e.as_ref().trim())
            .filter(|e| !e.is_empty() && !is_ip_or_cidr(e))
            .map(str::to_string)
            .collect();
        if !invalid.is_empty() {
            warn!(?invalid, "rejected allow-list update");
            return Err(AllowListError::InvalidEntries(invalid));
        }

        let merged = merge_with_reserved(entries);
        let _guard = self.lock.lock().await;
        write_atomic(&self.path, &render(&merged)).await?;
        info!(entries = merged.len(), path = %self.path.display(), "saved allow-list");
        Ok(merged)
    }

    /// [`save`](Self::save), then `reload` the daemon so it takes effect.
    ///
    /// The reload waits for any create or delete in progress on `engine`.
    pub async fn write<S: AsRef<str>>(
        &self,
        entries: &[S],
        engine: &ReconcileEngine,
    ) -> Result<AllowListUpdate, AllowListError> {
        let ignoreip = self.save(entries).await?;
        let reload = engine.control(&Command::Reload).await;
        if !reload.ok {
            warn!(response = %reload.response, "reload after allow-list update failed");
        }
        Ok(AllowListUpdate { ignoreip, reload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> AllowListStore {
        AllowListStore::new(dir.path().join("jail.d").join("ignoreip.conf"))
    }

    #[tokio::test]
    async fn test_fresh_read_creates_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let first = store.read().await.unwrap();
        assert_eq!(first, RESERVED_ENTRIES.to_vec());
        assert!(store.path().exists());
        assert_eq!(store.read().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_existing_file_not_recreated() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.read().await.unwrap();

        std::fs::write(store.path(), "[DEFAULT]\nignoreip = 203.0.113.0/24 ::1\n").unwrap();
        assert_eq!(store.read().await.unwrap(), vec!["203.0.113.0/24", "::1"]);
    }

    #[tokio::test]
    async fn test_save_merges_and_dedups() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let saved = store
            .save(&["198.51.100.7", "10.0.0.0/8", "2001:db8::/32", "198.51.100.7"])
            .await
            .unwrap();
        let mut expected: Vec<String> = RESERVED_ENTRIES.iter().map(|s| s.to_string()).collect();
        expected.push("198.51.100.7".to_string());
        expected.push("2001:db8::/32".to_string());
        assert_eq!(saved, expected);
        assert_eq!(store.read().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_invalid_entry_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.save(&["198.51.100.7"]).await.unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();

        let err = store.save(&["203.0.113.1", "999.1.1.1"]).await.unwrap_err();
        match err {
            AllowListError::InvalidEntries(bad) => assert_eq!(bad, vec!["999.1.1.1"]),
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn test_render_is_continuation_list() {
        let text = render(&["127.0.0.1/8".to_string(), "::1".to_string()]);
        assert!(text.contains("[DEFAULT]\nignoreip =\n    127.0.0.1/8\n    ::1\n"));
    }
}
