//! JailConfigStore: one `<name>.local` fragment per jail under `jail_dir`.
//!
//! Fragment existence is what "configured" means; whether the daemon has the
//! jail loaded is a separate question answered by [`Daemon`](crate::daemon::Daemon).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::jail::{self, FragmentError, JailDefinition};

pub const FRAGMENT_EXT: &str = "local";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Fragment(#[from] FragmentError),

    #[error("invalid fragment name {0:?}")]
    InvalidName(String),
}

impl StoreError {
    pub(crate) fn io<'a>(
        op: &'static str,
        path: &'a Path,
    ) -> impl FnOnce(std::io::Error) -> Self + 'a {
        move |source| Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A configured jail together with the file it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfiguredJail {
    pub filename: String,
    #[serde(flatten)]
    pub definition: JailDefinition,
}

/// Result of enumerating `jail_dir`. Unreadable fragments land in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JailListing {
    pub jails: Vec<ConfiguredJail>,
    pub errors: Vec<FragmentError>,
}

impl JailListing {
    pub fn names(&self) -> Vec<String> {
        self.jails.iter().map(|j| j.definition.name.clone()).collect()
    }
}

/// Names usable as a fragment stem: no separators, no leading dot.
pub fn is_fragment_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Write `contents` to a sibling temp file, then rename over `path`.
pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(StoreError::io("create directory", parent))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(StoreError::io("write", &tmp))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io("rename", path)(e));
    }
    Ok(())
}

pub struct JailConfigStore {
    jail_dir: PathBuf,
    allowlist_path: PathBuf,
}

impl JailConfigStore {
    pub fn new(jail_dir: impl Into<PathBuf>, allowlist_path: impl Into<PathBuf>) -> Self {
        Self {
            jail_dir: jail_dir.into(),
            allowlist_path: allowlist_path.into(),
        }
    }

    pub fn from_config(config: &jailkeeper_config::StoreConfig) -> Self {
        Self::new(&config.jail_dir, config.allowlist_path())
    }

    pub fn jail_dir(&self) -> &Path {
        &self.jail_dir
    }

    pub fn fragment_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        if !is_fragment_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.jail_dir.join(format!("{name}.{FRAGMENT_EXT}")))
    }

    /// Enumerate every `*.local` fragment, sorted by name.
    ///
    /// A missing directory is an empty listing. A fragment that fails to
    /// read or parse is reported in `errors` and skipped.
    pub async fn list(&self) -> Result<JailListing, StoreError> {
        let mut listing = JailListing::default();

        let mut dir = match tokio::fs::read_dir(&self.jail_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(listing),
            Err(e) => return Err(StoreError::io("read directory", &self.jail_dir)(e)),
        };

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(StoreError::io("read directory", &self.jail_dir))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(FRAGMENT_EXT)
                || path == self.allowlist_path
            {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_fragment_name(stem) {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();

            let parsed = match tokio::fs::read_to_string(&path).await {
                Ok(text) => jail::parse_fragment(stem, &filename, &text),
                Err(e) => Err(FragmentError {
                    file: filename.clone(),
                    reason: e.to_string(),
                }),
            };
            match parsed {
                Ok(definition) => listing.jails.push(ConfiguredJail {
                    filename,
                    definition,
                }),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable jail fragment");
                    listing.errors.push(e);
                }
            }
        }

        listing
            .jails
            .sort_by(|a, b| a.definition.name.cmp(&b.definition.name));
        listing.errors.sort_by(|a, b| a.file.cmp(&b.file));
        debug!(
            jails = listing.jails.len(),
            errors = listing.errors.len(),
            dir = %self.jail_dir.display(),
            "listed jail fragments"
        );
        Ok(listing)
    }

    pub async fn get(&self, name: &str) -> Result<Option<JailDefinition>, StoreError> {
        let path = self.fragment_path(name)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                let file = format!("{name}.{FRAGMENT_EXT}");
                Ok(Some(jail::parse_fragment(name, &file, &text)?))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io("read", &path)(e)),
        }
    }

    pub async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.fragment_path(name)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(StoreError::io("stat", &path))
    }

    /// Write (or overwrite) the fragment for `def`.
    pub async fn write(&self, def: &JailDefinition) -> Result<PathBuf, StoreError> {
        let path = self.fragment_path(&def.name)?;
        write_atomic(&path, &jail::render_fragment(def, &self.allowlist_path)).await?;
        info!(jail = %def.name, path = %path.display(), "wrote jail fragment");
        Ok(path)
    }

    /// Remove the fragment; `Ok(false)` if there was none.
    pub async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.fragment_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(jail = name, path = %path.display(), "deleted jail fragment");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io("delete", &path)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> JailConfigStore {
        let jail_dir = dir.path().join("jail.d");
        JailConfigStore::new(&jail_dir, jail_dir.join("ignoreip.conf"))
    }

    #[tokio::test]
    async fn test_write_then_list() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let mut web = JailDefinition::new("web", "nginx-http-auth", "/var/log/nginx/error.log");
        web.extra.insert("port".to_string(), "http,https".to_string());
        let ssh = JailDefinition::new("sshd", "sshd", "/var/log/auth.log");
        store.write(&web).await.unwrap();
        store.write(&ssh).await.unwrap();

        let listing = store.list().await.unwrap();
        assert!(listing.errors.is_empty());
        assert_eq!(listing.names(), vec!["sshd", "web"]);
        assert_eq!(listing.jails[1].filename, "web.local");
        assert_eq!(listing.jails[1].definition, web);
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let listing = store(&dir).list().await.unwrap();
        assert_eq!(listing, JailListing::default());
    }

    #[tokio::test]
    async fn test_list_skips_malformed_fragment() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .write(&JailDefinition::new("good", "sshd", "/var/log/auth.log"))
            .await
            .unwrap();
        std::fs::write(store.jail_dir().join("bad.local"), "no sections here\n").unwrap();
        std::fs::write(store.jail_dir().join("notes.txt"), "ignored").unwrap();

        let listing = store.list().await.unwrap();
        assert_eq!(listing.names(), vec!["good"]);
        assert_eq!(listing.errors.len(), 1);
        assert_eq!(listing.errors[0].file, "bad.local");
    }

    #[tokio::test]
    async fn test_overwrite_and_get() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut def = JailDefinition::new("sshd", "sshd", "/var/log/auth.log");
        store.write(&def).await.unwrap();
        def.maxretry = 9;
        store.write(&def).await.unwrap();

        assert_eq!(store.get("sshd").await.unwrap(), Some(def));
        assert_eq!(store.get("absent").await.unwrap(), None);
        assert!(store.exists("sshd").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .write(&JailDefinition::new("sshd", "sshd", "/var/log/auth.log"))
            .await
            .unwrap();

        assert!(store.delete("sshd").await.unwrap());
        assert!(!store.delete("sshd").await.unwrap());
        assert!(!store.exists("sshd").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        for name in ["../passwd", "a/b", ".hidden", ""] {
            assert!(matches!(
                store.delete(name).await,
                Err(StoreError::InvalidName(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_write_into_unwritable_location_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let store = JailConfigStore::new(blocker.join("jail.d"), blocker.join("ignoreip.conf"));

        let err = store
            .write(&JailDefinition::new("sshd", "sshd", "/var/log/auth.log"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[tokio::test]
    async fn test_read_error_names_operation_and_path() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let fragment = store.jail_dir().join("sshd.local");
        std::fs::create_dir_all(&fragment).unwrap();

        match store.get("sshd").await.unwrap_err() {
            StoreError::Io { op, path, .. } => {
                assert_eq!(op, "read");
                assert_eq!(path, fragment);
            }
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
