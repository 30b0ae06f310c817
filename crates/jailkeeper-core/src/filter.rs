//! Read-only access to `filter.d`.

use std::io::ErrorKind;
use std::path::PathBuf;

use serde::Serialize;

use crate::store::{StoreError, is_fragment_name};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterFile {
    pub name: String,
    pub path: PathBuf,
    pub content: String,
}

pub struct FilterStore {
    dir: PathBuf,
}

impl FilterStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &jailkeeper_config::StoreConfig) -> Self {
        Self::new(&config.filter_dir)
    }

    /// Raw text of `<name>.local`, else `<name>.conf`; `None` if neither exists.
    pub async fn read(&self, name: &str) -> Result<Option<FilterFile>, StoreError> {
        if !is_fragment_name(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        for ext in ["local", "conf"] {
            let path = self.dir.join(format!("{name}.{ext}"));
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    return Ok(Some(FilterFile {
                        name: name.to_string(),
                        path,
                        content,
                    }));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io("read", &path)(e)),
            }
        }
        Ok(None)
    }
}
