//! Jail definitions and their on-disk fragment format.
//!
//! One jail lives in `<jail_dir>/<name>.local`:
//!
//! ```ini
//! [DEFAULT]
//! include = /etc/fail2ban/jail.d/ignoreip.conf
//!
//! [sshd]
//! enabled = true
//! filter = sshd
//! logpath = /var/log/auth.log
//! maxretry = 3
//! findtime = 3600
//! bantime = 600
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use jailkeeper_macros::Validate;
use serde::{Deserialize, Serialize};

use crate::ini::{self, Section};

pub const DEFAULT_MAXRETRY: u32 = 3;
pub const DEFAULT_FINDTIME: u64 = 3600;
pub const DEFAULT_BANTIME: i64 = 600;

/// Keys with a dedicated field; everything else in a jail section is extra.
const RESERVED_KEYS: &[&str] = &[
    "enabled", "filter", "logpath", "maxretry", "findtime", "bantime", "action",
];

/// One ban rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct JailDefinition {
    /// Also the fragment's file stem.
    #[validate(non_empty, identifier)]
    pub name: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Filter name in `filter.d`; may carry options, e.g. `sshd[mode=aggressive]`.
    #[validate(non_empty)]
    pub filter: String,

    #[validate(non_empty)]
    pub logpath: String,

    #[serde(default = "default_maxretry")]
    #[validate(range(min = 1))]
    pub maxretry: u32,

    #[serde(default = "default_findtime")]
    #[validate(range(min = 1))]
    pub findtime: u64,

    /// Seconds; zero or negative is permanent and passed through untouched.
    #[serde(default = "default_bantime")]
    pub bantime: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Any other jail options (`port`, `backend`, ...), written verbatim.
    #[serde(flatten, default)]
    pub extra: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

fn default_maxretry() -> u32 {
    DEFAULT_MAXRETRY
}

fn default_findtime() -> u64 {
    DEFAULT_FINDTIME
}

fn default_bantime() -> i64 {
    DEFAULT_BANTIME
}

impl JailDefinition {
    pub fn new(name: &str, filter: &str, logpath: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            filter: filter.to_string(),
            logpath: logpath.to_string(),
            maxretry: DEFAULT_MAXRETRY,
            findtime: DEFAULT_FINDTIME,
            bantime: DEFAULT_BANTIME,
            action: None,
            extra: BTreeMap::new(),
        }
    }

    /// Trim string fields and treat an empty `action` as unset.
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.filter = self.filter.trim().to_string();
        self.logpath = trim_lines(&self.logpath);
        self.action = self
            .action
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        self.extra = self
            .extra
            .into_iter()
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), trim_lines(&v)))
            .collect();
        self
    }

    /// Field rules plus the checks the derive cannot express.
    pub fn check(&self) -> Result<(), Vec<String>> {
        let mut errors = self.validate().err().unwrap_or_default();

        for (field, value) in [("name", &self.name), ("filter", &self.filter)] {
            if value.contains('\n') {
                errors.push(format!("{field}: must be a single line"));
            }
        }
        if self.action.as_deref().is_some_and(|a| a.contains('\n')) {
            errors.push("action: must be a single line".to_string());
        }
        for key in self.extra.keys() {
            if RESERVED_KEYS.contains(&key.as_str()) {
                errors.push(format!("{key}: duplicates a dedicated field"));
            } else if key.is_empty()
                || !key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
            {
                errors.push(format!("{key:?}: not a valid option name"));
            }
        }

        let values = std::iter::once(("logpath", &self.logpath))
            .chain(self.extra.iter().map(|(k, v)| (k.as_str(), v)));
        for (field, value) in values {
            if let Some(problem) = continuation_problem(value) {
                errors.push(format!("{field}: {problem}"));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Trim the value and each of its lines, the way the INI reader will.
fn trim_lines(value: &str) -> String {
    value.trim().lines().map(str::trim).collect::<Vec<_>>().join("\n")
}

/// Continuation lines that the INI reader would drop or misread.
fn continuation_problem(value: &str) -> Option<&'static str> {
    value.split('\n').skip(1).find_map(|line| {
        let line = line.trim();
        if line.is_empty() {
            Some("must not contain blank lines")
        } else if line.starts_with(['#', ';']) {
            Some("continuation lines must not start with `#` or `;`")
        } else {
            None
        }
    })
}

/// A fragment that could not be turned into a [`JailDefinition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{file}: {reason}")]
pub struct FragmentError {
    pub file: String,
    pub reason: String,
}

/// Render `def` as a fragment whose `DEFAULT` section includes `allowlist`.
pub fn render_fragment(def: &JailDefinition, allowlist: &Path) -> String {
    let default = Section::new("DEFAULT").with("include", allowlist.display().to_string());

    let mut jail = Section::new(def.name.as_str())
        .with("enabled", def.enabled.to_string())
        .with("filter", def.filter.as_str())
        .with("logpath", def.logpath.as_str())
        .with("maxretry", def.maxretry.to_string())
        .with("findtime", def.findtime.to_string())
        .with("bantime", def.bantime.to_string());
    if let Some(action) = &def.action {
        jail = jail.with("action", action.as_str());
    }
    for (key, value) in &def.extra {
        jail = jail.with(key, value.as_str());
    }

    format!(
        "# Managed by jailkeeper; edits are overwritten.\n{}",
        ini::render(&[default, jail])
    )
}

/// Parse the fragment `file` (named `<name>.local`) back into a definition.
///
/// The first non-`DEFAULT` section is the jail. Absent keys take the
/// daemon's defaults; `enabled` defaults to false.
pub fn parse_fragment(name: &str, file: &str, text: &str) -> Result<JailDefinition, FragmentError> {
    let fail = |reason: String| FragmentError {
        file: file.to_string(),
        reason,
    };

    let sections = ini::parse(text).map_err(|e| fail(e.to_string()))?;
    let section = sections
        .iter()
        .find(|s| s.name != "DEFAULT")
        .ok_or_else(|| fail("no jail section".to_string()))?;

    let mut def = JailDefinition::new(name, "", "");
    def.enabled = false;

    for (key, value) in &section.entries {
        match key.as_str() {
            "enabled" => def.enabled = parse_bool(value).ok_or_else(|| fail(bad(key, value)))?,
            "filter" => def.filter = value.clone(),
            "logpath" => def.logpath = value.clone(),
            "maxretry" => def.maxretry = value.parse().map_err(|_| fail(bad(key, value)))?,
            "findtime" => {
                def.findtime = parse_seconds(value)
                    .and_then(|s| u64::try_from(s).ok())
                    .ok_or_else(|| fail(bad(key, value)))?
            }
            "bantime" => def.bantime = parse_seconds(value).ok_or_else(|| fail(bad(key, value)))?,
            "action" => def.action = Some(value.clone()).filter(|a| !a.is_empty()),
            _ => {
                def.extra.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(def)
}

fn bad(key: &str, value: &str) -> String {
    format!("invalid {key} value {value:?}")
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Seconds as decimal text, or with a fail2ban unit suffix (`10m`, `1h`, `2d`, `1w`).
fn parse_seconds(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    let unit_at = value.find(|c: char| c.is_ascii_alphabetic())?;
    let (number, unit) = value.split_at(unit_at);
    let number: i64 = number.trim().parse().ok()?;
    let scale = match unit.to_ascii_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => 1,
        "m" | "min" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86_400,
        "w" | "week" | "weeks" => 604_800,
        _ => return None,
    };
    number.checked_mul(scale)
}
