//! Response parsing for fail2ban's human-readable replies.
//!
//! fail2ban's status output is meant for people, and its layout drifts between
//! releases. All scanning heuristics live here, so supporting a new output
//! variant means adding a fixture to the tests below. Callers never need to
//! special-case it.
//!
//! Typical inputs:
//!
//! ```text
//! Status
//! |- Number of jail:      2
//! `- Jail list:   sshd, nginx-http-auth
//! ```
//!
//! ```text
//! Status for the jail: sshd
//! |- Filter
//! |  |- Currently failed: 1
//! |  |- Total failed:     12
//! |  `- File list:        /var/log/auth.log
//! `- Actions
//!    |- Currently banned: 2
//!    |- Total banned:     5
//!    `- Banned IP list:   192.0.2.10 198.51.100.4
//! ```

use serde::Serialize;

use crate::command::CommandFamily;

/// A reply did not have any shape known for the command that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected daemon response to `{command}`: {text:?}")]
    UnexpectedResponse { command: String, text: String },
}

/// Characters fail2ban uses to draw its status tree.
const BULLETS: &[char] = &['-', '|', '`'];

/// Tokens that show up next to jail names but never are one.
const PLACEHOLDERS: &[&str] = &["none", "jails", ""];

/// Header or summary lines skipped by the fallback scan.
const HEADER_MARKERS: &[&str] = &["number of jail", "status", "total"];

fn is_bare_token(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn push_unique(names: &mut Vec<String>, candidate: &str) {
    let candidate = candidate.trim();
    if PLACEHOLDERS.contains(&candidate.to_ascii_lowercase().as_str()) {
        return;
    }
    if !names.iter().any(|n| n == candidate) {
        names.push(candidate.to_string());
    }
}

/// Text following a case-insensitive `marker` on `line`, if the marker occurs.
fn after_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    // ASCII lowercasing keeps byte offsets aligned with the original line.
    let pos = line.to_ascii_lowercase().find(marker)?;
    Some(&line[pos + marker.len()..])
}

/// Extract jail names from a global `status` reply.
///
/// Looks for a "jail list" line first; without one, falls back to treating
/// bulleted or bare-token lines as names. Returns an empty list when nothing
/// is recoverable, since a daemon with no jails is a normal state.
pub fn parse_jail_list(text: &str) -> Vec<String> {
    let mut names = Vec::new();

    for line in text.lines() {
        if let Some(rest) = after_marker(line, "jail list") {
            let rest = rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
            for token in rest.split(|c: char| c == ',' || c.is_whitespace()) {
                push_unique(&mut names, token);
            }
            return names;
        }
    }

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.chars().all(|c| BULLETS.contains(&c) || c.is_whitespace()) {
            continue;
        }
        let lower = trimmed.to_ascii_lowercase();
        if HEADER_MARKERS.iter().any(|m| lower.contains(m)) {
            continue;
        }

        let stripped = trimmed
            .trim_start_matches(|c: char| BULLETS.contains(&c) || c.is_whitespace())
            .trim();
        if is_bare_token(stripped) {
            push_unique(&mut names, stripped);
        } else if let Some(second) = stripped.split('-').nth(1).map(str::trim) {
            if is_bare_token(second) {
                push_unique(&mut names, second);
            }
        }
    }

    names
}

/// Parse the count returned by `set <jail> banip|unbanip <ip>`.
///
/// Only a positive integer counts as a change. Zero, negative or
/// non-numeric replies are unexpected and come back verbatim for the
/// caller to interpret.
pub fn parse_ban_count(command: &str, text: &str) -> Result<u32, ParseError> {
    match text.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ParseError::UnexpectedResponse {
            command: command.to_string(),
            text: text.to_string(),
        }),
    }
}

/// Counters and addresses reported by `status <jail>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JailStatus {
    pub jail: String,
    pub currently_failed: Option<u64>,
    pub total_failed: Option<u64>,
    pub file_list: Vec<String>,
    pub currently_banned: Option<u64>,
    pub total_banned: Option<u64>,
    pub banned_ips: Vec<String>,
    /// Reply text exactly as received.
    pub raw: String,
}

/// Parse a `status <jail>` reply. Missing fields stay `None` or empty.
pub fn parse_jail_status(jail: &str, text: &str) -> JailStatus {
    let mut status = JailStatus {
        jail: jail.to_string(),
        raw: text.to_string(),
        ..JailStatus::default()
    };

    for line in text.lines() {
        let entry = line.trim_start_matches(|c: char| BULLETS.contains(&c) || c.is_whitespace());
        let Some((key, value)) = entry.split_once(':') else {
            continue;
        };
        let value = value.trim();
        let number = || value.parse::<u64>().ok();
        let list = || value.split_whitespace().map(str::to_string).collect::<Vec<_>>();

        match key.trim().to_ascii_lowercase().as_str() {
            "currently failed" => status.currently_failed = number(),
            "total failed" => status.total_failed = number(),
            "file list" | "journal matches" => status.file_list = list(),
            "currently banned" => status.currently_banned = number(),
            "total banned" => status.total_banned = number(),
            "banned ip list" => status.banned_ips = list(),
            _ => {}
        }
    }

    status
}

/// Interpreted reply for a command, by response family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Parsed {
    Jails(Vec<String>),
    JailStatus(JailStatus),
    Count(u32),
    Text(String),
}

/// Dispatch `text` to the parser for `family`.
pub fn parse(family: CommandFamily, command: &str, text: &str) -> Result<Parsed, ParseError> {
    Ok(match family {
        CommandFamily::JailList => Parsed::Jails(parse_jail_list(text)),
        CommandFamily::JailStatus => {
            let jail = command.split_whitespace().nth(1).unwrap_or_default();
            Parsed::JailStatus(parse_jail_status(jail, text))
        }
        CommandFamily::BanCount => Parsed::Count(parse_ban_count(command, text)?),
        CommandFamily::Echo => Parsed::Text(text.to_string()),
    })
}
