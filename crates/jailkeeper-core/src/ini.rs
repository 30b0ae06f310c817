//! The INI dialect fail2ban reads from `jail.d/`.
//!
//! `[section]` headers, `key = value` (or `key: value`) entries, `#`/`;`
//! comment lines, and indented continuation lines that extend the previous
//! value with a newline. Keys are case-insensitive and stored lowercased.

use std::fmt::Write as _;

/// A syntax error on a specific line (1-based).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct IniError {
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Append an entry; keys are lowercased.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.entries.push((key.to_ascii_lowercase(), value.into()));
        self
    }

    /// Last value for `key`, as later duplicates override earlier ones.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

pub fn parse(text: &str) -> Result<Vec<Section>, IniError> {
    let mut sections: Vec<Section> = Vec::new();
    // Whether the previous meaningful line was an entry that can be continued.
    let mut continuable = false;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            continuable = false;
            continue;
        }
        if trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if raw.starts_with(char::is_whitespace) && continuable {
            if let Some((_, value)) = sections.last_mut().and_then(|s| s.entries.last_mut()) {
                if !value.is_empty() {
                    value.push('\n');
                }
                value.push_str(trimmed);
            }
            continue;
        }

        if let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let name = name.trim();
            if name.is_empty() {
                return Err(IniError {
                    line: line_no,
                    reason: "empty section name".to_string(),
                });
            }
            sections.push(Section::new(name));
            continuable = false;
            continue;
        }

        let Some(pos) = trimmed.find(['=', ':']) else {
            return Err(IniError {
                line: line_no,
                reason: format!("expected `key = value`, got {trimmed:?}"),
            });
        };
        let key = trimmed[..pos].trim();
        if key.is_empty() {
            return Err(IniError {
                line: line_no,
                reason: "missing key before separator".to_string(),
            });
        }
        let Some(section) = sections.last_mut() else {
            return Err(IniError {
                line: line_no,
                reason: format!("entry {key:?} appears before any section header"),
            });
        };
        section
            .entries
            .push((key.to_ascii_lowercase(), trimmed[pos + 1..].trim().to_string()));
        continuable = true;
    }

    Ok(sections)
}

/// Render sections; multi-line values become indented continuation lines.
pub fn render(sections: &[Section]) -> String {
    let mut out = String::new();
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "[{}]", section.name);
        for (key, value) in &section.entries {
            let mut lines = value.lines();
            match lines.next().unwrap_or_default() {
                "" => {
                    let _ = writeln!(out, "{key} =");
                }
                first => {
                    let _ = writeln!(out, "{key} = {first}");
                }
            }
            for more in lines {
                let _ = writeln!(out, "    {more}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_sections_and_entries() {
        let text = "# managed\n[DEFAULT]\ninclude = /etc/x.conf\n\n[sshd]\nEnabled = true\nport: ssh\n";
        let sections = parse(text).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].get("include"), Some("/etc/x.conf"));
        assert_eq!(sections[1].name, "sshd");
        assert_eq!(sections[1].get("enabled"), Some("true"));
        assert_eq!(sections[1].get("port"), Some("ssh"));
    }

    #[test]
    fn test_continuation_lines() {
        let text = "[DEFAULT]\nignoreip =\n    127.0.0.1/8\n    ::1\n\tfe80::/10\n";
        let sections = parse(text).unwrap();
        assert_eq!(sections[0].get("ignoreip"), Some("127.0.0.1/8\n::1\nfe80::/10"));
    }

    #[test]
    fn test_earliest_separator_splits() {
        let sections = parse("[web]\nlogpath: /srv/a=b.log\naction = x:y\n").unwrap();
        assert_eq!(sections[0].get("logpath"), Some("/srv/a=b.log"));
        assert_eq!(sections[0].get("action"), Some("x:y"));
    }

    #[test]
    fn test_later_duplicate_wins() {
        let sections = parse("[a]\nx = 1\nx = 2\n").unwrap();
        assert_eq!(sections[0].get("x"), Some("2"));
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        assert_eq!(parse("x = 1").unwrap_err().line, 1);
        assert_eq!(parse("[a]\n\njust words\n").unwrap_err().line, 3);
        assert!(parse("[ ]\n").is_err());
    }

    #[test]
    fn test_render_then_parse() {
        let sections = vec![
            Section::new("DEFAULT").with("include", "/etc/fail2ban/jail.d/ignoreip.conf"),
            Section::new("web")
                .with("enabled", "false")
                .with("logpath", "/var/log/a.log\n/var/log/b.log"),
        ];
        let text = render(&sections);
        assert!(text.contains("logpath = /var/log/a.log\n    /var/log/b.log\n"));
        assert_eq!(parse(&text).unwrap(), sections);
    }
}
