//! Tests for the `jailkeeper-macros` derives.
//!
//! Proc-macro crates cannot use their own macros in integration tests, so
//! they live here.

#![allow(dead_code)]

use jailkeeper_macros::{Redact, Validate};

#[derive(Redact)]
struct Listener {
    pub addr: String,
    #[redact]
    pub token: Option<String>,
    #[redact]
    pub password: String,
}

#[test]
fn test_redact_hides_marked_fields() {
    let listener = Listener {
        addr: "127.0.0.1:5000".to_string(),
        token: Some("tok_abc123".to_string()),
        password: "s3cret".to_string(),
    };

    let debug = format!("{listener:?}");
    assert!(debug.contains("127.0.0.1:5000"));
    assert!(!debug.contains("tok_abc123"));
    assert!(!debug.contains("s3cret"));
    assert!(debug.contains("Some(\"[REDACTED]\")"), "{debug}");
}

#[test]
fn test_redact_keeps_none_visible() {
    let listener = Listener {
        addr: "0.0.0.0:80".to_string(),
        token: None,
        password: String::new(),
    };
    assert!(format!("{listener:?}").contains("token: None"));
}

#[derive(Validate)]
struct Rule {
    #[validate(non_empty, identifier)]
    pub name: String,
    #[validate(range(min = 1, max = 100))]
    pub retries: u32,
    #[validate(min_len = 2, max_len = 8)]
    pub tag: String,
}

fn rule(name: &str, retries: u32, tag: &str) -> Rule {
    Rule {
        name: name.to_string(),
        retries,
        tag: tag.to_string(),
    }
}

#[test]
fn test_validate_accepts_valid() {
    assert!(rule("nginx-http-auth", 3, "web").validate().is_ok());
    assert!(rule("my_jail.v2", 100, "ab").validate().is_ok());
}

#[test]
fn test_validate_identifier_rejects_paths() {
    for bad in ["../etc", "a/b", ".hidden", "two words"] {
        let errors = rule(bad, 3, "web").validate().unwrap_err();
        assert_eq!(errors.len(), 1, "{bad}: {errors:?}");
        assert!(errors[0].starts_with("name"));
    }
}

#[test]
fn test_validate_empty_name_reported_once() {
    let errors = rule("", 3, "web").validate().unwrap_err();
    assert_eq!(errors, vec!["name: must not be empty".to_string()]);
}

#[test]
fn test_validate_range_and_length() {
    let errors = rule("sshd", 0, "x").validate().unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().any(|e| e.starts_with("retries")));
    assert!(errors.iter().any(|e| e.starts_with("tag")));

    let errors = rule("sshd", 101, "much-too-long").validate().unwrap_err();
    assert_eq!(errors.len(), 2);
}
