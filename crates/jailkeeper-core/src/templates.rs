//! Built-in starting points for common services.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::jail::JailDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JailTemplate {
    pub filter: &'static str,
    pub logpath: &'static str,
    pub maxretry: u32,
    pub findtime: u64,
    pub bantime: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<&'static str>,
}

impl JailTemplate {
    /// A definition named `name`, enabled, with this template's settings.
    pub fn instantiate(&self, name: &str) -> JailDefinition {
        let mut def = JailDefinition::new(name, self.filter, self.logpath);
        def.maxretry = self.maxretry;
        def.findtime = self.findtime;
        def.bantime = self.bantime;
        def.action = self.action.map(str::to_string);
        def
    }
}

const TEMPLATES: &[(&str, JailTemplate)] = &[
    (
        "sshd",
        JailTemplate {
            filter: "sshd",
            logpath: "%(sshd_log)s",
            maxretry: 3,
            findtime: 3600,
            bantime: 600,
            action: None,
        },
    ),
    (
        "nginx-http-auth",
        JailTemplate {
            filter: "nginx-http-auth",
            logpath: "/var/log/nginx/error.log",
            maxretry: 5,
            findtime: 600,
            bantime: 3600,
            action: None,
        },
    ),
    (
        "apache-auth",
        JailTemplate {
            filter: "apache-auth",
            logpath: "/var/log/apache2/error.log",
            maxretry: 3,
            findtime: 600,
            bantime: 1200,
            action: None,
        },
    ),
    (
        "postfix",
        JailTemplate {
            filter: "postfix",
            logpath: "/var/log/mail.log",
            maxretry: 5,
            findtime: 600,
            bantime: 1800,
            action: None,
        },
    ),
    (
        "recidive",
        JailTemplate {
            filter: "recidive",
            logpath: "/var/log/fail2ban.log",
            maxretry: 5,
            findtime: 86_400,
            bantime: 604_800,
            action: Some("%(action_mwl)s"),
        },
    ),
];

pub fn catalogue() -> BTreeMap<&'static str, JailTemplate> {
    TEMPLATES.iter().copied().collect()
}

pub fn get(name: &str) -> Option<JailTemplate> {
    TEMPLATES.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
}
