//! IP literal / CIDR block predicates.

use std::net::IpAddr;

use ipnet::IpNet;

/// Whether `s` is an IPv4/IPv6 address or a CIDR block (`10.0.0.0/8`, `::1/128`).
///
/// Host bits may be set in a CIDR block (`127.0.0.1/8`), matching how
/// fail2ban itself accepts `ignoreip` entries.
pub fn is_ip_or_cidr(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok() || s.parse::<IpNet>().is_ok()
}
