//! Build-time metadata embedded by the build script.
//!
//! Reported by the `/health` route and `jailkeeper --version` style output.

/// The git commit hash at build time (short form).
pub const GIT_HASH: &str = env!("JAILKEEPER_GIT_HASH");

/// The build timestamp as a Unix epoch string.
pub const BUILD_TIMESTAMP: &str = env!("JAILKEEPER_BUILD_TIMESTAMP");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("JAILKEEPER_BUILD_PROFILE");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version string including git hash and profile, e.g. `"0.1.0 (abc1234, debug)"`.
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_mentions_crate_version() {
        let v = version_string();
        assert!(v.starts_with(VERSION));
        assert!(v.contains(BUILD_PROFILE));
    }

    #[test]
    fn test_build_metadata_present() {
        assert!(!GIT_HASH.is_empty());
        assert!(BUILD_TIMESTAMP.parse::<u64>().is_ok());
    }
}
