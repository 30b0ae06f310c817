use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn git_short_hash() -> Option<String> {
    let out = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    out.status
        .success()
        .then(|| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .filter(|h| !h.is_empty())
}

fn main() {
    let hash = git_short_hash().unwrap_or_else(|| "unknown".to_string());
    let built_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=JAILKEEPER_GIT_HASH={hash}");
    println!("cargo:rustc-env=JAILKEEPER_BUILD_TIMESTAMP={built_at}");
    println!("cargo:rustc-env=JAILKEEPER_BUILD_PROFILE={profile}");

    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/refs");
}
