//! Build identification for the vsplit-server startup banner
//!
//! Exposes `GIT_HASH`, `BUILD_TIMESTAMP` (UTC, RFC 3339) and `BUILD_PROFILE`
//! to the crate through `env!`.

use std::process::Command;

/// Short commit hash, or "unknown" outside a git checkout
fn git_hash() -> String {
    let output = match Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
    {
        Ok(output) if output.status.success() => output,
        _ => return "unknown".to_string(),
    };

    let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if hash.is_empty() {
        "unknown".to_string()
    } else {
        hash
    }
}

fn main() {
    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    for (key, value) in [
        ("GIT_HASH", git_hash()),
        ("BUILD_TIMESTAMP", timestamp),
        ("BUILD_PROFILE", profile),
    ] {
        println!("cargo:rustc-env={}={}", key, value);
    }
}
