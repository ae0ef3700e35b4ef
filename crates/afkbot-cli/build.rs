use std::process::Command;

fn git(args: &[&str]) -> Option<std::process::Output> {
    Command::new("git").args(args).output().ok()
}

/// Release builds report the crate version; other builds report the short
/// commit hash, marked `-dirty` when the tree has local changes.
fn main() {
    let profile = std::env::var("PROFILE").unwrap_or_default();

    let version = if profile == "release" {
        env!("CARGO_PKG_VERSION").to_string()
    } else {
        let hash = git(&["rev-parse", "--short", "HEAD"])
            .filter(|out| out.status.success())
            .and_then(|out| String::from_utf8(out.stdout).ok())
            .map(|hash| hash.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let dirty = git(&["diff-index", "--quiet", "HEAD"])
            .map(|out| !out.status.success())
            .unwrap_or(false);
        if dirty { format!("{}-dirty", hash) } else { hash }
    };

    println!("cargo:rustc-env=AFKBOT_VERSION={}", version);
}
