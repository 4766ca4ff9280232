use std::process::Command;

fn main() {
    let built_at = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    let git_hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // Surfaced by `registry-mirror --version`
    println!(
        "cargo:rustc-env=MIRROR_LONG_VERSION={} (commit {}, built {})",
        env!("CARGO_PKG_VERSION"),
        git_hash,
        built_at
    );

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
