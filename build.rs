//! Build script to capture git commit details for the `git_*` template variables

use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn main() {
    let git_hash = git(&["rev-parse", "HEAD"]).unwrap_or_else(|| String::from("unknown"));
    let git_hash_short =
        git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| String::from("unknown"));

    // Uncommitted changes in the working tree mark the build as tainted
    let git_tainted = match git(&["status", "--porcelain", "--untracked-files=no"]) {
        Some(status) if !status.is_empty() => "1",
        _ => "0",
    };

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=GIT_HASH_SHORT={}", git_hash_short);
    println!("cargo:rustc-env=GIT_TAINTED={}", git_tainted);

    // Rerun if git HEAD changes
    println!("cargo:rerun-if-changed=.git/HEAD");
}
