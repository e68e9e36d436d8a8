fn main() {
    set_git_revision_hash();
    set_long_version();
}

/// Make the current git hash available to the build as the environment
/// variable `SPEEDMETER_BUILD_GIT_HASH`.
fn set_git_revision_hash() {
    if let Some(rev) = git_revision_hash() {
        println!("cargo:rustc-env=SPEEDMETER_BUILD_GIT_HASH={}", rev);
    }
}

/// `--version` output: the package version plus the git hash when known.
fn set_long_version() {
    let version = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    let long_version = match git_revision_hash() {
        Some(rev) => format!("{} (rev {})", version, rev),
        None => version,
    };
    println!("cargo:rustc-env=SPEEDMETER_VERSION={}", long_version);
}

fn git_revision_hash() -> Option<String> {
    use std::process::Command;

    let args = &["rev-parse", "--short=10", "HEAD"];
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let rev = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!rev.is_empty()).then_some(rev)
}
