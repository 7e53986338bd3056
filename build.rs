// Build script: plumbs a VERSION string through for `--version` output.

use std::process::Command;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Returns one-line `stdout` from a `git` command; `args` are simply space-separated (no escapes).
fn git_oneline_output(args: &str) -> Result<String, BoxError> {
    static HELP_TEXT: &str =
        "If you are building from a release archive or without the `git` CLI available, \n\
        try again with the `VERSION` environment variable set";

    let mut output = Command::new("git")
        .args(args.split(' '))
        .output()
        .map_err(|e| format!("`git {args}` failed: {e}\n\n{HELP_TEXT}"))?;

    if !output.status.success() {
        let status = output.status;
        let stderr = output.stderr.escape_ascii();
        return Err(format!("`git {args}` failed with {status}: {stderr}\n\n{HELP_TEXT}").into());
    }
    if output.stdout.pop() != Some(b'\n') {
        return Err(format!("`git {args}` stdout should end with newline").into());
    }
    if output.stdout.contains(&b'\n') {
        return Err(format!("`git {args}` stdout should be single line").into());
    }
    Ok(String::from_utf8(output.stdout)
        .map_err(|_| format!("`git {args}` stdout should be valid UTF-8"))?)
}

fn handle_version() -> Result<(), BoxError> {
    println!("cargo:rerun-if-env-changed=VERSION");
    if std::env::var("VERSION").is_ok() {
        return Ok(());
    }
    let dir = git_oneline_output("rev-parse --git-dir").unwrap_or_else(|_| String::new());
    if !dir.is_empty() {
        println!("cargo:rerun-if-changed={dir}/logs/HEAD");
        println!("cargo:rerun-if-changed={dir}/index");
    }
    let version =
        git_oneline_output("describe --always --dirty").unwrap_or_else(|_| "unknown".to_owned());
    println!("cargo:rustc-env=VERSION={version}");
    Ok(())
}

fn main() -> Result<(), BoxError> {
    println!("cargo:rerun-if-changed=build.rs");
    handle_version()
}
