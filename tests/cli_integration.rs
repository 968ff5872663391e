//! Integration tests for the command-line interface
//!
//! Each test runs the built binary against a scratch directory with `HOME`
//! pointed at that directory so no user config leaks in.

use safe_patch::ContentHash;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const ORIGINAL: &str = "line 1\nline 2\nline 3\n";

const LINE_ONE_DIFF: &str = "\
--- a/f.txt
+++ b/f.txt
@@ -1,3 +1,3 @@
-line 1
+line one
 line 2
 line 3
";

fn setup_test_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("f.txt"), ORIGINAL).unwrap();
    fs::write(dir.path().join("change.diff"), LINE_ONE_DIFF).unwrap();
    dir
}

fn safe_patch(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_safe-patch"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env_remove("SAFE_PATCH_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

/// Run with `input` piped to stdin.
fn run_with_stdin(mut cmd: Command, input: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    let output = safe_patch(dir.path()).arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["read", "hash", "patch", "write", "apply-diff"] {
        assert!(stdout.contains(command), "missing {command} in:\n{stdout}");
    }
}

#[test]
fn test_hash_command() {
    let dir = setup_test_workspace();

    let output = safe_patch(dir.path()).args(["hash", "f.txt"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        ContentHash::of(ORIGINAL).as_str()
    );

    let output = safe_patch(dir.path())
        .args(["hash", "does-not-exist.txt"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        ContentHash::empty().as_str()
    );
}

#[test]
fn test_read_command_prints_snapshot() {
    let dir = setup_test_workspace();

    let output = safe_patch(dir.path()).args(["read", "f.txt"]).output().unwrap();
    assert!(output.status.success());

    let snapshot = json(&output);
    assert_eq!(snapshot["version"], 1);
    assert_eq!(snapshot["content"], ORIGINAL);
    assert_eq!(snapshot["content_hash"], ContentHash::of(ORIGINAL).as_str());
}

#[test]
fn test_patch_with_yes() {
    let dir = setup_test_workspace();
    let hash = ContentHash::of(ORIGINAL);

    let output = safe_patch(dir.path())
        .args(["--yes", "patch", "f.txt", "--diff", "change.diff"])
        .args(["--expected-hash", hash.as_str()])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let result = json(&output);
    assert_eq!(result["success"], true);
    assert_eq!(result["latest_file_state"]["version"], 1);
    assert_eq!(
        fs::read_to_string(dir.path().join("f.txt")).unwrap(),
        "line one\nline 2\nline 3\n"
    );
}

#[test]
fn test_patch_with_stale_hash_fails() {
    let dir = setup_test_workspace();

    let output = safe_patch(dir.path())
        .args(["--yes", "patch", "f.txt", "--diff", "change.diff"])
        .args(["--expected-hash", ContentHash::of("stale").as_str()])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let result = json(&output);
    assert_eq!(result["success"], false);
    assert!(result["message"]
        .as_str()
        .unwrap()
        .starts_with("State Mismatch"));
    assert!(result.get("latest_file_state").is_none());
    assert_eq!(fs::read_to_string(dir.path().join("f.txt")).unwrap(), ORIGINAL);
}

#[test]
fn test_patch_confirmed_on_prompt() {
    let dir = setup_test_workspace();
    let mut cmd = safe_patch(dir.path());
    cmd.args(["patch", "f.txt", "--diff", "change.diff"])
        .args(["--expected-hash", ContentHash::of(ORIGINAL).as_str()]);

    let output = run_with_stdin(cmd, "y\n");
    assert!(output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Apply this change"));
    assert!(stderr.contains("line one"));
    assert_eq!(
        fs::read_to_string(dir.path().join("f.txt")).unwrap(),
        "line one\nline 2\nline 3\n"
    );
}

#[test]
fn test_patch_rejected_on_prompt() {
    let dir = setup_test_workspace();
    let mut cmd = safe_patch(dir.path());
    cmd.args(["patch", "f.txt", "--diff", "change.diff"])
        .args(["--expected-hash", ContentHash::of(ORIGINAL).as_str()]);

    let output = run_with_stdin(cmd, "n\n");
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(json(&output)["success"], false);
    assert_eq!(fs::read_to_string(dir.path().join("f.txt")).unwrap(), ORIGINAL);
}

#[test]
fn test_confirmation_disabled_by_config() {
    let dir = setup_test_workspace();
    let config = dir.path().join("safe-patch.toml");
    fs::write(&config, "[confirm]\nenabled = false\n").unwrap();

    // No stdin: the command must not prompt
    let output = safe_patch(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["patch", "f.txt", "--diff", "change.diff"])
        .args(["--expected-hash", ContentHash::of(ORIGINAL).as_str()])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(json(&output)["success"], true);
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = setup_test_workspace();
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[patch]\nmax_diff_bytes = 0\n").unwrap();

    let output = safe_patch(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["hash", "f.txt"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("max_diff_bytes"), "stderr: {stderr}");
}

#[test]
fn test_write_new_and_existing() {
    let dir = setup_test_workspace();
    fs::write(dir.path().join("content.txt"), "fresh\n").unwrap();

    let output = safe_patch(dir.path())
        .args(["--yes", "write", "new/file.txt", "--content", "content.txt"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(dir.path().join("new/file.txt")).unwrap(),
        "fresh\n"
    );

    // Overwriting without a hash is refused
    let output = safe_patch(dir.path())
        .args(["--yes", "write", "f.txt", "--content", "content.txt"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(fs::read_to_string(dir.path().join("f.txt")).unwrap(), ORIGINAL);
}

#[test]
fn test_workspace_flag_confines_edits() {
    let dir = setup_test_workspace();
    let workspace = dir.path().join("ws");
    fs::create_dir_all(&workspace).unwrap();
    fs::write(dir.path().join("content.txt"), "fresh\n").unwrap();

    let output = safe_patch(dir.path())
        .arg("--workspace")
        .arg(&workspace)
        .args(["--yes", "write", "../escaped.txt", "--content", "content.txt"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(!dir.path().join("escaped.txt").exists());
}

#[test]
fn test_hash_respects_workspace() {
    let dir = setup_test_workspace();
    let workspace = dir.path().join("ws");
    fs::create_dir_all(&workspace).unwrap();

    let output = safe_patch(dir.path())
        .arg("--workspace")
        .arg(&workspace)
        .args(["hash", "../f.txt"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_apply_diff_creates_new_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("new.diff"),
        "--- /dev/null\n+++ b/hello.txt\n@@ -0,0 +1,2 @@\n+hello\n+world\n",
    )
    .unwrap();

    let output = safe_patch(dir.path())
        .args(["apply-diff", "hello.txt", "new.diff"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(dir.path().join("hello.txt")).unwrap(),
        "hello\nworld\n"
    );
}

#[test]
fn test_apply_diff_failure_logs_artifacts() {
    let dir = setup_test_workspace();
    fs::write(
        dir.path().join("bad.diff"),
        "@@ -1,2 +1,2 @@\n-line 9\n+line nine\n line 10\n",
    )
    .unwrap();
    let failures = dir.path().join("failures");

    let output = safe_patch(dir.path())
        .arg("--failure-log-dir")
        .arg(&failures)
        .args(["apply-diff", "f.txt", "bad.diff"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid diff"), "stderr: {stderr}");
    assert_eq!(fs::read_to_string(dir.path().join("f.txt")).unwrap(), ORIGINAL);
    assert_eq!(fs::read_dir(&failures).unwrap().count(), 2);
}

#[test]
fn test_apply_diff_missing_target() {
    let dir = setup_test_workspace();

    let output = safe_patch(dir.path())
        .args(["apply-diff", "absent.txt", "change.diff"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(!dir.path().join("absent.txt").exists());
}
