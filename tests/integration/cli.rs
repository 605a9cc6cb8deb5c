//! Binary smoke tests

use assert_cmd::Command;
use tempfile::TempDir;

#[test]
fn test_help_lists_commands() {
    let output = Command::cargo_bin("slicehound")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("search"));
    assert!(stdout.contains("tokens"));
}

#[test]
fn test_search_requires_query() {
    Command::cargo_bin("slicehound")
        .unwrap()
        .args(["search", "-y", "2020"])
        .assert()
        .failure();
}

#[test]
fn test_conflicting_modes_rejected() {
    Command::cargo_bin("slicehound")
        .unwrap()
        .args(["search", "-q", "acme.io", "--repos-only", "--gists-only"])
        .assert()
        .failure();
}

#[test]
fn test_missing_credentials_fail_before_searching() {
    let dir = TempDir::new().unwrap();
    let output = Command::cargo_bin("slicehound")
        .unwrap()
        .current_dir(dir.path())
        .args([
            "search",
            "-q",
            "acme.io",
            "-y",
            "2020",
            "--no-progress",
            "--token-file",
            "missing/tokens",
        ])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing/tokens"), "stderr: {stderr}");
    assert!(!dir.path().join("results.csv").exists());
}

#[test]
fn test_invalid_delay_rejected() {
    Command::cargo_bin("slicehound")
        .unwrap()
        .args(["search", "-q", "acme.io", "-D", "5-1", "-t", "ghp_x"])
        .assert()
        .failure();
}
