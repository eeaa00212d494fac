//! Integration tests for the CLI
//!
//! Drives the built binary for apply, check, replace and fix-line.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn text_patcher(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_text-patcher"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

/// Helper to create a docs tree with a manifest under patches/
fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();

    fs::write(dir.path().join("SETUP.md"), "Install Aasim.\nrun aasim --help\n").unwrap();
    fs::write(dir.path().join("NOTES.md"), "Aasim notes\n").unwrap();

    let patches_dir = dir.path().join("patches");
    fs::create_dir(&patches_dir).unwrap();
    fs::write(
        patches_dir.join("rebrand.toml"),
        r#"[meta]
name = "rebrand"
root_relative = true

[[targets]]
path = "SETUP.md"

[[targets.transformations]]
type = "substitute"
from = "Aasim"
to = "OBSOLIO"
lowercase_variant = true

[[targets]]
path = "NOTES.md"

[[targets.transformations]]
type = "substitute"
from = "Aasim"
to = "OBSOLIO"
"#,
    )
    .unwrap();

    dir
}

#[test]
fn test_apply_help() {
    let dir = TempDir::new().unwrap();
    let output = text_patcher(&["apply", "--help"], dir.path());

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Apply patch manifests"));
}

#[test]
fn test_apply_discovers_manifests() {
    let workspace = setup_workspace();
    let root = workspace.path().to_str().unwrap();

    let output = text_patcher(&["apply", "--root", root], workspace.path());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("Loading manifest"));
    assert!(stdout.contains("Updated:"));
    assert!(stdout.contains("Summary:"));
    assert!(stdout.contains("Done!"));

    assert_eq!(
        fs::read_to_string(workspace.path().join("SETUP.md")).unwrap(),
        "Install OBSOLIO.\nrun obsolio --help\n"
    );
    assert_eq!(
        fs::read_to_string(workspace.path().join("NOTES.md")).unwrap(),
        "OBSOLIO notes\n"
    );
}

#[test]
fn test_apply_idempotent() {
    let workspace = setup_workspace();
    let root = workspace.path().to_str().unwrap();

    let first = text_patcher(&["apply", "--root", root], workspace.path());
    assert!(first.status.success());
    let after_first = fs::read_to_string(workspace.path().join("SETUP.md")).unwrap();

    let second = text_patcher(&["apply", "--root", root], workspace.path());
    assert!(second.status.success());
    let stdout = String::from_utf8_lossy(&second.stdout);
    assert!(stdout.contains("Unchanged:"));

    let after_second = fs::read_to_string(workspace.path().join("SETUP.md")).unwrap();
    assert_eq!(after_first, after_second);
}

#[test]
fn test_apply_dry_run_leaves_files() {
    let workspace = setup_workspace();
    let root = workspace.path().to_str().unwrap();

    let output = text_patcher(&["apply", "--root", root, "--dry-run", "--diff"], workspace.path());

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Would update:"));
    assert!(stdout.contains("+Install OBSOLIO."));
    assert_eq!(
        fs::read_to_string(workspace.path().join("NOTES.md")).unwrap(),
        "Aasim notes\n"
    );
}

#[test]
fn test_check_exits_nonzero_when_pending() {
    let workspace = setup_workspace();
    let root = workspace.path().to_str().unwrap();

    let pending = text_patcher(&["check", "--root", root], workspace.path());
    assert!(!pending.status.success());
    assert!(String::from_utf8_lossy(&pending.stdout).contains("Patch Status Report"));

    let applied = text_patcher(&["apply", "--root", root], workspace.path());
    assert!(applied.status.success());

    let clean = text_patcher(&["check", "--root", root], workspace.path());
    assert!(clean.status.success());
}

#[test]
fn test_replace_continues_after_missing_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.md"), "Aasim\n").unwrap();
    fs::write(dir.path().join("c.md"), "aasim\n").unwrap();

    let output = text_patcher(
        &[
            "replace",
            "--from",
            "Aasim",
            "--to",
            "OBSOLIO",
            "--lowercase-variant",
            "a.md",
            "b.md",
            "c.md",
        ],
        dir.path(),
    );

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("b.md"));
    assert!(stderr.contains("not found"));

    assert_eq!(fs::read_to_string(dir.path().join("a.md")).unwrap(), "OBSOLIO\n");
    assert_eq!(fs::read_to_string(dir.path().join("c.md")).unwrap(), "obsolio\n");
}

#[test]
fn test_replace_rejects_unpaired_from() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.md"), "x\n").unwrap();

    let output = text_patcher(
        &["replace", "--from", "a", "--from", "b", "--to", "c", "a.md"],
        dir.path(),
    );

    assert!(!output.status.success());
    assert_eq!(fs::read_to_string(dir.path().join("a.md")).unwrap(), "x\n");
}

#[test]
fn test_fix_line_reports_line_number() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("index.js"),
        "export default {\r\n        startFreeTrial: 'Ø¬Ø±Ù',\r\n}\r\n",
    )
    .unwrap();

    let output = text_patcher(
        &[
            "fix-line",
            "--index",
            "1",
            "--contains",
            "startFreeTrial",
            "--with",
            "        startFreeTrial: 'جرّب مجاناً',",
            "--keep-terminator",
            "--label",
            "startFreeTrial",
            "index.js",
        ],
        dir.path(),
    );

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Fixed line 2: startFreeTrial"));

    assert_eq!(
        fs::read_to_string(dir.path().join("index.js")).unwrap(),
        "export default {\r\n        startFreeTrial: 'جرّب مجاناً',\r\n}\r\n"
    );
}

#[test]
fn test_fix_line_wrong_encoding_fails() {
    let dir = TempDir::new().unwrap();
    let original = "a\nعربي\n";
    fs::write(dir.path().join("ar.txt"), original).unwrap();

    let output = text_patcher(
        &["fix-line", "--index", "0", "--with", "b\n", "--encoding", "ascii", "ar.txt"],
        dir.path(),
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not valid ascii"));
    assert_eq!(fs::read_to_string(dir.path().join("ar.txt")).unwrap(), original);
}
