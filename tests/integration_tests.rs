//! Integration tests: CLI smoke tests and end-to-end sweeps through the `umc`
//! binary.

mod common;

use std::fs;

use common::{now_secs, run_cli_case, run_cli_case_in, write_aged_file, write_config};
use serde_json::Value;

const DAY: i64 = 86_400;

#[test]
fn help_command_prints_usage() {
    let result = run_cli_case("help_command_prints_usage", &["--help"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: umc [OPTIONS] <COMMAND>"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn version_command_prints_version() {
    let result = run_cli_case("version_command_prints_version", &["version"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result.stdout.starts_with("umc "),
        "missing version output; log: {}",
        result.log_path.display()
    );
}

#[test]
fn subcommand_help_flags_work() {
    for sub in ["sweep", "protected", "config", "lfn2pfn", "pfn2lfn", "version", "completions"] {
        let result = run_cli_case(&format!("help_{sub}"), &[sub, "--help"]);
        assert!(
            result.status.success(),
            "{sub} --help failed; log: {}",
            result.log_path.display()
        );
    }
}

#[test]
fn missing_explicit_config_is_a_user_error() {
    let result = run_cli_case(
        "missing_explicit_config",
        &["--config", "/nonexistent/umc/config.toml", "sweep"],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.starts_with("umc: "));
    assert!(result.stderr.contains("UMC-1002"));
}

#[test]
fn sweep_reports_and_writes_candidate_file() {
    let home = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let root = work.path().join("unmerged");
    let now = now_secs();
    write_aged_file(&root, "RunA/old/f.root", 10, now - 20 * DAY);
    write_aged_file(&root, "RunA/new/f.root", 10, now);
    write_aged_file(&root, "RunA/protected/f.root", 10, now - 20 * DAY);
    write_aged_file(&root, "SAM/f.root", 10, now - 300 * DAY);

    let protected = work.path().join("protected.json");
    fs::write(&protected, r#"{"protected": ["/store/unmerged/RunA/protected"]}"#).unwrap();
    let out = work.path().join("files_to_delete.txt");
    let config = write_config(work.path(), &root, &protected, &out, "directories");

    let result = run_cli_case_in(
        "sweep_reports_and_writes_candidate_file",
        home.path(),
        &["--config", config.to_str().unwrap(), "sweep"],
        &[],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("# Folders  Total    Total  DiskSize  FolderName"));
    assert!(result.stdout.contains("  1        0        1      0         RunA"));
    assert!(!result.stdout.contains("SAM"));
    assert_eq!(fs::read_to_string(&out).unwrap(), "/store/unmerged/RunA/old\n");

    let activity = fs::read_to_string(work.path().join("activity.jsonl")).unwrap();
    assert!(activity.contains("\"sweep_complete\""));
}

#[test]
fn dry_run_leaves_candidate_file_alone() {
    let home = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let root = work.path().join("unmerged");
    write_aged_file(&root, "RunA/old/f.root", 10, now_secs() - 20 * DAY);

    let protected = work.path().join("protected.txt");
    fs::write(&protected, "").unwrap();
    let out = work.path().join("files_to_delete.txt");
    fs::write(&out, "previous\n").unwrap();
    let config = write_config(work.path(), &root, &protected, &out, "directories");

    let result = run_cli_case_in(
        "dry_run_leaves_candidate_file_alone",
        home.path(),
        &["--config", config.to_str().unwrap(), "sweep", "--dry-run"],
        &[],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert_eq!(fs::read_to_string(&out).unwrap(), "previous\n");
}

#[test]
fn json_sweep_with_file_granularity() {
    let home = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let root = work.path().join("unmerged");
    let now = now_secs();
    write_aged_file(&root, "RunA/x/a.root", 10, now - 20 * DAY);
    write_aged_file(&root, "RunA/x/b.root", 10, now - 20 * DAY);

    let protected = work.path().join("protected.json");
    fs::write(&protected, r#"{"protected": []}"#).unwrap();
    let out = work.path().join("files_to_delete.txt");
    let config = write_config(work.path(), &root, &protected, &out, "directories");

    let result = run_cli_case_in(
        "json_sweep_with_file_granularity",
        home.path(),
        &[
            "--config",
            config.to_str().unwrap(),
            "--json",
            "sweep",
            "--which-list",
            "files",
        ],
        &[],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let payload: Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(payload["command"], "sweep");
    assert_eq!(payload["lines"], 2);
    assert_eq!(payload["report"]["which_list"], "files");
    assert_eq!(
        fs::read_to_string(&out).unwrap(),
        "/store/unmerged/RunA/x/a.root\n/store/unmerged/RunA/x/b.root\n"
    );
}

#[test]
fn unreadable_protected_list_aborts_without_output() {
    let home = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let root = work.path().join("unmerged");
    write_aged_file(&root, "RunA/old/f.root", 10, now_secs() - 20 * DAY);

    let protected = work.path().join("missing.json");
    let out = work.path().join("files_to_delete.txt");
    let config = write_config(work.path(), &root, &protected, &out, "directories");

    let result = run_cli_case_in(
        "unreadable_protected_list_aborts",
        home.path(),
        &["--config", config.to_str().unwrap(), "sweep"],
        &[],
    );
    assert_eq!(result.status.code(), Some(2), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("UMC-2001"));
    assert!(!out.exists());
}

#[cfg(unix)]
#[test]
fn storage_failure_mid_sweep_keeps_previous_candidate_file() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let home = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let root = work.path().join("unmerged");
    let now = now_secs();
    write_aged_file(&root, "RunA/old/f.root", 10, now - 20 * DAY);
    write_aged_file(&root, "RunB/old/f.root", 10, now - 20 * DAY);
    // A name that is not valid UTF-8 cannot be listed, even by root.
    let bad = root.join("RunB/old").join(OsStr::from_bytes(b"bad\xff.root"));
    fs::write(&bad, b"x").unwrap();

    let protected = work.path().join("protected.txt");
    fs::write(&protected, "").unwrap();
    let out = work.path().join("files_to_delete.txt");
    fs::write(&out, "previous\n").unwrap();
    let config = write_config(work.path(), &root, &protected, &out, "directories");

    let result = run_cli_case_in(
        "storage_failure_mid_sweep",
        home.path(),
        &["--config", config.to_str().unwrap(), "sweep"],
        &[],
    );
    assert_eq!(result.status.code(), Some(2), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("UMC-3001"), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("a later run may succeed"));
    assert_eq!(fs::read_to_string(&out).unwrap(), "previous\n");

    let activity = fs::read_to_string(work.path().join("activity.jsonl")).unwrap();
    assert!(activity.contains("\"retryable\":true"));
    assert!(!activity.contains("\"sweep_complete\""));
}

#[test]
fn env_override_changes_min_age() {
    let home = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let root = work.path().join("unmerged");
    write_aged_file(&root, "RunA/recent/f.root", 10, now_secs() - 2 * DAY);

    let protected = work.path().join("protected.txt");
    fs::write(&protected, "").unwrap();
    let out = work.path().join("files_to_delete.txt");
    let config = write_config(work.path(), &root, &protected, &out, "directories");

    let result = run_cli_case_in(
        "env_override_changes_min_age",
        home.path(),
        &["--config", config.to_str().unwrap(), "sweep"],
        &[("UMC_SCAN_MIN_AGE_SECONDS", "86400")],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert_eq!(fs::read_to_string(&out).unwrap(), "/store/unmerged/RunA\n");
}

#[test]
fn protected_check_reports_membership() {
    let home = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let protected = work.path().join("protected.txt");
    fs::write(&protected, "/store/unmerged/keep/\n").unwrap();
    let config = write_config(
        work.path(),
        &work.path().join("unmerged"),
        &protected,
        &work.path().join("out.txt"),
        "directories",
    );
    let config = config.to_str().unwrap();

    let hit = run_cli_case_in(
        "protected_check_hit",
        home.path(),
        &["--config", config, "--json", "protected", "--check", "/store/unmerged/keep"],
        &[],
    );
    assert!(hit.status.success(), "log: {}", hit.log_path.display());
    let payload: Value = serde_json::from_str(hit.stdout.trim()).unwrap();
    assert_eq!(payload["protected"], true);

    let miss = run_cli_case_in(
        "protected_check_miss",
        home.path(),
        &["--config", config, "protected", "--check", "/store/unmerged/keep/child"],
        &[],
    );
    assert!(miss.status.success());
    assert!(miss.stdout.contains("not protected"));
}

#[test]
fn lfn_and_pfn_translation() {
    let home = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let root = work.path().join("unmerged");
    let config = write_config(
        work.path(),
        &root,
        &work.path().join("p.txt"),
        &work.path().join("out.txt"),
        "directories",
    );
    let config = config.to_str().unwrap();

    let to_pfn = run_cli_case_in(
        "lfn2pfn",
        home.path(),
        &["--config", config, "lfn2pfn", "/store/unmerged/RunA/x"],
        &[],
    );
    assert!(to_pfn.status.success(), "log: {}", to_pfn.log_path.display());
    assert_eq!(to_pfn.stdout.trim(), root.join("RunA/x").to_str().unwrap());

    let pfn = root.join("RunA/x");
    let to_lfn = run_cli_case_in(
        "pfn2lfn",
        home.path(),
        &["--config", config, "pfn2lfn", pfn.to_str().unwrap()],
        &[],
    );
    assert!(to_lfn.status.success(), "log: {}", to_lfn.log_path.display());
    assert_eq!(to_lfn.stdout.trim(), "/store/unmerged/RunA/x");

    let outside = run_cli_case_in(
        "lfn2pfn_outside",
        home.path(),
        &["--config", config, "lfn2pfn", "/store/mc/RunA"],
        &[],
    );
    assert_eq!(outside.status.code(), Some(1));
}

#[test]
fn config_init_refuses_to_overwrite() {
    let home = tempfile::tempdir().unwrap();
    let path = home.path().join("umc.toml");
    let path_str = path.to_str().unwrap();

    let first = run_cli_case_in(
        "config_init_first",
        home.path(),
        &["--config", path_str, "config", "init", "--site", "T2_DE_DESY"],
        &[],
    );
    assert!(first.status.success(), "log: {}", first.log_path.display());
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("name = \"T2_DE_DESY\""));

    let validate = run_cli_case_in(
        "config_validate_generated",
        home.path(),
        &["--config", path_str, "config", "validate"],
        &[],
    );
    assert!(validate.status.success(), "log: {}", validate.log_path.display());

    let second = run_cli_case_in(
        "config_init_second",
        home.path(),
        &["--config", path_str, "config", "init"],
        &[],
    );
    assert_eq!(second.status.code(), Some(1));
}
