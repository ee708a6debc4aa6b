use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_umc") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "umc.exe" } else { "umc" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve umc binary path for integration test"),
    }
}

/// Run the CLI with `home` as `$HOME` so no real user config or activity
/// log is touched, plus any extra environment.
pub fn run_cli_case_in(
    case_name: &str,
    home: &Path,
    args: &[&str],
    env: &[(&str, &str)],
) -> CmdResult {
    let root = std::env::temp_dir().join("umc-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command
        .args(args)
        .env("HOME", home)
        .env("RUST_BACKTRACE", "1")
        .env_remove("UMC_OUTPUT_FORMAT");
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command.output().expect("execute umc command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("env={env:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let home = tempfile::tempdir().expect("create temp home");
    run_cli_case_in(case_name, home.path(), args, &[])
}

/// Create `relative` under `root` with `size` bytes and the given mtime.
pub fn write_aged_file(root: &Path, relative: &str, size: usize, mtime: i64) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(&path, vec![b'x'; size]).expect("write file");
    filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(mtime, 0))
        .expect("set mtime");
}

/// Create an empty directory with the given mtime.
pub fn make_aged_dir(root: &Path, relative: &str, mtime: i64) {
    let path = root.join(relative);
    fs::create_dir_all(&path).expect("create dir");
    filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(mtime, 0))
        .expect("set dir mtime");
}

/// Write a TOML config pointing the sweep at `pfn_root`.
pub fn write_config(
    dir: &Path,
    pfn_root: &Path,
    protected_file: &Path,
    deletion_file: &Path,
    which_list: &str,
) -> PathBuf {
    let config_path = dir.join("umc.toml");
    let body = format!(
        r#"[site]
name = "T2_US_MIT"
storage_type = "posix"

[scan]
lfn_to_clean = "/store/unmerged"
unmerged_dir_location = "{}"
dirs_to_avoid = ["SAM", "logs"]
min_age_seconds = 604800
parallelism = 2

[output]
deletion_file = "{}"
which_list = "{which_list}"

[protected]
source = "{}"
timeout_seconds = 10

[paths]
activity_log = "{}"
"#,
        pfn_root.display(),
        deletion_file.display(),
        protected_file.display(),
        dir.join("activity.jsonl").display(),
    );
    fs::write(&config_path, body).expect("write config");
    config_path
}
