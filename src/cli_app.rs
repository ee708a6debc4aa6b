//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use unmerged_cleaner::core::config::{
    Config, generated_stamp, guess_site, local_hostname, render_default_config,
    write_default_config,
};
use unmerged_cleaner::core::errors::UmcError;
use unmerged_cleaner::core::paths::{lfn_to_pfn, pfn_to_lfn};
use unmerged_cleaner::logger::jsonl::{ActivityLog, LogEntry};
use unmerged_cleaner::platform::storage::backend_for;
use unmerged_cleaner::scanner::protection::ProtectedIndex;
use unmerged_cleaner::scanner::report::{
    HEADER_LINE_1, HEADER_LINE_2, SweepReport, WhichList, write_candidate_file,
};
use unmerged_cleaner::scanner::source::ProtectedListSource;
use unmerged_cleaner::scanner::sweep::{SweepOptions, context_from_config, now_unix, run_sweep};

/// Unmerged Cleaner: lists stale, unprotected subtrees of a site's unmerged area.
#[derive(Debug, Parser)]
#[command(
    name = "umc",
    author,
    version,
    about = "Unmerged Cleaner - stale staging-area sweeper",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Sweep the unmerged area and write the candidate file.
    Sweep(SweepArgs),
    /// Fetch the protected list and summarize or query it.
    Protected(ProtectedArgs),
    /// View, validate or generate configuration.
    Config(ConfigArgs),
    /// Translate logical file names to physical paths.
    Lfn2pfn(TranslateArgs),
    /// Translate physical paths back to logical file names.
    Pfn2lfn(TranslateArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct SweepArgs {
    /// Report only; leave the candidate file untouched.
    #[arg(long)]
    dry_run: bool,
    /// Override scan.min_age_seconds.
    #[arg(long, value_name = "SECONDS")]
    min_age: Option<u64>,
    /// Override output.deletion_file.
    #[arg(long, short = 'o', value_name = "PATH")]
    output: Option<PathBuf>,
    /// Override output.which_list (directories or files).
    #[arg(long, value_name = "KIND")]
    which_list: Option<WhichList>,
    /// Override protected.source (URL or file).
    #[arg(long, value_name = "SOURCE")]
    protected: Option<String>,
    /// Override scan.parallelism.
    #[arg(long, short = 'j', value_name = "N")]
    parallelism: Option<usize>,
}

#[derive(Debug, Clone, Args, Default)]
struct ProtectedArgs {
    /// Report whether this logical path is protected.
    #[arg(long, value_name = "LFN", conflicts_with = "list")]
    check: Option<String>,
    /// Print every protected entry.
    #[arg(long)]
    list: bool,
    /// Override protected.source (URL or file).
    #[arg(long, value_name = "SOURCE")]
    source: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print the config file path.
    Path,
    /// Print the effective configuration as TOML.
    Show,
    /// Load and validate the configuration.
    Validate,
    /// Write a commented default configuration file.
    Init(InitArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct InitArgs {
    /// Site name (guessed from the host name when omitted).
    #[arg(long, value_name = "SITE")]
    site: Option<String>,
    /// Print to stdout instead of writing the file.
    #[arg(long)]
    stdout: bool,
}

#[derive(Debug, Clone, Args)]
struct TranslateArgs {
    /// Paths to translate.
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<String>,
}

#[derive(Debug, Clone, Args, Default)]
struct VersionArgs {
    /// Include additional build metadata fields.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<UmcError> for CliError {
    fn from(err: UmcError) -> Self {
        let message = if err.is_retryable() {
            format!("{err} (transient; a later run may succeed)")
        } else {
            err.to_string()
        };
        match err {
            UmcError::InvalidConfig { .. }
            | UmcError::MissingConfig { .. }
            | UmcError::ConfigParse { .. } => Self::User(message),
            UmcError::Worker { .. } | UmcError::Serialization { .. } => Self::Internal(message),
            UmcError::ProtectedList { .. } | UmcError::StorageIo { .. } | UmcError::Io { .. } => {
                Self::Runtime(message)
            }
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color || !io::stdout().is_terminal() {
        control::set_override(false);
    }

    match &cli.command {
        Command::Sweep(args) => run_sweep_command(cli, args),
        Command::Protected(args) => run_protected(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Lfn2pfn(args) => run_lfn2pfn(cli, args),
        Command::Pfn2lfn(args) => run_pfn2lfn(cli, args),
        Command::Version(args) => emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Ok(Config::load(cli.config.as_deref())?)
}

fn apply_sweep_overrides(config: &mut Config, args: &SweepArgs) -> Result<(), CliError> {
    if let Some(min_age) = args.min_age {
        config.scan.min_age_seconds = min_age;
    }
    if let Some(output) = &args.output {
        config.output.deletion_file.clone_from(output);
    }
    if let Some(which_list) = args.which_list {
        config.output.which_list = which_list;
    }
    if let Some(source) = &args.protected {
        config.protected.source.clone_from(source);
    }
    if let Some(parallelism) = args.parallelism {
        config.scan.parallelism = parallelism;
    }
    config.normalize_paths();
    config.validate()?;
    Ok(())
}

fn protected_source(config: &Config) -> ProtectedListSource {
    ProtectedListSource::parse(
        &config.protected.source,
        Duration::from_secs(config.protected.timeout_seconds),
    )
}

fn run_sweep_command(cli: &Cli, args: &SweepArgs) -> Result<(), CliError> {
    let mut config = load_config(cli)?;
    apply_sweep_overrides(&mut config, args)?;
    let log = ActivityLog::open(&config.paths.activity_log);

    let source = protected_source(&config);
    if cli.verbose {
        eprintln!("[UMC-SWEEP] fetching protected list from {}", source.describe());
    }
    let protected = match source.fetch() {
        Ok(list) => ProtectedIndex::new(list),
        Err(err) => {
            let mut entry = LogEntry::error(&err);
            entry.site = Some(config.site.name.clone());
            log.record(&entry);
            return Err(err.into());
        }
    };
    if cli.verbose {
        eprintln!(
            "[UMC-SWEEP] {} protected entries, {} under {}",
            protected.len(),
            protected.count_under(&config.scan.lfn_to_clean),
            config.scan.lfn_to_clean
        );
    }

    let ctx = Arc::new(context_from_config(&config, protected, now_unix()));
    let backend = backend_for(config.site.storage_type);
    let mut options = SweepOptions::from_config(&config);
    options.verbose = cli.verbose;

    let report = run_sweep(ctx, backend, &options, &log)?;
    let lines = report.candidate_lines();

    let written_to = if args.dry_run {
        None
    } else {
        write_candidate_file(&config.output.deletion_file, &lines)?;
        Some(config.output.deletion_file.clone())
    };

    match output_mode(cli) {
        OutputMode::Human => {
            if !cli.quiet {
                print_report_table(&report);
            }
            if !cli.quiet {
                match &written_to {
                    Some(path) => eprintln!(
                        "[UMC-SWEEP] wrote {} line(s) to {}",
                        lines.len(),
                        path.display()
                    ),
                    None => eprintln!(
                        "[UMC-SWEEP] dry run: {} line(s) not written",
                        lines.len()
                    ),
                }
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "sweep",
                "dry_run": args.dry_run,
                "candidate_file": written_to.map(|p| p.to_string_lossy().into_owned()),
                "lines": lines.len(),
                "report": serde_json::to_value(&report)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_report_table(report: &SweepReport) {
    println!("Some statistics about what is going to be deleted");
    println!("{}", HEADER_LINE_1.bold());
    println!("{}", HEADER_LINE_2.bold());
    for line in report.summary_lines() {
        println!("{line}");
    }
}

fn run_protected(cli: &Cli, args: &ProtectedArgs) -> Result<(), CliError> {
    let mut config = load_config(cli)?;
    if let Some(source) = &args.source {
        config.protected.source.clone_from(source);
        config.validate()?;
    }
    let source = protected_source(&config);
    let index = ProtectedIndex::new(source.fetch()?);

    if let Some(lfn) = &args.check {
        let protected = index.contains(lfn);
        match output_mode(cli) {
            OutputMode::Human => {
                if protected {
                    println!("{lfn}: {}", "protected".green());
                } else {
                    println!("{lfn}: not protected");
                }
            }
            OutputMode::Json => write_json_line(&json!({
                "command": "protected check",
                "lfn": lfn,
                "protected": protected,
            }))?,
        }
        return Ok(());
    }

    let under_root = index.count_under(&config.scan.lfn_to_clean);
    match output_mode(cli) {
        OutputMode::Human => {
            if args.list {
                for entry in index.iter() {
                    println!("{entry}");
                }
            } else {
                println!("Source: {}", source.describe());
                println!("Entries: {}", index.len());
                println!("Under {}: {under_root}", config.scan.lfn_to_clean);
            }
        }
        OutputMode::Json => {
            let mut payload = json!({
                "command": "protected",
                "source": source.describe(),
                "entries": index.len(),
                "under_root": under_root,
            });
            if args.list {
                payload["list"] = Value::from(index.iter().collect::<Vec<_>>());
            }
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = load_config(cli)?;
            match output_mode(cli) {
                OutputMode::Human => println!("{}", config.to_toml_string()?),
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Site: {} ({})", config.site.name, config.site.storage_type);
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => eprintln!("Configuration is INVALID: {e}"),
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
        Some(ConfigCommand::Init(init)) => {
            let site = init
                .site
                .clone()
                .or_else(|| {
                    local_hostname()
                        .and_then(|host| guess_site(&host))
                        .map(String::from)
                })
                .unwrap_or_else(|| Config::default().site.name);

            if init.stdout {
                print!("{}", render_default_config(&site, &generated_stamp()));
                return Ok(());
            }

            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            write_default_config(&path, &site)?;
            match output_mode(cli) {
                OutputMode::Human => {
                    if !cli.quiet {
                        println!("Wrote default configuration for {site} to {}", path.display());
                    }
                }
                OutputMode::Json => write_json_line(&json!({
                    "command": "config init",
                    "path": path.to_string_lossy(),
                    "site": site,
                }))?,
            }
            Ok(())
        }
    }
}

fn run_lfn2pfn(cli: &Cli, args: &TranslateArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let mut rows = Vec::with_capacity(args.paths.len());
    for lfn in &args.paths {
        let pfn = lfn_to_pfn(
            lfn,
            &config.scan.lfn_to_clean,
            &config.scan.unmerged_dir_location,
        )
        .ok_or_else(|| {
            CliError::User(format!(
                "{lfn} is not under {}",
                config.scan.lfn_to_clean
            ))
        })?;
        rows.push((lfn.clone(), pfn.to_string_lossy().into_owned()));
    }
    emit_translation(cli, "lfn2pfn", &rows)
}

fn run_pfn2lfn(cli: &Cli, args: &TranslateArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let mut rows = Vec::with_capacity(args.paths.len());
    for pfn in &args.paths {
        let lfn = pfn_to_lfn(
            std::path::Path::new(pfn),
            &config.scan.unmerged_dir_location,
            &config.scan.lfn_to_clean,
        )
        .ok_or_else(|| {
            CliError::User(format!(
                "{pfn} is not under {}",
                config.scan.unmerged_dir_location.display()
            ))
        })?;
        rows.push((pfn.clone(), lfn));
    }
    emit_translation(cli, "pfn2lfn", &rows)
}

fn emit_translation(cli: &Cli, command: &str, rows: &[(String, String)]) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            for (_, translated) in rows {
                println!("{translated}");
            }
        }
        OutputMode::Json => {
            let items: Vec<Value> = rows
                .iter()
                .map(|(input, output)| json!({ "input": input, "output": output }))
                .collect();
            write_json_line(&json!({ "command": command, "paths": items }))?;
        }
    }
    Ok(())
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");
    let git_sha = option_env!("GIT_SHA").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("umc {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
                println!("git_sha: {git_sha}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "umc",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                    "git_sha": git_sha,
                }
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("UMC_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref())
}

/// The table is the operator contract, so human output stays the default
/// even when stdout is redirected.
fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }
    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        _ => OutputMode::Human,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_before_and_after_subcommand() {
        let before = Cli::try_parse_from([
            "umc",
            "--config",
            "/tmp/umc.toml",
            "--json",
            "--no-color",
            "-v",
            "sweep",
        ]);
        assert!(before.is_ok());

        let after = Cli::try_parse_from(["umc", "sweep", "--json", "--no-color", "-v"]);
        assert!(after.is_ok());
    }

    #[test]
    fn parses_subcommands() {
        let cases = [
            vec!["umc", "sweep", "--dry-run"],
            vec!["umc", "sweep", "--min-age", "3600", "--which-list", "files"],
            vec!["umc", "sweep", "-o", "/tmp/out.txt", "--protected", "/etc/umc/p.json", "-j", "4"],
            vec!["umc", "protected"],
            vec!["umc", "protected", "--check", "/store/unmerged/a"],
            vec!["umc", "protected", "--list", "--source", "https://example.org/p"],
            vec!["umc", "config"],
            vec!["umc", "config", "path"],
            vec!["umc", "config", "show"],
            vec!["umc", "config", "validate"],
            vec!["umc", "config", "init", "--site", "T2_DE_DESY"],
            vec!["umc", "lfn2pfn", "/store/unmerged/a"],
            vec!["umc", "pfn2lfn", "/mnt/hadoop/cms/store/unmerged/a", "/mnt/x"],
            vec!["umc", "version", "--verbose"],
        ];

        for case in cases {
            let parsed = Cli::try_parse_from(case.clone());
            assert!(parsed.is_ok(), "failed to parse case: {case:?}");
        }
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(Cli::try_parse_from(["umc", "sweep", "--which-list", "both"]).is_err());
        assert!(Cli::try_parse_from(["umc", "sweep", "--min-age", "-5"]).is_err());
        assert!(Cli::try_parse_from(["umc", "lfn2pfn"]).is_err());
        assert!(
            Cli::try_parse_from(["umc", "protected", "--check", "/a", "--list"]).is_err()
        );
        assert!(Cli::try_parse_from(["umc", "sweep", "-v", "-q"]).is_err());
    }

    #[test]
    fn completions_support_bash_zsh_and_fish() {
        for shell in ["bash", "zsh", "fish"] {
            let parsed = Cli::try_parse_from(["umc", "completions", shell]);
            assert!(parsed.is_ok(), "failed shell parse for {shell}");
        }
    }

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(resolve_output_mode(true, Some("human")), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some("json")), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some(" JSON ")), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some("auto")), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, None), OutputMode::Human);
    }

    #[test]
    fn umc_errors_map_to_exit_codes() {
        let user: CliError = UmcError::InvalidConfig {
            details: "x".to_string(),
        }
        .into();
        assert_eq!(user.exit_code(), 1);

        assert!(!user.to_string().contains("transient"));

        let runtime: CliError = UmcError::protected_list("url", "timeout").into();
        assert_eq!(runtime.exit_code(), 2);
        assert!(runtime.to_string().ends_with("(transient; a later run may succeed)"));

        let internal: CliError = UmcError::Worker {
            details: "panic".to_string(),
        }
        .into();
        assert_eq!(internal.exit_code(), 3);
    }

    #[test]
    fn sweep_overrides_are_validated() {
        let mut config = Config::default();
        let args = SweepArgs {
            parallelism: Some(0),
            ..SweepArgs::default()
        };
        let err = apply_sweep_overrides(&mut config, &args).unwrap_err();
        assert_eq!(err.exit_code(), 1);

        let mut config = Config::default();
        let args = SweepArgs {
            min_age: Some(60),
            which_list: Some(WhichList::Files),
            ..SweepArgs::default()
        };
        apply_sweep_overrides(&mut config, &args).unwrap();
        assert_eq!(config.scan.min_age_seconds, 60);
        assert_eq!(config.output.which_list, WhichList::Files);
    }
}
