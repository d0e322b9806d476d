//! `checkstyle-ctl`: drive the Checkstyle worker from a terminal.
//!
//! `check` runs a full session (spawn, handshake, checks, shutdown) and
//! prints violations as `path:line:col` lines. The `set-*` commands edit the
//! settings file the same way the editor commands do, prompting on the
//! terminal when no value is given.

mod console;

use std::env;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{self, Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use checkstyle_config::SettingsStore;
use checkstyle_controller::{Command, CommandContext, Host, SessionManager, WorkerCommand};
use checkstyle_rpc::uri::path_to_file_uri;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::console::{ConsolePrompter, ConsoleSurface, LogDiagnostics};

#[derive(Parser, Debug)]
#[command(name = "checkstyle-ctl", version, about = "Run Checkstyle on Java sources")]
struct Cli {
    /// Settings file [default: ~/.checkstyle/settings.toml]
    #[arg(long, global = true, env = "CHECKSTYLE_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check files and print their violations
    Check {
        /// Workspace root sent to the worker [default: current directory]
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Worker binary [default: next to this binary, then PATH]
        #[arg(long, env = "CHECKSTYLE_WORKER")]
        worker: Option<PathBuf>,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Change the Checkstyle version
    SetVersion(SettingArgs),
    /// Change the Checkstyle configuration file
    SetConfigurationFile(SettingArgs),
    /// Change the properties file passed to Checkstyle
    SetPropertyFile(SettingArgs),
    /// Turn checking on open and save on or off
    SetAutocheck(SettingArgs),
    /// Print the effective settings as JSON
    Show {
        /// Resolve for this file instead of the workspace
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SettingArgs {
    /// Write to the configured folder containing this file
    #[arg(long)]
    file: Option<PathBuf>,

    /// New value; prompts when omitted
    value: Option<String>,
}

fn exit_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Violations go to stdout, so logs fall back to stderr only.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::new("warn"))
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".checkstyle").join("logs").join("checkstyle-ctl.log"));
    }
    candidates.push(
        PathBuf::from(".checkstyle")
            .join("logs")
            .join("checkstyle-ctl.log"),
    );
    candidates
}

fn load_store(path: Option<&Path>) -> Result<Arc<SettingsStore>> {
    let store = match path {
        Some(path) => SettingsStore::load(path),
        None => SettingsStore::load_default(),
    }
    .context("loading settings")?;
    match store.path() {
        Some(path) => tracing::debug!(path = %path.display(), "settings loaded"),
        None => tracing::debug!("no home directory, settings kept in memory"),
    }
    Ok(Arc::new(store))
}

fn file_uri(file: &Path) -> Result<String> {
    let absolute =
        path::absolute(file).with_context(|| format!("resolving {}", file.display()))?;
    Ok(path_to_file_uri(&absolute)?.to_string())
}

async fn run_setting(
    store: Arc<SettingsStore>,
    command: Command,
    args: SettingArgs,
) -> Result<bool> {
    let uri = args.file.as_deref().map(file_uri).transpose()?;
    let context = CommandContext {
        store,
        prompter: Arc::new(ConsolePrompter::new(args.value)),
        diagnostics: Arc::new(LogDiagnostics),
    };
    Ok(context.execute(command, uri.as_deref(), None).await)
}

fn show(store: &SettingsStore, file: Option<&Path>) -> Result<ExitCode> {
    let settings = match file {
        Some(file) => {
            let absolute = path::absolute(file)
                .with_context(|| format!("resolving {}", file.display()))?;
            store.resolve_for(&absolute)
        }
        None => store.resolve_global(),
    };
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(ExitCode::SUCCESS)
}

async fn check(
    store: Arc<SettingsStore>,
    workspace: Option<PathBuf>,
    worker: Option<PathBuf>,
    files: &[PathBuf],
) -> Result<ExitCode> {
    let workspace = match workspace {
        Some(dir) => path::absolute(dir)?,
        None => env::current_dir().context("reading current directory")?,
    };
    let worker = match worker {
        Some(program) => WorkerCommand::new(program),
        None => WorkerCommand::locate()?,
    };
    let uris = files
        .iter()
        .map(|file| file_uri(file))
        .collect::<Result<Vec<_>>>()?;

    let surface = Arc::new(ConsoleSurface::default());
    let host = Host {
        surface: surface.clone(),
        prompter: Arc::new(ConsolePrompter::new(None)),
        diagnostics: Arc::new(LogDiagnostics),
    };
    let mut session = SessionManager::new(worker, workspace, store, host);
    session.start().await.context("starting the worker")?;

    let run = async {
        for uri in &uris {
            if !session.execute(Command::RunCheck, Some(uri)).await {
                return false;
            }
        }
        true
    };
    let completed = tokio::select! {
        ok = run => ok,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            false
        }
    };
    session.stop().await;

    if !completed || surface.failures() > 0 {
        return Ok(ExitCode::from(2));
    }
    if surface.violations() > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    let store = load_store(cli.settings.as_deref())?;
    match cli.command {
        Commands::Check {
            workspace,
            worker,
            files,
        } => check(store, workspace, worker, &files).await,
        Commands::Show { file } => show(&store, file.as_deref()),
        Commands::SetVersion(args) => {
            Ok(exit_code(run_setting(store, Command::SetVersion, args).await?))
        }
        Commands::SetConfigurationFile(args) => Ok(exit_code(
            run_setting(store, Command::SetConfigurationFile, args).await?,
        )),
        Commands::SetPropertyFile(args) => {
            Ok(exit_code(run_setting(store, Command::SetPropertyFile, args).await?))
        }
        Commands::SetAutocheck(args) => {
            Ok(exit_code(run_setting(store, Command::SetAutocheck, args).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn setting_commands_take_optional_value_and_file() {
        let cli = Cli::parse_from(["checkstyle-ctl", "set-version", "10.12.0"]);
        let Commands::SetVersion(args) = cli.command else {
            panic!("expected set-version");
        };
        assert_eq!(args.value.as_deref(), Some("10.12.0"));

        let cli = Cli::parse_from([
            "checkstyle-ctl",
            "set-autocheck",
            "--file",
            "/ws/src/A.java",
        ]);
        let Commands::SetAutocheck(args) = cli.command else {
            panic!("expected set-autocheck");
        };
        assert_eq!(args.file.as_deref(), Some(Path::new("/ws/src/A.java")));
        assert_eq!(args.value, None);
    }

    #[test]
    fn check_requires_files() {
        assert!(Cli::try_parse_from(["checkstyle-ctl", "check"]).is_err());
        let cli = Cli::parse_from(["checkstyle-ctl", "check", "A.java", "B.java"]);
        assert!(matches!(cli.command, Commands::Check { files, .. } if files.len() == 2));
    }

    #[test]
    fn log_candidates_end_with_local_fallback() {
        let candidates = log_file_candidates();
        assert_eq!(
            candidates.last().unwrap(),
            &PathBuf::from(".checkstyle/logs/checkstyle-ctl.log")
        );
    }

    #[cfg(unix)]
    #[test]
    fn file_uris_are_absolute() {
        assert_eq!(file_uri(Path::new("/ws/A.java")).unwrap(), "file:///ws/A.java");
        assert!(file_uri(Path::new("A.java")).unwrap().starts_with("file:///"));
    }

    #[tokio::test]
    async fn preset_value_writes_setting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let store = load_store(Some(&path)).unwrap();
        let args = SettingArgs {
            file: None,
            value: Some("10.12.0".to_string()),
        };
        assert!(run_setting(store.clone(), Command::SetVersion, args).await.unwrap());
        assert_eq!(store.resolve_global().version, "10.12.0");
        assert!(fs::read_to_string(&path).unwrap().contains("10.12.0"));
    }
}
