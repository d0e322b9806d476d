//! The worker child process.

use std::env;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use checkstyle_rpc::{Connection, connect};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

pub const WORKER_BINARY: &str = "checkstyle-worker";

/// How to launch the worker.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment, e.g. `CHECKSTYLE_RESOURCES_DIR`.
    pub env: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec!["--stdio".to_string()],
            env: Vec::new(),
        }
    }

    /// Find the worker next to the running binary, then on `PATH`.
    pub fn locate() -> Result<Self> {
        let file_name = format!("{WORKER_BINARY}{}", env::consts::EXE_SUFFIX);
        let sibling = env::current_exe()
            .ok()
            .map(|exe| exe.with_file_name(&file_name))
            .filter(|candidate| candidate.is_file());
        let program = match sibling {
            Some(path) => path,
            None => which::which(WORKER_BINARY).with_context(|| {
                format!("{WORKER_BINARY} not found next to this binary or in PATH")
            })?,
        };
        Ok(Self::new(program))
    }
}

/// A spawned worker. Dropping it kills the process.
pub struct WorkerProcess {
    child: Child,
    stderr_handle: Option<JoinHandle<()>>,
}

impl WorkerProcess {
    /// Spawn the worker and connect to its stdio.
    pub fn spawn(command: &WorkerCommand) -> Result<(Self, Connection)> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().cloned())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", command.program.display()))?;
        tracing::info!(pid = ?child.id(), program = %command.program.display(), "worker started");

        let stdout = child.stdout.take().context("no stdout from worker")?;
        let stdin = child.stdin.take().context("no stdin from worker")?;
        let stderr_handle = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "checkstyle_worker", "{line}");
                }
            })
        });

        let connection = connect(stdout, stdin, "controller");
        Ok((
            Self {
                child,
                stderr_handle,
            },
            connection,
        ))
    }

    /// Wait up to `grace` for the worker to exit, then kill it.
    pub async fn wait_or_kill(mut self, grace: Duration) {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => tracing::info!(%status, "worker exited"),
            Ok(Err(e)) => tracing::warn!("waiting for worker failed: {e}"),
            Err(_) => {
                tracing::debug!("worker didn't exit in time, killing");
                let _ = self.child.kill().await;
            }
        }
        if let Some(handle) = self.stderr_handle.take() {
            handle.abort();
        }
    }
}
