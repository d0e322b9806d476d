use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use checkstyle_worker::{DEFAULT_DOWNLOAD_HOST, WorkerConfig, serve};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "checkstyle-worker", version)]
#[command(about = "Checkstyle worker; speaks JSON-RPC on stdin/stdout")]
struct Args {
    /// Directory the engine jars are downloaded into
    #[arg(long, env = "CHECKSTYLE_RESOURCES_DIR")]
    resources_dir: Option<PathBuf>,

    /// Base URL of the distribution server
    #[arg(long, env = "CHECKSTYLE_DOWNLOAD_HOST", default_value = DEFAULT_DOWNLOAD_HOST)]
    download_host: String,

    /// Java binary (defaults to `java` on PATH)
    #[arg(long, env = "CHECKSTYLE_JAVA")]
    java: Option<PathBuf>,

    /// Accepted for compatibility with editor launchers; stdio is the only transport
    #[arg(long, hide = true)]
    stdio: bool,
}

// stdout carries the protocol, so logs go to stderr.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(io::stderr))
        .with(env_filter)
        .init();
}

fn default_resources_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".checkstyle").join("resources"))
        .unwrap_or_else(|| PathBuf::from(".checkstyle").join("resources"))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let resources_dir = args.resources_dir.unwrap_or_else(default_resources_dir);
    tokio::fs::create_dir_all(&resources_dir)
        .await
        .with_context(|| format!("creating {}", resources_dir.display()))?;

    let java = args
        .java
        .or_else(|| which::which("java").ok())
        .unwrap_or_else(|| PathBuf::from("java"));

    tracing::info!(
        resources = %resources_dir.display(),
        host = %args.download_host,
        java = %java.display(),
        "worker starting"
    );

    serve(
        tokio::io::stdin(),
        tokio::io::stdout(),
        WorkerConfig {
            resources_dir,
            download_host: args.download_host,
            java,
        },
    )
    .await?;

    tracing::info!("worker stopped");
    Ok(())
}
