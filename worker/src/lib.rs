//! Checkstyle background worker.
//!
//! Speaks JSON-RPC over stdio with the controller, fetches the engine jar on
//! demand and runs checks against it.

pub mod checker;
pub mod download;
pub mod server;

pub use download::{DEFAULT_DOWNLOAD_HOST, DownloadCoordinator, Timeouts, VersionProbeResult};
pub use server::{WorkerConfig, serve};
