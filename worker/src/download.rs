//! Fetching the Checkstyle engine jar.
//!
//! A fetch is probed first: the distribution server answers a valid
//! version's download link with a 302 to a mirror, and anything else means
//! the version does not exist. Only then is the body streamed to
//! `<artifact>.download` and renamed into place.
//!
//! Every outcome is reported to the controller as notifications, never as an
//! error crossing the channel.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use checkstyle_rpc::NotificationSink;
use checkstyle_types::{
    DownloadFailure, DownloadStart, DownloadStartParams, DownloadStatus,
    DownloadStatusNotification, MessageType, ShowMessage, ShowMessageParams, VersionInvalid,
    VersionInvalidParams,
};
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::redirect::Policy;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;

pub const DEFAULT_DOWNLOAD_HOST: &str = "https://sourceforge.net";

/// Shown when the distribution server cannot be reached at all.
pub const TRANSPORT_ERROR_MESSAGE: &str =
    "Failed to reach the Checkstyle download server. Please check your network and try again later.";

const TEMP_SUFFIX: &str = ".download";

/// File name of the engine jar for `version`.
#[must_use]
pub fn artifact_name(version: &str) -> String {
    format!("checkstyle-{version}-all.jar")
}

/// Timeouts for the two network phases.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Whole probe request.
    pub probe: Duration,
    /// Connecting, and each wait for the next body chunk.
    pub transfer: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(10),
            transfer: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionProbeResult {
    /// The link redirects to a mirror.
    Found,
    /// The server answered without redirecting.
    Invalid,
    /// No response.
    TransportError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("no data received for {}s", .0.as_secs())]
    IdleTimeout(Duration),
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("server answered HTTP {0}")]
    Status(StatusCode),
    #[error("response body failed: {0}")]
    Body(#[source] reqwest::Error),
    #[error("writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    /// Short transport code reported in place of the full error text.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        match self {
            Self::IdleTimeout(_) => Some("ETIMEDOUT".to_string()),
            Self::Request(e) | Self::Body(e) if e.is_timeout() => Some("ETIMEDOUT".to_string()),
            Self::Request(e) if e.is_connect() => Some("ECONNECT".to_string()),
            Self::Request(_) => None,
            Self::Body(_) => Some("EBODY".to_string()),
            Self::Status(status) => Some(format!("EHTTP {}", status.as_u16())),
            Self::Io { .. } => Some("EIO".to_string()),
        }
    }

    /// Cause reported to the controller: the code, else the error text.
    #[must_use]
    pub fn cause(&self) -> String {
        self.code().unwrap_or_else(|| self.to_string())
    }
}

/// Converts byte counts into rounded, strictly increasing percentages.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: Option<u8>,
}

impl ProgressTracker {
    /// Percent to report for `received` of `total` bytes, or `None` when it
    /// would repeat the last report.
    pub fn update(&mut self, received: u64, total: u64) -> Option<u8> {
        if total == 0 {
            return None;
        }
        let percent = ((received as f64 / total as f64) * 100.0).round().min(100.0) as u8;
        if self.last.is_some_and(|last| percent <= last) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }
}

/// `true` when `path` is an existing regular file.
pub async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_file())
}

pub struct DownloadCoordinator {
    host: String,
    timeouts: Timeouts,
    probe_client: reqwest::Client,
    transfer_client: reqwest::Client,
    /// One lock per destination jar, held for the whole fetch.
    in_flight: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl DownloadCoordinator {
    pub fn new(host: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::with_timeouts(host, Timeouts::default())
    }

    pub fn with_timeouts(
        host: impl Into<String>,
        timeouts: Timeouts,
    ) -> Result<Self, reqwest::Error> {
        let probe_client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(timeouts.probe)
            .build()?;
        let transfer_client = reqwest::Client::builder()
            .connect_timeout(timeouts.transfer)
            .build()?;
        Ok(Self {
            host: host.into().trim_end_matches('/').to_string(),
            timeouts,
            probe_client,
            transfer_client,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Canonical download link for `version`.
    #[must_use]
    pub fn download_url(&self, version: &str) -> String {
        format!(
            "{}/projects/checkstyle/files/checkstyle/{version}/{}/download",
            self.host,
            artifact_name(version)
        )
    }

    /// Classify `url` without following redirects.
    pub async fn probe(&self, url: &str) -> VersionProbeResult {
        match self.probe_client.get(url).send().await {
            Ok(response) if response.status() == StatusCode::FOUND => VersionProbeResult::Found,
            Ok(response) => {
                tracing::debug!(url, status = %response.status(), "probe did not redirect");
                VersionProbeResult::Invalid
            }
            Err(e) => VersionProbeResult::TransportError(e.to_string()),
        }
    }

    /// Fetch the jar for `version` into `destination_dir`.
    ///
    /// Returns `true` only when the final jar is in place. A call for a
    /// destination that is already being fetched waits for that fetch and
    /// reuses its jar.
    pub async fn fetch_artifact<S: NotificationSink>(
        &self,
        version: &str,
        destination_dir: &Path,
        requesting_uri: &str,
        sink: &S,
    ) -> bool {
        let final_path = destination_dir.join(artifact_name(version));
        let lock = self.destination_lock(&final_path);
        let _held = lock.lock().await;
        if is_file(&final_path).await {
            tracing::debug!(path = %final_path.display(), "jar fetched while waiting");
            return true;
        }

        let url = self.download_url(version);
        match self.probe(&url).await {
            VersionProbeResult::Found => {}
            VersionProbeResult::Invalid => {
                tracing::info!(version, "version not found on distribution server");
                sink.emit::<VersionInvalid>(VersionInvalidParams {
                    uri: requesting_uri.to_string(),
                })
                .await;
                return false;
            }
            VersionProbeResult::TransportError(e) => {
                tracing::warn!(url = %url, "probe failed: {e}");
                sink.emit::<ShowMessage>(ShowMessageParams {
                    kind: MessageType::Error,
                    message: TRANSPORT_ERROR_MESSAGE.to_string(),
                })
                .await;
                return false;
            }
        }

        let temp_path = temp_path_for(&final_path);
        if let Err(e) = remove_stale(&temp_path).await {
            tracing::warn!(path = %temp_path.display(), "cannot remove stale download: {e}");
            sink.emit::<ShowMessage>(ShowMessageParams {
                kind: MessageType::Error,
                message: format!(
                    "Cannot remove the partial download at {}: {e}",
                    temp_path.display()
                ),
            })
            .await;
            return false;
        }

        sink.emit::<DownloadStart>(DownloadStartParams {}).await;
        tracing::info!(version, url = %url, "downloading Checkstyle");

        let outcome = match self.transfer(&url, &temp_path, sink).await {
            Ok(()) => tokio::fs::rename(&temp_path, &final_path)
                .await
                .map_err(|source| TransferError::Io {
                    path: final_path.clone(),
                    source,
                }),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                tracing::info!(path = %final_path.display(), "download finished");
                sink.emit::<DownloadStatusNotification>(DownloadStatus::Finished)
                    .await;
                true
            }
            Err(e) => {
                tracing::warn!(url = %url, "download failed: {e}");
                sink.emit::<DownloadStatusNotification>(DownloadStatus::Error {
                    error: DownloadFailure {
                        message: e.cause(),
                        download_link: Some(url),
                    },
                })
                .await;
                false
            }
        }
    }

    fn destination_lock(&self, path: &Path) -> Arc<AsyncMutex<()>> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_path_buf())
            .or_default()
            .clone()
    }

    async fn transfer<S: NotificationSink>(
        &self,
        url: &str,
        temp_path: &Path,
        sink: &S,
    ) -> Result<(), TransferError> {
        let idle = self.timeouts.transfer;
        let response = tokio::time::timeout(idle, self.transfer_client.get(url).send())
            .await
            .map_err(|_| TransferError::IdleTimeout(idle))?
            .map_err(TransferError::Request)?;
        if !response.status().is_success() {
            return Err(TransferError::Status(response.status()));
        }

        let io_err = |source| TransferError::Io {
            path: temp_path.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(temp_path).await.map_err(io_err)?;

        let total = response.content_length().unwrap_or(0);
        let mut received = 0u64;
        let mut progress = ProgressTracker::default();
        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::time::timeout(idle, stream.next())
                .await
                .map_err(|_| TransferError::IdleTimeout(idle))?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(TransferError::Body)?;
            file.write_all(&chunk).await.map_err(io_err)?;

            received += chunk.len() as u64;
            if let Some(percent) = progress.update(received, total) {
                sink.emit::<DownloadStatusNotification>(DownloadStatus::Downloading { percent })
                    .await;
            }
        }

        file.flush().await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        Ok(())
    }
}

fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_owned();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

async fn remove_stale(temp_path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(temp_path).await {
        Ok(()) => {
            tracing::debug!(path = %temp_path.display(), "removed stale partial download");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
