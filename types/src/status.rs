//! Status payloads pushed from the worker.

use serde::{Deserialize, Serialize};

/// State of an artifact fetch.
///
/// A task emits zero or more `Downloading` updates followed by exactly one
/// terminal update (`Finished` or `Error`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "downloadStatus", rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloading {
        /// Rounded completion, 0..=100.
        percent: u8,
    },
    Finished,
    Error {
        error: DownloadFailure,
    },
}

impl DownloadStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Downloading { .. })
    }
}

/// Classified cause of a failed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadFailure {
    /// Transport error code when one is known, otherwise the error text.
    pub message: String,
    /// Link the user can open to fetch the artifact manually.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
}

/// Coarse worker health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Idle,
    Checking,
    Error,
}

impl ServerStatus {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Error => "error",
        }
    }
}

/// Outcome of checking one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    /// The engine ran and reported no violations.
    Success,
    /// The engine ran and reported violations.
    Fail,
    /// The engine could not run.
    Exception,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStatusParams {
    pub uri: String,
    pub state: CheckState,
    #[serde(default)]
    pub violations: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downloading_wire_shape() {
        let json = serde_json::to_value(DownloadStatus::Downloading { percent: 42 }).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "downloadStatus": "downloading", "percent": 42 })
        );
    }

    #[test]
    fn finished_wire_shape() {
        let json = serde_json::to_value(DownloadStatus::Finished).unwrap();
        assert_eq!(json, serde_json::json!({ "downloadStatus": "finished" }));
    }

    #[test]
    fn error_wire_shape_includes_link() {
        let status = DownloadStatus::Error {
            error: DownloadFailure {
                message: "ETIMEDOUT".to_string(),
                download_link: Some("https://example.test/x.jar".to_string()),
            },
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "downloadStatus": "error",
                "error": { "message": "ETIMEDOUT", "downloadLink": "https://example.test/x.jar" }
            })
        );
    }

    #[test]
    fn error_without_link_parses() {
        let status: DownloadStatus = serde_json::from_value(serde_json::json!({
            "downloadStatus": "error",
            "error": { "message": "socket hang up" }
        }))
        .unwrap();
        assert!(status.is_terminal());
        assert!(matches!(
            status,
            DownloadStatus::Error { error } if error.download_link.is_none()
        ));
    }

    #[test]
    fn unknown_download_status_rejected() {
        let result: Result<DownloadStatus, _> =
            serde_json::from_value(serde_json::json!({ "downloadStatus": "paused" }));
        assert!(result.is_err());
    }

    #[test]
    fn only_downloading_is_non_terminal() {
        assert!(!DownloadStatus::Downloading { percent: 100 }.is_terminal());
        assert!(DownloadStatus::Finished.is_terminal());
    }

    #[test]
    fn check_status_wire_shape() {
        let json = serde_json::to_value(CheckStatusParams {
            uri: "file:///A.java".to_string(),
            state: CheckState::Fail,
            violations: 3,
        })
        .unwrap();
        assert_eq!(json["state"], "fail");
        assert_eq!(json["violations"], 3);
    }
}
