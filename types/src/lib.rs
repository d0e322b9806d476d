//! Wire contract shared by the Checkstyle controller and worker.
//!
//! This crate contains pure message types with no IO, no async, and minimal
//! dependencies. Both ends of the session deserialize exactly these shapes,
//! so changing a field here is a protocol change.

mod diagnostics;
mod notifications;
mod settings;
mod status;

pub use diagnostics::{
    Diagnostic, DiagnosticSeverity, Position, PublishDiagnostics, PublishDiagnosticsParams, Range,
};
pub use notifications::{
    CheckCode, CheckCodeParams, CheckStatusNotification, DidChangeConfiguration,
    DidChangeConfigurationParams, DownloadStart, DownloadStartParams, DownloadStatusNotification,
    MessageType, Notification, ServerStatusNotification, ServerStatusParams, ShowMessage,
    ShowMessageParams, VersionInvalid, VersionInvalidParams, WORKSPACE_CONFIGURATION,
};
pub use settings::{
    ConfigurationItem, DEFAULT_CONFIGURATION_FILE, DEFAULT_VERSION, ResolvedSettings,
};
pub use status::{CheckState, CheckStatusParams, DownloadFailure, DownloadStatus, ServerStatus};

/// Tool name used as the prefix of user-facing error messages.
pub const TOOL_NAME: &str = "Checkstyle";
