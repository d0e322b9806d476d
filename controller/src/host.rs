//! What the controller needs from the editor it runs inside.

use std::future::Future;
use std::pin::Pin;

use checkstyle_types::{
    CheckStatusParams, DownloadFailure, MessageType, PublishDiagnosticsParams, ServerStatus,
};

/// Boxed future returned by host prompts.
pub type HostFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something the status surface should reflect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Server(ServerStatus),
    Check(CheckStatusParams),
    Diagnostics(PublishDiagnosticsParams),
    DownloadStarted,
    DownloadProgress(u8),
    DownloadFinished,
    DownloadFailed(DownloadFailure),
    VersionInvalid { uri: String },
    Message { kind: MessageType, message: String },
    /// The worker went away without being asked to.
    WorkerExited,
}

/// Status bar, progress indicator and message area.
pub trait StatusSurface: Send + Sync {
    fn show(&self, event: StatusEvent);
}

/// Interactive pickers. `None` means the user dismissed the prompt.
pub trait Prompter: Send + Sync {
    /// Pick one of `options`.
    fn pick<'a>(
        &'a self,
        title: &'a str,
        options: &'a [String],
        current: Option<&'a str>,
    ) -> HostFut<'a, Option<String>>;

    /// Free-form text, prefilled with `initial`.
    fn input<'a>(&'a self, prompt: &'a str, initial: &'a str) -> HostFut<'a, Option<String>>;

    /// Yes/no question with an accept label.
    fn confirm<'a>(&'a self, message: &'a str, accept: &'a str) -> HostFut<'a, bool>;

    fn show_error(&self, message: &str);
}

/// Output channel for failures worth keeping after the popup is gone.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, message: &str);
}
