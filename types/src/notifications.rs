//! Method identities and payload shapes for every message on the channel.
//!
//! Each message is a zero-variant marker type implementing [`Notification`],
//! pairing the JSON-RPC method name with its params type. The markers carry
//! no behavior; they exist so senders and receivers name a message once.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::status::{CheckStatusParams, DownloadStatus, ServerStatus};

/// A JSON-RPC method name plus its params shape.
pub trait Notification {
    const METHOD: &'static str;
    type Params: Serialize + DeserializeOwned;
}

/// `workspace/configuration` request method (worker → controller).
pub const WORKSPACE_CONFIGURATION: &str = "workspace/configuration";

/// A fetch of the engine jar has begun.
pub enum DownloadStart {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStartParams {}

impl Notification for DownloadStart {
    const METHOD: &'static str = "checkstyle/downloadStart";
    type Params = DownloadStartParams;
}

/// Progress and terminal updates for the fetch announced by [`DownloadStart`].
pub enum DownloadStatusNotification {}

impl Notification for DownloadStatusNotification {
    const METHOD: &'static str = "checkstyle/downloadStatus";
    type Params = DownloadStatus;
}

/// The configured version does not exist on the distribution server.
pub enum VersionInvalid {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInvalidParams {
    /// Document whose check requested the missing version.
    pub uri: String,
}

impl Notification for VersionInvalid {
    const METHOD: &'static str = "checkstyle/versionInvalid";
    type Params = VersionInvalidParams;
}

/// Coarse worker health.
pub enum ServerStatusNotification {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatusParams {
    pub status: ServerStatus,
}

impl Notification for ServerStatusNotification {
    const METHOD: &'static str = "checkstyle/serverStatus";
    type Params = ServerStatusParams;
}

/// Per-document check outcome.
pub enum CheckStatusNotification {}

impl Notification for CheckStatusNotification {
    const METHOD: &'static str = "checkstyle/checkStatus";
    type Params = CheckStatusParams;
}

/// Controller → worker: settings changed, re-issue configuration queries.
pub enum DidChangeConfiguration {}

/// Always sent with `settings: null`; the worker pulls fresh values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidChangeConfigurationParams {
    pub settings: Option<serde_json::Value>,
}

impl Notification for DidChangeConfiguration {
    const METHOD: &'static str = "workspace/didChangeConfiguration";
    type Params = DidChangeConfigurationParams;
}

/// Standard `window/showMessage`, used for generic user-facing messages.
pub enum ShowMessage {}

/// LSP message severity (1 = error .. 4 = log).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageType {
    Error,
    Warning,
    Info,
    Log,
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            1 => Ok(Self::Error),
            2 => Ok(Self::Warning),
            3 => Ok(Self::Info),
            4 => Ok(Self::Log),
            other => Err(format!("unknown message type {other}")),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Error => 1,
            MessageType::Warning => 2,
            MessageType::Info => 3,
            MessageType::Log => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowMessageParams {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub message: String,
}

impl Notification for ShowMessage {
    const METHOD: &'static str = "window/showMessage";
    type Params = ShowMessageParams;
}

/// Controller → worker request behind the run-check command.
pub enum CheckCode {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCodeParams {
    pub uri: String,
}

impl Notification for CheckCode {
    const METHOD: &'static str = "checkstyle/checkCode";
    type Params = CheckCodeParams;
}
