//! The worker side of the session.
//!
//! [`serve`] drains the connection's inbound queue on one task. Anything
//! that can wait on the network (configuration queries, downloads, check
//! runs) is spawned so the loop keeps reading while it runs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use checkstyle_rpc::message::{INTERNAL_ERROR, SERVER_NOT_INITIALIZED};
use checkstyle_rpc::uri::file_uri_to_path;
use checkstyle_rpc::{
    CloseReason, Inbound, NotificationSink, Outgoing, ResponseError, connect, parse_params,
};
use checkstyle_types::{
    CheckCode, CheckCodeParams, CheckState, CheckStatusNotification, CheckStatusParams,
    ConfigurationItem, Diagnostic, DidChangeConfiguration, MessageType, Notification,
    PublishDiagnostics, PublishDiagnosticsParams, ResolvedSettings, ServerStatus,
    ServerStatusNotification, ServerStatusParams, ShowMessage, ShowMessageParams,
    WORKSPACE_CONFIGURATION,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

use crate::checker::{Checker, resolve_configuration_file};
use crate::download::{DownloadCoordinator, artifact_name, is_file};

const CONFIGURATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Full-document sync.
const TEXT_DOCUMENT_SYNC_FULL: u8 = 1;

/// Worker startup settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Where engine jars are cached.
    pub resources_dir: PathBuf,
    /// Distribution server base URL.
    pub download_host: String,
    /// `java` binary used to run the engine.
    pub java: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    #[serde(default)]
    root_uri: Option<String>,
    #[serde(default)]
    root_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextDocumentParams {
    text_document: TextDocumentIdentifier,
}

#[derive(Debug, Deserialize)]
struct TextDocumentIdentifier {
    uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Running,
    ShuttingDown,
}

/// Workspace knowledge gathered from the controller.
#[derive(Debug, Default)]
struct WorkspaceState {
    root: Option<PathBuf>,
    open: HashSet<String>,
    global: Option<ResolvedSettings>,
    documents: HashMap<String, ResolvedSettings>,
}

/// Shared by the loop and the tasks it spawns.
struct Shared {
    outgoing: Outgoing,
    coordinator: DownloadCoordinator,
    checker: Checker,
    resources_dir: PathBuf,
    workspace: Mutex<WorkspaceState>,
}

/// Run the worker over `reader`/`writer` until `exit` or the channel closes.
pub async fn serve<R, W>(reader: R, writer: W, config: WorkerConfig) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let coordinator = DownloadCoordinator::new(config.download_host.as_str())
        .context("building HTTP client")?;
    let checker = Checker::new(config.java).context("compiling report pattern")?;
    let mut connection = connect(reader, writer, "worker");

    let shared = Arc::new(Shared {
        outgoing: connection.outgoing.clone(),
        coordinator,
        checker,
        resources_dir: config.resources_dir,
        workspace: Mutex::new(WorkspaceState::default()),
    });

    let mut phase = Phase::Uninitialized;
    while let Some(message) = connection.inbound.recv().await {
        match message {
            Inbound::Request { id, method, params } => {
                let outcome = handle_request(&shared, &mut phase, &method, params).await;
                match outcome {
                    Reply::Now(outcome) => {
                        if let Err(e) = shared.outgoing.respond(id, outcome).await {
                            tracing::warn!(method, "failed to reply: {e}");
                        }
                    }
                    Reply::Deferred(uri) => {
                        let shared = shared.clone();
                        tokio::spawn(async move {
                            let ran = shared.check_document(&uri).await;
                            if let Err(e) = shared.outgoing.respond(id, Ok(Value::Bool(ran))).await {
                                tracing::warn!(uri = %uri, "failed to reply to checkCode: {e}");
                            }
                        });
                    }
                }
            }
            Inbound::Notification { method, params } => {
                if method == "exit" {
                    tracing::info!("exit received");
                    break;
                }
                if phase == Phase::Running {
                    handle_notification(&shared, &method, params).await;
                } else {
                    tracing::debug!(method, ?phase, "ignoring notification");
                }
            }
            Inbound::Closed(CloseReason::Eof) => {
                tracing::info!("controller closed the channel");
                break;
            }
            Inbound::Closed(CloseReason::Failed(reason)) => {
                tracing::warn!("channel failed: {reason}");
                break;
            }
        }
    }

    connection.close().await;
    Ok(())
}

enum Reply {
    Now(Result<Value, ResponseError>),
    /// Answered by a spawned check task.
    Deferred(String),
}

async fn handle_request(
    shared: &Shared,
    phase: &mut Phase,
    method: &str,
    params: Option<Value>,
) -> Reply {
    match (method, *phase) {
        ("initialize", Phase::Uninitialized) => {
            let params: InitializeParams = match parse_params(params) {
                Ok(p) => p,
                Err(e) => return Reply::Now(Err(e)),
            };
            let root = params
                .root_uri
                .as_deref()
                .and_then(file_uri_to_path)
                .or_else(|| params.root_path.map(PathBuf::from));
            tracing::info!(root = ?root, "initialize");
            shared.workspace.lock().await.root = root;
            *phase = Phase::Running;
            Reply::Now(Ok(json!({
                "capabilities": {
                    "textDocumentSync": {
                        "openClose": true,
                        "change": TEXT_DOCUMENT_SYNC_FULL,
                        "save": { "includeText": false }
                    }
                },
                "serverInfo": { "name": "checkstyle-worker", "version": env!("CARGO_PKG_VERSION") }
            })))
        }
        ("shutdown", _) => {
            *phase = Phase::ShuttingDown;
            Reply::Now(Ok(Value::Null))
        }
        (_, Phase::Uninitialized) => Reply::Now(Err(ResponseError::new(
            SERVER_NOT_INITIALIZED,
            "worker not initialized",
        ))),
        (CheckCode::METHOD, Phase::Running) => {
            match parse_params::<CheckCodeParams>(params) {
                Ok(p) => Reply::Deferred(p.uri),
                Err(e) => Reply::Now(Err(e)),
            }
        }
        (CheckCode::METHOD, Phase::ShuttingDown) => Reply::Now(Err(ResponseError::new(
            INTERNAL_ERROR,
            "worker is shutting down",
        ))),
        (other, _) => Reply::Now(Err(ResponseError::method_not_found(other))),
    }
}

async fn handle_notification(shared: &Arc<Shared>, method: &str, params: Option<Value>) {
    match method {
        "initialized" => {
            let shared = shared.clone();
            tokio::spawn(async move { shared.refresh_settings(false).await });
        }
        DidChangeConfiguration::METHOD => {
            let shared = shared.clone();
            tokio::spawn(async move { shared.refresh_settings(true).await });
        }
        "textDocument/didOpen" | "textDocument/didSave" => {
            let Some(uri) = document_uri(method, params) else {
                return;
            };
            if method == "textDocument/didOpen" {
                shared.workspace.lock().await.open.insert(uri.clone());
            }
            let shared = shared.clone();
            tokio::spawn(async move {
                if shared.settings_for(&uri).await.autocheck {
                    shared.check_document(&uri).await;
                }
            });
        }
        "textDocument/didClose" => {
            let Some(uri) = document_uri(method, params) else {
                return;
            };
            {
                let mut workspace = shared.workspace.lock().await;
                workspace.open.remove(&uri);
                workspace.documents.remove(&uri);
            }
            shared.publish(&uri, Vec::new()).await;
        }
        "textDocument/didChange" => {}
        other => tracing::debug!(method = other, "unhandled notification"),
    }
}

fn document_uri(method: &str, params: Option<Value>) -> Option<String> {
    match parse_params::<TextDocumentParams>(params) {
        Ok(p) => Some(p.text_document.uri),
        Err(e) => {
            tracing::warn!(method, "bad params: {e}");
            None
        }
    }
}

impl Shared {
    /// Ask the controller for settings of each item, in order.
    async fn query(&self, items: &[ConfigurationItem]) -> Option<Vec<Option<ResolvedSettings>>> {
        let params = json!({ "items": items });
        let value = match self
            .outgoing
            .request(WORKSPACE_CONFIGURATION, Some(params), CONFIGURATION_TIMEOUT)
            .await
        {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("configuration query failed: {e}");
                return None;
            }
        };
        match serde_json::from_value::<Option<Vec<Option<ResolvedSettings>>>>(value) {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("malformed configuration answer: {e}");
                None
            }
        }
    }

    /// Re-query the workspace scope, and every open document when asked.
    async fn refresh_settings(&self, include_open: bool) {
        let open: Vec<String> = if include_open {
            self.workspace.lock().await.open.iter().cloned().collect()
        } else {
            Vec::new()
        };
        let mut items = vec![ConfigurationItem::default()];
        items.extend(open.iter().map(ConfigurationItem::scoped));

        let Some(answer) = self.query(&items).await else {
            return;
        };
        let mut workspace = self.workspace.lock().await;
        let mut answer = answer.into_iter();
        workspace.global = answer.next().flatten();
        for (uri, settings) in open.into_iter().zip(answer) {
            match settings {
                Some(settings) => {
                    workspace.documents.insert(uri, settings);
                }
                None => {
                    workspace.documents.remove(&uri);
                }
            }
        }
        tracing::debug!(documents = workspace.documents.len(), "settings refreshed");
    }

    /// Cached settings for `uri`, querying on a miss.
    async fn settings_for(&self, uri: &str) -> ResolvedSettings {
        if let Some(settings) = self.workspace.lock().await.documents.get(uri) {
            return settings.clone();
        }
        let queried = self
            .query(&[ConfigurationItem::scoped(uri)])
            .await
            .and_then(|answer| answer.into_iter().next().flatten());
        let mut workspace = self.workspace.lock().await;
        match queried {
            Some(settings) => {
                if workspace.open.contains(uri) {
                    workspace.documents.insert(uri.to_string(), settings.clone());
                }
                settings
            }
            None => workspace.global.clone().unwrap_or_default(),
        }
    }

    /// Run a check for `uri`. `false` when it could not run.
    async fn check_document(&self, uri: &str) -> bool {
        let Some(file) = file_uri_to_path(uri) else {
            tracing::warn!(uri, "not a file URI, skipping check");
            return false;
        };
        let settings = self.settings_for(uri).await;
        let jar = self.resources_dir.join(artifact_name(&settings.version));
        if !is_file(&jar).await
            && !self
                .coordinator
                .fetch_artifact(&settings.version, &self.resources_dir, uri, &self.outgoing)
                .await
        {
            return false;
        }

        let root = self.workspace.lock().await.root.clone();
        let configuration =
            resolve_configuration_file(&settings.configuration_file, root.as_deref());
        let properties = settings.properties_path.as_deref().map(|p| {
            let p = Path::new(p);
            match &root {
                Some(root) if p.is_relative() => root.join(p),
                _ => p.to_path_buf(),
            }
        });

        self.server_status(ServerStatus::Checking).await;
        tracing::info!(uri, version = %settings.version, "checking");
        let result = self
            .checker
            .run(&jar, &configuration, properties.as_deref(), &file)
            .await;

        match result {
            Ok(violations) => {
                let count = violations.len() as u32;
                let diagnostics = violations.iter().map(|v| v.to_diagnostic()).collect();
                self.publish(uri, diagnostics).await;
                self.outgoing
                    .emit::<CheckStatusNotification>(CheckStatusParams {
                        uri: uri.to_string(),
                        state: if count == 0 {
                            CheckState::Success
                        } else {
                            CheckState::Fail
                        },
                        violations: count,
                    })
                    .await;
                self.server_status(ServerStatus::Idle).await;
            }
            Err(e) => {
                tracing::warn!(uri, "check failed: {e}");
                self.outgoing
                    .emit::<CheckStatusNotification>(CheckStatusParams {
                        uri: uri.to_string(),
                        state: CheckState::Exception,
                        violations: 0,
                    })
                    .await;
                self.outgoing
                    .emit::<ShowMessage>(ShowMessageParams {
                        kind: MessageType::Error,
                        message: e.to_string(),
                    })
                    .await;
                self.server_status(ServerStatus::Error).await;
            }
        }
        true
    }

    async fn publish(&self, uri: &str, diagnostics: Vec<Diagnostic>) {
        self.outgoing
            .emit::<PublishDiagnostics>(PublishDiagnosticsParams {
                uri: uri.to_string(),
                diagnostics,
            })
            .await;
    }

    async fn server_status(&self, status: ServerStatus) {
        self.outgoing
            .emit::<ServerStatusNotification>(ServerStatusParams { status })
            .await;
    }
}
