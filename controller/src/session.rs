//! Lifecycle of the controller/worker session.
//!
//! `Stopped → Starting → Ready → Stopped`. The relay task is running from
//! the moment the channel exists, so the worker can be told it is too early
//! while `initialize` is still in flight.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use checkstyle_config::SettingsStore;
use checkstyle_rpc::message::{INTERNAL_ERROR, SERVER_NOT_INITIALIZED};
use checkstyle_rpc::uri::path_to_file_uri;
use checkstyle_rpc::{
    CloseReason, Connection, ConnectionHandle, Inbound, Outgoing, ResponseError, RpcError,
    parse_params,
};
use checkstyle_types::{
    CheckStatusNotification, ConfigurationItem, DidChangeConfiguration,
    DidChangeConfigurationParams, DownloadStart, DownloadStatus, DownloadStatusNotification,
    Notification, PublishDiagnostics, ServerStatusNotification, ShowMessage, VersionInvalid,
    WORKSPACE_CONFIGURATION,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::commands::{Command, CommandContext};
use crate::configuration::ConfigurationResolver;
use crate::host::{DiagnosticSink, Prompter, StatusEvent, StatusSurface};
use crate::worker::{WorkerCommand, WorkerProcess};

const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(30);

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Ready,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Spawn(#[from] anyhow::Error),
    #[error("worker initialize failed: {0}")]
    Initialize(#[source] RpcError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Editor collaborators handed to the session.
#[derive(Clone)]
pub struct Host {
    pub surface: Arc<dyn StatusSurface>,
    pub prompter: Arc<dyn Prompter>,
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

/// Document lifecycle events forwarded to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
    Opened,
    Saved,
    Closed,
}

impl DocumentEvent {
    fn method(self) -> &'static str {
        match self {
            Self::Opened => "textDocument/didOpen",
            Self::Saved => "textDocument/didSave",
            Self::Closed => "textDocument/didClose",
        }
    }
}

/// Routes the statuses of one download to the surface.
///
/// Opened by `DownloadStart`; the owner drops it once [`route`] reports the
/// terminal status.
///
/// [`route`]: DownloadSubscription::route
pub struct DownloadSubscription {
    surface: Arc<dyn StatusSurface>,
}

impl DownloadSubscription {
    fn open(surface: Arc<dyn StatusSurface>) -> Self {
        surface.show(StatusEvent::DownloadStarted);
        Self { surface }
    }

    /// `true` when `status` ends the download.
    fn route(&self, status: DownloadStatus) -> bool {
        let terminal = status.is_terminal();
        let event = match status {
            DownloadStatus::Downloading { percent } => StatusEvent::DownloadProgress(percent),
            DownloadStatus::Finished => StatusEvent::DownloadFinished,
            DownloadStatus::Error { error } => StatusEvent::DownloadFailed(error),
        };
        self.surface.show(event);
        terminal
    }
}

struct ActiveSession {
    connection: ConnectionHandle,
    process: Option<WorkerProcess>,
    relay: JoinHandle<()>,
    listener: Option<JoinHandle<()>>,
}

pub struct SessionManager {
    worker: WorkerCommand,
    workspace_root: PathBuf,
    store: Arc<SettingsStore>,
    host: Host,
    state: Arc<watch::Sender<SessionState>>,
    active: Option<ActiveSession>,
}

impl SessionManager {
    pub fn new(
        worker: WorkerCommand,
        workspace_root: PathBuf,
        store: Arc<SettingsStore>,
        host: Host,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Stopped);
        Self {
            worker,
            workspace_root,
            store,
            host,
            state: Arc::new(state),
            active: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Spawn the worker and complete the handshake. A no-op while a session
    /// is already starting or ready.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.active.is_some() {
            if self.state() != SessionState::Stopped {
                tracing::debug!("start: session already active");
                return Ok(());
            }
            // The previous worker died; clear what is left of it.
            self.stop().await;
        }
        let (process, connection) = WorkerProcess::spawn(&self.worker)?;
        self.attach(connection, Some(process)).await
    }

    async fn attach(
        &mut self,
        connection: Connection,
        process: Option<WorkerProcess>,
    ) -> Result<(), SessionError> {
        self.state.send_replace(SessionState::Starting);
        let (connection, inbound) = connection.split();
        let outgoing = connection.outgoing.clone();
        let relay = tokio::spawn(relay(
            inbound,
            Relay {
                outgoing: outgoing.clone(),
                resolver: ConfigurationResolver::new(self.store.clone()),
                state: self.state.clone(),
                surface: self.host.surface.clone(),
                commands: self.commands(),
            },
        ));
        self.active = Some(ActiveSession {
            connection,
            process,
            relay,
            listener: None,
        });

        if let Err(e) = outgoing
            .request("initialize", Some(self.initialize_params()), INITIALIZE_TIMEOUT)
            .await
        {
            tracing::warn!("worker initialize failed: {e}");
            self.teardown(false).await;
            return Err(SessionError::Initialize(e));
        }

        self.state.send_replace(SessionState::Ready);
        outgoing.notify_method("initialized", Some(json!({}))).await?;

        let listener = tokio::spawn(forward_settings_changes(self.store.subscribe(), outgoing));
        if let Some(active) = &mut self.active {
            active.listener = Some(listener);
        }
        tracing::info!(root = %self.workspace_root.display(), "session ready");
        Ok(())
    }

    fn initialize_params(&self) -> Value {
        let root_uri = match path_to_file_uri(&self.workspace_root) {
            Ok(uri) => Value::String(uri.to_string()),
            Err(e) => {
                tracing::warn!("{e}");
                Value::Null
            }
        };
        json!({
            "processId": process::id(),
            "rootUri": root_uri,
            "capabilities": {},
            "clientInfo": { "name": "checkstyle-ctl", "version": env!("CARGO_PKG_VERSION") }
        })
    }

    /// Shut the worker down. Safe to call in any state.
    pub async fn stop(&mut self) {
        self.teardown(true).await;
    }

    async fn teardown(&mut self, graceful: bool) {
        let Some(active) = self.active.take() else {
            tracing::debug!("stop: no active session");
            self.state.send_replace(SessionState::Stopped);
            return;
        };

        if let Some(listener) = active.listener {
            listener.abort();
        }

        let outgoing = active.connection.outgoing.clone();
        if graceful {
            match outgoing.request("shutdown", None, SHUTDOWN_TIMEOUT).await {
                Ok(_) => {
                    // Stopped before `exit` so the relay treats the EOF as expected.
                    self.state.send_replace(SessionState::Stopped);
                    let _ = outgoing.notify_method("exit", None).await;
                }
                Err(e) => tracing::debug!("shutdown request failed: {e}"),
            }
        }
        self.state.send_replace(SessionState::Stopped);
        active.connection.close().await;

        // The reader is gone; let the relay finish what it already received.
        // Dropping it also drops any open download subscription.
        let mut relay = active.relay;
        if tokio::time::timeout(RELAY_DRAIN_TIMEOUT, &mut relay).await.is_err() {
            relay.abort();
        }
        if let Some(process) = active.process {
            process.wait_or_kill(SHUTDOWN_TIMEOUT).await;
        }
        tracing::info!("session stopped");
    }

    fn commands(&self) -> CommandContext {
        CommandContext {
            store: self.store.clone(),
            prompter: self.host.prompter.clone(),
            diagnostics: self.host.diagnostics.clone(),
        }
    }

    fn ready_outgoing(&self) -> Option<&Outgoing> {
        if self.state() != SessionState::Ready {
            return None;
        }
        self.active.as_ref().map(|a| &a.connection.outgoing)
    }

    /// Run a user command under the error policy. `true` when it completed.
    pub async fn execute(&self, command: Command, uri: Option<&str>) -> bool {
        self.commands()
            .execute(command, uri, self.ready_outgoing())
            .await
    }

    /// Tell the worker about a document. Dropped unless the session is ready.
    pub async fn document_event(&self, event: DocumentEvent, uri: &str, text: Option<&str>) {
        let Some(outgoing) = self.ready_outgoing() else {
            tracing::debug!(uri, ?event, "session not ready, dropping document event");
            return;
        };
        let params = match event {
            DocumentEvent::Opened => json!({
                "textDocument": {
                    "uri": uri,
                    "languageId": "java",
                    "version": 1,
                    "text": text.unwrap_or_default()
                }
            }),
            DocumentEvent::Saved | DocumentEvent::Closed => {
                json!({ "textDocument": { "uri": uri } })
            }
        };
        if let Err(e) = outgoing.notify_method(event.method(), Some(params)).await {
            tracing::warn!(uri, "failed to forward {}: {e}", event.method());
        }
    }
}

/// Send `didChangeConfiguration` after every settings revision.
async fn forward_settings_changes(mut revisions: watch::Receiver<u64>, outgoing: Outgoing) {
    while revisions.changed().await.is_ok() {
        let params = DidChangeConfigurationParams::default();
        if let Err(e) = outgoing.notify::<DidChangeConfiguration>(&params).await {
            tracing::warn!("failed to send configuration change: {e}");
            break;
        }
        tracing::debug!("settings changed, worker notified");
    }
}

#[derive(Debug, Deserialize)]
struct ConfigurationParams {
    items: Vec<ConfigurationItem>,
}

struct Relay {
    outgoing: Outgoing,
    resolver: ConfigurationResolver,
    state: Arc<watch::Sender<SessionState>>,
    surface: Arc<dyn StatusSurface>,
    commands: CommandContext,
}

async fn relay(mut inbound: mpsc::Receiver<Inbound>, relay: Relay) {
    let mut download: Option<DownloadSubscription> = None;
    while let Some(message) = inbound.recv().await {
        match message {
            Inbound::Request { id, method, params } => {
                let outcome = relay.answer(&method, params);
                if let Err(e) = relay.outgoing.respond(id, outcome).await {
                    tracing::warn!(method, "failed to answer worker: {e}");
                }
            }
            Inbound::Notification { method, params } => {
                relay.on_notification(&method, params, &mut download);
            }
            Inbound::Closed(reason) => {
                if relay.state.send_replace(SessionState::Stopped) == SessionState::Stopped {
                    tracing::debug!(?reason, "worker channel closed after stop");
                    break;
                }
                match reason {
                    CloseReason::Eof => tracing::warn!("worker closed the channel"),
                    CloseReason::Failed(e) => tracing::warn!("worker channel failed: {e}"),
                }
                relay.surface.show(StatusEvent::WorkerExited);
                break;
            }
        }
    }
}

impl Relay {
    fn answer(&self, method: &str, params: Option<Value>) -> Result<Value, ResponseError> {
        if method != WORKSPACE_CONFIGURATION {
            return Err(ResponseError::method_not_found(method));
        }
        if *self.state.borrow() != SessionState::Ready {
            return Err(ResponseError::new(SERVER_NOT_INITIALIZED, "session is not ready"));
        }
        let params: ConfigurationParams = parse_params(params)?;
        let answer = self.resolver.compute_configuration(&params.items);
        serde_json::to_value(answer).map_err(|e| ResponseError::new(INTERNAL_ERROR, e.to_string()))
    }

    fn on_notification(
        &self,
        method: &str,
        params: Option<Value>,
        download: &mut Option<DownloadSubscription>,
    ) {
        match method {
            DownloadStart::METHOD => {
                if download.is_some() {
                    tracing::debug!("download started while another was open, replacing it");
                }
                *download = Some(DownloadSubscription::open(self.surface.clone()));
            }
            DownloadStatusNotification::METHOD => {
                let Some(status) = decode::<DownloadStatusNotification>(params) else {
                    return;
                };
                match download {
                    Some(subscription) => {
                        if subscription.route(status) {
                            *download = None;
                        }
                    }
                    None => tracing::debug!(?status, "download status with no open download"),
                }
            }
            VersionInvalid::METHOD => {
                if let Some(p) = decode::<VersionInvalid>(params) {
                    self.surface
                        .show(StatusEvent::VersionInvalid { uri: p.uri.clone() });
                    self.offer_version_change(p.uri);
                }
            }
            ServerStatusNotification::METHOD => {
                if let Some(p) = decode::<ServerStatusNotification>(params) {
                    self.surface.show(StatusEvent::Server(p.status));
                }
            }
            CheckStatusNotification::METHOD => {
                if let Some(p) = decode::<CheckStatusNotification>(params) {
                    self.surface.show(StatusEvent::Check(p));
                }
            }
            PublishDiagnostics::METHOD => {
                if let Some(p) = decode::<PublishDiagnostics>(params) {
                    self.surface.show(StatusEvent::Diagnostics(p));
                }
            }
            ShowMessage::METHOD => {
                if let Some(p) = decode::<ShowMessage>(params) {
                    self.surface.show(StatusEvent::Message {
                        kind: p.kind,
                        message: p.message,
                    });
                }
            }
            other => tracing::debug!(method = other, "ignoring worker notification"),
        }
    }

    /// Ask whether to pick another version; runs set-version on yes.
    fn offer_version_change(&self, uri: String) {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let version = commands.current(Some(&uri)).version;
            let message = format!(
                "Checkstyle version {version} does not exist. Do you want to change the version?"
            );
            if commands.prompter.confirm(&message, "Change version").await {
                commands.execute(Command::SetVersion, Some(&uri), None).await;
            } else {
                tracing::debug!(uri, "version change declined");
            }
        });
    }
}

fn decode<N: Notification>(params: Option<Value>) -> Option<N::Params> {
    match parse_params::<N::Params>(params) {
        Ok(p) => Some(p),
        Err(e) => {
            tracing::warn!(method = N::METHOD, "malformed notification: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{RecordingDiagnostics, ScriptedPrompter};
    use checkstyle_config::{SettingsPatch, SettingsTarget};
    use checkstyle_rpc::connect;
    use checkstyle_types::{
        DownloadStartParams, ServerStatus, ServerStatusParams, VersionInvalidParams,
    };
    use std::sync::Mutex;
    use tokio::io::duplex;

    #[derive(Default)]
    struct RecordingSurface {
        events: Mutex<Vec<StatusEvent>>,
    }

    impl RecordingSurface {
        fn events(&self) -> Vec<StatusEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl StatusSurface for RecordingSurface {
        fn show(&self, event: StatusEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    struct Fixture {
        manager: SessionManager,
        surface: Arc<RecordingSurface>,
        prompter: Arc<ScriptedPrompter>,
        store: Arc<SettingsStore>,
    }

    fn fixture(prompter: ScriptedPrompter) -> Fixture {
        let surface = Arc::new(RecordingSurface::default());
        let prompter = Arc::new(prompter);
        let store = Arc::new(SettingsStore::in_memory());
        let manager = SessionManager::new(
            WorkerCommand::new("checkstyle-worker"),
            PathBuf::from("/ws"),
            store.clone(),
            Host {
                surface: surface.clone(),
                prompter: prompter.clone(),
                diagnostics: Arc::new(RecordingDiagnostics::default()),
            },
        );
        Fixture {
            manager,
            surface,
            prompter,
            store,
        }
    }

    fn pair() -> (Connection, Connection) {
        let (a, b) = duplex(64 * 1024);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        (
            connect(a_read, a_write, "controller"),
            connect(b_read, b_write, "worker"),
        )
    }

    async fn next_request(worker: &mut Connection) -> (Value, String, Option<Value>) {
        loop {
            match worker.inbound.recv().await {
                Some(Inbound::Request { id, method, params }) => return (id, method, params),
                Some(_) => {}
                None => panic!("channel closed"),
            }
        }
    }

    async fn next_notification(worker: &mut Connection) -> (String, Option<Value>) {
        loop {
            match worker.inbound.recv().await {
                Some(Inbound::Notification { method, params }) => return (method, params),
                Some(_) => {}
                None => panic!("channel closed"),
            }
        }
    }

    /// Attach the manager to a scripted worker that accepts `initialize`.
    async fn ready(fixture: &mut Fixture) -> Connection {
        let (controller, mut worker) = pair();
        let (attached, ()) = tokio::join!(fixture.manager.attach(controller, None), async {
            let (id, method, _) = next_request(&mut worker).await;
            assert_eq!(method, "initialize");
            worker
                .outgoing
                .respond(id, Ok(json!({ "capabilities": {} })))
                .await
                .unwrap();
        });
        attached.unwrap();
        let (method, _) = next_notification(&mut worker).await;
        assert_eq!(method, "initialized");
        worker
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn configuration_before_ready_is_rejected_then_answered() {
        let mut fixture = fixture(ScriptedPrompter::default());
        let (controller, mut worker) = pair();

        let (attached, ()) = tokio::join!(fixture.manager.attach(controller, None), async {
            let (id, _, params) = next_request(&mut worker).await;
            assert!(params.unwrap()["rootUri"].as_str().unwrap().starts_with("file://"));

            let err = worker
                .outgoing
                .request(
                    WORKSPACE_CONFIGURATION,
                    Some(json!({ "items": [{}] })),
                    Duration::from_secs(5),
                )
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                RpcError::Remote(ResponseError { code: SERVER_NOT_INITIALIZED, .. })
            ));

            worker
                .outgoing
                .respond(id, Ok(json!({ "capabilities": {} })))
                .await
                .unwrap();
        });
        attached.unwrap();
        assert_eq!(fixture.manager.state(), SessionState::Ready);

        let answer = worker
            .outgoing
            .request(
                WORKSPACE_CONFIGURATION,
                Some(json!({ "items": [{}, { "section": "java" }] })),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(answer[0]["version"], "8.0");
        assert_eq!(answer[0]["configurationFile"], "google_checks");
        assert!(answer[1].is_null());

        let empty = worker
            .outgoing
            .request(
                WORKSPACE_CONFIGURATION,
                Some(json!({ "items": [] })),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(empty.is_null());
    }

    #[tokio::test]
    async fn download_statuses_are_relayed_in_order() {
        let mut fixture = fixture(ScriptedPrompter::default());
        let worker = ready(&mut fixture).await;

        // A status with no open download is dropped.
        worker
            .outgoing
            .notify::<DownloadStatusNotification>(&DownloadStatus::Finished)
            .await
            .unwrap();
        worker
            .outgoing
            .notify::<DownloadStart>(&DownloadStartParams {})
            .await
            .unwrap();
        for percent in [10, 50, 100] {
            worker
                .outgoing
                .notify::<DownloadStatusNotification>(&DownloadStatus::Downloading { percent })
                .await
                .unwrap();
        }
        worker
            .outgoing
            .notify::<DownloadStatusNotification>(&DownloadStatus::Finished)
            .await
            .unwrap();
        worker
            .outgoing
            .notify::<ServerStatusNotification>(&ServerStatusParams {
                status: ServerStatus::Idle,
            })
            .await
            .unwrap();

        let surface = fixture.surface.clone();
        wait_until(|| surface.events().len() >= 6).await;
        assert_eq!(
            fixture.surface.events(),
            vec![
                StatusEvent::DownloadStarted,
                StatusEvent::DownloadProgress(10),
                StatusEvent::DownloadProgress(50),
                StatusEvent::DownloadProgress(100),
                StatusEvent::DownloadFinished,
                StatusEvent::Server(ServerStatus::Idle),
            ]
        );
    }

    #[tokio::test]
    async fn settings_change_notifies_worker() {
        let mut fixture = fixture(ScriptedPrompter::default());
        let mut worker = ready(&mut fixture).await;

        fixture
            .store
            .update(&SettingsTarget::Global, SettingsPatch::Autocheck(true))
            .unwrap();

        let (method, params) = next_notification(&mut worker).await;
        assert_eq!(method, DidChangeConfiguration::METHOD);
        assert_eq!(params, Some(json!({ "settings": null })));
    }

    #[tokio::test]
    async fn version_invalid_offers_set_version() {
        let mut fixture = fixture(ScriptedPrompter::answering(&[Some("10.12.0")]));
        *fixture.prompter.confirm.lock().unwrap() = true;
        let worker = ready(&mut fixture).await;

        worker
            .outgoing
            .notify::<VersionInvalid>(&VersionInvalidParams {
                uri: "file:///ws/src/A.java".to_string(),
            })
            .await
            .unwrap();

        let store = fixture.store.clone();
        wait_until(|| store.resolve_global().version == "10.12.0").await;
        assert_eq!(
            fixture.surface.events(),
            vec![StatusEvent::VersionInvalid {
                uri: "file:///ws/src/A.java".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn run_check_is_forwarded_to_worker() {
        let mut fixture = fixture(ScriptedPrompter::default());
        let mut worker = ready(&mut fixture).await;

        let (completed, ()) = tokio::join!(
            fixture
                .manager
                .execute(Command::RunCheck, Some("file:///ws/src/A.java")),
            async {
                let (id, method, params) = next_request(&mut worker).await;
                assert_eq!(method, "checkstyle/checkCode");
                assert_eq!(params.unwrap()["uri"], "file:///ws/src/A.java");
                worker.outgoing.respond(id, Ok(json!(true))).await.unwrap();
            }
        );
        assert!(completed);
        assert!(fixture.prompter.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn check_the_worker_could_not_run_is_a_failure() {
        let mut fixture = fixture(ScriptedPrompter::default());
        let mut worker = ready(&mut fixture).await;

        let (completed, ()) = tokio::join!(
            fixture
                .manager
                .execute(Command::RunCheck, Some("untitled:Scratch.java")),
            async {
                let (id, method, _) = next_request(&mut worker).await;
                assert_eq!(method, "checkstyle/checkCode");
                worker.outgoing.respond(id, Ok(json!(false))).await.unwrap();
            }
        );
        assert!(!completed);
        let errors = fixture.prompter.errors.lock().unwrap().clone();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("could not run the check"), "{errors:?}");
    }

    #[tokio::test]
    async fn document_events_reach_the_worker_when_ready() {
        let mut fixture = fixture(ScriptedPrompter::default());
        fixture
            .manager
            .document_event(DocumentEvent::Saved, "file:///ws/A.java", None)
            .await;

        let mut worker = ready(&mut fixture).await;
        fixture
            .manager
            .document_event(DocumentEvent::Opened, "file:///ws/A.java", Some("class A {}"))
            .await;
        let (method, params) = next_notification(&mut worker).await;
        assert_eq!(method, "textDocument/didOpen");
        assert_eq!(params.unwrap()["textDocument"]["text"], "class A {}");
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_says_goodbye() {
        let mut fixture = fixture(ScriptedPrompter::default());
        let mut worker = ready(&mut fixture).await;

        let goodbye = tokio::spawn(async move {
            let (id, method, _) = next_request(&mut worker).await;
            assert_eq!(method, "shutdown");
            worker.outgoing.respond(id, Ok(Value::Null)).await.unwrap();
            let (method, _) = next_notification(&mut worker).await;
            assert_eq!(method, "exit");
        });

        fixture.manager.stop().await;
        assert_eq!(fixture.manager.state(), SessionState::Stopped);
        fixture.manager.stop().await;
        assert_eq!(fixture.manager.state(), SessionState::Stopped);
        goodbye.await.unwrap();

        let ran = fixture
            .manager
            .execute(Command::RunCheck, Some("file:///ws/A.java"))
            .await;
        assert!(!ran);
    }

    #[tokio::test]
    async fn worker_exit_is_reported() {
        let mut fixture = fixture(ScriptedPrompter::default());
        let worker = ready(&mut fixture).await;
        worker.close().await;

        let surface = fixture.surface.clone();
        wait_until(|| surface.events().contains(&StatusEvent::WorkerExited)).await;
        assert_eq!(fixture.manager.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn failed_initialize_leaves_session_stopped() {
        let mut fixture = fixture(ScriptedPrompter::default());
        let (controller, mut worker) = pair();

        let (attached, ()) = tokio::join!(fixture.manager.attach(controller, None), async {
            let (id, _, _) = next_request(&mut worker).await;
            worker
                .outgoing
                .respond(id, Err(ResponseError::new(INTERNAL_ERROR, "no java")))
                .await
                .unwrap();
        });
        assert!(matches!(attached, Err(SessionError::Initialize(_))));
        assert_eq!(fixture.manager.state(), SessionState::Stopped);
    }
}
