//! User commands and the error policy they share.
//!
//! Every command returns [`CommandError`]; [`run_command`] is the one place
//! that decides what the user sees. Dismissing a picker is not a failure.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use checkstyle_config::{ConfigError, SettingsPatch, SettingsStore, SettingsTarget};
use checkstyle_rpc::uri::file_uri_to_path;
use checkstyle_rpc::{Outgoing, RpcError};
use checkstyle_types::{CheckCode, CheckCodeParams, Notification, ResolvedSettings, TOOL_NAME};

use crate::host::{DiagnosticSink, Prompter};

/// Covers a download of the engine jar before the check itself.
const CHECK_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const BUNDLED_CONFIGURATIONS: [&str; 2] = ["google_checks", "sun_checks"];

const CUSTOM_CONFIGURATION: &str = "Custom file...";

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The user dismissed a prompt.
    #[error("cancelled by user")]
    Cancelled,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Worker(#[from] RpcError),
    #[error("{0}")]
    Failed(String),
}

/// Commands exposed to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    SetVersion,
    SetConfigurationFile,
    SetPropertyFile,
    SetAutocheck,
    RunCheck,
}

impl Command {
    pub const ALL: [Self; 5] = [
        Self::SetVersion,
        Self::SetConfigurationFile,
        Self::SetPropertyFile,
        Self::SetAutocheck,
        Self::RunCheck,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::SetVersion => "set-version",
            Self::SetConfigurationFile => "set-configuration-file",
            Self::SetPropertyFile => "set-property-file",
            Self::SetAutocheck => "set-autocheck",
            Self::RunCheck => "run-check",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown command '{s}'"))
    }
}

/// Text shown for a failed command.
#[must_use]
pub fn error_message(err: &CommandError) -> String {
    format!("{TOOL_NAME} Error: - '{err}'")
}

/// Run a command and apply the error policy to its outcome.
///
/// Returns `true` when the command completed.
pub async fn run_command<F>(
    command: Command,
    prompter: &dyn Prompter,
    diagnostics: &dyn DiagnosticSink,
    fut: F,
) -> bool
where
    F: Future<Output = Result<(), CommandError>>,
{
    match fut.await {
        Ok(()) => true,
        Err(CommandError::Cancelled) => {
            tracing::debug!(%command, "cancelled");
            false
        }
        Err(e) => {
            tracing::error!(%command, "{e}");
            let message = error_message(&e);
            diagnostics.record(&format!("{command}: {message}"));
            prompter.show_error(&message);
            false
        }
    }
}

/// Everything a command needs from the controller.
#[derive(Clone)]
pub struct CommandContext {
    pub store: Arc<SettingsStore>,
    pub prompter: Arc<dyn Prompter>,
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

impl CommandContext {
    /// Run a settings command under the error policy.
    pub async fn execute(
        &self,
        command: Command,
        uri: Option<&str>,
        worker: Option<&Outgoing>,
    ) -> bool {
        let fut = async {
            match command {
                Command::SetVersion => self.set_version(uri).await,
                Command::SetConfigurationFile => self.set_configuration_file(uri).await,
                Command::SetPropertyFile => self.set_property_file(uri).await,
                Command::SetAutocheck => self.set_autocheck(uri).await,
                Command::RunCheck => run_check(worker, uri).await,
            }
        };
        run_command(command, self.prompter.as_ref(), self.diagnostics.as_ref(), fut).await
    }

    pub async fn set_version(&self, uri: Option<&str>) -> Result<(), CommandError> {
        let current = self.current(uri);
        let input = self
            .prompter
            .input("Checkstyle version", &current.version)
            .await
            .ok_or(CommandError::Cancelled)?;
        let version = input.trim();
        if version.is_empty() {
            return Err(CommandError::Cancelled);
        }
        if !is_version(version) {
            return Err(CommandError::Failed(format!(
                "'{version}' is not a version number"
            )));
        }
        self.write(uri, SettingsPatch::Version(version.to_string()))
    }

    pub async fn set_configuration_file(&self, uri: Option<&str>) -> Result<(), CommandError> {
        let current = self.current(uri);
        let mut options: Vec<String> = BUNDLED_CONFIGURATIONS.map(String::from).to_vec();
        options.push(CUSTOM_CONFIGURATION.to_string());

        let picked = self
            .prompter
            .pick(
                "Checkstyle configuration",
                &options,
                Some(&current.configuration_file),
            )
            .await
            .ok_or(CommandError::Cancelled)?;
        let value = if picked == CUSTOM_CONFIGURATION {
            let path = self
                .prompter
                .input("Path to the configuration file", "")
                .await
                .ok_or(CommandError::Cancelled)?;
            let path = path.trim().to_string();
            if path.is_empty() {
                return Err(CommandError::Cancelled);
            }
            path
        } else {
            picked
        };
        self.write(uri, SettingsPatch::ConfigurationFile(value))
    }

    /// An empty answer clears the properties file.
    pub async fn set_property_file(&self, uri: Option<&str>) -> Result<(), CommandError> {
        let current = self.current(uri);
        let input = self
            .prompter
            .input(
                "Path to the properties file (empty to clear)",
                current.properties_path.as_deref().unwrap_or_default(),
            )
            .await
            .ok_or(CommandError::Cancelled)?;
        let input = input.trim();
        let value = (!input.is_empty()).then(|| input.to_string());
        self.write(uri, SettingsPatch::PropertiesPath(value))
    }

    pub async fn set_autocheck(&self, uri: Option<&str>) -> Result<(), CommandError> {
        let current = self.current(uri);
        let options = vec!["on".to_string(), "off".to_string()];
        let picked = self
            .prompter
            .pick(
                "Check files automatically on open and save",
                &options,
                Some(if current.autocheck { "on" } else { "off" }),
            )
            .await
            .ok_or(CommandError::Cancelled)?;
        self.write(uri, SettingsPatch::Autocheck(picked == "on"))
    }

    /// Effective settings for the scope of `uri`.
    pub(crate) fn current(&self, uri: Option<&str>) -> ResolvedSettings {
        match scope_path(uri) {
            Some(path) => self.store.resolve_for(&path),
            None => self.store.resolve_global(),
        }
    }

    fn write(&self, uri: Option<&str>, patch: SettingsPatch) -> Result<(), CommandError> {
        let target = self.target(uri);
        tracing::info!(?target, ?patch, "updating settings");
        self.store.update(&target, patch)?;
        Ok(())
    }

    fn target(&self, uri: Option<&str>) -> SettingsTarget {
        self.store.target_for(scope_path(uri).as_deref())
    }
}

/// Ask the worker to check `uri` now, regardless of autocheck.
pub async fn run_check(worker: Option<&Outgoing>, uri: Option<&str>) -> Result<(), CommandError> {
    let uri = uri.ok_or_else(|| CommandError::Failed("no document to check".to_string()))?;
    let worker = worker
        .ok_or_else(|| CommandError::Failed("the Checkstyle worker is not running".to_string()))?;
    let params = serde_json::to_value(CheckCodeParams {
        uri: uri.to_string(),
    })
    .map_err(RpcError::from)?;
    let ran = worker
        .request(CheckCode::METHOD, Some(params), CHECK_REQUEST_TIMEOUT)
        .await?;
    tracing::debug!(uri, ran = %ran, "check requested");
    if ran.as_bool() != Some(true) {
        return Err(CommandError::Failed(format!(
            "{TOOL_NAME} could not run the check for {uri}"
        )));
    }
    Ok(())
}

fn scope_path(uri: Option<&str>) -> Option<PathBuf> {
    uri.and_then(file_uri_to_path)
}

fn is_version(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_digit())
        && s.split('.').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::host::HostFut;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    /// Prompter that replays scripted answers and records errors.
    #[derive(Default)]
    pub(crate) struct ScriptedPrompter {
        pub answers: Mutex<VecDeque<Option<String>>>,
        pub confirm: Mutex<bool>,
        pub errors: Mutex<Vec<String>>,
    }

    impl ScriptedPrompter {
        pub(crate) fn answering(answers: &[Option<&str>]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().map(|a| a.map(String::from)).collect()),
                ..Self::default()
            }
        }

        fn next(&self) -> Option<String> {
            self.answers.lock().unwrap().pop_front().flatten()
        }
    }

    impl Prompter for ScriptedPrompter {
        fn pick<'a>(
            &'a self,
            _title: &'a str,
            _options: &'a [String],
            _current: Option<&'a str>,
        ) -> HostFut<'a, Option<String>> {
            Box::pin(async move { self.next() })
        }

        fn input<'a>(&'a self, _prompt: &'a str, _initial: &'a str) -> HostFut<'a, Option<String>> {
            Box::pin(async move { self.next() })
        }

        fn confirm<'a>(&'a self, _message: &'a str, _accept: &'a str) -> HostFut<'a, bool> {
            Box::pin(async move { *self.confirm.lock().unwrap() })
        }

        fn show_error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingDiagnostics {
        pub lines: Mutex<Vec<String>>,
    }

    impl DiagnosticSink for RecordingDiagnostics {
        fn record(&self, message: &str) {
            self.lines.lock().unwrap().push(message.to_string());
        }
    }

    fn context(
        prompter: ScriptedPrompter,
    ) -> (CommandContext, Arc<ScriptedPrompter>, Arc<RecordingDiagnostics>) {
        let prompter = Arc::new(prompter);
        let diagnostics = Arc::new(RecordingDiagnostics::default());
        let ctx = CommandContext {
            store: Arc::new(SettingsStore::in_memory()),
            prompter: prompter.clone(),
            diagnostics: diagnostics.clone(),
        };
        (ctx, prompter, diagnostics)
    }

    #[tokio::test]
    async fn cancellation_is_silent() {
        let (ctx, prompter, diagnostics) = context(ScriptedPrompter::answering(&[None]));
        let completed = ctx.execute(Command::SetVersion, None, None).await;
        assert!(!completed);
        assert!(prompter.errors.lock().unwrap().is_empty());
        assert!(diagnostics.lines.lock().unwrap().is_empty());
        assert_eq!(ctx.store.resolve_global().version, "8.0");
    }

    #[tokio::test]
    async fn failures_are_logged_and_shown() {
        let (ctx, prompter, diagnostics) = context(ScriptedPrompter::default());
        let completed = ctx
            .execute(Command::RunCheck, Some("file:///ws/A.java"), None)
            .await;
        assert!(!completed);
        assert_eq!(
            prompter.errors.lock().unwrap().as_slice(),
            ["Checkstyle Error: - 'the Checkstyle worker is not running'"]
        );
        assert_eq!(diagnostics.lines.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn set_version_writes_global_without_scope() {
        let (ctx, _, _) = context(ScriptedPrompter::answering(&[Some(" 10.12.0 ")]));
        assert!(ctx.execute(Command::SetVersion, None, None).await);
        assert_eq!(ctx.store.resolve_global().version, "10.12.0");
    }

    #[tokio::test]
    async fn set_version_rejects_garbage() {
        let (ctx, prompter, _) = context(ScriptedPrompter::answering(&[Some("latest")]));
        assert!(!ctx.execute(Command::SetVersion, None, None).await);
        assert!(prompter.errors.lock().unwrap()[0].contains("'latest' is not a version number"));
    }

    #[tokio::test]
    async fn scoped_write_lands_in_deepest_folder() {
        let (ctx, _, _) = context(ScriptedPrompter::answering(&[Some("on")]));
        ctx.store
            .update(
                &SettingsTarget::Folder(PathBuf::from("/ws")),
                SettingsPatch::Version("9.3".to_string()),
            )
            .unwrap();

        assert!(
            ctx.execute(Command::SetAutocheck, Some("file:///ws/src/A.java"), None)
                .await
        );
        assert!(ctx.store.resolve_for(Path::new("/ws/src/A.java")).autocheck);
        assert!(!ctx.store.resolve_global().autocheck);
    }

    #[tokio::test]
    async fn custom_configuration_asks_for_a_path() {
        let (ctx, _, _) = context(ScriptedPrompter::answering(&[
            Some(CUSTOM_CONFIGURATION),
            Some("${workspaceFolder}/checks.xml"),
        ]));
        assert!(ctx.execute(Command::SetConfigurationFile, None, None).await);
        assert_eq!(
            ctx.store.resolve_global().configuration_file,
            "${workspaceFolder}/checks.xml"
        );
    }

    #[tokio::test]
    async fn empty_property_file_clears_it() {
        let (ctx, _, _) =
            context(ScriptedPrompter::answering(&[Some("/p/a.properties"), Some("")]));
        assert!(ctx.execute(Command::SetPropertyFile, None, None).await);
        assert_eq!(
            ctx.store.resolve_global().properties_path.as_deref(),
            Some("/p/a.properties")
        );
        assert!(ctx.execute(Command::SetPropertyFile, None, None).await);
        assert_eq!(ctx.store.resolve_global().properties_path, None);
    }

    #[test]
    fn command_names_round_trip() {
        for command in Command::ALL {
            assert_eq!(command.name().parse::<Command>(), Ok(command));
        }
        assert!("check-everything".parse::<Command>().is_err());
    }

    #[test]
    fn version_shapes() {
        assert!(is_version("8.0"));
        assert!(is_version("10.12.0"));
        assert!(is_version("8.0-SNAPSHOT"));
        assert!(!is_version("latest"));
        assert!(!is_version("8..0"));
    }
}
