//! Terminal implementations of the controller's host traits.

use std::collections::VecDeque;
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicU32, Ordering};

use checkstyle_controller::{DiagnosticSink, HostFut, Prompter, StatusEvent, StatusSurface};
use checkstyle_rpc::uri::file_uri_to_path;
use checkstyle_types::{CheckState, Diagnostic, MessageType, TOOL_NAME};

/// `path:line:col: severity: message [Check]`, positions 1-indexed.
pub fn format_diagnostic(uri: &str, diagnostic: &Diagnostic) -> String {
    let path = file_uri_to_path(uri)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| uri.to_string());
    let start = diagnostic.range.start;
    let mut line = format!(
        "{path}:{}:{}: {}: {}",
        start.line + 1,
        start.character + 1,
        diagnostic.severity.label(),
        diagnostic.message
    );
    if let Some(code) = &diagnostic.code {
        line.push_str(&format!(" [{code}]"));
    }
    line
}

/// Prints status to stderr and violations to stdout.
#[derive(Default)]
pub struct ConsoleSurface {
    violations: AtomicU32,
    failures: AtomicU32,
}

impl ConsoleSurface {
    /// Violations reported so far.
    pub fn violations(&self) -> u32 {
        self.violations.load(Ordering::Relaxed)
    }

    /// Checks or downloads that could not complete, and worker errors.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }
}

impl StatusSurface for ConsoleSurface {
    fn show(&self, event: StatusEvent) {
        match event {
            StatusEvent::Server(status) => {
                tracing::debug!(status = status.label(), "worker status");
            }
            StatusEvent::Check(check) => {
                match check.state {
                    CheckState::Success => {}
                    CheckState::Fail => {
                        self.violations.fetch_add(check.violations, Ordering::Relaxed);
                    }
                    CheckState::Exception => {
                        self.failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
                tracing::info!(
                    uri = %check.uri,
                    state = ?check.state,
                    violations = check.violations,
                    "check finished"
                );
            }
            StatusEvent::Diagnostics(params) => {
                let mut out = io::stdout().lock();
                for diagnostic in &params.diagnostics {
                    let _ = writeln!(out, "{}", format_diagnostic(&params.uri, diagnostic));
                }
            }
            StatusEvent::DownloadStarted => eprint!("Downloading {TOOL_NAME}..."),
            StatusEvent::DownloadProgress(percent) => {
                eprint!("\rDownloading {TOOL_NAME}... {percent}%");
            }
            StatusEvent::DownloadFinished => eprintln!("\rDownloading {TOOL_NAME}... done"),
            StatusEvent::DownloadFailed(failure) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                eprintln!();
                match failure.download_link {
                    Some(link) => eprintln!(
                        "Download failed: {}. You can fetch it manually from {link}",
                        failure.message
                    ),
                    None => eprintln!("Download failed: {}", failure.message),
                }
            }
            StatusEvent::VersionInvalid { uri } => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                eprintln!("The configured {TOOL_NAME} version does not exist (checking {uri})");
            }
            StatusEvent::Message { kind, message } => {
                let label = match kind {
                    MessageType::Error => {
                        self.failures.fetch_add(1, Ordering::Relaxed);
                        "error"
                    }
                    MessageType::Warning => "warning",
                    MessageType::Info | MessageType::Log => "info",
                };
                eprintln!("{label}: {message}");
            }
            StatusEvent::WorkerExited => eprintln!("{TOOL_NAME} worker exited"),
        }
    }
}

/// Answers prompts from preset values first, then from stdin when it is a
/// terminal. Without either, every prompt is dismissed.
pub struct ConsolePrompter {
    preset: Mutex<VecDeque<String>>,
    interactive: bool,
}

impl ConsolePrompter {
    pub fn new(preset: impl IntoIterator<Item = String>) -> Self {
        Self {
            preset: Mutex::new(preset.into_iter().collect()),
            interactive: io::stdin().is_terminal(),
        }
    }

    fn take_preset(&self) -> Option<String> {
        self.preset
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Print `prompt` and read one line. `None` on EOF or when not interactive.
    async fn ask(&self, prompt: String) -> Option<String> {
        if let Some(answer) = self.take_preset() {
            return Some(answer);
        }
        if !self.interactive {
            tracing::debug!(prompt, "no terminal, dismissing prompt");
            return None;
        }
        tokio::task::spawn_blocking(move || {
            eprint!("{prompt}");
            let _ = io::stderr().flush();
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            }
        })
        .await
        .ok()
        .flatten()
    }
}

/// Resolve a picker answer: an option number or an option's text.
fn choose(answer: &str, options: &[String]) -> Option<String> {
    let answer = answer.trim();
    if answer.is_empty() {
        return None;
    }
    if let Ok(n) = answer.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| options.get(i)).cloned();
    }
    Some(answer.to_string())
}

impl Prompter for ConsolePrompter {
    fn pick<'a>(
        &'a self,
        title: &'a str,
        options: &'a [String],
        current: Option<&'a str>,
    ) -> HostFut<'a, Option<String>> {
        Box::pin(async move {
            let mut prompt = format!("{title}\n");
            for (i, option) in options.iter().enumerate() {
                let marker = if current == Some(option.as_str()) { " (current)" } else { "" };
                prompt.push_str(&format!("  {}. {option}{marker}\n", i + 1));
            }
            prompt.push_str("> ");
            let answer = self.ask(prompt).await?;
            choose(&answer, options)
        })
    }

    fn input<'a>(&'a self, prompt: &'a str, initial: &'a str) -> HostFut<'a, Option<String>> {
        Box::pin(async move {
            let shown = if initial.is_empty() {
                format!("{prompt}: ")
            } else {
                format!("{prompt} [{initial}]: ")
            };
            let answer = self.ask(shown).await?;
            if answer.trim().is_empty() && !initial.is_empty() {
                return Some(initial.to_string());
            }
            Some(answer)
        })
    }

    fn confirm<'a>(&'a self, message: &'a str, accept: &'a str) -> HostFut<'a, bool> {
        Box::pin(async move {
            let answer = self.ask(format!("{message} ({accept}? y/N) ")).await;
            matches!(
                answer.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref(),
                Some("y" | "yes")
            )
        })
    }

    fn show_error(&self, message: &str) {
        eprintln!("{message}");
    }
}

/// Keeps command failures in the log file.
pub struct LogDiagnostics;

impl DiagnosticSink for LogDiagnostics {
    fn record(&self, message: &str) {
        tracing::error!(target: "checkstyle_output", "{message}");
    }
}
