//! Running the engine jar and reading its plain-format report.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use checkstyle_types::{Diagnostic, DiagnosticSeverity, Position, Range, TOOL_NAME};
use regex::Regex;
use tokio::process::Command;

const CHECK_TIMEOUT: Duration = Duration::from_secs(120);

/// Printed by the engine once every file has been audited.
const AUDIT_DONE: &str = "Audit done.";

const WORKSPACE_FOLDER_VAR: &str = "${workspaceFolder}";

/// `[SEVERITY] path:line[:col]: message [CheckName]`
const VIOLATION_PATTERN: &str =
    r"^\[(?<severity>[A-Z]+)\]\s+(?<path>.+?):(?<line>\d+)(?::(?<col>\d+))?:\s*(?<message>.*?)(?:\s+\[(?<check>\w+)\])?\s*$";

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("failed to start {}: {source}", java.display())]
    Spawn {
        java: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Checkstyle did not finish within {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("Checkstyle failed: {0}")]
    Engine(String),
}

/// One reported violation, positions as printed (1-indexed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub severity: DiagnosticSeverity,
    pub path: String,
    pub line: u32,
    pub column: Option<u32>,
    pub message: String,
    pub check: Option<String>,
}

impl Violation {
    #[must_use]
    pub fn to_diagnostic(&self) -> Diagnostic {
        let position = Position {
            line: self.line.saturating_sub(1),
            character: self.column.map_or(0, |c| c.saturating_sub(1)),
        };
        Diagnostic {
            range: Range {
                start: position,
                end: position,
            },
            severity: self.severity,
            source: TOOL_NAME.to_string(),
            code: self.check.clone(),
            message: self.message.clone(),
        }
    }
}

pub struct Checker {
    java: PathBuf,
    timeout: Duration,
    violation: Regex,
}

impl Checker {
    pub fn new(java: impl Into<PathBuf>) -> Result<Self, regex::Error> {
        Ok(Self {
            java: java.into(),
            timeout: CHECK_TIMEOUT,
            violation: Regex::new(VIOLATION_PATTERN)?,
        })
    }

    /// Arguments after the java binary.
    #[must_use]
    pub fn command_args(
        jar: &Path,
        configuration: &str,
        properties: Option<&Path>,
        file: &Path,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-jar".into(),
            jar.into(),
            "-c".into(),
            configuration.into(),
        ];
        if let Some(properties) = properties {
            args.push("-p".into());
            args.push(properties.into());
        }
        args.push(file.into());
        args
    }

    /// Check `file` and return the violations found in it.
    pub async fn run(
        &self,
        jar: &Path,
        configuration: &str,
        properties: Option<&Path>,
        file: &Path,
    ) -> Result<Vec<Violation>, CheckError> {
        let mut cmd = Command::new(&self.java);
        cmd.args(Self::command_args(jar, configuration, properties, file))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = file.parent() {
            cmd.current_dir(dir);
        }

        tracing::debug!(file = %file.display(), configuration, "running Checkstyle");
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| CheckError::Timeout(self.timeout))?
            .map_err(|source| CheckError::Spawn {
                java: self.java.clone(),
                source,
            })?;

        // The exit code counts violations, so only a missing audit footer
        // means the engine itself failed.
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.contains(AUDIT_DONE) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = first_line(&stderr)
                .or_else(|| first_line(&stdout))
                .unwrap_or("no output");
            return Err(CheckError::Engine(detail.to_string()));
        }
        Ok(self.parse_output(&stdout))
    }

    /// Violation lines of a plain-format report; everything else is skipped.
    #[must_use]
    pub fn parse_output(&self, output: &str) -> Vec<Violation> {
        output
            .lines()
            .filter_map(|line| {
                let caps = self.violation.captures(line.trim_end())?;
                Some(Violation {
                    severity: DiagnosticSeverity::from_checkstyle(&caps["severity"]),
                    path: caps["path"].to_string(),
                    line: caps["line"].parse().ok()?,
                    column: caps.name("col").and_then(|c| c.as_str().parse().ok()),
                    message: caps["message"].to_string(),
                    check: caps.name("check").map(|c| c.as_str().to_string()),
                })
            })
            .collect()
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Turn a `configurationFile` setting into the `-c` argument.
///
/// The two bundled names map to the configurations packaged in the jar.
#[must_use]
pub fn resolve_configuration_file(value: &str, workspace_root: Option<&Path>) -> String {
    match value {
        "google_checks" => return "/google_checks.xml".to_string(),
        "sun_checks" => return "/sun_checks.xml".to_string(),
        _ => {}
    }

    let Some(root) = workspace_root else {
        return value.to_string();
    };
    let substituted = value.replace(WORKSPACE_FOLDER_VAR, &root.to_string_lossy());
    let path = Path::new(&substituted);
    if path.is_relative() {
        root.join(path).to_string_lossy().into_owned()
    } else {
        substituted
    }
}
