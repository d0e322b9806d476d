//! `textDocument/publishDiagnostics` payload for check violations.

use serde::{Deserialize, Serialize};

use crate::notifications::Notification;

/// Severity of a violation, numbered as on the wire (1 = error .. 4 = hint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl TryFrom<u8> for DiagnosticSeverity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            1 => Ok(Self::Error),
            2 => Ok(Self::Warning),
            3 => Ok(Self::Information),
            4 => Ok(Self::Hint),
            other => Err(format!("unknown diagnostic severity {other}")),
        }
    }
}

impl From<DiagnosticSeverity> for u8 {
    fn from(value: DiagnosticSeverity) -> Self {
        value as u8
    }
}

impl DiagnosticSeverity {
    /// Map a Checkstyle severity tag (`ERROR`, `WARN`, `INFO`, ...).
    #[must_use]
    pub fn from_checkstyle(tag: &str) -> Self {
        match tag.to_ascii_uppercase().as_str() {
            "ERROR" => Self::Error,
            "WARN" | "WARNING" => Self::Warning,
            "INFO" => Self::Information,
            _ => Self::Hint,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// 0-indexed.
    pub line: u32,
    /// 0-indexed.
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: DiagnosticSeverity,
    pub source: String,
    /// Name of the check that fired, e.g. `LineLength`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishDiagnosticsParams {
    pub uri: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Violations for one document; an empty list clears it.
pub enum PublishDiagnostics {}

impl Notification for PublishDiagnostics {
    const METHOD: &'static str = "textDocument/publishDiagnostics";
    type Params = PublishDiagnosticsParams;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkstyle_tags_map_to_severity() {
        assert_eq!(DiagnosticSeverity::from_checkstyle("ERROR"), DiagnosticSeverity::Error);
        assert_eq!(DiagnosticSeverity::from_checkstyle("WARN"), DiagnosticSeverity::Warning);
        assert_eq!(DiagnosticSeverity::from_checkstyle("info"), DiagnosticSeverity::Information);
        assert_eq!(DiagnosticSeverity::from_checkstyle("IGNORE"), DiagnosticSeverity::Hint);
    }

    #[test]
    fn publish_diagnostics_wire_shape() {
        let params = PublishDiagnosticsParams {
            uri: "file:///A.java".to_string(),
            diagnostics: vec![Diagnostic {
                range: Range {
                    start: Position { line: 2, character: 4 },
                    end: Position { line: 2, character: 4 },
                },
                severity: DiagnosticSeverity::Warning,
                source: "checkstyle".to_string(),
                code: Some("LineLength".to_string()),
                message: "Line is longer than 100 characters".to_string(),
            }],
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["diagnostics"][0]["severity"], 2);
        assert_eq!(json["diagnostics"][0]["range"]["start"]["line"], 2);
        assert_eq!(json["diagnostics"][0]["code"], "LineLength");
    }

    #[test]
    fn out_of_range_severity_is_rejected() {
        let result: Result<DiagnosticSeverity, _> = serde_json::from_value(serde_json::json!(7));
        assert!(result.is_err());
    }
}
