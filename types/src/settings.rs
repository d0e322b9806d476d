//! Configuration query and answer shapes.

use serde::{Deserialize, Serialize};

pub const DEFAULT_VERSION: &str = "8.0";

pub const DEFAULT_CONFIGURATION_FILE: &str = "google_checks";

/// One entry of a `workspace/configuration` request.
///
/// A non-empty `section` names a settings section this protocol does not
/// own; such entries are answered with `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_uri: Option<String>,
}

impl ConfigurationItem {
    /// Item scoped to a single resource.
    #[must_use]
    pub fn scoped(uri: impl Into<String>) -> Self {
        Self {
            section: None,
            scope_uri: Some(uri.into()),
        }
    }

    /// Whether this item names a section handled elsewhere.
    #[must_use]
    pub fn names_section(&self) -> bool {
        self.section.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Effective settings for one scope, with defaults already applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSettings {
    pub autocheck: bool,
    pub version: String,
    pub configuration_file: String,
    pub properties_path: Option<String>,
}

impl Default for ResolvedSettings {
    fn default() -> Self {
        Self {
            autocheck: false,
            version: DEFAULT_VERSION.to_string(),
            configuration_file: DEFAULT_CONFIGURATION_FILE.to_string(),
            properties_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = ResolvedSettings::default();
        assert!(!settings.autocheck);
        assert_eq!(settings.version, "8.0");
        assert_eq!(settings.configuration_file, "google_checks");
        assert!(settings.properties_path.is_none());
    }

    #[test]
    fn resolved_settings_wire_shape() {
        let json = serde_json::to_value(ResolvedSettings::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "autocheck": false,
                "version": "8.0",
                "configurationFile": "google_checks",
                "propertiesPath": null
            })
        );
    }

    #[test]
    fn configuration_item_accepts_missing_fields() {
        let item: ConfigurationItem = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(item.section.is_none());
        assert!(item.scope_uri.is_none());

        let item: ConfigurationItem =
            serde_json::from_value(serde_json::json!({ "scopeUri": "file:///a/B.java" })).unwrap();
        assert_eq!(item.scope_uri.as_deref(), Some("file:///a/B.java"));
    }

    #[test]
    fn empty_section_is_not_a_named_section() {
        let item = ConfigurationItem {
            section: Some(String::new()),
            scope_uri: None,
        };
        assert!(!item.names_section());

        let item = ConfigurationItem {
            section: Some("java.home".to_string()),
            scope_uri: None,
        };
        assert!(item.names_section());
    }
}
