//! Answers to the worker's `workspace/configuration` queries.

use std::sync::Arc;

use checkstyle_config::SettingsStore;
use checkstyle_rpc::uri::file_uri_to_path;
use checkstyle_types::{ConfigurationItem, ResolvedSettings};

/// Read-only view of the settings store shaped for configuration queries.
#[derive(Clone)]
pub struct ConfigurationResolver {
    store: Arc<SettingsStore>,
}

impl ConfigurationResolver {
    pub fn new(store: Arc<SettingsStore>) -> Self {
        Self { store }
    }

    /// One answer per item, in order. `None` for an empty query.
    ///
    /// Items naming a section get `None`. Items with a scope URI get that
    /// resource's settings; the rest get the workspace-global settings.
    #[must_use]
    pub fn compute_configuration(
        &self,
        items: &[ConfigurationItem],
    ) -> Option<Vec<Option<ResolvedSettings>>> {
        if items.is_empty() {
            return None;
        }
        Some(items.iter().map(|item| self.resolve_item(item)).collect())
    }

    fn resolve_item(&self, item: &ConfigurationItem) -> Option<ResolvedSettings> {
        if item.names_section() {
            return None;
        }
        let scoped = item.scope_uri.as_deref().and_then(|uri| {
            let path = file_uri_to_path(uri);
            if path.is_none() {
                tracing::debug!(uri, "scope is not a file URI, using global settings");
            }
            path
        });
        Some(match scoped {
            Some(path) => self.store.resolve_for(&path),
            None => self.store.resolve_global(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkstyle_config::{SettingsPatch, SettingsTarget};
    use std::path::PathBuf;

    fn resolver() -> ConfigurationResolver {
        let store = Arc::new(SettingsStore::in_memory());
        store
            .update(&SettingsTarget::Global, SettingsPatch::Autocheck(true))
            .unwrap();
        store
            .update(
                &SettingsTarget::Folder(PathBuf::from("/ws/legacy")),
                SettingsPatch::Version("9.3".to_string()),
            )
            .unwrap();
        ConfigurationResolver::new(store)
    }

    #[test]
    fn empty_query_has_no_answer() {
        assert_eq!(resolver().compute_configuration(&[]), None);
    }

    #[test]
    fn answers_match_query_length_and_order() {
        let items = vec![
            ConfigurationItem::default(),
            ConfigurationItem::scoped("file:///ws/legacy/src/A.java"),
            ConfigurationItem {
                section: Some("java".to_string()),
                scope_uri: None,
            },
            ConfigurationItem::scoped("file:///ws/src/B.java"),
        ];
        let answers = resolver().compute_configuration(&items).unwrap();
        assert_eq!(answers.len(), 4);

        let global = answers[0].as_ref().unwrap();
        assert!(global.autocheck);
        assert_eq!(global.version, "8.0");

        let legacy = answers[1].as_ref().unwrap();
        assert_eq!(legacy.version, "9.3");
        assert!(legacy.autocheck, "folder inherits the global autocheck");

        assert_eq!(answers[2], None);
        assert_eq!(answers[3].as_ref().unwrap().version, "8.0");
    }

    #[test]
    fn any_named_section_is_null_even_with_scope() {
        let items = vec![
            ConfigurationItem {
                section: Some("checkstyle".to_string()),
                scope_uri: Some("file:///ws/legacy/A.java".to_string()),
            },
            ConfigurationItem {
                section: Some(String::new()),
                scope_uri: None,
            },
        ];
        let answers = resolver().compute_configuration(&items).unwrap();
        assert_eq!(answers[0], None);
        assert!(answers[1].is_some(), "an empty section is not a section");
    }

    #[test]
    fn non_file_scope_falls_back_to_global() {
        let answers = resolver()
            .compute_configuration(&[ConfigurationItem::scoped("untitled:Untitled-1")])
            .unwrap();
        assert_eq!(answers[0].as_ref().unwrap().version, "8.0");
    }
}
