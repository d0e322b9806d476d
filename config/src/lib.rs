//! Scoped Checkstyle settings.
//!
//! Settings live in a TOML file with a global `[checkstyle]` table and
//! optional `[[folders]]` entries that override it for everything under a
//! directory:
//!
//! ```toml
//! [checkstyle]
//! autocheck = true
//! version = "10.12.0"
//!
//! [[folders]]
//! path = "/home/me/legacy"
//! [folders.checkstyle]
//! version = "8.45"
//! configurationFile = "sun_checks"
//! ```
//!
//! [`SettingsStore`] answers resolution queries, applies [`SettingsPatch`]es,
//! and bumps a revision counter observers can watch for changes.

mod persist;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use checkstyle_types::ResolvedSettings;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read settings at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to parse settings at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to edit settings at {}: {source}", path.display())]
    Edit {
        path: PathBuf,
        source: toml_edit::TomlError,
    },
    #[error("settings at {} have an unexpected shape: {reason}", path.display())]
    Shape { path: PathBuf, reason: String },
    #[error("failed to write settings at {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: io::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. }
            | Self::Parse { path, .. }
            | Self::Edit { path, .. }
            | Self::Shape { path, .. }
            | Self::Write { path, .. } => path,
        }
    }
}

/// One layer of optional settings; unset keys fall through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsLayer {
    pub autocheck: Option<bool>,
    pub version: Option<String>,
    pub configuration_file: Option<String>,
    pub properties_path: Option<String>,
}

impl SettingsLayer {
    fn apply(&mut self, patch: &SettingsPatch) {
        match patch {
            SettingsPatch::Autocheck(on) => self.autocheck = Some(*on),
            SettingsPatch::Version(v) => self.version = Some(v.clone()),
            SettingsPatch::ConfigurationFile(f) => self.configuration_file = Some(f.clone()),
            SettingsPatch::PropertiesPath(p) => self.properties_path = p.clone(),
        }
    }

    /// Fill unset keys from `lower`.
    fn over(&self, lower: &SettingsLayer) -> SettingsLayer {
        SettingsLayer {
            autocheck: self.autocheck.or(lower.autocheck),
            version: self.version.clone().or_else(|| lower.version.clone()),
            configuration_file: self
                .configuration_file
                .clone()
                .or_else(|| lower.configuration_file.clone()),
            properties_path: self
                .properties_path
                .clone()
                .or_else(|| lower.properties_path.clone()),
        }
    }

    fn resolve(self) -> ResolvedSettings {
        let defaults = ResolvedSettings::default();
        ResolvedSettings {
            autocheck: self.autocheck.unwrap_or(defaults.autocheck),
            version: self.version.unwrap_or(defaults.version),
            configuration_file: self
                .configuration_file
                .unwrap_or(defaults.configuration_file),
            properties_path: self.properties_path.or(defaults.properties_path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FolderSettings {
    path: PathBuf,
    #[serde(default)]
    checkstyle: SettingsLayer,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    checkstyle: SettingsLayer,
    #[serde(default)]
    folders: Vec<FolderSettings>,
}

impl SettingsFile {
    /// Deepest folder entry containing `path`.
    fn folder_index(&self, path: &Path) -> Option<usize> {
        self.folders
            .iter()
            .enumerate()
            .filter(|(_, f)| path.starts_with(&f.path))
            .max_by_key(|(_, f)| f.path.components().count())
            .map(|(i, _)| i)
    }
}

/// A single settings change written by a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsPatch {
    Autocheck(bool),
    Version(String),
    ConfigurationFile(String),
    /// `None` clears the properties file.
    PropertiesPath(Option<String>),
}

impl SettingsPatch {
    pub(crate) fn key(&self) -> &'static str {
        match self {
            Self::Autocheck(_) => "autocheck",
            Self::Version(_) => "version",
            Self::ConfigurationFile(_) => "configurationFile",
            Self::PropertiesPath(_) => "propertiesPath",
        }
    }
}

/// Where a patch is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsTarget {
    /// The global `[checkstyle]` table.
    Global,
    /// The `[[folders]]` entry for exactly this directory, created if absent.
    Folder(PathBuf),
}

/// Owner of the settings file and its change notifications.
pub struct SettingsStore {
    path: Option<PathBuf>,
    file: RwLock<SettingsFile>,
    revision: watch::Sender<u64>,
}

impl SettingsStore {
    /// Store with no backing file; patches only live in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_file(None, SettingsFile::default())
    }

    /// Load the store from `path`. A missing file is an empty store that is
    /// created on first write.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let file = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| {
                tracing::warn!(path = %path.display(), "failed to read settings: {source}");
                ConfigError::Read {
                    path: path.clone(),
                    source,
                }
            })?;
            toml::from_str(&content).map_err(|source| {
                tracing::warn!(path = %path.display(), "failed to parse settings: {source}");
                ConfigError::Parse {
                    path: path.clone(),
                    source,
                }
            })?
        } else {
            SettingsFile::default()
        };
        Ok(Self::from_file(Some(path), file))
    }

    /// Load from `~/.checkstyle/settings.toml`, or an in-memory store when no
    /// home directory is known.
    pub fn load_default() -> Result<Self, ConfigError> {
        match default_settings_path() {
            Some(path) => Self::load(path),
            None => Ok(Self::in_memory()),
        }
    }

    fn from_file(path: Option<PathBuf>, file: SettingsFile) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            path,
            file: RwLock::new(file),
            revision,
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Workspace-global settings.
    #[must_use]
    pub fn resolve_global(&self) -> ResolvedSettings {
        let file = self.file.read().unwrap_or_else(PoisonError::into_inner);
        file.checkstyle.clone().resolve()
    }

    /// Settings for a resource: the deepest folder entry containing it
    /// overrides the global table.
    #[must_use]
    pub fn resolve_for(&self, resource: &Path) -> ResolvedSettings {
        let file = self.file.read().unwrap_or_else(PoisonError::into_inner);
        match file.folder_index(resource) {
            Some(i) => file.folders[i].checkstyle.over(&file.checkstyle).resolve(),
            None => file.checkstyle.clone().resolve(),
        }
    }

    /// Target a write for `resource` should land in: its deepest configured
    /// folder, else the global table.
    #[must_use]
    pub fn target_for(&self, resource: Option<&Path>) -> SettingsTarget {
        let file = self.file.read().unwrap_or_else(PoisonError::into_inner);
        resource
            .and_then(|r| file.folder_index(r))
            .map_or(SettingsTarget::Global, |i| {
                SettingsTarget::Folder(file.folders[i].path.clone())
            })
    }

    /// Apply `patch`, persist it, and notify subscribers.
    pub fn update(&self, target: &SettingsTarget, patch: SettingsPatch) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            persist::write_patch(path, target, &patch)?;
        }

        {
            let mut file = self.file.write().unwrap_or_else(PoisonError::into_inner);
            match target {
                SettingsTarget::Global => file.checkstyle.apply(&patch),
                SettingsTarget::Folder(dir) => {
                    match file.folders.iter_mut().find(|f| &f.path == dir) {
                        Some(folder) => folder.checkstyle.apply(&patch),
                        None => {
                            let mut checkstyle = SettingsLayer::default();
                            checkstyle.apply(&patch);
                            file.folders.push(FolderSettings {
                                path: dir.clone(),
                                checkstyle,
                            });
                        }
                    }
                }
            }
        }

        tracing::debug!(?target, key = patch.key(), "settings updated");
        self.revision.send_modify(|rev| *rev += 1);
        Ok(())
    }

    /// Receiver that observes a new revision after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

#[must_use]
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".checkstyle").join("settings.toml"))
}
