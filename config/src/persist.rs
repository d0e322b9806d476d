//! Comment-preserving writes to the settings file.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use toml_edit::{ArrayOfTables, DocumentMut, Item, Table, value};

use crate::{ConfigError, SettingsPatch, SettingsTarget};

const GLOBAL_TABLE: &str = "checkstyle";
const FOLDERS: &str = "folders";

/// Apply `patch` to the file at `path` in place, keeping unrelated content.
pub(crate) fn write_patch(
    path: &Path,
    target: &SettingsTarget,
    patch: &SettingsPatch,
) -> Result<(), ConfigError> {
    let content = if path.exists() {
        fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        String::new()
    };
    let mut doc = content
        .parse::<DocumentMut>()
        .map_err(|source| ConfigError::Edit {
            path: path.to_path_buf(),
            source,
        })?;

    let table = match target {
        SettingsTarget::Global => {
            let item = doc
                .entry(GLOBAL_TABLE)
                .or_insert(Item::Table(Table::new()));
            item.as_table_mut().ok_or_else(|| shape(path, "[checkstyle] is not a table"))?
        }
        SettingsTarget::Folder(dir) => folder_table(&mut doc, path, dir)?,
    };
    apply(table, patch);

    write_atomically(path, doc.to_string().as_bytes()).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// The `checkstyle` sub-table of the `[[folders]]` entry for `dir`.
fn folder_table<'a>(
    doc: &'a mut DocumentMut,
    path: &Path,
    dir: &Path,
) -> Result<&'a mut Table, ConfigError> {
    let dir_str = dir.to_string_lossy().into_owned();
    let folders = doc
        .entry(FOLDERS)
        .or_insert(Item::ArrayOfTables(ArrayOfTables::new()))
        .as_array_of_tables_mut()
        .ok_or_else(|| shape(path, "`folders` is not an array of tables"))?;

    let index = folders
        .iter()
        .position(|t| t.get("path").and_then(Item::as_str) == Some(dir_str.as_str()));
    let index = match index {
        Some(i) => i,
        None => {
            let mut entry = Table::new();
            entry.insert("path", value(dir_str.as_str()));
            folders.push(entry);
            folders.len() - 1
        }
    };

    let entry = folders
        .get_mut(index)
        .ok_or_else(|| shape(path, "folder entry vanished during edit"))?;
    entry
        .entry(GLOBAL_TABLE)
        .or_insert(Item::Table(Table::new()))
        .as_table_mut()
        .ok_or_else(|| shape(path, "folder `checkstyle` is not a table"))
}

fn apply(table: &mut Table, patch: &SettingsPatch) {
    let key = patch.key();
    match patch {
        SettingsPatch::Autocheck(on) => {
            table.insert(key, value(*on));
        }
        SettingsPatch::Version(v) | SettingsPatch::ConfigurationFile(v) => {
            table.insert(key, value(v.as_str()));
        }
        SettingsPatch::PropertiesPath(Some(p)) => {
            table.insert(key, value(p.as_str()));
        }
        SettingsPatch::PropertiesPath(None) => {
            table.remove(key);
        }
    }
}

fn shape(path: &Path, reason: &str) -> ConfigError {
    ConfigError::Shape {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Temp file in the same directory, then rename over the target.
fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn comments_and_unrelated_tables_survive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(
            &path,
            "# my settings\n[editor]\ntheme = \"dark\"\n\n[checkstyle]\n# pinned\nversion = \"9.0\"\n",
        )
        .unwrap();

        write_patch(
            &path,
            &SettingsTarget::Global,
            &SettingsPatch::Version("10.0".to_string()),
        )
        .unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("# my settings"));
        assert!(written.contains("theme = \"dark\""));
        assert!(written.contains("version = \"10.0\""));
        assert!(!written.contains("9.0"));
    }

    #[test]
    fn folder_entry_is_created_once_and_reused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        let target = SettingsTarget::Folder(PathBuf::from("/ws"));

        write_patch(&path, &target, &SettingsPatch::Autocheck(true)).unwrap();
        write_patch(
            &path,
            &target,
            &SettingsPatch::ConfigurationFile("sun_checks".to_string()),
        )
        .unwrap();

        let doc = fs::read_to_string(&path).unwrap().parse::<DocumentMut>().unwrap();
        let folders = doc["folders"].as_array_of_tables().unwrap();
        assert_eq!(folders.len(), 1);
        let entry = folders.get(0).unwrap();
        assert_eq!(entry["path"].as_str(), Some("/ws"));
        assert_eq!(entry["checkstyle"]["autocheck"].as_bool(), Some(true));
        assert_eq!(
            entry["checkstyle"]["configurationFile"].as_str(),
            Some("sun_checks")
        );
    }

    #[test]
    fn clearing_properties_removes_the_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[checkstyle]\npropertiesPath = \"/p\"\n").unwrap();

        write_patch(
            &path,
            &SettingsTarget::Global,
            &SettingsPatch::PropertiesPath(None),
        )
        .unwrap();

        assert!(!fs::read_to_string(&path).unwrap().contains("propertiesPath"));
    }

    #[test]
    fn non_table_checkstyle_is_a_shape_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "checkstyle = 3\n").unwrap();

        let err = write_patch(
            &path,
            &SettingsTarget::Global,
            &SettingsPatch::Autocheck(true),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Shape { .. }));
    }
}
