use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::adapters::{AdapterSet, SharedAdapterSet};
use crate::atomic::{AtomicFileStore, SyncMode};
use crate::codec::{Codec, Format};
use crate::error::{StoreError, StoreResult};
use crate::record_store::RecordStore;

/// Configuration for one record store.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// directory = "data/profiles"
/// format = "json"
/// pretty = true
/// sync_mode = "every_write"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one file per record.
    pub directory: PathBuf,
    /// Record file format.
    pub format: Format,
    /// File extension override; the format's own extension when unset.
    pub extension: Option<String>,
    /// Pretty-print JSON records.
    pub pretty: bool,
    /// Flush strategy for record writes.
    pub sync_mode: SyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data"),
            format: Format::Json,
            extension: None,
            pretty: true,
            sync_mode: SyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Default configuration rooted at `directory`.
    pub fn at(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Read a TOML configuration file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    pub fn codec(&self) -> Arc<dyn Codec> {
        self.format.codec(self.pretty)
    }

    /// Extension records are written with.
    pub fn effective_extension(&self) -> String {
        match &self.extension {
            Some(ext) => ext.trim_start_matches('.').to_string(),
            None => self.format.to_string(),
        }
    }

    /// Build a record store from this configuration.
    pub fn open<T>(&self) -> RecordStore<T>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        RecordStore::new(&self.directory, self.codec())
            .with_extension(self.effective_extension())
            .with_file_store(AtomicFileStore::with_sync_mode(self.sync_mode))
    }

    /// Build a record store with local rules layered over a shared set.
    pub fn open_with<T>(&self, local: AdapterSet, global: SharedAdapterSet) -> RecordStore<T>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        self.open().with_adapters(local).with_global_adapters(global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn default_config() {
        let c = StoreConfig::default();
        assert_eq!(c.directory, PathBuf::from("data"));
        assert_eq!(c.format, Format::Json);
        assert!(c.pretty);
        assert_eq!(c.sync_mode, SyncMode::EveryWrite);
        assert_eq!(c.effective_extension(), "json");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = StoreConfig::from_toml_str("directory = \"profiles\"\nformat = \"toml\"\n").unwrap();
        assert_eq!(c.directory, PathBuf::from("profiles"));
        assert_eq!(c.format, Format::Toml);
        assert!(c.pretty);
        assert_eq!(c.effective_extension(), "toml");
    }

    #[test]
    fn extension_override() {
        let c = StoreConfig::from_toml_str("extension = \".dat\"\nsync_mode = \"os_default\"").unwrap();
        assert_eq!(c.effective_extension(), "dat");
        assert_eq!(c.sync_mode, SyncMode::OsDefault);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        let err = StoreConfig::from_toml_str("format = \"yaml\"").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn toml_text_round_trips() {
        let mut c = StoreConfig::at("x");
        c.extension = Some("rec".into());
        let text = c.to_toml_string().unwrap();
        assert_eq!(StoreConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn load_from_file_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let records = dir.path().join("records");
        let config_path = dir.path().join("store.toml");
        let text = format!("directory = {:?}\nformat = \"toml\"\n", records.display().to_string());
        fs::write(&config_path, text).unwrap();

        let config = StoreConfig::load(&config_path).unwrap();
        let store = config.open::<Value>();
        store.save_as("a", &json!({"n": 1})).unwrap();

        assert!(records.join("a.toml").is_file());
        assert_eq!(store.get("a"), Some(json!({"n": 1})));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoreConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
