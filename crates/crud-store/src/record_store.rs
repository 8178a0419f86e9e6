use std::fmt;
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crud_types::{validate_record_id, Identifiable};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::adapted;
use crate::adapters::{AdapterSet, SharedAdapterSet};
use crate::atomic::{is_temp_file_name, AtomicFileStore};
use crate::codec::{Codec, JsonCodec};
use crate::error::{StoreError, StoreResult};

/// Typed get/save/delete over one directory for one record type.
///
/// Each record lives at `<directory>/<id>.<extension>`. Values are mapped to
/// a structured [`Value`] under the effective adapter set, then encoded by
/// the store's [`Codec`] and written through an [`AtomicFileStore`].
///
/// The effective adapter set is `local.merge(global)`, computed at call time:
/// local rules win, and rules added to the global set later apply to later
/// calls only.
pub struct RecordStore<T> {
    directory: PathBuf,
    extension: String,
    files: AtomicFileStore,
    codec: Arc<dyn Codec>,
    adapters: AdapterSet,
    global: Option<SharedAdapterSet>,
    _record: PhantomData<fn() -> T>,
}

impl<T> RecordStore<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    /// A store for `directory` using `codec` and its default extension.
    pub fn new(directory: impl Into<PathBuf>, codec: Arc<dyn Codec>) -> Self {
        Self {
            directory: directory.into(),
            extension: codec.extension().to_string(),
            files: AtomicFileStore::new(),
            codec,
            adapters: AdapterSet::new(),
            global: None,
            _record: PhantomData,
        }
    }

    /// A store of pretty-printed JSON records.
    pub fn json(directory: impl Into<PathBuf>) -> Self {
        Self::new(directory, Arc::new(JsonCodec::new()))
    }

    /// Override the file extension (given without the leading dot).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Set the store-local adapter rules.
    pub fn with_adapters(mut self, adapters: AdapterSet) -> Self {
        self.adapters = adapters;
        self
    }

    /// Merge a shared process-wide set under the local rules.
    pub fn with_global_adapters(mut self, global: SharedAdapterSet) -> Self {
        self.global = Some(global);
        self
    }

    pub fn with_file_store(mut self, files: AtomicFileStore) -> Self {
        self.files = files;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    /// Backing file for `id`. Does not validate the id.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.directory.join(format!("{id}.{}", self.extension))
    }

    /// Local rules merged over the current global rules.
    pub fn effective_adapters(&self) -> AdapterSet {
        match &self.global {
            Some(global) => self.adapters.merge(&global.snapshot()),
            None => self.adapters.clone(),
        }
    }

    /// Read and decode the record stored under `id`.
    ///
    /// Returns `None` when there is no such record. Unreadable or undecodable
    /// content is logged and also reported as `None`; use
    /// [`fetch`](Self::fetch) to tell the two apart.
    pub fn get(&self, id: &str) -> Option<T> {
        match self.fetch(id) {
            Ok(found) => found,
            Err(e) => {
                warn!(id, dir = %self.directory.display(), error = %e, "failed to load record");
                None
            }
        }
    }

    /// Read and decode the record stored under `id`, reporting failures.
    pub fn fetch(&self, id: &str) -> StoreResult<Option<T>> {
        validate_record_id(id)?;
        let path = self.path_for(id);
        let Some(bytes) = self.files.read(&path)? else {
            debug!(id, path = %path.display(), "no record file");
            return Ok(None);
        };

        let adapters = self.effective_adapters();
        self.decode(&bytes, &adapters)
            .map(Some)
            .map_err(|e| StoreError::Parse {
                path,
                reason: e.to_string(),
            })
    }

    /// Encode `value` and write it atomically under `id`.
    pub fn save_as(&self, id: &str, value: &T) -> StoreResult<()> {
        validate_record_id(id)?;
        let path = self.path_for(id);
        let adapters = self.effective_adapters();
        let result = self
            .encode(value, &adapters)
            .and_then(|bytes| self.files.write(&path, &bytes));
        if let Err(e) = &result {
            error!(id, path = %path.display(), error = %e, "failed to save record");
        }
        result
    }

    /// Save a record under its own id.
    pub fn save(&self, record: &T) -> StoreResult<()>
    where
        T: Identifiable,
    {
        self.save_as(record.id(), record)
    }

    /// Remove the backing file for `id`. Returns `Ok(false)` if there was none.
    pub fn delete(&self, id: &str) -> StoreResult<bool> {
        validate_record_id(id)?;
        let path = self.path_for(id);
        let existed = self.files.delete(&path)?;
        if !existed {
            debug!(id, path = %path.display(), "nothing to delete");
        }
        Ok(existed)
    }

    /// Create the store directory if it does not exist yet.
    pub fn ensure_directory(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.directory)?;
        Ok(())
    }

    /// Ids of every file in the directory carrying the store's extension,
    /// sorted. Temp files and stems that are not valid ids are left out. A
    /// missing directory has no ids.
    pub fn list_ids(&self) -> StoreResult<Vec<String>> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let suffix = format!(".{}", self.extension);
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!(name = ?name, "skipping non UTF-8 file name");
                continue;
            };
            if is_temp_file_name(name) {
                continue;
            }
            if let Some(id) = name.strip_suffix(&suffix) {
                if validate_record_id(id).is_ok() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Remove temp files left behind by interrupted writes.
    pub fn sweep_temp_files(&self) -> StoreResult<usize> {
        self.files.sweep_temp_files(&self.directory)
    }

    fn encode(&self, value: &T, adapters: &AdapterSet) -> StoreResult<Vec<u8>> {
        let structured = adapted::scoped(adapters, || match adapters.lookup::<T>() {
            Some(rule) => rule.encode_value(value),
            None => serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string())),
        })?;
        self.codec.to_bytes(&structured)
    }

    fn decode(&self, bytes: &[u8], adapters: &AdapterSet) -> StoreResult<T> {
        let structured: Value = self.codec.from_bytes(bytes)?;
        adapted::scoped(adapters, || match adapters.lookup::<T>() {
            Some(rule) => rule.decode_value(structured),
            None => serde_json::from_value(structured)
                .map_err(|e| StoreError::Serialization(e.to_string())),
        })
    }
}

impl<T> fmt::Debug for RecordStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("record", &std::any::type_name::<T>())
            .field("directory", &self.directory)
            .field("extension", &self.extension)
            .field("codec", &self.codec)
            .field("adapters", &self.adapters)
            .field("global", &self.global.is_some())
            .finish()
    }
}
