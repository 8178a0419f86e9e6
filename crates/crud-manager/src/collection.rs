//! The in-memory record collection manager.
//!
//! [`RecordCollectionManager`] is the authoritative in-memory view of every
//! record of one type under one [`RecordStore`]. It keeps an id index and an
//! ordered collection in a single `RwLock`, and serializes every mutation
//! behind a `Mutex` so that concurrent writers cannot lose updates.
//!
//! Records are held as `Arc<T>`: replacing a record is one pointer swap, so a
//! reader racing a mutation sees either the old or the new record, never a
//! mix of both.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crud_store::{RecordStore, StoreResult};
use crud_types::{validate_record_id, Identifiable, Record};
use tracing::{debug, error, info, warn};

use crate::registry::Loadable;
use crate::report::LoadReport;

/// Whether a mutation also touches the backing file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Durability {
    /// Write (or delete) the backing file after updating memory.
    #[default]
    Persist,
    /// Update memory only.
    InMemory,
}

/// Index and collection, always mutated together. `index` maps an id to
/// its position in `records`.
struct Collection<T> {
    index: HashMap<String, usize>,
    records: Vec<Arc<T>>,
}

impl<T: Identifiable> Collection<T> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            records: Vec::new(),
        }
    }

    fn get(&self, id: &str) -> Option<Arc<T>> {
        let pos = *self.index.get(id)?;
        self.records.get(pos).filter(|r| r.id() == id).cloned()
    }

    /// Insert or replace by id. Returns the replaced record.
    fn upsert(&mut self, record: Arc<T>) -> Option<Arc<T>> {
        match self.index.get(record.id()).copied() {
            Some(pos) => Some(std::mem::replace(&mut self.records[pos], record)),
            None => {
                self.index.insert(record.id().to_string(), self.records.len());
                self.records.push(record);
                None
            }
        }
    }

    /// Remove by id, keeping the order of the remaining records.
    fn remove(&mut self, id: &str) -> Option<Arc<T>> {
        let pos = self.index.remove(id)?;
        let removed = self.records.remove(pos);
        for p in self.index.values_mut() {
            if *p > pos {
                *p -= 1;
            }
        }
        Some(removed)
    }

    fn scan(&self, id: &str) -> Option<Arc<T>> {
        self.records.iter().find(|r| r.id() == id).cloned()
    }
}

/// In-memory indexed cache of all records of type `T` backed by a
/// [`RecordStore`].
///
/// Lifecycle: a manager starts Unloaded and becomes Loaded on the first
/// [`load`](Self::load), successful or not. Mutations (`load`, `load_by_id`,
/// `add`, `remove`, `update`) are mutually exclusive. Reads never wait on
/// disk I/O.
///
/// Persistence failures are logged and do not roll back the in-memory
/// change: the cache reflects the intended state even when the disk write
/// fails.
pub struct RecordCollectionManager<T: Record> {
    name: String,
    store: RecordStore<T>,
    state: RwLock<Collection<T>>,
    write_lock: Mutex<()>,
    loaded: AtomicBool,
}

impl<T: Record> RecordCollectionManager<T> {
    /// Create an unloaded manager over `store`.
    pub fn new(store: RecordStore<T>) -> Self {
        let name = short_type_name::<T>().to_string();
        Self {
            name,
            store,
            state: RwLock::new(Collection::new()),
            write_lock: Mutex::new(()),
            loaded: AtomicBool::new(false),
        }
    }

    /// Name used in logs and registry reports. Defaults to the record type.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &RecordStore<T> {
        &self.store
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.read_state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_state().records.is_empty()
    }

    /// Replace the in-memory collection with every decodable record on disk.
    ///
    /// Creates the store directory if needed; if that fails the collection
    /// is left empty and the error returned. Stale temp files are removed
    /// first. Files that fail to decode are logged and skipped.
    pub fn load(&self) -> StoreResult<LoadReport> {
        let _guard = self.lock_writes();
        self.loaded.store(true, Ordering::Release);

        if let Err(e) = self.store.ensure_directory() {
            *self.write_state() = Collection::new();
            error!(manager = %self.name, dir = %self.store.directory().display(), error = %e,
                "cannot create store directory");
            return Err(e);
        }

        let mut report = LoadReport::default();
        match self.store.sweep_temp_files() {
            Ok(swept) => report.swept = swept,
            Err(e) => warn!(manager = %self.name, error = %e, "temp file sweep failed"),
        }

        let ids = match self.store.list_ids() {
            Ok(ids) => ids,
            Err(e) => {
                *self.write_state() = Collection::new();
                error!(manager = %self.name, error = %e, "cannot list store directory");
                return Err(e);
            }
        };

        let mut collection = Collection::new();
        for id in ids {
            match self.store.fetch(&id) {
                Ok(Some(record)) if record.id() == id => {
                    collection.upsert(Arc::new(record));
                    report.loaded += 1;
                }
                Ok(Some(record)) => {
                    warn!(manager = %self.name, file_id = %id, record_id = record.id(),
                        "record id does not match its file name; skipping");
                    report.skipped += 1;
                }
                // Removed between listing and reading.
                Ok(None) => {}
                Err(e) => {
                    warn!(manager = %self.name, id = %id, error = %e, "failed to load record");
                    report.skipped += 1;
                }
            }
        }

        *self.write_state() = collection;
        debug!(manager = %self.name, loaded = report.loaded, skipped = report.skipped,
            swept = report.swept, "load complete");
        Ok(report)
    }

    /// Reload a single record from disk, replacing any cached entry.
    ///
    /// Returns `false`, leaving the cache as it was, if the id is invalid or
    /// the file is absent or undecodable.
    pub fn load_by_id(&self, id: &str) -> bool {
        if let Err(e) = validate_record_id(id) {
            warn!(manager = %self.name, error = %e, "rejected load_by_id");
            return false;
        }
        let _guard = self.lock_writes();

        let record = match self.store.fetch(id) {
            Ok(Some(record)) => record,
            Ok(None) => return false,
            Err(e) => {
                warn!(manager = %self.name, id, error = %e, "failed to reload record");
                return false;
            }
        };
        if record.id() != id {
            warn!(manager = %self.name, file_id = id, record_id = record.id(),
                "record id does not match its file name; not reloaded");
            return false;
        }

        self.write_state().upsert(Arc::new(record));
        debug!(manager = %self.name, id, "reloaded record");
        true
    }

    /// Look up a record by id.
    ///
    /// An index miss falls back to a scan of the collection before giving up.
    pub fn get_by_id(&self, id: &str) -> Option<Arc<T>> {
        let state = self.read_state();
        if let Some(record) = state.get(id) {
            return Some(record);
        }
        let found = state.scan(id);
        if found.is_some() {
            warn!(manager = %self.name, id, "record found by scan but missing from index");
        }
        found
    }

    /// Look up the cached record sharing `record`'s id.
    pub fn get_by_record(&self, record: &T) -> Option<Arc<T>> {
        self.get_by_id(record.id())
    }

    /// The cached record, or a fresh default instance for `id`.
    ///
    /// The default is neither cached nor persisted. Returns `None` only when
    /// `id` cannot name a record.
    pub fn get_or_default(&self, id: &str) -> Option<Arc<T>> {
        if let Some(found) = self.get_by_id(id) {
            return Some(found);
        }
        match validate_record_id(id) {
            Ok(()) => Some(Arc::new(T::construct(id))),
            Err(e) => {
                warn!(manager = %self.name, error = %e, "rejected get_or_default");
                None
            }
        }
    }

    /// The cached record, or a default instance for `id` that is added to
    /// the collection and persisted immediately.
    pub fn get_or_create(&self, id: &str) -> Option<Arc<T>> {
        if let Some(found) = self.get_by_id(id) {
            return Some(found);
        }
        if let Err(e) = validate_record_id(id) {
            warn!(manager = %self.name, error = %e, "rejected get_or_create");
            return None;
        }

        let _guard = self.lock_writes();
        // Another writer may have created it while we waited.
        if let Some(found) = self.get_by_id(id) {
            return Some(found);
        }
        let record = Arc::new(T::construct(id));
        self.insert_locked(Arc::clone(&record), Durability::Persist);
        Some(record)
    }

    /// Add a new record and persist it.
    ///
    /// Rejected (returning `false`) if the id is invalid or already present.
    pub fn add(&self, record: impl Into<Arc<T>>) -> bool {
        self.add_with(record, Durability::Persist)
    }

    /// Add a new record, writing it to disk only under [`Durability::Persist`].
    ///
    /// Rejected like [`add`](Self::add).
    pub fn add_with(&self, record: impl Into<Arc<T>>, durability: Durability) -> bool {
        let record = record.into();
        if let Err(e) = validate_record_id(record.id()) {
            warn!(manager = %self.name, error = %e, "rejected add");
            return false;
        }

        let _guard = self.lock_writes();
        if self.contains_id(record.id()) {
            warn!(manager = %self.name, id = record.id(), "rejected add: id already present");
            return false;
        }
        self.insert_locked(record, durability);
        true
    }

    /// Remove a record and delete its backing file.
    ///
    /// Rejected (returning `false`) if no record with that id is present.
    pub fn remove(&self, record: &T) -> bool {
        self.remove_by_id_with(record.id(), Durability::Persist)
    }

    /// Remove a record, deleting its file only under [`Durability::Persist`].
    pub fn remove_with(&self, record: &T, durability: Durability) -> bool {
        self.remove_by_id_with(record.id(), durability)
    }

    /// Remove the record with `id` and delete its backing file.
    ///
    /// Rejected (returning `false`) if no record with that id is present.
    pub fn remove_by_id(&self, id: &str) -> bool {
        self.remove_by_id_with(id, Durability::Persist)
    }

    /// Remove the record with `id`, deleting its file only under
    /// [`Durability::Persist`]. A failed delete is logged; the record stays
    /// evicted from memory.
    pub fn remove_by_id_with(&self, id: &str, durability: Durability) -> bool {
        let _guard = self.lock_writes();
        if self.write_state().remove(id).is_none() {
            warn!(manager = %self.name, id, "rejected remove: unknown id");
            return false;
        }
        debug!(manager = %self.name, id, "removed record");

        if durability == Durability::Persist {
            match self.store.delete(id) {
                Ok(true) => {}
                Ok(false) => warn!(manager = %self.name, id, "removed record had no backing file"),
                Err(e) => error!(manager = %self.name, id, error = %e, "failed to delete record file"),
            }
        }
        true
    }

    /// Replace a record and persist it. An unknown id is added instead.
    pub fn update(&self, record: impl Into<Arc<T>>) -> bool {
        self.update_with(record, Durability::Persist)
    }

    /// Replace or add a record, writing it to disk only under
    /// [`Durability::Persist`]. Rejected (returning `false`) on an invalid id.
    pub fn update_with(&self, record: impl Into<Arc<T>>, durability: Durability) -> bool {
        let record = record.into();
        if let Err(e) = validate_record_id(record.id()) {
            warn!(manager = %self.name, error = %e, "rejected update");
            return false;
        }

        let _guard = self.lock_writes();
        self.insert_locked(record, durability);
        true
    }

    /// Snapshot of every cached record, in insertion order.
    pub fn get_all(&self) -> Vec<Arc<T>> {
        self.read_state().records.clone()
    }

    /// Like [`get_all`](Self::get_all), but loads from disk first when the
    /// collection is empty.
    pub fn get_all_or_load(&self) -> Vec<Arc<T>> {
        if self.is_empty() {
            if let Err(e) = self.load() {
                warn!(manager = %self.name, error = %e, "lazy load failed");
            }
        }
        self.get_all()
    }

    /// Whether a record with `record`'s id is cached.
    pub fn contains(&self, record: &T) -> bool {
        self.contains_id(record.id())
    }

    /// Whether a record with `id` is cached.
    pub fn contains_id(&self, id: &str) -> bool {
        self.get_by_id(id).is_some()
    }

    /// Insert or replace in memory, then persist. Caller holds `write_lock`.
    fn insert_locked(&self, record: Arc<T>, durability: Durability) {
        let replaced = self.write_state().upsert(Arc::clone(&record));
        debug!(manager = %self.name, id = record.id(), replaced = replaced.is_some(), "cached record");

        if durability == Durability::Persist {
            // A failed save is logged by the store; memory keeps the new value.
            if self.store.save(&record).is_err() {
                warn!(manager = %self.name, id = record.id(), "record cached but not persisted");
            }
        }
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().expect("lock poisoned")
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, Collection<T>> {
        self.state.read().expect("lock poisoned")
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, Collection<T>> {
        self.state.write().expect("lock poisoned")
    }
}

impl<T: Record> Loadable for RecordCollectionManager<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> StoreResult<LoadReport> {
        let report = RecordCollectionManager::load(self)?;
        info!(manager = %self.name, loaded = report.loaded, "manager loaded");
        Ok(report)
    }
}

/// Last path segment of `T`'s type name, without generic arguments.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
