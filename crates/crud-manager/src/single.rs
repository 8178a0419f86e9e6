use std::sync::{Arc, Mutex, RwLock};

use crud_store::{RecordStore, StoreError, StoreResult};
use crud_types::validate_record_id;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::collection::short_type_name;
use crate::registry::Loadable;
use crate::report::LoadReport;

type Construct<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Manages exactly one record, stored under a fixed id.
///
/// Suited to settings-like values: the value need not carry its own id, and
/// when nothing is stored yet a default built by the injected factory stands
/// in for it. That default stays in memory until explicitly saved.
pub struct SingleRecordManager<T> {
    id: String,
    name: String,
    store: RecordStore<T>,
    construct: Construct<T>,
    cached: RwLock<Option<Arc<T>>>,
    write_lock: Mutex<()>,
}

impl<T> SingleRecordManager<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a manager for the record stored under `id`.
    pub fn new(
        id: impl Into<String>,
        store: RecordStore<T>,
        construct: impl Fn() -> T + Send + Sync + 'static,
    ) -> StoreResult<Self> {
        let id = id.into();
        validate_record_id(&id)?;
        Ok(Self {
            name: format!("{}:{id}", short_type_name::<T>()),
            id,
            store,
            construct: Box::new(construct),
            cached: RwLock::new(None),
            write_lock: Mutex::new(()),
        })
    }

    /// Create a manager whose fallback value is `T::default()`.
    pub fn with_default(id: impl Into<String>, store: RecordStore<T>) -> StoreResult<Self>
    where
        T: Default,
    {
        Self::new(id, store, T::default)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &RecordStore<T> {
        &self.store
    }

    /// The cached value, loading it first if nothing is cached.
    pub fn get(&self) -> Arc<T> {
        self.cached().unwrap_or_else(|| self.load())
    }

    /// Read the stored value into the cache.
    ///
    /// A missing or undecodable record is replaced by a constructed default.
    /// If the record cannot be read at all, the cached value is kept; with
    /// nothing cached a default is returned but not cached, so it can never
    /// be saved over the unreadable record by [`save_current`](Self::save_current).
    pub fn load(&self) -> Arc<T> {
        match self.reload() {
            Ok((value, _)) => value,
            Err(_) => self
                .cached()
                .unwrap_or_else(|| Arc::new((self.construct)())),
        }
    }

    /// Replace the cached value and persist it.
    ///
    /// Returns `false` if the write failed; the cache keeps the new value.
    pub fn save(&self, value: T) -> bool {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let value = Arc::new(value);
        *self.cached.write().expect("lock poisoned") = Some(Arc::clone(&value));
        self.persist(&value)
    }

    /// Persist the currently cached value, loading it first if needed.
    ///
    /// Returns `false` without writing when nothing could be cached because
    /// the stored record is unreadable.
    pub fn save_current(&self) -> bool {
        if self.cached().is_none() {
            self.load();
        }
        let _guard = self.write_lock.lock().expect("lock poisoned");
        match self.cached() {
            Some(value) => self.persist(&value),
            None => {
                warn!(manager = %self.name, "nothing cached; not overwriting unreadable record");
                false
            }
        }
    }

    /// Delete the backing file. The cached value is left as it is.
    ///
    /// Returns `true` only if a file was removed.
    pub fn delete(&self) -> bool {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        match self.store.delete(&self.id) {
            Ok(existed) => existed,
            Err(e) => {
                error!(manager = %self.name, error = %e, "failed to delete record file");
                false
            }
        }
    }

    fn persist(&self, value: &T) -> bool {
        match self.store.save_as(&self.id, value) {
            Ok(()) => true,
            Err(e) => {
                error!(manager = %self.name, error = %e, "failed to persist record");
                false
            }
        }
    }

    fn cached(&self) -> Option<Arc<T>> {
        self.cached.read().expect("lock poisoned").clone()
    }

    fn reload(&self) -> StoreResult<(Arc<T>, LoadReport)> {
        let _guard = self.write_lock.lock().expect("lock poisoned");
        let mut report = LoadReport::default();

        let value = match self.store.fetch(&self.id) {
            Ok(Some(value)) => {
                report.loaded = 1;
                value
            }
            Ok(None) => {
                debug!(manager = %self.name, "no stored record; using default");
                (self.construct)()
            }
            Err(e @ StoreError::Parse { .. }) => {
                report.skipped = 1;
                warn!(manager = %self.name, error = %e, "undecodable record; using default");
                (self.construct)()
            }
            Err(e) => {
                error!(manager = %self.name, error = %e, "cannot read record; cache unchanged");
                return Err(e);
            }
        };

        let value = Arc::new(value);
        *self.cached.write().expect("lock poisoned") = Some(Arc::clone(&value));
        Ok((value, report))
    }
}

impl<T> Loadable for SingleRecordManager<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> StoreResult<LoadReport> {
        self.reload().map(|(_, report)| report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Settings {
        motd: String,
        max_players: u32,
    }

    fn settings(motd: &str, max_players: u32) -> Settings {
        Settings { motd: motd.into(), max_players }
    }

    fn manager(dir: &std::path::Path) -> SingleRecordManager<Settings> {
        SingleRecordManager::new("settings", RecordStore::json(dir), || settings("welcome", 20))
            .unwrap()
    }

    #[test]
    fn missing_record_uses_default_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());

        assert_eq!(*m.get(), settings("welcome", 20));
        assert!(!m.store().path_for("settings").exists());
    }

    #[test]
    fn save_persists_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());

        assert!(m.save(settings("hello", 50)));
        assert_eq!(*m.get(), settings("hello", 50));

        let fresh = manager(dir.path());
        assert_eq!(*fresh.get(), settings("hello", 50));
    }

    #[test]
    fn save_current_writes_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());

        assert!(m.save_current());
        assert!(m.store().path_for("settings").exists());
    }

    #[test]
    fn delete_keeps_cached_value() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        m.save(settings("hello", 50));

        assert!(m.delete());
        assert!(!m.store().path_for("settings").exists());
        assert_eq!(*m.get(), settings("hello", 50));
        assert!(!m.delete());

        // An explicit reload falls back to the default.
        assert_eq!(*m.load(), settings("welcome", 20));
    }

    #[test]
    fn corrupt_record_falls_back_and_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        fs::write(m.store().path_for("settings"), b"{ broken").unwrap();

        let report = Loadable::load(&m).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.loaded, 0);
        assert_eq!(*m.get(), settings("welcome", 20));
    }

    /// Makes the record path a symlink to itself, so reading it fails with
    /// an I/O error while a rename over it would still succeed.
    #[cfg(unix)]
    fn make_unreadable(m: &SingleRecordManager<Settings>) -> std::path::PathBuf {
        let path = m.store().path_for("settings");
        let _ = fs::remove_file(&path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(&path, &path).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_record_keeps_cached_value() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        m.save(settings("hello", 50));
        make_unreadable(&m);

        assert!(Loadable::load(&m).is_err());
        assert_eq!(*m.load(), settings("hello", 50));
        assert_eq!(*m.get(), settings("hello", 50));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_record_is_never_overwritten_with_default() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path());
        let path = make_unreadable(&m);

        assert_eq!(*m.get(), settings("welcome", 20));
        assert!(!m.save_current());
        assert!(fs::symlink_metadata(&path).unwrap().file_type().is_symlink());
    }

    #[test]
    fn loadable_reports_found_record() {
        let dir = tempfile::tempdir().unwrap();
        manager(dir.path()).save(settings("x", 1));

        let m = manager(dir.path());
        assert_eq!(Loadable::load(&m).unwrap().loaded, 1);
        assert_eq!(Loadable::name(&m), "Settings:settings");
    }

    #[test]
    fn default_factory_from_trait() {
        let dir = tempfile::tempdir().unwrap();
        let m = SingleRecordManager::<Settings>::with_default("s", RecordStore::json(dir.path()))
            .unwrap();
        assert_eq!(*m.get(), Settings::default());
    }

    #[test]
    fn invalid_id_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let result = SingleRecordManager::<Settings>::with_default("../x", RecordStore::json(dir.path()));
        assert!(matches!(result, Err(StoreError::InvalidId(_))));
    }
}
