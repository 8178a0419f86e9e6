//! Manager registration and startup.
//!
//! A [`Registry`] is built once at the composition root. Managers are
//! registered explicitly, and [`Registry::initialize`] loads all of them.
//! The registry also owns the process-wide [`SharedAdapterSet`] that stores
//! opened through it merge under their local rules.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crud_store::{AdapterSet, RecordStore, SharedAdapterSet, StoreConfig, StoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::report::{InitReport, LoadReport};

/// Anything with a load-from-disk lifecycle step.
pub trait Loadable: Send + Sync {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// (Re)load state from disk.
    fn load(&self) -> StoreResult<LoadReport>;
}

/// Tracks registered managers and drives their initial load.
#[derive(Default)]
pub struct Registry {
    managers: RwLock<Vec<Arc<dyn Loadable>>>,
    global_adapters: SharedAdapterSet,
    verbose: AtomicBool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable informational logging of registrations and load results.
    /// The manager count and any failure are logged regardless.
    pub fn set_verbose(&self, enabled: bool) {
        self.verbose.store(enabled, Ordering::Relaxed);
        if enabled {
            info!("registry verbose logging enabled");
        }
    }

    /// Register a manager. Registering the same manager again is a no-op.
    ///
    /// Returns `true` if the manager was newly added.
    pub fn register(&self, manager: Arc<dyn Loadable>) -> bool {
        let mut managers = self.managers.write().expect("lock poisoned");
        if managers.iter().any(|m| same_manager(m, &manager)) {
            debug!(manager = manager.name(), "manager already registered");
            return false;
        }
        self.log_verbose(&format!("registered manager: {}", manager.name()));
        managers.push(manager);
        true
    }

    pub fn is_registered(&self, manager: &Arc<dyn Loadable>) -> bool {
        self.managers
            .read()
            .expect("lock poisoned")
            .iter()
            .any(|m| same_manager(m, manager))
    }

    pub fn len(&self) -> usize {
        self.managers.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The process-wide adapter set. Rules must be added before
    /// [`initialize`](Self::initialize) to affect the initial load.
    pub fn global_adapters(&self) -> SharedAdapterSet {
        self.global_adapters.clone()
    }

    /// Open a record store from `config` whose local rules are layered over
    /// this registry's global adapters.
    pub fn open_store<T>(&self, config: &StoreConfig, local: AdapterSet) -> RecordStore<T>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        config.open_with(local, self.global_adapters())
    }

    /// Load every registered manager.
    ///
    /// A manager that fails to load is reported and does not stop the rest.
    /// Calling this again reloads everything from disk.
    pub fn initialize(&self) -> InitReport {
        // Load outside the registry lock so managers may register others.
        let managers: Vec<Arc<dyn Loadable>> =
            self.managers.read().expect("lock poisoned").clone();
        info!(count = managers.len(), "initializing registered managers");

        let mut report = InitReport::default();
        for manager in &managers {
            match manager.load() {
                Ok(loaded) => {
                    report.managers += 1;
                    report.loaded += loaded.loaded;
                    report.skipped += loaded.skipped;
                    self.log_verbose(&format!(
                        "loaded {}: {} records, {} skipped",
                        manager.name(),
                        loaded.loaded,
                        loaded.skipped
                    ));
                }
                Err(e) => {
                    error!(manager = manager.name(), error = %e, "manager failed to load");
                    report.failures.push((manager.name().to_string(), e.to_string()));
                }
            }
        }

        self.log_verbose("all managers initialized");
        report
    }

    fn log_verbose(&self, message: &str) {
        if self.verbose.load(Ordering::Relaxed) {
            info!("{message}");
        } else {
            debug!("{message}");
        }
    }
}

fn same_manager(a: &Arc<dyn Loadable>, b: &Arc<dyn Loadable>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::RecordCollectionManager;
    use crate::testing::{person, Person};
    use crud_store::{Adapter, StoreError};
    use serde_json::{json, Value};
    use std::fs;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        name: String,
        loads: AtomicUsize,
        fail: bool,
    }

    impl Counting {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self { name: name.into(), loads: AtomicUsize::new(0), fail })
        }
    }

    impl Loadable for Counting {
        fn name(&self) -> &str {
            &self.name
        }

        fn load(&self) -> StoreResult<LoadReport> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::Config("unavailable".into()));
            }
            Ok(LoadReport { loaded: 2, skipped: 1, swept: 0 })
        }
    }

    #[test]
    fn register_is_idempotent() {
        let registry = Registry::new();
        let a = Counting::new("a", false);

        assert!(registry.register(a.clone()));
        assert!(!registry.register(a.clone()));
        assert!(registry.register(Counting::new("a", false)));
        assert_eq!(registry.len(), 2);

        registry.initialize();
        assert_eq!(a.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn is_registered_uses_identity() {
        let registry = Registry::new();
        let a: Arc<dyn Loadable> = Counting::new("a", false);
        let twin: Arc<dyn Loadable> = Counting::new("a", false);
        registry.register(a.clone());

        assert!(registry.is_registered(&a));
        assert!(!registry.is_registered(&twin));
    }

    #[test]
    fn initialize_loads_everything_and_reports_failures() {
        let registry = Registry::new();
        registry.set_verbose(true);
        let good = Counting::new("good", false);
        let bad = Counting::new("bad", true);
        registry.register(good.clone());
        registry.register(bad.clone());

        let report = registry.initialize();
        assert_eq!(report.managers, 1);
        assert_eq!(report.loaded, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "bad");
        assert!(!report.is_clean());
        assert_eq!(bad.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn initialize_again_reloads() {
        let registry = Registry::new();
        let a = Counting::new("a", false);
        registry.register(a.clone());

        registry.initialize();
        registry.initialize();
        assert_eq!(a.loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_registry_initializes_cleanly() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert!(registry.initialize().is_clean());
    }

    fn age_as_text() -> Adapter {
        Adapter::new::<Person, _, _>(
            |p| Ok(json!({"id": p.id, "age": p.age.to_string()})),
            |v| {
                let id = v["id"].as_str().ok_or("missing id")?.to_string();
                let age = v["age"].as_str().ok_or("missing age")?.parse()?;
                Ok(Person { id, age })
            },
        )
    }

    #[test]
    fn global_adapters_reach_registered_managers() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        registry.global_adapters().add(age_as_text());

        let config = StoreConfig::at(dir.path().join("people"));
        let people = Arc::new(RecordCollectionManager::<Person>::new(
            registry.open_store(&config, AdapterSet::new()),
        ));
        registry.register(people.clone());

        fs::create_dir_all(dir.path().join("people")).unwrap();
        fs::write(
            dir.path().join("people").join("a.json"),
            br#"{"id": "a", "age": "41"}"#,
        )
        .unwrap();

        let report = registry.initialize();
        assert!(report.is_clean());
        assert_eq!(people.get_by_id("a").unwrap().age, 41);

        people.add(person("b", 7));
        let on_disk: Value =
            serde_json::from_slice(&fs::read(people.store().path_for("b")).unwrap()).unwrap();
        assert_eq!(on_disk["age"], json!("7"));
    }

    #[test]
    fn adapters_added_after_initialize_apply_to_later_saves() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        let config = StoreConfig::at(dir.path());
        let people = Arc::new(RecordCollectionManager::<Person>::new(
            registry.open_store(&config, AdapterSet::new()),
        ));
        registry.register(people.clone());
        registry.initialize();

        people.add(person("early", 1));
        registry.global_adapters().add(age_as_text());
        people.add(person("late", 2));

        let read = |id: &str| -> Value {
            serde_json::from_slice(&fs::read(people.store().path_for(id)).unwrap()).unwrap()
        };
        assert_eq!(read("early")["age"], json!(1));
        assert_eq!(read("late")["age"], json!("2"));
    }
}
