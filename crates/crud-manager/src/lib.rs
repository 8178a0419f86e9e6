//! In-memory record managers for crudstore.
//!
//! A manager is the authoritative in-memory view of records persisted by a
//! [`RecordStore`](crud_store::RecordStore). Reads are served from memory;
//! mutations update memory first and then write through to disk.
//!
//! # Modules
//!
//! - [`collection`] -- [`RecordCollectionManager`], many records keyed by id
//! - [`single`] -- [`SingleRecordManager`], one record under a fixed id
//! - [`registry`] -- [`Registry`] and the [`Loadable`] lifecycle trait
//! - [`report`] -- load outcomes
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use crud_manager::{RecordCollectionManager, Registry};
//! use crud_store::{AdapterSet, StoreConfig};
//! # use crud_types::{Identifiable, Record};
//! # #[derive(serde::Serialize, serde::Deserialize)]
//! # struct Profile { id: String }
//! # impl Identifiable for Profile { fn id(&self) -> &str { &self.id } }
//! # impl Record for Profile { fn construct(id: &str) -> Self { Self { id: id.into() } } }
//!
//! let registry = Registry::new();
//! let profiles = Arc::new(RecordCollectionManager::<Profile>::new(
//!     registry.open_store(&StoreConfig::at("data/profiles"), AdapterSet::new()),
//! ));
//! registry.register(profiles.clone());
//! registry.initialize();
//!
//! let alice = profiles.get_or_create("alice");
//! ```

pub mod collection;
pub mod registry;
pub mod report;
pub mod single;

#[cfg(test)]
mod testing;

pub use collection::{Durability, RecordCollectionManager};
pub use registry::{Loadable, Registry};
pub use report::{InitReport, LoadReport};
pub use single::SingleRecordManager;
