//! Crash-safe file storage for crudstore.
//!
//! This crate turns a directory into a typed record store: one file per
//! record, named `<id>.<ext>`, written with the write-temp-then-rename
//! protocol so a crash never leaves a half-written record behind.
//!
//! # Layers
//!
//! - [`AtomicFileStore`] -- durable put/get/delete of byte blobs by path
//! - [`Codec`] -- record file format ([`JsonCodec`], [`TomlCodec`])
//! - [`AdapterSet`] -- mergeable per-type encode/decode rules
//! - [`RecordStore`] -- typed get/save/delete for one record type and directory
//! - [`StoreConfig`] -- serde/TOML configuration that builds a `RecordStore`
//!
//! # Design Rules
//!
//! 1. A missing record is `None`, never an error.
//! 2. A failed write leaves the previous file content untouched.
//! 3. Adapter sets are merged at call time; local rules beat global ones.
//! 4. Nothing here locks. Serializing writers is the caller's job.

pub mod adapted;
pub mod adapters;
pub mod atomic;
pub mod codec;
pub mod config;
pub mod error;
pub mod record_store;

// Re-export primary types at crate root for ergonomic imports.
pub use adapters::{Adapter, AdapterError, AdapterModule, AdapterSet, SharedAdapterSet};
pub use atomic::{is_temp_file_name, AtomicFileStore, SyncMode, TEMP_PREFIX, TEMP_SUFFIX};
pub use codec::{Codec, Format, JsonCodec, TomlCodec};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use record_store::RecordStore;
