//! Foundation types for crudstore.
//!
//! Every other crudstore crate depends on `crud-types`. It defines what a
//! persistable record is and which identifiers are acceptable as file names.
//!
//! # Key Types
//!
//! - [`Identifiable`] -- anything exposing a stable, non-empty string id
//! - [`Record`] -- an identifiable, serde-encodable value that can also be
//!   constructed as a default instance for a given id
//! - [`validate_record_id`] -- the rules an id must satisfy to name a file

pub mod error;
pub mod id;
pub mod record;

pub use error::TypeError;
pub use id::{validate_record_id, RECORD_ID_MAX_LEN};
pub use record::{Identifiable, Record};
