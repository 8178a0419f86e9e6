//! Record id validation.
//!
//! A record id becomes a file name (`<id>.<ext>`), so besides being non-empty
//! it must not be able to escape the store directory or produce a name the
//! filesystem rejects.
//!
//! Valid record ids:
//! - Must be non-empty and at most [`RECORD_ID_MAX_LEN`] bytes
//! - Must not contain path separators (`/`, `\`) or control characters
//! - Must not start with `.`

use crate::error::TypeError;

/// Upper bound on id length, leaving room for the extension and the `.tmp`
/// suffix inside a 255-byte file name.
pub const RECORD_ID_MAX_LEN: usize = 200;

/// Characters that are forbidden anywhere in a record id.
const FORBIDDEN_CHARS: &[char] = &['/', '\\', '\0'];

/// Validate a record id, returning `Ok(())` if it can name a record file.
///
/// # Examples
///
/// ```
/// use crud_types::validate_record_id;
///
/// assert!(validate_record_id("johnny_rockets").is_ok());
/// assert!(validate_record_id("").is_err());
/// assert!(validate_record_id("../escape").is_err());
/// ```
pub fn validate_record_id(id: &str) -> Result<(), TypeError> {
    let reject = |reason: &str| TypeError::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    if id.is_empty() {
        return Err(reject("id must not be empty"));
    }
    if id.len() > RECORD_ID_MAX_LEN {
        return Err(reject("id is too long"));
    }
    if let Some(ch) = id.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(TypeError::InvalidId {
            id: id.to_string(),
            reason: format!("contains forbidden character: {ch:?}"),
        });
    }
    if id.chars().any(char::is_control) {
        return Err(reject("must not contain control characters"));
    }
    if id.starts_with('.') {
        return Err(reject("must not start with '.'"));
    }

    Ok(())
}
