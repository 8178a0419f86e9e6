//! Field-level adapter hook for serde.
//!
//! Mark a field with `#[serde(with = "crud_store::adapted")]` and, while a
//! record store encodes or decodes, the field goes through the rule the
//! store's effective [`AdapterSet`] holds for its type. Without a rule, or
//! outside a store call, the field uses its own `Serialize`/`Deserialize`.
//!
//! ```
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Profile {
//!     id: String,
//!     #[serde(with = "crud_store::adapted")]
//!     joined: u64,
//! }
//! ```

use std::cell::RefCell;

use serde::de::{DeserializeOwned, Error as _};
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::adapters::{Adapter, AdapterSet};

thread_local! {
    static ACTIVE: RefCell<Option<AdapterSet>> = const { RefCell::new(None) };
}

/// Restores the previously active set on drop, including on unwind.
struct ScopeGuard {
    previous: Option<AdapterSet>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE.with(|active| *active.borrow_mut() = previous);
    }
}

/// Run `f` with `adapters` as the set seen by adapted fields on this thread.
pub(crate) fn scoped<R>(adapters: &AdapterSet, f: impl FnOnce() -> R) -> R {
    let previous = ACTIVE.with(|active| active.replace(Some(adapters.clone())));
    let _guard = ScopeGuard { previous };
    f()
}

fn active_rule<T: 'static>() -> Option<Adapter> {
    ACTIVE.with(|active| active.borrow().as_ref().and_then(|set| set.lookup::<T>()))
}

pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize + 'static,
    S: Serializer,
{
    match active_rule::<T>() {
        Some(rule) => rule
            .encode_value(value)
            .map_err(S::Error::custom)?
            .serialize(serializer),
        None => value.serialize(serializer),
    }
}

pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: DeserializeOwned + 'static,
    D: Deserializer<'de>,
{
    match active_rule::<T>() {
        Some(rule) => {
            let value = Value::deserialize(deserializer)?;
            rule.decode_value(value).map_err(D::Error::custom)
        }
        None => T::deserialize(deserializer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Score(u32);

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Player {
        id: String,
        #[serde(with = "crate::adapted")]
        score: Score,
    }

    fn score_as_text() -> AdapterSet {
        AdapterSet::new().with(Adapter::new::<Score, _, _>(
            |s| Ok(json!(format!("{} pts", s.0))),
            |v| {
                let text = v.as_str().ok_or("expected text")?;
                Ok(Score(text.trim_end_matches(" pts").parse()?))
            },
        ))
    }

    #[test]
    fn plain_serde_outside_a_scope() {
        let player = Player { id: "a".into(), score: Score(7) };
        assert_eq!(serde_json::to_value(&player).unwrap(), json!({"id": "a", "score": 7}));
    }

    #[test]
    fn rule_applies_inside_a_scope() {
        let set = score_as_text();
        let player = Player { id: "a".into(), score: Score(7) };

        let value = scoped(&set, || serde_json::to_value(&player)).unwrap();
        assert_eq!(value, json!({"id": "a", "score": "7 pts"}));

        let back: Player = scoped(&set, || serde_json::from_value(value)).unwrap();
        assert_eq!(back, player);
    }

    #[test]
    fn scope_is_restored_afterwards() {
        let set = score_as_text();
        scoped(&set, || {
            let inner = AdapterSet::new();
            scoped(&inner, || assert!(active_rule::<Score>().is_none()));
            assert!(active_rule::<Score>().is_some());
        });
        assert!(active_rule::<Score>().is_none());
    }

    #[test]
    fn rule_failure_is_a_serde_error() {
        let set = score_as_text();
        let result: Result<Player, _> =
            scoped(&set, || serde_json::from_value(json!({"id": "a", "score": 3})));
        assert!(result.unwrap_err().to_string().contains("expected text"));
    }
}
