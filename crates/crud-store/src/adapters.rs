//! Custom per-type serialization rules.
//!
//! An [`AdapterSet`] maps a Rust type to an [`Adapter`]: a pair of functions
//! converting that type to and from a structured [`Value`]. Rules apply to a
//! record type as a whole and to any field marked
//! `#[serde(with = "crud_store::adapted")]`.
//!
//! Sets also carry opaque [`AdapterModule`]s, pre-packaged rule bundles that
//! are asked for a rule by type and otherwise never inspected.
//!
//! # Precedence
//!
//! `a.merge(&b)` yields a set where, for each type, `a`'s direct rule beats
//! `b`'s direct rule, and any direct rule beats a module. Among modules,
//! `a`'s are consulted before `b`'s, and later-added before earlier-added.
//! Merging is therefore receiver-biased and not order-free.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Error type returned by adapter functions.
pub type AdapterError = Box<dyn std::error::Error + Send + Sync>;

type EncodeFn = dyn Fn(&dyn Any) -> Result<Value, AdapterError> + Send + Sync;
type DecodeFn = dyn Fn(Value) -> Result<Box<dyn Any>, AdapterError> + Send + Sync;

/// An encode/decode rule for one type.
#[derive(Clone)]
pub struct Adapter {
    type_id: TypeId,
    type_name: &'static str,
    encode: Arc<EncodeFn>,
    decode: Arc<DecodeFn>,
}

impl Adapter {
    /// Build a rule for `T` from an encoder and a decoder.
    pub fn new<T, E, D>(encode: E, decode: D) -> Self
    where
        T: 'static,
        E: Fn(&T) -> Result<Value, AdapterError> + Send + Sync + 'static,
        D: Fn(Value) -> Result<T, AdapterError> + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            encode: Arc::new(move |any: &dyn Any| match any.downcast_ref::<T>() {
                Some(value) => encode(value),
                None => Err(format!("value is not a {}", type_name::<T>()).into()),
            }),
            decode: Arc::new(move |value| decode(value).map(|v| Box::new(v) as Box<dyn Any>)),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether `self` and `other` are clones of the same rule.
    pub fn same_rule(&self, other: &Adapter) -> bool {
        Arc::ptr_eq(&self.encode, &other.encode) && Arc::ptr_eq(&self.decode, &other.decode)
    }

    pub(crate) fn encode_value<T: 'static>(&self, value: &T) -> StoreResult<Value> {
        (self.encode)(value).map_err(|e| self.error(e.to_string()))
    }

    pub(crate) fn decode_value<T: 'static>(&self, value: Value) -> StoreResult<T> {
        let decoded = (self.decode)(value).map_err(|e| self.error(e.to_string()))?;
        decoded
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| self.error(format!("decoded value is not a {}", type_name::<T>())))
    }

    fn error(&self, reason: String) -> StoreError {
        StoreError::Adapter {
            type_name: self.type_name,
            reason,
        }
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter").field("type", &self.type_name).finish()
    }
}

/// A pre-packaged bundle of rules.
///
/// The owning [`AdapterSet`] only asks a module for a rule by type; how the
/// module stores or derives its rules is its own business.
pub trait AdapterModule: Send + Sync {
    /// Human-readable module name, for diagnostics.
    fn name(&self) -> &str;

    /// The module's rule for the type with id `type_id`, if it has one.
    fn adapter_for(&self, type_id: TypeId) -> Option<Adapter>;
}

/// A mergeable bag of per-type rules and modules.
#[derive(Clone, Default)]
pub struct AdapterSet {
    rules: HashMap<TypeId, Adapter>,
    modules: Vec<Arc<dyn AdapterModule>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule, replacing any existing rule for the same type.
    pub fn add(&mut self, adapter: Adapter) -> &mut Self {
        self.rules.insert(adapter.type_id, adapter);
        self
    }

    /// Builder form of [`AdapterSet::add`].
    pub fn with(mut self, adapter: Adapter) -> Self {
        self.add(adapter);
        self
    }

    /// Register an opaque rule bundle.
    pub fn add_module(&mut self, module: Arc<dyn AdapterModule>) -> &mut Self {
        self.modules.push(module);
        self
    }

    /// Builder form of [`AdapterSet::add_module`].
    pub fn with_module(mut self, module: Arc<dyn AdapterModule>) -> Self {
        self.add_module(module);
        self
    }

    /// The rule that applies to `T`: a direct rule first, then the most
    /// recently added module that has one.
    pub fn lookup<T: 'static>(&self) -> Option<Adapter> {
        self.lookup_id(TypeId::of::<T>())
    }

    pub fn lookup_id(&self, type_id: TypeId) -> Option<Adapter> {
        if let Some(rule) = self.rules.get(&type_id) {
            return Some(rule.clone());
        }
        self.modules
            .iter()
            .rev()
            .find_map(|module| module.adapter_for(type_id))
    }

    /// Whether a direct rule is registered for `T` (modules not consulted).
    pub fn contains<T: 'static>(&self) -> bool {
        self.rules.contains_key(&TypeId::of::<T>())
    }

    /// Number of direct rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.modules.is_empty()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Union of `self` and `other`; `self` wins wherever both define a type.
    pub fn merge(&self, other: &AdapterSet) -> AdapterSet {
        let mut rules = other.rules.clone();
        rules.extend(self.rules.iter().map(|(id, rule)| (*id, rule.clone())));

        let mut modules = other.modules.clone();
        modules.extend(self.modules.iter().cloned());

        AdapterSet { rules, modules }
    }
}

impl fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.rules.values().map(|r| r.type_name).collect();
        types.sort_unstable();
        let modules: Vec<&str> = self.modules.iter().map(|m| m.name()).collect();
        f.debug_struct("AdapterSet")
            .field("types", &types)
            .field("modules", &modules)
            .finish()
    }
}

/// A process-scoped [`AdapterSet`] shared between a registry and the stores
/// built against it.
///
/// Stores take a [`snapshot`](SharedAdapterSet::snapshot) on every call, so
/// rules added later affect subsequent saves and loads only.
#[derive(Clone, Default, Debug)]
pub struct SharedAdapterSet {
    inner: Arc<RwLock<AdapterSet>>,
}

impl SharedAdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, adapter: Adapter) {
        self.inner.write().expect("lock poisoned").add(adapter);
    }

    pub fn add_module(&self, module: Arc<dyn AdapterModule>) {
        self.inner.write().expect("lock poisoned").add_module(module);
    }

    /// Mutate the shared set in place.
    pub fn update(&self, f: impl FnOnce(&mut AdapterSet)) {
        f(&mut self.inner.write().expect("lock poisoned"));
    }

    /// A point-in-time copy of the shared set.
    pub fn snapshot(&self) -> AdapterSet {
        self.inner.read().expect("lock poisoned").clone()
    }
}
