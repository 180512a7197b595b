//! A single client's session state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;

/// Per-client key/value state identified by an opaque session id.
///
/// Values are guarded by a lock owned by this session alone, so work on
/// one session never contends with another. The remaining-lifetime counter
/// is only written by the registry (reaper sweeps and refreshes).
#[derive(Debug)]
pub struct Session {
    id: String,
    values: RwLock<HashMap<String, Value>>,
    /// Remaining lifetime in milliseconds; reaped at or below zero.
    remaining: AtomicI64,
    expired: AtomicBool,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Build a fully initialized session. Only the registry inserts these
    /// into the shared map.
    pub(crate) fn new(id: String, remaining_millis: i64) -> Self {
        Self {
            id,
            values: RwLock::new(HashMap::new()),
            remaining: AtomicI64::new(remaining_millis),
            expired: AtomicBool::new(false),
            created_at: Utc::now(),
        }
    }

    /// The session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the session was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Lifetime left before the reaper evicts this session.
    pub fn remaining(&self) -> Duration {
        let millis = self.remaining.load(Ordering::Acquire).max(0);
        Duration::from_millis(millis as u64)
    }

    /// Whether the registry has dropped this session (expired, invalidated
    /// or shut down). Values of a dropped session are cleared.
    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    /// Get a value. `None` means the key was never stored (or was removed);
    /// a stored JSON `null` comes back as `Some(Value::Null)`.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    /// Insert or overwrite a value.
    pub fn put_value(&self, key: impl Into<String>, value: Value) {
        let mut values = self.values.write();
        values.insert(key.into(), value);
    }

    /// Get a value deserialized into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let values = self.values.read();
        match values.get(key) {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }

    /// Serialize `value` and store it under `key`.
    pub fn insert<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.put_value(key, value);
        Ok(())
    }

    /// Remove a value, returning it if it was present.
    pub fn remove_value(&self, key: &str) -> Option<Value> {
        self.values.write().remove(key)
    }

    /// Check whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// All keys currently stored.
    pub fn keys(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Check if no values are stored.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Remove every value.
    pub fn clear(&self) {
        self.values.write().clear();
    }

    /// Read-modify-write access to the value map under one write lock.
    pub fn with_values_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut HashMap<String, Value>) -> R,
    {
        let mut values = self.values.write();
        f(&mut values)
    }

    /// Read-only access to the value map under one read lock.
    pub fn with_values<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&HashMap<String, Value>) -> R,
    {
        let values = self.values.read();
        f(&values)
    }

    /// Subtract `elapsed_millis` from the counter and return what is left.
    pub(crate) fn decrement(&self, elapsed_millis: i64) -> i64 {
        self.remaining
            .fetch_sub(elapsed_millis, Ordering::AcqRel)
            .saturating_sub(elapsed_millis)
    }

    /// Restore the counter to the full timeout.
    pub(crate) fn reset(&self, timeout_millis: i64) {
        self.remaining.store(timeout_millis, Ordering::Release);
    }

    /// Mark the session dropped by the registry and discard its values.
    pub(crate) fn expire(&self) {
        self.expired.store(true, Ordering::Release);
        self.values.write().clear();
    }

    pub(crate) fn remaining_millis(&self) -> i64 {
        self.remaining.load(Ordering::Acquire)
    }
}
