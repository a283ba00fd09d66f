//! # Store
//!
//! The in-memory dual map: keys this node owns as primary, and keys it
//! holds as a redundant replica. Both maps share one mutation mutex —
//! every access, read or write, takes the lock.

use std::collections::HashMap;
use std::sync::Mutex;

pub type Key = Vec<u8>;
pub type Value = Vec<u8>;

struct Inner {
    primary: HashMap<Key, Value>,
    replica: HashMap<Key, Value>,
    dirty: bool,
}

/// Thread-safe dual map with a dirty flag for the persistence loop.
///
/// Reads that need a merged view (primary ∪ replica) return the
/// primary's copy when both maps hold the key — this is only observable
/// during brief replica/primary coexistence.
pub struct Store {
    inner: Mutex<Inner>,
}

impl Store {
    pub fn new() -> Self {
        Self::from_maps(HashMap::new(), HashMap::new())
    }

    pub fn from_maps(primary: HashMap<Key, Value>, replica: HashMap<Key, Value>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                primary,
                replica,
                dirty: false,
            }),
        }
    }

    pub fn get_primary(&self, key: &[u8]) -> Option<Value> {
        self.inner.lock().unwrap().primary.get(key).cloned()
    }

    pub fn get_replica(&self, key: &[u8]) -> Option<Value> {
        self.inner.lock().unwrap().replica.get(key).cloned()
    }

    /// Primary's value if present, otherwise the replica's. Used by the
    /// GET-on-primary path, which falls back to replica_map when the
    /// key is missing locally.
    pub fn get_merged(&self, key: &[u8]) -> Option<Value> {
        let inner = self.inner.lock().unwrap();
        inner
            .primary
            .get(key)
            .or_else(|| inner.replica.get(key))
            .cloned()
    }

    pub fn put_primary(&self, key: Key, value: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner.primary.insert(key, value);
        inner.dirty = true;
    }

    pub fn put_replica(&self, key: Key, value: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner.replica.insert(key, value);
        inner.dirty = true;
    }

    /// Removes `key` from both local maps (primary-path DELETE clears
    /// any stale replica-ghost entry too).
    pub fn delete_primary(&self, key: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.primary.remove(key);
        inner.replica.remove(key);
        inner.dirty = true;
    }

    pub fn delete_replica(&self, key: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.replica.remove(key);
        inner.dirty = true;
    }

    /// Flat merged dump for the SNAPSHOT wire response: primary entries
    /// win over replica entries for the same key.
    pub fn snapshot_merged(&self) -> HashMap<Key, Value> {
        let inner = self.inner.lock().unwrap();
        let mut merged = inner.replica.clone();
        merged.extend(inner.primary.clone());
        merged
    }

    pub fn clone_maps(&self) -> (HashMap<Key, Value>, HashMap<Key, Value>) {
        let inner = self.inner.lock().unwrap();
        (inner.primary.clone(), inner.replica.clone())
    }

    /// If dirty, clears the flag and returns a clone of both maps to
    /// persist. Returns `None` when there's nothing new to flush.
    pub fn take_dirty_snapshot(&self) -> Option<(HashMap<Key, Value>, HashMap<Key, Value>)> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.dirty {
            return None;
        }
        inner.dirty = false;
        Some((inner.primary.clone(), inner.replica.clone()))
    }

    pub fn mark_dirty(&self) {
        self.inner.lock().unwrap().dirty = true;
    }

    pub fn is_primary_empty(&self) -> bool {
        self.inner.lock().unwrap().primary.is_empty()
    }

    /// Install `value` into `primary_map` if it differs from the
    /// current value (including absent), used by reconciliation.
    /// Returns whether anything changed.
    pub fn reconcile_primary(&self, key: &[u8], value: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.primary.get(key).map(|v| v.as_slice()) == Some(value) {
            return false;
        }
        inner.primary.insert(key.to_vec(), value.to_vec());
        inner.dirty = true;
        true
    }

    pub fn reconcile_replica(&self, key: &[u8], value: &[u8]) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.replica.get(key).map(|v| v.as_slice()) == Some(value) {
            return false;
        }
        inner.replica.insert(key.to_vec(), value.to_vec());
        inner.dirty = true;
        true
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete_primary() {
        let store = Store::new();
        store.put_primary(b"k".to_vec(), b"v".to_vec());
        assert_eq!(store.get_primary(b"k"), Some(b"v".to_vec()));
        store.delete_primary(b"k");
        assert_eq!(store.get_primary(b"k"), None);
    }

    #[test]
    fn merged_view_prefers_primary() {
        let store = Store::new();
        store.put_replica(b"k".to_vec(), b"replica-value".to_vec());
        store.put_primary(b"k".to_vec(), b"primary-value".to_vec());
        assert_eq!(store.get_merged(b"k"), Some(b"primary-value".to_vec()));
    }

    #[test]
    fn merged_view_falls_back_to_replica() {
        let store = Store::new();
        store.put_replica(b"k".to_vec(), b"replica-value".to_vec());
        assert_eq!(store.get_merged(b"k"), Some(b"replica-value".to_vec()));
    }

    #[test]
    fn dirty_flag_set_on_write_and_cleared_on_take() {
        let store = Store::new();
        assert!(store.take_dirty_snapshot().is_none());
        store.put_primary(b"k".to_vec(), b"v".to_vec());
        let snap = store.take_dirty_snapshot();
        assert!(snap.is_some());
        assert!(store.take_dirty_snapshot().is_none());
    }

    #[test]
    fn delete_missing_key_is_idempotent() {
        let store = Store::new();
        store.delete_primary(b"nope");
        assert_eq!(store.get_primary(b"nope"), None);
    }
}
