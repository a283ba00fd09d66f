//! # Snapshot persistence
//!
//! Periodically flushes both maps to a per-node file. The
//! on-disk format — `{"primary": {...}, "replica": {...}}` — is the
//! same shape serialized for the SNAPSHOT wire response's underlying
//! data, just nested instead of flattened.

use crate::store::{Key, Store, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub primary: HashMap<String, String>,
    #[serde(default)]
    pub replica: HashMap<String, String>,
}

fn bytes_map_to_strings(map: &HashMap<Key, Value>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| {
            (
                String::from_utf8_lossy(k).into_owned(),
                String::from_utf8_lossy(v).into_owned(),
            )
        })
        .collect()
}

fn strings_map_to_bytes(map: HashMap<String, String>) -> HashMap<Key, Value> {
    map.into_iter()
        .map(|(k, v)| (k.into_bytes(), v.into_bytes()))
        .collect()
}

/// Writes a fresh snapshot to `path`, non-atomically (a plain
/// truncate-and-write, not a rename-into-place, so a crash mid write
/// can leave a truncated file — which `load` below tolerates).
pub fn flush(path: &Path, primary: &HashMap<Key, Value>, replica: &HashMap<Key, Value>) -> std::io::Result<()> {
    let snapshot = Snapshot {
        primary: bytes_map_to_strings(primary),
        replica: bytes_map_to_strings(replica),
    };
    let body = serde_json::to_vec_pretty(&snapshot).expect("Snapshot is always serializable");
    std::fs::write(path, body)
}

/// Loads the on-disk snapshot. A missing file is treated as an empty
/// snapshot; a truncated or corrupt file is tolerated the same way,
/// with a warning.
pub fn load(path: &Path) -> (HashMap<Key, Value>, HashMap<Key, Value>) {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("no snapshot at {}, starting empty", path.display());
            return (HashMap::new(), HashMap::new());
        }
        Err(e) => {
            log::warn!("failed to read snapshot {}: {e}", path.display());
            return (HashMap::new(), HashMap::new());
        }
    };

    if bytes.is_empty() {
        log::warn!("snapshot {} is empty, starting empty", path.display());
        return (HashMap::new(), HashMap::new());
    }

    match serde_json::from_slice::<Snapshot>(&bytes) {
        Ok(snapshot) => (
            strings_map_to_bytes(snapshot.primary),
            strings_map_to_bytes(snapshot.replica),
        ),
        Err(e) => {
            log::warn!(
                "snapshot {} is corrupt or truncated ({e}), resetting to empty",
                path.display()
            );
            (HashMap::new(), HashMap::new())
        }
    }
}

/// Runs forever: sleeps `period`, and if the store is dirty, flushes it
/// and clears the flag. Persistence errors are logged and left for the
/// next tick — they never propagate to clients.
pub fn run(store: Arc<Store>, path: std::path::PathBuf, period: Duration) {
    loop {
        std::thread::sleep(period);
        if let Some((primary, replica)) = store.take_dirty_snapshot() {
            if let Err(e) = flush(&path, &primary, &replica) {
                log::warn!("failed to persist snapshot to {}: {e}", path.display());
                store.mark_dirty();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn round_trips_both_maps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data_5000.json");

        let mut primary = HashMap::new();
        primary.insert(b"color".to_vec(), b"red".to_vec());
        let mut replica = HashMap::new();
        replica.insert(b"shape".to_vec(), b"circle".to_vec());

        flush(&path, &primary, &replica).unwrap();
        let (loaded_primary, loaded_replica) = load(&path);
        assert_eq!(loaded_primary, primary);
        assert_eq!(loaded_replica, replica);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist.json");
        let (primary, replica) = load(&path);
        assert!(primary.is_empty());
        assert!(replica.is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data_5000.json");
        std::fs::write(&path, b"{not valid json").unwrap();
        let (primary, replica) = load(&path);
        assert!(primary.is_empty());
        assert!(replica.is_empty());
    }

    #[test]
    fn empty_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data_5000.json");
        std::fs::write(&path, b"").unwrap();
        let (primary, replica) = load(&path);
        assert!(primary.is_empty());
        assert!(replica.is_empty());
    }
}
