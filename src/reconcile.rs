//! # Startup reconciliation
//!
//! Runs once after loading the on-disk snapshot and before the accept
//! loop starts serving. Pulls a SNAPSHOT from every believed-alive peer
//! and installs the entries this node should own as primary or hold as
//! replica.

use crate::peer;
use crate::placement;
use crate::protocol::Request;
use crate::server::NodeState;

/// Probes every peer once with PING to seed the alive-set before
/// reconciliation reads it, independent of the long-running liveness
/// loop (which hasn't started yet at this point in boot).
fn probe_peers(node: &NodeState) -> Vec<crate::config::NodeId> {
    let mut alive = Vec::new();
    for peer_id in &node.config.nodes {
        if peer_id == &node.config.self_id {
            continue;
        }
        match peer::call(peer_id, &Request::ping(), node.config.peer_timeout) {
            Ok(resp) if resp.get("status").and_then(|v| v.as_str()) == Some("ALIVE") => {
                alive.push(peer_id.clone());
            }
            Ok(_) | Err(_) => {
                log::warn!("peer {peer_id} unreachable during startup reconciliation, skipping");
            }
        }
    }
    alive
}

/// Pulls one peer's SNAPSHOT and installs the (k, v) pairs this node
/// owns as primary or holds as replica, by the same placement rule the
/// server uses. Keys belonging to neither role are ignored.
fn merge_from_peer(node: &NodeState, peer_id: &crate::config::NodeId) {
    let resp = match peer::call(peer_id, &Request::snapshot(), node.config.peer_timeout) {
        Ok(resp) => resp,
        Err(e) => {
            log::warn!("failed to pull snapshot from {peer_id}: {e}");
            return;
        }
    };
    let Some(obj) = resp.as_object() else {
        log::warn!("snapshot response from {peer_id} was not an object, skipping");
        return;
    };

    let me = &node.config.self_id;
    let nodes = &node.config.nodes;
    for (key, value) in obj {
        let Some(value) = value.as_str() else { continue };
        if placement::primary(key.as_bytes(), nodes) == me {
            node.store.reconcile_primary(key.as_bytes(), value.as_bytes());
        } else if placement::replica(key.as_bytes(), nodes) == me {
            node.store.reconcile_replica(key.as_bytes(), value.as_bytes());
        }
        // else: not ours, ignore.
    }
}

/// Pushes every primary entry this node just recovered out to its live
/// replica, so a crashed-then-recovered primary doesn't leave its
/// replica stale.
fn push_recovered_entries_to_replicas(node: &NodeState, alive_peers: &[crate::config::NodeId]) {
    let (primary_map, _) = node.store.clone_maps();
    let me = &node.config.self_id;
    let nodes = &node.config.nodes;
    for (key, value) in primary_map {
        let r = placement::replica(&key, nodes);
        if r == me || !alive_peers.contains(r) {
            continue;
        }
        let key = String::from_utf8_lossy(&key).into_owned();
        let value = String::from_utf8_lossy(&value).into_owned();
        if let Err(e) = peer::call(
            r,
            &Request::put_replica(key.clone(), value),
            node.config.peer_timeout,
        ) {
            log::warn!("failed to push recovered key {key} to replica {r}: {e}");
        }
    }
}

/// Entry point, called once before [`crate::server::run`] starts
/// accepting connections. The on-disk snapshot must already be loaded
/// into `node.store` by the caller.
pub fn run(node: &NodeState) {
    let alive_peers = probe_peers(node);
    let was_empty = node.store.is_primary_empty();

    for peer_id in &alive_peers {
        merge_from_peer(node, peer_id);
    }

    if was_empty {
        push_recovered_entries_to_replicas(node, &alive_peers);
    }

    if let Some((primary, replica)) = node.store.take_dirty_snapshot() {
        if let Err(e) = crate::persistence::flush(&node.config.snapshot_path(), &primary, &replica) {
            log::warn!("failed to persist after reconciliation: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::Store;
    use std::time::Duration;

    fn config(port: u16, nodes: Vec<u16>) -> Config {
        Config {
            self_id: format!("127.0.0.1:{port}").parse().unwrap(),
            nodes: nodes
                .into_iter()
                .map(|p| format!("127.0.0.1:{p}").parse().unwrap())
                .collect(),
            data_dir: std::env::temp_dir(),
            persistence_period: Duration::from_secs(5),
            liveness_period: Duration::from_secs(10),
            peer_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn reconcile_with_no_reachable_peers_is_a_noop() {
        let node = NodeState::new(config(5000, vec![5000, 5001, 5002]), Store::new());
        run(&node);
        assert!(node.store.is_primary_empty());
    }
}
