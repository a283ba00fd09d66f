//! # Liveness tracker
//!
//! Periodically pings every peer and swaps in a fresh alive-set.
//! Readers (the request server's forwarding/fallback decision) see
//! either the pre- or post-update set — the tracker never blocks
//! request handling.

use crate::config::NodeId;
use crate::peer;
use crate::protocol::Request;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct Liveness {
    self_id: NodeId,
    alive: Mutex<Arc<HashSet<NodeId>>>,
}

impl Liveness {
    pub fn new(self_id: NodeId) -> Self {
        let mut initial = HashSet::new();
        initial.insert(self_id.clone());
        Liveness {
            self_id,
            alive: Mutex::new(Arc::new(initial)),
        }
    }

    /// Current best-guess alive set. Always contains self.
    pub fn snapshot(&self) -> Arc<HashSet<NodeId>> {
        self.alive.lock().unwrap().clone()
    }

    pub fn is_alive(&self, node: &NodeId) -> bool {
        self.snapshot().contains(node)
    }

    /// Pings every peer ≠ self once and swaps in the resulting set.
    fn sweep(&self, nodes: &[NodeId], timeout: Duration) {
        let mut alive = HashSet::new();
        alive.insert(self.self_id.clone());
        for node in nodes {
            if node == &self.self_id {
                continue;
            }
            match peer::call(node, &Request::ping(), timeout) {
                Ok(resp) if resp.get("status").and_then(|v| v.as_str()) == Some("ALIVE") => {
                    alive.insert(node.clone());
                }
                Ok(_) => {
                    log::warn!("peer {node} responded but not with ALIVE, treating as down");
                }
                Err(e) => {
                    log::warn!("peer {node} unreachable during liveness sweep: {e}");
                }
            }
        }
        *self.alive.lock().unwrap() = Arc::new(alive);
    }
}

/// Runs forever: sleeps `period`, then sweeps all peers once.
pub fn run(liveness: Arc<Liveness>, nodes: Vec<NodeId>, period: Duration, peer_timeout: Duration) {
    loop {
        std::thread::sleep(period);
        liveness.sweep(&nodes, peer_timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_is_always_alive() {
        let me = NodeId("127.0.0.1:5000".parse().unwrap());
        let liveness = Liveness::new(me.clone());
        assert!(liveness.is_alive(&me));
    }

    #[test]
    fn sweep_drops_unreachable_peers() {
        let me = NodeId("127.0.0.1:5000".parse().unwrap());
        let unreachable = NodeId("127.0.0.1:1".parse().unwrap());
        let liveness = Liveness::new(me.clone());
        liveness.sweep(&[me.clone(), unreachable.clone()], Duration::from_millis(200));
        assert!(liveness.is_alive(&me));
        assert!(!liveness.is_alive(&unreachable));
    }
}
