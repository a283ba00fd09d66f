//! # Placement
//!
//! Deterministic hash-ring mapping from key to the node that owns it as
//! primary, and the node that holds its single replica. Both functions
//! are pure in `(key, nodes)` and must be bit-identical across every
//! node in the cluster.

use crate::config::NodeId;
use sha2::{Digest, Sha256};

/// SHA-256 of `key`, folded into a `u128` modulo `n` via Horner's method
/// over the big-endian digest bytes. This is equivalent to interpreting
/// the full 256-bit digest as a big-endian unsigned integer and reducing
/// it modulo `n`, without pulling in a bignum dependency for it.
fn hash_mod(key: &[u8], n: u128) -> u128 {
    let digest = Sha256::digest(key);
    let mut acc: u128 = 0;
    for byte in digest.iter() {
        acc = (acc * 256 + *byte as u128) % n;
    }
    acc
}

/// The node responsible for `key` as primary: `NODES[H(key) mod N]`.
///
/// # Panics
/// Panics if `nodes` is empty — the cluster is assumed non-empty for
/// the lifetime of the process, since the node list is fixed at boot.
pub fn primary<'a>(key: &[u8], nodes: &'a [NodeId]) -> &'a NodeId {
    let n = nodes.len() as u128;
    assert!(n > 0, "NODES must be non-empty");
    &nodes[hash_mod(key, n) as usize]
}

/// The node holding the single replica of `key`: `NODES[(H(key)+1) mod N]`.
/// When `N = 1` this is the same node as `primary`, which makes
/// replication a no-op.
pub fn replica<'a>(key: &[u8], nodes: &'a [NodeId]) -> &'a NodeId {
    let n = nodes.len() as u128;
    assert!(n > 0, "NODES must be non-empty");
    let idx = (hash_mod(key, n) + 1) % n;
    &nodes[idx as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(n: u16) -> Vec<NodeId> {
        (0..n)
            .map(|i| NodeId(format!("127.0.0.1:{}", 5000 + i).parse().unwrap()))
            .collect()
    }

    #[test]
    fn single_node_primary_is_replica() {
        let nodes = nodes(1);
        assert_eq!(primary(b"color", &nodes), replica(b"color", &nodes));
        assert_eq!(primary(b"color", &nodes), &nodes[0]);
    }

    #[test]
    fn replica_is_one_past_primary() {
        let nodes = nodes(3);
        for key in [b"color".as_slice(), b"hello", b"a-very-long-key-value-here"] {
            let n = nodes.len() as u128;
            let p = nodes.iter().position(|x| x == primary(key, &nodes)).unwrap() as u128;
            let r = nodes.iter().position(|x| x == replica(key, &nodes)).unwrap() as u128;
            assert_eq!(r, (p + 1) % n);
        }
    }

    #[test]
    fn deterministic_across_independent_node_lists() {
        let a = nodes(5);
        let b = nodes(5);
        assert_ne!(a.as_ptr(), b.as_ptr());
        for i in 0..10_000u32 {
            let key = format!("key-{i}");
            assert_eq!(primary(key.as_bytes(), &a), primary(key.as_bytes(), &b));
            assert_eq!(replica(key.as_bytes(), &a), replica(key.as_bytes(), &b));
        }
    }

    #[test]
    fn uniform_ish_distribution_over_small_cluster() {
        let nodes = nodes(3);
        let mut counts = [0u32; 3];
        for i in 0..9_000u32 {
            let key = format!("k{i}");
            let idx = nodes
                .iter()
                .position(|x| x == primary(key.as_bytes(), &nodes))
                .unwrap();
            counts[idx] += 1;
        }
        for c in counts {
            assert!(c > 2_500 && c < 3_500, "skewed distribution: {counts:?}");
        }
    }
}
