//! # shard-node
//!
//! A small distributed in-memory key-value store, sharded across a
//! fixed set of peer nodes by consistent hashing of the key, with
//! single-replica redundancy on the next node in the ring. Any client
//! may contact any node; requests are transparently forwarded to the
//! key's primary, and if that primary is unreachable the replica may
//! answer as a fallback. Each node persists its owned data to a local
//! on-disk snapshot and, on startup, reconciles its state with peers so
//! that a restarted node recovers the keys it is responsible for.
//!
//! ## Modules
//!
//! - [`placement`] — deterministic hash-ring mapping from key to
//!   (primary, replica).
//! - [`store`] — in-memory dual map with a single mutation mutex and a
//!   dirty flag.
//! - [`persistence`] — periodic flush of both maps to a per-node file,
//!   loaded back on boot.
//! - [`peer`] — short-lived TCP request/response to a named peer with
//!   a combined connect+read timeout.
//! - [`protocol`] — the wire request/response types.
//! - [`server`] — accept loop, per-connection dispatch, forwarding, and
//!   replication fan-out.
//! - [`liveness`] — periodic ping sweep maintaining the alive-set used
//!   by the server's fallback decisions.
//! - [`reconcile`] — startup reconciliation that pulls peer snapshots
//!   and rebuilds this node's primary/replica partitions.
//! - [`config`] — cluster membership and per-process configuration.
//! - [`error`] — the crate's error type.

pub mod config;
pub mod error;
pub mod liveness;
pub mod peer;
pub mod persistence;
pub mod placement;
pub mod protocol;
pub mod reconcile;
pub mod server;
pub mod store;
