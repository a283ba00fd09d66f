//! Cluster membership and per-process configuration.
//!
//! The node list is fixed at boot and identical on every node; there
//! is no dynamic membership and no re-sharding on change.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// A peer's address, `host:port`. Thin newtype so placement and the
/// peer client can't accidentally compare against a bare `String` that
/// came from somewhere else.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(pub SocketAddr);

impl NodeId {
    pub fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(NodeId(s.parse()?))
    }
}

/// The default three-node loopback cluster.
pub const DEFAULT_PORTS: [u16; 3] = [5000, 5001, 5002];

#[derive(Debug, Clone)]
pub struct Config {
    pub self_id: NodeId,
    pub nodes: Vec<NodeId>,
    pub data_dir: std::path::PathBuf,
    pub persistence_period: Duration,
    pub liveness_period: Duration,
    pub peer_timeout: Duration,
}

impl Config {
    pub fn default_nodes() -> Vec<NodeId> {
        DEFAULT_PORTS
            .iter()
            .map(|p| NodeId(format!("127.0.0.1:{p}").parse().unwrap()))
            .collect()
    }

    /// Path of this node's on-disk snapshot file, named by port.
    pub fn snapshot_path(&self) -> std::path::PathBuf {
        self.data_dir
            .join(format!("data_{}.json", self.self_id.addr().port()))
    }
}
