//! # Request server
//!
//! The accept loop and per-connection dispatch: one worker thread per
//! connection, reading one `{cmd, key, value}` request and writing
//! exactly one response before closing.

use crate::config::Config;
use crate::error::NodeError;
use crate::liveness::Liveness;
use crate::peer;
use crate::placement;
use crate::protocol::{parse_request, Cmd, Request, Response, MAX_MESSAGE_BYTES};
use crate::store::Store;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

/// Bundles everything a connection handler needs and threads it into
/// every handler.
pub struct NodeState {
    pub config: Config,
    pub store: Arc<Store>,
    pub liveness: Arc<Liveness>,
}

impl NodeState {
    pub fn new(config: Config, store: Store) -> Self {
        let liveness = Arc::new(Liveness::new(config.self_id.clone()));
        NodeState {
            config,
            store: Arc::new(store),
            liveness,
        }
    }
}

/// Binds `listener` and spawns one thread per accepted connection,
/// forever. Each connection is handled independently; a failure in one
/// never affects another.
pub fn run(node: Arc<NodeState>, listener: TcpListener) {
    for conn in listener.incoming() {
        match conn {
            Ok(stream) => {
                let node = node.clone();
                std::thread::spawn(move || {
                    if let Err(e) = handle_connection(&node, stream) {
                        log::warn!("connection error: {e}");
                    }
                });
            }
            Err(e) => log::warn!("failed to accept connection: {e}"),
        }
    }
}

fn handle_connection(node: &NodeState, mut stream: TcpStream) -> Result<(), NodeError> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    loop {
        if buf.len() >= MAX_MESSAGE_BYTES {
            break;
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let response = match parse_request(&buf) {
        Ok(req) => dispatch(node, &req),
        Err(e) => Response::from_error(&e),
    };

    stream.write_all(&response.to_bytes())?;
    Ok(())
}

/// The heart of the server: the PUT/GET/DELETE forwarding and fallback
/// decision tree, plus PING/SNAPSHOT/PUT_REPLICA/DELETE_REPLICA.
fn dispatch(node: &NodeState, req: &Request) -> Response {
    match req.cmd {
        Cmd::Ping => Response::Alive,
        Cmd::Snapshot => {
            let merged = node.store.snapshot_merged();
            Response::Snapshot(
                merged
                    .into_iter()
                    .map(|(k, v)| {
                        (
                            String::from_utf8_lossy(&k).into_owned(),
                            String::from_utf8_lossy(&v).into_owned(),
                        )
                    })
                    .collect(),
            )
        }
        Cmd::Put => dispatch_put(node, req),
        Cmd::Get => dispatch_get(node, req),
        Cmd::Delete => dispatch_delete(node, req),
        Cmd::PutReplica => dispatch_put_replica(node, req),
        Cmd::DeleteReplica => dispatch_delete_replica(node, req),
        Cmd::Unknown => Response::from_error(&NodeError::InvalidCommand(
            "unrecognized cmd".to_string(),
        )),
    }
}

fn require_key(req: &Request) -> Result<&str, NodeError> {
    req.key
        .as_deref()
        .ok_or_else(|| NodeError::Other("missing key".to_string()))
}

fn dispatch_put(node: &NodeState, req: &Request) -> Response {
    let key = match require_key(req) {
        Ok(k) => k,
        Err(e) => return Response::from_error(&e),
    };
    let value = match &req.value {
        Some(v) => v,
        None => return Response::MissingValue,
    };

    let me = &node.config.self_id;
    let nodes = &node.config.nodes;
    let p = placement::primary(key.as_bytes(), nodes);
    let r = placement::replica(key.as_bytes(), nodes);

    if p == me {
        node.store.put_primary(key.as_bytes().to_vec(), value.as_bytes().to_vec());
        replicate_put(node, r, key, value);
        Response::Status("OK")
    } else if node.liveness.is_alive(p) {
        forward(node, p, req)
    } else if r == me {
        node.store.put_replica(key.as_bytes().to_vec(), value.as_bytes().to_vec());
        Response::Status("REPLICA_PUT")
    } else {
        Response::Error("primary unreachable".to_string())
    }
}

fn dispatch_get(node: &NodeState, req: &Request) -> Response {
    let key = match require_key(req) {
        Ok(k) => k,
        Err(e) => return Response::from_error(&e),
    };

    let me = &node.config.self_id;
    let nodes = &node.config.nodes;
    let p = placement::primary(key.as_bytes(), nodes);
    let r = placement::replica(key.as_bytes(), nodes);

    if p == me {
        let value = node
            .store
            .get_merged(key.as_bytes())
            .map(|v| String::from_utf8_lossy(&v).into_owned());
        Response::Get {
            key: key.to_string(),
            value,
        }
    } else if node.liveness.is_alive(p) {
        forward(node, p, req)
    } else if r == me {
        let value = node
            .store
            .get_replica(key.as_bytes())
            .map(|v| String::from_utf8_lossy(&v).into_owned());
        Response::Get {
            key: key.to_string(),
            value,
        }
    } else {
        Response::Error("primary unreachable".to_string())
    }
}

fn dispatch_delete(node: &NodeState, req: &Request) -> Response {
    let key = match require_key(req) {
        Ok(k) => k,
        Err(e) => return Response::from_error(&e),
    };

    let me = &node.config.self_id;
    let nodes = &node.config.nodes;
    let p = placement::primary(key.as_bytes(), nodes);
    let r = placement::replica(key.as_bytes(), nodes);

    if p == me {
        node.store.delete_primary(key.as_bytes());
        replicate_delete(node, r, key);
        Response::Status("DELETED")
    } else if node.liveness.is_alive(p) {
        forward(node, p, req)
    } else if r == me {
        node.store.delete_replica(key.as_bytes());
        Response::Status("REPLICA_DELETED")
    } else {
        Response::Error("primary unreachable".to_string())
    }
}

fn dispatch_put_replica(node: &NodeState, req: &Request) -> Response {
    let key = match require_key(req) {
        Ok(k) => k,
        Err(e) => return Response::from_error(&e),
    };
    let value = match &req.value {
        Some(v) => v,
        None => return Response::MissingValue,
    };
    node.store.put_replica(key.as_bytes().to_vec(), value.as_bytes().to_vec());
    Response::Status("REPLICA_OK")
}

fn dispatch_delete_replica(node: &NodeState, req: &Request) -> Response {
    let key = match require_key(req) {
        Ok(k) => k,
        Err(e) => return Response::from_error(&e),
    };
    node.store.delete_replica(key.as_bytes());
    Response::Status("REPLICA_DELETED")
}

/// Forwards the original request verbatim to `target` and relays its
/// response. On failure, replies with an error carrying the peer's
/// error text.
fn forward(node: &NodeState, target: &crate::config::NodeId, req: &Request) -> Response {
    match peer::call(target, req, node.config.peer_timeout) {
        Ok(json) => Response::Raw(json),
        Err(e) => Response::Error(e.to_string()),
    }
}

/// Best-effort replication: fire the PUT_REPLICA call outside the
/// store's mutation lock (the value was already cloned into `store`
/// before this is called) so a slow or unreachable replica can never
/// stall local traffic. A failure here is logged but never fails the
/// client's write.
fn replicate_put(node: &NodeState, replica: &crate::config::NodeId, key: &str, value: &str) {
    if replica == &node.config.self_id {
        return;
    }
    if !node.liveness.is_alive(replica) {
        return;
    }
    if let Err(e) = peer::call(
        replica,
        &Request::put_replica(key, value),
        node.config.peer_timeout,
    ) {
        log::warn!("replication of PUT {key} to {replica} failed: {e}");
    }
}

fn replicate_delete(node: &NodeState, replica: &crate::config::NodeId, key: &str) {
    if replica == &node.config.self_id {
        return;
    }
    if !node.liveness.is_alive(replica) {
        return;
    }
    if let Err(e) = peer::call(
        replica,
        &Request::delete_replica(key),
        node.config.peer_timeout,
    ) {
        log::warn!("replication of DELETE {key} to {replica} failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn single_node() -> NodeState {
        let self_id: crate::config::NodeId = "127.0.0.1:5000".parse().unwrap();
        let config = Config {
            self_id: self_id.clone(),
            nodes: vec![self_id],
            data_dir: std::env::temp_dir(),
            persistence_period: Duration::from_secs(5),
            liveness_period: Duration::from_secs(10),
            peer_timeout: Duration::from_secs(3),
        };
        NodeState::new(config, Store::new())
    }

    #[test]
    fn put_then_get_on_sole_primary() {
        let node = single_node();
        let put = dispatch(&node, &Request::put("color", "red"));
        assert_eq!(put.to_json()["status"], "OK");

        let get = dispatch(&node, &Request::get("color"));
        assert_eq!(get.to_json()["color"], "red");
    }

    #[test]
    fn get_missing_key_returns_null() {
        let node = single_node();
        let get = dispatch(&node, &Request::get("nope"));
        assert_eq!(get.to_json()["nope"], serde_json::Value::Null);
    }

    #[test]
    fn delete_missing_key_is_idempotent() {
        let node = single_node();
        let resp = dispatch(&node, &Request::delete("nope"));
        assert_eq!(resp.to_json()["status"], "DELETED");
    }

    #[test]
    fn put_without_value_is_missing_value() {
        let node = single_node();
        let req = Request {
            cmd: Cmd::Put,
            key: Some("color".to_string()),
            value: None,
        };
        let resp = dispatch(&node, &req);
        assert_eq!(resp.to_json()["status"], "MISSING VALUE");
    }

    #[test]
    fn ping_replies_alive() {
        let node = single_node();
        let resp = dispatch(&node, &Request::ping());
        assert_eq!(resp.to_json()["status"], "ALIVE");
    }

    #[test]
    fn snapshot_is_flat_merged_map() {
        let node = single_node();
        dispatch(&node, &Request::put("color", "red"));
        let resp = dispatch(&node, &Request::snapshot());
        assert_eq!(resp.to_json()["color"], "red");
    }

    #[test]
    fn unrecognized_cmd_string_is_invalid_cmd() {
        let node = single_node();
        let req: Request = serde_json::from_str(r#"{"cmd":"FROBNICATE","key":"k"}"#).unwrap();
        let resp = dispatch(&node, &req);
        assert_eq!(resp.to_json()["status"], "INVALID CMD");
    }

    #[test]
    fn malformed_request_bytes_yield_error_status() {
        let response = match parse_request(b"not json") {
            Ok(req) => dispatch(&single_node(), &req),
            Err(e) => Response::from_error(&e),
        };
        assert_eq!(response.to_json()["status"], "ERROR");
    }
}
