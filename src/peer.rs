//! # Peer client
//!
//! A short-lived outbound TCP call to a named peer: connect, write one
//! request, read until the peer closes its write side (or the bounded
//! buffer fills), parse. Any socket error, timeout, or parse failure
//! collapses to a single [`NodeError::Unreachable`] — the caller
//! decides policy.

use crate::config::NodeId;
use crate::error::NodeError;
use crate::protocol::{Request, MAX_MESSAGE_BYTES};
use serde_json::Value as Json;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// Issues `req` to `peer` and returns its parsed JSON response.
/// `timeout` bounds connect *and* read combined.
pub fn call(peer: &NodeId, req: &Request, timeout: Duration) -> Result<Json, NodeError> {
    let deadline = Instant::now() + timeout;
    let body = serde_json::to_vec(req)?;

    let mut stream = TcpStream::connect_timeout(&peer.addr(), timeout)
        .map_err(|e| NodeError::Unreachable(format!("connect to {peer}: {e}")))?;

    let remaining = deadline.saturating_duration_since(Instant::now());
    stream
        .set_write_timeout(Some(remaining.max(Duration::from_millis(1))))
        .map_err(|e| NodeError::Unreachable(e.to_string()))?;
    stream
        .write_all(&body)
        .map_err(|e| NodeError::Unreachable(format!("write to {peer}: {e}")))?;
    stream
        .shutdown(std::net::Shutdown::Write)
        .map_err(|e| NodeError::Unreachable(format!("shutdown write to {peer}: {e}")))?;

    let remaining = deadline.saturating_duration_since(Instant::now());
    stream
        .set_read_timeout(Some(remaining.max(Duration::from_millis(1))))
        .map_err(|e| NodeError::Unreachable(e.to_string()))?;

    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    loop {
        if buf.len() >= MAX_MESSAGE_BYTES {
            break;
        }
        let n = stream
            .read(&mut chunk)
            .map_err(|e| NodeError::Unreachable(format!("read from {peer}: {e}")))?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    serde_json::from_slice(&buf)
        .map_err(|e| NodeError::Unreachable(format!("malformed response from {peer}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Response;
    use std::io::Read as _;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn calls_peer_and_parses_response() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let n = stream.read(&mut buf).unwrap();
            let req: Request = serde_json::from_slice(&buf[..n]).unwrap();
            assert_eq!(req.key.as_deref(), Some("color"));
            stream.write_all(&Response::Status("OK").to_bytes()).unwrap();
        });

        let peer = NodeId(addr);
        let resp = call(&peer, &Request::put("color", "red"), Duration::from_secs(1)).unwrap();
        assert_eq!(resp["status"], "OK");
        handle.join().unwrap();
    }

    #[test]
    fn unreachable_peer_is_a_single_error_kind() {
        let peer = NodeId("127.0.0.1:1".parse().unwrap());
        let err = call(&peer, &Request::ping(), Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, NodeError::Unreachable(_)));
    }
}
