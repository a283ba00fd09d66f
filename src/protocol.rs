//! # Wire protocol
//!
//! One JSON object per TCP connection, request then response, no length
//! prefix — the server closes the connection after writing the
//! response and peers read until EOF into a bounded buffer.

use crate::error::NodeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::HashMap;

/// Read side is bounded at 64 KiB: framing is "read until the peer
/// closes the socket", so callers must still cap the buffer they're
/// willing to fill.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cmd {
    Ping,
    Snapshot,
    Put,
    Get,
    Delete,
    PutReplica,
    DeleteReplica,
    /// Any `cmd` string not recognized above. Keeps an unknown command
    /// from failing `Request` deserialization outright, so it reaches
    /// dispatch and gets the spec's `INVALID CMD` response instead of
    /// the generic malformed-request error.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub cmd: Cmd,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Request {
    pub fn ping() -> Self {
        Request {
            cmd: Cmd::Ping,
            key: None,
            value: None,
        }
    }

    pub fn snapshot() -> Self {
        Request {
            cmd: Cmd::Snapshot,
            key: None,
            value: None,
        }
    }

    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Request {
            cmd: Cmd::Put,
            key: Some(key.into()),
            value: Some(value.into()),
        }
    }

    pub fn get(key: impl Into<String>) -> Self {
        Request {
            cmd: Cmd::Get,
            key: Some(key.into()),
            value: None,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Request {
            cmd: Cmd::Delete,
            key: Some(key.into()),
            value: None,
        }
    }

    pub fn put_replica(key: impl Into<String>, value: impl Into<String>) -> Self {
        Request {
            cmd: Cmd::PutReplica,
            key: Some(key.into()),
            value: Some(value.into()),
        }
    }

    pub fn delete_replica(key: impl Into<String>) -> Self {
        Request {
            cmd: Cmd::DeleteReplica,
            key: Some(key.into()),
            value: None,
        }
    }
}

/// Parses one wire-format request off the bytes read for a connection.
/// Malformed JSON collapses to [`NodeError::Serde`], which the server
/// maps to a `{"status":"ERROR"}` response before closing the connection.
pub fn parse_request(bytes: &[u8]) -> Result<Request, NodeError> {
    serde_json::from_slice(bytes).map_err(NodeError::Serde)
}

/// Response payloads. The command set's replies don't share one shape
/// (a flat key→value map for SNAPSHOT, a `{status: ...}` object
/// elsewhere, a single `{key: value_or_null}` object for GET) so this
/// is modeled as a small enum with a hand-rolled JSON encoding rather
/// than one rigid struct.
#[derive(Debug, Clone)]
pub enum Response {
    Alive,
    Snapshot(HashMap<String, String>),
    Status(&'static str),
    Get { key: String, value: Option<String> },
    MissingValue,
    InvalidCmd,
    Error(String),
    /// A forwarded peer's reply, relayed through verbatim rather than
    /// re-parsed into one of the shapes above.
    Raw(Json),
}

impl Response {
    pub fn to_json(&self) -> Json {
        match self {
            Response::Alive => serde_json::json!({ "status": "ALIVE" }),
            Response::Snapshot(map) => {
                let mut obj = Map::new();
                for (k, v) in map {
                    obj.insert(k.clone(), Json::String(v.clone()));
                }
                Json::Object(obj)
            }
            Response::Status(status) => serde_json::json!({ "status": status }),
            Response::Get { key, value } => {
                let mut obj = Map::new();
                obj.insert(
                    key.clone(),
                    value.clone().map(Json::String).unwrap_or(Json::Null),
                );
                Json::Object(obj)
            }
            Response::MissingValue => serde_json::json!({ "status": "MISSING VALUE" }),
            Response::InvalidCmd => serde_json::json!({ "status": "INVALID CMD" }),
            Response::Error(msg) => serde_json::json!({ "status": "ERROR", "msg": msg }),
            Response::Raw(json) => json.clone(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.to_json()).expect("Response JSON is always serializable")
    }

    /// Maps an internal error to its wire response.
    pub fn from_error(err: &NodeError) -> Response {
        match err {
            NodeError::MissingValue => Response::MissingValue,
            NodeError::InvalidCommand(_) => Response::InvalidCmd,
            other => Response::Error(other.to_string()),
        }
    }
}
