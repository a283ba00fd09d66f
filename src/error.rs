//! Error types shared across the node's components.
//!
//! Every fallible operation inside the library collapses to a single
//! [`NodeError`] enum. None of these ever unwind across the wire: the
//! server maps each variant to a response status string before replying
//! (see [`crate::protocol`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("peer unreachable: {0}")]
    Unreachable(String),

    #[error("missing value")]
    MissingValue,

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, NodeError>;
