//! Wire protocol
//!
//! Messages exchanged with the server over the operations and selections
//! channels. Server to client:
//!
//! ```text
//! {"type": "op",    "client_id": "c1", "message": [operation, ...]}
//! {"type": "ack",   "message": operation}
//! {"type": "error", "message": "reason", "reason": "version_conflict"}
//! ```
//!
//! Client to server: `submit`, `operations` (pull since a version) and
//! `set_offset` (caret announcement).

pub mod serialize;

use crate::awareness::SelectionUpdate;
use crate::error::SyncError;
use crate::ot::Operation;
use crate::ClientID;
use serde::{Deserialize, Serialize};

pub use serialize::{decode_message, encode_message};

/// Why the server refused a submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Another operation was accepted at that version first; resync and retry
    #[default]
    VersionConflict,

    /// The operation can never apply; drop it
    Invalid,
}

impl From<&SyncError> for RejectReason {
    fn from(err: &SyncError) -> Self {
        match err {
            SyncError::Validation(_) | SyncError::MissingVersion => RejectReason::Invalid,
            _ => RejectReason::VersionConflict,
        }
    }
}

/// Server to client message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Accepted operations: a broadcast from `client_id`, or a pull
    /// response when `client_id` is absent
    Op {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientID>,
        message: Vec<Operation>,
    },

    /// Our in-flight operation was accepted
    Ack { message: Operation },

    /// Our in-flight operation was refused
    Error {
        message: String,
        #[serde(default)]
        reason: RejectReason,
    },
}

impl ServerMessage {
    pub fn rejection(err: &SyncError) -> Self {
        ServerMessage::Error {
            message: err.to_string(),
            reason: RejectReason::from(err),
        }
    }
}

/// Client to server message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    Submit { operation: Operation },
    Operations { version: u64 },
    SetOffset(SelectionUpdate),
}
