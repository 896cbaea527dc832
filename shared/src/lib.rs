//! Wire protocol shared by the sync server and its clients.
//!
//! Every persistent-connection frame is one JSON object tagged by `type`.
//! Action requests travel over plain HTTP as `{type, ...payload}`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_PORT: u16 = 3000;
pub const GAME_PATH: &str = "/game";
pub const DISPATCH_PATH: &str = "/api/dispatch";
pub const HEALTH_PATH: &str = "/health";

/// Printed on stdout once the server accepts connections. The launcher scans
/// child output for this exact prefix.
pub const READY_MARKER: &str = "ready - started server on";

/// Channel the server's room clock writes to.
pub const HOME_ROOM: &str = "Room:HomeRoom";

// Built-in action names
pub const WRITE_FILE: &str = "WriteFile";
pub const DELETE_FILE: &str = "DeleteFile";

/// Client -> server messages on the persistent connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
}

impl ClientMessage {
    /// Channel the message refers to
    pub fn channel(&self) -> &str {
        match self {
            ClientMessage::Subscribe { channel } | ClientMessage::Unsubscribe { channel } => {
                channel
            }
        }
    }
}

/// Server -> client messages on the persistent connection
///
/// `data` is omitted entirely for a channel that has never been written,
/// which keeps "absent" distinct from an explicit JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Update {
        channel: String,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "present"
        )]
        data: Option<Value>,
    },
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// State held in the home room channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RoomState {
    pub clock: u64,
}

/// One action dispatch request: the action name plus its flattened payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ActionRequest {
    /// Builds a request for `action_type` with `payload` as its fields
    pub fn new(action_type: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            action_type: action_type.into(),
            payload,
        }
    }
}

/// Body of a failed action response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFileAction {
    pub path: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFileResult {
    pub path: String,
    pub written: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFileAction {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFileResult {
    pub path: String,
}
