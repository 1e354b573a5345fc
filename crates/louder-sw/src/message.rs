//! Control messages posted from a page to the controller.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::SwError;

/// Wire form: `{ "type": "SKIP_WAITING" }` etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Promote a waiting worker. No reply.
    SkipWaiting,
    /// Delete every cache partition. No reply.
    ClearCache,
    /// Reply with the current version.
    GetVersion,
}

impl ControlMessage {
    /// Parse a posted message. Unknown or malformed messages are an error.
    pub fn from_value(data: &serde_json::Value) -> Result<Self, SwError> {
        serde_json::from_value(data.clone()).map_err(|e| SwError::MessageError(e.to_string()))
    }

    pub fn from_json(data: &str) -> Result<Self, SwError> {
        serde_json::from_str(data).map_err(|e| SwError::MessageError(e.to_string()))
    }

    pub fn to_value(self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Reply to `GET_VERSION`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
    pub version: String,
}

/// Dedicated reply channel that travels with a message.
pub type ReplyPort = oneshot::Sender<VersionReply>;

/// Create a reply channel pair.
pub fn reply_channel() -> (ReplyPort, oneshot::Receiver<VersionReply>) {
    oneshot::channel()
}
