//! Manual control channel.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Messages accepted on the control channel.
///
/// The wire form is `{"type": "SKIP_WAITING"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Leave `Waiting` now instead of waiting for old clients to close.
    SkipWaiting,
}

impl ControlMessage {
    /// Decode a posted message. Anything unrecognized yields `None`.
    pub fn parse(message: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(message.clone()).ok()
    }
}

/// Sending side of a controller's control channel.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    pub(crate) tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ControlHandle {
    pub fn send(&self, message: ControlMessage) -> bool {
        self.tx.send(message).is_ok()
    }

    pub fn skip_waiting(&self) -> bool {
        self.send(ControlMessage::SkipWaiting)
    }

    /// Deliver a raw posted message. Unknown messages are ignored.
    ///
    /// Returns whether a message was delivered.
    pub fn post(&self, message: &serde_json::Value) -> bool {
        match ControlMessage::parse(message) {
            Some(parsed) => self.send(parsed),
            None => {
                tracing::debug!(%message, "ignoring unknown control message");
                false
            }
        }
    }
}
