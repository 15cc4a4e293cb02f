//! Push Channel Seam
//!
//! The transport traits the connection manager drives, plus the typed
//! payloads features decode from raw frames. Concrete wire transports
//! (the production WebSocket client, the scripted harness connector)
//! implement [`PushConnector`] / [`PushSession`]; everything above the
//! seam only ever sees [`PushFrame`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channel::PushFrame;
use crate::errors::ConnectError;
use crate::types::{ConversationId, HubKey, ListingId, MessageId, NotificationId, Timestamp, UserId};

// ----------------------------------------------------------------------------
// Transport Traits
// ----------------------------------------------------------------------------

/// Factory for hub sessions. One connector serves every hub key.
#[async_trait]
pub trait PushConnector: Send + Sync + 'static {
    /// Whether this connector can reach the given hub at all. An
    /// unsupported hub yields an inert subscription whose status stays
    /// `disconnected`; no connection is attempted.
    fn supports(&self, _hub: &HubKey) -> bool {
        true
    }

    /// Open a session, performing the handshake. Errors feed the
    /// reconnect machine; fatal ones halt it.
    async fn connect(&self, hub: &HubKey) -> Result<Box<dyn PushSession>, ConnectError>;
}

/// An established hub session delivering frames in arrival order.
#[async_trait]
pub trait PushSession: Send {
    /// Next frame. `Ok(None)` is an orderly server close; `Err` is a
    /// transport drop. Both send the driver back through reconnection.
    async fn next_frame(&mut self) -> Result<Option<PushFrame>, ConnectError>;
}

// ----------------------------------------------------------------------------
// Typed Payloads
// ----------------------------------------------------------------------------

/// `messageReceived` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePush {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub content: String,
    pub timestamp: Timestamp,
}

/// `messageDelivered` / `messageRead` payload; the status itself is
/// implied by the event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptPush {
    pub message_id: MessageId,
}

/// `scoreUpdate` payload. Thin by design: it moves the score value; the
/// advisory snapshot fields come from full recalculations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorePush {
    #[serde(default)]
    pub metric: Option<String>,
    pub value: f64,
    pub timestamp: Timestamp,
}

/// `newNotification` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPush {
    pub notification_id: NotificationId,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub action_url: Option<String>,
    #[serde(default)]
    pub listing_id: Option<ListingId>,
}

/// `unreadCountUpdate` payload: the absolute, authoritative count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCountPush {
    pub count: u32,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
