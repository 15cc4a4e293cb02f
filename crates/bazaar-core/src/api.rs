//! REST Collaborator Contracts
//!
//! The request/response operations the engine depends on but does not
//! implement. Concrete HTTP clients live outside this workspace; the
//! harness crate provides in-memory implementations for tests. Contracts
//! here are exact: handlers rely on the documented shapes (descending
//! message pages, server-reported updated counts, absolute unread
//! totals).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryStatus;
use crate::errors::ApiResult;
use crate::notification::Notification;
use crate::score::ScoreSnapshot;
use crate::types::{ConversationId, ListingId, MessageId, NotificationId, Timestamp, UserId};

// ----------------------------------------------------------------------------
// Wire Records
// ----------------------------------------------------------------------------

/// Opaque continuation token for message history paging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(String);

impl PageCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A message as returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    pub sender_id: UserId,
    pub content: String,
    pub timestamp: Timestamp,
    pub delivery_status: DeliveryStatus,
}

/// One page of conversation history. Messages are ordered descending by
/// time (newest first); the store reverses them for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<MessageRecord>,
    pub has_more: bool,
    pub cursor: Option<PageCursor>,
}

impl MessagePage {
    /// Terminal empty page.
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            has_more: false,
            cursor: None,
        }
    }
}

/// Server acknowledgement of a sent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub message_id: MessageId,
    pub timestamp: Timestamp,
    pub delivery_status: DeliveryStatus,
}

/// Server outcome of a batch mark-as-read call. `updated` counts the
/// messages the server actually transitioned, which can be fewer than
/// were requested (already-read messages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOutcome {
    pub updated: u32,
}

/// One page of notifications plus the authoritative counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub has_more: bool,
    pub total: u32,
    pub unread_count: u32,
}

/// Selection for marking notifications read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadSelection {
    All,
    Ids(Vec<NotificationId>),
}

// ----------------------------------------------------------------------------
// Collaborator Traits
// ----------------------------------------------------------------------------

/// Chat history, sending, and receipt endpoints.
#[async_trait]
pub trait ChatApi: Send + Sync + 'static {
    /// Fetch a history page, newest first. `cursor` continues from a
    /// previous page.
    async fn messages(
        &self,
        conversation: &ConversationId,
        cursor: Option<&PageCursor>,
    ) -> ApiResult<MessagePage>;

    async fn send_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> ApiResult<SendReceipt>;

    /// Batch mark-as-read. The response reports how many messages the
    /// server actually updated.
    async fn mark_read(
        &self,
        conversation: &ConversationId,
        ids: &[MessageId],
    ) -> ApiResult<ReadOutcome>;

    /// Best-effort delivered acknowledgement for received messages.
    async fn mark_delivered(
        &self,
        conversation: &ConversationId,
        ids: &[MessageId],
    ) -> ApiResult<()>;

    /// Absolute unread total across all conversations.
    async fn unread_count(&self) -> ApiResult<u32>;
}

/// Notification list and read-state endpoints.
#[async_trait]
pub trait NotificationApi: Send + Sync + 'static {
    async fn notifications(&self, top: u32) -> ApiResult<NotificationPage>;

    async fn mark_read(&self, selection: &ReadSelection) -> ApiResult<()>;
}

/// Listing score endpoint.
#[async_trait]
pub trait ScoreApi: Send + Sync + 'static {
    async fn recalculate(&self, listing: &ListingId) -> ApiResult<ScoreSnapshot>;
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
