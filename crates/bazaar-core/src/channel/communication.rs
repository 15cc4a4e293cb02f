//! Channel Message Schema
//!
//! The typed messages flowing between the engine's tasks:
//!
//! ```text
//! Consumer ──Command──▶ SyncTask ──Effect──▶ spawned REST futures
//!                          ▲                        │
//!                          └───────Completion◀──────┘
//! Hub driver ──PushFrame──▶ SyncTask ──AppEvent──▶ UI consumers
//! ```
//!
//! Everything the sync task does is a reaction to exactly one of these
//! inputs, which is what keeps store mutation single-threaded.

use serde::{Deserialize, Serialize};

use crate::api::{MessagePage, NotificationPage, PageCursor, ReadOutcome, ReadSelection, SendReceipt};
use crate::delivery::DeliveryStatus;
use crate::errors::ApiError;
use crate::message::ChatMessage;
use crate::notification::Notification;
use crate::score::ScoreSnapshot;
use crate::types::{ConversationId, ListingId, LocalId, MessageId, Timestamp};

// ----------------------------------------------------------------------------
// Event Names
// ----------------------------------------------------------------------------

/// Wire names of the push events each hub emits.
pub mod event_names {
    pub const MESSAGE_RECEIVED: &str = "messageReceived";
    pub const MESSAGE_DELIVERED: &str = "messageDelivered";
    pub const MESSAGE_READ: &str = "messageRead";
    pub const NEW_NOTIFICATION: &str = "newNotification";
    pub const UNREAD_COUNT_UPDATE: &str = "unreadCountUpdate";
    pub const SCORE_UPDATE: &str = "scoreUpdate";

    /// Events the chat hub subscription asks for.
    pub const CHAT_EVENTS: &[&str] = &[MESSAGE_RECEIVED, MESSAGE_DELIVERED, MESSAGE_READ];
    /// Events the notification hub subscription asks for.
    pub const NOTIFICATION_EVENTS: &[&str] = &[NEW_NOTIFICATION, UNREAD_COUNT_UPDATE];
    /// Events the live-score hub subscription asks for.
    pub const SCORE_EVENTS: &[&str] = &[SCORE_UPDATE];
}

// ----------------------------------------------------------------------------
// Push Frames
// ----------------------------------------------------------------------------

/// A raw event from a hub: string name plus opaque JSON payload.
/// Features decode the payload into their typed shapes (`push` module);
/// a payload that fails to decode is logged and dropped, never fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushFrame {
    pub event: String,
    pub payload: serde_json::Value,
}

impl PushFrame {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// Decode the payload into a typed push struct.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

// ----------------------------------------------------------------------------
// Connection Status
// ----------------------------------------------------------------------------

/// Status of one hub connection, published on its watch channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No connection, none being attempted (initial, or after teardown).
    #[default]
    Disconnected,
    /// Handshake in progress, including scheduled reconnect attempts.
    Connecting,
    /// Live session, frames flowing.
    Connected,
    /// Handshake failed or retries exhausted. The driver keeps probing
    /// in the background; consumers branch on this status, it is never
    /// thrown.
    Error,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derived status for a feature that can fall back to polling. One field
/// tells a consumer which path is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
    /// Push is down and the interval poller is carrying updates.
    Polling,
}

impl From<ConnectionStatus> for SyncStatus {
    fn from(status: ConnectionStatus) -> Self {
        match status {
            ConnectionStatus::Disconnected => SyncStatus::Disconnected,
            ConnectionStatus::Connecting => SyncStatus::Connecting,
            ConnectionStatus::Connected => SyncStatus::Connected,
            ConnectionStatus::Error => SyncStatus::Error,
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncStatus::Disconnected => "disconnected",
            SyncStatus::Connecting => "connecting",
            SyncStatus::Connected => "connected",
            SyncStatus::Error => "error",
            SyncStatus::Polling => "polling",
        };
        write!(f, "{}", s)
    }
}

// ----------------------------------------------------------------------------
// Commands (Consumer → SyncTask)
// ----------------------------------------------------------------------------

/// User/consumer actions driving the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Make a conversation active, loading its first history page.
    /// Idempotent while that conversation is loading or loaded.
    OpenConversation { conversation: ConversationId },

    /// Send a message in the active conversation (optimistic append).
    SendMessage { content: String },

    /// Mark messages in the active conversation read.
    MarkMessagesRead { ids: Vec<MessageId> },

    /// Fetch the next (older) history page for the active conversation.
    LoadOlderMessages,

    /// Refresh the authoritative unread total across conversations.
    RefreshUnreadTotal,

    /// Load the notification list (first call per session wins; repeats
    /// are no-ops until a reset).
    LoadNotifications,

    /// Mark notifications read, optimistically and fire-and-forget.
    MarkNotificationsRead { selection: ReadSelection },

    /// Watch a listing's live score (`None` stops watching).
    WatchListing { listing: Option<ListingId> },

    /// Clear every store (logout).
    Reset,

    /// Stop the sync task.
    Shutdown,
}

// ----------------------------------------------------------------------------
// Effects (SyncTask → I/O executor)
// ----------------------------------------------------------------------------

/// Which history fetch a page request serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Initial,
    Older,
}

/// Why a score recalculation was requested. Initial fetch failures are
/// surfaced to the consumer; poll-tick failures are background noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreFetchOrigin {
    Initial,
    Poll,
}

/// REST calls the sync task wants executed. Each is spawned as a future
/// that reports back with a [`Completion`]; fire-and-forget effects
/// report nothing and swallow failures.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchMessages {
        conversation: ConversationId,
        cursor: Option<PageCursor>,
        kind: PageKind,
        generation: u64,
    },
    DispatchSend {
        conversation: ConversationId,
        local_id: LocalId,
        content: String,
    },
    PushReadReceipts {
        conversation: ConversationId,
        ids: Vec<MessageId>,
    },
    /// Fire-and-forget delivered acknowledgement for received messages.
    PushDeliveredReceipts {
        conversation: ConversationId,
        ids: Vec<MessageId>,
    },
    FetchUnreadTotal,
    FetchNotifications {
        top: u32,
    },
    /// Fire-and-forget notification read-state sync.
    PushNotificationsRead {
        selection: ReadSelection,
    },
    RecalculateScore {
        listing: ListingId,
        epoch: u64,
        origin: ScoreFetchOrigin,
    },
}

// ----------------------------------------------------------------------------
// Completions (spawned REST futures → SyncTask)
// ----------------------------------------------------------------------------

/// Results of spawned REST calls, funneled back into the sync loop. Each
/// carries the correlation context its handler needs to decide whether
/// the completion is still relevant.
#[derive(Debug)]
pub enum Completion {
    MessagesFetched {
        conversation: ConversationId,
        kind: PageKind,
        generation: u64,
        result: Result<MessagePage, ApiError>,
    },
    SendResolved {
        conversation: ConversationId,
        local_id: LocalId,
        result: Result<SendReceipt, ApiError>,
    },
    ReadAcknowledged {
        conversation: ConversationId,
        result: Result<ReadOutcome, ApiError>,
    },
    UnreadTotalFetched {
        result: Result<u32, ApiError>,
    },
    NotificationsFetched {
        result: Result<NotificationPage, ApiError>,
    },
    ScoreResolved {
        listing: ListingId,
        epoch: u64,
        origin: ScoreFetchOrigin,
        result: Result<ScoreSnapshot, ApiError>,
    },
}

// ----------------------------------------------------------------------------
// App Events (SyncTask → UI consumers)
// ----------------------------------------------------------------------------

/// State-change notifications for UI consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppEvent {
    // --- chat ---
    ConversationLoaded {
        conversation: ConversationId,
        messages: Vec<ChatMessage>,
        has_more: bool,
    },
    ConversationLoadFailed {
        conversation: ConversationId,
        error: String,
        retryable: bool,
    },
    OlderMessagesLoaded {
        conversation: ConversationId,
        prepended: usize,
        has_more: bool,
    },
    /// Optimistic or pushed message appended to the active conversation.
    MessageAppended {
        message: ChatMessage,
    },
    /// Optimistic send confirmed; the temp id was swapped in place.
    MessageConfirmed {
        conversation: ConversationId,
        local_id: LocalId,
        message_id: MessageId,
        timestamp: Timestamp,
    },
    /// Optimistic send failed; the entry was removed from the list.
    MessageSendFailed {
        conversation: ConversationId,
        local_id: LocalId,
        error: String,
    },
    DeliveryStatusChanged {
        message_id: MessageId,
        status: DeliveryStatus,
    },
    ConversationUnreadChanged {
        conversation: ConversationId,
        unread: u32,
    },
    UnreadTotalChanged {
        total: u32,
    },

    // --- notifications ---
    NotificationArrived {
        notification: Notification,
    },
    NotificationsLoaded {
        count: usize,
        unread: u32,
    },
    NotificationLoadFailed {
        error: String,
        retryable: bool,
    },
    NotificationUnreadChanged {
        unread: u32,
    },

    // --- live score ---
    ScoreChanged {
        listing: ListingId,
        snapshot: ScoreSnapshot,
    },
    ScoreLoadFailed {
        listing: ListingId,
        error: String,
        retryable: bool,
    },
    ScoreSyncStatusChanged {
        status: SyncStatus,
    },

    // --- engine ---
    StateReset,
    SystemError {
        error: String,
    },
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
