//! Chat Message Records
//!
//! The message record held by the chat store, the id it is keyed by
//! (server-assigned XOR temporary local), and the per-conversation
//! summary rows shown in a conversation list.

use serde::{Deserialize, Serialize};

use crate::api::MessageRecord;
use crate::delivery::DeliveryStatus;
use crate::types::{ConversationId, LocalId, MessageId, Timestamp, UserId};

// ----------------------------------------------------------------------------
// Message Identity
// ----------------------------------------------------------------------------

/// Identity of a chat message: exactly one of a server-assigned id or a
/// temporary client-generated id.
///
/// A message carries a `Local` id from the optimistic append until its
/// send call resolves, at which point the id is swapped for `Server`
/// without moving the message in the list. Push and receipt events only
/// ever reference `Server` ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageRef {
    Server(MessageId),
    Local(LocalId),
}

impl MessageRef {
    pub fn is_local(&self) -> bool {
        matches!(self, MessageRef::Local(_))
    }

    pub fn server_id(&self) -> Option<&MessageId> {
        match self {
            MessageRef::Server(id) => Some(id),
            MessageRef::Local(_) => None,
        }
    }

    pub fn local_id(&self) -> Option<LocalId> {
        match self {
            MessageRef::Server(_) => None,
            MessageRef::Local(id) => Some(*id),
        }
    }
}

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRef::Server(id) => write!(f, "{}", id),
            MessageRef::Local(id) => write!(f, "{}", id),
        }
    }
}

// ----------------------------------------------------------------------------
// Chat Message
// ----------------------------------------------------------------------------

/// A message as held by the chat store and rendered by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageRef,
    pub conversation: ConversationId,
    pub sender: UserId,
    pub content: String,
    pub timestamp: Timestamp,
    pub status: DeliveryStatus,
}

impl ChatMessage {
    /// Optimistic local message, created the moment the user sends.
    pub fn optimistic(
        local_id: LocalId,
        conversation: ConversationId,
        sender: UserId,
        content: String,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: MessageRef::Local(local_id),
            conversation,
            sender,
            content,
            timestamp,
            status: DeliveryStatus::Sent,
        }
    }

    /// Message materialized from a fetched history record.
    pub fn from_record(conversation: ConversationId, record: MessageRecord) -> Self {
        Self {
            id: MessageRef::Server(record.id),
            conversation,
            sender: record.sender_id,
            content: record.content,
            timestamp: record.timestamp,
            status: record.delivery_status,
        }
    }

    /// Swap the temporary id for the server identity once the send call
    /// resolves. The message keeps its list position; only identity,
    /// timestamp and status change.
    pub fn confirm(&mut self, id: MessageId, timestamp: Timestamp, status: DeliveryStatus) {
        self.id = MessageRef::Server(id);
        self.timestamp = timestamp;
        self.status = self.status.max(status);
    }
}

// ----------------------------------------------------------------------------
// Conversation Summary
// ----------------------------------------------------------------------------

/// One row of the conversation list: latest activity plus unread count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation: ConversationId,
    pub preview: String,
    pub last_timestamp: Timestamp,
    pub unread: u32,
}

impl ConversationSummary {
    pub fn new(conversation: ConversationId) -> Self {
        Self {
            conversation,
            preview: String::new(),
            last_timestamp: Timestamp::default(),
            unread: 0,
        }
    }

    /// Record fresh activity. The preview is truncated on a character
    /// boundary so multi-byte content cannot split.
    pub fn note_activity(&mut self, content: &str, timestamp: Timestamp, preview_length: usize) {
        self.preview = truncate_preview(content, preview_length);
        if timestamp > self.last_timestamp {
            self.last_timestamp = timestamp;
        }
    }
}

fn truncate_preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let mut preview: String = content.chars().take(max_chars).collect();
        preview.push('…');
        preview
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
