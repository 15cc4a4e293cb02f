//! In-Memory API Doubles
//!
//! Implementations of the REST collaborator traits backed by staged
//! result queues and a recorded call log. Unstaged calls succeed with
//! neutral defaults, so tests only script the interesting responses.
//! A staged result can carry a delay, which lets tests interleave a
//! slow response with other traffic under the paused tokio clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use bazaar_core::api::{
    ChatApi, MessagePage, NotificationApi, NotificationPage, PageCursor, ReadOutcome,
    ReadSelection, ScoreApi, SendReceipt,
};
use bazaar_core::delivery::DeliveryStatus;
use bazaar_core::errors::ApiResult;
use bazaar_core::score::ScoreSnapshot;
use bazaar_core::types::{ConversationId, ListingId, MessageId, Timestamp};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A staged response, optionally delayed on the tokio clock.
struct Staged<T> {
    delay: Option<Duration>,
    result: ApiResult<T>,
}

struct ResultQueue<T>(Mutex<VecDeque<Staged<T>>>);

impl<T> Default for ResultQueue<T> {
    fn default() -> Self {
        Self(Mutex::new(VecDeque::new()))
    }
}

impl<T> ResultQueue<T> {
    fn stage(&self, delay: Option<Duration>, result: ApiResult<T>) {
        lock(&self.0).push_back(Staged { delay, result });
    }

    /// Pop the next staged response, waiting out its delay; fall back to
    /// the given default.
    async fn take_or(&self, default: impl FnOnce() -> ApiResult<T>) -> ApiResult<T> {
        let staged = lock(&self.0).pop_front();
        match staged {
            Some(Staged { delay, result }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                result
            }
            None => default(),
        }
    }
}

// ----------------------------------------------------------------------------
// Chat API
// ----------------------------------------------------------------------------

/// One recorded chat endpoint call.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCall {
    Messages {
        conversation: ConversationId,
        cursor: Option<PageCursor>,
    },
    Send {
        conversation: ConversationId,
        content: String,
    },
    MarkRead {
        conversation: ConversationId,
        ids: Vec<MessageId>,
    },
    MarkDelivered {
        conversation: ConversationId,
        ids: Vec<MessageId>,
    },
    UnreadCount,
}

#[derive(Default)]
struct ChatApiShared {
    calls: Mutex<Vec<ChatCall>>,
    messages: ResultQueue<MessagePage>,
    sends: ResultQueue<SendReceipt>,
    mark_reads: ResultQueue<ReadOutcome>,
    mark_delivereds: ResultQueue<()>,
    unreads: ResultQueue<u32>,
    send_counter: AtomicU64,
}

/// Chat API double. Clones share the log and the staged queues.
#[derive(Clone, Default)]
pub struct InMemoryChatApi {
    shared: Arc<ChatApiShared>,
}

impl InMemoryChatApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_messages(&self, result: ApiResult<MessagePage>) {
        self.shared.messages.stage(None, result);
    }

    /// Stage a history response that resolves only after `delay`.
    pub fn stage_messages_after(&self, delay: Duration, result: ApiResult<MessagePage>) {
        self.shared.messages.stage(Some(delay), result);
    }

    pub fn stage_send(&self, result: ApiResult<SendReceipt>) {
        self.shared.sends.stage(None, result);
    }

    pub fn stage_send_after(&self, delay: Duration, result: ApiResult<SendReceipt>) {
        self.shared.sends.stage(Some(delay), result);
    }

    pub fn stage_mark_read(&self, result: ApiResult<ReadOutcome>) {
        self.shared.mark_reads.stage(None, result);
    }

    pub fn stage_mark_delivered(&self, result: ApiResult<()>) {
        self.shared.mark_delivereds.stage(None, result);
    }

    pub fn stage_unread_count(&self, result: ApiResult<u32>) {
        self.shared.unreads.stage(None, result);
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<ChatCall> {
        lock(&self.shared.calls).clone()
    }

    /// Number of history fetches issued for `conversation`.
    pub fn message_fetches(&self, conversation: &ConversationId) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(call, ChatCall::Messages { conversation: c, .. } if c == conversation)
            })
            .count()
    }

    fn record(&self, call: ChatCall) {
        lock(&self.shared.calls).push(call);
    }
}

#[async_trait]
impl ChatApi for InMemoryChatApi {
    async fn messages(
        &self,
        conversation: &ConversationId,
        cursor: Option<&PageCursor>,
    ) -> ApiResult<MessagePage> {
        self.record(ChatCall::Messages {
            conversation: conversation.clone(),
            cursor: cursor.cloned(),
        });
        self.shared.messages.take_or(|| Ok(MessagePage::empty())).await
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> ApiResult<SendReceipt> {
        self.record(ChatCall::Send {
            conversation: conversation.clone(),
            content: content.to_string(),
        });
        let counter = &self.shared.send_counter;
        self.shared
            .sends
            .take_or(|| {
                let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
                Ok(SendReceipt {
                    message_id: MessageId::new(format!("msg-{n}")),
                    timestamp: Timestamp::from_millis(n * 1000),
                    delivery_status: DeliveryStatus::Sent,
                })
            })
            .await
    }

    async fn mark_read(
        &self,
        conversation: &ConversationId,
        ids: &[MessageId],
    ) -> ApiResult<ReadOutcome> {
        self.record(ChatCall::MarkRead {
            conversation: conversation.clone(),
            ids: ids.to_vec(),
        });
        let requested = ids.len() as u32;
        self.shared
            .mark_reads
            .take_or(|| Ok(ReadOutcome { updated: requested }))
            .await
    }

    async fn mark_delivered(
        &self,
        conversation: &ConversationId,
        ids: &[MessageId],
    ) -> ApiResult<()> {
        self.record(ChatCall::MarkDelivered {
            conversation: conversation.clone(),
            ids: ids.to_vec(),
        });
        self.shared.mark_delivereds.take_or(|| Ok(())).await
    }

    async fn unread_count(&self) -> ApiResult<u32> {
        self.record(ChatCall::UnreadCount);
        self.shared.unreads.take_or(|| Ok(0)).await
    }
}

// ----------------------------------------------------------------------------
// Notification API
// ----------------------------------------------------------------------------

/// One recorded notification endpoint call.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationCall {
    Fetch { top: u32 },
    MarkRead { selection: ReadSelection },
}

#[derive(Default)]
struct NotificationApiShared {
    calls: Mutex<Vec<NotificationCall>>,
    fetches: ResultQueue<NotificationPage>,
    mark_reads: ResultQueue<()>,
}

/// Notification API double.
#[derive(Clone, Default)]
pub struct InMemoryNotificationApi {
    shared: Arc<NotificationApiShared>,
}

impl InMemoryNotificationApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_fetch(&self, result: ApiResult<NotificationPage>) {
        self.shared.fetches.stage(None, result);
    }

    pub fn stage_mark_read(&self, result: ApiResult<()>) {
        self.shared.mark_reads.stage(None, result);
    }

    pub fn calls(&self) -> Vec<NotificationCall> {
        lock(&self.shared.calls).clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, NotificationCall::Fetch { .. }))
            .count()
    }
}

#[async_trait]
impl NotificationApi for InMemoryNotificationApi {
    async fn notifications(&self, top: u32) -> ApiResult<NotificationPage> {
        lock(&self.shared.calls).push(NotificationCall::Fetch { top });
        self.shared
            .fetches
            .take_or(|| {
                Ok(NotificationPage {
                    items: Vec::new(),
                    has_more: false,
                    total: 0,
                    unread_count: 0,
                })
            })
            .await
    }

    async fn mark_read(&self, selection: &ReadSelection) -> ApiResult<()> {
        lock(&self.shared.calls).push(NotificationCall::MarkRead {
            selection: selection.clone(),
        });
        self.shared.mark_reads.take_or(|| Ok(())).await
    }
}

// ----------------------------------------------------------------------------
// Score API
// ----------------------------------------------------------------------------

/// One recorded score endpoint call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreCall {
    Recalculate { listing: ListingId },
}

#[derive(Default)]
struct ScoreApiShared {
    calls: Mutex<Vec<ScoreCall>>,
    recalculations: ResultQueue<ScoreSnapshot>,
}

/// Score API double.
#[derive(Clone, Default)]
pub struct InMemoryScoreApi {
    shared: Arc<ScoreApiShared>,
}

impl InMemoryScoreApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage_recalculate(&self, result: ApiResult<ScoreSnapshot>) {
        self.shared.recalculations.stage(None, result);
    }

    pub fn stage_recalculate_after(&self, delay: Duration, result: ApiResult<ScoreSnapshot>) {
        self.shared.recalculations.stage(Some(delay), result);
    }

    pub fn calls(&self) -> Vec<ScoreCall> {
        lock(&self.shared.calls).clone()
    }

    pub fn recalculation_count(&self) -> usize {
        self.calls().len()
    }
}

#[async_trait]
impl ScoreApi for InMemoryScoreApi {
    async fn recalculate(&self, listing: &ListingId) -> ApiResult<ScoreSnapshot> {
        lock(&self.shared.calls).push(ScoreCall::Recalculate {
            listing: listing.clone(),
        });
        self.shared
            .recalculations
            .take_or(|| Ok(ScoreSnapshot::new(50.0, "Fair".to_string())))
            .await
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
