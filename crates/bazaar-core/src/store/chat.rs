//! Chat Reconciliation Store
//!
//! The canonical client-side view of conversations: an ordered,
//! deduplicated message list for the active conversation, per-conversation
//! summaries, and the global unread total. Three inputs converge here
//! (optimistic local sends, request/response confirmations, and push
//! events) and every mutation is written so the same final state falls
//! out regardless of arrival order.
//!
//! De-duplication policy: a pushed message whose sender is this client is
//! suppressed outright (the optimistic/confirmed path is the only writer
//! for own messages); everything else is keyed by server message id, and
//! an id the store has already seen inserts nothing.

use std::collections::{BTreeMap, HashSet};

use crate::api::{MessagePage, PageCursor, SendReceipt};
use crate::config::ChatConfig;
use crate::delivery::{DeliveryStatus, DeliveryTracker};
use crate::message::{ChatMessage, ConversationSummary, MessageRef};
use crate::push::MessagePush;
use crate::types::{ConversationId, LocalId, MessageId, Timestamp, UserId};

// ----------------------------------------------------------------------------
// Operation Outcomes
// ----------------------------------------------------------------------------

/// Result of activating a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Same conversation, already loading or loaded: exactly no fetch.
    AlreadyActive,
    /// A history fetch is needed; completions must quote `generation`.
    FetchNeeded { generation: u64 },
}

/// Result of a load-more request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMoreOutcome {
    NoConversation,
    /// Initial load or a previous load-more still in flight.
    Busy,
    /// History exhausted; no network call.
    NoMore,
    FetchNeeded {
        conversation: ConversationId,
        cursor: PageCursor,
        generation: u64,
    },
}

/// Result of applying a pushed message.
#[derive(Debug, Clone, PartialEq)]
pub enum PushApplyOutcome {
    /// Sender is this client; the optimistic path owns the entry.
    SuppressedOwnEcho,
    /// Server id already known; nothing inserted.
    Duplicate,
    /// Appended to the visible list of the active conversation.
    AppendedToActive { message: ChatMessage },
    /// Not the active conversation: summary and counters moved, the
    /// visible list did not.
    BackgroundConversation {
        conversation: ConversationId,
        message_id: MessageId,
        unread: u32,
        unread_total: u32,
    },
}

/// Result of confirming an optimistic send.
#[derive(Debug, Clone, PartialEq)]
pub enum SendResolution {
    /// Temp id swapped for the server identity, same list position.
    Swapped { message: ChatMessage },
    /// The visible entry was gone (conversation switched, or the refetch
    /// already carried the server copy); truth still recorded.
    TrackedOnly,
}

/// Plan produced by an optimistic mark-as-read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkReadPlan {
    pub conversation: ConversationId,
    /// Everything to send to the batch endpoint.
    pub requested: Vec<MessageId>,
    /// The subset whose local status actually advanced.
    pub advanced: Vec<MessageId>,
}

/// Counters after a server-confirmed read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadConfirmation {
    pub conversation_unread: Option<u32>,
    pub unread_total: u32,
}

/// View of a freshly loaded first page.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialPageView {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
}

/// View of a prepended older page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OlderPageView {
    pub prepended: usize,
    pub has_more: bool,
}

/// Store activity counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatStoreStats {
    pub sends_started: u64,
    pub sends_confirmed: u64,
    pub sends_failed: u64,
    pub pushes_applied: u64,
    pub echoes_suppressed: u64,
    pub duplicates_ignored: u64,
    pub stale_completions: u64,
}

// ----------------------------------------------------------------------------
// Store
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadPhase {
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug)]
struct ActiveConversation {
    id: ConversationId,
    messages: Vec<ChatMessage>,
    cursor: Option<PageCursor>,
    has_more: bool,
    phase: LoadPhase,
    loading_more: bool,
}

/// The chat store. Mutated only through its operations, and only by the
/// sync task; completions are screened against the current generation so
/// calls that resolve after a conversation switch cannot write stale
/// state.
#[derive(Debug)]
pub struct ChatStore {
    active: Option<ActiveConversation>,
    summaries: BTreeMap<ConversationId, ConversationSummary>,
    tracker: DeliveryTracker,
    unread_total: u32,
    generation: u64,
    preview_length: usize,
    stats: ChatStoreStats,
}

impl ChatStore {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            active: None,
            summaries: BTreeMap::new(),
            tracker: DeliveryTracker::new(),
            unread_total: 0,
            generation: 0,
            preview_length: config.preview_length,
            stats: ChatStoreStats::default(),
        }
    }

    // ------------------------------------------------------------------
    // Conversation activation and history paging
    // ------------------------------------------------------------------

    /// Make a conversation active. Re-opening the one already loading or
    /// loaded performs nothing; a new target (or a retry after a failed
    /// load) resets the view and bumps the completion generation.
    pub fn open_conversation(&mut self, id: ConversationId) -> OpenOutcome {
        if let Some(active) = &self.active {
            if active.id == id && active.phase != LoadPhase::Failed {
                return OpenOutcome::AlreadyActive;
            }
        }
        self.generation += 1;
        self.active = Some(ActiveConversation {
            id,
            messages: Vec::new(),
            cursor: None,
            has_more: false,
            phase: LoadPhase::Loading,
            loading_more: false,
        });
        OpenOutcome::FetchNeeded {
            generation: self.generation,
        }
    }

    /// Apply the first history page. The server sends newest-first; the
    /// visible list is ascending. Returns `None` for stale completions.
    pub fn apply_initial_page(
        &mut self,
        conversation: &ConversationId,
        generation: u64,
        page: MessagePage,
    ) -> Option<InitialPageView> {
        if !self.completion_relevant(conversation, generation) {
            return None;
        }
        let MessagePage {
            messages: records,
            has_more,
            cursor,
        } = page;

        let mut messages = Vec::with_capacity(records.len());
        for record in records.into_iter().rev() {
            let status = self.tracker.status_or(&record.id, record.delivery_status);
            self.tracker.observe(&record.id, status);
            let mut message = ChatMessage::from_record(conversation.clone(), record);
            message.status = status;
            messages.push(message);
        }

        let view = InitialPageView {
            messages: messages.clone(),
            has_more,
        };
        if let Some(active) = self.active.as_mut() {
            active.messages = messages;
            active.cursor = cursor;
            active.has_more = has_more;
            active.phase = LoadPhase::Loaded;
        }
        Some(view)
    }

    /// Record a failed first page. The conversation stays active in a
    /// retryable state: the next `open_conversation` for it fetches again.
    pub fn fail_initial_page(&mut self, conversation: &ConversationId, generation: u64) -> bool {
        if !self.completion_relevant(conversation, generation) {
            return false;
        }
        if let Some(active) = self.active.as_mut() {
            active.phase = LoadPhase::Failed;
            return true;
        }
        false
    }

    /// Start fetching the next older page, if there is one and nothing
    /// is already in flight.
    pub fn begin_load_more(&mut self) -> LoadMoreOutcome {
        let generation = self.generation;
        let Some(active) = self.active.as_mut() else {
            return LoadMoreOutcome::NoConversation;
        };
        if active.phase != LoadPhase::Loaded || active.loading_more {
            return LoadMoreOutcome::Busy;
        }
        if !active.has_more {
            return LoadMoreOutcome::NoMore;
        }
        let Some(cursor) = active.cursor.clone() else {
            return LoadMoreOutcome::NoMore;
        };
        active.loading_more = true;
        LoadMoreOutcome::FetchNeeded {
            conversation: active.id.clone(),
            cursor,
            generation,
        }
    }

    /// Prepend an older page. Records whose id is already visible are
    /// skipped, so an overlapping page cannot duplicate.
    pub fn apply_older_page(
        &mut self,
        conversation: &ConversationId,
        generation: u64,
        page: MessagePage,
    ) -> Option<OlderPageView> {
        if !self.completion_relevant(conversation, generation) {
            return None;
        }
        let known: HashSet<MessageId> = self
            .active
            .as_ref()
            .map(|a| {
                a.messages
                    .iter()
                    .filter_map(|m| m.id.server_id().cloned())
                    .collect()
            })
            .unwrap_or_default();

        let MessagePage {
            messages: records,
            has_more,
            cursor,
        } = page;

        let mut older = Vec::with_capacity(records.len());
        for record in records.into_iter().rev() {
            if known.contains(&record.id) {
                self.stats.duplicates_ignored += 1;
                continue;
            }
            let status = self.tracker.status_or(&record.id, record.delivery_status);
            self.tracker.observe(&record.id, status);
            let mut message = ChatMessage::from_record(conversation.clone(), record);
            message.status = status;
            older.push(message);
        }

        let prepended = older.len();
        if let Some(active) = self.active.as_mut() {
            active.messages.splice(0..0, older);
            active.cursor = cursor;
            active.has_more = has_more;
            active.loading_more = false;
        }
        Some(OlderPageView { prepended, has_more })
    }

    /// Record a failed older-page fetch. The cursor is untouched, so the
    /// next load-more retries the same page.
    pub fn fail_older_page(&mut self, conversation: &ConversationId, generation: u64) -> bool {
        if !self.completion_relevant(conversation, generation) {
            return false;
        }
        if let Some(active) = self.active.as_mut() {
            active.loading_more = false;
            return true;
        }
        false
    }

    /// A completion is relevant only if no conversation switch or reset
    /// happened since its request was issued.
    fn completion_relevant(&mut self, conversation: &ConversationId, generation: u64) -> bool {
        let relevant = generation == self.generation
            && self
                .active
                .as_ref()
                .is_some_and(|active| &active.id == conversation);
        if !relevant {
            self.stats.stale_completions += 1;
        }
        relevant
    }

    // ------------------------------------------------------------------
    // Optimistic sends
    // ------------------------------------------------------------------

    /// Append an optimistic message for the active conversation. Returns
    /// the temp id and the appended message, or `None` when no
    /// conversation is active.
    pub fn begin_send(
        &mut self,
        sender: &UserId,
        content: &str,
        now: Timestamp,
    ) -> Option<(LocalId, ChatMessage)> {
        let conversation = self.active.as_ref()?.id.clone();
        let local_id = LocalId::generate();
        let message = ChatMessage::optimistic(
            local_id,
            conversation.clone(),
            sender.clone(),
            content.to_string(),
            now,
        );
        if let Some(active) = self.active.as_mut() {
            active.messages.push(message.clone());
        }
        self.touch_summary(&conversation, content, now);
        self.stats.sends_started += 1;
        Some((local_id, message))
    }

    /// Confirm an optimistic send: swap the temp id for the server
    /// identity in place. Never reorders the list. Delivery truth is
    /// recorded even when the visible entry is gone.
    pub fn resolve_send_success(
        &mut self,
        conversation: &ConversationId,
        local_id: LocalId,
        receipt: &SendReceipt,
    ) -> SendResolution {
        self.stats.sends_confirmed += 1;
        self.tracker
            .observe(&receipt.message_id, receipt.delivery_status);
        let status = self
            .tracker
            .status_or(&receipt.message_id, receipt.delivery_status);

        if let Some(summary) = self.summaries.get_mut(conversation) {
            if receipt.timestamp > summary.last_timestamp {
                summary.last_timestamp = receipt.timestamp;
            }
        }

        let Some(active) = self.active.as_mut() else {
            return SendResolution::TrackedOnly;
        };
        if &active.id != conversation {
            return SendResolution::TrackedOnly;
        }

        // A refetch may have already materialized the server copy; keep
        // that one and drop the optimistic entry instead of duplicating.
        if active
            .messages
            .iter()
            .any(|m| m.id.server_id() == Some(&receipt.message_id))
        {
            active
                .messages
                .retain(|m| m.id.local_id() != Some(local_id));
            self.stats.duplicates_ignored += 1;
            return SendResolution::TrackedOnly;
        }

        match active
            .messages
            .iter_mut()
            .find(|m| m.id.local_id() == Some(local_id))
        {
            Some(message) => {
                message.confirm(receipt.message_id.clone(), receipt.timestamp, status);
                SendResolution::Swapped {
                    message: message.clone(),
                }
            }
            None => SendResolution::TrackedOnly,
        }
    }

    /// Roll back a failed optimistic send, removing the entry entirely.
    /// Returns whether a visible entry was removed.
    pub fn resolve_send_failure(
        &mut self,
        conversation: &ConversationId,
        local_id: LocalId,
    ) -> bool {
        self.stats.sends_failed += 1;
        if let Some(active) = self.active.as_mut() {
            if &active.id == conversation {
                let before = active.messages.len();
                active
                    .messages
                    .retain(|m| m.id.local_id() != Some(local_id));
                return active.messages.len() != before;
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Push events
    // ------------------------------------------------------------------

    /// Apply a pushed message. List membership changes only for the
    /// active conversation; summaries and counters move for background
    /// ones.
    pub fn apply_push_message(
        &mut self,
        self_user: &UserId,
        push: MessagePush,
    ) -> PushApplyOutcome {
        if &push.sender_id == self_user {
            self.stats.echoes_suppressed += 1;
            return PushApplyOutcome::SuppressedOwnEcho;
        }

        let first_sighting = self.tracker.status(&push.message_id).is_none();
        // The message reached this client, so it is at least delivered.
        self.tracker
            .observe(&push.message_id, DeliveryStatus::Delivered);
        let status = self
            .tracker
            .status_or(&push.message_id, DeliveryStatus::Delivered);

        let is_active = self
            .active
            .as_ref()
            .is_some_and(|active| active.id == push.conversation_id);

        if is_active {
            let duplicate = self.active.as_ref().is_some_and(|active| {
                active
                    .messages
                    .iter()
                    .any(|m| m.id.server_id() == Some(&push.message_id))
            });
            if duplicate {
                self.stats.duplicates_ignored += 1;
                return PushApplyOutcome::Duplicate;
            }
            let message = ChatMessage {
                id: MessageRef::Server(push.message_id.clone()),
                conversation: push.conversation_id.clone(),
                sender: push.sender_id.clone(),
                content: push.content.clone(),
                timestamp: push.timestamp,
                status,
            };
            if let Some(active) = self.active.as_mut() {
                active.messages.push(message.clone());
            }
            self.touch_summary(&push.conversation_id, &push.content, push.timestamp);
            self.stats.pushes_applied += 1;
            PushApplyOutcome::AppendedToActive { message }
        } else {
            if !first_sighting {
                self.stats.duplicates_ignored += 1;
                return PushApplyOutcome::Duplicate;
            }
            self.touch_summary(&push.conversation_id, &push.content, push.timestamp);
            let unread = match self.summaries.get_mut(&push.conversation_id) {
                Some(summary) => {
                    summary.unread = summary.unread.saturating_add(1);
                    summary.unread
                }
                None => 0,
            };
            self.unread_total = self.unread_total.saturating_add(1);
            self.stats.pushes_applied += 1;
            PushApplyOutcome::BackgroundConversation {
                conversation: push.conversation_id,
                message_id: push.message_id,
                unread,
                unread_total: self.unread_total,
            }
        }
    }

    /// Apply a delivered/read receipt by bare message id. The tracker is
    /// updated regardless of which conversation is active; the visible
    /// list is touched only if it holds the message. Returns the new
    /// status when something actually advanced.
    pub fn apply_receipt(
        &mut self,
        message_id: &MessageId,
        status: DeliveryStatus,
    ) -> Option<DeliveryStatus> {
        let advanced = self.tracker.observe(message_id, status)?;
        if let Some(active) = self.active.as_mut() {
            if let Some(message) = active
                .messages
                .iter_mut()
                .find(|m| m.id.server_id() == Some(message_id))
            {
                message.status = message.status.max(advanced);
            }
        }
        Some(advanced)
    }

    // ------------------------------------------------------------------
    // Read state
    // ------------------------------------------------------------------

    /// Optimistically mark messages in the active conversation read and
    /// produce the batch-call plan. Statuses only advance; they are never
    /// rolled back if the call later fails.
    pub fn mark_read_local(&mut self, ids: &[MessageId]) -> Option<MarkReadPlan> {
        let conversation = self.active.as_ref()?.id.clone();
        let mut advanced = Vec::new();
        for id in ids {
            if self.tracker.observe(id, DeliveryStatus::Read).is_some() {
                advanced.push(id.clone());
            }
        }
        if let Some(active) = self.active.as_mut() {
            for message in active.messages.iter_mut() {
                if let Some(server_id) = message.id.server_id() {
                    if ids.contains(server_id) {
                        message.status = message.status.max(DeliveryStatus::Read);
                    }
                }
            }
        }
        Some(MarkReadPlan {
            conversation,
            requested: ids.to_vec(),
            advanced,
        })
    }

    /// Apply the server-confirmed read count. The decrement uses the
    /// server's number, never the requested batch size, and saturates at
    /// zero.
    pub fn apply_read_confirmation(
        &mut self,
        conversation: &ConversationId,
        updated: u32,
    ) -> ReadConfirmation {
        let conversation_unread = self.summaries.get_mut(conversation).map(|summary| {
            summary.unread = summary.unread.saturating_sub(updated);
            summary.unread
        });
        self.unread_total = self.unread_total.saturating_sub(updated);
        ReadConfirmation {
            conversation_unread,
            unread_total: self.unread_total,
        }
    }

    /// Overwrite the global unread total with the authoritative value.
    pub fn set_unread_total(&mut self, total: u32) -> u32 {
        self.unread_total = total;
        total
    }

    // ------------------------------------------------------------------
    // Queries and lifecycle
    // ------------------------------------------------------------------

    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.active.as_ref().map(|a| &a.id)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.active.as_ref().map_or(&[], |a| a.messages.as_slice())
    }

    pub fn has_more(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.has_more)
    }

    pub fn is_loading(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.phase == LoadPhase::Loading)
    }

    pub fn is_loading_more(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.loading_more)
    }

    pub fn load_failed(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.phase == LoadPhase::Failed)
    }

    pub fn unread_total(&self) -> u32 {
        self.unread_total
    }

    pub fn summary(&self, conversation: &ConversationId) -> Option<&ConversationSummary> {
        self.summaries.get(conversation)
    }

    /// Summaries newest-first, for a conversation list view.
    pub fn summaries_by_recency(&self) -> Vec<&ConversationSummary> {
        let mut summaries: Vec<&ConversationSummary> = self.summaries.values().collect();
        summaries.sort_by(|a, b| b.last_timestamp.cmp(&a.last_timestamp));
        summaries
    }

    pub fn delivery_status(&self, message_id: &MessageId) -> Option<DeliveryStatus> {
        self.tracker.status(message_id)
    }

    pub fn stats(&self) -> &ChatStoreStats {
        &self.stats
    }

    /// Clear everything (logout). Bumps the generation so any in-flight
    /// completion lands stale.
    pub fn reset(&mut self) {
        self.active = None;
        self.summaries.clear();
        self.tracker.clear();
        self.unread_total = 0;
        self.generation += 1;
    }

    fn touch_summary(&mut self, conversation: &ConversationId, content: &str, timestamp: Timestamp) {
        let preview_length = self.preview_length;
        let summary = self
            .summaries
            .entry(conversation.clone())
            .or_insert_with(|| ConversationSummary::new(conversation.clone()));
        summary.note_activity(content, timestamp, preview_length);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
