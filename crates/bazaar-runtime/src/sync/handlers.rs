//! Dispatch Handlers
//!
//! Static handlers that map each sync task input (command, push frame,
//! completion, connection status, poll tick) onto store operations. A
//! handler mutates [`SyncState`] and returns the effects to execute plus
//! the app events to forward. Handlers never perform I/O themselves,
//! which keeps every reconciliation rule testable without a runtime.

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use bazaar_core::api::{MessagePage, NotificationPage, ReadOutcome, ReadSelection, SendReceipt};
use bazaar_core::channel::{
    event_names, AppEvent, Command, Completion, ConnectionStatus, Effect, PageKind, PushFrame,
    ScoreFetchOrigin,
};
use bazaar_core::delivery::DeliveryStatus;
use bazaar_core::errors::ApiError;
use bazaar_core::push::{MessagePush, NotificationPush, ReceiptPush, ScorePush, UnreadCountPush};
use bazaar_core::score::ScoreSnapshot;
use bazaar_core::store::{
    LoadMoreOutcome, OpenOutcome, PollTransition, PushApplyOutcome, SendResolution, WatchOutcome,
};
use bazaar_core::types::{ConversationId, ListingId, LocalId, MessageId};

use super::state::SyncState;

/// Effects to execute plus app events to forward, produced by one input.
pub type Dispatch = (Vec<Effect>, Vec<AppEvent>);

fn nothing() -> Dispatch {
    (Vec::new(), Vec::new())
}

/// Stateless dispatch logic for the sync task.
pub struct SyncHandlers;

impl SyncHandlers {
    // ---- Commands ----

    pub fn handle_command(state: &mut SyncState, command: Command) -> Dispatch {
        match command {
            Command::OpenConversation { conversation } => {
                Self::open_conversation(state, conversation)
            }
            Command::SendMessage { content } => Self::send_message(state, content),
            Command::MarkMessagesRead { ids } => Self::mark_messages_read(state, ids),
            Command::LoadOlderMessages => Self::load_older_messages(state),
            Command::RefreshUnreadTotal => (vec![Effect::FetchUnreadTotal], Vec::new()),
            Command::LoadNotifications => Self::load_notifications(state),
            Command::MarkNotificationsRead { selection } => {
                Self::mark_notifications_read(state, selection)
            }
            Command::WatchListing { listing } => Self::watch_listing(state, listing),
            Command::Reset => Self::reset(state),
            // Intercepted by the task loop before dispatch.
            Command::Shutdown => nothing(),
        }
    }

    fn open_conversation(state: &mut SyncState, conversation: ConversationId) -> Dispatch {
        match state.chat.open_conversation(conversation.clone()) {
            OpenOutcome::AlreadyActive => {
                debug!(%conversation, "conversation already active");
                nothing()
            }
            OpenOutcome::FetchNeeded { generation } => (
                vec![Effect::FetchMessages {
                    conversation,
                    cursor: None,
                    kind: PageKind::Initial,
                    generation,
                }],
                Vec::new(),
            ),
        }
    }

    fn send_message(state: &mut SyncState, content: String) -> Dispatch {
        if content.trim().is_empty() {
            debug!("blank message send ignored");
            return nothing();
        }
        let now = state.now();
        match state.chat.begin_send(&state.self_user, &content, now) {
            Some((local_id, message)) => (
                vec![Effect::DispatchSend {
                    conversation: message.conversation.clone(),
                    local_id,
                    content,
                }],
                vec![AppEvent::MessageAppended { message }],
            ),
            None => (
                Vec::new(),
                vec![AppEvent::SystemError {
                    error: "cannot send a message without an active conversation".to_string(),
                }],
            ),
        }
    }

    fn mark_messages_read(state: &mut SyncState, ids: Vec<MessageId>) -> Dispatch {
        if ids.is_empty() {
            return nothing();
        }
        match state.chat.mark_read_local(&ids) {
            Some(plan) => {
                let events = plan
                    .advanced
                    .iter()
                    .map(|id| AppEvent::DeliveryStatusChanged {
                        message_id: id.clone(),
                        status: DeliveryStatus::Read,
                    })
                    .collect();
                (
                    vec![Effect::PushReadReceipts {
                        conversation: plan.conversation,
                        ids: plan.requested,
                    }],
                    events,
                )
            }
            None => {
                debug!("mark-as-read with no active conversation ignored");
                nothing()
            }
        }
    }

    fn load_older_messages(state: &mut SyncState) -> Dispatch {
        match state.chat.begin_load_more() {
            LoadMoreOutcome::FetchNeeded {
                conversation,
                cursor,
                generation,
            } => (
                vec![Effect::FetchMessages {
                    conversation,
                    cursor: Some(cursor),
                    kind: PageKind::Older,
                    generation,
                }],
                Vec::new(),
            ),
            LoadMoreOutcome::Busy => {
                debug!("page load already in flight");
                nothing()
            }
            LoadMoreOutcome::NoMore => {
                debug!("history exhausted, load-more ignored");
                nothing()
            }
            LoadMoreOutcome::NoConversation => {
                debug!("load-more with no active conversation ignored");
                nothing()
            }
        }
    }

    fn load_notifications(state: &mut SyncState) -> Dispatch {
        let top = state.config.notifications.initial_top;
        match state.notifications.begin_initial_load(top) {
            Some(top) => (vec![Effect::FetchNotifications { top }], Vec::new()),
            None => {
                debug!("notification list already loaded or loading");
                nothing()
            }
        }
    }

    fn mark_notifications_read(state: &mut SyncState, selection: ReadSelection) -> Dispatch {
        let unread = state.notifications.mark_read(&selection);
        (
            vec![Effect::PushNotificationsRead { selection }],
            vec![AppEvent::NotificationUnreadChanged { unread }],
        )
    }

    fn watch_listing(state: &mut SyncState, listing: Option<ListingId>) -> Dispatch {
        match state.score.watch(listing) {
            WatchOutcome::Started { listing, epoch, .. } => (
                vec![Effect::RecalculateScore {
                    listing,
                    epoch,
                    origin: ScoreFetchOrigin::Initial,
                }],
                Vec::new(),
            ),
            WatchOutcome::Cleared { .. } | WatchOutcome::Unchanged => nothing(),
        }
    }

    fn reset(state: &mut SyncState) -> Dispatch {
        state.chat.reset();
        state.notifications.reset();
        state.score.reset();
        info!("engine state reset");
        (Vec::new(), vec![AppEvent::StateReset])
    }

    // ---- Push frames ----

    pub fn handle_chat_frame(state: &mut SyncState, frame: PushFrame) -> Dispatch {
        match frame.event.as_str() {
            event_names::MESSAGE_RECEIVED => {
                let Some(push) = Self::decoded::<MessagePush>(state, &frame) else {
                    return nothing();
                };
                Self::apply_message_push(state, push)
            }
            event_names::MESSAGE_DELIVERED => {
                let Some(push) = Self::decoded::<ReceiptPush>(state, &frame) else {
                    return nothing();
                };
                Self::apply_receipt_push(state, push, DeliveryStatus::Delivered)
            }
            event_names::MESSAGE_READ => {
                let Some(push) = Self::decoded::<ReceiptPush>(state, &frame) else {
                    return nothing();
                };
                Self::apply_receipt_push(state, push, DeliveryStatus::Read)
            }
            other => {
                debug!(event = other, "unhandled chat hub event");
                nothing()
            }
        }
    }

    fn apply_message_push(state: &mut SyncState, push: MessagePush) -> Dispatch {
        match state.chat.apply_push_message(&state.self_user, push) {
            PushApplyOutcome::SuppressedOwnEcho => {
                debug!("own message echo suppressed");
                nothing()
            }
            PushApplyOutcome::Duplicate => nothing(),
            PushApplyOutcome::AppendedToActive { message } => {
                let mut effects = Vec::new();
                if let Some(id) = message.id.server_id() {
                    effects.push(Effect::PushDeliveredReceipts {
                        conversation: message.conversation.clone(),
                        ids: vec![id.clone()],
                    });
                }
                (effects, vec![AppEvent::MessageAppended { message }])
            }
            PushApplyOutcome::BackgroundConversation {
                conversation,
                message_id,
                unread,
                unread_total,
            } => (
                vec![Effect::PushDeliveredReceipts {
                    conversation: conversation.clone(),
                    ids: vec![message_id],
                }],
                vec![
                    AppEvent::ConversationUnreadChanged {
                        conversation,
                        unread,
                    },
                    AppEvent::UnreadTotalChanged {
                        total: unread_total,
                    },
                ],
            ),
        }
    }

    fn apply_receipt_push(
        state: &mut SyncState,
        push: ReceiptPush,
        status: DeliveryStatus,
    ) -> Dispatch {
        match state.chat.apply_receipt(&push.message_id, status) {
            Some(advanced) => (
                Vec::new(),
                vec![AppEvent::DeliveryStatusChanged {
                    message_id: push.message_id,
                    status: advanced,
                }],
            ),
            // Unknown message or a regression, either way ignored.
            None => nothing(),
        }
    }

    pub fn handle_notification_frame(state: &mut SyncState, frame: PushFrame) -> Dispatch {
        match frame.event.as_str() {
            event_names::NEW_NOTIFICATION => {
                let Some(push) = Self::decoded::<NotificationPush>(state, &frame) else {
                    return nothing();
                };
                let received_at = state.now();
                match state.notifications.apply_push(push, received_at) {
                    Some(notification) => {
                        let notification = notification.clone();
                        let unread = state.notifications.unread();
                        (
                            Vec::new(),
                            vec![
                                AppEvent::NotificationArrived { notification },
                                AppEvent::NotificationUnreadChanged { unread },
                            ],
                        )
                    }
                    None => nothing(),
                }
            }
            event_names::UNREAD_COUNT_UPDATE => {
                let Some(push) = Self::decoded::<UnreadCountPush>(state, &frame) else {
                    return nothing();
                };
                let unread = state.notifications.apply_unread_count(push.count);
                (
                    Vec::new(),
                    vec![AppEvent::NotificationUnreadChanged { unread }],
                )
            }
            other => {
                debug!(event = other, "unhandled notification hub event");
                nothing()
            }
        }
    }

    pub fn handle_score_frame(state: &mut SyncState, frame: PushFrame) -> Dispatch {
        match frame.event.as_str() {
            event_names::SCORE_UPDATE => {
                let Some(push) = Self::decoded::<ScorePush>(state, &frame) else {
                    return nothing();
                };
                match state.score.apply_push(push) {
                    Some(snapshot) => match state.score.listing().cloned() {
                        Some(listing) => {
                            (Vec::new(), vec![AppEvent::ScoreChanged { listing, snapshot }])
                        }
                        None => nothing(),
                    },
                    None => {
                        debug!("score push without a watched listing ignored");
                        nothing()
                    }
                }
            }
            other => {
                debug!(event = other, "unhandled score hub event");
                nothing()
            }
        }
    }

    fn decoded<T: DeserializeOwned>(state: &mut SyncState, frame: &PushFrame) -> Option<T> {
        match frame.decode::<T>() {
            Ok(payload) => Some(payload),
            Err(error) => {
                state.stats.frames_undecodable += 1;
                warn!(event = %frame.event, %error, "dropping undecodable push payload");
                None
            }
        }
    }

    // ---- Completions ----

    pub fn handle_completion(state: &mut SyncState, completion: Completion) -> Dispatch {
        match completion {
            Completion::MessagesFetched {
                conversation,
                kind,
                generation,
                result,
            } => Self::messages_fetched(state, conversation, kind, generation, result),
            Completion::SendResolved {
                conversation,
                local_id,
                result,
            } => Self::send_resolved(state, conversation, local_id, result),
            Completion::ReadAcknowledged {
                conversation,
                result,
            } => Self::read_acknowledged(state, conversation, result),
            Completion::UnreadTotalFetched { result } => match result {
                Ok(total) => {
                    let total = state.chat.set_unread_total(total);
                    (Vec::new(), vec![AppEvent::UnreadTotalChanged { total }])
                }
                Err(error) => {
                    debug!(%error, "unread total fetch failed");
                    nothing()
                }
            },
            Completion::NotificationsFetched { result } => {
                Self::notifications_fetched(state, result)
            }
            Completion::ScoreResolved {
                listing,
                epoch,
                origin,
                result,
            } => Self::score_resolved(state, listing, epoch, origin, result),
        }
    }

    fn messages_fetched(
        state: &mut SyncState,
        conversation: ConversationId,
        kind: PageKind,
        generation: u64,
        result: Result<MessagePage, ApiError>,
    ) -> Dispatch {
        match (kind, result) {
            (PageKind::Initial, Ok(page)) => {
                match state.chat.apply_initial_page(&conversation, generation, page) {
                    Some(view) => (
                        Vec::new(),
                        vec![AppEvent::ConversationLoaded {
                            conversation,
                            messages: view.messages,
                            has_more: view.has_more,
                        }],
                    ),
                    None => {
                        debug!(%conversation, "stale history page discarded");
                        nothing()
                    }
                }
            }
            (PageKind::Initial, Err(error)) => {
                if state.chat.fail_initial_page(&conversation, generation) {
                    warn!(%conversation, %error, "conversation history load failed");
                    let retryable = error.is_retryable();
                    (
                        Vec::new(),
                        vec![AppEvent::ConversationLoadFailed {
                            conversation,
                            error: error.to_string(),
                            retryable,
                        }],
                    )
                } else {
                    nothing()
                }
            }
            (PageKind::Older, Ok(page)) => {
                match state.chat.apply_older_page(&conversation, generation, page) {
                    Some(view) => (
                        Vec::new(),
                        vec![AppEvent::OlderMessagesLoaded {
                            conversation,
                            prepended: view.prepended,
                            has_more: view.has_more,
                        }],
                    ),
                    None => {
                        debug!(%conversation, "stale older page discarded");
                        nothing()
                    }
                }
            }
            (PageKind::Older, Err(error)) => {
                // Silent for the UI, the in-flight flag clears and the
                // next scroll retries.
                if state.chat.fail_older_page(&conversation, generation) {
                    warn!(%conversation, %error, "older history page failed");
                }
                nothing()
            }
        }
    }

    fn send_resolved(
        state: &mut SyncState,
        conversation: ConversationId,
        local_id: LocalId,
        result: Result<SendReceipt, ApiError>,
    ) -> Dispatch {
        match result {
            Ok(receipt) => match state.chat.resolve_send_success(&conversation, local_id, &receipt)
            {
                SendResolution::Swapped { .. } => (
                    Vec::new(),
                    vec![AppEvent::MessageConfirmed {
                        conversation,
                        local_id,
                        message_id: receipt.message_id,
                        timestamp: receipt.timestamp,
                    }],
                ),
                SendResolution::TrackedOnly => {
                    debug!(%conversation, %local_id, "send confirmed after the entry left the view");
                    nothing()
                }
            },
            Err(error) => {
                let removed = state.chat.resolve_send_failure(&conversation, local_id);
                warn!(%conversation, %local_id, %error, removed, "message send failed");
                (
                    Vec::new(),
                    vec![AppEvent::MessageSendFailed {
                        conversation,
                        local_id,
                        error: error.to_string(),
                    }],
                )
            }
        }
    }

    fn read_acknowledged(
        state: &mut SyncState,
        conversation: ConversationId,
        result: Result<ReadOutcome, ApiError>,
    ) -> Dispatch {
        match result {
            Ok(outcome) => {
                let confirmation = state.chat.apply_read_confirmation(&conversation, outcome.updated);
                let mut events = Vec::new();
                if let Some(unread) = confirmation.conversation_unread {
                    events.push(AppEvent::ConversationUnreadChanged {
                        conversation,
                        unread,
                    });
                }
                events.push(AppEvent::UnreadTotalChanged {
                    total: confirmation.unread_total,
                });
                (Vec::new(), events)
            }
            Err(error) => {
                // Local read marks stay, the server call is retried on
                // the next mark.
                debug!(%conversation, %error, "mark-as-read call failed");
                nothing()
            }
        }
    }

    fn notifications_fetched(
        state: &mut SyncState,
        result: Result<NotificationPage, ApiError>,
    ) -> Dispatch {
        match result {
            Ok(page) => {
                let view = state.notifications.apply_initial_page(page);
                (
                    Vec::new(),
                    vec![
                        AppEvent::NotificationsLoaded {
                            count: view.count,
                            unread: view.unread,
                        },
                        AppEvent::NotificationUnreadChanged { unread: view.unread },
                    ],
                )
            }
            Err(error) => {
                state.notifications.fail_initial_load();
                warn!(%error, "notification load failed");
                (
                    Vec::new(),
                    vec![AppEvent::NotificationLoadFailed {
                        error: error.to_string(),
                        retryable: error.is_retryable(),
                    }],
                )
            }
        }
    }

    fn score_resolved(
        state: &mut SyncState,
        listing: ListingId,
        epoch: u64,
        origin: ScoreFetchOrigin,
        result: Result<ScoreSnapshot, ApiError>,
    ) -> Dispatch {
        match result {
            Ok(snapshot) => match state.score.apply_snapshot(&listing, epoch, snapshot) {
                Some(applied) => (
                    Vec::new(),
                    vec![AppEvent::ScoreChanged {
                        listing,
                        snapshot: applied,
                    }],
                ),
                None => {
                    debug!(%listing, "stale score recalculation discarded");
                    nothing()
                }
            },
            Err(error) => match origin {
                ScoreFetchOrigin::Initial => {
                    warn!(%listing, %error, "score fetch failed");
                    (
                        Vec::new(),
                        vec![AppEvent::ScoreLoadFailed {
                            listing,
                            error: error.to_string(),
                            retryable: error.is_retryable(),
                        }],
                    )
                }
                ScoreFetchOrigin::Poll => {
                    debug!(%listing, %error, "score poll failed, next tick retries");
                    nothing()
                }
            },
        }
    }

    // ---- Connection status and polling ----

    pub fn handle_score_status(state: &mut SyncState, status: ConnectionStatus) -> Dispatch {
        match state.score.set_connection_status(status) {
            PollTransition::Started => {
                info!("score hub degraded, polling fallback starts");
                if let Some(listing) = state.score.listing().cloned() {
                    (
                        vec![Effect::RecalculateScore {
                            listing,
                            epoch: state.score.epoch(),
                            origin: ScoreFetchOrigin::Poll,
                        }],
                        Vec::new(),
                    )
                } else {
                    nothing()
                }
            }
            PollTransition::Stopped => {
                info!("score hub recovered, polling fallback stops");
                nothing()
            }
            PollTransition::Unchanged => nothing(),
        }
    }

    pub fn handle_poll_tick(state: &mut SyncState) -> Dispatch {
        if !state.score.is_polling() {
            return nothing();
        }
        match state.score.listing().cloned() {
            Some(listing) => (
                vec![Effect::RecalculateScore {
                    listing,
                    epoch: state.score.epoch(),
                    origin: ScoreFetchOrigin::Poll,
                }],
                Vec::new(),
            ),
            None => nothing(),
        }
    }
}
