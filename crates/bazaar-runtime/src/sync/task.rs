//! Sync Task
//!
//! The engine's single event loop. The task owns [`SyncState`] and
//! multiplexes every input source: consumer commands, push frames from
//! the three hub subscriptions, REST completions, the score hub's
//! connection status, and the score polling interval. Each input goes
//! through [`SyncHandlers`]; returned effects are spawned as REST calls
//! that report back on the internal completion channel, and returned app
//! events are forwarded to the consumer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use bazaar_core::api::{ChatApi, NotificationApi, ScoreApi};
use bazaar_core::channel::{
    create_completion_channel, AppEvent, AppEventSender, Command, CommandReceiver, Completion,
    CompletionReceiver, CompletionSender, Effect, StatusReceiver, SyncStatus,
};

use crate::connection::HubSubscription;

use super::handlers::{Dispatch, SyncHandlers};
use super::state::SyncState;

// ----------------------------------------------------------------------------
// REST Collaborators
// ----------------------------------------------------------------------------

/// The service clients the task executes effects against.
#[derive(Clone)]
pub struct SyncApis {
    pub chat: Arc<dyn ChatApi>,
    pub notifications: Arc<dyn NotificationApi>,
    pub score: Arc<dyn ScoreApi>,
}

// ----------------------------------------------------------------------------
// Sync Task
// ----------------------------------------------------------------------------

/// The event loop. Owns all mutable engine state; everything else talks
/// to it through channels.
pub struct SyncTask {
    state: SyncState,
    commands: CommandReceiver,
    completions: CompletionReceiver,
    completion_tx: CompletionSender,
    app_events: AppEventSender,
    chat: HubSubscription,
    notifications: HubSubscription,
    score: HubSubscription,
    score_status: StatusReceiver,
    score_status_closed: bool,
    score_sync_tx: watch::Sender<SyncStatus>,
    published_score_sync: SyncStatus,
    poll: Option<Interval>,
    poll_interval: Duration,
    apis: SyncApis,
    running: bool,
}

impl SyncTask {
    pub fn new(
        state: SyncState,
        commands: CommandReceiver,
        app_events: AppEventSender,
        chat: HubSubscription,
        notifications: HubSubscription,
        score: HubSubscription,
        score_sync_tx: watch::Sender<SyncStatus>,
        apis: SyncApis,
    ) -> Self {
        // The completion channel never leaves the task: effects are
        // spawned here and report back here.
        let (completion_tx, completions) = create_completion_channel(&state.config.channels);
        let score_status = score.status_receiver();
        let poll_interval = state.config.polling.interval;
        Self {
            state,
            commands,
            completions,
            completion_tx,
            app_events,
            chat,
            notifications,
            score,
            score_status,
            score_status_closed: false,
            score_sync_tx,
            published_score_sync: SyncStatus::Disconnected,
            poll: None,
            poll_interval,
            apis,
            running: true,
        }
    }

    /// Run until `Command::Shutdown` arrives or the command channel
    /// closes.
    pub async fn run(mut self) {
        info!("sync task started");

        while self.running {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) => {
                        info!("shutdown command received");
                        self.running = false;
                    }
                    Some(command) => {
                        self.state.stats.commands_processed += 1;
                        let batch = SyncHandlers::handle_command(&mut self.state, command);
                        self.finish_dispatch(batch).await;
                    }
                    None => {
                        info!("command channel closed, sync task stopping");
                        self.running = false;
                    }
                },

                maybe_frame = self.chat.next_frame() => {
                    if let Some(frame) = maybe_frame {
                        self.state.stats.frames_processed += 1;
                        let batch = SyncHandlers::handle_chat_frame(&mut self.state, frame);
                        self.finish_dispatch(batch).await;
                    }
                }

                maybe_frame = self.notifications.next_frame() => {
                    if let Some(frame) = maybe_frame {
                        self.state.stats.frames_processed += 1;
                        let batch = SyncHandlers::handle_notification_frame(&mut self.state, frame);
                        self.finish_dispatch(batch).await;
                    }
                }

                maybe_frame = self.score.next_frame() => {
                    if let Some(frame) = maybe_frame {
                        self.state.stats.frames_processed += 1;
                        let batch = SyncHandlers::handle_score_frame(&mut self.state, frame);
                        self.finish_dispatch(batch).await;
                    }
                }

                changed = self.score_status.changed(), if !self.score_status_closed => match changed {
                    Ok(()) => {
                        let status = *self.score_status.borrow_and_update();
                        let batch = SyncHandlers::handle_score_status(&mut self.state, status);
                        self.finish_dispatch(batch).await;
                    }
                    Err(_) => {
                        warn!("score status channel closed");
                        self.score_status_closed = true;
                    }
                },

                completion = self.completions.recv() => {
                    if let Some(completion) = completion {
                        self.state.stats.completions_processed += 1;
                        let batch = SyncHandlers::handle_completion(&mut self.state, completion);
                        self.finish_dispatch(batch).await;
                    }
                }

                _ = Self::poll_tick(&mut self.poll) => {
                    self.state.stats.poll_ticks += 1;
                    let batch = SyncHandlers::handle_poll_tick(&mut self.state);
                    self.finish_dispatch(batch).await;
                }
            }
        }

        info!(stats = ?self.state.stats, "sync task stopped");
    }

    /// Pending forever while polling is disarmed, so the select branch
    /// only fires when an interval exists.
    async fn poll_tick(poll: &mut Option<Interval>) {
        match poll {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    async fn finish_dispatch(&mut self, (effects, events): Dispatch) {
        for effect in effects {
            self.state.stats.effects_generated += 1;
            self.execute_effect(effect);
        }
        for event in events {
            self.forward(event).await;
        }
        self.reconcile_poll();
        self.refresh_score_sync().await;
    }

    async fn forward(&mut self, event: AppEvent) {
        self.state.stats.app_events_generated += 1;
        if self.app_events.send(event).await.is_err() {
            debug!("app event receiver dropped");
        }
    }

    /// Arm or disarm the polling interval to match the score store. The
    /// immediate fetch on transition is dispatched by the handler; the
    /// interval only carries the cadence, so its first tick is one full
    /// period out.
    fn reconcile_poll(&mut self) {
        let wants_poll = self.state.score.is_polling();
        match (&self.poll, wants_poll) {
            (None, true) => {
                let mut interval =
                    interval_at(Instant::now() + self.poll_interval, self.poll_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.poll = Some(interval);
                debug!(period = ?self.poll_interval, "score polling armed");
            }
            (Some(_), false) => {
                self.poll = None;
                debug!("score polling disarmed");
            }
            _ => {}
        }
    }

    async fn refresh_score_sync(&mut self) {
        let status = self.state.score.sync_status();
        if status != self.published_score_sync {
            self.published_score_sync = status;
            self.score_sync_tx.send_replace(status);
            self.forward(AppEvent::ScoreSyncStatusChanged { status }).await;
        }
    }

    /// Spawn one REST call per effect. Results come back as completions;
    /// fire-and-forget acknowledgements just log their failures.
    fn execute_effect(&self, effect: Effect) {
        match effect {
            Effect::FetchMessages {
                conversation,
                cursor,
                kind,
                generation,
            } => {
                let api = Arc::clone(&self.apis.chat);
                let completions = self.completion_tx.clone();
                tokio::spawn(async move {
                    let result = api.messages(&conversation, cursor.as_ref()).await;
                    let _ = completions
                        .send(Completion::MessagesFetched {
                            conversation,
                            kind,
                            generation,
                            result,
                        })
                        .await;
                });
            }
            Effect::DispatchSend {
                conversation,
                local_id,
                content,
            } => {
                let api = Arc::clone(&self.apis.chat);
                let completions = self.completion_tx.clone();
                tokio::spawn(async move {
                    let result = api.send_message(&conversation, &content).await;
                    let _ = completions
                        .send(Completion::SendResolved {
                            conversation,
                            local_id,
                            result,
                        })
                        .await;
                });
            }
            Effect::PushReadReceipts { conversation, ids } => {
                let api = Arc::clone(&self.apis.chat);
                let completions = self.completion_tx.clone();
                tokio::spawn(async move {
                    let result = api.mark_read(&conversation, &ids).await;
                    let _ = completions
                        .send(Completion::ReadAcknowledged {
                            conversation,
                            result,
                        })
                        .await;
                });
            }
            Effect::PushDeliveredReceipts { conversation, ids } => {
                let api = Arc::clone(&self.apis.chat);
                tokio::spawn(async move {
                    if let Err(error) = api.mark_delivered(&conversation, &ids).await {
                        debug!(%conversation, %error, "delivered receipt push failed");
                    }
                });
            }
            Effect::FetchUnreadTotal => {
                let api = Arc::clone(&self.apis.chat);
                let completions = self.completion_tx.clone();
                tokio::spawn(async move {
                    let result = api.unread_count().await;
                    let _ = completions
                        .send(Completion::UnreadTotalFetched { result })
                        .await;
                });
            }
            Effect::FetchNotifications { top } => {
                let api = Arc::clone(&self.apis.notifications);
                let completions = self.completion_tx.clone();
                tokio::spawn(async move {
                    let result = api.notifications(top).await;
                    let _ = completions
                        .send(Completion::NotificationsFetched { result })
                        .await;
                });
            }
            Effect::PushNotificationsRead { selection } => {
                let api = Arc::clone(&self.apis.notifications);
                tokio::spawn(async move {
                    if let Err(error) = api.mark_read(&selection).await {
                        debug!(%error, "notification read push failed");
                    }
                });
            }
            Effect::RecalculateScore {
                listing,
                epoch,
                origin,
            } => {
                let api = Arc::clone(&self.apis.score);
                let completions = self.completion_tx.clone();
                tokio::spawn(async move {
                    let result = api.recalculate(&listing).await;
                    let _ = completions
                        .send(Completion::ScoreResolved {
                            listing,
                            epoch,
                            origin,
                            result,
                        })
                        .await;
                });
            }
        }
    }
}
