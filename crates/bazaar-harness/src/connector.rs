//! Scripted Push Connector
//!
//! A [`PushConnector`] whose behavior is written by the test: connection
//! attempts accept by default, rejections are queued per hub, and live
//! sessions receive frames, drops and closes on demand. Every attempt is
//! logged with the tokio clock so tests under `start_paused` can assert
//! exact backoff timelines.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

use bazaar_core::errors::ConnectError;
use bazaar_core::push::{PushConnector, PushSession};
use bazaar_core::types::HubKey;
use bazaar_core::PushFrame;

// ----------------------------------------------------------------------------
// Script Vocabulary
// ----------------------------------------------------------------------------

/// One logged call to `connect`.
#[derive(Debug, Clone)]
pub struct ConnectAttempt {
    pub hub: HubKey,
    /// Tokio clock at the attempt, for backoff-delta assertions.
    pub at: Instant,
    pub accepted: bool,
}

#[derive(Debug)]
enum ConnectPlan {
    Reject(ConnectError),
}

#[derive(Debug)]
enum SessionEvent {
    Frame(PushFrame),
    Drop(ConnectError),
    Close,
}

#[derive(Default)]
struct ConnectorShared {
    /// Queued deviations from the default accept, consumed per attempt.
    plans: Mutex<HashMap<HubKey, VecDeque<ConnectPlan>>>,
    /// Event senders for every session ever handed out, newest last.
    sessions: Mutex<HashMap<HubKey, Vec<mpsc::UnboundedSender<SessionEvent>>>>,
    attempts: Mutex<Vec<ConnectAttempt>>,
    /// `None` means every hub is supported.
    supported: Mutex<Option<HashSet<HubKey>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// Connector
// ----------------------------------------------------------------------------

/// Cloneable scripted connector. Clones share the script and the log, so
/// a test keeps one clone for driving while the engine owns another.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    shared: Arc<ConnectorShared>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare which hubs this connector supports; anything else is
    /// refused at the `supports` check, before any connect attempt.
    pub fn limit_support(&self, hubs: impl IntoIterator<Item = HubKey>) {
        *lock(&self.shared.supported) = Some(hubs.into_iter().collect());
    }

    /// Queue a rejection for the next attempt on `hub`. Later attempts
    /// fall back to accepting unless more rejections are queued.
    pub fn plan_reject(&self, hub: &HubKey, error: ConnectError) {
        lock(&self.shared.plans)
            .entry(hub.clone())
            .or_default()
            .push_back(ConnectPlan::Reject(error));
    }

    /// Queue `count` identical rejections.
    pub fn plan_rejects(&self, hub: &HubKey, count: usize, error: ConnectError) {
        for _ in 0..count {
            self.plan_reject(hub, error.clone());
        }
    }

    /// Deliver a frame on the most recent live session for `hub`.
    pub fn emit(&self, hub: &HubKey, frame: PushFrame) {
        self.send_event(hub, SessionEvent::Frame(frame));
    }

    /// Tear down the most recent session with an error, as a dropped
    /// connection would.
    pub fn drop_session(&self, hub: &HubKey, error: ConnectError) {
        self.send_event(hub, SessionEvent::Drop(error));
    }

    /// End the most recent session cleanly (server-side close).
    pub fn close_session(&self, hub: &HubKey) {
        self.send_event(hub, SessionEvent::Close);
    }

    /// All connect attempts so far, in order.
    pub fn connect_attempts(&self) -> Vec<ConnectAttempt> {
        lock(&self.shared.attempts).clone()
    }

    /// Connect attempts for one hub.
    pub fn attempts_for(&self, hub: &HubKey) -> Vec<ConnectAttempt> {
        lock(&self.shared.attempts)
            .iter()
            .filter(|attempt| &attempt.hub == hub)
            .cloned()
            .collect()
    }

    /// Number of sessions for `hub` whose receiving side is still alive.
    pub fn live_sessions(&self, hub: &HubKey) -> usize {
        lock(&self.shared.sessions)
            .get(hub)
            .map_or(0, |senders| senders.iter().filter(|tx| !tx.is_closed()).count())
    }

    fn send_event(&self, hub: &HubKey, event: SessionEvent) {
        let sessions = lock(&self.shared.sessions);
        let delivered = sessions
            .get(hub)
            .and_then(|senders| senders.last())
            .is_some_and(|tx| tx.send(event).is_ok());
        if !delivered {
            warn!(hub = %hub, "no live session to deliver scripted event");
        }
    }
}

#[async_trait]
impl PushConnector for ScriptedConnector {
    fn supports(&self, hub: &HubKey) -> bool {
        match lock(&self.shared.supported).as_ref() {
            Some(supported) => supported.contains(hub),
            None => true,
        }
    }

    async fn connect(&self, hub: &HubKey) -> Result<Box<dyn PushSession>, ConnectError> {
        let plan = lock(&self.shared.plans)
            .get_mut(hub)
            .and_then(|queue| queue.pop_front());
        let accepted = plan.is_none();
        lock(&self.shared.attempts).push(ConnectAttempt {
            hub: hub.clone(),
            at: Instant::now(),
            accepted,
        });
        match plan {
            Some(ConnectPlan::Reject(error)) => Err(error),
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                lock(&self.shared.sessions)
                    .entry(hub.clone())
                    .or_default()
                    .push(tx);
                Ok(Box::new(ScriptedSession { events: rx }))
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

struct ScriptedSession {
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

#[async_trait]
impl PushSession for ScriptedSession {
    async fn next_frame(&mut self) -> Result<Option<PushFrame>, ConnectError> {
        match self.events.recv().await {
            Some(SessionEvent::Frame(frame)) => Ok(Some(frame)),
            Some(SessionEvent::Drop(error)) => Err(error),
            Some(SessionEvent::Close) | None => Ok(None),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn accepts_by_default_and_delivers_frames() {
        let connector = ScriptedConnector::new();
        let hub = HubKey::chat();

        let mut session = connector.connect(&hub).await.unwrap();
        connector.emit(&hub, PushFrame::new("ev", json!({"k": 1})));

        let frame = session.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.event, "ev");
        assert_eq!(connector.connect_attempts().len(), 1);
        assert!(connector.connect_attempts()[0].accepted);
    }

    #[tokio::test]
    async fn queued_rejections_are_consumed_in_order() {
        let connector = ScriptedConnector::new();
        let hub = HubKey::chat();
        connector.plan_reject(&hub, ConnectError::unreachable("down"));

        assert!(connector.connect(&hub).await.is_err());
        assert!(connector.connect(&hub).await.is_ok());

        let attempts = connector.attempts_for(&hub);
        assert_eq!(attempts.len(), 2);
        assert!(!attempts[0].accepted);
        assert!(attempts[1].accepted);
    }

    #[tokio::test]
    async fn drop_and_close_end_the_session_differently() {
        let connector = ScriptedConnector::new();
        let hub = HubKey::notifications();

        let mut dropped = connector.connect(&hub).await.unwrap();
        connector.drop_session(&hub, ConnectError::dropped("gone"));
        assert!(dropped.next_frame().await.is_err());

        let mut closed = connector.connect(&hub).await.unwrap();
        connector.close_session(&hub);
        assert!(matches!(closed.next_frame().await, Ok(None)));
    }

    #[tokio::test]
    async fn support_restriction_applies() {
        let connector = ScriptedConnector::new();
        connector.limit_support([HubKey::chat()]);
        assert!(connector.supports(&HubKey::chat()));
        assert!(!connector.supports(&HubKey::live_score()));
    }
}
