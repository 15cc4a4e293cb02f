//! Hub Connection Management
//!
//! One driver task per hub keeps its push connection alive through the
//! reconnect schedule, publishes the connection status on a watch
//! channel, and fans incoming frames out to subscribers by event name.
//!
//! Subscriptions are refcounted. The first subscription to a hub spawns
//! its driver; dropping the last one aborts the driver on the spot and
//! resets the status to disconnected, so no frame for a torn-down hub
//! is ever dispatched afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use bazaar_core::channel::{
    create_frame_channel, create_status_channel, ChannelStats, ConnectionStatus, FrameReceiver,
    FrameSender, NonBlockingSend, PushFrame, StatusReceiver, StatusSender,
};
use bazaar_core::config::{ChannelConfig, ReconnectConfig};
use bazaar_core::push::PushConnector;
use bazaar_core::types::HubKey;

// ----------------------------------------------------------------------------
// Event Router
// ----------------------------------------------------------------------------

struct RouteEntry {
    route: u64,
    tx: FrameSender,
}

/// Fan-out of one hub's frames to its subscribers, keyed by event name.
/// Dispatch never blocks: a saturated subscriber loses frames (counted
/// in the stats) rather than stalling the driver.
pub struct EventRouter {
    routes: DashMap<String, Vec<RouteEntry>>,
    next_route: AtomicU64,
    stats: ChannelStats,
}

impl EventRouter {
    pub fn new() -> Self {
        Self {
            routes: DashMap::new(),
            next_route: AtomicU64::new(1),
            stats: ChannelStats::new(),
        }
    }

    /// Register `tx` for each of `events`, returning the route id used
    /// to unregister the whole set.
    pub fn register(&self, events: &[&str], tx: FrameSender) -> u64 {
        let route = self.next_route.fetch_add(1, Ordering::Relaxed);
        for event in events {
            self.routes
                .entry((*event).to_string())
                .or_default()
                .push(RouteEntry {
                    route,
                    tx: tx.clone(),
                });
        }
        route
    }

    pub fn unregister(&self, route: u64) {
        self.routes.retain(|_, entries| {
            entries.retain(|entry| entry.route != route);
            !entries.is_empty()
        });
    }

    pub fn dispatch(&self, frame: &PushFrame) {
        let Some(entries) = self.routes.get(&frame.event) else {
            debug!(event = %frame.event, "frame without subscriber dropped");
            self.stats.record_dropped();
            return;
        };
        for entry in entries.iter() {
            match entry.tx.send_or_drop(frame.clone(), "push-frame") {
                Ok(()) => self.stats.record_sent(),
                Err(_) => self.stats.record_dropped(),
            }
        }
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Reconnect Machine
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrivePhase {
    /// No session has ever been established on this hub.
    Initial,
    /// A session was lost; the schedule is being walked from the top.
    Backoff,
    /// Schedule exhausted, or the very first attempt failed. Status is
    /// pinned to error while attempts keep firing at the tail delay.
    Probing,
    /// Fatal handshake rejection; no further attempts.
    Halted,
}

/// Pure reconnect state machine, one per hub driver. Decides the delay
/// before each attempt and which status changes to publish. Status only
/// ever leaves `error` through a successful connect, never by merely
/// retrying.
pub(crate) struct ReconnectMachine {
    reconnect: ReconnectConfig,
    phase: DrivePhase,
    attempt: u32,
}

impl ReconnectMachine {
    pub(crate) fn new(reconnect: ReconnectConfig) -> Self {
        Self {
            reconnect,
            phase: DrivePhase::Initial,
            attempt: 0,
        }
    }

    pub(crate) fn next_delay(&self) -> Duration {
        self.reconnect.delay_for_attempt(self.attempt)
    }

    /// Status to publish when an attempt begins, if any.
    pub(crate) fn on_attempt_started(&self) -> Option<ConnectionStatus> {
        match self.phase {
            DrivePhase::Initial | DrivePhase::Backoff => Some(ConnectionStatus::Connecting),
            DrivePhase::Probing | DrivePhase::Halted => None,
        }
    }

    pub(crate) fn on_connected(&mut self) -> ConnectionStatus {
        self.phase = DrivePhase::Backoff;
        self.attempt = 0;
        ConnectionStatus::Connected
    }

    /// An established session ended (server close or transport drop).
    /// Reconnection starts immediately and walks the whole schedule.
    pub(crate) fn on_session_ended(&mut self) -> ConnectionStatus {
        self.phase = DrivePhase::Backoff;
        self.attempt = 0;
        ConnectionStatus::Connecting
    }

    pub(crate) fn on_attempt_failed(&mut self, fatal: bool) -> Option<ConnectionStatus> {
        if fatal {
            self.phase = DrivePhase::Halted;
            return Some(ConnectionStatus::Error);
        }
        self.attempt = self.attempt.saturating_add(1);
        match self.phase {
            // A hub that cannot be reached at all shows error right
            // away, not after a full schedule pass.
            DrivePhase::Initial => {
                self.phase = DrivePhase::Probing;
                Some(ConnectionStatus::Error)
            }
            DrivePhase::Backoff => {
                if self.attempt >= self.reconnect.scheduled_attempts() {
                    self.phase = DrivePhase::Probing;
                    Some(ConnectionStatus::Error)
                } else {
                    None
                }
            }
            DrivePhase::Probing | DrivePhase::Halted => None,
        }
    }

    pub(crate) fn is_halted(&self) -> bool {
        self.phase == DrivePhase::Halted
    }
}

// ----------------------------------------------------------------------------
// Hub Driver
// ----------------------------------------------------------------------------

/// Publish only genuine changes so watchers are not woken for repeats.
fn publish(status: &StatusSender, next: ConnectionStatus) {
    status.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

async fn drive_hub(
    hub: HubKey,
    connector: Arc<dyn PushConnector>,
    mut machine: ReconnectMachine,
    status: Arc<StatusSender>,
    router: Arc<EventRouter>,
) {
    loop {
        let delay = machine.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(next) = machine.on_attempt_started() {
            publish(&status, next);
        }
        match connector.connect(&hub).await {
            Ok(mut session) => {
                publish(&status, machine.on_connected());
                info!(hub = %hub, "hub connected");
                loop {
                    match session.next_frame().await {
                        Ok(Some(frame)) => router.dispatch(&frame),
                        Ok(None) => {
                            info!(hub = %hub, "hub session closed by server");
                            break;
                        }
                        Err(error) => {
                            warn!(hub = %hub, %error, "hub session dropped");
                            break;
                        }
                    }
                }
                publish(&status, machine.on_session_ended());
            }
            Err(error) => {
                let fatal = error.is_fatal();
                warn!(hub = %hub, %error, fatal, "hub connect attempt failed");
                if let Some(next) = machine.on_attempt_failed(fatal) {
                    publish(&status, next);
                }
                if machine.is_halted() {
                    // Hold the error status until the hub is torn down.
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Connection Manager
// ----------------------------------------------------------------------------

struct HubEntry {
    driver: JoinHandle<()>,
    status_tx: Arc<StatusSender>,
    status_rx: StatusReceiver,
    router: Arc<EventRouter>,
    subscribers: usize,
}

/// Spawn/teardown counters across the manager's lifetime.
#[derive(Debug, Default)]
pub struct ManagerStats {
    hubs_spawned: AtomicU64,
    hubs_torn_down: AtomicU64,
}

impl ManagerStats {
    pub fn hubs_spawned(&self) -> u64 {
        self.hubs_spawned.load(Ordering::Relaxed)
    }

    pub fn hubs_torn_down(&self) -> u64 {
        self.hubs_torn_down.load(Ordering::Relaxed)
    }
}

struct ManagerShared {
    connector: Arc<dyn PushConnector>,
    reconnect: ReconnectConfig,
    channels: ChannelConfig,
    hubs: DashMap<HubKey, HubEntry>,
    stats: ManagerStats,
}

fn teardown(hub: &HubKey, entry: HubEntry, stats: &ManagerStats) {
    entry.driver.abort();
    publish(&entry.status_tx, ConnectionStatus::Disconnected);
    stats.hubs_torn_down.fetch_add(1, Ordering::Relaxed);
    debug!(hub = %hub, "hub driver torn down");
}

/// Owns every hub connection. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<ManagerShared>,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn PushConnector>,
        reconnect: ReconnectConfig,
        channels: ChannelConfig,
    ) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                connector,
                reconnect,
                channels,
                hubs: DashMap::new(),
                stats: ManagerStats::default(),
            }),
        }
    }

    /// Subscribe to `events` on `hub`. The first subscription spawns the
    /// hub's driver (so the caller must be inside a tokio runtime);
    /// later ones share it. An unsupported hub yields an inert
    /// subscription: no frames ever arrive and the status is pinned to
    /// disconnected.
    pub fn subscribe(&self, hub: &HubKey, events: &[&str]) -> HubSubscription {
        let (frame_tx, frame_rx) = create_frame_channel(&self.shared.channels);
        if !self.shared.connector.supports(hub) {
            debug!(hub = %hub, "connector does not support hub, subscription is inert");
            let (status_tx, status_rx) = create_status_channel();
            return HubSubscription {
                hub: hub.clone(),
                frames: frame_rx,
                status: status_rx,
                _frame_tx: frame_tx,
                _inert_status: Some(status_tx),
                _guard: None,
            };
        }
        let mut entry = self
            .shared
            .hubs
            .entry(hub.clone())
            .or_insert_with(|| self.spawn_hub(hub));
        entry.subscribers += 1;
        let route = entry.router.register(events, frame_tx.clone());
        HubSubscription {
            hub: hub.clone(),
            frames: frame_rx,
            status: entry.status_rx.clone(),
            _frame_tx: frame_tx,
            _inert_status: None,
            _guard: Some(HubGuard {
                hub: hub.clone(),
                route,
                router: Arc::clone(&entry.router),
                shared: Arc::clone(&self.shared),
            }),
        }
    }

    fn spawn_hub(&self, hub: &HubKey) -> HubEntry {
        let (status_tx, status_rx) = create_status_channel();
        let status_tx = Arc::new(status_tx);
        let router = Arc::new(EventRouter::new());
        let machine = ReconnectMachine::new(self.shared.reconnect.clone());
        let driver = tokio::spawn(drive_hub(
            hub.clone(),
            Arc::clone(&self.shared.connector),
            machine,
            Arc::clone(&status_tx),
            Arc::clone(&router),
        ));
        self.shared.stats.hubs_spawned.fetch_add(1, Ordering::Relaxed);
        debug!(hub = %hub, "hub driver spawned");
        HubEntry {
            driver,
            status_tx,
            status_rx,
            router,
            subscribers: 0,
        }
    }

    pub fn active_hubs(&self) -> usize {
        self.shared.hubs.len()
    }

    pub fn stats(&self) -> &ManagerStats {
        &self.shared.stats
    }

    /// Abort every driver. Engine stop calls this as a backstop; normal
    /// teardown happens through guard drops.
    pub fn shutdown(&self) {
        let keys: Vec<HubKey> = self
            .shared
            .hubs
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for hub in keys {
            if let Some((_, entry)) = self.shared.hubs.remove(&hub) {
                teardown(&hub, entry, &self.shared.stats);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Subscription
// ----------------------------------------------------------------------------

/// A live subscription to one hub: the frame stream for the requested
/// events plus the hub's status watch. Dropping it unregisters the
/// routes and, for the last subscriber, tears the connection down.
pub struct HubSubscription {
    hub: HubKey,
    frames: FrameReceiver,
    status: StatusReceiver,
    // Keeps the frame channel open so `next_frame` pends rather than
    // ending on inert subscriptions and during teardown.
    _frame_tx: FrameSender,
    // Inert subscriptions own their status sender so the watch never
    // closes; managed hubs keep theirs in the manager entry.
    _inert_status: Option<StatusSender>,
    _guard: Option<HubGuard>,
}

impl HubSubscription {
    pub fn hub(&self) -> &HubKey {
        &self.hub
    }

    /// Next routed frame. Pends forever on an inert subscription.
    pub async fn next_frame(&mut self) -> Option<PushFrame> {
        self.frames.recv().await
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn status_receiver(&self) -> StatusReceiver {
        self.status.clone()
    }
}

struct HubGuard {
    hub: HubKey,
    route: u64,
    router: Arc<EventRouter>,
    shared: Arc<ManagerShared>,
}

impl Drop for HubGuard {
    fn drop(&mut self) {
        self.router.unregister(self.route);
        match self.shared.hubs.entry(self.hub.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.subscribers = entry.subscribers.saturating_sub(1);
                if entry.subscribers == 0 {
                    let entry = occupied.remove();
                    teardown(&self.hub, entry, &self.shared.stats);
                }
            }
            Entry::Vacant(_) => {}
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_harness::ScriptedConnector;
    use tokio::time::timeout;

    fn machine() -> ReconnectMachine {
        // Testing schedule: [0ms, 10ms, 20ms].
        ReconnectMachine::new(ReconnectConfig::testing())
    }

    #[test]
    fn machine_walks_schedule_then_probes_at_tail() {
        let mut m = machine();
        assert_eq!(m.next_delay(), Duration::ZERO);
        assert_eq!(m.on_attempt_started(), Some(ConnectionStatus::Connecting));
        assert_eq!(m.on_connected(), ConnectionStatus::Connected);
        assert_eq!(m.on_session_ended(), ConnectionStatus::Connecting);

        // First retry is immediate, then the schedule escalates.
        assert_eq!(m.next_delay(), Duration::ZERO);
        assert_eq!(m.on_attempt_failed(false), None);
        assert_eq!(m.next_delay(), Duration::from_millis(10));
        assert_eq!(m.on_attempt_failed(false), None);
        assert_eq!(m.next_delay(), Duration::from_millis(20));

        // The pass ends with the schedule: status drops to error.
        assert_eq!(m.on_attempt_failed(false), Some(ConnectionStatus::Error));

        // Probing holds the tail delay and never republishes.
        assert_eq!(m.next_delay(), Duration::from_millis(20));
        assert_eq!(m.on_attempt_started(), None);
        assert_eq!(m.on_attempt_failed(false), None);
        assert_eq!(m.next_delay(), Duration::from_millis(20));
    }

    #[test]
    fn machine_initial_failure_is_error_immediately() {
        let mut m = machine();
        assert_eq!(m.on_attempt_started(), Some(ConnectionStatus::Connecting));
        assert_eq!(m.on_attempt_failed(false), Some(ConnectionStatus::Error));

        // Probes escalate the gap without leaving error, and recovery
        // jumps straight to connected.
        assert_eq!(m.next_delay(), Duration::from_millis(10));
        assert_eq!(m.on_attempt_started(), None);
        assert_eq!(m.on_connected(), ConnectionStatus::Connected);
    }

    #[test]
    fn machine_fatal_rejection_halts() {
        let mut m = machine();
        assert_eq!(m.on_attempt_failed(true), Some(ConnectionStatus::Error));
        assert!(m.is_halted());
        assert_eq!(m.on_attempt_started(), None);
        assert_eq!(m.on_attempt_failed(false), None);
    }

    #[test]
    fn machine_recovery_resets_the_schedule() {
        let mut m = machine();
        m.on_session_ended();
        m.on_attempt_failed(false);
        m.on_attempt_failed(false);
        m.on_attempt_failed(false);
        assert_eq!(m.next_delay(), Duration::from_millis(20));

        m.on_connected();
        assert_eq!(m.on_session_ended(), ConnectionStatus::Connecting);
        assert_eq!(m.next_delay(), Duration::ZERO);
        // A fresh pass errors only after the full schedule again.
        assert_eq!(m.on_attempt_failed(false), None);
        assert_eq!(m.on_attempt_failed(false), None);
        assert_eq!(m.on_attempt_failed(false), Some(ConnectionStatus::Error));
    }

    #[tokio::test]
    async fn router_counts_deliveries_and_forgets_unregistered_routes() {
        let router = EventRouter::new();
        let config = ChannelConfig::testing();
        let (tx, mut rx) = create_frame_channel(&config);

        let route = router.register(&["x"], tx);
        router.dispatch(&PushFrame::new("x", serde_json::json!({})));
        router.dispatch(&PushFrame::new("y", serde_json::json!({})));
        assert_eq!(router.stats().sent(), 1);
        assert_eq!(router.stats().dropped(), 1);
        assert!(rx.recv().await.is_some());

        router.unregister(route);
        router.dispatch(&PushFrame::new("x", serde_json::json!({})));
        assert_eq!(router.stats().sent(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn shared_hub_spawns_one_driver_and_tears_down_with_last_guard() {
        let connector = ScriptedConnector::new();
        let manager = ConnectionManager::new(
            Arc::new(connector.clone()),
            ReconnectConfig::testing(),
            ChannelConfig::testing(),
        );
        let hub = HubKey::chat();

        let first = manager.subscribe(&hub, &["a"]);
        let second = manager.subscribe(&hub, &["b"]);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(manager.stats().hubs_spawned(), 1);
        assert_eq!(connector.attempts_for(&hub).len(), 1);
        assert_eq!(first.status(), ConnectionStatus::Connected);

        drop(first);
        assert_eq!(manager.active_hubs(), 1);

        drop(second);
        assert_eq!(manager.active_hubs(), 0);
        assert_eq!(manager.stats().hubs_torn_down(), 1);

        // The aborted driver holds no session and never reattempts.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(connector.live_sessions(&hub), 0);
        assert_eq!(connector.attempts_for(&hub).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_route_by_event_name() {
        let connector = ScriptedConnector::new();
        let manager = ConnectionManager::new(
            Arc::new(connector.clone()),
            ReconnectConfig::testing(),
            ChannelConfig::testing(),
        );
        let hub = HubKey::notifications();
        let mut sub = manager.subscribe(&hub, &["wanted"]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connector.live_sessions(&hub), 1);

        connector.emit(&hub, PushFrame::new("wanted", serde_json::json!({ "n": 1 })));
        connector.emit(&hub, PushFrame::new("ignored", serde_json::json!({})));
        connector.emit(&hub, PushFrame::new("wanted", serde_json::json!({ "n": 2 })));

        let first = timeout(Duration::from_secs(1), sub.next_frame())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.payload["n"], 1);
        let second = timeout(Duration::from_secs(1), sub.next_frame())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.payload["n"], 2);

        // The unrouted frame was dropped, not buffered.
        assert!(timeout(Duration::from_millis(100), sub.next_frame())
            .await
            .is_err());
        assert_eq!(sub.hub(), &hub);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_hub_subscription_is_inert() {
        let connector = ScriptedConnector::new();
        connector.limit_support([HubKey::chat()]);
        let manager = ConnectionManager::new(
            Arc::new(connector.clone()),
            ReconnectConfig::testing(),
            ChannelConfig::testing(),
        );

        let mut sub = manager.subscribe(&HubKey::live_score(), &["scoreUpdate"]);
        assert_eq!(sub.status(), ConnectionStatus::Disconnected);
        assert_eq!(manager.active_hubs(), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(connector.attempts_for(&HubKey::live_score()).is_empty());
        assert!(timeout(Duration::from_millis(100), sub.next_frame())
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_every_driver() {
        let connector = ScriptedConnector::new();
        let manager = ConnectionManager::new(
            Arc::new(connector.clone()),
            ReconnectConfig::testing(),
            ChannelConfig::testing(),
        );
        let _chat = manager.subscribe(&HubKey::chat(), &["a"]);
        let _score = manager.subscribe(&HubKey::live_score(), &["b"]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.active_hubs(), 2);

        manager.shutdown();
        assert_eq!(manager.active_hubs(), 0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connector.live_sessions(&HubKey::chat()), 0);
        assert_eq!(connector.live_sessions(&HubKey::live_score()), 0);
    }
}
