//! Shared Test Fixtures
//!
//! A harness that assembles the engine over scripted collaborators, plus
//! waiters for app events and status transitions. All tests run under
//! `start_paused`, so the waiter timeouts are virtual time.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use bazaar_core::channel::{AppEvent, AppEventReceiver, ConnectionStatus, StatusReceiver, SyncStatus};
use bazaar_core::config::SyncConfig;
use bazaar_core::types::UserId;
use bazaar_harness::{
    InMemoryChatApi, InMemoryNotificationApi, InMemoryScoreApi, ScriptedConnector,
};
use bazaar_runtime::{SyncApis, SyncHandle, SyncRuntime};

/// How long waiters give the engine before failing the test.
pub const WAIT: Duration = Duration::from_secs(5);

/// The user the engine runs as in every test.
pub const SELF_USER: &str = "me";

// ----------------------------------------------------------------------------
// Test Harness
// ----------------------------------------------------------------------------

/// Scripted collaborators plus the runtime they feed. Keep the harness
/// alive for the whole test; its clones drive the engine's copies.
pub struct TestHarness {
    pub connector: ScriptedConnector,
    pub chat_api: InMemoryChatApi,
    pub notification_api: InMemoryNotificationApi,
    pub score_api: InMemoryScoreApi,
}

impl TestHarness {
    pub fn new() -> Self {
        // One subscriber per test process; later inits are no-ops.
        let _ = tracing_subscriber::fmt::try_init();
        Self {
            connector: ScriptedConnector::new(),
            chat_api: InMemoryChatApi::new(),
            notification_api: InMemoryNotificationApi::new(),
            score_api: InMemoryScoreApi::new(),
        }
    }

    /// Build and start a runtime over this harness. Connector plans
    /// staged before the call govern the very first connect attempts.
    pub async fn start(&self) -> (SyncRuntime, SyncHandle, AppEventReceiver) {
        self.start_with_config(SyncConfig::testing()).await
    }

    pub async fn start_with_config(
        &self,
        config: SyncConfig,
    ) -> (SyncRuntime, SyncHandle, AppEventReceiver) {
        let apis = SyncApis {
            chat: Arc::new(self.chat_api.clone()),
            notifications: Arc::new(self.notification_api.clone()),
            score: Arc::new(self.score_api.clone()),
        };
        let mut runtime = SyncRuntime::new(
            UserId::new(SELF_USER),
            config,
            Arc::new(self.connector.clone()),
            apis,
        )
        .expect("test configuration must validate");
        runtime.start().await.expect("runtime must start");
        let handle = runtime.handle().expect("running runtime has a handle");
        let events = runtime
            .take_app_events()
            .expect("app events not yet taken");
        (runtime, handle, events)
    }
}

// ----------------------------------------------------------------------------
// Waiters
// ----------------------------------------------------------------------------

/// Receive app events until one matches, discarding the rest.
pub async fn wait_for_event(
    events: &mut AppEventReceiver,
    mut predicate: impl FnMut(&AppEvent) -> bool,
) -> AppEvent {
    let matched = async {
        loop {
            match events.recv().await {
                Some(event) if predicate(&event) => return event,
                Some(_) => continue,
                None => panic!("app event channel closed while waiting"),
            }
        }
    };
    timeout(WAIT, matched)
        .await
        .expect("timed out waiting for app event")
}

/// Wait until a hub status watch reports `want`.
pub async fn wait_for_status(status: &mut StatusReceiver, want: ConnectionStatus) {
    let reached = async {
        loop {
            if *status.borrow_and_update() == want {
                return;
            }
            if status.changed().await.is_err() {
                panic!("status channel closed while waiting for {want}");
            }
        }
    };
    timeout(WAIT, reached)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for status {want}"));
}

/// Consume the score sync status churn a fresh engine emits while its
/// hubs connect, leaving the stream quiet for `assert_no_event`.
pub async fn drain_startup_events(events: &mut AppEventReceiver) {
    wait_for_event(events, |event| {
        matches!(
            event,
            AppEvent::ScoreSyncStatusChanged {
                status: SyncStatus::Connected,
            }
        )
    })
    .await;
}

/// Assert that no app event arrives within `window`.
pub async fn assert_no_event(events: &mut AppEventReceiver, window: Duration) {
    match timeout(window, events.recv()).await {
        Ok(Some(event)) => panic!("unexpected app event: {event:?}"),
        Ok(None) | Err(_) => {}
    }
}

/// Poll `condition` until it holds. Sleeps between polls so spawned REST
/// futures get to run and the paused clock can advance.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let satisfied = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    timeout(WAIT, satisfied)
        .await
        .expect("timed out waiting for condition");
}
