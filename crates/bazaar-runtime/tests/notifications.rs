//! Notification Feed Integration Tests
//!
//! The feed loads once per session, then lives off push traffic: new
//! notifications prepend and bump the badge, server badge counts
//! overwrite it, and mark-read is optimistic with a fire-and-forget
//! confirmation.

mod common;

use std::time::Duration;

use bazaar_core::api::{NotificationPage, ReadSelection};
use bazaar_core::channel::{AppEvent, Command, ConnectionStatus};
use bazaar_core::errors::ApiError;
use bazaar_core::notification::Notification;
use bazaar_core::types::{HubKey, NotificationId, Timestamp};
use bazaar_harness::{frames, NotificationCall};
use bazaar_runtime::SyncHandle;

use common::{
    assert_no_event, drain_startup_events, wait_for_event, wait_for_status, wait_until,
    TestHarness,
};

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn feed_item(id: &str, title: &str) -> Notification {
    Notification {
        id: NotificationId::new(id),
        kind: "offer".to_string(),
        title: title.to_string(),
        body: String::new(),
        action_url: None,
        is_read: false,
        created_at: Timestamp::from_millis(1),
    }
}

fn feed_page(items: Vec<Notification>, unread_count: u32) -> NotificationPage {
    NotificationPage {
        total: items.len() as u32,
        items,
        has_more: false,
        unread_count,
    }
}

async fn notifications_connected(handle: &SyncHandle) {
    let mut status = handle.notification_status_receiver();
    wait_for_status(&mut status, ConnectionStatus::Connected).await;
}

// ----------------------------------------------------------------------------
// Initial Load
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_notifications_load_once_per_session() {
    let harness = TestHarness::new();
    harness.notification_api.stage_fetch(Ok(feed_page(
        vec![
            feed_item("n1", "Offer received"),
            feed_item("n2", "Price drop"),
        ],
        3,
    )));
    let (_runtime, handle, mut events) = harness.start().await;
    drain_startup_events(&mut events).await;

    handle.send(Command::LoadNotifications).await.unwrap();
    let event = wait_for_event(&mut events, |event| {
        matches!(event, AppEvent::NotificationsLoaded { .. })
    })
    .await;
    assert_eq!(event, AppEvent::NotificationsLoaded { count: 2, unread: 3 });
    let event = wait_for_event(&mut events, |event| {
        matches!(event, AppEvent::NotificationUnreadChanged { .. })
    })
    .await;
    assert_eq!(event, AppEvent::NotificationUnreadChanged { unread: 3 });

    // Further requests are no-ops while the feed is loaded.
    handle.send(Command::LoadNotifications).await.unwrap();
    assert_no_event(&mut events, Duration::from_millis(50)).await;
    assert_eq!(harness.notification_api.fetch_count(), 1);

    // The testing profile asks for a small first page.
    assert!(harness
        .notification_api
        .calls()
        .iter()
        .any(|call| matches!(call, NotificationCall::Fetch { top: 5 })));
}

#[tokio::test(start_paused = true)]
async fn test_failed_notification_load_can_be_retried() {
    let harness = TestHarness::new();
    harness
        .notification_api
        .stage_fetch(Err(ApiError::transport("socket hangup")));
    let (_runtime, handle, mut events) = harness.start().await;

    handle.send(Command::LoadNotifications).await.unwrap();
    let event = wait_for_event(&mut events, |event| {
        matches!(event, AppEvent::NotificationLoadFailed { .. })
    })
    .await;
    let AppEvent::NotificationLoadFailed { retryable, .. } = event else {
        unreachable!()
    };
    assert!(retryable);

    // The failure left the store unloaded, so the next request fetches.
    handle.send(Command::LoadNotifications).await.unwrap();
    wait_for_event(&mut events, |event| {
        matches!(event, AppEvent::NotificationsLoaded { .. })
    })
    .await;
    assert_eq!(harness.notification_api.fetch_count(), 2);
}

// ----------------------------------------------------------------------------
// Push Traffic
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_pushed_notification_prepends_and_bumps_badge() {
    let harness = TestHarness::new();
    let (_runtime, handle, mut events) = harness.start().await;
    drain_startup_events(&mut events).await;
    let hub = HubKey::notifications();
    notifications_connected(&handle).await;

    harness.connector.emit(
        &hub,
        frames::notification("n1", "offer", "New offer", "u2 offered 120"),
    );
    let event = wait_for_event(&mut events, |event| {
        matches!(event, AppEvent::NotificationArrived { .. })
    })
    .await;
    let AppEvent::NotificationArrived { notification } = event else {
        unreachable!()
    };
    assert_eq!(notification.id, NotificationId::new("n1"));
    assert_eq!(notification.kind, "offer");
    assert_eq!(notification.title, "New offer");
    assert!(!notification.is_read);
    let event = wait_for_event(&mut events, |event| {
        matches!(event, AppEvent::NotificationUnreadChanged { .. })
    })
    .await;
    assert_eq!(event, AppEvent::NotificationUnreadChanged { unread: 1 });

    // The same notification pushed again changes nothing.
    harness.connector.emit(
        &hub,
        frames::notification("n1", "offer", "New offer", "u2 offered 120"),
    );
    assert_no_event(&mut events, Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn test_server_badge_count_overwrites_local_arithmetic() {
    let harness = TestHarness::new();
    let (_runtime, handle, mut events) = harness.start().await;
    let hub = HubKey::notifications();
    notifications_connected(&handle).await;

    harness
        .connector
        .emit(&hub, frames::notification("n1", "offer", "One", ""));
    harness
        .connector
        .emit(&hub, frames::notification("n2", "offer", "Two", ""));
    wait_for_event(&mut events, |event| {
        matches!(event, AppEvent::NotificationUnreadChanged { unread: 2 })
    })
    .await;

    // Read elsewhere: the server's number replaces local arithmetic.
    harness.connector.emit(&hub, frames::unread_count(7));
    let event = wait_for_event(&mut events, |event| {
        matches!(event, AppEvent::NotificationUnreadChanged { .. })
    })
    .await;
    assert_eq!(event, AppEvent::NotificationUnreadChanged { unread: 7 });
}

// ----------------------------------------------------------------------------
// Read State and Reset
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_mark_all_read_is_optimistic_and_fire_and_forget() {
    let harness = TestHarness::new();
    harness.notification_api.stage_fetch(Ok(feed_page(
        vec![feed_item("n1", "One"), feed_item("n2", "Two")],
        2,
    )));
    // The confirmation fails server-side; the badge must not care.
    harness
        .notification_api
        .stage_mark_read(Err(ApiError::status(500, "backend down")));
    let (_runtime, handle, mut events) = harness.start().await;
    drain_startup_events(&mut events).await;

    handle.send(Command::LoadNotifications).await.unwrap();
    wait_for_event(&mut events, |event| {
        matches!(event, AppEvent::NotificationUnreadChanged { unread: 2 })
    })
    .await;

    handle
        .send(Command::MarkNotificationsRead {
            selection: ReadSelection::All,
        })
        .await
        .unwrap();
    let event = wait_for_event(&mut events, |event| {
        matches!(event, AppEvent::NotificationUnreadChanged { .. })
    })
    .await;
    assert_eq!(event, AppEvent::NotificationUnreadChanged { unread: 0 });

    wait_until(|| {
        harness.notification_api.calls().iter().any(|call| {
            matches!(
                call,
                NotificationCall::MarkRead {
                    selection: ReadSelection::All,
                }
            )
        })
    })
    .await;

    // The server error is logged, never surfaced.
    assert_no_event(&mut events, Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_the_feed_for_a_fresh_load() {
    let harness = TestHarness::new();
    harness
        .notification_api
        .stage_fetch(Ok(feed_page(vec![feed_item("n1", "Offer")], 1)));
    harness.notification_api.stage_fetch(Ok(feed_page(Vec::new(), 0)));
    let (_runtime, handle, mut events) = harness.start().await;

    handle.send(Command::LoadNotifications).await.unwrap();
    wait_for_event(&mut events, |event| {
        matches!(event, AppEvent::NotificationsLoaded { .. })
    })
    .await;

    handle.send(Command::Reset).await.unwrap();
    wait_for_event(&mut events, |event| matches!(event, AppEvent::StateReset)).await;

    // Logged out and back in: the feed loads from scratch.
    handle.send(Command::LoadNotifications).await.unwrap();
    let event = wait_for_event(&mut events, |event| {
        matches!(event, AppEvent::NotificationsLoaded { .. })
    })
    .await;
    assert_eq!(event, AppEvent::NotificationsLoaded { count: 0, unread: 0 });
    assert_eq!(harness.notification_api.fetch_count(), 2);
}
