//! Bazaar Sync Runtime
//!
//! The engine of the Bazaar real-time layer:
//! - [`SyncRuntime`]: lifecycle orchestrator wiring channels, hub
//!   subscriptions, and the sync task together
//! - [`SyncTask`]: the single event loop that applies commands, push
//!   frames, and REST completions to the stores
//! - [`ConnectionManager`]: refcounted hub subscriptions backed by
//!   per-hub reconnect drivers
//!
//! `bazaar-core` defines the stable types and reconciliation stores;
//! this crate drives them.

pub mod connection;
mod runtime;
pub mod sync;

pub use connection::{ConnectionManager, EventRouter, HubSubscription, ManagerStats};
pub use runtime::{SyncHandle, SyncRuntime};
pub use sync::{Dispatch, SyncApis, SyncHandlers, SyncState, SyncStats, SyncTask};

// Re-export core types for convenience
pub use bazaar_core::{
    channel::{
        create_app_event_channel, create_command_channel, AppEvent, AppEventReceiver,
        AppEventSender, ChannelError, Command, CommandSender, Completion, ConnectionStatus, Effect,
        PushFrame, StatusReceiver, SyncStatus,
    },
    config::{SharedSyncConfig, SyncConfig, SyncConfigBuilder},
    errors::{ApiError, ConnectError, SyncError, SyncResult},
    push::PushConnector,
    types::{ConversationId, HubKey, ListingId, LocalId, MessageId, NotificationId, UserId},
};
