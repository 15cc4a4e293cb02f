//! Bazaar Sync Core
//!
//! Domain types and pure state machines for the Bazaar real-time engine:
//! message and notification records, delivery tracking, the channel
//! message schema, and the reconciliation stores that turn pushes,
//! completions and user commands into consistent client state.
//!
//! Everything here is synchronous and I/O-free. The `bazaar-runtime`
//! crate drives these types from its event loop; this crate is the
//! stable API between that engine and its consumers.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod api;
pub mod channel;
pub mod config;
pub mod delivery;
pub mod errors;
pub mod message;
pub mod notification;
pub mod push;
pub mod score;
pub mod store;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use api::{
    ChatApi, MessagePage, MessageRecord, NotificationApi, NotificationPage, PageCursor,
    ReadOutcome, ReadSelection, ScoreApi, SendReceipt,
};
pub use channel::{
    event_names, AppEvent, Command, Completion, ConnectionStatus, Effect, PageKind, PushFrame,
    ScoreFetchOrigin, SyncStatus,
};
pub use config::{
    ChannelConfig, ChatConfig, NotificationConfig, PollingConfig, ReconnectConfig,
    SharedSyncConfig, SyncConfig, SyncConfigBuilder,
};
pub use delivery::{DeliveryStats, DeliveryStatus, DeliveryTracker};
pub use errors::{ApiError, ApiResult, ConnectError, SyncError, SyncResult};
pub use message::{ChatMessage, ConversationSummary, MessageRef};
pub use notification::Notification;
pub use push::{
    MessagePush, NotificationPush, PushConnector, PushSession, ReceiptPush, ScorePush,
    UnreadCountPush,
};
pub use score::ScoreSnapshot;
pub use store::{
    ChatStore, LoadMoreOutcome, MarkReadPlan, NotificationStore, OpenOutcome, PollTransition,
    PushApplyOutcome, ScoreStore, SendResolution, WatchOutcome,
};
pub use types::{
    ConversationId, HubKey, ListingId, LocalId, MessageId, NotificationId, SystemTimeSource,
    TimeSource, Timestamp, UserId,
};
