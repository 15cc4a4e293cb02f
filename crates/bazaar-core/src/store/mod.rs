//! Reconciliation Stores
//!
//! The synchronous state cores of the engine. Each store is a plain
//! struct mutated through explicit operations that return exactly what
//! the caller must do next (fetch, emit, nothing); none of them performs
//! I/O or holds a lock. The sync task is their only writer, which is
//! what makes the ordering guarantees of the operations hold without
//! further synchronization.
//!
//! - [`chat::ChatStore`]: ordered deduplicated message lists, optimistic
//!   sends, delivery statuses, unread counters.
//! - [`notifications::NotificationStore`]: the notification feed and its
//!   badge.
//! - [`live_score::ScoreStore`]: the watched listing's score and the
//!   polling-fallback decision.

pub mod chat;
pub mod live_score;
pub mod notifications;

pub use chat::{
    ChatStore, ChatStoreStats, InitialPageView, LoadMoreOutcome, MarkReadPlan, OlderPageView,
    OpenOutcome, PushApplyOutcome, ReadConfirmation, SendResolution,
};
pub use live_score::{PollTransition, ScoreStore, ScoreStoreStats, WatchOutcome};
pub use notifications::{NotificationLoadView, NotificationStore, NotificationStoreStats};
