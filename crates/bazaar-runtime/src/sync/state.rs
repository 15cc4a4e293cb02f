//! Sync Task State
//!
//! All mutable engine state, owned exclusively by the sync task. No
//! locks anywhere: the task is the only writer, and consumers observe
//! changes through app events and the status watches.

use std::sync::Arc;

use bazaar_core::config::SharedSyncConfig;
use bazaar_core::store::{ChatStore, NotificationStore, ScoreStore};
use bazaar_core::types::{TimeSource, Timestamp, UserId};

/// Processing counters, surfaced for diagnostics and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub commands_processed: u64,
    pub frames_processed: u64,
    pub frames_undecodable: u64,
    pub completions_processed: u64,
    pub effects_generated: u64,
    pub app_events_generated: u64,
    pub poll_ticks: u64,
}

/// Everything the sync task mutates.
pub struct SyncState {
    /// Identity of this client, for suppressing echoes of its own sends.
    pub self_user: UserId,
    pub chat: ChatStore,
    pub notifications: NotificationStore,
    pub score: ScoreStore,
    pub config: SharedSyncConfig,
    pub time_source: Arc<dyn TimeSource>,
    pub stats: SyncStats,
}

impl SyncState {
    pub fn new(
        self_user: UserId,
        config: SharedSyncConfig,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            self_user,
            chat: ChatStore::new(&config.chat),
            notifications: NotificationStore::new(),
            score: ScoreStore::new(),
            config,
            time_source,
            stats: SyncStats::default(),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.time_source.now()
    }
}
