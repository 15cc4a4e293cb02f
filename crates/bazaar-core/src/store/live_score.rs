//! Live Score Store
//!
//! Tracks the quality score of the listing currently being watched (at
//! most one at a time) and decides when the polling fallback must run.
//! Polling is a pure function of two facts: a listing is watched, and
//! the score hub's connection is in error. Every input change re-derives
//! it, so transient reconnect states never leave a stray poll loop
//! running.
//!
//! Score fetches are guarded by an epoch that bumps on every watch
//! change, the same screen the chat store applies to its completions: a
//! recalculation that resolves after the user switched listings is
//! discarded.

use crate::channel::{ConnectionStatus, SyncStatus};
use crate::push::ScorePush;
use crate::score::ScoreSnapshot;
use crate::types::ListingId;

// ----------------------------------------------------------------------------
// Operation Outcomes
// ----------------------------------------------------------------------------

/// Change in the polling requirement after an input moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTransition {
    /// Polling must start now (callers fetch immediately, then tick).
    Started,
    /// Polling must stop.
    Stopped,
    Unchanged,
}

/// Result of changing the watched listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Same listing (or still nothing watched).
    Unchanged,
    /// A new listing is watched; an initial fetch is needed.
    Started {
        listing: ListingId,
        epoch: u64,
        poll: PollTransition,
    },
    /// Watching stopped.
    Cleared { poll: PollTransition },
}

/// Store activity counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreStoreStats {
    pub pushes_applied: u64,
    pub snapshots_applied: u64,
    pub stale_snapshots: u64,
}

// ----------------------------------------------------------------------------
// Store
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ScoreStore {
    listing: Option<ListingId>,
    snapshot: Option<ScoreSnapshot>,
    epoch: u64,
    connection: ConnectionStatus,
    polling: bool,
    stats: ScoreStoreStats,
}

impl ScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Watch lifecycle
    // ------------------------------------------------------------------

    /// Change the watched listing. Watching the current listing again is
    /// a no-op; a genuine change drops the old snapshot and bumps the
    /// fetch epoch.
    pub fn watch(&mut self, listing: Option<ListingId>) -> WatchOutcome {
        if self.listing == listing {
            return WatchOutcome::Unchanged;
        }
        self.snapshot = None;
        self.epoch += 1;
        self.listing = listing;
        let poll = self.reevaluate_polling();
        match &self.listing {
            Some(listing) => WatchOutcome::Started {
                listing: listing.clone(),
                epoch: self.epoch,
                poll,
            },
            None => WatchOutcome::Cleared { poll },
        }
    }

    // ------------------------------------------------------------------
    // Score inputs
    // ------------------------------------------------------------------

    /// Apply a pushed score value. The push carries only the number, so
    /// label and suggestions persist from the last full snapshot; the
    /// previous score becomes exactly the one held before this update.
    pub fn apply_push(&mut self, push: ScorePush) -> Option<ScoreSnapshot> {
        self.listing.as_ref()?;
        let next = match self.snapshot.take() {
            Some(prior) => ScoreSnapshot {
                previous_score: Some(prior.score),
                score: push.value,
                ..prior
            },
            None => ScoreSnapshot::new(push.value, String::new()),
        };
        self.snapshot = Some(next.clone());
        self.stats.pushes_applied += 1;
        Some(next)
    }

    /// Apply a fetched recalculation. Stale results (listing switched,
    /// or any watch change since the fetch started) are discarded. The
    /// previous score is rewritten to the locally held one so the delta
    /// is always single-step, whatever the server computed it against.
    pub fn apply_snapshot(
        &mut self,
        listing: &ListingId,
        epoch: u64,
        mut fetched: ScoreSnapshot,
    ) -> Option<ScoreSnapshot> {
        let relevant = epoch == self.epoch && self.listing.as_ref() == Some(listing);
        if !relevant {
            self.stats.stale_snapshots += 1;
            return None;
        }
        fetched.previous_score = self.snapshot.as_ref().map(|prior| prior.score);
        self.snapshot = Some(fetched.clone());
        self.stats.snapshots_applied += 1;
        Some(fetched)
    }

    // ------------------------------------------------------------------
    // Connection input and polling decision
    // ------------------------------------------------------------------

    /// Mirror the score hub's connection status. Returns what the
    /// polling loop must do about it.
    pub fn set_connection_status(&mut self, status: ConnectionStatus) -> PollTransition {
        self.connection = status;
        self.reevaluate_polling()
    }

    fn reevaluate_polling(&mut self) -> PollTransition {
        let want = self.listing.is_some() && self.connection == ConnectionStatus::Error;
        if want == self.polling {
            return PollTransition::Unchanged;
        }
        self.polling = want;
        if want {
            PollTransition::Started
        } else {
            PollTransition::Stopped
        }
    }

    // ------------------------------------------------------------------
    // Queries and lifecycle
    // ------------------------------------------------------------------

    pub fn listing(&self) -> Option<&ListingId> {
        self.listing.as_ref()
    }

    pub fn snapshot(&self) -> Option<&ScoreSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }

    /// Consumer-facing status: `Polling` while the fallback runs,
    /// otherwise the hub connection status verbatim.
    pub fn sync_status(&self) -> SyncStatus {
        if self.polling {
            SyncStatus::Polling
        } else {
            SyncStatus::from(self.connection)
        }
    }

    pub fn stats(&self) -> &ScoreStoreStats {
        &self.stats
    }

    /// Clear watch state (logout). The connection mirror survives, it
    /// reflects the hub rather than user data.
    pub fn reset(&mut self) -> PollTransition {
        self.listing = None;
        self.snapshot = None;
        self.epoch += 1;
        self.reevaluate_polling()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(id: &str) -> ListingId {
        ListingId::new(id)
    }

    fn push(value: f64) -> ScorePush {
        ScorePush {
            metric: Some("overall".to_string()),
            value,
            timestamp: crate::types::Timestamp::from_millis(1),
        }
    }

    #[test]
    fn watching_a_listing_requests_an_initial_fetch() {
        let mut store = ScoreStore::new();
        match store.watch(Some(listing("l1"))) {
            WatchOutcome::Started { listing: l, epoch, poll } => {
                assert_eq!(l, listing("l1"));
                assert_eq!(epoch, 1);
                assert_eq!(poll, PollTransition::Unchanged);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn rewatching_the_same_listing_is_a_noop() {
        let mut store = ScoreStore::new();
        store.watch(Some(listing("l1")));
        assert_eq!(store.watch(Some(listing("l1"))), WatchOutcome::Unchanged);
        assert_eq!(store.epoch(), 1);
    }

    #[test]
    fn switching_listings_drops_the_old_snapshot() {
        let mut store = ScoreStore::new();
        store.watch(Some(listing("l1")));
        store.apply_push(push(40.0));
        assert!(store.snapshot().is_some());

        store.watch(Some(listing("l2")));
        assert!(store.snapshot().is_none());
        assert_eq!(store.epoch(), 2);
    }

    #[test]
    fn pushed_scores_keep_a_single_step_delta() {
        let mut store = ScoreStore::new();
        store.watch(Some(listing("l1")));

        let first = store.apply_push(push(40.0)).unwrap();
        assert_eq!(first.score, 40.0);
        assert_eq!(first.previous_score, None);

        let second = store.apply_push(push(55.0)).unwrap();
        assert_eq!(second.score, 55.0);
        assert_eq!(second.previous_score, Some(40.0));

        let third = store.apply_push(push(52.0)).unwrap();
        assert_eq!(third.previous_score, Some(55.0));
        assert_eq!(third.delta(), Some(-3.0));
    }

    #[test]
    fn pushes_without_a_watched_listing_are_ignored() {
        let mut store = ScoreStore::new();
        assert!(store.apply_push(push(40.0)).is_none());
    }

    #[test]
    fn push_preserves_label_and_suggestions_from_the_last_snapshot() {
        let mut store = ScoreStore::new();
        let WatchOutcome::Started { epoch, .. } = store.watch(Some(listing("l1"))) else {
            panic!("expected start");
        };
        let fetched = ScoreSnapshot::new(40.0, "Good".to_string())
            .with_suggestions(vec!["add photos".to_string()]);
        store.apply_snapshot(&listing("l1"), epoch, fetched);

        let updated = store.apply_push(push(48.0)).unwrap();
        assert_eq!(updated.label, "Good");
        assert_eq!(updated.suggestions, vec!["add photos".to_string()]);
        assert_eq!(updated.previous_score, Some(40.0));
    }

    #[test]
    fn fetched_snapshot_rewrites_previous_to_the_local_prior() {
        let mut store = ScoreStore::new();
        let WatchOutcome::Started { epoch, .. } = store.watch(Some(listing("l1"))) else {
            panic!("expected start");
        };
        store.apply_push(push(40.0));

        let mut fetched = ScoreSnapshot::new(70.0, "Great".to_string());
        fetched.previous_score = Some(12.0); // server's idea of history
        let applied = store.apply_snapshot(&listing("l1"), epoch, fetched).unwrap();
        assert_eq!(applied.previous_score, Some(40.0));
    }

    #[test]
    fn stale_snapshot_after_a_switch_is_discarded() {
        let mut store = ScoreStore::new();
        let WatchOutcome::Started { epoch: old_epoch, .. } = store.watch(Some(listing("l1")))
        else {
            panic!("expected start");
        };
        store.watch(Some(listing("l2")));

        let fetched = ScoreSnapshot::new(70.0, "Great".to_string());
        assert!(store.apply_snapshot(&listing("l1"), old_epoch, fetched).is_none());
        assert!(store.snapshot().is_none());
        assert_eq!(store.stats().stale_snapshots, 1);
    }

    #[test]
    fn polling_needs_both_a_listing_and_a_connection_error() {
        let mut store = ScoreStore::new();
        // Error with nothing watched: no polling.
        assert_eq!(
            store.set_connection_status(ConnectionStatus::Error),
            PollTransition::Unchanged
        );
        assert!(!store.is_polling());

        // Watching while in error: polling starts.
        match store.watch(Some(listing("l1"))) {
            WatchOutcome::Started { poll, .. } => assert_eq!(poll, PollTransition::Started),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(store.is_polling());

        // Recovery stops it.
        assert_eq!(
            store.set_connection_status(ConnectionStatus::Connected),
            PollTransition::Stopped
        );
        assert!(!store.is_polling());
    }

    #[test]
    fn clearing_the_watch_stops_polling() {
        let mut store = ScoreStore::new();
        store.set_connection_status(ConnectionStatus::Error);
        store.watch(Some(listing("l1")));
        assert!(store.is_polling());

        match store.watch(None) {
            WatchOutcome::Cleared { poll } => assert_eq!(poll, PollTransition::Stopped),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn sync_status_surfaces_the_polling_fallback() {
        let mut store = ScoreStore::new();
        assert_eq!(store.sync_status(), SyncStatus::Disconnected);

        store.set_connection_status(ConnectionStatus::Connected);
        assert_eq!(store.sync_status(), SyncStatus::Connected);

        store.set_connection_status(ConnectionStatus::Error);
        assert_eq!(store.sync_status(), SyncStatus::Error);

        store.watch(Some(listing("l1")));
        assert_eq!(store.sync_status(), SyncStatus::Polling);
    }

    #[test]
    fn reset_clears_the_watch_and_stops_polling() {
        let mut store = ScoreStore::new();
        store.set_connection_status(ConnectionStatus::Error);
        let WatchOutcome::Started { epoch, .. } = store.watch(Some(listing("l1"))) else {
            panic!("expected start");
        };
        assert_eq!(store.reset(), PollTransition::Stopped);
        assert!(store.listing().is_none());

        // In-flight fetch from before the reset: stale.
        let fetched = ScoreSnapshot::new(70.0, "Great".to_string());
        assert!(store.apply_snapshot(&listing("l1"), epoch, fetched).is_none());
    }
}
