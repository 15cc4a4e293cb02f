//! Notification Reconciliation Store
//!
//! A newest-first notification feed with an unread badge. The feed is
//! loaded once per session on demand, then maintained by push: new
//! notifications prepend and bump the badge by one, while server-pushed
//! badge counts overwrite it outright (the server's number wins over any
//! locally derived value).

use crate::api::{NotificationPage, ReadSelection};
use crate::notification::Notification;
use crate::push::NotificationPush;
use crate::types::Timestamp;

// ----------------------------------------------------------------------------
// Operation Outcomes
// ----------------------------------------------------------------------------

/// View of a completed initial load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationLoadView {
    pub count: usize,
    pub unread: u32,
}

/// Store activity counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationStoreStats {
    pub loads_completed: u64,
    pub pushes_applied: u64,
    pub duplicates_ignored: u64,
    pub marked_read: u64,
}

// ----------------------------------------------------------------------------
// Store
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct NotificationStore {
    items: Vec<Notification>,
    unread: u32,
    loaded: bool,
    loading: bool,
    stats: NotificationStoreStats,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Initial load
    // ------------------------------------------------------------------

    /// Request the initial feed. Loads at most once per session: returns
    /// `Some(top)` only when no load completed or is in flight.
    pub fn begin_initial_load(&mut self, top: u32) -> Option<u32> {
        if self.loaded || self.loading {
            return None;
        }
        self.loading = true;
        Some(top)
    }

    /// Apply the fetched feed. The list and the badge are both replaced
    /// wholesale; anything accumulated from pushes before the load
    /// resolved is superseded by the server's answer.
    pub fn apply_initial_page(&mut self, page: NotificationPage) -> NotificationLoadView {
        self.items = page.items;
        self.unread = page.unread_count;
        self.loaded = true;
        self.loading = false;
        self.stats.loads_completed += 1;
        NotificationLoadView {
            count: self.items.len(),
            unread: self.unread,
        }
    }

    /// Record a failed load. The store stays unloaded, so the next
    /// request fetches again.
    pub fn fail_initial_load(&mut self) {
        self.loading = false;
    }

    // ------------------------------------------------------------------
    // Push events
    // ------------------------------------------------------------------

    /// Prepend a pushed notification and bump the badge by one. A
    /// notification id already in the feed inserts nothing.
    pub fn apply_push(&mut self, push: NotificationPush, received_at: Timestamp) -> Option<&Notification> {
        if self.items.iter().any(|n| n.id == push.notification_id) {
            self.stats.duplicates_ignored += 1;
            return None;
        }
        self.items.insert(0, Notification::from_push(push, received_at));
        self.unread = self.unread.saturating_add(1);
        self.stats.pushes_applied += 1;
        self.items.first()
    }

    /// Overwrite the badge with a server-pushed absolute count.
    pub fn apply_unread_count(&mut self, count: u32) -> u32 {
        self.unread = count;
        count
    }

    // ------------------------------------------------------------------
    // Read state
    // ------------------------------------------------------------------

    /// Mark notifications read and return the new badge value. `All`
    /// clears the badge; ids decrement it only for entries that were
    /// actually unread.
    pub fn mark_read(&mut self, selection: &ReadSelection) -> u32 {
        match selection {
            ReadSelection::All => {
                for item in self.items.iter_mut() {
                    if !item.is_read {
                        item.is_read = true;
                        self.stats.marked_read += 1;
                    }
                }
                self.unread = 0;
            }
            ReadSelection::Ids(ids) => {
                let mut newly_read = 0u32;
                for item in self.items.iter_mut() {
                    if !item.is_read && ids.contains(&item.id) {
                        item.is_read = true;
                        newly_read += 1;
                    }
                }
                self.stats.marked_read += u64::from(newly_read);
                self.unread = self.unread.saturating_sub(newly_read);
            }
        }
        self.unread
    }

    // ------------------------------------------------------------------
    // Queries and lifecycle
    // ------------------------------------------------------------------

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread(&self) -> u32 {
        self.unread
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn stats(&self) -> &NotificationStoreStats {
        &self.stats
    }

    /// Clear everything (logout). The next load request fetches fresh.
    pub fn reset(&mut self) {
        self.items.clear();
        self.unread = 0;
        self.loaded = false;
        self.loading = false;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
