//! Message Delivery Tracking
//!
//! The monotonic delivery-status state machine for chat messages and the
//! tracker that holds per-message status across every conversation, not
//! just the active one. Receipt events carry a bare message id, so the
//! tracker is the single source of truth a view consults when it renders
//! a message, wherever that message currently lives.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::MessageId;

// ----------------------------------------------------------------------------
// Delivery Status
// ----------------------------------------------------------------------------

/// Lifecycle of a message after the user hits send.
///
/// Ordering is part of the contract: `Sent < Delivered < Read`, and a
/// message never moves backwards. `Sent → Read` happens only when the
/// server explicitly signals a read receipt; it is never inferred.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Accepted locally or by the server; the other party has not seen it.
    Sent,
    /// The other party's client acknowledged receipt.
    Delivered,
    /// The other party confirmed reading it.
    Read,
}

impl DeliveryStatus {
    /// Whether this status can still advance.
    pub fn is_final(&self) -> bool {
        matches!(self, DeliveryStatus::Read)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Delivery Tracker
// ----------------------------------------------------------------------------

/// Tracks the delivery status of every server-identified message seen in
/// this session.
///
/// Statuses only ever advance. Observations arriving out of order (a
/// read receipt overtaking the send confirmation, a duplicate delivered
/// receipt) collapse to the furthest status, which is what makes the
/// confirmation and push channels idempotent with respect to each other.
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    statuses: BTreeMap<MessageId, DeliveryStatus>,
    regressions_ignored: u64,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation for a message. Returns the new status if it
    /// advanced, `None` if the observation was a no-op (duplicate or
    /// would-be regression).
    pub fn observe(&mut self, id: &MessageId, status: DeliveryStatus) -> Option<DeliveryStatus> {
        match self.statuses.get_mut(id) {
            Some(current) => {
                if status > *current {
                    *current = status;
                    Some(status)
                } else {
                    if status < *current {
                        self.regressions_ignored += 1;
                    }
                    None
                }
            }
            None => {
                self.statuses.insert(id.clone(), status);
                Some(status)
            }
        }
    }

    /// Current status for a message, if the tracker has seen it.
    pub fn status(&self, id: &MessageId) -> Option<DeliveryStatus> {
        self.statuses.get(id).copied()
    }

    /// Status for a message, preferring whatever the tracker knows over
    /// the caller's fallback (used to overlay page fetches that may be
    /// staler than receipts already applied).
    pub fn status_or(&self, id: &MessageId, fallback: DeliveryStatus) -> DeliveryStatus {
        self.status(id).map_or(fallback, |known| known.max(fallback))
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn clear(&mut self) {
        self.statuses.clear();
        self.regressions_ignored = 0;
    }

    pub fn stats(&self) -> DeliveryStats {
        let mut stats = DeliveryStats {
            tracked: self.statuses.len(),
            regressions_ignored: self.regressions_ignored,
            ..DeliveryStats::default()
        };
        for status in self.statuses.values() {
            match status {
                DeliveryStatus::Sent => stats.sent += 1,
                DeliveryStatus::Delivered => stats.delivered += 1,
                DeliveryStatus::Read => stats.read += 1,
            }
        }
        stats
    }
}

/// Point-in-time tracker statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub tracked: usize,
    pub sent: usize,
    pub delivered: usize,
    pub read: usize,
    pub regressions_ignored: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
