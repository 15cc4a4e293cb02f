//! Channel Construction Utilities
//!
//! Type aliases and constructors for the engine's channels, sized from
//! [`ChannelConfig`], plus the non-blocking send used on dispatch paths
//! that must never stall behind a slow receiver.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::warn;

use super::communication::{AppEvent, Command, Completion, ConnectionStatus, PushFrame};
use crate::config::ChannelConfig;

// ----------------------------------------------------------------------------
// Channel Type Aliases
// ----------------------------------------------------------------------------

pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;

pub type AppEventSender = mpsc::Sender<AppEvent>;
pub type AppEventReceiver = mpsc::Receiver<AppEvent>;

pub type CompletionSender = mpsc::Sender<Completion>;
pub type CompletionReceiver = mpsc::Receiver<Completion>;

pub type FrameSender = mpsc::Sender<PushFrame>;
pub type FrameReceiver = mpsc::Receiver<PushFrame>;

pub type StatusSender = watch::Sender<ConnectionStatus>;
pub type StatusReceiver = watch::Receiver<ConnectionStatus>;

// ----------------------------------------------------------------------------
// Channel Constructors
// ----------------------------------------------------------------------------

/// Consumer → sync task commands.
pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    mpsc::channel(config.command_buffer_size)
}

/// Sync task → UI events.
pub fn create_app_event_channel(config: &ChannelConfig) -> (AppEventSender, AppEventReceiver) {
    mpsc::channel(config.app_event_buffer_size)
}

/// Spawned REST futures → sync task completions.
pub fn create_completion_channel(config: &ChannelConfig) -> (CompletionSender, CompletionReceiver) {
    mpsc::channel(config.completion_buffer_size)
}

/// Router → one subscription's frame fan-in.
pub fn create_frame_channel(config: &ChannelConfig) -> (FrameSender, FrameReceiver) {
    mpsc::channel(config.frame_buffer_size)
}

/// Per-hub status watch, starting disconnected.
pub fn create_status_channel() -> (StatusSender, StatusReceiver) {
    watch::channel(ConnectionStatus::Disconnected)
}

// ----------------------------------------------------------------------------
// Channel Errors
// ----------------------------------------------------------------------------

/// Failures on the engine's internal channels.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel '{channel}' is closed")]
    Closed { channel: &'static str },

    #[error("channel '{channel}' is full")]
    Full { channel: &'static str },
}

// ----------------------------------------------------------------------------
// Non-Blocking Send
// ----------------------------------------------------------------------------

/// Send without awaiting. Frame routing uses this so one saturated
/// subscription cannot stall a connection driver; the overflow is logged
/// and counted, not propagated as backpressure.
pub trait NonBlockingSend<T> {
    fn send_or_drop(&self, value: T, channel: &'static str) -> Result<(), ChannelError>;
}

impl<T> NonBlockingSend<T> for mpsc::Sender<T> {
    fn send_or_drop(&self, value: T, channel: &'static str) -> Result<(), ChannelError> {
        match self.try_send(value) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(channel, "channel full, dropping message");
                Err(ChannelError::Full { channel })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ChannelError::Closed { channel }),
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Statistics
// ----------------------------------------------------------------------------

/// Delivery counters for a dispatch point (shared across tasks).
#[derive(Debug, Default)]
pub struct ChannelStats {
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
