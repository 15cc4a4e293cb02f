//! Engine Configuration
//!
//! Per-concern configuration structs with sensible defaults, combined
//! into a master [`SyncConfig`] with cross-field validation and a
//! builder. Consumers normally start from `SyncConfig::default()` and
//! override the handful of values they care about.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the engine's internal channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Consumer → sync task command buffer.
    pub command_buffer_size: usize,
    /// Sync task → UI event buffer.
    pub app_event_buffer_size: usize,
    /// Spawned REST future → sync task completion buffer.
    pub completion_buffer_size: usize,
    /// Per-subscription push frame buffer (router fan-in).
    pub frame_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 64,    // UI actions are low-rate
            app_event_buffer_size: 256, // bursts on page loads
            completion_buffer_size: 64,
            frame_buffer_size: 256, // push bursts after reconnect
        }
    }
}

impl ChannelConfig {
    /// Minimal buffers for deterministic tests.
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 8,
            app_event_buffer_size: 32,
            completion_buffer_size: 8,
            frame_buffer_size: 32,
        }
    }
}

// ----------------------------------------------------------------------------
// Reconnect Configuration
// ----------------------------------------------------------------------------

/// Backoff policy for hub reconnection.
///
/// The schedule is indexed by attempt number; the final entry is reused
/// for every attempt past the end. Must be monotonically non-decreasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before attempt N is `backoff_schedule[min(N, len - 1)]`.
    pub backoff_schedule: Vec<Duration>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_schedule: vec![
                Duration::ZERO,           // first attempt fires immediately
                Duration::from_secs(2),
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(30),  // reused indefinitely
            ],
        }
    }
}

impl ReconnectConfig {
    /// Tight schedule for tests that drive real (unpaused) time.
    pub fn testing() -> Self {
        Self {
            backoff_schedule: vec![
                Duration::ZERO,
                Duration::from_millis(10),
                Duration::from_millis(20),
            ],
        }
    }

    /// Delay to wait before the given attempt (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize).min(self.backoff_schedule.len().saturating_sub(1));
        self.backoff_schedule.get(idx).copied().unwrap_or(Duration::ZERO)
    }

    /// Number of attempts covered by explicit schedule entries. Burning
    /// through one full pass during reconnection is what "retries
    /// exhausted" means for the status machine.
    pub fn scheduled_attempts(&self) -> u32 {
        self.backoff_schedule.len() as u32
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.backoff_schedule.is_empty() {
            return Err("backoff schedule must not be empty".to_string());
        }
        for pair in self.backoff_schedule.windows(2) {
            if pair[1] < pair[0] {
                return Err(format!(
                    "backoff schedule must be non-decreasing ({:?} follows {:?})",
                    pair[1], pair[0]
                ));
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Polling Configuration
// ----------------------------------------------------------------------------

/// Fallback polling cadence used while the push channel is in error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval between authoritative re-fetches. One immediate fetch
    /// fires on activation; this is the steady-state spacing after it.
    pub interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
        }
    }
}

impl PollingConfig {
    pub fn testing() -> Self {
        Self {
            interval: Duration::from_millis(50),
        }
    }
}

// ----------------------------------------------------------------------------
// Chat Configuration
// ----------------------------------------------------------------------------

/// Chat store tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum characters kept in a conversation summary preview.
    pub preview_length: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { preview_length: 80 }
    }
}

impl ChatConfig {
    pub fn testing() -> Self {
        Self { preview_length: 16 }
    }
}

// ----------------------------------------------------------------------------
// Notification Configuration
// ----------------------------------------------------------------------------

/// Notification store tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Notifications requested on the initial load.
    pub initial_top: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { initial_top: 50 }
    }
}

impl NotificationConfig {
    pub fn testing() -> Self {
        Self { initial_top: 5 }
    }
}

// ----------------------------------------------------------------------------
// Master Configuration
// ----------------------------------------------------------------------------

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    pub channels: ChannelConfig,
    pub reconnect: ReconnectConfig,
    pub polling: PollingConfig,
    pub chat: ChatConfig,
    pub notifications: NotificationConfig,
}

impl SyncConfig {
    /// Configuration for deterministic tests: tiny buffers, tight
    /// schedules.
    pub fn testing() -> Self {
        Self {
            channels: ChannelConfig::testing(),
            reconnect: ReconnectConfig::testing(),
            polling: PollingConfig::testing(),
            chat: ChatConfig::testing(),
            notifications: NotificationConfig::testing(),
        }
    }

    /// Cross-field validation. Called by the builder and by the runtime
    /// on startup.
    pub fn validate(&self) -> Result<(), String> {
        if self.channels.command_buffer_size == 0 {
            return Err("command buffer size must be greater than 0".to_string());
        }
        if self.channels.app_event_buffer_size == 0 {
            return Err("app event buffer size must be greater than 0".to_string());
        }
        if self.channels.completion_buffer_size == 0 {
            return Err("completion buffer size must be greater than 0".to_string());
        }
        if self.channels.frame_buffer_size == 0 {
            return Err("frame buffer size must be greater than 0".to_string());
        }
        self.reconnect.validate()?;
        if self.polling.interval.is_zero() {
            return Err("polling interval must be greater than 0".to_string());
        }
        if self.chat.preview_length == 0 {
            return Err("preview length must be greater than 0".to_string());
        }
        if self.notifications.initial_top == 0 {
            return Err("notification initial load size must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }
}

/// Shared reference to an immutable engine configuration.
pub type SharedSyncConfig = Arc<SyncConfig>;

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

/// Builder for [`SyncConfig`], validating on `build()`.
#[derive(Debug, Clone, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channels(mut self, channels: ChannelConfig) -> Self {
        self.config.channels = channels;
        self
    }

    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.config.reconnect = reconnect;
        self
    }

    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.config.polling = polling;
        self
    }

    pub fn chat(mut self, chat: ChatConfig) -> Self {
        self.config.chat = chat;
        self
    }

    pub fn notifications(mut self, notifications: NotificationConfig) -> Self {
        self.config.notifications = notifications;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.polling.interval = interval;
        self
    }

    pub fn backoff_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.config.reconnect.backoff_schedule = schedule;
        self
    }

    pub fn build(self) -> Result<SyncConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SyncConfig::default().validate().is_ok());
        assert!(SyncConfig::testing().validate().is_ok());
    }

    #[test]
    fn default_backoff_schedule_matches_policy() {
        let reconnect = ReconnectConfig::default();
        assert_eq!(
            reconnect.backoff_schedule,
            vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(30),
            ]
        );
    }

    #[test]
    fn delay_clamps_to_final_entry() {
        let reconnect = ReconnectConfig::default();
        assert_eq!(reconnect.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(reconnect.delay_for_attempt(3), Duration::from_secs(10));
        assert_eq!(reconnect.delay_for_attempt(4), Duration::from_secs(30));
        assert_eq!(reconnect.delay_for_attempt(40), Duration::from_secs(30));
    }

    #[test]
    fn decreasing_backoff_schedule_is_rejected() {
        let mut config = SyncConfig::default();
        config.reconnect.backoff_schedule =
            vec![Duration::from_secs(5), Duration::from_secs(2)];
        let err = config.validate().unwrap_err();
        assert!(err.contains("non-decreasing"));
    }

    #[test]
    fn empty_backoff_schedule_is_rejected() {
        let mut config = SyncConfig::default();
        config.reconnect.backoff_schedule = Vec::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_buffers_are_rejected() {
        let mut config = SyncConfig::default();
        config.channels.frame_buffer_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut config = SyncConfig::default();
        config.polling.interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_validates_on_build() {
        let config = SyncConfig::builder()
            .poll_interval(Duration::from_secs(10))
            .backoff_schedule(vec![Duration::ZERO, Duration::from_secs(1)])
            .build()
            .unwrap();
        assert_eq!(config.polling.interval, Duration::from_secs(10));
        assert_eq!(config.reconnect.scheduled_attempts(), 2);

        let err = SyncConfig::builder()
            .backoff_schedule(vec![])
            .build()
            .unwrap_err();
        assert!(err.contains("empty"));
    }
}
