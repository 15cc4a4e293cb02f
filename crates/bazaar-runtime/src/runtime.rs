//! Engine Runtime
//!
//! Lifecycle wrapper that assembles the engine: validates configuration,
//! builds the channel fabric, subscribes the three hubs through the
//! connection manager, spawns the sync task, and hands consumers a
//! cloneable [`SyncHandle`] for commands and status reads.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bazaar_core::{Command, ConversationId, SyncConfig, UserId};
//! use bazaar_runtime::{SyncApis, SyncRuntime};
//! # use bazaar_core::push::PushConnector;
//! # async fn demo(connector: Arc<dyn PushConnector>, apis: SyncApis) -> Result<(), Box<dyn std::error::Error>> {
//! let mut runtime = SyncRuntime::new(
//!     UserId::new("user-17"),
//!     SyncConfig::default(),
//!     connector,
//!     apis,
//! )?;
//! runtime.start().await?;
//!
//! let handle = runtime.handle().ok_or("not started")?;
//! let mut events = runtime.take_app_events().ok_or("already taken")?;
//! handle
//!     .send(Command::OpenConversation {
//!         conversation: ConversationId::new("conv-42"),
//!     })
//!     .await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! runtime.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use bazaar_core::channel::{
    create_app_event_channel, create_command_channel, event_names, AppEventReceiver, ChannelError,
    Command, CommandSender, ConnectionStatus, NonBlockingSend, StatusReceiver, SyncStatus,
};
use bazaar_core::config::{SharedSyncConfig, SyncConfig};
use bazaar_core::errors::{SyncError, SyncResult};
use bazaar_core::push::PushConnector;
use bazaar_core::types::{HubKey, SystemTimeSource, TimeSource, UserId};

use crate::connection::{ConnectionManager, ManagerStats};
use crate::sync::{SyncApis, SyncState, SyncTask};

/// How long `stop` waits for the task to drain before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

// ----------------------------------------------------------------------------
// Sync Handle
// ----------------------------------------------------------------------------

/// Cloneable consumer-side handle: command submission plus connection and
/// sync status reads. Obtained from a started [`SyncRuntime`].
#[derive(Clone)]
pub struct SyncHandle {
    commands: CommandSender,
    chat_status: StatusReceiver,
    notification_status: StatusReceiver,
    score_status: StatusReceiver,
    score_sync: watch::Receiver<SyncStatus>,
}

impl SyncHandle {
    /// Submit a command, waiting for buffer space.
    pub async fn send(&self, command: Command) -> SyncResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ChannelError::Closed { channel: "command" }.into())
    }

    /// Submit a command without waiting. A full buffer drops the command
    /// and reports it.
    pub fn try_send(&self, command: Command) -> SyncResult<()> {
        self.commands
            .send_or_drop(command, "command")
            .map_err(SyncError::from)
    }

    pub fn chat_connection(&self) -> ConnectionStatus {
        *self.chat_status.borrow()
    }

    pub fn notification_connection(&self) -> ConnectionStatus {
        *self.notification_status.borrow()
    }

    pub fn score_connection(&self) -> ConnectionStatus {
        *self.score_status.borrow()
    }

    /// Effective score delivery path, `Polling` while the interval
    /// fallback is carrying updates.
    pub fn score_sync_status(&self) -> SyncStatus {
        *self.score_sync.borrow()
    }

    pub fn chat_status_receiver(&self) -> StatusReceiver {
        self.chat_status.clone()
    }

    pub fn notification_status_receiver(&self) -> StatusReceiver {
        self.notification_status.clone()
    }

    pub fn score_status_receiver(&self) -> StatusReceiver {
        self.score_status.clone()
    }

    pub fn score_sync_receiver(&self) -> watch::Receiver<SyncStatus> {
        self.score_sync.clone()
    }
}

// ----------------------------------------------------------------------------
// Sync Runtime
// ----------------------------------------------------------------------------

/// Owns the engine's tasks and channels.
///
/// All reconciliation logic runs inside the single sync task; the
/// runtime only assembles, starts, and stops it. Consumers interact
/// through [`SyncHandle`] and the app event receiver.
pub struct SyncRuntime {
    identity: UserId,
    config: SharedSyncConfig,
    connector: Arc<dyn PushConnector>,
    apis: SyncApis,
    time_source: Arc<dyn TimeSource>,
    manager: Option<ConnectionManager>,
    task_handle: Option<JoinHandle<()>>,
    commands: Option<CommandSender>,
    app_events: Option<AppEventReceiver>,
    chat_status: Option<StatusReceiver>,
    notification_status: Option<StatusReceiver>,
    score_status: Option<StatusReceiver>,
    score_sync: Option<watch::Receiver<SyncStatus>>,
    running: bool,
}

impl SyncRuntime {
    /// Create a stopped runtime. Fails if the configuration does not
    /// validate.
    pub fn new(
        identity: UserId,
        config: SyncConfig,
        connector: Arc<dyn PushConnector>,
        apis: SyncApis,
    ) -> SyncResult<Self> {
        config.validate().map_err(SyncError::config_error)?;
        Ok(Self {
            identity,
            config: Arc::new(config),
            connector,
            apis,
            time_source: Arc::new(SystemTimeSource),
            manager: None,
            task_handle: None,
            commands: None,
            app_events: None,
            chat_status: None,
            notification_status: None,
            score_status: None,
            score_sync: None,
            running: false,
        })
    }

    /// Replace the wall clock, for tests that pin message timestamps.
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Start the engine: spawn the connection drivers and the sync task.
    pub async fn start(&mut self) -> SyncResult<()> {
        if self.running {
            return Err(SyncError::config_error("runtime is already running"));
        }

        let (command_tx, command_rx) = create_command_channel(&self.config.channels);
        let (app_event_tx, app_event_rx) = create_app_event_channel(&self.config.channels);
        let (score_sync_tx, score_sync_rx) = watch::channel(SyncStatus::Disconnected);

        let manager = ConnectionManager::new(
            Arc::clone(&self.connector),
            self.config.reconnect.clone(),
            self.config.channels.clone(),
        );
        let chat = manager.subscribe(&HubKey::chat(), event_names::CHAT_EVENTS);
        let notifications =
            manager.subscribe(&HubKey::notifications(), event_names::NOTIFICATION_EVENTS);
        let score = manager.subscribe(&HubKey::live_score(), event_names::SCORE_EVENTS);

        self.chat_status = Some(chat.status_receiver());
        self.notification_status = Some(notifications.status_receiver());
        self.score_status = Some(score.status_receiver());

        let state = SyncState::new(
            self.identity.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.time_source),
        );
        let task = SyncTask::new(
            state,
            command_rx,
            app_event_tx,
            chat,
            notifications,
            score,
            score_sync_tx,
            self.apis.clone(),
        );
        self.task_handle = Some(tokio::spawn(task.run()));

        self.manager = Some(manager);
        self.commands = Some(command_tx);
        self.app_events = Some(app_event_rx);
        self.score_sync = Some(score_sync_rx);
        self.running = true;

        info!(identity = %self.identity, "sync runtime started");
        Ok(())
    }

    /// Stop the engine. Asks the task to wind down first; aborts it only
    /// if the grace period elapses.
    pub async fn stop(&mut self) -> SyncResult<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;

        if let Some(commands) = self.commands.take() {
            let _ = commands.send_or_drop(Command::Shutdown, "command");
        }
        if let Some(mut handle) = self.task_handle.take() {
            if timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                warn!("sync task did not stop in time, aborting");
                handle.abort();
            }
        }
        if let Some(manager) = self.manager.take() {
            manager.shutdown();
        }

        self.app_events = None;
        self.chat_status = None;
        self.notification_status = None;
        self.score_status = None;
        self.score_sync = None;

        info!(identity = %self.identity, "sync runtime stopped");
        Ok(())
    }

    /// Consumer handle. `None` until started.
    pub fn handle(&self) -> Option<SyncHandle> {
        Some(SyncHandle {
            commands: self.commands.clone()?,
            chat_status: self.chat_status.clone()?,
            notification_status: self.notification_status.clone()?,
            score_status: self.score_status.clone()?,
            score_sync: self.score_sync.clone()?,
        })
    }

    /// Take the app event receiver. There is exactly one; the first
    /// caller gets it.
    pub fn take_app_events(&mut self) -> Option<AppEventReceiver> {
        self.app_events.take()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn identity(&self) -> &UserId {
        &self.identity
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Connection manager counters. `None` until started.
    pub fn connection_stats(&self) -> Option<&ManagerStats> {
        self.manager.as_ref().map(|manager| manager.stats())
    }
}

impl Drop for SyncRuntime {
    fn drop(&mut self) {
        if self.running {
            if let Some(handle) = &self.task_handle {
                handle.abort();
            }
            if let Some(manager) = &self.manager {
                manager.shutdown();
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
