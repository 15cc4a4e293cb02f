//! Channel Module
//!
//! The CSP (Communicating Sequential Processes) channel infrastructure:
//! - `communication`: typed messages between tasks (commands, effects,
//!   completions, app events, push frames) and the status enums
//! - `utils`: channel aliases, constructors, and send helpers

pub mod communication;
pub mod utils;

// Re-export communication types
pub use communication::{
    event_names, AppEvent, Command, Completion, ConnectionStatus, Effect, PageKind, PushFrame,
    ScoreFetchOrigin, SyncStatus,
};

// Re-export ChannelConfig from config module
pub use crate::config::ChannelConfig;

// Re-export utility types
pub use utils::{
    create_app_event_channel, create_command_channel, create_completion_channel,
    create_frame_channel, create_status_channel, AppEventReceiver, AppEventSender, ChannelError,
    ChannelStats, CommandReceiver, CommandSender, CompletionReceiver, CompletionSender,
    FrameReceiver, FrameSender, NonBlockingSend, StatusReceiver, StatusSender,
};
