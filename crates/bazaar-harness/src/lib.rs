//! Bazaar Harness
//!
//! Scriptable test doubles for the sync engine: a push connector whose
//! accept/reject/emit behavior is driven from the test body, in-memory
//! REST API implementations with staged results and recorded calls, and
//! wire-shaped frame builders. Everything here is deterministic; nothing
//! touches the network.

pub mod api;
pub mod connector;
pub mod frames;

pub use api::{
    ChatCall, InMemoryChatApi, InMemoryNotificationApi, InMemoryScoreApi, NotificationCall,
    ScoreCall,
};
pub use connector::{ConnectAttempt, ScriptedConnector};
