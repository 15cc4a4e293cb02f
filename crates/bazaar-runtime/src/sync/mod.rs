//! Sync Task Module
//!
//! The single-writer event loop behind the engine: [`SyncState`] owns
//! every store, [`SyncHandlers`] turns each input into effects and app
//! events, and [`SyncTask`] runs the select loop that feeds them and
//! executes what they return.

pub mod handlers;
pub mod state;
pub mod task;

pub use handlers::{Dispatch, SyncHandlers};
pub use state::{SyncState, SyncStats};
pub use task::{SyncApis, SyncTask};
