//! tabpilot drives interactive coding agents running in tmux sessions and
//! turns their redrawn screens into a stream of chat events.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
mod poller;
pub mod registry;
pub mod session;
pub mod tmux;

pub use config::Config;
pub use error::{OrchestratorError, Result};
pub use events::Event;
pub use registry::{EventStream, SessionRegistry};
pub use session::{HistoryEntry, Role, SessionInfo, SessionStats};
