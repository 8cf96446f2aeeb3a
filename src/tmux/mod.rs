mod client;
#[cfg(test)]
pub(crate) mod fake;

pub use client::{TmuxClient, TmuxSession};

use std::fmt;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

/// Address of the terminal backing one session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TerminalHandle {
    name: String,
}

impl TerminalHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// tmux session name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// tmux target for the session's active pane. A bare session name
    /// does not depend on the user's `base-index`.
    pub fn target(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TerminalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The only way the rest of the crate talks to a backing process
#[async_trait]
pub trait Terminal: Send + Sync {
    /// Start `command` in a fresh terminal named `name`. Returns once the
    /// agent has had time to draw its startup banner.
    async fn spawn(&self, name: &str, working_dir: &Path, command: &str) -> Result<TerminalHandle>;

    /// Take over a terminal that is already running
    async fn adopt(&self, name: &str) -> Result<TerminalHandle>;

    /// Discard whatever is typed on the input line
    async fn clear_line(&self, handle: &TerminalHandle) -> Result<()>;

    /// Type `text` without interpreting any of it as key names
    async fn type_literal(&self, handle: &TerminalHandle, text: &str) -> Result<()>;

    /// Press Enter
    async fn submit(&self, handle: &TerminalHandle) -> Result<()>;

    /// Whole scrollback plus the visible screen
    async fn snapshot(&self, handle: &TerminalHandle) -> Result<String>;

    async fn kill(&self, handle: &TerminalHandle) -> Result<()>;

    /// Clear the input line, type `text`, then submit as a separate key
    async fn send_text(&self, handle: &TerminalHandle, text: &str) -> Result<()> {
        self.clear_line(handle).await?;
        self.type_literal(handle, text).await?;
        self.submit(handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_has_no_window_index() {
        let handle = TerminalHandle::new("tabpilot_tab1");
        assert_eq!(handle.target(), "tabpilot_tab1");
        assert_eq!(handle.to_string(), "tabpilot_tab1");
    }
}
