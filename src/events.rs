use serde::{Deserialize, Serialize};

/// Events emitted by a session's polling loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Text the agent wrote for the user
    AssistantText { text: String },
    /// The agent's progress line changed
    StatsUpdate {
        /// Elapsed time as printed by the agent (e.g. "12s")
        elapsed: String,
        /// Raw token count
        tokens: u64,
        /// Compact token count (e.g. "1.2K")
        tokens_display: String,
    },
    /// The agent started or stopped working
    ThinkingStateChanged { thinking: bool },
    /// A permission prompt was answered automatically
    PermissionPromptHandled {},
}

impl Event {
    pub fn assistant(text: impl Into<String>) -> Self {
        Event::AssistantText { text: text.into() }
    }
}
