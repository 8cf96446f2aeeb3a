//! Configuration for tabpilot.
//!
//! Loaded from a TOML file; every field falls back to a default so an absent
//! or partial file is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "TABPILOT_CONFIG";

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of live sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub tmux: TmuxConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub approval: ApprovalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            agent: AgentConfig::default(),
            tmux: TmuxConfig::default(),
            polling: PollingConfig::default(),
            extraction: ExtractionConfig::default(),
            approval: ApprovalConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `$TABPILOT_CONFIG` or the user config dir,
    /// or return defaults if no file exists
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_ENV) {
            Some(path) => PathBuf::from(path),
            None => Self::config_path()?,
        };
        Self::load_from(&path)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not find config directory")?;

        Ok(config_dir.join("tabpilot").join("config.toml"))
    }
}

/// The agent process each session runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Shell command line started inside the terminal
    #[serde(default = "default_agent_command")]
    pub command: String,

    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// tmux key names sent once after startup (e.g. "Down", "Enter")
    #[serde(default)]
    pub startup_keys: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            working_dir: default_working_dir(),
            startup_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmuxConfig {
    #[serde(default = "default_tmux_binary")]
    pub binary: String,

    /// Prefix for the tmux session names tabpilot creates
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,

    /// How long to wait for the agent's startup banner after spawning
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_width")]
    pub width: u16,

    #[serde(default = "default_height")]
    pub height: u16,
}

impl TmuxConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            binary: default_tmux_binary(),
            session_prefix: default_session_prefix(),
            settle_ms: default_settle_ms(),
            width: default_width(),
            height: default_height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Sleep after a failed snapshot before the next tick
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

/// Tuning for the response extraction engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Quiet period after a command before the final-summary scan runs
    #[serde(default = "default_silence_timeout_ms")]
    pub silence_timeout_ms: u64,

    #[serde(default = "default_summary_char_budget")]
    pub summary_char_budget: usize,

    /// How many trailing lines the final-summary scan looks at
    #[serde(default = "default_summary_scan_lines")]
    pub summary_scan_lines: usize,

    #[serde(default = "default_min_commentary_chars")]
    pub min_commentary_chars: usize,

    #[serde(default = "default_min_summary_words")]
    pub min_summary_words: usize,

    /// Capacity of the already-emitted hash set
    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,

    /// Number of trailing characters hashed to detect screen changes
    #[serde(default = "default_tail_hash_chars")]
    pub tail_hash_chars: usize,

    /// Trailing lines checked for the thinking indicator
    #[serde(default = "default_thinking_window_lines")]
    pub thinking_window_lines: usize,
}

impl ExtractionConfig {
    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            silence_timeout_ms: default_silence_timeout_ms(),
            summary_char_budget: default_summary_char_budget(),
            summary_scan_lines: default_summary_scan_lines(),
            min_commentary_chars: default_min_commentary_chars(),
            min_summary_words: default_min_summary_words(),
            seen_capacity: default_seen_capacity(),
            tail_hash_chars: default_tail_hash_chars(),
            thinking_window_lines: default_thinking_window_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period after an auto-response during which prompts are ignored
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Trailing snapshot lines scanned for permission prompts
    #[serde(default = "default_scan_lines")]
    pub scan_lines: usize,
}

impl ApprovalConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_ms: default_cooldown_ms(),
            scan_lines: default_scan_lines(),
        }
    }
}

fn default_max_sessions() -> usize {
    4
}

fn default_agent_command() -> String {
    "claude".to_string()
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_tmux_binary() -> String {
    "tmux".to_string()
}

fn default_session_prefix() -> String {
    "tabpilot".to_string()
}

fn default_settle_ms() -> u64 {
    3000
}

fn default_width() -> u16 {
    200
}

fn default_height() -> u16 {
    50
}

fn default_interval_ms() -> u64 {
    500
}

fn default_error_backoff_ms() -> u64 {
    1000
}

fn default_silence_timeout_ms() -> u64 {
    2000
}

fn default_summary_char_budget() -> usize {
    200
}

fn default_summary_scan_lines() -> usize {
    20
}

fn default_min_commentary_chars() -> usize {
    3
}

fn default_min_summary_words() -> usize {
    4
}

fn default_seen_capacity() -> usize {
    1000
}

fn default_tail_hash_chars() -> usize {
    1000
}

fn default_thinking_window_lines() -> usize {
    12
}

fn default_true() -> bool {
    true
}

fn default_cooldown_ms() -> u64 {
    3000
}

fn default_scan_lines() -> usize {
    50
}
