//! Permission auto-responder.
//!
//! Detects interactive confirmation prompts on the agent's screen and picks
//! the keystrokes that accept them. Detection is heuristic: prose that
//! happens to ask "continue?" will also match.

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ApprovalConfig;

/// Prompt-arrow glyph the agent draws next to the selected menu option
pub const PROMPT_ARROW: char = '❯';

/// Keystrokes sent to accept a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptResponse {
    /// Type "1" then submit
    SelectFirst,
    /// Submit alone
    Submit,
    /// Type "y" then submit
    Yes,
}

impl PromptResponse {
    /// Literal text typed before the submit key, if any
    pub fn literal(&self) -> Option<&'static str> {
        match self {
            PromptResponse::SelectFirst => Some("1"),
            PromptResponse::Submit => None,
            PromptResponse::Yes => Some("y"),
        }
    }
}

/// Which heuristic family recognised the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptFamily {
    /// Arrow glyph with an affirmative option nearby
    ArrowMenu,
    /// Keyword or punctuation pattern
    Keyword,
    /// The agent's own confirmation phrasing
    AgentPhrase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMatch {
    pub family: PromptFamily,
    pub response: PromptResponse,
    /// The line that triggered the match
    pub line: String,
}

/// Lines around the arrow glyph searched for an affirmative option
const ARROW_WINDOW_BEFORE: usize = 2;
const ARROW_WINDOW_AFTER: usize = 3;

const ARROW_AFFIRMATIVES: &[&str] = &["yes", "1.", "proceed", "approve"];

static RE_NUMBERED_OPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:❯\s*)?1[.)]\s*\S").unwrap());

static RE_SELECT_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)(press\s+1\b|^\s*(?:❯\s*)?1[.)]\s*yes\b|\[1\][^\n]*\byes\b)").unwrap()
});

static RE_PRESS_ENTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(press|hit)\s+(enter|return)\b").unwrap());

static RE_CONFIRM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(\b(approve|permission|confirm|continue|allow)\b[^\n]*\?",
        r"|\by/n\b|\byes/no\b",
        r"|\bare you sure\b[^\n]*\?",
        r"|\bwould you like to\b[^\n]*\?)",
    ))
    .unwrap()
});

/// Phrases the agent uses in its own tool-approval dialogs
const AGENT_PHRASES: &[&str] = &[
    "do you want to proceed?",
    "do you want to make this edit",
    "do you want to create",
    "yes, and don't ask again",
];

/// Lines echoing what the user typed are never prompts
fn is_user_echo(line: &str) -> bool {
    line.trim_start().starts_with("> ")
}

/// Scan `text` for a permission prompt, trying the heuristic families in
/// priority order
pub fn detect_prompt(text: &str) -> Option<PromptMatch> {
    let lines: Vec<&str> = text.lines().collect();

    detect_arrow_menu(&lines)
        .or_else(|| detect_keyword(&lines))
        .or_else(|| detect_agent_phrase(&lines))
}

fn detect_arrow_menu(lines: &[&str]) -> Option<PromptMatch> {
    for (i, line) in lines.iter().enumerate() {
        let Some((_, after)) = line.split_once(PROMPT_ARROW) else {
            continue;
        };
        // A bare arrow is the agent's idle input prompt
        if after.trim().is_empty() {
            continue;
        }

        let start = i.saturating_sub(ARROW_WINDOW_BEFORE);
        let end = (i + ARROW_WINDOW_AFTER).min(lines.len());
        let window = lines[start..end].join("\n");
        let lowered = window.to_lowercase();

        if ARROW_AFFIRMATIVES.iter().any(|word| lowered.contains(word)) {
            let response = if RE_NUMBERED_OPTION.is_match(&window) {
                PromptResponse::SelectFirst
            } else {
                PromptResponse::Submit
            };
            return Some(PromptMatch {
                family: PromptFamily::ArrowMenu,
                response,
                line: line.trim().to_string(),
            });
        }
    }
    None
}

fn detect_keyword(lines: &[&str]) -> Option<PromptMatch> {
    let candidates = || lines.iter().filter(|line| !is_user_echo(line));

    let patterns: [(&Regex, PromptResponse); 3] = [
        (&*RE_SELECT_FIRST, PromptResponse::SelectFirst),
        (&*RE_PRESS_ENTER, PromptResponse::Submit),
        (&*RE_CONFIRM, PromptResponse::Yes),
    ];

    for (pattern, response) in patterns {
        if let Some(line) = candidates().find(|line| pattern.is_match(line)) {
            return Some(PromptMatch {
                family: PromptFamily::Keyword,
                response,
                line: line.trim().to_string(),
            });
        }
    }
    None
}

fn detect_agent_phrase(lines: &[&str]) -> Option<PromptMatch> {
    lines
        .iter()
        .filter(|line| !is_user_echo(line))
        .find(|line| {
            let lowered = line.to_lowercase();
            AGENT_PHRASES.iter().any(|phrase| lowered.contains(phrase))
        })
        .map(|line| PromptMatch {
            family: PromptFamily::AgentPhrase,
            response: PromptResponse::SelectFirst,
            line: line.trim().to_string(),
        })
}

/// Whether a single line looks like part of a permission prompt
pub fn is_prompt_line(line: &str) -> bool {
    if is_user_echo(line) {
        return false;
    }
    let trimmed = line.trim_start();
    if trimmed.starts_with(PROMPT_ARROW) && RE_NUMBERED_OPTION.is_match(trimmed) {
        return true;
    }
    let lowered = line.to_lowercase();
    RE_SELECT_FIRST.is_match(line)
        || RE_PRESS_ENTER.is_match(line)
        || RE_CONFIRM.is_match(line)
        || AGENT_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

/// Answers prompts, at most once per cooldown window.
#[derive(Debug)]
pub struct PermissionResponder {
    enabled: bool,
    cooldown: Duration,
    scan_lines: usize,
    last_response: Option<Instant>,
}

impl PermissionResponder {
    pub fn new(config: &ApprovalConfig) -> Self {
        Self {
            enabled: config.enabled,
            cooldown: config.cooldown(),
            scan_lines: config.scan_lines.max(1),
            last_response: None,
        }
    }

    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.last_response
            .is_some_and(|at| now.saturating_duration_since(at) < self.cooldown)
    }

    /// Check the tail of `snapshot` for a prompt. A match starts the
    /// cooldown window; the caller is expected to send the response.
    pub fn check(&mut self, snapshot: &str, now: Instant) -> Option<PromptMatch> {
        if !self.enabled || self.in_cooldown(now) {
            return None;
        }

        // tmux pads the pane with blank rows below the cursor
        let lines: Vec<&str> = snapshot.trim_end().lines().collect();
        let tail = lines[lines.len().saturating_sub(self.scan_lines)..].join("\n");
        let found = detect_prompt(&tail)?;
        self.last_response = Some(now);
        Some(found)
    }
}
