//! Line classification.
//!
//! Each line of new screen content falls into exactly one [`LineClass`].
//! The rules are tried in order and the first match wins; a line no rule
//! claims is chrome.

use once_cell::sync::Lazy;
use regex::Regex;

use super::permission::is_prompt_line;
use super::stats::{parse_stats, StatsReading};

/// Glyphs the agent prefixes its own narration with
pub const MARKERS: &[char] = &['●', '⏺', '•'];

/// Speaker labels some agent builds print instead of a marker glyph
const SPEAKER_PREFIXES: &[&str] = &["Claude:", "Assistant:"];

/// Tool invocations rendered as `Name(args)`
const TOOL_NAMES: &[&str] = &[
    "Agent", "Bash", "BashOutput", "Call", "Edit", "ExitPlanMode", "Fetch", "Glob", "Grep",
    "KillShell", "LS", "List", "MultiEdit", "NotebookEdit", "NotebookRead", "Read", "Search",
    "Skill", "Task", "TodoWrite", "Update", "WebFetch", "WebSearch", "Write",
];

static RE_TOOL_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Z][A-Za-z]+\(|[\w.-]+ - [\w.-]+ \(MCP\))").unwrap()
});

static RE_THINKING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(esc to interrupt",
        r"|\b(simmering|deciphering|shimmying|thinking|pondering|cogitating|musing|brewing",
        r"|churning|computing|processing|working|percolating|reticulating|mulling|noodling",
        r"|clauding|crafting|forging|conjuring|hatching|marinating|spinning)(…|\.\.\.)",
        r"|^\s*[✻✽✢✶✳✺·*]\s*\w+ing(…|\.\.\.)",
        r"|\d\s*[kK]?\s*tokens\b)",
    ))
    .unwrap()
});

/// What one line of screen content is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    /// Part of a permission prompt
    Prompt,
    /// A progress line with elapsed time and token count
    Stats(StatsReading),
    /// A transient working/spinner caption
    Thinking,
    /// The agent's own narration, marker stripped
    Commentary(String),
    /// Decoration, tool calls, prompts and anything else
    Chrome,
}

/// Knobs the rules need
#[derive(Debug, Clone, Copy)]
pub struct ClassifyContext {
    pub min_commentary_chars: usize,
}

impl Default for ClassifyContext {
    fn default() -> Self {
        Self {
            min_commentary_chars: 3,
        }
    }
}

/// A named matcher; returns `Some` when it claims the line
pub struct LineRule {
    pub name: &'static str,
    pub classify: fn(&str, &ClassifyContext) -> Option<LineClass>,
}

/// Rules in priority order
pub const LINE_RULES: &[LineRule] = &[
    LineRule {
        name: "prompt",
        classify: classify_prompt,
    },
    LineRule {
        name: "stats",
        classify: classify_stats,
    },
    LineRule {
        name: "thinking",
        classify: classify_thinking,
    },
    LineRule {
        name: "commentary",
        classify: classify_commentary,
    },
];

pub fn classify_line(line: &str, ctx: &ClassifyContext) -> LineClass {
    LINE_RULES
        .iter()
        .find_map(|rule| (rule.classify)(line, ctx))
        .unwrap_or(LineClass::Chrome)
}

fn classify_prompt(line: &str, _ctx: &ClassifyContext) -> Option<LineClass> {
    is_prompt_line(line).then_some(LineClass::Prompt)
}

fn classify_stats(line: &str, _ctx: &ClassifyContext) -> Option<LineClass> {
    parse_stats(line).map(LineClass::Stats)
}

fn classify_thinking(line: &str, _ctx: &ClassifyContext) -> Option<LineClass> {
    if strip_marker(line).is_some() {
        return None;
    }
    is_thinking_line(line).then_some(LineClass::Thinking)
}

fn classify_commentary(line: &str, ctx: &ClassifyContext) -> Option<LineClass> {
    let text = strip_marker(line)?;
    if is_tool_call(text) {
        return None;
    }
    if text.chars().count() < ctx.min_commentary_chars {
        return None;
    }
    Some(LineClass::Commentary(text.to_string()))
}

/// Whether the line carries the agent's working indicator
pub fn is_thinking_line(line: &str) -> bool {
    RE_THINKING.is_match(line)
}

/// The text after a narration marker or speaker label, trimmed
pub fn strip_marker(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix(MARKERS) {
        return Some(rest.trim());
    }
    SPEAKER_PREFIXES
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .map(str::trim)
}

pub fn is_tool_call(text: &str) -> bool {
    TOOL_NAMES
        .iter()
        .any(|name| text.strip_prefix(name).is_some_and(|rest| rest.starts_with('(')))
        || RE_TOOL_CALL.is_match(text)
}
