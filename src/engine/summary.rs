//! Final-summary extraction.
//!
//! The agent's closing answer often has no marker glyph, so once it goes
//! idle the most recent prose-looking line is pulled out and shortened.

use once_cell::sync::Lazy;
use regex::Regex;

use super::classify::{is_thinking_line, is_tool_call, strip_marker};
use super::dedup::SeenSet;
use super::permission::is_prompt_line;
use super::stats::is_stats_line;

const ELLIPSIS: &str = "...";

/// Sentences kept from the candidate line
const MAX_SENTENCES: usize = 2;

/// Stack traces, log records and code fragments
static RE_LOG_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)(traceback|exception|panicked|error:|warning:|File .+, line \d+",
        r"|\bat \S+:\d+|\[(trace|debug|info|warn|error)\]",
        r"|\b\d{1,2}:\d{2}:\d{2}\b|::|=>|->|\w+\.\w+\()",
    ))
    .unwrap()
});

const CHROME_LABELS: &[&str] = &["Human:", "The user sent", "> "];

#[derive(Debug, Clone, Copy)]
pub struct SummaryRules {
    pub char_budget: usize,
    pub min_words: usize,
}

impl Default for SummaryRules {
    fn default() -> Self {
        Self {
            char_budget: 200,
            min_words: 4,
        }
    }
}

/// Whether `line` reads like a sentence written for a human
pub fn is_prose(line: &str, min_words: usize) -> bool {
    let text = strip_marker(line).unwrap_or_else(|| line.trim());
    let Some(first) = text.chars().next() else {
        return false;
    };

    if !(first.is_alphanumeric() || first == '"' || first == '\'') {
        return false;
    }
    if CHROME_LABELS.iter().any(|label| text.starts_with(label)) {
        return false;
    }
    if text.chars().any(is_box_drawing) || text.matches('|').count() >= 2 {
        return false;
    }
    if RE_LOG_NOISE.is_match(text) {
        return false;
    }
    if is_tool_call(text) || is_stats_line(text) || is_thinking_line(text) || is_prompt_line(text) {
        return false;
    }

    text.split_whitespace().count() >= min_words
}

fn is_box_drawing(c: char) -> bool {
    ('\u{2500}'..='\u{259F}').contains(&c) || c == '⎿'
}

/// Split on ". ", "? " and "! ", keeping the punctuation
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '?' | '!') && bytes.get(i + 1) == Some(&b' ') {
            let sentence = text[start..=i].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = i + 2;
        }
    }

    let rest = text[start.min(text.len())..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

/// First sentences of `text`, at most `budget` characters including the
/// ellipsis that marks any cut
pub fn summarize(text: &str, budget: usize) -> String {
    let text = text.trim();
    let all = sentences(text);
    let kept = all[..all.len().min(MAX_SENTENCES)].join(" ");
    let dropped_sentences = all.len() > MAX_SENTENCES;

    let ellipsis_len = ELLIPSIS.chars().count();
    if kept.chars().count() > budget {
        let head: String = kept.chars().take(budget.saturating_sub(ellipsis_len)).collect();
        return format!("{}{}", head.trim_end(), ELLIPSIS);
    }

    if dropped_sentences {
        let body = kept.trim_end_matches('.');
        if body.chars().count() + ellipsis_len <= budget {
            return format!("{body}{ELLIPSIS}");
        }
        let head: String = body.chars().take(budget.saturating_sub(ellipsis_len)).collect();
        return format!("{}{}", head.trim_end(), ELLIPSIS);
    }

    kept
}

/// Look backwards through `lines` for the latest prose line and summarize
/// it. Returns `None` when that line was already emitted.
pub fn find_summary(lines: &[&str], rules: &SummaryRules, seen: &SeenSet) -> Option<String> {
    let line = lines.iter().rev().find(|line| is_prose(line, rules.min_words))?;
    let text = strip_marker(line).unwrap_or_else(|| line.trim());

    let summary = summarize(text, rules.char_budget);
    if seen.contains(text) || seen.contains(&summary) {
        return None;
    }
    Some(summary)
}
