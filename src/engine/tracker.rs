//! Per-session response tracker.
//!
//! Owns everything one session needs to turn successive screen snapshots
//! into events: the previous snapshot, the emitted-text hashes, the
//! thinking flag, the permission cooldown and the in-flight command.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use super::classify::{classify_line, is_thinking_line, strip_marker, ClassifyContext, LineClass};
use super::dedup::SeenSet;
use super::diff::SnapshotDiffer;
use super::permission::{PermissionResponder, PromptMatch};
use super::stats::{StatsReading, TokenGlyph};
use super::summary::{find_summary, SummaryRules};
use crate::config::{ApprovalConfig, Config, ExtractionConfig};
use crate::events::Event;

/// Characters of the submitted command used to find its echo on screen
const ANCHOR_CHARS: usize = 40;

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub classify: ClassifyContext,
    pub summary: SummaryRules,
    pub silence_timeout: Duration,
    pub seen_capacity: usize,
    pub tail_hash_chars: usize,
    pub thinking_window_lines: usize,
    pub summary_scan_lines: usize,
    pub approval: ApprovalConfig,
}

impl TrackerSettings {
    pub fn from_config(config: &Config) -> Self {
        let extraction: &ExtractionConfig = &config.extraction;
        Self {
            classify: ClassifyContext {
                min_commentary_chars: extraction.min_commentary_chars,
            },
            summary: SummaryRules {
                char_budget: extraction.summary_char_budget,
                min_words: extraction.min_summary_words,
            },
            silence_timeout: extraction.silence_timeout(),
            seen_capacity: extraction.seen_capacity,
            tail_hash_chars: extraction.tail_hash_chars,
            thinking_window_lines: extraction.thinking_window_lines.max(1),
            summary_scan_lines: extraction.summary_scan_lines.max(1),
            approval: config.approval.clone(),
        }
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What one polling tick produced
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Classified events in screen order
    pub events: Vec<Event>,
    /// A permission prompt to answer; classification was skipped
    pub prompt: Option<PromptMatch>,
    /// Every progress reading seen this tick, in screen order
    pub readings: Vec<StatsReading>,
    /// The reading reported as a `StatsUpdate`, if any
    pub stats: Option<StatsReading>,
    /// The screen changed since the previous tick
    pub changed: bool,
}

#[derive(Debug)]
struct PendingCommand {
    sent_at: Instant,
}

#[derive(Debug)]
pub struct ResponseTracker {
    settings: TrackerSettings,
    differ: SnapshotDiffer,
    responder: PermissionResponder,
    seen: SeenSet,
    thinking: bool,
    last_command: Option<String>,
    pending: Option<PendingCommand>,
    /// Last (elapsed, tokens) reported per glyph for the current command
    reported_stats: HashMap<TokenGlyph, (String, u64)>,
}

impl ResponseTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            differ: SnapshotDiffer::new(settings.tail_hash_chars),
            responder: PermissionResponder::new(&settings.approval),
            seen: SeenSet::new(settings.seen_capacity),
            thinking: false,
            last_command: None,
            pending: None,
            reported_stats: HashMap::new(),
            settings,
        }
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking
    }

    /// Whether a command is still waiting for its final answer
    pub fn has_pending_command(&self) -> bool {
        self.pending.is_some()
    }

    /// Record a command typed into the terminal. Supersedes any command
    /// still in flight.
    pub fn command_sent(&mut self, text: &str, now: Instant) {
        let anchor: String = text
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .chars()
            .take(ANCHOR_CHARS)
            .collect();
        self.last_command = (!anchor.is_empty()).then_some(anchor);
        self.pending = Some(PendingCommand { sent_at: now });
        self.reported_stats.clear();
    }

    pub fn process(&mut self, snapshot: &str, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        if let Some(prompt) = self.responder.check(snapshot, now) {
            debug!(line = %prompt.line, family = ?prompt.family, "permission prompt detected");
            outcome.prompt = Some(prompt);
            return outcome;
        }

        let diff = self.differ.observe(snapshot, now);
        outcome.changed = diff.changed;
        let lines: Vec<&str> = snapshot.lines().collect();
        let anchor = self.command_anchor(&lines);

        let thinking = self.thinking_in(&lines[anchor..]);
        let became_idle = self.thinking && !thinking;
        if thinking && !self.thinking {
            outcome.events.push(Event::ThinkingStateChanged { thinking: true });
        }
        self.thinking = thinking;

        if diff.changed {
            let start = anchor.max(diff.first_new_line(snapshot)).min(lines.len());
            self.classify_lines(&lines[start..], &mut outcome);
        }

        if became_idle {
            outcome.events.push(Event::ThinkingStateChanged { thinking: false });
        }

        let silent = !thinking
            && self.pending.as_ref().is_some_and(|pending| {
                now.saturating_duration_since(pending.sent_at) >= self.settings.silence_timeout
                    && self
                        .differ
                        .since_last_change(now)
                        .is_some_and(|quiet| quiet >= self.settings.silence_timeout)
            });

        if (became_idle || silent) && self.pending.is_some() {
            let scan_from = lines.len().saturating_sub(self.settings.summary_scan_lines).max(anchor);
            let region = &lines[scan_from.min(lines.len())..];
            match find_summary(region, &self.settings.summary, &self.seen) {
                Some(summary) => {
                    self.seen.insert(&summary);
                    outcome.events.push(Event::assistant(summary));
                    self.pending = None;
                }
                None if silent => {
                    debug!("no final summary found after silence");
                    self.pending = None;
                }
                None => {}
            }
        }

        outcome
    }

    fn classify_lines(&mut self, lines: &[&str], outcome: &mut TickOutcome) {
        for line in lines {
            match classify_line(line, &self.settings.classify) {
                LineClass::Stats(reading) => outcome.readings.push(reading),
                LineClass::Commentary(text) => {
                    if self.seen.insert(&text) {
                        outcome.events.push(Event::assistant(text));
                    }
                }
                LineClass::Prompt | LineClass::Thinking | LineClass::Chrome => {}
            }
        }

        // The most recent reading wins
        let Some(reading) = outcome.readings.last().cloned() else {
            return;
        };

        let report = match self.reported_stats.get(&reading.glyph) {
            Some((elapsed, tokens)) => {
                reading.tokens >= *tokens && (reading.tokens != *tokens || reading.elapsed != *elapsed)
            }
            None => true,
        };
        if report {
            self.reported_stats
                .insert(reading.glyph, (reading.elapsed.clone(), reading.tokens));
            outcome.events.push(Event::StatsUpdate {
                elapsed: reading.elapsed.clone(),
                tokens: reading.tokens,
                tokens_display: reading.tokens_display(),
            });
            outcome.stats = Some(reading);
        }
    }

    /// Index of the first line after the echo of the last command
    fn command_anchor(&self, lines: &[&str]) -> usize {
        let Some(needle) = self.last_command.as_deref() else {
            return 0;
        };
        lines
            .iter()
            .rposition(|line| line.contains(needle))
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    fn thinking_in(&self, lines: &[&str]) -> bool {
        lines
            .iter()
            .rev()
            .filter(|line| !line.trim().is_empty())
            .take(self.settings.thinking_window_lines)
            .any(|line| strip_marker(line).is_none() && is_thinking_line(line))
    }
}
