use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::engine::{format_duration, ResponseTracker, StatsReading, TickOutcome, TokenGlyph, TrackerSettings};
use crate::events::Event;
use crate::tmux::TerminalHandle;

/// Who wrote a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Read-only view of a session for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub tab_id: String,
    pub label: String,
    /// tmux session name
    pub terminal: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub last_output: Option<DateTime<Utc>>,
    pub is_thinking: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    /// Time since creation as MM:SS
    pub duration: String,
    /// Elapsed time of the latest progress line
    pub elapsed: Option<String>,
    /// Compact token count of the latest progress line
    pub tokens: Option<String>,
    pub is_thinking: bool,
}

/// Token and time counters.
///
/// Readings for the running command are high-water marks per glyph; they
/// are folded into the committed totals when the next command is sent.
#[derive(Debug)]
struct Counters {
    committed: HashMap<TokenGlyph, u64>,
    current: HashMap<TokenGlyph, u64>,
    latest: Option<StatsReading>,
    duration: Duration,
    last_update: Instant,
}

impl Counters {
    fn new(now: Instant) -> Self {
        Self {
            committed: HashMap::new(),
            current: HashMap::new(),
            latest: None,
            duration: Duration::ZERO,
            last_update: now,
        }
    }

    fn tick(&mut self, now: Instant) {
        self.duration += now.saturating_duration_since(self.last_update);
        self.last_update = now;
    }

    fn apply(&mut self, reading: &StatsReading) {
        let slot = self.current.entry(reading.glyph).or_default();
        *slot = (*slot).max(reading.tokens);
        self.latest = Some(reading.clone());
    }

    fn commit(&mut self) {
        for (glyph, tokens) in self.current.drain() {
            *self.committed.entry(glyph).or_default() += tokens;
        }
    }

    fn total(&self, glyph: TokenGlyph) -> u64 {
        self.committed.get(&glyph).copied().unwrap_or(0) + self.current.get(&glyph).copied().unwrap_or(0)
    }

    fn elapsed(&self, now: Instant) -> Duration {
        self.duration + now.saturating_duration_since(self.last_update)
    }
}

#[derive(Debug)]
struct SessionState {
    last_activity: DateTime<Utc>,
    last_output: Option<DateTime<Utc>>,
    counters: Counters,
    history: Vec<HistoryEntry>,
    tracker: ResponseTracker,
}

impl SessionState {
    fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_activity {
            self.last_activity = now;
        }
    }
}

/// One managed agent terminal and its bookkeeping.
///
/// Identity fields are fixed at creation; mutable state sits behind a
/// per-session lock shared only by the registry and this session's poller.
#[derive(Debug)]
pub struct Session {
    id: String,
    tab_id: String,
    label: String,
    handle: TerminalHandle,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    /// Held for a whole key sequence so writes to the terminal never interleave
    input: AsyncMutex<()>,
}

impl Session {
    pub(crate) fn new(
        id: String,
        tab_id: String,
        label: String,
        handle: TerminalHandle,
        settings: TrackerSettings,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id,
            tab_id,
            label,
            handle,
            created_at,
            state: Mutex::new(SessionState {
                last_activity: created_at,
                last_output: None,
                counters: Counters::new(Instant::now()),
                history: Vec::new(),
                tracker: ResponseTracker::new(settings),
            }),
            input: AsyncMutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn handle(&self) -> &TerminalHandle {
        &self.handle
    }

    /// Exclusive access to the terminal's input line
    pub(crate) async fn lock_input(&self) -> AsyncMutexGuard<'_, ()> {
        self.input.lock().await
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Note a command the user sent
    pub(crate) fn record_command(&self, text: &str, now: Instant) {
        let mut state = self.state();
        state.touch();
        state.counters.commit();
        state.tracker.command_sent(text, now);
        state.history.push(HistoryEntry {
            role: Role::User,
            text: text.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Run one snapshot through the tracker and fold the result into the
    /// counters and history
    pub(crate) fn observe(&self, snapshot: &str, now: Instant) -> TickOutcome {
        let mut state = self.state();
        let outcome = state.tracker.process(snapshot, now);

        state.counters.tick(now);
        if outcome.changed {
            state.last_output = Some(Utc::now());
        }
        for reading in &outcome.readings {
            state.counters.apply(reading);
        }
        for event in &outcome.events {
            if let Event::AssistantText { text } = event {
                state.history.push(HistoryEntry {
                    role: Role::Assistant,
                    text: text.clone(),
                    timestamp: Utc::now(),
                });
            }
        }

        outcome
    }

    pub fn stats(&self, now: Instant) -> SessionStats {
        let state = self.state();
        let counters = &state.counters;
        let input_tokens = counters.total(TokenGlyph::Input);
        let output_tokens = counters.total(TokenGlyph::Output);
        let tool_tokens = counters.total(TokenGlyph::Tool);

        SessionStats {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens + tool_tokens,
            duration: format_duration(counters.elapsed(now).as_secs()),
            elapsed: counters.latest.as_ref().map(|r| r.elapsed.clone()),
            tokens: counters.latest.as_ref().map(StatsReading::tokens_display),
            is_thinking: state.tracker.is_thinking(),
        }
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state().history.clone()
    }

    pub fn info(&self) -> SessionInfo {
        let state = self.state();
        SessionInfo {
            session_id: self.id.clone(),
            tab_id: self.tab_id.clone(),
            label: self.label.clone(),
            terminal: self.handle.name().to_string(),
            created_at: self.created_at,
            last_activity: state.last_activity,
            last_output: state.last_output,
            is_thinking: state.tracker.is_thinking(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            "id-1".to_string(),
            "tab-1".to_string(),
            "Tab 1".to_string(),
            TerminalHandle::new("tabpilot_tab-1"),
            TrackerSettings::default(),
        )
    }

    #[test]
    fn test_history_records_both_roles() {
        let session = session();
        let now = Instant::now();
        session.record_command("say hello", now);
        session.observe("> say hello\n● Hello there, friend.\n", now);

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].text, "say hello");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].text, "Hello there, friend.");
    }

    #[test]
    fn test_counters_commit_per_command() {
        let session = session();
        let now = Instant::now();

        session.record_command("first", now);
        session.observe("> first\n3s · ↑ 1200 tokens\n", now);
        session.observe("> first\n5s · ↑ 1500 tokens\n7s · ↓ 300 tokens\n", now);

        let stats = session.stats(now);
        assert_eq!(stats.input_tokens, 1500);
        assert_eq!(stats.output_tokens, 300);
        assert_eq!(stats.elapsed.as_deref(), Some("7s"));
        assert_eq!(stats.tokens.as_deref(), Some("300"));

        session.record_command("second", now);
        session.observe("> second\n2s · ↑ 400 tokens\n", now);

        let stats = session.stats(now);
        assert_eq!(stats.input_tokens, 1900);
        assert_eq!(stats.output_tokens, 300);
        assert_eq!(stats.total_tokens, 2200);
    }

    #[test]
    fn test_duration_includes_time_since_last_update() {
        let session = session();
        let now = Instant::now();
        session.observe("", now);
        let stats = session.stats(now + Duration::from_secs(65));
        assert_eq!(stats.duration, "01:05");
    }

    #[test]
    fn test_last_activity_moves_forward() {
        let session = session();
        let before = session.info().last_activity;
        session.record_command("anything", Instant::now());
        assert!(session.info().last_activity >= before);
    }
}
