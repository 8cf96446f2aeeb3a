//! Session registry: the single owner of the tab -> session map.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::TrackerSettings;
use crate::error::{OrchestratorError, Result};
use crate::events::Event;
use crate::poller::{self, PollTiming};
use crate::session::{HistoryEntry, Session, SessionInfo, SessionStats};
use crate::tmux::{Terminal, TerminalHandle};

/// Receiving half of a session's event stream. Yields `None` once the
/// session is closed.
pub type EventStream = mpsc::UnboundedReceiver<Event>;

struct SessionEntry {
    session: Arc<Session>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<String, SessionEntry>,
    /// Tabs whose terminal is being spawned; they hold a slot under the cap
    reserved: HashSet<String>,
    foreground: Option<String>,
}

impl RegistryState {
    fn live(&self) -> usize {
        self.sessions.len() + self.reserved.len()
    }
}

pub struct SessionRegistry {
    terminal: Arc<dyn Terminal>,
    config: Arc<Config>,
    state: Mutex<RegistryState>,
}

impl SessionRegistry {
    pub fn new(terminal: Arc<dyn Terminal>, config: Arc<Config>) -> Self {
        Self {
            terminal,
            config,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Spawn a new agent terminal for `tab_id` and start polling it
    pub async fn create_session(&self, tab_id: &str, label: &str) -> Result<(SessionInfo, EventStream)> {
        self.reserve(tab_id).await?;

        let name = terminal_name(&self.config.tmux.session_prefix, tab_id);
        let spawned = self
            .terminal
            .spawn(&name, &self.config.agent.working_dir, &self.config.agent.command)
            .await;

        match spawned {
            Ok(handle) => Ok(self.register(tab_id, label, handle).await),
            Err(e) => {
                self.release(tab_id).await;
                warn!(tab_id = %tab_id, error = %e, "failed to spawn agent terminal");
                Err(OrchestratorError::SpawnFailure(format!("{e:#}")))
            }
        }
    }

    /// Take over an already-running tmux session for `tab_id`
    pub async fn adopt_session(
        &self,
        tab_id: &str,
        terminal_name: &str,
        label: &str,
    ) -> Result<(SessionInfo, EventStream)> {
        self.reserve(tab_id).await?;

        match self.terminal.adopt(terminal_name).await {
            Ok(handle) => Ok(self.register(tab_id, label, handle).await),
            Err(e) => {
                self.release(tab_id).await;
                Err(OrchestratorError::SpawnFailure(format!("{e:#}")))
            }
        }
    }

    /// Type `text` into the tab's terminal. Returns the session id.
    pub async fn route_command(&self, tab_id: &str, text: &str) -> Result<String> {
        let session = self.session(tab_id).await?;
        let _input = session.lock_input().await;

        self.terminal
            .send_text(session.handle(), text)
            .await
            .map_err(|e| {
                warn!(tab_id = %tab_id, error = %e, "failed to send command");
                OrchestratorError::TransientIo(format!("{e:#}"))
            })?;

        session.record_command(text, Instant::now());
        debug!(tab_id = %tab_id, chars = text.len(), "command routed");
        Ok(session.id().to_string())
    }

    /// Stop polling, kill the terminal and forget the session
    pub async fn close_session(&self, tab_id: &str) -> Result<()> {
        let entry = {
            let mut state = self.state.lock().await;
            let entry = state
                .sessions
                .remove(tab_id)
                .ok_or_else(|| OrchestratorError::NoSuchSession(tab_id.to_string()))?;

            if state.foreground.as_deref() == Some(tab_id) {
                state.foreground = state.sessions.keys().next().cloned();
            }
            entry
        };

        let _ = entry.stop.send(true);
        if let Err(e) = entry.task.await {
            warn!(tab_id = %tab_id, error = %e, "polling task ended abnormally");
        }

        if let Err(e) = self.terminal.kill(entry.session.handle()).await {
            warn!(tab_id = %tab_id, error = %e, "failed to kill terminal");
        }

        info!(tab_id = %tab_id, session = %entry.session.handle(), "session closed");
        Ok(())
    }

    /// Mark `tab_id` as the foreground session
    pub async fn switch(&self, tab_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.sessions.contains_key(tab_id) {
            return Err(OrchestratorError::NoSuchSession(tab_id.to_string()));
        }
        state.foreground = Some(tab_id.to_string());
        Ok(())
    }

    pub async fn foreground(&self) -> Option<String> {
        self.state.lock().await.foreground.clone()
    }

    pub async fn stats(&self, tab_id: &str) -> Result<SessionStats> {
        Ok(self.session(tab_id).await?.stats(Instant::now()))
    }

    pub async fn history(&self, tab_id: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self.session(tab_id).await?.history())
    }

    /// All live sessions, oldest first
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .state
            .lock()
            .await
            .sessions
            .values()
            .map(|entry| entry.session.info())
            .collect();
        sessions.sort_by_key(|info| info.created_at);
        sessions
    }

    /// Close every session
    pub async fn shutdown(&self) {
        let tabs: Vec<String> = self.state.lock().await.sessions.keys().cloned().collect();
        for tab_id in tabs {
            if let Err(e) = self.close_session(&tab_id).await {
                debug!(tab_id = %tab_id, error = %e, "session already gone");
            }
        }
    }

    async fn session(&self, tab_id: &str) -> Result<Arc<Session>> {
        self.state
            .lock()
            .await
            .sessions
            .get(tab_id)
            .map(|entry| Arc::clone(&entry.session))
            .ok_or_else(|| OrchestratorError::NoSuchSession(tab_id.to_string()))
    }

    /// Claim a slot for `tab_id` before the (slow) spawn so concurrent
    /// creations cannot overshoot the cap
    async fn reserve(&self, tab_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.sessions.contains_key(tab_id) || state.reserved.contains(tab_id) {
            return Err(OrchestratorError::TabInUse(tab_id.to_string()));
        }
        if state.live() >= self.config.max_sessions {
            return Err(OrchestratorError::CapacityExceeded {
                max: self.config.max_sessions,
            });
        }
        state.reserved.insert(tab_id.to_string());
        Ok(())
    }

    async fn release(&self, tab_id: &str) {
        self.state.lock().await.reserved.remove(tab_id);
    }

    async fn register(&self, tab_id: &str, label: &str, handle: TerminalHandle) -> (SessionInfo, EventStream) {
        let label = if label.is_empty() { tab_id } else { label };
        let session = Arc::new(Session::new(
            Uuid::new_v4().to_string(),
            tab_id.to_string(),
            label.to_string(),
            handle,
            TrackerSettings::from_config(&self.config),
        ));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let timing = PollTiming {
            interval: self.config.polling.interval(),
            error_backoff: self.config.polling.error_backoff(),
        };
        let task = tokio::spawn(poller::run(
            Arc::clone(&session),
            Arc::clone(&self.terminal),
            timing,
            events_tx,
            stop_rx,
        ));

        let info = session.info();
        let mut state = self.state.lock().await;
        state.reserved.remove(tab_id);
        state.sessions.insert(
            tab_id.to_string(),
            SessionEntry {
                session,
                stop: stop_tx,
                task,
            },
        );
        if state.foreground.is_none() {
            state.foreground = Some(tab_id.to_string());
        }

        info!(tab_id = %tab_id, session_id = %info.session_id, terminal = %info.terminal, "session registered");
        (info, events_rx)
    }
}

/// tmux session name for a tab. tmux rejects '.' and ':' in names.
fn terminal_name(prefix: &str, tab_id: &str) -> String {
    let tab: String = tab_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{prefix}_{tab}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmux::fake::FakeTerminal;
    use std::time::Duration;

    fn registry(max_sessions: usize) -> (Arc<FakeTerminal>, SessionRegistry) {
        let mut config = Config::default();
        config.max_sessions = max_sessions;
        config.polling.interval_ms = 10;
        config.polling.error_backoff_ms = 10;

        let fake = Arc::new(FakeTerminal::new());
        let terminal: Arc<dyn Terminal> = fake.clone();
        (fake, SessionRegistry::new(terminal, Arc::new(config)))
    }

    async fn next_event(rx: &mut EventStream) -> Option<Event> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.ok().flatten()
    }

    #[test]
    fn test_terminal_name_is_sanitized() {
        assert_eq!(terminal_name("tabpilot", "tab-1"), "tabpilot_tab-1");
        assert_eq!(terminal_name("tabpilot", "my tab.2:x"), "tabpilot_my_tab_2_x");
    }

    #[tokio::test]
    async fn test_fifth_session_exceeds_cap() {
        let (_fake, registry) = registry(4);
        for i in 0..4 {
            registry.create_session(&format!("tab{i}"), "").await.unwrap();
        }

        let err = registry.create_session("tab4", "").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::CapacityExceeded { max: 4 }));
        assert_eq!(registry.list_sessions().await.len(), 4);
    }

    #[tokio::test]
    async fn test_duplicate_tab_is_rejected() {
        let (_fake, registry) = registry(4);
        registry.create_session("tab1", "").await.unwrap();
        let err = registry.create_session("tab1", "").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::TabInUse(_)));
    }

    #[tokio::test]
    async fn test_spawn_failure_frees_the_slot() {
        let (fake, registry) = registry(1);
        fake.fail_spawns();
        let err = registry.create_session("tab1", "").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::SpawnFailure(_)));

        fake.set_screen("existing", "");
        registry.adopt_session("tab1", "existing", "").await.unwrap();
    }

    #[tokio::test]
    async fn test_route_command_sends_clear_text_submit() {
        let (fake, registry) = registry(4);
        let (info, _rx) = registry.create_session("tab1", "First").await.unwrap();
        assert_eq!(info.label, "First");
        assert_eq!(info.terminal, "tabpilot_tab1");

        let session_id = registry.route_command("tab1", "list the files").await.unwrap();
        assert_eq!(session_id, info.session_id);
        assert_eq!(fake.keys("tabpilot_tab1"), ["C-u", "list the files", "Enter"]);

        let history = registry.history("tab1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "list the files");
    }

    #[tokio::test]
    async fn test_unknown_tab_errors() {
        let (_fake, registry) = registry(4);
        assert!(matches!(
            registry.route_command("nope", "hi").await,
            Err(OrchestratorError::NoSuchSession(_))
        ));
        assert!(matches!(
            registry.close_session("nope").await,
            Err(OrchestratorError::NoSuchSession(_))
        ));
        assert!(matches!(
            registry.stats("nope").await,
            Err(OrchestratorError::NoSuchSession(_))
        ));
    }

    #[tokio::test]
    async fn test_close_kills_terminal_and_ends_stream() {
        let (fake, registry) = registry(4);
        let (_info, mut rx) = registry.create_session("tab1", "").await.unwrap();

        registry.close_session("tab1").await.unwrap();
        assert_eq!(fake.killed(), ["tabpilot_tab1"]);
        assert!(registry.list_sessions().await.is_empty());
        assert!(next_event(&mut rx).await.is_none());
        assert!(matches!(
            registry.route_command("tab1", "hi").await,
            Err(OrchestratorError::NoSuchSession(_))
        ));
    }

    #[tokio::test]
    async fn test_events_are_streamed() {
        let (fake, registry) = registry(4);
        let (_info, mut rx) = registry.create_session("tab1", "").await.unwrap();
        fake.set_screen("tabpilot_tab1", "● Hello from the agent.\n");

        assert_eq!(next_event(&mut rx).await, Some(Event::assistant("Hello from the agent.")));
    }

    #[tokio::test]
    async fn test_prompt_is_answered_once() {
        let (fake, registry) = registry(4);
        let (_info, mut rx) = registry.create_session("tab1", "").await.unwrap();
        fake.set_screen("tabpilot_tab1", "Bash command\n  rm -rf build\n❯ 1. Yes\n  2. No\n");

        assert_eq!(next_event(&mut rx).await, Some(Event::PermissionPromptHandled {}));

        // Many more ticks while the prompt is still on screen
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fake.keys("tabpilot_tab1"), ["1", "Enter"]);
    }

    #[tokio::test]
    async fn test_concurrent_commands_do_not_interleave() {
        let (fake, registry) = registry(4);
        fake.delay_keys(Duration::from_millis(20));
        registry.create_session("tab1", "").await.unwrap();

        let (first, second) = tokio::join!(
            registry.route_command("tab1", "first command"),
            registry.route_command("tab1", "second command"),
        );
        first.unwrap();
        second.unwrap();

        let keys = fake.keys("tabpilot_tab1");
        assert_eq!(keys.len(), 6);
        for sequence in keys.chunks(3) {
            assert_eq!(sequence[0], "C-u");
            assert_eq!(sequence[2], "Enter");
        }
        assert_ne!(keys[1], keys[4]);
    }

    #[tokio::test]
    async fn test_prompt_answer_waits_for_routed_command() {
        let (fake, registry) = registry(4);
        fake.delay_keys(Duration::from_millis(20));
        registry.create_session("tab1", "").await.unwrap();

        let route = registry.route_command("tab1", "deploy it");
        let prompt = async {
            // Show the prompt while the command is being typed
            tokio::time::sleep(Duration::from_millis(10)).await;
            fake.set_screen("tabpilot_tab1", "Bash command\n  ./deploy.sh\n❯ 1. Yes\n  2. No\n");
            tokio::time::sleep(Duration::from_millis(300)).await;
        };
        let (routed, ()) = tokio::join!(route, prompt);
        routed.unwrap();

        assert_eq!(fake.keys("tabpilot_tab1"), ["C-u", "deploy it", "Enter", "1", "Enter"]);
    }

    #[tokio::test]
    async fn test_slow_session_does_not_stall_others() {
        let (fake, registry) = registry(4);
        fake.delay_snapshots("tabpilot_slow", Duration::from_secs(30));
        registry.create_session("slow", "").await.unwrap();
        let (_info, mut rx) = registry.create_session("fast", "").await.unwrap();

        fake.set_screen("tabpilot_fast", "● Fast session output.\n");
        assert_eq!(next_event(&mut rx).await, Some(Event::assistant("Fast session output.")));
    }

    #[tokio::test]
    async fn test_polling_survives_snapshot_failures() {
        let (fake, registry) = registry(4);
        fake.fail_snapshots(3);
        let (_info, mut rx) = registry.create_session("tab1", "").await.unwrap();
        fake.set_screen("tabpilot_tab1", "● Still here after the errors.\n");

        assert_eq!(
            next_event(&mut rx).await,
            Some(Event::assistant("Still here after the errors."))
        );
    }

    #[tokio::test]
    async fn test_foreground_hand_off() {
        let (_fake, registry) = registry(4);
        registry.create_session("a", "").await.unwrap();
        registry.create_session("b", "").await.unwrap();
        assert_eq!(registry.foreground().await.as_deref(), Some("a"));

        registry.switch("b").await.unwrap();
        assert_eq!(registry.foreground().await.as_deref(), Some("b"));

        registry.close_session("b").await.unwrap();
        assert_eq!(registry.foreground().await.as_deref(), Some("a"));

        registry.close_session("a").await.unwrap();
        assert_eq!(registry.foreground().await, None);
        assert!(matches!(
            registry.switch("a").await,
            Err(OrchestratorError::NoSuchSession(_))
        ));
    }

    #[tokio::test]
    async fn test_adopt_requires_existing_terminal() {
        let (fake, registry) = registry(4);
        let err = registry.adopt_session("tab1", "missing", "").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::SpawnFailure(_)));

        fake.set_screen("work", "");
        let (info, _rx) = registry.adopt_session("tab1", "work", "Work").await.unwrap();
        assert_eq!(info.terminal, "work");
        assert_eq!(info.label, "Work");
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let (fake, registry) = registry(4);
        registry.create_session("a", "").await.unwrap();
        registry.create_session("b", "").await.unwrap();

        registry.shutdown().await;
        assert!(registry.list_sessions().await.is_empty());
        assert_eq!(fake.killed().len(), 2);
    }
}
