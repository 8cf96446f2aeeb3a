//! Scripted in-memory terminal for registry and poller tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{Terminal, TerminalHandle};

#[derive(Default)]
struct FakeState {
    screens: HashMap<String, String>,
    keys: HashMap<String, Vec<String>>,
    killed: Vec<String>,
    fail_spawn: bool,
    failing_snapshots: usize,
    key_delay: Duration,
    snapshot_delays: HashMap<String, Duration>,
}

#[derive(Default)]
pub(crate) struct FakeTerminal {
    state: Mutex<FakeState>,
}

impl FakeTerminal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_spawns(&self) {
        self.state.lock().unwrap().fail_spawn = true;
    }

    /// The next `count` snapshot calls return an error
    pub(crate) fn fail_snapshots(&self, count: usize) {
        self.state.lock().unwrap().failing_snapshots = count;
    }

    /// Every clear, type and submit call takes `delay`
    pub(crate) fn delay_keys(&self, delay: Duration) {
        self.state.lock().unwrap().key_delay = delay;
    }

    /// Every snapshot of `name` takes `delay`
    pub(crate) fn delay_snapshots(&self, name: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .snapshot_delays
            .insert(name.to_string(), delay);
    }

    pub(crate) fn set_screen(&self, name: &str, screen: &str) {
        self.state
            .lock()
            .unwrap()
            .screens
            .insert(name.to_string(), screen.to_string());
    }

    /// Everything sent to `name`: "C-u", "Enter" or the literal text
    pub(crate) fn keys(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .keys
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn killed(&self) -> Vec<String> {
        self.state.lock().unwrap().killed.clone()
    }

    async fn record(&self, handle: &TerminalHandle, key: &str) {
        let delay = self.state.lock().unwrap().key_delay;
        tokio::time::sleep(delay).await;
        self.state
            .lock()
            .unwrap()
            .keys
            .entry(handle.name().to_string())
            .or_default()
            .push(key.to_string());
    }
}

#[async_trait]
impl Terminal for FakeTerminal {
    async fn spawn(&self, name: &str, _working_dir: &Path, _command: &str) -> Result<TerminalHandle> {
        let mut state = self.state.lock().unwrap();
        if state.fail_spawn {
            anyhow::bail!("agent binary not found");
        }
        state.screens.entry(name.to_string()).or_default();
        Ok(TerminalHandle::new(name))
    }

    async fn adopt(&self, name: &str) -> Result<TerminalHandle> {
        if !self.state.lock().unwrap().screens.contains_key(name) {
            anyhow::bail!("tmux session '{}' does not exist", name);
        }
        Ok(TerminalHandle::new(name))
    }

    async fn clear_line(&self, handle: &TerminalHandle) -> Result<()> {
        self.record(handle, "C-u").await;
        Ok(())
    }

    async fn type_literal(&self, handle: &TerminalHandle, text: &str) -> Result<()> {
        self.record(handle, text).await;
        Ok(())
    }

    async fn submit(&self, handle: &TerminalHandle) -> Result<()> {
        self.record(handle, "Enter").await;
        Ok(())
    }

    async fn snapshot(&self, handle: &TerminalHandle) -> Result<String> {
        let delay = self.state.lock().unwrap().snapshot_delays.get(handle.name()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.failing_snapshots > 0 {
            state.failing_snapshots -= 1;
            anyhow::bail!("capture-pane failed");
        }
        Ok(state.screens.get(handle.name()).cloned().unwrap_or_default())
    }

    async fn kill(&self, handle: &TerminalHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.screens.remove(handle.name());
        state.killed.push(handle.name().to_string());
        Ok(())
    }
}
