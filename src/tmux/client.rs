use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{Terminal, TerminalHandle};
use crate::config::Config;

/// Pause between startup keys so the agent can redraw
const STARTUP_KEY_DELAY: Duration = Duration::from_millis(500);

/// Pause between clearing the input line and typing
const CLEAR_LINE_DELAY: Duration = Duration::from_millis(100);

/// A tmux session visible on the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmuxSession {
    /// Session ID (e.g., "$0")
    pub id: String,
    /// Session name
    pub name: String,
    /// Unix timestamp when session was created
    pub created_at: u64,
    /// Number of attached clients
    pub attached_clients: usize,
}

/// Client for interacting with tmux via CLI
pub struct TmuxClient {
    /// Path to tmux binary
    tmux_path: String,
    settle: Duration,
    width: u16,
    height: u16,
    startup_keys: Vec<String>,
}

impl TmuxClient {
    pub fn new(config: &Config) -> Self {
        Self {
            tmux_path: config.tmux.binary.clone(),
            settle: config.tmux.settle(),
            width: config.tmux.width,
            height: config.tmux.height,
            startup_keys: config.agent.startup_keys.clone(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new(&self.tmux_path)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to execute tmux {}", args.first().unwrap_or(&"")))
    }

    async fn run_ok(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux {} failed: {}", args.first().unwrap_or(&""), stderr.trim());
        }
        Ok(output)
    }

    /// Check if tmux server is running
    pub async fn is_server_running(&self) -> bool {
        Command::new(&self.tmux_path)
            .arg("list-sessions")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// List all tmux sessions
    pub async fn list_sessions(&self) -> Result<Vec<TmuxSession>> {
        // Format: session_id|session_name|session_created|session_attached
        let output = self
            .run(&[
                "list-sessions",
                "-F",
                "#{session_id}|#{session_name}|#{session_created}|#{session_attached}",
            ])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running") || stderr.contains("no sessions") {
                return Ok(Vec::new());
            }
            anyhow::bail!("tmux list-sessions failed: {}", stderr);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(parse_session_line).collect())
    }

    async fn has_session(&self, name: &str) -> Result<bool> {
        let output = self.run(&["has-session", "-t", name]).await?;
        Ok(output.status.success())
    }

    async fn send_key(&self, handle: &TerminalHandle, key: &str) -> Result<()> {
        self.run_ok(&["send-keys", "-t", handle.target(), key])
            .await
            .with_context(|| format!("Failed to send {key} to {handle}"))?;
        Ok(())
    }

    async fn send_startup_keys(&self, handle: &TerminalHandle) -> Result<()> {
        for key in &self.startup_keys {
            self.send_key(handle, key).await?;
            tokio::time::sleep(STARTUP_KEY_DELAY).await;
        }
        Ok(())
    }

    /// Get the command to attach to a session (for external execution)
    pub fn attach_command(&self, handle: &TerminalHandle) -> Vec<String> {
        vec![
            self.tmux_path.clone(),
            "attach-session".to_string(),
            "-t".to_string(),
            handle.name().to_string(),
        ]
    }
}

fn parse_session_line(line: &str) -> Option<TmuxSession> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 4 {
        return None;
    }

    Some(TmuxSession {
        id: parts[0].to_string(),
        name: parts[1].to_string(),
        created_at: parts[2].parse().unwrap_or(0),
        attached_clients: parts[3].parse().unwrap_or(0),
    })
}

#[async_trait]
impl Terminal for TmuxClient {
    async fn spawn(&self, name: &str, working_dir: &Path, command: &str) -> Result<TerminalHandle> {
        // A session left behind by an earlier run would shadow ours
        if self.has_session(name).await? {
            debug!(session = %name, "killing stale tmux session");
            self.run(&["kill-session", "-t", name]).await?;
        }

        let dir = working_dir.to_string_lossy();
        let width = self.width.to_string();
        let height = self.height.to_string();
        self.run_ok(&[
            "new-session", "-d", "-s", name, "-x", &width, "-y", &height, "-c", &dir, command,
        ])
        .await
        .context("Failed to create tmux session")?;

        let handle = TerminalHandle::new(name);
        info!(session = %handle, command = %command, "tmux session started");

        tokio::time::sleep(self.settle).await;

        if let Err(e) = self.send_startup_keys(&handle).await {
            // Don't leave the agent running outside the registry
            if let Err(kill_err) = self.kill(&handle).await {
                warn!(session = %handle, error = %kill_err, "failed to clean up tmux session");
            }
            return Err(e);
        }

        Ok(handle)
    }

    async fn adopt(&self, name: &str) -> Result<TerminalHandle> {
        if !self.has_session(name).await? {
            anyhow::bail!("tmux session '{}' does not exist", name);
        }
        Ok(TerminalHandle::new(name))
    }

    async fn clear_line(&self, handle: &TerminalHandle) -> Result<()> {
        self.send_key(handle, "C-u").await?;
        tokio::time::sleep(CLEAR_LINE_DELAY).await;
        Ok(())
    }

    async fn type_literal(&self, handle: &TerminalHandle, text: &str) -> Result<()> {
        self.run_ok(&["send-keys", "-t", handle.target(), "-l", text])
            .await
            .with_context(|| format!("Failed to type into {handle}"))?;
        Ok(())
    }

    async fn submit(&self, handle: &TerminalHandle) -> Result<()> {
        self.send_key(handle, "Enter").await
    }

    async fn snapshot(&self, handle: &TerminalHandle) -> Result<String> {
        let output = self
            .run_ok(&["capture-pane", "-p", "-J", "-S", "-", "-t", handle.target()])
            .await
            .with_context(|| format!("Failed to capture pane of {handle}"))?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn kill(&self, handle: &TerminalHandle) -> Result<()> {
        let output = self.run(&["kill-session", "-t", handle.name()]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("can't find session") || stderr.contains("no server running") {
                return Ok(());
            }
            anyhow::bail!("Failed to kill session {}: {}", handle, stderr.trim());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_line() {
        let session = parse_session_line("$3|tabpilot_tab_1|1718000000|1").unwrap();
        assert_eq!(session.id, "$3");
        assert_eq!(session.name, "tabpilot_tab_1");
        assert_eq!(session.created_at, 1_718_000_000);
        assert_eq!(session.attached_clients, 1);

        assert!(parse_session_line("garbage").is_none());
    }

    /// A stand-in tmux that logs each call and fails every `send-keys`
    #[cfg(unix)]
    fn scripted_tmux(dir: &Path) -> (String, std::path::PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join("calls.log");
        let script = dir.join("tmux");
        let body = format!(
            "#!/bin/sh\necho \"$*\" >> '{}'\ncase \"$1\" in\n  has-session) exit 1 ;;\n  send-keys) echo 'send failed' >&2; exit 1 ;;\nesac\nexit 0\n",
            log.display()
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script.to_string_lossy().into_owned(), log)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_startup_keys_kill_session_and_pane_target() {
        let dir = tempfile::tempdir().unwrap();
        let (tmux, log) = scripted_tmux(dir.path());

        let mut config = Config::default();
        config.tmux.binary = tmux;
        config.tmux.settle_ms = 0;
        config.agent.startup_keys = vec!["Enter".to_string()];
        let client = TmuxClient::new(&config);

        assert!(client.spawn("tabpilot_tab1", dir.path(), "claude").await.is_err());
        let calls = std::fs::read_to_string(&log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert!(calls[0].starts_with("has-session"));
        assert!(calls[1].starts_with("new-session -d -s tabpilot_tab1"));
        assert_eq!(calls[2], "send-keys -t tabpilot_tab1 Enter");
        assert_eq!(calls.last(), Some(&"kill-session -t tabpilot_tab1"));

        // The pane is addressed by session name alone, whatever base-index is
        let handle = TerminalHandle::new("tabpilot_tab1");
        assert_eq!(client.snapshot(&handle).await.unwrap(), "");
        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(
            calls.lines().last(),
            Some("capture-pane -p -J -S - -t tabpilot_tab1")
        );
    }

    #[test]
    fn test_attach_command() {
        let client = TmuxClient::new(&Config::default());
        let cmd = client.attach_command(&TerminalHandle::new("tabpilot_tab_1"));
        assert_eq!(cmd, ["tmux", "attach-session", "-t", "tabpilot_tab_1"]);
    }
}
