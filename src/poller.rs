//! Per-session polling loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::PromptMatch;
use crate::events::Event;
use crate::session::Session;
use crate::tmux::Terminal;

#[derive(Debug, Clone, Copy)]
pub(crate) struct PollTiming {
    pub interval: Duration,
    pub error_backoff: Duration,
}

/// Snapshot, classify and forward until `stop` flips to true or its sender
/// is dropped
pub(crate) async fn run(
    session: Arc<Session>,
    terminal: Arc<dyn Terminal>,
    timing: PollTiming,
    events: mpsc::UnboundedSender<Event>,
    mut stop: watch::Receiver<bool>,
) {
    debug!(tab_id = %session.tab_id(), session = %session.handle(), "polling started");

    loop {
        if *stop.borrow() {
            break;
        }

        let pause = match terminal.snapshot(session.handle()).await {
            Ok(snapshot) => {
                let outcome = session.observe(&snapshot, Instant::now());

                if let Some(prompt) = outcome.prompt {
                    if answer_prompt(terminal.as_ref(), &session, &prompt).await {
                        let _ = events.send(Event::PermissionPromptHandled {});
                    }
                }
                for event in outcome.events {
                    let _ = events.send(event);
                }

                timing.interval
            }
            Err(e) => {
                warn!(tab_id = %session.tab_id(), error = %e, "snapshot failed");
                timing.error_backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!(tab_id = %session.tab_id(), "polling stopped");
}

/// Send the keystrokes for a detected prompt. Returns false if the terminal
/// rejected them; the prompt is retried after the cooldown.
async fn answer_prompt(terminal: &dyn Terminal, session: &Session, prompt: &PromptMatch) -> bool {
    let handle = session.handle();
    let literal = prompt.response.literal();
    let _input = session.lock_input().await;

    let sent = async {
        if let Some(text) = literal {
            terminal.type_literal(handle, text).await?;
        }
        terminal.submit(handle).await
    }
    .await;

    match sent {
        Ok(()) => {
            info!(
                tab_id = %session.tab_id(),
                family = ?prompt.family,
                keys = literal.unwrap_or("Enter"),
                prompt = %prompt.line.trim(),
                "auto-approved permission prompt"
            );
            true
        }
        Err(e) => {
            warn!(tab_id = %session.tab_id(), error = %e, "failed to answer permission prompt");
            false
        }
    }
}
