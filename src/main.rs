use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

mod actions;

use actions::{Action, HELP};
use tabpilot::tmux::{TerminalHandle, TmuxClient};
use tabpilot::{Config, Event, EventStream, SessionRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the conversation
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Arc::new(Config::load()?);
    let client = Arc::new(TmuxClient::new(&config));
    if !client.is_server_running().await {
        info!("no tmux server running yet; the first session will start one");
    }

    let registry = SessionRegistry::new(client.clone(), Arc::clone(&config));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("tabpilot ready (max {} sessions), /help for commands", config.max_sessions);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        let action = match Action::parse(&line) {
            Ok(Some(action)) => action,
            Ok(None) => continue,
            Err(usage) => {
                eprintln!("{usage}");
                continue;
            }
        };

        match dispatch(&registry, &client, action, &line).await {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => eprintln!("error: {e}"),
        }
    }

    registry.shutdown().await;
    Ok(())
}

/// Run one action. Returns true when the user asked to quit.
async fn dispatch(registry: &SessionRegistry, client: &TmuxClient, action: Action, line: &str) -> Result<bool> {
    match action {
        Action::NewSession { tab, label } => {
            println!("starting agent for {tab}...");
            let (info, events) = registry.create_session(&tab, &label).await?;
            let attach = client.attach_command(&TerminalHandle::new(info.terminal.as_str()));
            println!("[{tab}] ready, watch with: {}", attach.join(" "));
            print_events(tab, events);
        }
        Action::AdoptSession { tab, terminal, label } => {
            let (_info, events) = registry.adopt_session(&tab, &terminal, &label).await?;
            println!("[{tab}] adopted tmux session {terminal}");
            print_events(tab, events);
        }
        Action::CloseSession(tab) => {
            registry.close_session(&tab).await?;
            println!("[{tab}] closed");
        }
        Action::Switch(tab) => {
            registry.switch(&tab).await?;
            println!("foreground: {tab}");
        }
        Action::Stats(tab) => {
            let stats = registry.stats(&tab).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Action::History(tab) => {
            for entry in registry.history(&tab).await? {
                println!("{} {:?}: {}", entry.timestamp.format("%H:%M:%S"), entry.role, entry.text);
            }
        }
        Action::List => {
            let sessions = registry.list_sessions().await;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        Action::ListTmux => {
            for session in client.list_sessions().await? {
                println!("{} ({} attached)", session.name, session.attached_clients);
            }
        }
        Action::Send { tab: Some(tab), text } => {
            let live = registry.list_sessions().await.iter().any(|s| s.tab_id == tab);
            if live {
                registry.route_command(&tab, &text).await?;
            } else {
                // "word: ..." that is not a tab is ordinary text
                send_to_foreground(registry, line.trim()).await?;
            }
        }
        Action::Send { tab: None, text } => send_to_foreground(registry, &text).await?,
        Action::Help => println!("{HELP}"),
        Action::Quit => return Ok(true),
    }

    Ok(false)
}

async fn send_to_foreground(registry: &SessionRegistry, text: &str) -> Result<()> {
    let Some(tab) = registry.foreground().await else {
        anyhow::bail!("no session yet, start one with /new <tab>");
    };
    registry.route_command(&tab, text).await?;
    Ok(())
}

/// Print a session's events until it is closed
fn print_events(tab: String, mut events: EventStream) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                Event::AssistantText { text } => println!("[{tab}] {text}"),
                Event::StatsUpdate {
                    elapsed,
                    tokens_display,
                    ..
                } => println!("[{tab}] ({elapsed} · {tokens_display} tokens)"),
                Event::ThinkingStateChanged { thinking: true } => println!("[{tab}] thinking..."),
                Event::ThinkingStateChanged { thinking: false } => println!("[{tab}] idle"),
                Event::PermissionPromptHandled {} => println!("[{tab}] approved a permission prompt"),
            }
        }
    });
}
