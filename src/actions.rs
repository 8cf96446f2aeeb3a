use once_cell::sync::Lazy;
use regex::Regex;

/// `<tab>: text` addresses a specific tab
static RE_TAB_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z0-9_-]+):\s+(\S.*)$").unwrap());

pub const HELP: &str = "\
/new <tab> [label]                 start an agent session for a tab
/adopt <tab> <tmux-session> [label] take over a running tmux session
/close <tab>                       close a session
/switch <tab>                      make a tab the foreground tab
/stats <tab>                       token and time counters (JSON)
/history <tab>                     conversation so far
/list                              live sessions (JSON)
/tmux                              tmux sessions available to adopt
/quit                              close every session and exit
<tab>: text                        send text to a tab
text                               send text to the foreground tab";

/// Actions that can be dispatched from a line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    NewSession { tab: String, label: String },
    AdoptSession { tab: String, terminal: String, label: String },
    CloseSession(String),
    Switch(String),
    Stats(String),
    History(String),
    List,
    /// List tmux sessions on the server
    ListTmux,
    /// Text for the agent; `tab` is None for the foreground tab
    Send { tab: Option<String>, text: String },
    Help,
    Quit,
}

impl Action {
    /// Parse one input line. Blank lines yield `Ok(None)`; malformed
    /// commands yield a usage message.
    pub fn parse(line: &str) -> Result<Option<Action>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let Some(command) = line.strip_prefix('/') else {
            return Ok(Some(match RE_TAB_PREFIX.captures(line) {
                Some(caps) => Action::Send {
                    tab: Some(caps[1].to_string()),
                    text: caps[2].to_string(),
                },
                None => Action::Send {
                    tab: None,
                    text: line.to_string(),
                },
            }));
        };

        let mut words = command.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        let action = match (name, args.as_slice()) {
            ("new", [tab, label @ ..]) => Action::NewSession {
                tab: tab.to_string(),
                label: label.join(" "),
            },
            ("adopt", [tab, terminal, label @ ..]) => Action::AdoptSession {
                tab: tab.to_string(),
                terminal: terminal.to_string(),
                label: label.join(" "),
            },
            ("close", [tab]) => Action::CloseSession(tab.to_string()),
            ("switch", [tab]) => Action::Switch(tab.to_string()),
            ("stats", [tab]) => Action::Stats(tab.to_string()),
            ("history", [tab]) => Action::History(tab.to_string()),
            ("list", []) => Action::List,
            ("tmux", []) => Action::ListTmux,
            ("help", _) => Action::Help,
            ("quit" | "exit", _) => Action::Quit,
            _ => return Err(format!("unrecognized command: {line}\n{HELP}")),
        };
        Ok(Some(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_commands() {
        assert_eq!(
            Action::parse("/new tab1 Backend work").unwrap(),
            Some(Action::NewSession {
                tab: "tab1".to_string(),
                label: "Backend work".to_string(),
            })
        );
        assert_eq!(
            Action::parse("/adopt tab2 claude_main").unwrap(),
            Some(Action::AdoptSession {
                tab: "tab2".to_string(),
                terminal: "claude_main".to_string(),
                label: String::new(),
            })
        );
        assert_eq!(
            Action::parse("  /close tab1 ").unwrap(),
            Some(Action::CloseSession("tab1".to_string()))
        );
        assert_eq!(Action::parse("/list").unwrap(), Some(Action::List));
        assert_eq!(Action::parse("").unwrap(), None);
    }

    #[test]
    fn test_parse_text() {
        assert_eq!(
            Action::parse("tab1: run the tests").unwrap(),
            Some(Action::Send {
                tab: Some("tab1".to_string()),
                text: "run the tests".to_string(),
            })
        );
        assert_eq!(
            Action::parse("what does main.rs do?").unwrap(),
            Some(Action::Send {
                tab: None,
                text: "what does main.rs do?".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_rejects_malformed_commands() {
        assert!(Action::parse("/new").is_err());
        assert!(Action::parse("/close a b").is_err());
        assert!(Action::parse("/frobnicate").is_err());
    }
}
