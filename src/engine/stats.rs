use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which counter a progress line reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenGlyph {
    /// `↑` tokens sent to the model
    Input,
    /// `↓` tokens received from the model
    Output,
    /// `⚒` tokens spent on tool use
    Tool,
}

impl TokenGlyph {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '↑' => Some(TokenGlyph::Input),
            '↓' => Some(TokenGlyph::Output),
            '⚒' => Some(TokenGlyph::Tool),
            _ => None,
        }
    }
}

/// One parsed `<duration> · <glyph> <count> tokens` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsReading {
    pub elapsed: String,
    pub glyph: TokenGlyph,
    pub tokens: u64,
}

impl StatsReading {
    pub fn tokens_display(&self) -> String {
        format_tokens(self.tokens)
    }
}

/// Matches e.g. "12s · ⚒ 15000 tokens" or "1m 5s · ↓ 1.2k tokens"
static RE_STATS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+[hms](?:\s*\d+[hms])*)\s*·\s*([⚒↑↓])\s*(\d[\d,]*(?:\.\d+)?)\s*([kK])?\s*tokens")
        .unwrap()
});

/// Parse the last progress reading in `text`
pub fn parse_stats(text: &str) -> Option<StatsReading> {
    RE_STATS.captures_iter(text).filter_map(|caps| {
        let elapsed = caps.get(1)?.as_str().to_string();
        let glyph = TokenGlyph::from_char(caps.get(2)?.as_str().chars().next()?)?;
        let number: f64 = caps.get(3)?.as_str().replace(',', "").parse().ok()?;
        let scale = if caps.get(4).is_some() { 1000.0 } else { 1.0 };
        Some(StatsReading {
            elapsed,
            glyph,
            tokens: (number * scale).round() as u64,
        })
    })
    .last()
}

/// Whether `line` contains a progress reading
pub fn is_stats_line(line: &str) -> bool {
    RE_STATS.is_match(line)
}

/// Compact token count: plain below 1000, one decimal while that stays
/// below 10.0K, rounded thousands above
pub fn format_tokens(tokens: u64) -> String {
    let tenths = (tokens + 50) / 100;
    if tokens < 1000 {
        tokens.to_string()
    } else if tenths < 100 {
        format!("{}.{}K", tenths / 10, tenths % 10)
    } else {
        format!("{}K", (tokens + 500) / 1000)
    }
}

/// Format a duration in seconds as MM:SS
pub fn format_duration(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
