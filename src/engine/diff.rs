use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

/// Result of comparing a snapshot against the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// The snapshot tail differs from the previous tick
    pub changed: bool,
    /// Byte offset where candidate new content begins (always a line start)
    pub suffix_start: usize,
}

impl SnapshotDiff {
    /// Index of the first line of `snapshot` inside the new suffix
    pub fn first_new_line(&self, snapshot: &str) -> usize {
        snapshot[..self.suffix_start].matches('\n').count()
    }
}

/// Tracks the previous snapshot of one session.
#[derive(Debug)]
pub struct SnapshotDiffer {
    prev: String,
    prev_hash: Option<u64>,
    last_change: Option<Instant>,
    tail_chars: usize,
}

impl SnapshotDiffer {
    pub fn new(tail_chars: usize) -> Self {
        Self {
            prev: String::new(),
            prev_hash: None,
            last_change: None,
            tail_chars: tail_chars.max(1),
        }
    }

    pub fn observe(&mut self, curr: &str, now: Instant) -> SnapshotDiff {
        let hash = tail_hash(curr, self.tail_chars);
        if self.prev_hash == Some(hash) {
            return SnapshotDiff {
                changed: false,
                suffix_start: curr.len(),
            };
        }

        // The previous last line may have been partially drawn, so the
        // stable prefix ends at its start.
        let stable = self.prev.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let suffix_start = if curr.len() >= self.prev.len() && curr.starts_with(&self.prev[..stable]) {
            stable
        } else {
            0
        };

        self.prev.clear();
        self.prev.push_str(curr);
        self.prev_hash = Some(hash);
        self.last_change = Some(now);

        SnapshotDiff {
            changed: true,
            suffix_start,
        }
    }

    /// Time since the snapshot last changed, if it ever has
    pub fn since_last_change(&self, now: Instant) -> Option<Duration> {
        self.last_change.map(|at| now.saturating_duration_since(at))
    }
}

fn tail_hash(text: &str, tail_chars: usize) -> u64 {
    let start = text
        .char_indices()
        .rev()
        .nth(tail_chars - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut hasher = DefaultHasher::new();
    text[start..].hash(&mut hasher);
    hasher.finish()
}
