use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};

/// Collapse runs of whitespace and trim, so redraws that only shift
/// spacing hash identically
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn text_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    normalize(text).hash(&mut hasher);
    hasher.finish()
}

/// Bounded set of hashes of already-emitted text.
///
/// When the set grows past its capacity the oldest entries are dropped
/// until only the most recent half remains.
#[derive(Debug)]
pub struct SeenSet {
    order: VecDeque<u64>,
    members: HashSet<u64>,
    capacity: usize,
}

impl SeenSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity: capacity.max(2),
        }
    }

    pub fn contains(&self, text: &str) -> bool {
        self.members.contains(&text_hash(text))
    }

    /// Record `text`; returns false if it was already present
    pub fn insert(&mut self, text: &str) -> bool {
        let hash = text_hash(text);
        if !self.members.insert(hash) {
            return false;
        }
        self.order.push_back(hash);

        if self.order.len() > self.capacity {
            let keep = self.capacity / 2;
            while self.order.len() > keep {
                if let Some(old) = self.order.pop_front() {
                    self.members.remove(&old);
                }
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
