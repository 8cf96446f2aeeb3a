//! Response extraction engine.
//!
//! Pure, synchronous logic that turns terminal snapshots into events. Time
//! is passed in explicitly so every heuristic can be tested with canned
//! screens.

pub mod classify;
pub mod dedup;
pub mod diff;
pub mod permission;
pub mod stats;
pub mod summary;
mod tracker;

pub use classify::{classify_line, ClassifyContext, LineClass, LINE_RULES};
pub use dedup::SeenSet;
pub use diff::{SnapshotDiff, SnapshotDiffer};
pub use permission::{PermissionResponder, PromptFamily, PromptMatch, PromptResponse};
pub use stats::{format_duration, format_tokens, StatsReading, TokenGlyph};
pub use summary::SummaryRules;
pub use tracker::{ResponseTracker, TickOutcome, TrackerSettings};
