//! Three-way merge: classification and auto-resolution (`engine`), the
//! durable in-progress record (`state`), conflict lookup (`conflict`), and
//! final commit assembly (`apply`).

pub mod apply;
pub mod conflict;
pub mod engine;
pub mod state;

pub use apply::{ApplyMerge, ApplyOutcome};
pub use conflict::{conflicts_by_pattern, pattern_matches, Conflict, ConflictType, Resolution};
pub use engine::{MergeEngine, MergeOptions, MergeResult, MergeStats};
pub use state::{MergeState, MergeStateStore, MergeStatus, Strategy};
