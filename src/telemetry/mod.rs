//! Telemetry for Pulse Sentinel.
//!
//! Counts what each session did so that model-served predictions can be told
//! apart from label fallbacks after the fact.

pub mod stats;

// Re-export commonly used types
pub use stats::{
    create_shared_stats, create_shared_stats_with_persistence, Counter, SessionStats,
    SharedSessionStats, StatsSnapshot,
};
