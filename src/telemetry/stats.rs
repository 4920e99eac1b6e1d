//! Session counters for the monitor.
//!
//! Tracks what the loop has done (lines seen, predictions served by the model
//! versus the label fallback, store failures) so that a session can be
//! audited after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counter identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    LinesRead,
    LinesIgnored,
    ParseFailures,
    ReadingsAccepted,
    Retrains,
    FitFailures,
    ModelUploads,
    UploadFailures,
    ModelPredictions,
    FallbackPredictions,
    PredictionErrors,
    Alerts,
    EventsAppended,
    EventFailures,
}

const COUNTERS: usize = 14;

impl Counter {
    fn index(self) -> usize {
        self as usize
    }
}

/// Live counters for the current session.
#[derive(Debug)]
pub struct SessionStats {
    counters: [AtomicU64; COUNTERS],
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            counters: Default::default(),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create session stats that are saved to `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);
        stats
    }

    pub fn record(&self, counter: Counter) {
        self.counters[counter.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines_read: self.get(Counter::LinesRead),
            lines_ignored: self.get(Counter::LinesIgnored),
            parse_failures: self.get(Counter::ParseFailures),
            readings_accepted: self.get(Counter::ReadingsAccepted),
            retrains: self.get(Counter::Retrains),
            fit_failures: self.get(Counter::FitFailures),
            model_uploads: self.get(Counter::ModelUploads),
            upload_failures: self.get(Counter::UploadFailures),
            model_predictions: self.get(Counter::ModelPredictions),
            fallback_predictions: self.get(Counter::FallbackPredictions),
            prediction_errors: self.get(Counter::PredictionErrors),
            alerts: self.get(Counter::Alerts),
            events_appended: self.get(Counter::EventsAppended),
            event_failures: self.get(Counter::EventFailures),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        self.snapshot().to_string()
    }

    /// Save the snapshot to disk, if persistence is enabled.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let json =
                serde_json::to_string_pretty(&self.snapshot()).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load the last saved snapshot from `path`.
    pub fn load_snapshot(path: &std::path::Path) -> Result<StatsSnapshot, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }

    pub fn reset(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of session statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub lines_ignored: u64,
    pub parse_failures: u64,
    pub readings_accepted: u64,
    pub retrains: u64,
    pub fit_failures: u64,
    pub model_uploads: u64,
    pub upload_failures: u64,
    pub model_predictions: u64,
    pub fallback_predictions: u64,
    pub prediction_errors: u64,
    pub alerts: u64,
    pub events_appended: u64,
    pub event_failures: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Session Statistics:\n\
             - Lines read: {} ({} ignored, {} invalid)\n\
             - Readings accepted: {}\n\
             - Retrains: {} ({} failed)\n\
             - Model uploads: {} ({} failed)\n\
             - Predictions: {} from model, {} from label fallback ({} model errors)\n\
             - Alerts triggered: {}\n\
             - Events uploaded: {} ({} failed)\n\
             - Session duration: {} seconds",
            self.lines_read,
            self.lines_ignored,
            self.parse_failures,
            self.readings_accepted,
            self.retrains,
            self.fit_failures,
            self.model_uploads,
            self.upload_failures,
            self.model_predictions,
            self.fallback_predictions,
            self.prediction_errors,
            self.alerts,
            self.events_appended,
            self.event_failures,
            self.session_duration_secs
        )
    }
}

/// Thread-safe shared session stats.
pub type SharedSessionStats = Arc<SessionStats>;

pub fn create_shared_stats() -> SharedSessionStats {
    Arc::new(SessionStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedSessionStats {
    Arc::new(SessionStats::with_persistence(path))
}
