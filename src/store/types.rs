//! Records written to the event sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a prediction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    /// Answered by a trained model
    Model,
    /// No usable model; the label rule answered instead
    Fallback,
}

impl std::fmt::Display for PredictionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictionSource::Model => write!(f, "model"),
            PredictionSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// One processed reading, as uploaded to the event sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique record identifier
    pub id: Uuid,
    /// Device that produced the reading
    pub device_id: String,
    /// Arrival time of the reading
    pub timestamp: DateTime<Utc>,
    /// Heart rate in beats per minute
    pub heart_rate: i32,
    /// Ground-truth label at arrival
    pub label: bool,
    /// "Normal" or "Abnormal"
    pub prediction: String,
    pub prediction_source: PredictionSource,
}

impl EventRecord {
    pub fn new(
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        heart_rate: i32,
        label: bool,
        abnormal: bool,
        prediction_source: PredictionSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.into(),
            timestamp,
            heart_rate,
            label,
            prediction: prediction_label(abnormal).to_string(),
            prediction_source,
        }
    }

    /// Whether the record carries an abnormal prediction.
    pub fn is_abnormal(&self) -> bool {
        self.prediction == prediction_label(true)
    }
}

fn prediction_label(abnormal: bool) -> &'static str {
    if abnormal {
        "Abnormal"
    } else {
        "Normal"
    }
}

/// Identifier for this device, derived from the hostname.
pub fn default_device_id() -> String {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("pulse-{hostname}")
}
