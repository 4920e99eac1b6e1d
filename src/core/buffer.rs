//! Append-only store of labeled samples.
//!
//! The buffer is the only record of what the classifier has been shown. It is
//! never truncated: every retrain fits on the whole of it.

use crate::core::parser::Reading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// A reading together with the label it was given on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub timestamp: DateTime<Utc>,
    pub value: i32,
    /// Whether the reading was labeled abnormal
    pub label: bool,
}

/// Ordered, growing sequence of labeled samples.
#[derive(Debug, Default)]
pub struct TrainingBuffer {
    samples: Vec<LabeledSample>,
}

impl TrainingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reading with its label and return the stored sample.
    ///
    /// Timestamps never go backwards inside the buffer: if the wall clock
    /// stepped back, the previous sample's timestamp is reused.
    pub fn append(&mut self, reading: Reading, label: bool) -> LabeledSample {
        let timestamp = match self.samples.last() {
            Some(last) if reading.timestamp < last.timestamp => last.timestamp,
            _ => reading.timestamp,
        };

        let sample = LabeledSample {
            timestamp,
            value: reading.value,
            label,
        };
        self.samples.push(sample);
        sample
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[LabeledSample] {
        &self.samples
    }

    /// Feature column and label column for fitting.
    pub fn training_set(&self) -> (Vec<f64>, Vec<bool>) {
        self.samples
            .iter()
            .map(|s| (f64::from(s.value), s.label))
            .unzip()
    }

    /// Descriptive statistics over the buffered readings.
    pub fn summary(&self) -> BufferSummary {
        let values: Vec<f64> = self.samples.iter().map(|s| f64::from(s.value)).collect();
        let abnormal = self.samples.iter().filter(|s| s.label).count();

        if values.is_empty() {
            return BufferSummary {
                count: 0,
                abnormal,
                mean: None,
                std_dev: None,
                min: None,
                max: None,
            };
        }

        // std_dev is the sample deviation and is NaN for a single value
        let std_dev = values.iter().std_dev();

        BufferSummary {
            count: values.len(),
            abnormal,
            mean: Some(values.iter().mean()),
            std_dev: (!std_dev.is_nan()).then_some(std_dev),
            min: Some(Statistics::min(values.iter())),
            max: Some(Statistics::max(values.iter())),
        }
    }
}

/// Snapshot of buffer statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferSummary {
    pub count: usize,
    pub abnormal: usize,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl BufferSummary {
    /// Share of samples labeled abnormal.
    pub fn abnormal_ratio(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.abnormal as f64 / self.count as f64
        }
    }
}

impl std::fmt::Display for BufferSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.mean, self.min, self.max) {
            (Some(mean), Some(min), Some(max)) => write!(
                f,
                "{} samples ({} abnormal), mean {:.1} bpm, range {:.0}-{:.0}, sd {}",
                self.count,
                self.abnormal,
                mean,
                min,
                max,
                self.std_dev
                    .map(|sd| format!("{sd:.1}"))
                    .unwrap_or_else(|| "n/a".to_string())
            ),
            _ => write!(f, "empty"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reading(value: i32) -> Reading {
        Reading {
            timestamp: Utc::now(),
            value,
        }
    }

    #[test]
    fn test_append_grows_by_one() {
        let mut buffer = TrainingBuffer::new();
        assert!(buffer.is_empty());

        for (i, value) in [72, 130, 95].into_iter().enumerate() {
            buffer.append(reading(value), value > 100);
            assert_eq!(buffer.len(), i + 1);
        }

        let labels: Vec<bool> = buffer.samples().iter().map(|s| s.label).collect();
        assert_eq!(labels, vec![false, true, false]);
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let mut buffer = TrainingBuffer::new();
        let now = Utc::now();

        buffer.append(Reading { timestamp: now, value: 70 }, false);
        let stored = buffer.append(
            Reading {
                timestamp: now - Duration::seconds(5),
                value: 71,
            },
            false,
        );

        assert_eq!(stored.timestamp, now);
    }

    #[test]
    fn test_training_set_columns() {
        let mut buffer = TrainingBuffer::new();
        buffer.append(reading(60), false);
        buffer.append(reading(120), true);

        let (x, y) = buffer.training_set();
        assert_eq!(x, vec![60.0, 120.0]);
        assert_eq!(y, vec![false, true]);
    }

    #[test]
    fn test_summary() {
        let mut buffer = TrainingBuffer::new();
        assert_eq!(buffer.summary().count, 0);
        assert_eq!(buffer.summary().to_string(), "empty");

        buffer.append(reading(60), false);
        let single = buffer.summary();
        assert_eq!(single.std_dev, None);

        buffer.append(reading(80), false);
        buffer.append(reading(130), true);
        let summary = buffer.summary();

        assert_eq!(summary.count, 3);
        assert_eq!(summary.abnormal, 1);
        assert!((summary.mean.unwrap() - 90.0).abs() < 1e-9);
        assert_eq!(summary.min, Some(60.0));
        assert_eq!(summary.max, Some(130.0));
        assert!((summary.abnormal_ratio() - 1.0 / 3.0).abs() < 1e-9);
    }
}
