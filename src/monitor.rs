//! The monitoring loop.
//!
//! `Monitor` owns every piece of per-process state (buffer, classifier,
//! connections) and drives one reading at a time through
//! parse → label → append → retrain-if-due → predict → alert → record.
//! Each iteration either applies a reading completely or not at all, so the
//! loop can be stopped between any two iterations.

use crate::config::Config;
use crate::core::{
    ClassifierManager, LabeledSample, LabelingPolicy, LineParser, LoadOutcome, ManagerSettings,
    ParseError, Prediction, RetrainOutcome, ThresholdPolicy, TrainingBuffer,
};
use crate::source::{LineSource, SourceError};
use crate::store::{default_device_id, EventRecord, EventSink, ModelStore, PredictionSource};
use crate::telemetry::{create_shared_stats, Counter, SharedSessionStats};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Longest single sleep while pacing, so a stop request is noticed quickly.
const PACING_SLICE: Duration = Duration::from_millis(100);

/// Receives the alert decision for every processed reading.
pub trait Actuator {
    fn trigger(&mut self, abnormal: bool);
}

impl<F: FnMut(bool)> Actuator for F {
    fn trigger(&mut self, abnormal: bool) {
        self(abnormal)
    }
}

/// Reports alerts through the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogActuator;

impl Actuator for LogActuator {
    fn trigger(&mut self, abnormal: bool) {
        if abnormal {
            tracing::warn!("Abnormal! Trigger Buzzer!");
        } else {
            tracing::info!("Heart rate normal.");
        }
    }
}

/// Ignores alerts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActuator;

impl Actuator for NoopActuator {
    fn trigger(&mut self, _abnormal: bool) {}
}

/// Timing and identity settings for the loop.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// How long one read waits for a line
    pub read_timeout: Duration,
    /// Pause after every iteration
    pub poll_delay: Duration,
    /// Device identifier stamped on event records
    pub device_id: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(1),
            poll_delay: Duration::from_secs(1),
            device_id: default_device_id(),
        }
    }
}

/// A reading that went all the way through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedReading {
    pub sample: LabeledSample,
    pub prediction: Prediction,
    /// Whether the alert actuator was told to fire
    pub trigger: bool,
    /// Whether this reading caused a retrain
    pub retrained: bool,
    /// Record id, if the event sink accepted it
    pub event_id: Option<Uuid>,
}

/// Result of one loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// No line arrived within the read timeout
    Idle,
    /// The line carried no reading
    Ignored,
    /// The line was tagged but unparseable
    Rejected(ParseError),
    Processed(ProcessedReading),
}

/// Why `run` returned.
#[derive(Debug)]
pub enum LoopExit {
    Stopped,
    SourceFailed(SourceError),
}

/// Summary of a `run` call.
#[derive(Debug)]
pub struct RunSummary {
    pub iterations: u64,
    pub exit: LoopExit,
}

/// Context object owning all loop state.
pub struct Monitor {
    parser: LineParser,
    policy: Box<dyn LabelingPolicy>,
    buffer: TrainingBuffer,
    manager: ClassifierManager,
    source: Box<dyn LineSource>,
    models: Box<dyn ModelStore>,
    events: Box<dyn EventSink>,
    actuator: Box<dyn Actuator>,
    stats: SharedSessionStats,
    settings: MonitorSettings,
}

impl Monitor {
    /// Create a monitor with default parser, policy and timing.
    pub fn new(
        source: impl LineSource + 'static,
        models: impl ModelStore + 'static,
        events: impl EventSink + 'static,
        manager_settings: ManagerSettings,
    ) -> Self {
        Self {
            parser: LineParser::default(),
            policy: Box::new(ThresholdPolicy::default()),
            buffer: TrainingBuffer::new(),
            manager: ClassifierManager::new(manager_settings),
            source: Box::new(source),
            models: Box::new(models),
            events: Box::new(events),
            actuator: Box::new(LogActuator),
            stats: create_shared_stats(),
            settings: MonitorSettings::default(),
        }
    }

    /// Create a monitor configured from `config`.
    pub fn from_config(
        config: &Config,
        source: impl LineSource + 'static,
        models: impl ModelStore + 'static,
        events: impl EventSink + 'static,
    ) -> Self {
        Self::new(source, models, events, config.manager_settings())
            .with_parser(LineParser::new(config.line_prefix.clone()))
            .with_policy(ThresholdPolicy::new(config.threshold))
            .with_settings(MonitorSettings {
                read_timeout: config.read_timeout,
                poll_delay: config.poll_delay,
                ..MonitorSettings::default()
            })
    }

    pub fn with_parser(mut self, parser: LineParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_policy(mut self, policy: impl LabelingPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn with_actuator(mut self, actuator: impl Actuator + 'static) -> Self {
        self.actuator = Box::new(actuator);
        self
    }

    pub fn with_stats(mut self, stats: SharedSessionStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn buffer(&self) -> &TrainingBuffer {
        &self.buffer
    }

    pub fn manager(&self) -> &ClassifierManager {
        &self.manager
    }

    pub fn stats(&self) -> &SharedSessionStats {
        &self.stats
    }

    /// Adopt the persisted model, if there is a usable one.
    pub fn initialize(&mut self) -> LoadOutcome {
        self.manager.load_from_store(self.models.as_ref())
    }

    /// Run until `stop` is set or the input breaks.
    pub fn run(&mut self, stop: &AtomicBool) -> RunSummary {
        let mut iterations = 0;

        while !stop.load(Ordering::SeqCst) {
            if let Err(e) = self.step() {
                tracing::error!("Stopping monitor: {e}");
                return RunSummary {
                    iterations,
                    exit: LoopExit::SourceFailed(e),
                };
            }
            iterations += 1;
            self.pace(stop);
        }

        RunSummary {
            iterations,
            exit: LoopExit::Stopped,
        }
    }

    /// Read one line and process it.
    ///
    /// Only a broken input transport is returned as an error; everything
    /// else is handled inside the iteration.
    pub fn step(&mut self) -> Result<StepOutcome, SourceError> {
        match self.source.read_line(self.settings.read_timeout)? {
            Some(line) => {
                self.stats.record(Counter::LinesRead);
                Ok(self.process_line(&line))
            }
            None => Ok(StepOutcome::Idle),
        }
    }

    /// Push one raw line through the pipeline.
    pub fn process_line(&mut self, line: &str) -> StepOutcome {
        let reading = match self.parser.parse(line, Utc::now()) {
            Ok(Some(reading)) => reading,
            Ok(None) => {
                self.stats.record(Counter::LinesIgnored);
                tracing::trace!(line, "Ignoring line without reading");
                return StepOutcome::Ignored;
            }
            Err(e) => {
                self.stats.record(Counter::ParseFailures);
                tracing::warn!("{e}");
                return StepOutcome::Rejected(e);
            }
        };

        let label = self.policy.label(reading.value);
        let sample = self.buffer.append(reading, label);
        self.stats.record(Counter::ReadingsAccepted);

        let retrain = self
            .manager
            .after_append(&self.buffer, self.models.as_ref());
        self.record_retrain(&retrain);

        let prediction = self.manager.predict_or_fallback(sample.value, sample.label);
        match prediction.source {
            PredictionSource::Model => self.stats.record(Counter::ModelPredictions),
            PredictionSource::Fallback => {
                self.stats.record(Counter::FallbackPredictions);
                if self.manager.is_trained() {
                    self.stats.record(Counter::PredictionErrors);
                }
            }
        }

        let trigger = prediction.abnormal;
        if trigger {
            self.stats.record(Counter::Alerts);
        }
        self.actuator.trigger(trigger);

        let record = EventRecord::new(
            self.settings.device_id.as_str(),
            sample.timestamp,
            sample.value,
            sample.label,
            prediction.abnormal,
            prediction.source,
        );
        let event_id = match self.events.append(&record) {
            Ok(()) => {
                self.stats.record(Counter::EventsAppended);
                Some(record.id)
            }
            Err(e) => {
                self.stats.record(Counter::EventFailures);
                tracing::warn!(heart_rate = sample.value, "Failed to upload event: {e}");
                None
            }
        };

        tracing::info!(
            timestamp = %sample.timestamp,
            heart_rate = sample.value,
            prediction = %record.prediction,
            source = %prediction.source,
            buffer_len = self.buffer.len(),
            "Processed reading"
        );

        StepOutcome::Processed(ProcessedReading {
            sample,
            prediction,
            trigger,
            retrained: retrain.retrained(),
            event_id,
        })
    }

    fn record_retrain(&self, outcome: &RetrainOutcome) {
        match outcome {
            RetrainOutcome::NotDue => {}
            RetrainOutcome::Retrained { persist_error, .. } => {
                self.stats.record(Counter::Retrains);
                if persist_error.is_some() {
                    self.stats.record(Counter::UploadFailures);
                } else {
                    self.stats.record(Counter::ModelUploads);
                }
            }
            RetrainOutcome::FitFailed(_) => self.stats.record(Counter::FitFailures),
        }
    }

    /// Sleep the poll delay, waking early if `stop` is set.
    fn pace(&self, stop: &AtomicBool) {
        let deadline = Instant::now() + self.settings.poll_delay;
        loop {
            let now = Instant::now();
            if now >= deadline || stop.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep((deadline - now).min(PACING_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ForestSettings;
    use crate::source::ScriptedLineSource;
    use crate::store::{MemoryEventSink, MemoryModelStore, StoreError};
    use std::sync::{Arc, Mutex};

    fn quick_settings() -> ManagerSettings {
        ManagerSettings {
            forest: ForestSettings {
                n_trees: 10,
                ..ForestSettings::default()
            },
            ..ManagerSettings::default()
        }
    }

    fn no_delay() -> MonitorSettings {
        MonitorSettings {
            read_timeout: Duration::ZERO,
            poll_delay: Duration::ZERO,
            device_id: "test-device".to_string(),
        }
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn append(&mut self, _record: &EventRecord) -> Result<(), StoreError> {
            Err(StoreError::Network("offline".to_string()))
        }
    }

    #[test]
    fn test_idle_read_is_a_no_op() {
        let mut source = ScriptedLineSource::default().idle_when_drained();
        source.push_silence();
        let mut monitor = Monitor::new(
            source,
            MemoryModelStore::new(),
            MemoryEventSink::new(),
            quick_settings(),
        )
        .with_settings(no_delay());

        assert_eq!(monitor.step().unwrap(), StepOutcome::Idle);
        assert!(monitor.buffer().is_empty());
    }

    #[test]
    fn test_trigger_reaches_actuator() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let log = fired.clone();

        let mut monitor = Monitor::new(
            ScriptedLineSource::new(["BPM: 72", "BPM: 150"]),
            MemoryModelStore::new(),
            MemoryEventSink::new(),
            quick_settings(),
        )
        .with_settings(no_delay())
        .with_actuator(move |abnormal| log.lock().unwrap().push(abnormal));

        monitor.step().unwrap();
        monitor.step().unwrap();

        assert_eq!(*fired.lock().unwrap(), vec![false, true]);
        assert_eq!(monitor.stats().get(Counter::Alerts), 1);
    }

    #[test]
    fn test_event_failure_does_not_stop_processing() {
        let mut monitor = Monitor::new(
            ScriptedLineSource::new(["BPM: 80", "BPM: 81"]),
            MemoryModelStore::new(),
            FailingSink,
            quick_settings(),
        )
        .with_settings(no_delay())
        .with_actuator(NoopActuator);

        for _ in 0..2 {
            match monitor.step().unwrap() {
                StepOutcome::Processed(p) => assert!(p.event_id.is_none()),
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(monitor.buffer().len(), 2);
        assert_eq!(monitor.stats().get(Counter::EventFailures), 2);
    }

    #[test]
    fn test_injected_policy_labels_samples() {
        let mut monitor = Monitor::new(
            ScriptedLineSource::new(["BPM: 45"]),
            MemoryModelStore::new(),
            MemoryEventSink::new(),
            quick_settings(),
        )
        .with_settings(no_delay())
        .with_actuator(NoopActuator)
        .with_policy(|bpm: i32| bpm < 50 || bpm > 100);

        match monitor.step().unwrap() {
            StepOutcome::Processed(p) => {
                assert!(p.sample.label);
                assert!(p.trigger);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_run_honours_stop_flag() {
        let stop = AtomicBool::new(true);
        let mut monitor = Monitor::new(
            ScriptedLineSource::new(["BPM: 80"]),
            MemoryModelStore::new(),
            MemoryEventSink::new(),
            quick_settings(),
        )
        .with_settings(no_delay());

        let summary = monitor.run(&stop);
        assert_eq!(summary.iterations, 0);
        assert!(matches!(summary.exit, LoopExit::Stopped));
        assert!(monitor.buffer().is_empty());
    }
}
