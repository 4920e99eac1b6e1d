//! Pulse Sentinel - online heart-rate anomaly monitor.
//!
//! This library reads heart-rate lines from a sensor stream, labels each
//! reading with a threshold rule, keeps retraining a bootstrap forest on
//! everything seen so far, and checkpoints the model to a shared store so a
//! restarted (or different) device picks up where the last one left off.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Pulse Sentinel                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────────┐   │
//! │  │  Source  │──▶│  Parser  │──▶│ Labeling │──▶│   Training   │   │
//! │  │ (lines)  │   │ (BPM: n) │   │ (> 100)  │   │    Buffer    │   │
//! │  └──────────┘   └──────────┘   └──────────┘   └──────┬───────┘   │
//! │                                                      ▼           │
//! │  ┌──────────┐   ┌──────────┐            ┌──────────────────┐     │
//! │  │  Event   │◀──│ Actuator │◀───────────│ Classifier       │◀─┐  │
//! │  │  Sink    │   │ (buzzer) │            │ Manager (forest) │  │  │
//! │  └──────────┘   └──────────┘            └────────┬─────────┘  │  │
//! │                                                  ▼            │  │
//! │                                          ┌──────────────┐     │  │
//! │                                          │ Model Store  │─────┘  │
//! │                                          └──────────────┘        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pulse_sentinel::{
//!     core::ManagerSettings,
//!     monitor::Monitor,
//!     source::ScriptedLineSource,
//!     store::{MemoryEventSink, MemoryModelStore},
//! };
//!
//! let source = ScriptedLineSource::new(["BPM: 72", "BPM: 130"]);
//! let mut monitor = Monitor::new(
//!     source,
//!     MemoryModelStore::new(),
//!     MemoryEventSink::new(),
//!     ManagerSettings::default(),
//! );
//!
//! monitor.initialize();
//! while let Ok(outcome) = monitor.step() {
//!     println!("{outcome:?}");
//! }
//! ```

pub mod config;
pub mod core;
pub mod monitor;
pub mod source;
pub mod store;
pub mod telemetry;

// Re-export key types at crate root for convenience
pub use config::{Config, StorageBackend, StorageConfig};
pub use core::{
    ClassifierManager, ClassifierState, LabelingPolicy, LineParser, Reading, ThresholdPolicy,
    TrainingBuffer,
};
pub use monitor::{Actuator, LogActuator, Monitor, StepOutcome};
pub use source::{LineSource, ReaderLineSource, SourceError};
pub use store::{EventRecord, EventSink, ModelStore, StoreError};
pub use telemetry::{SessionStats, SharedSessionStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Notice shown when the monitor starts.
pub const DISCLAIMER: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                PULSE SENTINEL - NOT A MEDICAL DEVICE             ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  Readings are labeled with a fixed threshold rule and a model    ║
║  learned from those labels. Alerts are informational only.       ║
║                                                                  ║
║  ✓ WHAT IS STORED:                                               ║
║    • One record per reading (time, BPM, label, prediction)       ║
║    • The current model, overwritten after every retrain          ║
║                                                                  ║
║  ✗ WHAT IS NOT DONE:                                             ║
║    • No filtering or validation of the raw sensor waveform       ║
║    • No encryption of the input stream or the stores             ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
