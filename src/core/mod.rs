//! Core functionality for Pulse Sentinel.
//!
//! This module contains:
//! - Line parsing of raw sensor output
//! - The labeling rule that provides ground truth
//! - The append-only training buffer
//! - The bootstrap forest classifier and its lifecycle

pub mod buffer;
pub mod forest;
pub mod labeling;
pub mod lifecycle;
pub mod parser;

// Re-export commonly used types
pub use buffer::{BufferSummary, LabeledSample, TrainingBuffer};
pub use forest::{FitError, Forest, ForestSettings, PredictError};
pub use labeling::{LabelingPolicy, ThresholdPolicy, DEFAULT_THRESHOLD};
pub use lifecycle::{
    ClassifierManager, ClassifierState, LoadOutcome, ManagerSettings, ModelLoadError,
    PersistedModel, Prediction, RetrainOutcome, TrainedModel, DEFAULT_MODEL_KEY,
};
pub use parser::{LineParser, ParseError, Reading, DEFAULT_PREFIX};
