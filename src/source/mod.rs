//! Input sources for Pulse Sentinel.
//!
//! The sensor is treated as a plain stream of text lines. The threaded reader
//! covers device nodes, files and stdin; the scripted source replays lines
//! for tests and demos.

pub mod reader;
pub mod scripted;
pub mod types;

// Re-export commonly used types
pub use reader::ReaderLineSource;
pub use scripted::ScriptedLineSource;
pub use types::{LineSource, SourceError};
