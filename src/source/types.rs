//! The line-oriented input stream contract.

use std::time::Duration;

/// Errors from the input transport.
#[derive(Debug)]
pub enum SourceError {
    /// The transport could not be opened
    Open(String),
    /// Reading from the transport failed
    Io(String),
    /// The transport closed (device unplugged, end of file)
    Disconnected,
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Open(msg) => write!(f, "Could not open input: {msg}"),
            SourceError::Io(msg) => write!(f, "Input read error: {msg}"),
            SourceError::Disconnected => write!(f, "Input disconnected"),
        }
    }
}

impl std::error::Error for SourceError {}

/// A stream of text lines from the sensor.
pub trait LineSource {
    /// Wait up to `timeout` for the next line.
    ///
    /// `Ok(None)` means nothing arrived in time; errors are reserved for a
    /// broken transport.
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, SourceError>;
}

impl<S: LineSource + ?Sized> LineSource for Box<S> {
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, SourceError> {
        (**self).read_line(timeout)
    }
}
