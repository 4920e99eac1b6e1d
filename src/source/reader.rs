//! Line source backed by a reader thread.
//!
//! Blocking reads happen on a helper thread which forwards each line over a
//! bounded channel, so the monitor can wait with a timeout and keep its own
//! pace even when the device is silent.

use crate::source::types::{LineSource, SourceError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lines that may queue up before the reader thread blocks.
const CHANNEL_CAPACITY: usize = 1_024;

enum Message {
    Line(String),
    Failed(String),
}

/// Reads lines from any `BufRead` on a background thread.
pub struct ReaderLineSource {
    receiver: Receiver<Message>,
    failed: Option<String>,
    _handle: JoinHandle<()>,
}

impl ReaderLineSource {
    /// Start reading `reader` on a new thread.
    pub fn spawn<R>(reader: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);

        let handle = thread::spawn(move || {
            for line in reader.lines() {
                let message = match line {
                    Ok(line) => Message::Line(line),
                    // Serial adapters emit junk bytes on connect; skip them.
                    Err(e) if e.kind() == std::io::ErrorKind::InvalidData => continue,
                    Err(e) => Message::Failed(e.to_string()),
                };
                let stop = matches!(message, Message::Failed(_));
                if sender.send(message).is_err() || stop {
                    return;
                }
            }
        });

        Self {
            receiver,
            failed: None,
            _handle: handle,
        }
    }

    /// Open a device node or file.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SourceError::Open(format!("{path:?}: {e}")))?;
        Ok(Self::spawn(BufReader::new(file)))
    }

    /// Read standard input.
    pub fn stdin() -> Self {
        Self::spawn(BufReader::new(std::io::stdin()))
    }

    /// Open `-` as standard input, anything else as a path.
    pub fn open(input: &str) -> Result<Self, SourceError> {
        if input == "-" {
            Ok(Self::stdin())
        } else {
            Self::open_path(input)
        }
    }
}

impl LineSource for ReaderLineSource {
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, SourceError> {
        if let Some(ref msg) = self.failed {
            return Err(SourceError::Io(msg.clone()));
        }

        match self.receiver.recv_timeout(timeout) {
            Ok(Message::Line(line)) => Ok(Some(line)),
            Ok(Message::Failed(msg)) => {
                self.failed = Some(msg.clone());
                Err(SourceError::Io(msg))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Disconnected),
        }
    }
}
