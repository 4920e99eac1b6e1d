//! Line source replaying a fixed script.
//!
//! Used by tests and the replay demo in place of a real device.

use crate::source::types::{LineSource, SourceError};
use std::collections::VecDeque;
use std::time::Duration;

/// Replays queued lines, one per read.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLineSource {
    lines: VecDeque<Option<String>>,
    disconnect_when_drained: bool,
}

impl ScriptedLineSource {
    /// A source that yields `lines` and then reports a disconnect.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(|l| Some(l.into())).collect(),
            disconnect_when_drained: true,
        }
    }

    /// Keep returning "no data" after the script runs out instead of
    /// disconnecting.
    pub fn idle_when_drained(mut self) -> Self {
        self.disconnect_when_drained = false;
        self
    }

    /// Queue a read that times out with no data.
    pub fn push_silence(&mut self) {
        self.lines.push_back(None);
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push_back(Some(line.into()));
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl LineSource for ScriptedLineSource {
    fn read_line(&mut self, _timeout: Duration) -> Result<Option<String>, SourceError> {
        match self.lines.pop_front() {
            Some(line) => Ok(line),
            None if self.disconnect_when_drained => Err(SourceError::Disconnected),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_order_and_disconnect() {
        let mut source = ScriptedLineSource::new(["BPM: 72"]);
        source.push_silence();
        source.push_line("BPM: 80");

        let t = Duration::ZERO;
        assert_eq!(source.read_line(t).unwrap().as_deref(), Some("BPM: 72"));
        assert_eq!(source.read_line(t).unwrap(), None);
        assert_eq!(source.read_line(t).unwrap().as_deref(), Some("BPM: 80"));
        assert!(matches!(source.read_line(t), Err(SourceError::Disconnected)));
    }

    #[test]
    fn test_idle_when_drained() {
        let mut source = ScriptedLineSource::new(Vec::<String>::new()).idle_when_drained();
        assert_eq!(source.read_line(Duration::ZERO).unwrap(), None);
    }
}
