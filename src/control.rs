//! The control block shared between the engine and its host: session state,
//! the single-line queue, pending status notices and the typed event stream.

use crate::error::StateError;
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Running,
    Paused,
    /// Teardown in progress; becomes `Idle` once resources are released.
    Stopping,
}

/// Human-readable status notices echoed to the consumer's status window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Started,
    Paused,
    Resumed,
    Stopped,
    Ended,
}

impl Notice {
    pub fn text(self) -> &'static str {
        match self {
            Notice::Started => "Playback Started!",
            Notice::Paused => "Playback Paused!",
            Notice::Resumed => "Playback Resumed!",
            Notice::Stopped => "Playback Stopped!",
            Notice::Ended => "Playback Ended!",
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Everything observable about a playback, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started { channel: String },
    /// A single-line request was queued for the host to drain.
    LineQueued { pending: usize },
    /// A formatted command was handed to a transport successfully.
    LineDelivered { command: Vec<u8> },
    Paused,
    Resumed,
    /// Stopped on request.
    Stopped,
    /// The source ran out and the session stopped by itself.
    Ended,
    /// A transport or resource failure aborted the session.
    Failed { reason: String },
}

/// A single-line request waiting for the host to drain it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedLine {
    pub channel: String,
    pub text: Vec<u8>,
}

/// Fixed-capacity ring buffer with separate in/out indices.
///
/// `in == out` means empty and one slot is always held back, so at most
/// `capacity - 1` entries wait at once. A push onto a full ring is rejected
/// and leaves every queued entry untouched.
#[derive(Debug)]
pub struct LineFifo {
    slots: Vec<Option<QueuedLine>>,
    input: usize,
    output: usize,
}

impl LineFifo {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            slots: vec![None; capacity],
            input: 0,
            output: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input == self.output
    }

    pub fn is_full(&self) -> bool {
        (self.input + 1) % self.capacity() == self.output
    }

    pub fn len(&self) -> usize {
        (self.input + self.capacity() - self.output) % self.capacity()
    }

    pub fn push(&mut self, line: QueuedLine) -> Result<(), StateError> {
        if self.is_full() {
            return Err(StateError::FifoFull);
        }
        self.slots[self.input] = Some(line);
        self.input = (self.input + 1) % self.capacity();
        Ok(())
    }

    pub fn pop(&mut self) -> Option<QueuedLine> {
        if self.is_empty() {
            return None;
        }
        let line = self.slots[self.output].take();
        self.output = (self.output + 1) % self.capacity();
        line
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.input = 0;
        self.output = 0;
    }
}

/// Hand-off surface between control callers and the host's poll context.
#[derive(Debug)]
pub struct ControlBlock {
    pub fifo: LineFifo,
    notices: VecDeque<Notice>,
}

impl ControlBlock {
    pub fn new(fifo_capacity: usize) -> Self {
        Self {
            fifo: LineFifo::new(fifo_capacity),
            notices: VecDeque::new(),
        }
    }

    pub fn post_notice(&mut self, notice: Notice) {
        self.notices.push_back(notice);
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.fifo.clear();
        self.notices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> QueuedLine {
        QueuedLine {
            channel: "status".to_string(),
            text: text.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_empty_iff_indices_equal() {
        let mut fifo = LineFifo::new(4);
        assert!(fifo.is_empty());
        fifo.push(line("a")).unwrap();
        assert!(!fifo.is_empty());
        fifo.pop();
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_fifo_order_preserved_across_wrap() {
        let mut fifo = LineFifo::new(4);
        for round in 0..5 {
            fifo.push(line(&format!("{round}-a"))).unwrap();
            fifo.push(line(&format!("{round}-b"))).unwrap();
            assert_eq!(fifo.pop().unwrap().text, format!("{round}-a").into_bytes());
            assert_eq!(fifo.pop().unwrap().text, format!("{round}-b").into_bytes());
        }
        assert!(fifo.is_empty());
    }

    // Overflow policy is reject-new: after `capacity` pushes without a pop the
    // last push fails and the oldest entry is still first out.
    #[test]
    fn test_overflow_rejects_newest() {
        let mut fifo = LineFifo::new(4);
        for text in ["one", "two", "three"] {
            fifo.push(line(text)).unwrap();
        }
        assert!(fifo.is_full());
        assert_eq!(fifo.push(line("four")), Err(StateError::FifoFull));
        assert_eq!(fifo.len(), 3);
        assert_eq!(fifo.pop().unwrap().text, b"one");
        fifo.push(line("four")).unwrap();
        let rest: Vec<_> = std::iter::from_fn(|| fifo.pop()).map(|l| l.text).collect();
        assert_eq!(rest, vec![b"two".to_vec(), b"three".to_vec(), b"four".to_vec()]);
    }

    #[test]
    fn test_clear_resets_indices() {
        let mut fifo = LineFifo::new(4);
        fifo.push(line("a")).unwrap();
        fifo.push(line("b")).unwrap();
        fifo.clear();
        assert!(fifo.is_empty());
        assert_eq!(fifo.len(), 0);
        assert_eq!(fifo.pop(), None);
    }

    #[test]
    fn test_notices_drain_in_order() {
        let mut control = ControlBlock::new(4);
        control.post_notice(Notice::Started);
        control.post_notice(Notice::Ended);
        assert_eq!(control.take_notices(), vec![Notice::Started, Notice::Ended]);
        assert!(control.take_notices().is_empty());
    }
}
