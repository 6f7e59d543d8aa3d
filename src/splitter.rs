//! Turns a loaded byte buffer into display lines.

/// Appended to a line that ends in a space so consumers that trim trailing
/// whitespace keep the padding.
pub const PROTECT_MARKER: u8 = 0x03;

/// One line produced by [`LineSplitter::next_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitLine {
    pub text: Vec<u8>,
    /// The cursor reached the end of the buffer while producing this line.
    pub last: bool,
}

/// Lazy, forward-only line reader over an in-memory buffer.
///
/// `\r` is dropped, `\n` ends a line. Bytes past `max_line_bytes` on a single
/// physical line are skipped. Once the cursor has advanced it never moves
/// back; replaying a source means building a new splitter.
#[derive(Debug)]
pub struct LineSplitter {
    buffer: Vec<u8>,
    cursor: usize,
    max_line_bytes: usize,
}

impl LineSplitter {
    pub fn new(buffer: Vec<u8>) -> Self {
        Self::with_line_limit(buffer, usize::MAX)
    }

    pub fn with_line_limit(buffer: Vec<u8>, max_line_bytes: usize) -> Self {
        Self {
            buffer,
            cursor: 0,
            max_line_bytes,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.buffer.len()
    }

    /// Scan forward from the cursor to the next line terminator.
    ///
    /// Returns `None` when nothing is left to emit: the buffer is exhausted,
    /// or only `\r` bytes remained after the final `\n`.
    pub fn next_line(&mut self) -> Option<SplitLine> {
        if self.is_exhausted() {
            return None;
        }

        let mut text = Vec::new();
        let mut terminated = false;
        while self.cursor < self.buffer.len() {
            let byte = self.buffer[self.cursor];
            self.cursor += 1;
            match byte {
                b'\n' => {
                    terminated = true;
                    break;
                }
                b'\r' => {}
                _ if text.len() < self.max_line_bytes => text.push(byte),
                _ => {}
            }
        }

        let last = self.is_exhausted();
        if !terminated && text.is_empty() {
            return None;
        }
        if text.last() == Some(&b' ') {
            text.push(PROTECT_MARKER);
        }
        Some(SplitLine { text, last })
    }
}

impl Iterator for LineSplitter {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().map(|line| line.text)
    }
}
