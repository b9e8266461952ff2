//! Zero-copy line scanning over the mapped input.
//!
//! Both scanners share one contract: produce the sequence of trimmed lines
//! as borrowed views into the buffer, where a line ends at `\n` or EOF and
//! trimming removes leading/trailing ASCII whitespace (space, tab, `\r`,
//! `\n`). [`Lines`] walks a cursor; [`LineIndex`] precomputes line starts so
//! any line is reachable in O(1) and contiguous blocks can be handed out by
//! line number.

/// Trims ASCII whitespace from both ends of a raw line.
pub(crate) fn trim(line: &[u8]) -> &[u8] {
    let mut start = 0;
    let mut end = line.len();
    while start < end && line[start].is_ascii_whitespace() {
        start += 1;
    }
    while end > start && line[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    &line[start..end]
}

/// Sequential line iterator over a byte buffer.
#[derive(Debug, Clone)]
pub struct Lines<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Lines<'a> {
    /// Creates a scanner positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Lines { buf, pos: 0 }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let rest = &self.buf[self.pos..];
        let (raw, advance) = match rest.iter().position(|&b| b == b'\n') {
            Some(nl) => (&rest[..nl], nl + 1),
            None => (rest, rest.len()),
        };
        self.pos += advance;
        Some(trim(raw))
    }
}

/// Random-access line scanner backed by a precomputed offset table.
///
/// Used by the parallel orchestrator to assign contiguous line ranges to
/// workers; the offsets make any block boundary addressable without
/// re-scanning the buffer.
#[derive(Debug)]
pub struct LineIndex<'a> {
    buf: &'a [u8],
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    /// Scans `buf` once and records the byte offset of every line start.
    pub fn new(buf: &'a [u8]) -> Self {
        let mut starts = Vec::with_capacity(buf.len() / 32 + 1);
        if !buf.is_empty() {
            starts.push(0);
            for (i, &b) in buf.iter().enumerate() {
                if b == b'\n' && i + 1 < buf.len() {
                    starts.push(i + 1);
                }
            }
        }
        LineIndex { buf, starts }
    }

    /// Number of lines in the buffer.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// Whether the buffer holds no lines at all.
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// The `i`-th line, trimmed. O(1).
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    pub fn line(&self, i: usize) -> &'a [u8] {
        let start = self.starts[i];
        let end = match self.starts.get(i + 1) {
            Some(&next) => next - 1, // drop the newline
            None => self.buf.len(),
        };
        trim(&self.buf[start..end])
    }

    /// Iterates the trimmed lines of `[from, to)`.
    pub fn range(&self, from: usize, to: usize) -> impl Iterator<Item = &'a [u8]> + '_ {
        (from..to.min(self.len())).map(move |i| self.line(i))
    }
}
