//! Stack collapsing: from raw profiler text to a folded multiset.
//!
//! The types in this module all borrow from the memory-mapped input buffer;
//! nothing here copies a frame name. A [`Sample`] is one observed call
//! stack, a [`FramesKey`] is the borrowed view of a frame sequence used to
//! fold identical stacks, and a [`CollapsedMultiset`] maps each unique
//! sequence to its occurrence count.

/// Folding samples into the collapsed multiset, and the folded-format
/// writer.
pub mod fold;

/// The generic one-frame-per-line dialect.
pub mod generic;

/// Block-parallel parsing and folding for large perf captures.
#[cfg(feature = "multithreaded")]
pub mod parallel;

/// The `perf script` dialect.
pub mod perf;

/// Line scanners over the mapped buffer.
pub mod scan;

use std::cmp::Ordering;
use std::hash::{BuildHasher, Hash, Hasher};

use ahash::RandomState;
use log::warn;
use once_cell::sync::{Lazy, OnceCell};

use crate::{Error, Result};

// One process-wide state for the frame/key hash memos. The memo of a frame
// must be a pure function of its contents for the lifetime of the process:
// keys hashed on different worker threads land in the same concurrent map.
static MEMO_HASHER: Lazy<RandomState> = Lazy::new(RandomState::new);

/// How many non-blank lines the dialect sniffer will look at before giving
/// up and declaring the input generic.
const SNIFF_LINES: usize = 128;

/// Distinguishes a resolved function symbol from a fallback library
/// identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FrameKind {
    /// A resolved function symbol.
    Function,
    /// No symbol was available; the frame carries the library (module)
    /// basename instead.
    Library,
}

/// One entry of a call stack.
///
/// The name borrows from the input buffer, so a frame never outlives the
/// [`crate::buffer::InputBuffer`] it was parsed from. The hash over all
/// three fields is computed at most once and memoised.
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    name: &'a str,
    kind: FrameKind,
    bracketed: bool,
    hash: OnceCell<u64>,
}

impl<'a> Frame<'a> {
    /// A frame for a resolved function symbol.
    pub fn function(name: &'a str) -> Self {
        Frame {
            name,
            kind: FrameKind::Function,
            bracketed: false,
            hash: OnceCell::new(),
        }
    }

    /// A fallback frame carrying a library basename.
    ///
    /// `bracketed` records whether the basename already arrived wrapped in
    /// `[...]` (e.g. `[kernel.kallsyms]`), in which case the folded writer
    /// emits it verbatim instead of adding brackets of its own.
    pub fn library(name: &'a str, bracketed: bool) -> Self {
        Frame {
            name,
            kind: FrameKind::Library,
            bracketed,
            hash: OnceCell::new(),
        }
    }

    /// The frame name as it appeared in the input.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Whether this is a function or a library frame.
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Whether a library name arrived already bracketed.
    pub fn is_bracketed(&self) -> bool {
        self.bracketed
    }

    /// The memoised hash over (name, kind, bracketed).
    pub fn hash_memo(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut h = MEMO_HASHER.build_hasher();
            h.write(self.name.as_bytes());
            h.write_u8(match self.kind {
                FrameKind::Function => 0,
                FrameKind::Library => 1,
            });
            h.write_u8(self.bracketed as u8);
            h.finish()
        })
    }
}

impl PartialEq for Frame<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.kind == other.kind && self.bracketed == other.bracketed
    }
}

impl Eq for Frame<'_> {}

impl Hash for Frame<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_memo());
    }
}

impl PartialOrd for Frame<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frame<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.name, self.kind, self.bracketed).cmp(&(other.name, other.kind, other.bracketed))
    }
}

/// One observation of a call stack.
///
/// Frames are stored root to leaf once parsing completes (the perf parser sees
/// them leaf-first and reverses at the end of each sample). A sample is
/// valid iff it has at least one frame and a positive count; parsers drop
/// invalid samples silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample<'a> {
    /// The frame sequence, root to leaf.
    pub frames: Vec<Frame<'a>>,
    /// Occurrence count, usually 1.
    pub count: usize,
    /// Process (comm) name; empty for dialects that carry none.
    pub comm: &'a str,
    /// Sample timestamp in microseconds; 0 when absent.
    pub timestamp_us: u64,
}

impl<'a> Sample<'a> {
    pub(crate) fn is_valid(&self) -> bool {
        !self.frames.is_empty() && self.count >= 1
    }
}

/// A borrowed view over a sample's frame sequence; the key of the folding
/// multiset.
///
/// Equality is element-wise over the frames; the hash is an order-sensitive
/// combination of the frame hashes, computed at most once.
#[derive(Debug, Clone)]
pub struct FramesKey<'a> {
    frames: &'a [Frame<'a>],
    hash: OnceCell<u64>,
}

impl<'a> FramesKey<'a> {
    /// Wraps a frame sequence as a fold key.
    pub fn new(frames: &'a [Frame<'a>]) -> Self {
        FramesKey {
            frames,
            hash: OnceCell::new(),
        }
    }

    /// The underlying frame sequence.
    pub fn frames(&self) -> &'a [Frame<'a>] {
        self.frames
    }

    fn hash_memo(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut h = MEMO_HASHER.build_hasher();
            for frame in self.frames {
                h.write_u64(frame.hash_memo());
            }
            h.finish()
        })
    }
}

impl PartialEq for FramesKey<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.frames == other.frames
    }
}

impl Eq for FramesKey<'_> {}

impl Hash for FramesKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_memo());
    }
}

impl PartialOrd for FramesKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FramesKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.frames.cmp(other.frames)
    }
}

/// The folded multiset: unique frame sequence to occurrence count.
///
/// Invariant: every key is non-empty and every count is positive. Inserts
/// that would violate it are ignored.
#[derive(Debug, Default)]
pub struct CollapsedMultiset<'a> {
    map: ahash::AHashMap<FramesKey<'a>, usize>,
}

impl<'a> CollapsedMultiset<'a> {
    /// An empty multiset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` occurrences of `key`, folding into an existing entry if
    /// the same sequence was seen before.
    pub fn insert_or_add(&mut self, key: FramesKey<'a>, count: usize) {
        if key.frames().is_empty() || count == 0 {
            return;
        }
        *self.map.entry(key).or_insert(0) += count;
    }

    /// Number of unique stacks.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no stacks were folded.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Count folded under `key`, if present.
    pub fn get(&self, key: &FramesKey<'a>) -> Option<usize> {
        self.map.get(key).copied()
    }

    /// Iterates `(key, count)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&FramesKey<'a>, usize)> {
        self.map.iter().map(|(k, &v)| (k, v))
    }

    /// Total number of samples across all stacks.
    pub fn total_count(&self) -> usize {
        self.map.values().sum()
    }

    /// Drops keys whose count fell below `min_count`. A `min_count` of 0 or
    /// 1 keeps everything.
    pub fn retain_min(&mut self, min_count: usize) {
        if min_count > 1 {
            self.map.retain(|_, count| *count >= min_count);
        }
    }
}

impl<'a> PartialEq for CollapsedMultiset<'a> {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl<'a> Eq for CollapsedMultiset<'a> {}

/// The two supported input dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Output of `perf script`: header lines with events and timestamps,
    /// followed by indented address/symbol frame lines.
    PerfScript,
    /// One verbatim frame per line; blank lines and `#` comments terminate
    /// a sample.
    Generic,
}

impl Dialect {
    /// The dialect's string tag, used in error messages and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Dialect::PerfScript => "perf-script",
            Dialect::Generic => "generic",
        }
    }

    /// Classifies the input by inspecting up to 128 non-blank trimmed
    /// lines.
    ///
    /// A line containing `cycles:` or `instructions:`, or starting with a
    /// hex digit and containing `(`, marks the input as perf-script.
    /// Anything ambiguous resolves to generic.
    pub fn sniff<'i, I>(lines: I) -> Dialect
    where
        I: IntoIterator<Item = &'i [u8]>,
    {
        let mut seen = 0;
        for line in lines {
            if line.is_empty() {
                continue;
            }
            if contains(line, b"cycles:")
                || contains(line, b"instructions:")
                || (line[0].is_ascii_hexdigit() && line.contains(&b'('))
            {
                return Dialect::PerfScript;
            }
            seen += 1;
            if seen >= SNIFF_LINES {
                break;
            }
        }
        Dialect::Generic
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Converts a trimmed raw line to UTF-8, dropping undecodable lines with a
/// warning. Profile captures routinely contain binary noise at stack
/// boundaries; one bad line must not sink the sample.
pub(crate) fn line_str(line: &[u8]) -> Option<&str> {
    match std::str::from_utf8(line) {
        Ok(s) => Some(s),
        Err(_) => {
            warn!("dropping non-UTF-8 line ({} bytes)", line.len());
            None
        }
    }
}

/// Parses the whole buffer with the given dialect.
///
/// Returns [`Error::ParseEmpty`] if no valid samples were extracted.
pub fn parse_buffer(buf: &[u8], dialect: Dialect) -> Result<Vec<Sample<'_>>> {
    let lines = scan::Lines::new(buf);
    let samples = match dialect {
        Dialect::PerfScript => {
            let mut parser = perf::Parser::default();
            let mut samples = Vec::new();
            parser.parse_lines(lines, &mut samples)?;
            samples
        }
        Dialect::Generic => generic::parse_lines(lines),
    };
    if samples.is_empty() {
        return Err(Error::ParseEmpty);
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sniff(input: &[u8]) -> Dialect {
        Dialect::sniff(scan::Lines::new(input))
    }

    #[test]
    fn sniff_detects_perf_by_event_name() {
        assert_eq!(
            sniff(b"java 1234 12.34: 250000 cycles:\n"),
            Dialect::PerfScript
        );
        assert_eq!(
            sniff(b"prog 1 0.5: 1 instructions:\n"),
            Dialect::PerfScript
        );
    }

    #[test]
    fn sniff_detects_perf_by_frame_shape() {
        assert_eq!(
            sniff(b"    deadbeef foo+0x10 (/usr/bin/prog)\n"),
            Dialect::PerfScript
        );
    }

    #[test]
    fn sniff_falls_back_to_generic() {
        assert_eq!(sniff(b"main\nworker\ncompute\n"), Dialect::Generic);
        assert_eq!(sniff(b""), Dialect::Generic);
        assert_eq!(sniff(b"\n\n\n"), Dialect::Generic);
    }

    #[test]
    fn sniff_gives_up_after_128_lines() {
        let mut input = b"plain\n".repeat(128);
        input.extend_from_slice(b"deadbeef foo (/bin/x)\n");
        assert_eq!(sniff(&input), Dialect::Generic);
    }

    #[test]
    fn frame_hash_memo_is_stable() {
        let f = Frame::function("alpha");
        let first = f.hash_memo();
        assert_eq!(first, f.hash_memo());
        // equal content on a fresh instance hashes identically
        assert_eq!(first, Frame::function("alpha").hash_memo());
    }

    #[test]
    fn frame_identity_covers_all_fields() {
        assert_ne!(Frame::function("x"), Frame::library("x", false));
        assert_ne!(Frame::library("x", false), Frame::library("x", true));
        assert_eq!(Frame::function("x"), Frame::function("x"));
    }

    #[test]
    fn frames_key_equality_is_elementwise() {
        let a = [Frame::function("a"), Frame::function("b")];
        let b = [Frame::function("a"), Frame::function("b")];
        let c = [Frame::function("b"), Frame::function("a")];
        assert_eq!(FramesKey::new(&a), FramesKey::new(&b));
        assert_eq!(
            FramesKey::new(&a).hash_memo(),
            FramesKey::new(&b).hash_memo()
        );
        assert_ne!(FramesKey::new(&a), FramesKey::new(&c));
    }

    #[test]
    fn multiset_folds_and_keeps_invariant() {
        let frames = [Frame::function("a")];
        let mut set = CollapsedMultiset::new();
        set.insert_or_add(FramesKey::new(&frames), 2);
        set.insert_or_add(FramesKey::new(&frames), 3);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&FramesKey::new(&frames)), Some(5));

        // empty keys and zero counts never enter the map
        set.insert_or_add(FramesKey::new(&[]), 1);
        set.insert_or_add(FramesKey::new(&frames), 0);
        assert_eq!(set.len(), 1);
        assert_eq!(set.total_count(), 5);
    }

    #[test]
    fn multiset_min_count_filter() {
        let a = [Frame::function("a")];
        let b = [Frame::function("b")];
        let mut set = CollapsedMultiset::new();
        set.insert_or_add(FramesKey::new(&a), 5);
        set.insert_or_add(FramesKey::new(&b), 1);
        set.retain_min(2);
        assert_eq!(set.len(), 1);
        assert!(set.get(&FramesKey::new(&a)).is_some());
    }
}
