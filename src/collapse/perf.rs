//! Parser for the output of [`perf script`](https://linux.die.net/man/1/perf-script).
//!
//! A sample is a header line (comm, pid, timestamp, event; the line always
//! carries a `:`), followed by zero or more frame lines of the shape
//! `<hex-addr> <symbol>(+0x<hex>)?( \(<path>\))?`, terminated by a blank
//! line or EOF. Frame lines arrive leaf-first; the parser reverses them so
//! every emitted [`Sample`] is ordered root to leaf.

use std::mem;

use log::warn;

use super::{line_str, Frame, Sample};
use crate::{Error, Result};

/// Incremental perf-script parser.
///
/// Feed it one or more line runs with [`Parser::parse_lines`]; any sample
/// still open when a run ends is flushed, which is what makes block-wise
/// parallel parsing work (a block's end is always a sample boundary).
#[derive(Debug, Default)]
pub struct Parser<'a> {
    in_sample: bool,
    frames: Vec<Frame<'a>>,
    comm: &'a str,
    timestamp_us: u64,
}

impl<'a> Parser<'a> {
    /// Parses a run of trimmed lines, appending completed samples to `out`.
    ///
    /// Malformed frame lines are dropped with a warning while the sample
    /// continues; samples that end up with zero frames are dropped
    /// silently. A header whose timestamp token is numeric but truncated is
    /// a fatal [`Error::ParseFormat`].
    pub fn parse_lines<I>(&mut self, lines: I, out: &mut Vec<Sample<'a>>) -> Result<()>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        for raw in lines {
            if raw.is_empty() {
                self.flush(out);
                continue;
            }
            let line = match line_str(raw) {
                Some(line) => line,
                None => continue,
            };
            if line.starts_with('#') {
                continue;
            }
            if self.in_sample {
                self.on_frame_line(line);
            } else {
                self.on_header_line(line)?;
            }
        }
        self.flush(out);
        Ok(())
    }

    // Header lines look like:
    //
    //     java 25607 4794564.109216: cycles:
    //     java 12688 [002] 6544038.708352: cpu-clock:
    //     vote   913    72.176760:     257597 cycles:uppp:
    //
    // The comm is the first whitespace-delimited token; the timestamp is the
    // numeric token immediately before the first `:`, in fractional seconds.
    fn on_header_line(&mut self, line: &'a str) -> Result<()> {
        let colon = match line.find(':') {
            Some(i) => i,
            None => {
                warn!("weird header line: {}", line);
                return Ok(());
            }
        };
        self.comm = line.split_ascii_whitespace().next().unwrap_or("");
        self.timestamp_us = match line[..colon].rsplit(|c: char| c.is_ascii_whitespace()).next() {
            Some(tok) if tok.starts_with(|c: char| c.is_ascii_digit()) => {
                parse_fractional_seconds(tok)?
            }
            _ => 0,
        };
        self.in_sample = true;
        Ok(())
    }

    fn on_frame_line(&mut self, line: &'a str) {
        match parse_frame(line) {
            FrameLine::Frame(frame) => self.frames.push(frame),
            FrameLine::Empty => {}
            FrameLine::Weird => warn!("weird frame line: {}", line),
        }
    }

    fn flush(&mut self, out: &mut Vec<Sample<'a>>) {
        if self.in_sample {
            let mut frames = mem::take(&mut self.frames);
            // parsed leaf-first; folding and the tree expect root-to-leaf order
            frames.reverse();
            let sample = Sample {
                frames,
                count: 1,
                comm: self.comm,
                timestamp_us: self.timestamp_us,
            };
            if sample.is_valid() {
                out.push(sample);
            }
        }
        self.in_sample = false;
        self.frames.clear();
        self.comm = "";
        self.timestamp_us = 0;
    }
}

enum FrameLine<'a> {
    Frame(Frame<'a>),
    Empty,
    Weird,
}

// Frame lines look like:
//
//     ffffffff8103ce3b native_safe_halt ([kernel.kallsyms])
//     7f533952bc77 _dl_check_map_versions+0x597 (/usr/lib/ld-2.28.so)
//     7f53389994d0 [unknown] (/lib/libc.so.6)
//                0 [unknown] ([unknown])
fn parse_frame(line: &str) -> FrameLine<'_> {
    // skip the leading hex address token
    let rest = match line.split_once(|c: char| c.is_ascii_whitespace()) {
        Some((_addr, rest)) => rest.trim_start(),
        None => return FrameLine::Empty,
    };

    // a trailing `(...)` is the library; everything before it the function
    let (func, library) = match rest.rfind('(') {
        Some(open) if rest.ends_with(')') => {
            (rest[..open].trim(), &rest[open + 1..rest.len() - 1])
        }
        _ => (rest, ""),
    };

    // strip a `+0x<hex>` offset suffix, but leave `[unknown]` untouched
    let func = strip_offset(func);

    // only the basename of a library path matters; `[...]` basenames such
    // as `[kernel.kallsyms]` arrive pre-bracketed
    let library = library.rsplit('/').next().unwrap_or(library);
    let bracketed = library.len() >= 2 && library.starts_with('[') && library.ends_with(']');

    if !func.is_empty() && func != "[unknown]" {
        FrameLine::Frame(Frame::function(func))
    } else if !library.is_empty() {
        FrameLine::Frame(Frame::library(library, bracketed))
    } else if func.is_empty() {
        FrameLine::Empty
    } else {
        // `[unknown]` with no library to fall back on
        FrameLine::Weird
    }
}

fn strip_offset(func: &str) -> &str {
    if func == "[unknown]" {
        return func;
    }
    if let Some(plus) = func.rfind("+0x") {
        let end = &func[plus + 3..];
        if end.chars().all(|c| c.is_ascii_hexdigit()) {
            return &func[..plus];
        }
    }
    func
}

// `1.000000` becomes 1_000_000. perf prints at most microsecond precision;
// extra fraction digits are truncated.
fn parse_fractional_seconds(tok: &str) -> Result<u64> {
    let truncated = || Error::ParseFormat {
        dialect: "perf-script",
        reason: format!("truncated numeric timestamp {:?}", tok),
    };
    let (secs, frac) = match tok.split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (tok, ""),
    };
    let secs: u64 = secs.parse().map_err(|_| truncated())?;
    let mut micros = 0u64;
    for (i, c) in frac.chars().enumerate() {
        if i >= 6 {
            break;
        }
        let digit = c.to_digit(10).ok_or_else(|| truncated())? as u64;
        micros = micros * 10 + digit;
    }
    let scale = 10u64.pow(6 - frac.len().min(6) as u32);
    Ok(secs * 1_000_000 + micros * scale)
}
