//! Parser for the generic one-frame-per-line dialect.
//!
//! Every non-blank, non-comment line is one frame of the current sample,
//! taken verbatim and ordered root to leaf as written. A blank line or a
//! `#`-prefixed line terminates the sample. All samples have count 1 and
//! carry no process name or timestamp.

use super::{line_str, Frame, Sample};

/// Parses a run of trimmed lines into samples.
pub fn parse_lines<'a, I>(lines: I) -> Vec<Sample<'a>>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut samples = Vec::new();
    let mut frames: Vec<Frame<'a>> = Vec::new();
    for raw in lines {
        if raw.is_empty() || raw[0] == b'#' {
            flush(&mut frames, &mut samples);
            continue;
        }
        if let Some(line) = line_str(raw) {
            frames.push(Frame::function(line));
        }
    }
    flush(&mut frames, &mut samples);
    samples
}

fn flush<'a>(frames: &mut Vec<Frame<'a>>, samples: &mut Vec<Sample<'a>>) {
    if frames.is_empty() {
        return;
    }
    let sample = Sample {
        frames: std::mem::take(frames),
        count: 1,
        comm: "",
        timestamp_us: 0,
    };
    if sample.is_valid() {
        samples.push(sample);
    }
}
