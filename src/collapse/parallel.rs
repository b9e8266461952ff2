//! Block-parallel parsing and folding for large perf-script captures.
//!
//! The indexed scanner splits the line range into contiguous blocks, one per
//! worker. Every block start is advanced to the next safe sample boundary
//! (a blank line or a `:`-bearing header line) *before* the workers are
//! spawned, and block `i` ends exactly where block `i + 1` begins, so each
//! sample is parsed by exactly one worker and a block's range end is always
//! a proven sample boundary that the parser can flush at. Workers merge
//! their samples into a concurrent multiset: an atomic add when the key is
//! already present, an insert under the bucket's exclusive lock on first
//! occurrence. After the join, the map is drained into the sequential
//! [`CollapsedMultiset`] for the downstream stages.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use dashmap::DashMap;
use log::{debug, info};

use super::scan::LineIndex;
use super::{perf, CollapsedMultiset, FramesKey, Sample};
use crate::Result;

/// Inputs shorter than this many lines per unit of hardware parallelism are
/// not worth the fan-out.
const LINES_PER_CPU: usize = 10_000;

/// Resolves the worker count: `requested == 0` means all hardware threads;
/// anything else is clamped to the hardware.
pub fn nworkers(requested: usize) -> usize {
    let hw = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    if requested == 0 {
        hw
    } else {
        requested.min(hw)
    }
}

/// Whether the parallel path should activate for an input of `nlines`
/// lines.
pub fn worthwhile(nlines: usize, workers: usize) -> bool {
    workers > 1 && nlines >= workers * LINES_PER_CPU
}

/// Parses and folds the indexed input across `arenas.len()` workers.
///
/// `reverse` and `max_depth` mirror the sequential fold: frame order is
/// reversed per sample before folding, and keys are truncated to the first
/// `max_depth` frames (0 = unlimited).
///
/// The caller owns the per-worker sample arenas; the returned multiset
/// borrows into them (and, transitively, into the mapped buffer), so the
/// arenas must stay alive for as long as the multiset does.
pub fn fold_blocks<'s, 'a: 's>(
    index: &LineIndex<'a>,
    arenas: &'s mut [Vec<Sample<'a>>],
    reverse: bool,
    max_depth: usize,
) -> Result<CollapsedMultiset<'s>> {
    let workers = arenas.len();
    assert!(workers >= 1);

    let nlines = index.len();
    let mut bounds = Vec::with_capacity(workers + 1);
    bounds.push(0);
    for i in 1..workers {
        bounds.push(seek_boundary(index, i * nlines / workers));
    }
    bounds.push(nlines);
    debug!("parallel fold: {} lines across {} blocks", nlines, workers);

    let shared: DashMap<FramesKey<'s>, AtomicUsize, ahash::RandomState> =
        DashMap::with_hasher(ahash::RandomState::new());

    crossbeam_utils::thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::with_capacity(workers);
        for (i, slot) in arenas.into_iter().enumerate() {
            let (from, to) = (bounds[i], bounds[i + 1]);
            let shared = &shared;
            handles.push(scope.spawn(move |_| -> Result<()> {
                let mut parser = perf::Parser::default();
                parser.parse_lines(index.range(from, to), slot)?;
                if reverse {
                    for sample in slot.iter_mut() {
                        sample.frames.reverse();
                    }
                }

                // Freeze this worker's arena: the keys below borrow it for
                // the rest of the multiset's lifetime.
                let parsed: &'s [Sample<'a>] = slot;
                for sample in parsed {
                    let frames = if max_depth > 0 && sample.frames.len() > max_depth {
                        &sample.frames[..max_depth]
                    } else {
                        &sample.frames[..]
                    };
                    merge(shared, FramesKey::new(frames), sample.count);
                }
                Ok(())
            }));
        }
        for handle in handles {
            handle.join().unwrap()?;
        }
        Ok(())
    })
    .unwrap()?;

    let mut set = CollapsedMultiset::new();
    for (key, count) in shared.into_iter() {
        set.insert_or_add(key, count.into_inner());
    }
    info!(
        "parallel fold over {} workers produced {} unique stacks",
        workers,
        set.len()
    );
    Ok(set)
}

// Counts merge commutatively, so no ordering between workers is needed; the
// Relaxed adds are reconciled by the join before anyone reads.
fn merge<'s>(
    shared: &DashMap<FramesKey<'s>, AtomicUsize, ahash::RandomState>,
    key: FramesKey<'s>,
    count: usize,
) {
    if let Some(existing) = shared.get(&key) {
        existing.fetch_add(count, Ordering::Relaxed);
        return;
    }
    shared
        .entry(key)
        .or_insert_with(|| AtomicUsize::new(0))
        .fetch_add(count, Ordering::Relaxed);
}

// Advances `at` to the first line that can begin a block: a blank line or a
// header line (the first `:`-bearing line). Headers and blank lines
// unambiguously delimit perf samples.
fn seek_boundary(index: &LineIndex<'_>, mut at: usize) -> usize {
    while at < index.len() {
        let line = index.line(at);
        if line.is_empty() || line.contains(&b':') {
            break;
        }
        at += 1;
    }
    at
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collapse::{fold, parse_buffer, Dialect};

    fn synthetic_perf(samples: usize) -> String {
        let mut input = String::new();
        for i in 0..samples {
            input.push_str(&format!("prog 42 {}.000000: 250000 cycles:\n", i));
            input.push_str(&format!("    aaa{0:x} leaf_{1} (/bin/prog)\n", i, i % 7));
            input.push_str(&format!("    bbb{0:x} mid_{1} (/bin/prog)\n", i, i % 3));
            input.push_str("    ccc1 main (/bin/prog)\n");
            input.push('\n');
        }
        input
    }

    #[test]
    fn seek_stops_on_blank_or_header() {
        let buf = b"h 1 1.0: cycles:\n  a f (/b)\n  b g (/b)\n\nh 1 2.0: cycles:\n";
        let index = LineIndex::new(buf);
        // from inside the frame run, the next boundary is the blank line
        assert_eq!(seek_boundary(&index, 1), 3);
        assert_eq!(seek_boundary(&index, 2), 3);
        // a header is itself a boundary
        assert_eq!(seek_boundary(&index, 4), 4);
        // past the end stays put
        assert_eq!(seek_boundary(&index, 5), 5);
    }

    #[test]
    fn parallel_matches_sequential() {
        let input = synthetic_perf(200);
        let buf = input.as_bytes();

        let samples = parse_buffer(buf, Dialect::PerfScript).unwrap();
        let sequential = fold::fold(&samples, 0);

        for workers in [1, 2, 3, 4, 7] {
            let index = LineIndex::new(buf);
            let mut arenas: Vec<Vec<Sample<'_>>> = (0..workers).map(|_| Vec::new()).collect();
            let parallel = fold_blocks(&index, &mut arenas, false, 0).unwrap();
            assert_eq!(
                sequential, parallel,
                "parallel fold with {} workers diverged",
                workers
            );
        }
    }

    #[test]
    fn parallel_matches_sequential_with_reverse_and_depth_cap() {
        let input = synthetic_perf(120);
        let buf = input.as_bytes();

        let mut samples = parse_buffer(buf, Dialect::PerfScript).unwrap();
        for sample in &mut samples {
            sample.frames.reverse();
        }
        let sequential = fold::fold(&samples, 2);

        let index = LineIndex::new(buf);
        let mut arenas: Vec<Vec<Sample<'_>>> = (0..4).map(|_| Vec::new()).collect();
        let parallel = fold_blocks(&index, &mut arenas, true, 2).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn more_workers_than_samples_is_fine() {
        let input = synthetic_perf(2);
        let buf = input.as_bytes();
        let index = LineIndex::new(buf);
        let mut arenas: Vec<Vec<Sample<'_>>> = (0..8).map(|_| Vec::new()).collect();
        let set = fold_blocks(&index, &mut arenas, false, 0).unwrap();
        assert_eq!(set.total_count(), 2);
    }

    #[test]
    fn activation_threshold() {
        assert!(!worthwhile(100, 4));
        assert!(!worthwhile(1_000_000, 1));
        assert!(worthwhile(40_000, 4));
    }
}
