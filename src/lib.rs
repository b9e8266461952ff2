//! FlameCrafter turns raw stack-trace samples into interactive [flame graph]
//! visualisations.
//!
//! Sampling profilers like [`perf`] periodically record the call stack of a
//! running program. Given enough of those snapshots you can tell where the
//! program spends its time by counting how often each stack occurs. The
//! classic workflow "collapses" the stacks into a multiset of
//! `stack, count` pairs and then plots the multiset as a flame graph, where
//! each frame's width is proportional to the number of samples that passed
//! through it.
//!
//! FlameCrafter runs that whole pipeline in one call:
//!
//! 1. the input file is memory-mapped and scanned without copying
//!    ([`buffer`], [`collapse::scan`]);
//! 2. the input dialect is sniffed, either `perf script` output or a
//!    generic one-frame-per-line listing ([`collapse::Dialect`]);
//! 3. samples are parsed into frame sequences that borrow straight from the
//!    mapped buffer ([`collapse::perf`], [`collapse::generic`]);
//! 4. identical stacks are folded into a multiset ([`collapse::fold`]), in
//!    parallel for large perf captures when the `multithreaded` feature is
//!    enabled;
//! 5. the multiset is materialised as an aggregation tree
//!    ([`flamegraph::tree`]) and rendered to SVG or HTML
//!    ([`flamegraph::from_file`]).
//!
//! # Command-line use
//!
//! ```console
//! $ perf script > out.perf
//! $ flamecrafter out.perf profile.svg
//! ```
//!
//! The output extension selects the renderer: `.svg` produces a
//! self-contained interactive SVG, `.html` a d3-flamegraph page.
//!
//! # Programmatic use
//!
//! ```no_run
//! use flamecrafter::flamegraph::{self, Options};
//!
//! let mut opt = Options::default();
//! opt.title = "my program".to_string();
//! flamegraph::from_file(&opt, "out.perf".as_ref(), "profile.svg".as_ref())?;
//! # Ok::<(), flamecrafter::Error>(())
//! ```
//!
//!   [flame graph]: http://www.brendangregg.com/flamegraphs.html
//!   [`perf`]: https://perf.wiki.kernel.org/index.php/Main_Page

#![deny(missing_docs)]

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

/// Memory-mapped input buffers.
pub mod buffer;

/// Profile consumption: scanning, dialect detection, parsing, and folding.
pub mod collapse;

/// Flame tree construction and SVG/HTML rendering.
pub mod flamegraph;

mod error;

pub use error::{Error, Result};
