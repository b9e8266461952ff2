use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias for pipeline results.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between opening the input and closing the
/// output.
///
/// All variants are fatal to the current invocation; individual malformed
/// lines and samples inside the input are tolerated at the parser level and
/// never surface here.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The input path does not exist.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// Opening, mapping, reading, or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration validation rejected a field.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The input yielded no valid samples at all.
    #[error("no valid samples found in input")]
    ParseEmpty,

    /// Internal inconsistency while reading a sample the parser had already
    /// committed to, e.g. a truncated timestamp in a perf header.
    #[error("malformed {dialect} input: {reason}")]
    ParseFormat {
        /// Tag of the dialect that was being parsed.
        dialect: &'static str,
        /// What the parser choked on.
        reason: String,
    },

    /// A downstream stage (folding, tree building) produced nothing.
    #[error("pipeline produced no data during {0}")]
    PipelineEmpty(&'static str),

    /// The output document could not be written mid-stream.
    #[error("render failed: {0}")]
    Render(String),

    /// The output extension is not in the supported set.
    #[error("unsupported output extension: {0:?} (expected svg or html)")]
    SuffixUnknown(String),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        match e {
            quick_xml::Error::Io(e) => Error::Io(e),
            other => Error::Render(other.to_string()),
        }
    }
}
