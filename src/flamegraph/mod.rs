//! Producing flame graphs: configuration, the aggregation tree, and the
//! SVG/HTML renderers.

/// Colour schemes for frames.
pub mod color;

/// The aggregation tree over folded stacks.
pub mod tree;

mod html;
mod svg;

use std::ffi::OsStr;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use log::{debug, info};

use crate::buffer::InputBuffer;
use crate::collapse::{self, fold, scan, Dialect};
use crate::{Error, Result};
use tree::FlameTree;

/// Default values for [`Options`].
pub mod defaults {
    macro_rules! doc {
        ($str:expr, $($def:tt)*) => {
            #[doc = $str]
            $($def)*
        };
    }

    macro_rules! define {
        ($($name:ident : $t:ty = $val:tt),*) => {
            $(
                doc!(
                    stringify!($val),
                    pub const $name: $t = $val;
                );
            )*
        }
    }

    define! {
        COLORS: &str = "hot",
        SEARCH_COLOR: &str = "#e600e6",
        BGCOLOR1: &str = "#eeeeee",
        BGCOLOR2: &str = "#eeeeb0",
        TITLE: &str = "Flame Graph",
        IMAGE_WIDTH: usize = 1200,
        FRAME_HEIGHT: usize = 16,
        XPAD: usize = 10,
        MIN_WIDTH: f64 = 0.1,
        FONT_TYPE: &str = "Verdana",
        FONT_SIZE: usize = 12,
        FONT_WIDTH: f64 = 0.59,
        COUNT_NAME: &str = "samples",
        NAME_TYPE: &str = "Function:"
    }
}

/// Configure the flame graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Colour scheme tag; unknown tags fall back to `hot`.
    ///
    /// [Default value](defaults::COLORS).
    pub colors: String,

    /// The title of the graph.
    ///
    /// [Default value](defaults::TITLE).
    pub title: String,

    /// An optional second line under the title.
    pub subtitle: Option<String>,

    /// Free-form notes embedded in the output for provenance.
    pub notes: String,

    /// Total image width in pixels.
    ///
    /// [Default value](defaults::IMAGE_WIDTH).
    pub width: usize,

    /// Height of one frame row in pixels.
    ///
    /// [Default value](defaults::FRAME_HEIGHT).
    pub frame_height: usize,

    /// Horizontal padding on both sides of the canvas.
    ///
    /// [Default value](defaults::XPAD).
    pub xpad: usize,

    /// Font family for all text.
    ///
    /// [Default value](defaults::FONT_TYPE).
    pub font_type: String,

    /// Font size in pixels.
    ///
    /// [Default value](defaults::FONT_SIZE).
    pub font_size: usize,

    /// Average glyph width relative to the font size, in `(0, 1]`; the
    /// embedded script uses it to truncate labels.
    ///
    /// [Default value](defaults::FONT_WIDTH).
    pub font_width: f64,

    /// Top stop of the background gradient.
    ///
    /// [Default value](defaults::BGCOLOR1).
    pub bgcolor1: String,

    /// Bottom stop of the background gradient.
    ///
    /// [Default value](defaults::BGCOLOR2).
    pub bgcolor2: String,

    /// Highlight colour used by the embedded search.
    ///
    /// [Default value](defaults::SEARCH_COLOR).
    pub search_color: String,

    /// Label prefix shown in the details line, e.g. `Function:`.
    ///
    /// [Default value](defaults::NAME_TYPE).
    pub name_type: String,

    /// What one count represents, e.g. `samples`.
    ///
    /// [Default value](defaults::COUNT_NAME).
    pub count_name: String,

    /// Reverse each sample's frame order before folding.
    pub reverse: bool,

    /// Icicle orientation: root at the top, children growing downward.
    pub inverted: bool,

    /// Frames narrower than this many pixels are not emitted (their slot
    /// width is still consumed, so neighbours stay in place).
    ///
    /// [Default value](defaults::MIN_WIDTH).
    pub min_width: f64,

    /// Cap on stack depth, applied at folding time; 0 means unlimited.
    pub max_depth: usize,

    /// Prune subtrees whose share of their parent falls below this ratio;
    /// 0 disables pruning.
    pub min_heat_threshold: f64,

    /// Drop folded stacks seen fewer than this many times; 0 disables the
    /// filter.
    pub min_count: usize,

    /// Embed the interactive script (zoom, search, tooltips) in the SVG.
    pub interactive: bool,

    /// Also write the folded multiset next to the output as
    /// `<out>.collapse`.
    pub write_folded_file: bool,

    /// Worker threads for the parallel fold; 0 means all hardware threads.
    /// Only consulted for large perf-script inputs with the
    /// `multithreaded` feature enabled.
    pub nthreads: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            colors: defaults::COLORS.to_string(),
            title: defaults::TITLE.to_string(),
            subtitle: None,
            notes: String::new(),
            width: defaults::IMAGE_WIDTH,
            frame_height: defaults::FRAME_HEIGHT,
            xpad: defaults::XPAD,
            font_type: defaults::FONT_TYPE.to_string(),
            font_size: defaults::FONT_SIZE,
            font_width: defaults::FONT_WIDTH,
            bgcolor1: defaults::BGCOLOR1.to_string(),
            bgcolor2: defaults::BGCOLOR2.to_string(),
            search_color: defaults::SEARCH_COLOR.to_string(),
            name_type: defaults::NAME_TYPE.to_string(),
            count_name: defaults::COUNT_NAME.to_string(),
            reverse: false,
            inverted: false,
            min_width: defaults::MIN_WIDTH,
            max_depth: 0,
            min_heat_threshold: 0.0,
            min_count: 0,
            interactive: true,
            write_folded_file: false,
            nthreads: 0,
        }
    }
}

impl Options {
    /// Checks the dimensional constraints; everything else is unvalidated
    /// text.
    pub fn validate(&self) -> Result<()> {
        let reject = |what: &str| Err(Error::Config(what.to_string()));
        if self.width == 0 {
            return reject("width must be positive");
        }
        if self.frame_height == 0 {
            return reject("frame_height must be positive");
        }
        if self.font_size == 0 {
            return reject("font_size must be positive");
        }
        if !(self.font_width > 0.0 && self.font_width <= 1.0) {
            return reject("font_width must be in (0, 1]");
        }
        if !(self.min_width >= 0.0) {
            return reject("min_width must be non-negative");
        }
        if !(0.0..=1.0).contains(&self.min_heat_threshold) {
            return reject("min_heat_threshold must be in [0, 1]");
        }
        Ok(())
    }

    /// Top padding: three lines for the title block.
    pub(super) fn ypad_top(&self) -> usize {
        self.font_size * 3
    }

    /// Bottom padding: two lines for the detail/match labels.
    pub(super) fn ypad_bottom(&self) -> usize {
        self.font_size * 2 + 10
    }

    /// Extra padding when a subtitle is present.
    pub(super) fn ypad_subtitle(&self) -> usize {
        if self.subtitle.is_some() {
            self.font_size * 2
        } else {
            0
        }
    }
}

/// Output renderers, selected by the extension of the output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Renderer {
    Svg,
    Html,
}

impl Renderer {
    fn for_path(path: &Path) -> Result<Renderer> {
        let ext = path
            .extension()
            .and_then(OsStr::to_str)
            .unwrap_or_default()
            .to_ascii_lowercase();
        match ext.as_str() {
            "svg" => Ok(Renderer::Svg),
            "html" => Ok(Renderer::Html),
            _ => Err(Error::SuffixUnknown(ext)),
        }
    }
}

/// Runs the whole pipeline: map the input, detect its dialect, parse, fold,
/// build the tree, and render to `output` with the renderer selected by the
/// output extension (`.svg` or `.html`).
pub fn from_file(opt: &Options, input: &Path, output: &Path) -> Result<()> {
    opt.validate()?;
    let renderer = Renderer::for_path(output)?;

    let buffer = InputBuffer::open(input)?;
    let bytes = buffer.as_bytes();
    let dialect = Dialect::sniff(scan::Lines::new(bytes));
    debug!("detected {} input", dialect.tag());

    // Sample storage must outlive the folded multiset, which borrows the
    // frame sequences (which in turn borrow the mapped buffer).
    let mut samples;
    #[cfg(feature = "multithreaded")]
    let mut arenas: Vec<Vec<collapse::Sample<'_>>> = Vec::new();

    #[cfg(feature = "multithreaded")]
    let folded = {
        use collapse::parallel;
        let mut set = None;
        if dialect == Dialect::PerfScript {
            let workers = parallel::nworkers(opt.nthreads);
            let index = scan::LineIndex::new(bytes);
            if parallel::worthwhile(index.len(), workers) {
                info!(
                    "folding {} lines on {} worker threads",
                    index.len(),
                    workers
                );
                arenas.resize_with(workers, Vec::new);
                set = Some(parallel::fold_blocks(
                    &index,
                    &mut arenas,
                    opt.reverse,
                    opt.max_depth,
                )?);
            }
        }
        set
    };
    #[cfg(not(feature = "multithreaded"))]
    let folded: Option<collapse::CollapsedMultiset<'_>> = None;

    let mut folded = match folded {
        Some(set) => set,
        None => {
            samples = collapse::parse_buffer(bytes, dialect)?;
            if opt.reverse {
                for sample in &mut samples {
                    sample.frames.reverse();
                }
            }
            fold::fold(&samples, opt.max_depth)
        }
    };

    if folded.is_empty() {
        return Err(Error::ParseEmpty);
    }
    folded.retain_min(opt.min_count);
    if folded.is_empty() {
        return Err(Error::PipelineEmpty("folding"));
    }

    if opt.write_folded_file {
        let mut sidecar = output.as_os_str().to_owned();
        sidecar.push(".collapse");
        let file = File::create(Path::new(&sidecar))?;
        fold::write_folded(&folded, BufWriter::new(file))?;
        info!("wrote folded stacks to {:?}", sidecar);
    }

    let mut tree = FlameTree::from_multiset(&folded);
    if opt.min_heat_threshold > 0.0 {
        tree.prune(opt.min_heat_threshold);
    }
    if tree.root().total() == 0 {
        return Err(Error::PipelineEmpty("tree building"));
    }

    let out = BufWriter::new(File::create(output)?);
    match renderer {
        Renderer::Svg => svg::render(opt, &tree, out)?,
        Renderer::Html => html::render(opt, &tree, out)?,
    }
    Ok(())
}
