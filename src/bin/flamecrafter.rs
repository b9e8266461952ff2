use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;

use flamecrafter::flamegraph::{self, defaults, Options};

#[derive(Debug, Parser)]
#[command(name = "flamecrafter", about = "Turn stack-trace profiles into flame graphs")]
struct Opt {
    /// Profile to read: `perf script` output or one-frame-per-line stacks.
    input: PathBuf,

    /// Where to write the graph; the extension picks the renderer
    /// (.svg or .html).
    output: PathBuf,

    /// Title of the graph.
    #[arg(long, default_value = defaults::TITLE)]
    title: String,

    /// Second line under the title.
    #[arg(long)]
    subtitle: Option<String>,

    /// Free-form notes embedded in the output.
    #[arg(long, default_value = "")]
    notes: String,

    /// Color scheme (hot, mem, io).
    #[arg(short, long, default_value = defaults::COLORS)]
    colors: String,

    /// Image width in pixels.
    #[arg(long, default_value_t = defaults::IMAGE_WIDTH)]
    width: usize,

    /// Height of each frame row in pixels.
    #[arg(long, default_value_t = defaults::FRAME_HEIGHT)]
    height: usize,

    /// Omit frames narrower than this many pixels.
    #[arg(long, default_value_t = defaults::MIN_WIDTH)]
    min_width: f64,

    /// Cap stack depth at folding time; 0 means unlimited.
    #[arg(long, default_value_t = 0)]
    max_depth: usize,

    /// Prune subtrees below this share of their parent; 0 disables.
    #[arg(long, default_value_t = 0.0)]
    prune: f64,

    /// Drop stacks seen fewer than this many times; 0 disables.
    #[arg(long, default_value_t = 0)]
    min_count: usize,

    /// Reverse each sample's frame order before folding.
    #[arg(long)]
    reverse: bool,

    /// Icicle layout: root at the top, stacks growing downward.
    #[arg(short, long)]
    inverted: bool,

    /// Skip the embedded interactive script.
    #[arg(long)]
    no_interactive: bool,

    /// Also write the folded stacks next to the output as <out>.collapse.
    #[arg(long)]
    write_folded: bool,

    /// Worker threads for large perf inputs; 0 means all cores.
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Silence all log output.
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging mode (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl From<&Opt> for Options {
    fn from(opt: &Opt) -> Options {
        let mut options = Options::default();
        options.title = opt.title.clone();
        options.subtitle = opt.subtitle.clone();
        options.notes = opt.notes.clone();
        options.colors = opt.colors.clone();
        options.width = opt.width;
        options.frame_height = opt.height;
        options.min_width = opt.min_width;
        options.max_depth = opt.max_depth;
        options.min_heat_threshold = opt.prune;
        options.min_count = opt.min_count;
        options.reverse = opt.reverse;
        options.inverted = opt.inverted;
        options.interactive = !opt.no_interactive;
        options.write_folded_file = opt.write_folded;
        options.nthreads = opt.threads;
        if opt.inverted && opt.title == defaults::TITLE {
            options.title = "Icicle Graph".to_string();
        }
        options
    }
}

fn main() -> ExitCode {
    let opt = Opt::parse();

    if !opt.quiet {
        env_logger::Builder::from_env(Env::default().default_filter_or(match opt.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }))
        .init();
    }

    let options = Options::from(&opt);
    match flamegraph::from_file(&options, &opt.input, &opt.output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
