//! End-to-end pipeline tests: from input file to rendered output.

use std::fs;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use flamecrafter::flamegraph::{self, Options};
use flamecrafter::Error;

struct Scratch {
    dir: TempDir,
}

impl Scratch {
    fn new() -> Self {
        Scratch {
            dir: TempDir::new().unwrap(),
        }
    }

    fn input(&self, contents: &str) -> PathBuf {
        let path = self.dir.path().join("input.txt");
        fs::write(&path, contents).unwrap();
        path
    }

    fn out(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn render_svg(input: &str, opt: &Options) -> String {
    let scratch = Scratch::new();
    let output = scratch.out("profile.svg");
    flamegraph::from_file(opt, &scratch.input(input), &output).unwrap();
    fs::read_to_string(output).unwrap()
}

#[test]
fn generic_single_sample() {
    let svg = render_svg("main\nworker\ncompute\n", &Options::default());
    // root plus three frames
    assert_eq!(svg.matches("<g class=\"func_g\">").count(), 4);
    assert!(svg.contains(">Flame Graph</text>"));
    assert!(svg.contains("all (1 samples, 100.00%)"));
    assert!(svg.contains("compute (1 samples, 100.00%)"));
}

#[test]
fn generic_folded_counts_reach_the_sidecar() {
    let scratch = Scratch::new();
    let input = scratch.input("a\nb\n\na\nb\n\na\nc\n");
    let output = scratch.out("profile.svg");
    let mut opt = Options::default();
    opt.write_folded_file = true;

    flamegraph::from_file(&opt, &input, &output).unwrap();

    let sidecar = fs::read_to_string(scratch.out("profile.svg.collapse")).unwrap();
    assert_eq!(sidecar, "a;b 2\na;c 1\n");

    let svg = fs::read_to_string(output).unwrap();
    assert!(svg.contains("a (3 samples, 100.00%)"));
    assert!(svg.contains("b (2 samples, 66.67%)"));
    assert!(svg.contains("c (1 samples, 33.33%)"));
}

#[test]
fn perf_script_input_end_to_end() {
    let input = "\
prog 123 1.000000: 250000 cpu-clock:
    deadbeef foo+0x10 (/usr/bin/prog)
    cafebabe main+0x20 (/usr/bin/prog)

";
    let svg = render_svg(input, &Options::default());
    // root, main, foo
    assert_eq!(svg.matches("<g class=\"func_g\">").count(), 3);
    assert!(svg.contains("main (1 samples, 100.00%)"));
    assert!(svg.contains("foo (1 samples, 100.00%)"));
}

#[test]
fn library_fallback_is_bracketed_in_sidecar() {
    let scratch = Scratch::new();
    let input = scratch.input(
        "prog 1 1.0: cycles:\n    11111 [unknown] (/lib/libc.so.6)\n    22222 main (/usr/bin/prog)\n\n",
    );
    let output = scratch.out("out.svg");
    let mut opt = Options::default();
    opt.write_folded_file = true;

    flamegraph::from_file(&opt, &input, &output).unwrap();
    let sidecar = fs::read_to_string(scratch.out("out.svg.collapse")).unwrap();
    assert_eq!(sidecar, "main;[libc.so.6] 1\n");
}

#[test]
fn reverse_flips_stack_order_before_folding() {
    let scratch = Scratch::new();
    let input = scratch.input("a\nb\nc\n");
    let output = scratch.out("out.svg");
    let mut opt = Options::default();
    opt.reverse = true;
    opt.write_folded_file = true;

    flamegraph::from_file(&opt, &input, &output).unwrap();
    let sidecar = fs::read_to_string(scratch.out("out.svg.collapse")).unwrap();
    assert_eq!(sidecar, "c;b;a 1\n");
}

#[test]
fn max_depth_truncates_at_fold_time() {
    let scratch = Scratch::new();
    let input = scratch.input("a\nb\nc\nd\n\na\nb\nx\n");
    let output = scratch.out("out.svg");
    let mut opt = Options::default();
    opt.max_depth = 2;
    opt.write_folded_file = true;

    flamegraph::from_file(&opt, &input, &output).unwrap();
    let sidecar = fs::read_to_string(scratch.out("out.svg.collapse")).unwrap();
    assert_eq!(sidecar, "a;b 2\n");
}

#[test]
fn pruned_subtree_is_absent_from_svg() {
    let mut input = String::new();
    for _ in 0..199 {
        input.push_str("hot\nwork\n\n");
    }
    input.push_str("hot\ncold\n\n");

    let mut opt = Options::default();
    opt.min_heat_threshold = 0.01;
    let svg = render_svg(&input, &opt);
    assert!(svg.contains("work (199 samples"));
    assert!(!svg.contains("cold"));
}

#[test]
fn empty_input_is_parse_empty() {
    let scratch = Scratch::new();
    let input = scratch.input("");
    let err = flamegraph::from_file(&Options::default(), &input, &scratch.out("out.svg"))
        .unwrap_err();
    assert!(matches!(err, Error::ParseEmpty));
}

#[test]
fn comment_only_input_is_parse_empty() {
    let scratch = Scratch::new();
    let input = scratch.input("# nothing\n\n# to see\n\n");
    let err = flamegraph::from_file(&Options::default(), &input, &scratch.out("out.svg"))
        .unwrap_err();
    assert!(matches!(err, Error::ParseEmpty));
}

#[test]
fn missing_input_is_file_not_found() {
    let scratch = Scratch::new();
    let err = flamegraph::from_file(
        &Options::default(),
        &scratch.out("nope.perf"),
        &scratch.out("out.svg"),
    )
    .unwrap_err();
    assert!(matches!(err, Error::FileNotFound(_)));
}

#[test]
fn unknown_suffix_is_rejected_before_reading_input() {
    let scratch = Scratch::new();
    let err = flamegraph::from_file(
        &Options::default(),
        &scratch.out("nope.perf"),
        &scratch.out("out.png"),
    )
    .unwrap_err();
    assert!(matches!(err, Error::SuffixUnknown(ext) if ext == "png"));
}

#[test]
fn invalid_config_is_rejected() {
    let scratch = Scratch::new();
    let input = scratch.input("main\n");
    let mut opt = Options::default();
    opt.font_width = 2.0;
    let err = flamegraph::from_file(&opt, &input, &scratch.out("out.svg")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn min_count_filter_can_empty_the_pipeline() {
    let scratch = Scratch::new();
    let input = scratch.input("a\nb\n");
    let mut opt = Options::default();
    opt.min_count = 10;
    let err = flamegraph::from_file(&opt, &input, &scratch.out("out.svg")).unwrap_err();
    assert!(matches!(err, Error::PipelineEmpty(_)));
}

#[test]
fn html_renderer_requires_the_static_assets() {
    // the d3 blobs are shipped alongside release binaries, not the repo, so
    // rendering here must fail cleanly rather than emit a broken page
    let scratch = Scratch::new();
    let input = scratch.input("main\n");
    let err =
        flamegraph::from_file(&Options::default(), &input, &scratch.out("out.html")).unwrap_err();
    assert!(matches!(err, Error::Render(msg) if msg.contains("asset")));
}
