//! Geometric layout and streaming SVG emission.
//!
//! Widths are proportional to each node's inclusive count; children are
//! placed left-to-right in tree order, and a child narrower than
//! `min_width` pixels is skipped without giving up its slot, so its
//! neighbours stay put. The document embeds the interactive script and the
//! `fontsize`/`fontwidth`/`xpad`/`inverted`/`searchcolor`/`nametype`
//! globals it reads; labels are left as empty `<text>` placeholders that
//! the script fills (and truncates) at load time.

use std::io::Write;

use log::debug;
use num_format::{Buffer as NumBuffer, Locale};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use str_stack::StrStack;

use super::color::{self, Color, ColorScheme};
use super::tree::{FlameNode, FlameTree, NodeId, ROOT};
use super::Options;
use crate::Result;

// Vertical gap between frame rows.
const FRAME_PAD: usize = 1;

// Reserved for future flamecrafter-specific attributes.
const FG_NAMESPACE: &str = "http://github.com/flamecrafter/flamecrafter";

/// Streams the tree as an SVG document.
pub(super) fn render<W: Write>(opt: &Options, tree: &FlameTree<'_>, writer: W) -> Result<()> {
    let depth = tree.depth();
    let total = tree.root().total();
    let imageheight =
        (depth + 1) * opt.frame_height + opt.ypad_top() + opt.ypad_bottom() + opt.ypad_subtitle();
    let width_per_sample = opt.width.saturating_sub(2 * opt.xpad) as f64 / total as f64;
    debug!(
        "rendering {} sample(s) over {} level(s), {}x{}",
        total,
        depth,
        opt.width,
        imageheight
    );

    let mut svg = Writer::new(writer);
    write_header(&mut svg, opt, imageheight)?;
    write_prelude(&mut svg, opt, imageheight)?;
    write_frames(&mut svg, opt, tree, imageheight, width_per_sample)?;
    svg.write_event(Event::End(BytesEnd::new("svg")))?;
    svg.write_event(Event::Eof)?;
    Ok(())
}

fn write_header<W: Write>(svg: &mut Writer<W>, opt: &Options, imageheight: usize) -> Result<()> {
    svg.write_event(Event::Decl(BytesDecl::new("1.0", None, Some("no"))))?;
    svg.write_event(Event::DocType(BytesText::from_escaped(
        r#"svg PUBLIC "-//W3C//DTD SVG 1.1//EN" "http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd""#,
    )))?;

    let width = opt.width.to_string();
    let height = imageheight.to_string();
    let viewbox = format!("0 0 {} {}", opt.width, imageheight);
    let mut start = BytesStart::new("svg").with_attributes([
        ("version", "1.1"),
        ("width", width.as_str()),
        ("height", height.as_str()),
        ("viewBox", viewbox.as_str()),
        ("xmlns", "http://www.w3.org/2000/svg"),
        ("xmlns:xlink", "http://www.w3.org/1999/xlink"),
        ("xmlns:fg", FG_NAMESPACE),
    ]);
    if opt.interactive {
        start.push_attribute(("onload", "init(evt)"));
    }
    svg.write_event(Event::Start(start))?;
    svg.write_event(Event::Comment(BytesText::new(
        "Flame graph stack visualization. Hover over a frame for details; \
         click to zoom when the interactive script is embedded.",
    )))?;
    if !opt.notes.is_empty() {
        svg.write_event(Event::Comment(BytesText::new(&opt.notes)))?;
    }
    Ok(())
}

fn write_prelude<W: Write>(svg: &mut Writer<W>, opt: &Options, imageheight: usize) -> Result<()> {
    svg.write_event(Event::Start(BytesStart::new("defs")))?;
    svg.write_event(Event::Start(BytesStart::new("linearGradient").with_attributes([
        ("id", "background"),
        ("y1", "0"),
        ("y2", "1"),
        ("x1", "0"),
        ("x2", "0"),
    ])))?;
    svg.write_event(Event::Empty(BytesStart::new("stop").with_attributes([
        ("stop-color", opt.bgcolor1.as_str()),
        ("offset", "5%"),
    ])))?;
    svg.write_event(Event::Empty(BytesStart::new("stop").with_attributes([
        ("stop-color", opt.bgcolor2.as_str()),
        ("offset", "95%"),
    ])))?;
    svg.write_event(Event::End(BytesEnd::new("linearGradient")))?;
    svg.write_event(Event::End(BytesEnd::new("defs")))?;

    svg.write_event(Event::Start(
        BytesStart::new("style").with_attributes([("type", "text/css")]),
    ))?;
    let css = format!(
        "text {{ font-family:{}; font-size:{}px; fill:rgb(0,0,0); }}\n\
         #title {{ text-anchor:middle; font-size:{}px; }}\n\
         #subtitle {{ text-anchor:middle; fill:rgb(160,160,160); }}\n\
         #unzoom {{ cursor:pointer; opacity:0.0; }}\n\
         #search, #ignorecase {{ opacity:0.1; cursor:pointer; }}\n\
         #search:hover, #search.show, #ignorecase:hover, #ignorecase.show {{ opacity:1; }}\n\
         .func_g:hover {{ stroke:black; stroke-width:0.5; cursor:pointer; }}",
        opt.font_type,
        opt.font_size,
        opt.font_size + 5
    );
    svg.write_event(Event::Text(BytesText::new(&css)))?;
    svg.write_event(Event::End(BytesEnd::new("style")))?;

    if opt.interactive {
        svg.write_event(Event::Start(
            BytesStart::new("script").with_attributes([("type", "text/ecmascript")]),
        ))?;
        let globals = format!(
            "\nvar nametype = '{}';\n\
             var fontsize = {};\n\
             var fontwidth = {};\n\
             var xpad = {};\n\
             var inverted = {};\n\
             var searchcolor = '{}';\n",
            js_quote(&opt.name_type),
            opt.font_size,
            opt.font_width,
            opt.xpad,
            opt.inverted,
            js_quote(&opt.search_color),
        );
        svg.write_event(Event::CData(BytesCData::new(globals)))?;
        svg.write_event(Event::CData(BytesCData::new(include_str!("interactive.js"))))?;
        svg.write_event(Event::End(BytesEnd::new("script")))?;
    }

    let width = opt.width.to_string();
    let height = imageheight.to_string();
    svg.write_event(Event::Empty(BytesStart::new("rect").with_attributes([
        ("x", "0"),
        ("y", "0"),
        ("width", width.as_str()),
        ("height", height.as_str()),
        ("fill", "url(#background)"),
    ])))?;

    let mut buffer = StrStack::new();
    let right = (opt.width.saturating_sub(opt.xpad + 100)) as f64;
    let lower = (imageheight - opt.ypad_bottom() / 2) as f64;

    write_label(
        svg,
        &mut buffer,
        (opt.width / 2) as f64,
        (opt.font_size * 2) as f64,
        &opt.title,
        &[("id", "title")],
    )?;
    if let Some(subtitle) = &opt.subtitle {
        write_label(
            svg,
            &mut buffer,
            (opt.width / 2) as f64,
            (opt.font_size * 4) as f64,
            subtitle,
            &[("id", "subtitle")],
        )?;
    }
    write_label(
        svg,
        &mut buffer,
        opt.xpad as f64,
        lower,
        " ",
        &[("id", "details")],
    )?;
    write_label(
        svg,
        &mut buffer,
        opt.xpad as f64,
        (opt.font_size * 2) as f64,
        "Reset Zoom",
        &[("id", "unzoom")],
    )?;
    write_label(
        svg,
        &mut buffer,
        right,
        (opt.font_size * 2) as f64,
        "Search",
        &[("id", "search")],
    )?;
    write_label(
        svg,
        &mut buffer,
        (opt.width.saturating_sub(opt.xpad + 16)) as f64,
        (opt.font_size * 2) as f64,
        "ic",
        &[("id", "ignorecase")],
    )?;
    write_label(svg, &mut buffer, right, lower, " ", &[("id", "matched")])?;

    Ok(())
}

fn write_frames<W: Write>(
    svg: &mut Writer<W>,
    opt: &Options,
    tree: &FlameTree<'_>,
    imageheight: usize,
    width_per_sample: f64,
) -> Result<()> {
    svg.write_event(Event::Start(
        BytesStart::new("g").with_attributes([("id", "frames")]),
    ))?;

    let scheme = color::resolve(&opt.colors);
    let depth_max = tree.depth().max(1);
    let total = tree.root().total();
    let mut buffer = StrStack::new();
    let mut count_buf = NumBuffer::default();

    // explicit DFS; (node, depth, left edge)
    let mut stack: Vec<(NodeId, usize, f64)> = vec![(ROOT, 0, opt.xpad as f64)];
    while let Some((id, depth, x)) = stack.pop() {
        let node = tree.node(id);
        let w = node.total() as f64 * width_per_sample;
        let y = if opt.inverted {
            (opt.ypad_top() + opt.ypad_subtitle() + depth * opt.frame_height) as f64
        } else {
            (imageheight - opt.ypad_bottom() - (depth + 1) * opt.frame_height) as f64
        };
        emit_node(
            svg, opt, &mut buffer, &mut count_buf, node, depth, depth_max, total, x, y, w, scheme,
        )?;

        // every child consumes its slot on the x-axis, drawn or not
        let mut slots = Vec::with_capacity(node.child_count());
        let mut cx = x;
        for child in node.children() {
            let cw = tree.node(child).total() as f64 * width_per_sample;
            if cw >= opt.min_width {
                slots.push((child, depth + 1, cx));
            }
            cx += cw;
        }
        for slot in slots.into_iter().rev() {
            stack.push(slot);
        }
    }

    svg.write_event(Event::End(BytesEnd::new("g")))?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_node<W: Write>(
    svg: &mut Writer<W>,
    opt: &Options,
    buffer: &mut StrStack,
    count_buf: &mut NumBuffer,
    node: &FlameNode<'_>,
    depth: usize,
    depth_max: usize,
    total: usize,
    x: f64,
    y: f64,
    w: f64,
    scheme: &dyn ColorScheme,
) -> Result<()> {
    buffer.clear();

    let _ = count_buf.write_formatted(&node.total(), &Locale::en);
    let pct = 100.0 * node.total() as f64 / total as f64;
    let tooltip = write!(
        buffer,
        "{} ({} {}, {:.2}%)",
        node.name(),
        count_buf.as_str(),
        opt.count_name,
        pct
    );

    let rect_h = if opt.frame_height > FRAME_PAD {
        opt.frame_height - FRAME_PAD
    } else {
        opt.frame_height
    };
    let color = node_color(node, depth, depth_max, scheme);

    let x_s = write!(buffer, "{:.2}", x);
    let y_s = write!(buffer, "{:.2}", y);
    let w_s = write!(buffer, "{:.2}", w);
    let h_s = write_usize(buffer, rect_h);
    let fill = write!(buffer, "rgb({},{},{})", color.r, color.g, color.b);
    let tx = write!(buffer, "{:.2}", x + 3.0);
    let ty = write!(buffer, "{:.2}", y + rect_h as f64 / 2.0 + 3.0);

    svg.write_event(Event::Start(
        BytesStart::new("g").with_attributes([("class", "func_g")]),
    ))?;
    svg.write_event(Event::Start(BytesStart::new("title")))?;
    svg.write_event(Event::Text(BytesText::new(&buffer[tooltip])))?;
    svg.write_event(Event::End(BytesEnd::new("title")))?;
    svg.write_event(Event::Empty(BytesStart::new("rect").with_attributes([
        ("x", &buffer[x_s]),
        ("y", &buffer[y_s]),
        ("width", &buffer[w_s]),
        ("height", &buffer[h_s]),
        ("rx", "2"),
        ("ry", "2"),
        ("fill", &buffer[fill]),
    ])))?;
    // empty placeholder; the embedded script fills truncated labels
    svg.write_event(Event::Empty(BytesStart::new("text").with_attributes([
        ("x", &buffer[tx]),
        ("y", &buffer[ty]),
    ])))?;
    svg.write_event(Event::End(BytesEnd::new("g")))?;
    Ok(())
}

fn node_color(
    node: &FlameNode<'_>,
    depth: usize,
    depth_max: usize,
    scheme: &dyn ColorScheme,
) -> Color {
    if node.frame().is_none() {
        return color::ROOT_FILL;
    }
    match node.name() {
        "--" => color::VDGREY,
        "-" => color::DGREY,
        name => scheme.color(name, depth as f32 / depth_max as f32),
    }
}

fn write_label<W: Write>(
    svg: &mut Writer<W>,
    buffer: &mut StrStack,
    x: f64,
    y: f64,
    text: &str,
    attrs: &[(&str, &str)],
) -> Result<()> {
    buffer.clear();
    let x = write!(buffer, "{:.2}", x);
    let y = write!(buffer, "{:.2}", y);
    let mut start = BytesStart::new("text");
    start.push_attribute(("x", &buffer[x]));
    start.push_attribute(("y", &buffer[y]));
    for (key, value) in attrs {
        start.push_attribute((*key, *value));
    }
    svg.write_event(Event::Start(start))?;
    svg.write_event(Event::Text(BytesText::new(text)))?;
    svg.write_event(Event::End(BytesEnd::new("text")))?;
    Ok(())
}

fn write_usize(buffer: &mut StrStack, value: usize) -> usize {
    let mut digits = itoa::Buffer::new();
    buffer.push(digits.format(value))
}

fn js_quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collapse::{fold, generic, scan::Lines};

    fn render_string(opt: &Options, input: &[u8]) -> String {
        let samples = generic::parse_lines(Lines::new(input));
        let set = fold::fold(&samples, 0);
        let tree = FlameTree::from_multiset(&set);
        let mut out = Vec::new();
        render(opt, &tree, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn count_occurrences(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn single_sample_emits_root_plus_frames() {
        let svg = render_string(&Options::default(), b"main\nworker\ncompute\n");
        assert_eq!(count_occurrences(&svg, "<g class=\"func_g\">"), 4);
        assert!(svg.contains(">Flame Graph</text>"));
        assert!(svg.contains("all (1 samples, 100.00%)"));
        assert!(svg.contains("main (1 samples, 100.00%)"));
    }

    #[test]
    fn required_element_ids_are_present() {
        let svg = render_string(&Options::default(), b"main\n");
        for id in [
            "id=\"background\"",
            "id=\"frames\"",
            "id=\"title\"",
            "id=\"details\"",
            "id=\"unzoom\"",
            "id=\"search\"",
            "id=\"ignorecase\"",
            "id=\"matched\"",
        ] {
            assert!(svg.contains(id), "missing {}", id);
        }
        assert!(svg.contains("xmlns:fg="));
    }

    #[test]
    fn script_globals_follow_interactive_flag() {
        let on = render_string(&Options::default(), b"main\n");
        for global in [
            "var nametype = 'Function:';",
            "var fontsize = 12;",
            "var fontwidth = 0.59;",
            "var xpad = 10;",
            "var inverted = false;",
            "var searchcolor = '#e600e6';",
        ] {
            assert!(on.contains(global), "missing {}", global);
        }
        assert!(on.contains("onload=\"init(evt)\""));

        let mut opt = Options::default();
        opt.interactive = false;
        let off = render_string(&opt, b"main\n");
        assert!(!off.contains("var fontsize"));
        assert!(!off.contains("onload"));
        assert!(!off.contains("<script"));
    }

    #[test]
    fn icicle_orientation_places_root_below_top_pad() {
        let mut opt = Options::default();
        opt.inverted = true;
        let svg = render_string(&opt, b"a\nb\n");
        // pad_top = 3 * 12 = 36; rows descend by frame_height = 16
        assert!(svg.contains("y=\"36.00\""));
        assert!(svg.contains("y=\"52.00\""));
        assert!(svg.contains("var inverted = true;"));
    }

    #[test]
    fn flame_orientation_places_root_near_bottom() {
        let svg = render_string(&Options::default(), b"a\nb\n");
        // imageheight = 3*16 + 36 + 34 = 118; root at 118 - 34 - 16 = 68
        assert!(svg.contains("y=\"68.00\""));
        assert!(svg.contains("y=\"52.00\""));
        assert!(svg.contains("y=\"36.00\""));
    }

    #[test]
    fn subtitle_shifts_icicle_rows_and_is_emitted() {
        let mut opt = Options::default();
        opt.inverted = true;
        opt.subtitle = Some("second run".to_string());
        let svg = render_string(&opt, b"a\n");
        assert!(svg.contains("id=\"subtitle\""));
        assert!(svg.contains(">second run</text>"));
        // root row moves down by ypad_subtitle = 24
        assert!(svg.contains("y=\"60.00\""));
    }

    #[test]
    fn narrow_children_are_skipped_but_keep_their_slot() {
        let mut opt = Options::default();
        opt.width = 720;
        opt.min_width = 150.0;
        // 7 samples (a: 3, b: 1, c: 3) over 700px is 100px per sample
        let input = b"a\n\na\n\na\n\nb\n\nc\n\nc\n\nc\n";
        let svg = render_string(&opt, input);
        assert!(svg.contains("a (3 samples"));
        assert!(!svg.contains("b (1 samples"));
        // c still starts after b's consumed slot: 10 + 300 + 100
        assert!(svg.contains("c (3 samples"));
        assert!(svg.contains("x=\"410.00\""));
    }

    #[test]
    fn min_width_zero_emits_every_node() {
        let mut opt = Options::default();
        opt.min_width = 0.0;
        opt.width = 40;
        let svg = render_string(&opt, b"a\nb\n\nc\n");
        assert_eq!(count_occurrences(&svg, "<g class=\"func_g\">"), 4);
    }

    #[test]
    fn frame_names_are_xml_escaped_round_trip() {
        let name = "vec<u8>::push & \"friends\"";
        let input = format!("{}\n", name);
        let svg = render_string(&Options::default(), input.as_bytes());
        assert!(svg.contains("vec&lt;u8&gt;::push &amp;"));
        assert!(!svg.contains("<u8>::push"));

        // un-escaping the tooltip text yields the original name
        let start = svg.find("<title>vec").unwrap() + "<title>".len();
        let end = svg[start..].find("</title>").unwrap() + start;
        let unescaped = quick_xml::escape::unescape(&svg[start..end]).unwrap();
        assert!(unescaped.starts_with(name));
    }

    #[test]
    fn node_groups_contain_title_rect_text_in_order() {
        let svg = render_string(&Options::default(), b"only\n");
        let group = {
            let start = svg.find("<g class=\"func_g\">").unwrap();
            let end = svg[start..].find("</g>").unwrap() + start;
            &svg[start..end]
        };
        let title_at = group.find("<title>").unwrap();
        let rect_at = group.find("<rect ").unwrap();
        let text_at = group.find("<text ").unwrap();
        assert!(title_at < rect_at && rect_at < text_at);
        assert!(group.contains("rx=\"2\""));
    }

    #[test]
    fn root_uses_fixed_near_white_fill() {
        let svg = render_string(&Options::default(), b"main\n");
        assert!(svg.contains("fill=\"rgb(250,250,250)\""));
    }

    #[test]
    fn separator_frames_get_grey_overrides() {
        let svg = render_string(&Options::default(), b"--\n-\n");
        assert!(svg.contains("fill=\"rgb(160,160,160)\""));
        assert!(svg.contains("fill=\"rgb(200,200,200)\""));
    }
}
