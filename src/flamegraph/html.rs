//! The HTML renderer: a d3-flamegraph page around the tree as JSON.
//!
//! Only the JSON tree shape (`{"name", "value", "children"?}` with
//! `value` = inclusive count) is owned by this crate. The page pulls in
//! three static asset blobs (the d3 library, the d3-flamegraph script, and
//! its stylesheet) that are shipped verbatim next to the binary and read
//! at render time.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde_json::{json, Value};

use super::tree::{FlameTree, NodeId, ROOT};
use super::Options;
use crate::{Error, Result};

/// Renders the tree as a self-contained HTML document.
pub(super) fn render<W: Write>(opt: &Options, tree: &FlameTree<'_>, mut writer: W) -> Result<()> {
    let d3 = load_asset("d3.v7.min.js")?;
    let fg_script = load_asset("d3-flamegraph.min.js")?;
    let fg_css = load_asset("d3-flamegraph.css")?;
    let data = tree_json(tree, ROOT);

    write!(
        writer,
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>{title}</title>\n\
         <style>{fg_css}</style>\n\
         </head>\n\
         <body>\n\
         <h1 style=\"text-align:center;font-family:{font}\">{title}</h1>\n\
         <div id=\"chart\" style=\"margin:0 auto;width:{width}px\"></div>\n\
         <script>{d3}</script>\n\
         <script>{fg_script}</script>\n\
         <script>\n\
         var data = {data};\n\
         var chart = flamegraph().width({width}).cellHeight({cell}).inverted({inverted});\n\
         d3.select(\"#chart\").datum(data).call(chart);\n\
         </script>\n\
         </body>\n\
         </html>\n",
        title = html_escape(&opt.title),
        font = html_escape(&opt.font_type),
        width = opt.width,
        cell = opt.frame_height,
        inverted = opt.inverted,
        d3 = d3,
        fg_script = fg_script,
        fg_css = fg_css,
        data = data,
    )?;
    Ok(())
}

/// Serialises the subtree at `id` as `{"name", "value", "children"?}`.
///
/// Recursion depth equals the tree height, which is small even for very
/// wide profiles.
pub(super) fn tree_json(tree: &FlameTree<'_>, id: NodeId) -> Value {
    let node = tree.node(id);
    let mut value = json!({
        "name": node.name(),
        "value": node.total(),
    });
    let children: Vec<Value> = node.children().map(|c| tree_json(tree, c)).collect();
    if !children.is_empty() {
        value["children"] = Value::Array(children);
    }
    value
}

// The blobs live in an `assets/` directory resolved against the executable
// first, the working directory second.
fn load_asset(name: &str) -> Result<String> {
    let mut roots: Vec<PathBuf> = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            roots.push(dir.join("assets"));
        }
    }
    roots.push(PathBuf::from("assets"));

    for root in &roots {
        let path = root.join(name);
        if path.is_file() {
            return Ok(fs::read_to_string(&path)?);
        }
    }
    Err(Error::Render(format!(
        "missing static asset {:?}; expected under {}",
        name,
        roots
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(" or ")
    )))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
