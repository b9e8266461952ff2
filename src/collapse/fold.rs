//! Folding samples into the collapsed multiset, plus the folded-format
//! sidecar writer.

use std::io::{self, Write};

use log::debug;

use super::{CollapsedMultiset, FrameKind, FramesKey, Sample};

/// Folds samples by whole-stack equality.
///
/// `max_depth` caps how many frames of each sample participate in the key;
/// stacks deeper than the cap fold into their `max_depth`-frame prefix.
/// 0 means unlimited.
pub fn fold<'s>(samples: &'s [Sample<'s>], max_depth: usize) -> CollapsedMultiset<'s> {
    let mut set = CollapsedMultiset::new();
    for sample in samples {
        if !sample.is_valid() {
            continue;
        }
        let frames = if max_depth > 0 && sample.frames.len() > max_depth {
            &sample.frames[..max_depth]
        } else {
            &sample.frames[..]
        };
        set.insert_or_add(FramesKey::new(frames), sample.count);
    }
    debug!(
        "folded {} samples into {} unique stacks",
        samples.len(),
        set.len()
    );
    set
}

/// Writes the multiset in the folded stack format: one
/// `frame1;frame2;…;frameN count` line per unique stack, sorted by key so
/// the output is reproducible, with Unix line endings on every platform.
///
/// Library frames that did not arrive pre-bracketed are wrapped in `[...]`.
pub fn write_folded<W: Write>(set: &CollapsedMultiset<'_>, mut writer: W) -> io::Result<()> {
    let mut entries: Vec<_> = set.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut count_buf = itoa::Buffer::new();
    for (key, count) in entries {
        for (i, frame) in key.frames().iter().enumerate() {
            if i != 0 {
                writer.write_all(b";")?;
            }
            match frame.kind() {
                FrameKind::Library if !frame.is_bracketed() => {
                    writer.write_all(b"[")?;
                    writer.write_all(frame.name().as_bytes())?;
                    writer.write_all(b"]")?;
                }
                _ => writer.write_all(frame.name().as_bytes())?,
            }
        }
        writer.write_all(b" ")?;
        writer.write_all(count_buf.format(count).as_bytes())?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
