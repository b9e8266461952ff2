//! Colour schemes for flame graph frames.
//!
//! A scheme maps `(frame name, heat ratio)` to an RGB colour, where heat is
//! the frame's depth divided by the tree depth, so deeper frames draw
//! hotter.
//! Schemes are resolved from their string tag; unknown tags fall back to
//! the default `hot` scheme. The renderer itself overrides the scheme for
//! the root (fixed near-white) and for the `--`/`-` separator frames
//! (neutral greys), so schemes never see those.

use log::warn;
use rgb::RGB8;

/// A re-export of `RGB8` from the [`rgb` crate](https://docs.rs/rgb).
pub type Color = RGB8;

/// Fill for the synthetic root frame.
pub(super) const ROOT_FILL: Color = Color {
    r: 250,
    g: 250,
    b: 250,
};

/// Override for the `--` separator frame.
pub(super) const VDGREY: Color = Color {
    r: 160,
    g: 160,
    b: 160,
};

/// Override for the `-` separator frame.
pub(super) const DGREY: Color = Color {
    r: 200,
    g: 200,
    b: 200,
};

/// A colour scheme plug-in.
///
/// Implementations must be pure: the same `(name, heat)` pair always maps
/// to the same colour, so frames of one function match across the graph.
pub trait ColorScheme: Sync {
    /// The scheme's registry tag.
    fn tag(&self) -> &'static str;

    /// The colour for a frame with the given name at the given heat,
    /// `heat ∈ [0, 1]`.
    fn color(&self, name: &str, heat: f32) -> Color;
}

/// Resolves a scheme tag; unknown tags fall back to `hot`.
pub fn resolve(tag: &str) -> &'static dyn ColorScheme {
    match tag {
        "hot" => &Hot,
        "mem" => &Mem,
        "io" => &Io,
        unknown => {
            warn!("unknown color scheme {:?}, using hot", unknown);
            &Hot
        }
    }
}

// Weighted vector hash over the first few name bytes, in (0, 1]. Early
// characters dominate so frames of one function family land near each other
// while distinct names still spread across the palette.
fn namehash<I: Iterator<Item = u8>>(bytes: I) -> f32 {
    let mut vector = 0.0_f32;
    let mut weight = 1.0_f32;
    let mut max = 1.0_f32;
    let mut modulo = 10u8;
    for byte in bytes.take(6) {
        let i = f32::from(byte % modulo);
        vector += (i / f32::from(modulo - 1)) * weight;
        modulo += 1;
        max += weight;
        weight *= 0.70;
    }
    1.0 - vector / max
}

macro_rules! t {
    ($b:expr, $a:expr, $x:expr) => {
        $b + ($a as f32 * $x) as u8
    };
}

macro_rules! color {
    ($r:expr, $g:expr, $b:expr) => {
        Color {
            r: $r,
            g: $g,
            b: $b,
        }
    };
}

/// The default warm palette: reds through oranges into yellows, with heat
/// pulling towards saturated red.
pub struct Hot;

impl ColorScheme for Hot {
    fn tag(&self) -> &'static str {
        "hot"
    }

    fn color(&self, name: &str, heat: f32) -> Color {
        let heat = heat.clamp(0.0, 1.0);
        let v1 = namehash(name.bytes());
        let v2 = namehash(name.bytes().rev());
        color!(
            t!(205, 50, v2),
            t!(0, 205, v1 * (1.0 - 0.85 * heat)),
            t!(0, 55, v1 * v2 * (1.0 - heat))
        )
    }
}

/// Green spectrum, traditionally used for memory profiles.
pub struct Mem;

impl ColorScheme for Mem {
    fn tag(&self) -> &'static str {
        "mem"
    }

    fn color(&self, name: &str, heat: f32) -> Color {
        let heat = heat.clamp(0.0, 1.0);
        let v1 = namehash(name.bytes());
        let v2 = namehash(name.bytes().rev());
        color!(
            t!(0, 0, v2),
            t!(190, 50, v2),
            t!(0, 210, v1 * (1.0 - 0.6 * heat))
        )
    }
}

/// Blue spectrum, traditionally used for I/O profiles.
pub struct Io;

impl ColorScheme for Io {
    fn tag(&self) -> &'static str {
        "io"
    }

    fn color(&self, name: &str, heat: f32) -> Color {
        let heat = heat.clamp(0.0, 1.0);
        let v1 = namehash(name.bytes());
        let v2 = namehash(name.bytes().rev());
        color!(
            t!(80, 60, v1 * (1.0 - 0.5 * heat)),
            t!(80, 60, v1 * (1.0 - 0.5 * heat)),
            t!(190, 55, v2)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_are_deterministic() {
        let scheme = resolve("hot");
        assert_eq!(scheme.color("alpha", 0.4), scheme.color("alpha", 0.4));
    }

    #[test]
    fn hot_is_warm() {
        let scheme = resolve("hot");
        for name in ["main", "do_work", "std::vec::Vec<T>::push"] {
            for heat in [0.0, 0.5, 1.0] {
                let c = scheme.color(name, heat);
                assert!(c.r >= 205, "{:?} at {} lost its red", name, heat);
                assert!(c.r >= c.g && c.g >= c.b, "{:?} at {} is not warm", name, heat);
            }
        }
    }

    #[test]
    fn heat_pulls_hot_toward_red() {
        let scheme = resolve("hot");
        let shallow = scheme.color("work", 0.0);
        let deep = scheme.color("work", 1.0);
        assert!(deep.g <= shallow.g);
        assert!(deep.b <= shallow.b);
    }

    #[test]
    fn distinct_names_usually_differ() {
        let scheme = resolve("hot");
        assert_ne!(scheme.color("alpha", 0.5), scheme.color("omega", 0.5));
    }

    #[test]
    fn unknown_tag_falls_back_to_hot() {
        let fallback = resolve("no-such-scheme");
        assert_eq!(fallback.tag(), "hot");
        assert_eq!(
            fallback.color("main", 0.3),
            resolve("hot").color("main", 0.3)
        );
    }

    #[test]
    fn registry_tags_round_trip() {
        for tag in ["hot", "mem", "io"] {
            assert_eq!(resolve(tag).tag(), tag);
        }
    }

    #[test]
    fn namehash_stays_in_range() {
        for name in ["", "a", "some::very::long::symbol::name"] {
            let h = namehash(name.bytes());
            assert!((0.0..=1.0).contains(&h), "{} hashed to {}", name, h);
        }
    }
}
