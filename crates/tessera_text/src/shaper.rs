//! Text shaping using rustybuzz (HarfBuzz)
//!
//! Converts a run of codepoints into positioned glyphs with kerning and
//! ligature support. Shaping output is in app units.

use crate::bidi::TextDirection;
use crate::font::FontFace;
use crate::font_units_to_au;
use crate::script::ScriptTag;
use rustybuzz::ttf_parser::Tag;
use rustybuzz::{Direction, Face, Feature, Language, Script, UnicodeBuffer};
use std::ops::Range;
use std::str::FromStr;

/// Shaped glyph identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlyphInfo {
    /// Glyph ID in the font
    pub glyph_id: u32,
    /// Index of the first source codepoint of this glyph's cluster, relative to
    /// the paragraph
    pub cluster: u32,
}

/// Shaped glyph placement in app units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlyphPosition {
    pub x_advance: i32,
    pub y_advance: i32,
    pub x_offset: i32,
    /// Upwards offset from the baseline
    pub y_offset: i32,
}

/// One shaping call: a run within its paragraph
#[derive(Debug, Clone)]
pub struct ShapeRequest<'a> {
    /// The whole paragraph, available as shaping context
    pub paragraph: &'a [char],
    /// Codepoints to shape, relative to `paragraph`
    pub range: Range<usize>,
    pub script: ScriptTag,
    pub direction: TextDirection,
    /// BCP-47 language tag, or the shaper's default
    pub language: Option<&'a str>,
    pub kerning: bool,
    pub ligatures: bool,
}

impl ShapeRequest<'_> {
    pub fn codepoints(&self) -> &[char] {
        &self.paragraph[self.range.clone()]
    }
}

/// Shaping service.
///
/// Implementations must push exactly one position per glyph info.
pub trait ShapingOracle: Send + Sync {
    /// Replace the contents of `infos` and `positions` with the shaped run
    fn shape(
        &self,
        font: &FontFace,
        request: &ShapeRequest<'_>,
        infos: &mut Vec<GlyphInfo>,
        positions: &mut Vec<GlyphPosition>,
    );
}

/// Text shaper using HarfBuzz via rustybuzz
#[derive(Debug, Clone, Copy, Default)]
pub struct RustybuzzShaper;

impl RustybuzzShaper {
    fn features(kerning: bool, ligatures: bool) -> [Feature; 3] {
        let toggle = |on: bool| u32::from(on);
        [
            Feature::new(Tag::from_bytes(b"kern"), toggle(kerning), ..),
            Feature::new(Tag::from_bytes(b"liga"), toggle(ligatures), ..),
            Feature::new(Tag::from_bytes(b"clig"), toggle(ligatures), ..),
        ]
    }
}

impl ShapingOracle for RustybuzzShaper {
    fn shape(
        &self,
        font: &FontFace,
        request: &ShapeRequest<'_>,
        infos: &mut Vec<GlyphInfo>,
        positions: &mut Vec<GlyphPosition>,
    ) {
        infos.clear();
        positions.clear();

        // The face borrows from the font data, so it is created per call
        let Some(face) = Face::from_slice(font.data(), font.face_index()) else {
            tracing::warn!("rustybuzz could not parse font {}", font.label());
            return;
        };

        let mut buffer = UnicodeBuffer::new();
        for (i, &c) in request.codepoints().iter().enumerate() {
            buffer.add(c, (request.range.start + i) as u32);
        }

        // The rest of the paragraph selects joining forms at the run edges
        let pre: String = request.paragraph[..request.range.start].iter().collect();
        let post: String = request.paragraph[request.range.end..].iter().collect();
        buffer.set_pre_context(&pre);
        buffer.set_post_context(&post);

        buffer.set_direction(match request.direction {
            TextDirection::LeftToRight => Direction::LeftToRight,
            TextDirection::RightToLeft => Direction::RightToLeft,
        });

        if let Some(script) = Script::from_iso15924_tag(Tag::from_bytes(&request.script.0)) {
            buffer.set_script(script);
        }

        if let Some(language) = request.language.and_then(|l| Language::from_str(l).ok()) {
            buffer.set_language(language);
        }

        buffer.guess_segment_properties();

        let features = Self::features(request.kerning, request.ligatures);
        let output = rustybuzz::shape(&face, &features, buffer);

        let upem = font.units_per_em();
        for (info, pos) in output.glyph_infos().iter().zip(output.glyph_positions()) {
            infos.push(GlyphInfo {
                glyph_id: info.glyph_id,
                cluster: info.cluster,
            });
            positions.push(GlyphPosition {
                x_advance: font_units_to_au(pos.x_advance, upem),
                y_advance: font_units_to_au(pos.y_advance, upem),
                x_offset: font_units_to_au(pos.x_offset, upem),
                y_offset: font_units_to_au(pos.y_offset, upem),
            });
        }
    }
}
