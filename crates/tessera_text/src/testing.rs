//! Deterministic oracles for unit tests

use crate::bidi::{BidiOracle, BidiParagraph, TextDirection};
use crate::font::{FontDecoder, FontFace, FontFaceParts, FontId, FontMetrics, GlyphMetrics};
use crate::layout::TextLayoutEngine;
use crate::rasterizer::{GlyphBitmap, GlyphRasterizer, PixelMode};
use crate::script::{ScriptOracle, ScriptTag};
use crate::shaper::{GlyphInfo, GlyphPosition, ShapeRequest, ShapingOracle};
use crate::{au_to_px, FontLoadError, AU_UNIT};
use slotmap::SlotMap;
use std::sync::Arc;

/// Advance of every fake glyph at a 10px font
pub const GLYPH_ADVANCE: f32 = 5.0;

fn is_arabic(c: char) -> bool {
    ('\u{0600}'..='\u{06FF}').contains(&c)
}

fn is_latin(c: char) -> bool {
    c.is_ascii_alphabetic()
}

/// Arabic block is `Arab`, everything else `Latn`
pub struct FakeScripts;

impl ScriptOracle for FakeScripts {
    fn segment_scripts(&self, text: &[char], out: &mut Vec<ScriptTag>) {
        out.clear();
        out.extend(text.iter().map(|&c| {
            if is_arabic(c) {
                ScriptTag::ARABIC
            } else {
                ScriptTag::LATIN
            }
        }));
    }
}

/// Arabic is strong RTL, ASCII letters strong LTR, the rest neutral
pub struct FakeBidi;

impl BidiOracle for FakeBidi {
    fn create_paragraph(&self, text: &[char], hint: TextDirection) -> BidiParagraph {
        let base_level = text
            .iter()
            .find_map(|&c| {
                if is_arabic(c) {
                    Some(1)
                } else if is_latin(c) {
                    Some(0)
                } else {
                    None
                }
            })
            .unwrap_or(hint.base_level());

        let levels = text
            .iter()
            .map(|&c| match (base_level, is_arabic(c), is_latin(c)) {
                (_, true, _) => 1,
                (1, _, true) => 2,
                (level, _, _) => level,
            })
            .collect();

        BidiParagraph { base_level, levels }
    }
}

/// One glyph per codepoint, half an em wide, glyph id = codepoint.
/// Right-to-left runs come out in visual order.
pub struct FakeShaper;

impl ShapingOracle for FakeShaper {
    fn shape(
        &self,
        _font: &FontFace,
        request: &ShapeRequest<'_>,
        infos: &mut Vec<GlyphInfo>,
        positions: &mut Vec<GlyphPosition>,
    ) {
        infos.clear();
        positions.clear();

        let mut glyphs: Vec<_> = request
            .codepoints()
            .iter()
            .enumerate()
            .map(|(i, &c)| GlyphInfo {
                glyph_id: c as u32,
                cluster: (request.range.start + i) as u32,
            })
            .collect();

        if request.direction.is_rtl() {
            glyphs.reverse();
        }

        for info in glyphs {
            infos.push(info);
            positions.push(GlyphPosition {
                x_advance: AU_UNIT / 2,
                ..Default::default()
            });
        }
    }
}

/// Ascent 3/4 em, descent 1/4 em; `glyph_extents` in ems
pub fn fake_face(label: &str, glyph_extents: &[f32], has_color: bool) -> FontFace {
    let glyphs = glyph_extents
        .iter()
        .map(|&em| {
            let au = (em * AU_UNIT as f32) as i32;
            GlyphMetrics {
                bearing: [0, au],
                advance: AU_UNIT / 2,
                extent: [au, au],
            }
        })
        .collect();

    FontFace::from_parts(FontFaceParts {
        label: label.to_string(),
        units_per_em: 1000,
        has_color,
        glyphs,
        metrics: FontMetrics {
            ascent: AU_UNIT * 3 / 4,
            descent: AU_UNIT / 4,
            advance: AU_UNIT / 2,
        },
        ..Default::default()
    })
}

pub fn fake_fonts() -> (SlotMap<FontId, Arc<FontFace>>, FontId) {
    let mut fonts = SlotMap::with_key();
    let id = fonts.insert(Arc::new(fake_face("fake", &[0.5; 4], false)));
    (fonts, id)
}

pub fn fake_engine() -> TextLayoutEngine {
    TextLayoutEngine::new(
        Box::new(FakeScripts),
        Box::new(FakeBidi),
        Box::new(FakeShaper),
    )
}

/// Decodes `FAKE` followed by one byte per glyph giving its extent in
/// eighths of an em. A fifth byte of `C` marks a color font.
pub struct FakeDecoder;

impl FontDecoder for FakeDecoder {
    fn decode(
        &self,
        label: &str,
        data: Arc<Vec<u8>>,
        face_index: u32,
    ) -> Result<FontFace, FontLoadError> {
        let Some(rest) = data.strip_prefix(b"FAKE") else {
            return Err(FontLoadError::DecodeFailed("missing FAKE magic".to_string()));
        };
        if face_index != 0 {
            return Err(FontLoadError::FaceNotFound {
                index: face_index,
                count: 1,
            });
        }

        let (has_color, rest) = match rest.split_first() {
            Some((b'C', rest)) => (true, rest),
            _ => (false, rest),
        };
        let extents: Vec<f32> = rest.iter().map(|&b| b as f32 / 8.0).collect();
        Ok(fake_face(label, &extents, has_color))
    }
}

/// Square bitmaps sized from the glyph metrics; solid white coverage, or
/// `[1, 2, 3, 4]` BGRA pixels for color fonts
pub struct FakeRasterizer;

impl GlyphRasterizer for FakeRasterizer {
    fn rasterize(&self, font: &FontFace, glyph: u32, pixel_height: u32) -> Option<GlyphBitmap> {
        let metrics = font.glyphs().get(glyph as usize)?;
        let side = au_to_px(metrics.extent[0], pixel_height as f32).ceil() as u32;

        if font.has_color() {
            Some(GlyphBitmap {
                width: side,
                height: side,
                pitch: side as usize * 4,
                mode: PixelMode::Bgra,
                buffer: [1u8, 2, 3, 4].repeat((side * side) as usize),
            })
        } else {
            Some(GlyphBitmap {
                width: side,
                height: side,
                pitch: side as usize,
                mode: PixelMode::Gray,
                buffer: vec![0xFF; (side * side) as usize],
            })
        }
    }
}

/// First font found at a well-known system location
pub fn system_font() -> Option<Vec<u8>> {
    const CANDIDATES: &[&str] = &[
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "/Library/Fonts/Arial.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
    ];

    CANDIDATES.iter().find_map(|path| std::fs::read(path).ok())
}
