//! Font faces and decoding
//!
//! Provides font parsing via ttf-parser and metric extraction. All metrics are
//! normalised to app units (see [`crate::AU_UNIT`]) so layout is independent
//! of the pixel height a font is rasterized at.

use crate::{font_units_to_au, FontLoadError};
use std::sync::Arc;
use ttf_parser::{name_id, Face, GlyphId};

slotmap::new_key_type! {
    /// Handle to a font loaded into a [`crate::FontSystem`]
    pub struct FontId;
}

/// Glyph metrics in app units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlyphMetrics {
    /// Offset from the pen position on the baseline to the glyph's top-left
    /// corner (y grows upwards)
    pub bearing: [i32; 2],
    /// Horizontal pen advance after this glyph
    pub advance: i32,
    /// Width and height of the glyph's bounding box
    pub extent: [i32; 2],
}

/// Font-wide metrics in app units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FontMetrics {
    /// Distance from the baseline to the top of the tallest glyph
    pub ascent: i32,
    /// Distance from the baseline to the bottom of the lowest glyph (positive)
    pub descent: i32,
    /// Maximum horizontal advance
    pub advance: i32,
}

/// Everything a [`FontFace`] is made of, for decoders that don't go through
/// ttf-parser
#[derive(Debug, Clone, Default)]
pub struct FontFaceParts {
    pub label: String,
    pub data: Arc<Vec<u8>>,
    pub face_index: u32,
    pub units_per_em: u16,
    pub postscript_name: String,
    pub family_name: String,
    pub style_name: String,
    pub has_color: bool,
    pub glyphs: Vec<GlyphMetrics>,
    pub replacement_glyph: u32,
    pub space_glyph: u32,
    pub ellipsis_glyph: u32,
    pub metrics: FontMetrics,
}

/// A decoded font face
pub struct FontFace {
    parts: FontFaceParts,
}

impl FontFace {
    pub fn from_parts(parts: FontFaceParts) -> Self {
        Self { parts }
    }

    /// Label the font was loaded under
    pub fn label(&self) -> &str {
        &self.parts.label
    }

    /// Raw font data, kept alive for shaping and rasterization
    pub fn data(&self) -> &[u8] {
        &self.parts.data
    }

    /// Face index within the font file (for TTC files)
    pub fn face_index(&self) -> u32 {
        self.parts.face_index
    }

    pub fn units_per_em(&self) -> u16 {
        self.parts.units_per_em
    }

    /// e.g. `RobotoBold`
    pub fn postscript_name(&self) -> &str {
        &self.parts.postscript_name
    }

    /// e.g. `Roboto`
    pub fn family_name(&self) -> &str {
        &self.parts.family_name
    }

    /// e.g. `Bold`
    pub fn style_name(&self) -> &str {
        &self.parts.style_name
    }

    /// Whether the font carries color glyphs (COLR, CBDT or sbix)
    pub fn has_color(&self) -> bool {
        self.parts.has_color
    }

    /// Metrics of every glyph, indexed by glyph id
    pub fn glyphs(&self) -> &[GlyphMetrics] {
        &self.parts.glyphs
    }

    pub fn glyph_count(&self) -> u32 {
        self.parts.glyphs.len() as u32
    }

    /// Glyph for U+FFFD, or glyph 0
    pub fn replacement_glyph(&self) -> u32 {
        self.parts.replacement_glyph
    }

    pub fn space_glyph(&self) -> u32 {
        self.parts.space_glyph
    }

    /// Glyph for U+2026
    pub fn ellipsis_glyph(&self) -> u32 {
        self.parts.ellipsis_glyph
    }

    pub fn metrics(&self) -> &FontMetrics {
        &self.parts.metrics
    }
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontFace")
            .field("label", &self.parts.label)
            .field("postscript_name", &self.parts.postscript_name)
            .field("face_index", &self.parts.face_index)
            .field("glyphs", &self.parts.glyphs.len())
            .field("has_color", &self.parts.has_color)
            .finish()
    }
}

/// Font file decoding service
pub trait FontDecoder: Send + Sync {
    /// Decode face `face_index` of `data`
    fn decode(
        &self,
        label: &str,
        data: Arc<Vec<u8>>,
        face_index: u32,
    ) -> Result<FontFace, FontLoadError>;
}

/// Decoder for TrueType/OpenType fonts and collections
#[derive(Debug, Clone, Copy, Default)]
pub struct TtfDecoder;

impl TtfDecoder {
    fn name(face: &Face<'_>, id: u16) -> String {
        face.names()
            .into_iter()
            .find(|n| n.name_id == id)
            .and_then(|n| n.to_string())
            .unwrap_or_default()
    }

    fn glyph_for(face: &Face<'_>, c: char) -> u32 {
        face.glyph_index(c).map(|g| g.0 as u32).unwrap_or(0)
    }
}

impl FontDecoder for TtfDecoder {
    fn decode(
        &self,
        label: &str,
        data: Arc<Vec<u8>>,
        face_index: u32,
    ) -> Result<FontFace, FontLoadError> {
        let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
        if face_index >= count {
            return Err(FontLoadError::FaceNotFound {
                index: face_index,
                count,
            });
        }

        let face = Face::parse(&data, face_index)
            .map_err(|e| FontLoadError::DecodeFailed(e.to_string()))?;

        let upem = face.units_per_em();
        let au = |v: i32| font_units_to_au(v, upem);

        let num_glyphs = face.number_of_glyphs();
        let mut glyphs = Vec::new();
        glyphs
            .try_reserve_exact(num_glyphs as usize)
            .map_err(|_| FontLoadError::OutOfMemory)?;

        for id in 0..num_glyphs {
            let glyph = GlyphId(id);
            let advance = face.glyph_hor_advance(glyph).unwrap_or(0) as i32;
            let metrics = match face.glyph_bounding_box(glyph) {
                Some(bbox) => GlyphMetrics {
                    bearing: [au(bbox.x_min as i32), au(bbox.y_max as i32)],
                    advance: au(advance),
                    extent: [au(bbox.width() as i32), au(bbox.height() as i32)],
                },
                None => GlyphMetrics {
                    advance: au(advance),
                    ..Default::default()
                },
            };
            glyphs.push(metrics);
        }

        let tables = face.tables();
        let has_color = tables.colr.is_some() || tables.cbdt.is_some() || tables.sbix.is_some();

        let metrics = FontMetrics {
            ascent: au(face.ascender() as i32),
            descent: au(-(face.descender() as i32)),
            advance: glyphs.iter().map(|g| g.advance).max().unwrap_or(0),
        };

        tracing::debug!(
            "Decoded font {} (face {}/{}): {} glyphs, color: {}",
            label,
            face_index,
            count,
            num_glyphs,
            has_color
        );

        Ok(FontFace::from_parts(FontFaceParts {
            label: label.to_string(),
            postscript_name: Self::name(&face, name_id::POST_SCRIPT_NAME),
            family_name: Self::name(&face, name_id::FAMILY),
            style_name: Self::name(&face, name_id::SUBFAMILY),
            has_color,
            glyphs,
            replacement_glyph: Self::glyph_for(&face, '\u{FFFD}'),
            space_glyph: Self::glyph_for(&face, ' '),
            ellipsis_glyph: Self::glyph_for(&face, '\u{2026}'),
            metrics,
            units_per_em: upem,
            face_index,
            data: data.clone(),
        }))
    }
}
