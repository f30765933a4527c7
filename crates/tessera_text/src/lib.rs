//! Text layout and glyph atlas packing for Tessera
//!
//! This crate provides:
//! - Text segmentation (paragraphs, scripts, bidi levels, wrap points)
//! - Text shaping into runs (HarfBuzz via rustybuzz)
//! - Line breaking and bidi visual reordering
//! - Hit testing and caret queries
//! - Skyline rectangle packing
//! - Multi-layer glyph atlas building (swash rasterization)
//! - An asynchronous font load pipeline (decode -> rasterize -> upload)
//!
//! The Unicode, shaping, decoding, rasterization and GPU services are consumed
//! through traits so they can be swapped for other bindings or test doubles.

pub mod atlas;
pub mod bidi;
pub mod caret;
pub mod config;
pub mod font;
pub mod hit;
pub mod layout;
pub mod rasterizer;
pub mod rect_pack;
pub mod scheduler;
pub mod script;
pub mod segment;
pub mod shaper;
pub mod system;
pub mod upload;

#[cfg(test)]
mod testing;

pub use atlas::{AtlasArea, AtlasBuilder, AtlasGlyph, CpuFontAtlas};
pub use bidi::{level_to_direction, reorder_visual, BidiOracle, BidiParagraph, TextDirection, UnicodeBidiOracle};
pub use caret::{CaretAlignment, CaretCodepoint, CaretPlacement, CaretX, CaretY};
pub use config::{AtlasConfig, ConfigError, FontSystemConfig, LayoutConfig};
pub use font::{FontDecoder, FontFace, FontFaceParts, FontId, FontMetrics, GlyphMetrics, TtfDecoder};
pub use hit::TextHit;
pub use layout::{
    FontLookup, FontStyle, GlyphShape, Line, LineMetrics, Paragraph, ResolvedMetrics, RunKind,
    RunMetrics, TextBlock, TextLayout, TextLayoutEngine, TextRun,
};
pub use rasterizer::{GlyphBitmap, GlyphRasterizer, PixelMode, SwashRasterizer};
pub use rect_pack::{PackRect, RectPacker};
pub use scheduler::{MainQueue, Scheduler, SchedulerHandle};
pub use script::{ScriptOracle, ScriptTag, UnicodeScriptOracle};
pub use segment::Segment;
pub use shaper::{GlyphInfo, GlyphPosition, RustybuzzShaper, ShapeRequest, ShapingOracle};
pub use system::{Font, FontLoad, FontSource, FontSystem, FontSystemBuilder};
pub use upload::{
    AtlasFormat, CopyRegion, GpuFontAtlas, GpuUploader, HeadlessUploader, ImageHandle, TextureSlot,
    UploadError, ViewHandle,
};

use thiserror::Error;

/// App unit: shaping output and font metrics are expressed in 1/AU_UNIT of an em
pub const AU_UNIT: i32 = 128 * 64;

/// Scale from app units to a fraction of an em
pub const AU_SCALE: f32 = 1.0 / AU_UNIT as f32;

/// Resolve an app-unit value to pixels at the given font height
#[inline]
pub fn au_to_px(au: i32, font_height: f32) -> f32 {
    au as f32 * AU_SCALE * font_height
}

/// Convert a value in font design units to app units
#[inline]
pub fn font_units_to_au(value: i32, units_per_em: u16) -> i32 {
    if units_per_em == 0 {
        return 0;
    }
    ((value as i64 * AU_UNIT as i64) / units_per_em as i64) as i32
}

/// Text layout errors
#[derive(Error, Debug)]
pub enum TextError {
    #[error("{oracle} oracle returned {actual} entries, expected {expected}")]
    OracleInconsistency {
        oracle: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Font {0:?} is not loaded")]
    FontNotLoaded(FontId),

    #[error("Invalid style runs: {0}")]
    InvalidStyleRuns(String),

    #[error("Out of memory while laying out text")]
    OutOfMemory,
}

pub type Result<T> = std::result::Result<T, TextError>;

/// Font and image load errors, surfaced through the load future
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FontLoadError {
    #[error("Out of memory")]
    OutOfMemory,

    #[error("Invalid font path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Failed to decode font: {0}")]
    DecodeFailed(String),

    #[error("Face {index} not found, font has {count} face(s)")]
    FaceNotFound { index: u32, count: u32 },

    #[error("Atlas packing placed no glyphs on layer {layer} ({remaining} remaining)")]
    PackingExhausted { layer: u32, remaining: usize },

    #[error("GPU upload failed: {0}")]
    Upload(String),

    #[error("Font load pipeline was interrupted")]
    Interrupted,
}
