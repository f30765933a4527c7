//! Glyph rasterization using swash
//!
//! Converts font glyphs to bitmaps for the glyph atlas. Color glyphs (COLR
//! outlines, embedded bitmaps) come out as BGRA, everything else as 8-bit
//! coverage.

use crate::font::FontFace;
use std::sync::Mutex;
use swash::scale::image::Content;
use swash::scale::{Render, ScaleContext, Source, StrikeWith};
use swash::zeno::Format;

/// Pixel layout of a [`GlyphBitmap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelMode {
    /// One coverage byte per pixel
    Gray,
    /// Four bytes per pixel in B, G, R, A order, pre-colored
    Bgra,
}

impl PixelMode {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelMode::Gray => 1,
            PixelMode::Bgra => 4,
        }
    }
}

/// Rasterized glyph bitmap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphBitmap {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per row
    pub pitch: usize,
    pub mode: PixelMode,
    pub buffer: Vec<u8>,
}

impl GlyphBitmap {
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.pitch;
        let len = self.width as usize * self.mode.bytes_per_pixel();
        &self.buffer[start..start + len]
    }
}

/// Per-glyph rasterization service
pub trait GlyphRasterizer: Send + Sync {
    /// Render `glyph` with an em size of `pixel_height` pixels.
    ///
    /// Returns `None` for glyphs the font cannot render.
    fn rasterize(&self, font: &FontFace, glyph: u32, pixel_height: u32) -> Option<GlyphBitmap>;

    /// Bitmap extent of `glyph`, `[0, 0]` if it has no bitmap
    fn glyph_extent(&self, font: &FontFace, glyph: u32, pixel_height: u32) -> [u32; 2] {
        self.rasterize(font, glyph, pixel_height)
            .map(|bitmap| [bitmap.width, bitmap.height])
            .unwrap_or([0, 0])
    }
}

/// Glyph rasterizer using swash
pub struct SwashRasterizer {
    /// Swash scale context (caches scaling state)
    context: Mutex<ScaleContext>,
}

impl SwashRasterizer {
    pub fn new() -> Self {
        Self {
            context: Mutex::new(ScaleContext::new()),
        }
    }
}

impl Default for SwashRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl GlyphRasterizer for SwashRasterizer {
    fn rasterize(&self, font: &FontFace, glyph: u32, pixel_height: u32) -> Option<GlyphBitmap> {
        let glyph_id = u16::try_from(glyph).ok()?;
        let swash_font = swash::FontRef::from_index(font.data(), font.face_index() as usize)?;

        let mut context = self.context.lock().unwrap_or_else(|e| e.into_inner());
        let mut scaler = context
            .builder(swash_font)
            .size(pixel_height as f32)
            .build();

        let image = Render::new(&[
            Source::ColorOutline(0),
            Source::ColorBitmap(StrikeWith::BestFit),
            Source::Outline,
        ])
        .format(Format::Alpha)
        .render(&mut scaler, glyph_id)?;

        let width = image.placement.width;
        let height = image.placement.height;

        match image.content {
            Content::Mask => Some(GlyphBitmap {
                width,
                height,
                pitch: width as usize,
                mode: PixelMode::Gray,
                buffer: image.data,
            }),
            Content::Color => {
                let mut buffer = image.data;
                for pixel in buffer.chunks_exact_mut(4) {
                    pixel.swap(0, 2);
                }
                Some(GlyphBitmap {
                    width,
                    height,
                    pitch: width as usize * 4,
                    mode: PixelMode::Bgra,
                    buffer,
                })
            }
            Content::SubpixelMask => {
                tracing::warn!("Unexpected subpixel mask for glyph {}", glyph);
                None
            }
        }
    }
}
