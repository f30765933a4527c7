//! Glyph atlas building
//!
//! Rasterizes every glyph of a font at one pixel height and packs them into a
//! multi-layer BGRA atlas. Each layer is a square bin filled by the skyline
//! packer; glyphs that don't fit spill into the next layer.

use crate::config::AtlasConfig;
use crate::font::FontFace;
use crate::rasterizer::{GlyphBitmap, GlyphRasterizer, PixelMode};
use crate::rect_pack::{PackRect, RectPacker};
use crate::FontLoadError;

/// Bytes per atlas pixel (B, G, R, A)
pub const ATLAS_CHANNELS: usize = 4;

/// Atlas extents are kept a multiple of this
const EXTENT_QUANTUM: u32 = 64;

/// Placement of a glyph within its layer, in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AtlasArea {
    pub offset: [u32; 2],
    pub extent: [u32; 2],
}

impl AtlasArea {
    pub fn is_empty(&self) -> bool {
        self.extent[0] == 0 || self.extent[1] == 0
    }
}

/// A glyph's location in the atlas
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AtlasGlyph {
    /// Unpadded area within the layer
    pub area: AtlasArea,
    /// Layer (array slice) holding the glyph
    pub layer: u32,
    /// Normalized top-left and bottom-right texture coordinates
    pub uv: [[f32; 2]; 2],
    /// Pre-colored bitmap rather than white coverage
    pub has_color: bool,
}

/// A CPU-side atlas awaiting upload
#[derive(Debug, Clone, Default)]
pub struct CpuFontAtlas {
    /// Pixel height the glyphs were rasterized at
    pub font_height: u32,
    /// Extent of each layer
    pub extent: [u32; 2],
    pub num_layers: u32,
    /// One entry per glyph id
    pub glyphs: Vec<AtlasGlyph>,
    /// Layer-major, row-major BGRA pixels
    pub channels: Vec<u8>,
}

impl CpuFontAtlas {
    /// Bytes in one layer
    pub fn layer_size(&self) -> usize {
        self.extent[0] as usize * self.extent[1] as usize * ATLAS_CHANNELS
    }

    pub fn layer(&self, layer: u32) -> &[u8] {
        let size = self.layer_size();
        let start = layer as usize * size;
        &self.channels[start..start + size]
    }
}

/// Builds a [`CpuFontAtlas`] for one font at one pixel height
pub struct AtlasBuilder<'a> {
    rasterizer: &'a dyn GlyphRasterizer,
    config: AtlasConfig,
}

impl<'a> AtlasBuilder<'a> {
    pub fn new(rasterizer: &'a dyn GlyphRasterizer, config: AtlasConfig) -> Self {
        Self { rasterizer, config }
    }

    pub fn build(&self, font: &FontFace, font_height: u32) -> Result<CpuFontAtlas, FontLoadError> {
        let num_glyphs = font.glyph_count();
        let padding = self.config.glyph_padding;

        let mut glyphs = Vec::new();
        glyphs
            .try_reserve_exact(num_glyphs as usize)
            .map_err(|_| FontLoadError::OutOfMemory)?;

        let mut max_padded = 0;
        for glyph in 0..num_glyphs {
            let extent = self.rasterizer.glyph_extent(font, glyph, font_height);
            let area = AtlasArea {
                offset: [0, 0],
                extent,
            };
            if !area.is_empty() {
                max_padded = max_padded.max(extent[0].max(extent[1]) + 2 * padding);
            }
            glyphs.push(AtlasGlyph {
                area,
                ..Default::default()
            });
        }

        let side = self.bin_extent(max_padded);
        let extent = [side, side];

        let mut rects = Vec::new();
        rects
            .try_reserve_exact(glyphs.len())
            .map_err(|_| FontLoadError::OutOfMemory)?;
        rects.extend(glyphs.iter().enumerate().map(|(id, g)| {
            let padded = if g.area.is_empty() {
                [0, 0]
            } else {
                [g.area.extent[0] + 2 * padding, g.area.extent[1] + 2 * padding]
            };
            PackRect::new(id as u32, padded)
        }));

        let num_layers = Self::pack_layers(extent, &mut rects, &mut glyphs)?;

        let inv = [1.0 / extent[0] as f32, 1.0 / extent[1] as f32];
        for rect in &rects {
            let glyph = &mut glyphs[rect.id as usize];
            if glyph.area.is_empty() {
                glyph.area.offset = [0, 0];
                glyph.uv = [[0.0, 0.0], [0.0, 0.0]];
                continue;
            }

            let offset = [rect.pos[0] + padding, rect.pos[1] + padding];
            let end = [
                offset[0] + glyph.area.extent[0],
                offset[1] + glyph.area.extent[1],
            ];
            glyph.area.offset = offset;
            glyph.uv = [
                [offset[0] as f32 * inv[0], offset[1] as f32 * inv[1]],
                [end[0] as f32 * inv[0], end[1] as f32 * inv[1]],
            ];
        }

        let mut atlas = CpuFontAtlas {
            font_height,
            extent,
            num_layers,
            glyphs,
            channels: Vec::new(),
        };

        let size = atlas.layer_size() * num_layers as usize;
        atlas
            .channels
            .try_reserve_exact(size)
            .map_err(|_| FontLoadError::OutOfMemory)?;
        atlas.channels.resize(size, 0);

        for glyph in 0..num_glyphs {
            if atlas.glyphs[glyph as usize].area.is_empty() {
                continue;
            }
            if let Some(bitmap) = self.rasterizer.rasterize(font, glyph, font_height) {
                compose(&mut atlas, glyph as usize, &bitmap);
            }
        }

        tracing::debug!(
            "Built atlas for {} @{}px: {} glyphs, {} layer(s) of {}x{}",
            font.label(),
            font_height,
            num_glyphs,
            num_layers,
            extent[0],
            extent[1]
        );

        Ok(atlas)
    }

    /// Configured extent, grown to hold the largest padded glyph
    fn bin_extent(&self, max_padded: u32) -> u32 {
        let base = self.config.extent.max(EXTENT_QUANTUM);
        if max_padded <= base {
            base
        } else {
            tracing::warn!(
                "Glyph of {}px exceeds atlas extent {}, growing the atlas",
                max_padded,
                base
            );
            max_padded.div_ceil(EXTENT_QUANTUM) * EXTENT_QUANTUM
        }
    }

    /// Pack into successive layers until every rect is placed
    fn pack_layers(
        extent: [u32; 2],
        rects: &mut [PackRect],
        glyphs: &mut [AtlasGlyph],
    ) -> Result<u32, FontLoadError> {
        let mut packer =
            RectPacker::new(extent, extent[0] as usize).map_err(|_| FontLoadError::OutOfMemory)?;
        let mut unpacked = rects;
        let mut layer = 0u32;

        while !unpacked.is_empty() {
            packer.reset();
            packer.pack_rects(unpacked);

            // Packed rects first, keeping the packer's order within each side
            unpacked.sort_by_key(|r| !r.packed);
            let num_packed = unpacked.iter().take_while(|r| r.packed).count();

            if num_packed == 0 {
                tracing::error!(
                    "Atlas layer {} placed no glyphs, {} remaining",
                    layer,
                    unpacked.len()
                );
                return Err(FontLoadError::PackingExhausted {
                    layer,
                    remaining: unpacked.len(),
                });
            }

            let (packed, rest) = std::mem::take(&mut unpacked).split_at_mut(num_packed);
            for rect in packed.iter() {
                glyphs[rect.id as usize].layer = layer;
            }

            tracing::trace!(
                "Atlas layer {}: packed {}, {} remaining",
                layer,
                packed.len(),
                rest.len()
            );

            unpacked = rest;
            layer += 1;
        }

        Ok(layer.max(1))
    }
}

/// Copy a glyph bitmap into its slot: coverage becomes white with alpha,
/// color pixels are copied as is
fn compose(atlas: &mut CpuFontAtlas, glyph: usize, bitmap: &GlyphBitmap) {
    let AtlasGlyph { area, layer, .. } = atlas.glyphs[glyph];
    let width = area.extent[0].min(bitmap.width) as usize;
    let height = area.extent[1].min(bitmap.height);
    let stride = atlas.extent[0] as usize * ATLAS_CHANNELS;
    let layer_start = layer as usize * atlas.layer_size();

    for y in 0..height {
        let row = &bitmap.row(y)[..width * bitmap.mode.bytes_per_pixel()];
        let start = layer_start
            + (area.offset[1] + y) as usize * stride
            + area.offset[0] as usize * ATLAS_CHANNELS;
        let dst = &mut atlas.channels[start..start + width * ATLAS_CHANNELS];

        match bitmap.mode {
            PixelMode::Gray => {
                for (pixel, &coverage) in dst.chunks_exact_mut(ATLAS_CHANNELS).zip(row) {
                    pixel.copy_from_slice(&[0xFF, 0xFF, 0xFF, coverage]);
                }
            }
            PixelMode::Bgra => dst.copy_from_slice(row),
        }
    }

    atlas.glyphs[glyph].has_color = bitmap.mode == PixelMode::Bgra;
}
