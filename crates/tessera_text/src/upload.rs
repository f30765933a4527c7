//! GPU atlas upload
//!
//! The GPU side is consumed through [`GpuUploader`]: create a layered image,
//! copy the CPU atlas into it, then create one view and one texture slot per
//! layer. All calls happen on the main thread.

use crate::atlas::{AtlasGlyph, CpuFontAtlas, ATLAS_CHANNELS};
use crate::FontLoadError;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use thiserror::Error;

/// Handle to a GPU image owned by the uploader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u64);

/// Handle to a single-layer view of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle(pub u64);

/// Index of a bound texture in the renderer's texture table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSlot(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtlasFormat {
    Bgra8Unorm,
}

impl AtlasFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            AtlasFormat::Bgra8Unorm => 4,
        }
    }
}

/// Copy of one tightly packed layer from the pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRegion {
    pub layer: u32,
    pub buffer_offset: usize,
    pub extent: [u32; 2],
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Out of GPU memory")]
    OutOfMemory,

    #[error("{0}")]
    Backend(String),
}

impl From<UploadError> for FontLoadError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::OutOfMemory => FontLoadError::OutOfMemory,
            UploadError::Backend(msg) => FontLoadError::Upload(msg),
        }
    }
}

/// GPU resource service used by the atlas uploader
pub trait GpuUploader {
    fn create_image(
        &mut self,
        label: &str,
        format: AtlasFormat,
        extent: [u32; 2],
        layers: u32,
    ) -> Result<ImageHandle, UploadError>;

    fn create_image_view(&mut self, image: ImageHandle, layer: u32)
        -> Result<ViewHandle, UploadError>;

    fn upload_pixels(
        &mut self,
        image: ImageHandle,
        pixels: &[u8],
        regions: &[CopyRegion],
    ) -> Result<(), UploadError>;

    fn alloc_texture_slot(&mut self, view: ViewHandle) -> Result<TextureSlot, UploadError>;

    /// Release an image and the views created from it
    fn destroy_image(&mut self, image: ImageHandle);
}

/// An uploaded atlas, owned by its font
#[derive(Debug, Clone)]
pub struct GpuFontAtlas {
    pub image: ImageHandle,
    /// One view per layer
    pub views: Vec<ViewHandle>,
    /// One texture slot per layer
    pub textures: Vec<TextureSlot>,
    pub font_height: u32,
    pub extent: [u32; 2],
    pub glyphs: Vec<AtlasGlyph>,
}

impl GpuFontAtlas {
    pub fn num_layers(&self) -> u32 {
        self.views.len() as u32
    }

    /// Texture slot holding `glyph`
    pub fn glyph_texture(&self, glyph: u32) -> Option<TextureSlot> {
        let layer = self.glyphs.get(glyph as usize)?.layer;
        self.textures.get(layer as usize).copied()
    }
}

/// Upload `atlas` and release its pixel buffer.
///
/// Either the whole atlas uploads or the image is destroyed again and the
/// error is returned.
pub fn upload_atlas(
    uploader: &mut dyn GpuUploader,
    label: &str,
    atlas: CpuFontAtlas,
) -> Result<GpuFontAtlas, UploadError> {
    let image = uploader.create_image(
        label,
        AtlasFormat::Bgra8Unorm,
        atlas.extent,
        atlas.num_layers,
    )?;

    match upload_layers(uploader, image, &atlas) {
        Ok((views, textures)) => {
            tracing::debug!(
                "Uploaded atlas {} ({} layer(s), texture slots {:?})",
                label,
                views.len(),
                textures
            );
            Ok(GpuFontAtlas {
                image,
                views,
                textures,
                font_height: atlas.font_height,
                extent: atlas.extent,
                glyphs: atlas.glyphs,
            })
        }
        Err(err) => {
            tracing::warn!("Atlas upload for {} failed: {}", label, err);
            uploader.destroy_image(image);
            Err(err)
        }
    }
}

fn upload_layers(
    uploader: &mut dyn GpuUploader,
    image: ImageHandle,
    atlas: &CpuFontAtlas,
) -> Result<(Vec<ViewHandle>, Vec<TextureSlot>), UploadError> {
    let layer_size = atlas.layer_size();
    let regions: SmallVec<[CopyRegion; 4]> = (0..atlas.num_layers)
        .map(|layer| CopyRegion {
            layer,
            buffer_offset: layer as usize * layer_size,
            extent: atlas.extent,
        })
        .collect();

    uploader.upload_pixels(image, &atlas.channels, &regions)?;

    let mut views = Vec::new();
    let mut textures = Vec::new();
    views
        .try_reserve_exact(regions.len())
        .map_err(|_| UploadError::OutOfMemory)?;
    textures
        .try_reserve_exact(regions.len())
        .map_err(|_| UploadError::OutOfMemory)?;

    for region in &regions {
        let view = uploader.create_image_view(image, region.layer)?;
        views.push(view);
        textures.push(uploader.alloc_texture_slot(view)?);
    }

    Ok((views, textures))
}

/// An image held by [`HeadlessUploader`]
#[derive(Debug, Clone)]
pub struct HeadlessImage {
    pub label: String,
    pub format: AtlasFormat,
    pub extent: [u32; 2],
    /// Pixels of each layer
    pub layers: Vec<Vec<u8>>,
}

/// CPU implementation of [`GpuUploader`] that keeps uploaded layers in memory
#[derive(Debug, Default)]
pub struct HeadlessUploader {
    next_handle: u64,
    next_slot: u32,
    images: FxHashMap<ImageHandle, HeadlessImage>,
    views: FxHashMap<ViewHandle, (ImageHandle, u32)>,
}

impl HeadlessUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(&self, image: ImageHandle) -> Option<&HeadlessImage> {
        self.images.get(&image)
    }

    pub fn num_images(&self) -> usize {
        self.images.len()
    }

    /// Layer pixels behind a view
    pub fn view_pixels(&self, view: ViewHandle) -> Option<&[u8]> {
        let (image, layer) = self.views.get(&view)?;
        let pixels = self.images.get(image)?.layers.get(*layer as usize)?;
        Some(pixels.as_slice())
    }

    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl GpuUploader for HeadlessUploader {
    fn create_image(
        &mut self,
        label: &str,
        format: AtlasFormat,
        extent: [u32; 2],
        layers: u32,
    ) -> Result<ImageHandle, UploadError> {
        if extent[0] == 0 || extent[1] == 0 || layers == 0 {
            return Err(UploadError::Backend(format!(
                "Invalid image size {}x{}x{}",
                extent[0], extent[1], layers
            )));
        }

        let size = extent[0] as usize * extent[1] as usize * format.bytes_per_pixel();
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(layers as usize)
            .map_err(|_| UploadError::OutOfMemory)?;
        for _ in 0..layers {
            let mut layer = Vec::new();
            layer
                .try_reserve_exact(size)
                .map_err(|_| UploadError::OutOfMemory)?;
            layer.resize(size, 0);
            pixels.push(layer);
        }

        let handle = ImageHandle(self.next_handle());
        self.images.insert(
            handle,
            HeadlessImage {
                label: label.to_string(),
                format,
                extent,
                layers: pixels,
            },
        );
        Ok(handle)
    }

    fn create_image_view(
        &mut self,
        image: ImageHandle,
        layer: u32,
    ) -> Result<ViewHandle, UploadError> {
        let num_layers = self
            .images
            .get(&image)
            .ok_or_else(|| UploadError::Backend(format!("Unknown image {:?}", image)))?
            .layers
            .len();
        if layer as usize >= num_layers {
            return Err(UploadError::Backend(format!(
                "Layer {} out of range for {:?}",
                layer, image
            )));
        }

        let handle = ViewHandle(self.next_handle());
        self.views.insert(handle, (image, layer));
        Ok(handle)
    }

    fn upload_pixels(
        &mut self,
        image: ImageHandle,
        pixels: &[u8],
        regions: &[CopyRegion],
    ) -> Result<(), UploadError> {
        let target = self
            .images
            .get_mut(&image)
            .ok_or_else(|| UploadError::Backend(format!("Unknown image {:?}", image)))?;

        for region in regions {
            if region.extent != target.extent {
                return Err(UploadError::Backend(format!(
                    "Partial layer copies are not supported ({:?})",
                    region
                )));
            }
            let layer = target
                .layers
                .get_mut(region.layer as usize)
                .ok_or_else(|| UploadError::Backend(format!("Layer {} out of range", region.layer)))?;
            let end = region.buffer_offset + layer.len();
            let source = pixels
                .get(region.buffer_offset..end)
                .ok_or_else(|| UploadError::Backend("Copy region exceeds buffer".to_string()))?;
            layer.copy_from_slice(source);
        }

        Ok(())
    }

    fn alloc_texture_slot(&mut self, view: ViewHandle) -> Result<TextureSlot, UploadError> {
        if !self.views.contains_key(&view) {
            return Err(UploadError::Backend(format!("Unknown view {:?}", view)));
        }
        let slot = TextureSlot(self.next_slot);
        self.next_slot += 1;
        Ok(slot)
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        self.images.remove(&image);
        self.views.retain(|_, (owner, _)| *owner != image);
    }
}

/// Bytes per atlas row
pub fn atlas_row_pitch(extent: [u32; 2]) -> usize {
    extent[0] as usize * ATLAS_CHANNELS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::AtlasArea;

    fn cpu_atlas(layers: u32) -> CpuFontAtlas {
        let extent = [64, 64];
        let layer_size = 64 * 64 * ATLAS_CHANNELS;
        let mut channels = vec![0u8; layer_size * layers as usize];
        for layer in 0..layers as usize {
            channels[layer * layer_size] = layer as u8 + 1;
        }

        CpuFontAtlas {
            font_height: 16,
            extent,
            num_layers: layers,
            glyphs: vec![
                AtlasGlyph {
                    area: AtlasArea {
                        offset: [1, 1],
                        extent: [4, 4],
                    },
                    layer: layers - 1,
                    ..Default::default()
                },
            ],
            channels,
        }
    }

    #[test]
    fn test_upload_layers() {
        let mut uploader = HeadlessUploader::new();
        let atlas = upload_atlas(&mut uploader, "test", cpu_atlas(3)).unwrap();

        assert_eq!(atlas.num_layers(), 3);
        assert_eq!(atlas.textures.len(), 3);
        assert_eq!(atlas.extent, [64, 64]);
        assert_eq!(atlas.glyph_texture(0), Some(atlas.textures[2]));
        assert_eq!(atlas.glyph_texture(7), None);

        let image = uploader.image(atlas.image).unwrap();
        assert_eq!(image.label, "test");
        assert_eq!(image.layers.len(), 3);

        for (i, view) in atlas.views.iter().enumerate() {
            let pixels = uploader.view_pixels(*view).unwrap();
            assert_eq!(pixels.len(), 64 * atlas_row_pitch(atlas.extent));
            assert_eq!(pixels[0], i as u8 + 1);
        }
    }

    #[test]
    fn test_texture_slots_are_unique() {
        let mut uploader = HeadlessUploader::new();
        let a = upload_atlas(&mut uploader, "a", cpu_atlas(2)).unwrap();
        let b = upload_atlas(&mut uploader, "b", cpu_atlas(1)).unwrap();

        let mut slots: Vec<_> = a.textures.iter().chain(&b.textures).map(|s| s.0).collect();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), 3);
        assert_ne!(a.image, b.image);
    }

    #[test]
    fn test_failed_upload_destroys_image() {
        struct FailingViews(HeadlessUploader);

        impl GpuUploader for FailingViews {
            fn create_image(
                &mut self,
                label: &str,
                format: AtlasFormat,
                extent: [u32; 2],
                layers: u32,
            ) -> Result<ImageHandle, UploadError> {
                self.0.create_image(label, format, extent, layers)
            }

            fn create_image_view(
                &mut self,
                _image: ImageHandle,
                _layer: u32,
            ) -> Result<ViewHandle, UploadError> {
                Err(UploadError::OutOfMemory)
            }

            fn upload_pixels(
                &mut self,
                image: ImageHandle,
                pixels: &[u8],
                regions: &[CopyRegion],
            ) -> Result<(), UploadError> {
                self.0.upload_pixels(image, pixels, regions)
            }

            fn alloc_texture_slot(&mut self, view: ViewHandle) -> Result<TextureSlot, UploadError> {
                self.0.alloc_texture_slot(view)
            }

            fn destroy_image(&mut self, image: ImageHandle) {
                self.0.destroy_image(image)
            }
        }

        let mut uploader = FailingViews(HeadlessUploader::new());
        let result = upload_atlas(&mut uploader, "broken", cpu_atlas(2));

        assert_eq!(result.unwrap_err(), UploadError::OutOfMemory);
        assert_eq!(uploader.0.num_images(), 0);
        assert_eq!(
            FontLoadError::from(UploadError::OutOfMemory),
            FontLoadError::OutOfMemory
        );
    }

    #[test]
    fn test_short_buffer_rejected() {
        let mut uploader = HeadlessUploader::new();
        let mut atlas = cpu_atlas(2);
        atlas.channels.truncate(100);

        let result = upload_atlas(&mut uploader, "short", atlas);
        assert!(matches!(result, Err(UploadError::Backend(_))));
        assert_eq!(uploader.num_images(), 0);
    }

    #[test]
    fn test_destroy_releases_views() {
        let mut uploader = HeadlessUploader::new();
        let atlas = upload_atlas(&mut uploader, "gone", cpu_atlas(1)).unwrap();
        uploader.destroy_image(atlas.image);

        assert!(uploader.image(atlas.image).is_none());
        assert!(uploader.view_pixels(atlas.views[0]).is_none());
    }
}
