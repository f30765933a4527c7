//! Tessera GPU atlas upload
//!
//! [`WgpuUploader`] implements the glyph atlas upload service on wgpu: each
//! atlas becomes one `D2` array texture with a view per layer, and every view
//! is bound to a slot in a texture table the renderer indexes by
//! [`TextureSlot`].

use slotmap::{new_key_type, Key, KeyData, SlotMap};
use std::sync::Arc;
use tessera_text::{
    AtlasFormat, CopyRegion, GpuUploader, ImageHandle, TextureSlot, UploadError, ViewHandle,
};

new_key_type! {
    struct ImageKey;
    struct ViewKey;
}

fn image_key(handle: ImageHandle) -> ImageKey {
    ImageKey::from(KeyData::from_ffi(handle.0))
}

fn view_key(handle: ViewHandle) -> ViewKey {
    ViewKey::from(KeyData::from_ffi(handle.0))
}

/// Error creating a headless device
#[derive(Debug)]
pub enum GpuError {
    /// Failed to request GPU adapter
    AdapterNotFound,
    /// Failed to request GPU device
    DeviceError(wgpu::RequestDeviceError),
}

impl std::fmt::Display for GpuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuError::AdapterNotFound => write!(f, "No suitable GPU adapter found"),
            GpuError::DeviceError(e) => write!(f, "Failed to request GPU device: {}", e),
        }
    }
}

impl std::error::Error for GpuError {}

struct AtlasImage {
    texture: wgpu::Texture,
    extent: [u32; 2],
    layers: u32,
}

struct LayerView {
    image: ImageKey,
    view: wgpu::TextureView,
}

/// Glyph atlas uploader backed by a wgpu device
pub struct WgpuUploader {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    images: SlotMap<ImageKey, AtlasImage>,
    views: SlotMap<ViewKey, LayerView>,
    /// Texture table; `None` marks a released slot
    slots: Vec<Option<ViewKey>>,
    free_slots: Vec<u32>,
}

impl WgpuUploader {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            images: SlotMap::with_key(),
            views: SlotMap::with_key(),
            slots: Vec::new(),
            free_slots: Vec::new(),
        }
    }

    /// Uploader on a device without a surface
    pub async fn headless() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::AdapterNotFound)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Tessera Atlas Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceError)?;

        Ok(Self::new(Arc::new(device), Arc::new(queue)))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// View bound to `slot`
    pub fn texture_view(&self, slot: TextureSlot) -> Option<&wgpu::TextureView> {
        let key = (*self.slots.get(slot.0 as usize)?)?;
        self.views.get(key).map(|v| &v.view)
    }

    /// Texture behind `image`
    pub fn texture(&self, image: ImageHandle) -> Option<&wgpu::Texture> {
        self.images.get(image_key(image)).map(|i| &i.texture)
    }

    /// Run `f` inside out-of-memory and validation error scopes
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device, &wgpu::Queue) -> T) -> Result<T, UploadError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let value = f(&self.device, &self.queue);

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        if out_of_memory.is_some() {
            return Err(UploadError::OutOfMemory);
        }
        if let Some(err) = validation {
            return Err(UploadError::Backend(err.to_string()));
        }
        Ok(value)
    }

    fn texture_format(format: AtlasFormat) -> wgpu::TextureFormat {
        match format {
            AtlasFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        }
    }
}

impl GpuUploader for WgpuUploader {
    fn create_image(
        &mut self,
        label: &str,
        format: AtlasFormat,
        extent: [u32; 2],
        layers: u32,
    ) -> Result<ImageHandle, UploadError> {
        let limits = self.device.limits();
        if extent[0] == 0
            || extent[1] == 0
            || extent[0] > limits.max_texture_dimension_2d
            || extent[1] > limits.max_texture_dimension_2d
            || layers == 0
            || layers > limits.max_texture_array_layers
        {
            return Err(UploadError::Backend(format!(
                "Atlas {}x{}x{} exceeds device limits",
                extent[0], extent[1], layers
            )));
        }

        let texture = self.scoped(|device, _| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: extent[0],
                    height: extent[1],
                    depth_or_array_layers: layers,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::texture_format(format),
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })?;

        let key = self.images.insert(AtlasImage {
            texture,
            extent,
            layers,
        });
        tracing::debug!("Created atlas texture {} ({}x{}x{})", label, extent[0], extent[1], layers);
        Ok(ImageHandle(key.data().as_ffi()))
    }

    fn create_image_view(
        &mut self,
        image: ImageHandle,
        layer: u32,
    ) -> Result<ViewHandle, UploadError> {
        let key = image_key(image);
        let target = self
            .images
            .get(key)
            .ok_or_else(|| UploadError::Backend(format!("Unknown image {:?}", image)))?;
        if layer >= target.layers {
            return Err(UploadError::Backend(format!(
                "Layer {} out of range for {:?}",
                layer, image
            )));
        }

        let view = target.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Glyph Atlas Layer"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        });

        let view = self.views.insert(LayerView { image: key, view });
        Ok(ViewHandle(view.data().as_ffi()))
    }

    fn upload_pixels(
        &mut self,
        image: ImageHandle,
        pixels: &[u8],
        regions: &[CopyRegion],
    ) -> Result<(), UploadError> {
        let target = self
            .images
            .get(image_key(image))
            .ok_or_else(|| UploadError::Backend(format!("Unknown image {:?}", image)))?;

        for region in regions {
            let size = tessera_text::upload::atlas_row_pitch(region.extent) * region.extent[1] as usize;
            if region.layer >= target.layers
                || region.extent[0] > target.extent[0]
                || region.extent[1] > target.extent[1]
                || region.buffer_offset + size > pixels.len()
            {
                return Err(UploadError::Backend(format!(
                    "Invalid copy region {:?}",
                    region
                )));
            }
        }

        self.scoped(|_, queue| {
            for region in regions {
                queue.write_texture(
                    wgpu::ImageCopyTexture {
                        texture: &target.texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d {
                            x: 0,
                            y: 0,
                            z: region.layer,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    pixels,
                    wgpu::ImageDataLayout {
                        offset: region.buffer_offset as u64,
                        bytes_per_row: Some(
                            tessera_text::upload::atlas_row_pitch(region.extent) as u32,
                        ),
                        rows_per_image: Some(region.extent[1]),
                    },
                    wgpu::Extent3d {
                        width: region.extent[0],
                        height: region.extent[1],
                        depth_or_array_layers: 1,
                    },
                );
            }
        })
    }

    fn alloc_texture_slot(&mut self, view: ViewHandle) -> Result<TextureSlot, UploadError> {
        let key = view_key(view);
        if !self.views.contains_key(key) {
            return Err(UploadError::Backend(format!("Unknown view {:?}", view)));
        }

        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(key);
                slot
            }
            None => {
                self.slots
                    .try_reserve(1)
                    .map_err(|_| UploadError::OutOfMemory)?;
                self.slots.push(Some(key));
                (self.slots.len() - 1) as u32
            }
        };

        Ok(TextureSlot(slot))
    }

    fn destroy_image(&mut self, image: ImageHandle) {
        let key = image_key(image);
        let Some(target) = self.images.remove(key) else {
            return;
        };

        self.views.retain(|_, v| v.image != key);
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_some_and(|view| !self.views.contains_key(view)) {
                *slot = None;
                self.free_slots.push(i as u32);
            }
        }

        target.texture.destroy();
        tracing::debug!("Destroyed atlas texture {:?}", image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_text::upload::upload_atlas;
    use tessera_text::{AtlasGlyph, CpuFontAtlas};

    fn uploader() -> Option<WgpuUploader> {
        match pollster::block_on(WgpuUploader::headless()) {
            Ok(uploader) => Some(uploader),
            Err(err) => {
                println!("{} - skipping test", err);
                None
            }
        }
    }

    fn cpu_atlas(layers: u32) -> CpuFontAtlas {
        CpuFontAtlas {
            font_height: 16,
            extent: [64, 64],
            num_layers: layers,
            glyphs: vec![AtlasGlyph::default()],
            channels: vec![0x80; 64 * 64 * 4 * layers as usize],
        }
    }

    #[test]
    fn test_upload_array_texture() {
        let Some(mut uploader) = uploader() else {
            return;
        };

        let atlas = upload_atlas(&mut uploader, "test", cpu_atlas(3)).unwrap();
        assert_eq!(atlas.num_layers(), 3);

        let texture = uploader.texture(atlas.image).unwrap();
        assert_eq!(texture.depth_or_array_layers(), 3);
        assert_eq!(texture.format(), wgpu::TextureFormat::Bgra8Unorm);

        for slot in &atlas.textures {
            assert!(uploader.texture_view(*slot).is_some());
        }
    }

    #[test]
    fn test_destroy_frees_slots() {
        let Some(mut uploader) = uploader() else {
            return;
        };

        let first = upload_atlas(&mut uploader, "first", cpu_atlas(2)).unwrap();
        uploader.destroy_image(first.image);
        assert!(uploader.texture(first.image).is_none());
        assert!(uploader.texture_view(first.textures[0]).is_none());

        let second = upload_atlas(&mut uploader, "second", cpu_atlas(2)).unwrap();
        let mut reused: Vec<_> = second.textures.iter().map(|s| s.0).collect();
        reused.sort_unstable();
        let mut freed: Vec<_> = first.textures.iter().map(|s| s.0).collect();
        freed.sort_unstable();
        assert_eq!(reused, freed);
    }

    #[test]
    fn test_oversized_image_rejected() {
        let Some(mut uploader) = uploader() else {
            return;
        };

        let max = uploader.device().limits().max_texture_dimension_2d;
        let result = uploader.create_image("huge", AtlasFormat::Bgra8Unorm, [max + 1, 64], 1);
        assert!(matches!(result, Err(UploadError::Backend(_))));
    }
}
