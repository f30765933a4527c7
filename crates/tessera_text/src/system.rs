//! Font system
//!
//! Owns the layout engine, the loaded fonts and the load pipeline. Loading a
//! font runs in three stages:
//!
//! 1. worker: read and decode the font file
//! 2. worker: rasterize and pack the glyph atlas
//! 3. main: upload the atlas and register the font
//!
//! Each stage schedules the next on completion; the last resolves the
//! [`FontLoad`] returned to the caller. Main-thread stages only run from
//! [`FontSystem::run_main_tasks`].

use crate::atlas::{AtlasBuilder, CpuFontAtlas};
use crate::bidi::{BidiOracle, UnicodeBidiOracle};
use crate::config::{AtlasConfig, ConfigError, FontSystemConfig};
use crate::font::{FontDecoder, FontFace, FontId, TtfDecoder};
use crate::hit::TextHit;
use crate::layout::{FontLookup, TextBlock, TextLayout, TextLayoutEngine};
use crate::rasterizer::{GlyphRasterizer, SwashRasterizer};
use crate::scheduler::{Scheduler, SchedulerHandle};
use crate::script::{ScriptOracle, UnicodeScriptOracle};
use crate::shaper::{RustybuzzShaper, ShapingOracle};
use crate::upload::{upload_atlas, GpuFontAtlas, GpuUploader};
use crate::{FontLoadError, Result};
use slotmap::SlotMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Where font data comes from
#[derive(Debug, Clone)]
pub enum FontSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// A loaded font: its decoded face and uploaded atlas
#[derive(Debug)]
pub struct Font {
    pub face: Arc<FontFace>,
    pub atlas: GpuFontAtlas,
}

impl FontLookup for SlotMap<FontId, Font> {
    fn face(&self, id: FontId) -> Option<&FontFace> {
        self.get(id).map(|f| f.face.as_ref())
    }
}

type LoadResult = std::result::Result<FontId, FontLoadError>;

/// Pending font load.
///
/// Resolves once the main thread has run the upload stage. Await it, or poll
/// it from a frame loop with [`try_take`](Self::try_take).
#[derive(Debug)]
pub struct FontLoad {
    rx: oneshot::Receiver<LoadResult>,
}

impl FontLoad {
    /// Take the result if the load has finished. The result is returned once;
    /// later calls report [`FontLoadError::Interrupted`].
    pub fn try_take(&mut self) -> Option<LoadResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(FontLoadError::Interrupted)),
        }
    }
}

impl Future for FontLoad {
    type Output = LoadResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(FontLoadError::Interrupted)))
    }
}

/// Fonts and the GPU resources behind them, owned by the main thread
pub struct FontRegistry {
    fonts: SlotMap<FontId, Font>,
    uploader: Box<dyn GpuUploader>,
}

impl FontRegistry {
    fn install(&mut self, face: Arc<FontFace>, atlas: CpuFontAtlas) -> LoadResult {
        let atlas = upload_atlas(self.uploader.as_mut(), face.label(), atlas)?;
        let label = face.label().to_string();
        let layers = atlas.num_layers();
        let glyphs = atlas.glyphs.len();
        let id = self.fonts.insert(Font { face, atlas });

        tracing::info!(
            "Loaded font {} as {:?}: {} glyphs, {} atlas layer(s)",
            label,
            id,
            glyphs,
            layers
        );
        Ok(id)
    }

    fn remove(&mut self, id: FontId) -> bool {
        match self.fonts.remove(id) {
            Some(font) => {
                self.uploader.destroy_image(font.atlas.image);
                true
            }
            None => false,
        }
    }
}

/// One font load moving through the pipeline
struct LoadJob {
    label: String,
    pixel_height: u32,
    face_index: u32,
    decoder: Arc<dyn FontDecoder>,
    rasterizer: Arc<dyn GlyphRasterizer>,
    atlas: AtlasConfig,
    scheduler: SchedulerHandle<FontRegistry>,
    done: oneshot::Sender<LoadResult>,
}

impl LoadJob {
    fn decode(self, source: FontSource) {
        let result = read_source(source)
            .and_then(|data| self.decoder.decode(&self.label, Arc::new(data), self.face_index));

        match result {
            Ok(face) => {
                tracing::debug!(
                    "Decoded font {} ({} glyphs)",
                    self.label,
                    face.glyph_count()
                );
                let scheduler = self.scheduler.clone();
                let face = Arc::new(face);
                scheduler.spawn_worker(move || self.rasterize(face));
            }
            Err(err) => self.fail(err),
        }
    }

    fn rasterize(self, face: Arc<FontFace>) {
        let result = AtlasBuilder::new(self.rasterizer.as_ref(), self.atlas).build(&face, self.pixel_height);

        match result {
            Ok(atlas) => {
                tracing::debug!(
                    "Rasterized font {} @{}px into {} layer(s)",
                    self.label,
                    self.pixel_height,
                    atlas.num_layers
                );
                let scheduler = self.scheduler.clone();
                scheduler.spawn_main(move |registry: &mut FontRegistry| {
                    self.upload(registry, face, atlas)
                });
            }
            Err(err) => self.fail(err),
        }
    }

    fn upload(self, registry: &mut FontRegistry, face: Arc<FontFace>, atlas: CpuFontAtlas) {
        match registry.install(face, atlas) {
            Ok(id) => self.finish(Ok(id)),
            Err(err) => self.fail(err),
        }
    }

    fn fail(self, err: FontLoadError) {
        tracing::warn!("Failed to load font {}: {}", self.label, err);
        self.finish(Err(err));
    }

    fn finish(self, result: LoadResult) {
        if self.done.send(result).is_err() {
            tracing::debug!("Load of font {} was abandoned", self.label);
        }
    }
}

fn read_source(source: FontSource) -> std::result::Result<Vec<u8>, FontLoadError> {
    match source {
        FontSource::Bytes(bytes) => Ok(bytes),
        FontSource::Path(path) => std::fs::read(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => FontLoadError::InvalidPath(path.display().to_string()),
            _ => FontLoadError::Io(format!("{}: {}", path.display(), err)),
        }),
    }
}

/// Configures the services a [`FontSystem`] is built from
pub struct FontSystemBuilder {
    config: FontSystemConfig,
    scripts: Box<dyn ScriptOracle>,
    bidi: Box<dyn BidiOracle>,
    shaper: Box<dyn ShapingOracle>,
    decoder: Arc<dyn FontDecoder>,
    rasterizer: Arc<dyn GlyphRasterizer>,
}

impl Default for FontSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FontSystemBuilder {
    /// Builder with the default Unicode, rustybuzz, ttf-parser and swash services
    pub fn new() -> Self {
        Self {
            config: FontSystemConfig::default(),
            scripts: Box::new(UnicodeScriptOracle),
            bidi: Box::new(UnicodeBidiOracle),
            shaper: Box::new(RustybuzzShaper),
            decoder: Arc::new(TtfDecoder),
            rasterizer: Arc::new(SwashRasterizer::new()),
        }
    }

    pub fn config(mut self, config: FontSystemConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_scripts(mut self, scripts: impl ScriptOracle + 'static) -> Self {
        self.scripts = Box::new(scripts);
        self
    }

    pub fn with_bidi(mut self, bidi: impl BidiOracle + 'static) -> Self {
        self.bidi = Box::new(bidi);
        self
    }

    pub fn with_shaper(mut self, shaper: impl ShapingOracle + 'static) -> Self {
        self.shaper = Box::new(shaper);
        self
    }

    pub fn with_decoder(mut self, decoder: impl FontDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: impl GlyphRasterizer + 'static) -> Self {
        self.rasterizer = Arc::new(rasterizer);
        self
    }

    pub fn build(
        self,
        uploader: Box<dyn GpuUploader>,
    ) -> std::result::Result<FontSystem, ConfigError> {
        self.config.validate()?;
        let scheduler = Scheduler::new(self.config.worker_threads).map_err(ConfigError::Runtime)?;

        Ok(FontSystem {
            engine: TextLayoutEngine::new(self.scripts, self.bidi, self.shaper),
            scheduler,
            registry: FontRegistry {
                fonts: SlotMap::with_key(),
                uploader,
            },
            decoder: self.decoder,
            rasterizer: self.rasterizer,
            config: self.config,
        })
    }
}

/// Text layout and font loading front end
pub struct FontSystem {
    engine: TextLayoutEngine,
    scheduler: Scheduler<FontRegistry>,
    registry: FontRegistry,
    decoder: Arc<dyn FontDecoder>,
    rasterizer: Arc<dyn GlyphRasterizer>,
    config: FontSystemConfig,
}

impl FontSystem {
    /// Font system with the default services and configuration
    pub fn new(uploader: Box<dyn GpuUploader>) -> std::result::Result<Self, ConfigError> {
        FontSystemBuilder::new().build(uploader)
    }

    pub fn builder() -> FontSystemBuilder {
        FontSystemBuilder::new()
    }

    pub fn config(&self) -> &FontSystemConfig {
        &self.config
    }

    /// Start loading face `face_index` of `source`, rasterized at
    /// `pixel_height` pixels per em
    pub fn load_font(
        &self,
        label: impl Into<String>,
        source: FontSource,
        pixel_height: u32,
        face_index: u32,
    ) -> FontLoad {
        let (done, rx) = oneshot::channel();
        let job = LoadJob {
            label: label.into(),
            pixel_height,
            face_index,
            decoder: self.decoder.clone(),
            rasterizer: self.rasterizer.clone(),
            atlas: self.config.atlas,
            scheduler: self.scheduler.handle(),
            done,
        };

        tracing::debug!("Loading font {} @{}px", job.label, pixel_height);
        self.scheduler.spawn_worker(move || job.decode(source));

        FontLoad { rx }
    }

    /// Run pending main-thread stages. Call once per frame.
    pub fn run_main_tasks(&mut self) -> usize {
        self.scheduler.run_main_tasks(&mut self.registry)
    }

    /// Block until `load` resolves, running main-thread stages meanwhile
    pub fn wait_for(&mut self, mut load: FontLoad) -> LoadResult {
        loop {
            self.run_main_tasks();
            if let Some(result) = load.try_take() {
                return result;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn font(&self, id: FontId) -> Option<&Font> {
        self.registry.fonts.get(id)
    }

    pub fn font_by_label(&self, label: &str) -> Option<FontId> {
        self.registry
            .fonts
            .iter()
            .find(|(_, font)| font.face.label() == label)
            .map(|(id, _)| id)
    }

    pub fn fonts(&self) -> impl Iterator<Item = (FontId, &Font)> {
        self.registry.fonts.iter()
    }

    /// Unload a font and release its atlas. Returns false if it wasn't loaded.
    pub fn unload(&mut self, id: FontId) -> bool {
        self.registry.remove(id)
    }

    /// Lay out `block` into `layout`. Blocks without a language use the
    /// configured default.
    pub fn layout_text(
        &mut self,
        block: &TextBlock<'_>,
        max_width: f32,
        layout: &mut TextLayout,
    ) -> Result<()> {
        let mut block = *block;
        if block.language.is_none() {
            block.language = self.config.layout.default_language.as_deref();
        }
        self.engine
            .layout_text(&block, max_width, &self.registry.fonts, layout)
    }

    pub fn hit_text(
        &self,
        layout: &TextLayout,
        align_width: f32,
        alignment: f32,
        pos: [f32; 2],
    ) -> TextHit {
        layout.hit(align_width, alignment, pos)
    }
}

impl Drop for FontSystem {
    fn drop(&mut self) {
        let FontRegistry { fonts, uploader } = &mut self.registry;
        for (_, font) in fonts.drain() {
            uploader.destroy_image(font.atlas.image);
        }
    }
}
