//! Tessera CLI
//!
//! Lay out text with a font file and inspect the glyph atlases Tessera builds.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_text::{
    AtlasBuilder, CpuFontAtlas, FontDecoder, FontSource, FontStyle, FontSystem, FontSystemConfig,
    HeadlessUploader, SwashRasterizer, TextBlock, TextDirection, TextLayout, TtfDecoder,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tessera text layout and glyph atlas tool", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (tessera.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lay out text and print its paragraphs, lines and runs
    Layout {
        /// Font file
        font: PathBuf,

        /// Text to lay out
        text: String,

        /// Font height in pixels
        #[arg(short, long, default_value = "16")]
        size: f32,

        /// Maximum line width in pixels
        #[arg(short, long, default_value = "400")]
        width: f32,

        /// Face index within a font collection
        #[arg(long, default_value = "0")]
        face: u32,

        /// Right-to-left base direction
        #[arg(long)]
        rtl: bool,

        /// Disable line wrapping
        #[arg(long)]
        no_wrap: bool,

        /// Hit test a point (x y) against the layout
        #[arg(long, num_args = 2, value_names = ["X", "Y"])]
        hit: Option<Vec<f32>>,
    },

    /// Build a glyph atlas and write each layer as a PNG
    Atlas {
        /// Font file
        font: PathBuf,

        /// Glyph height in pixels
        #[arg(short, long, default_value = "32")]
        size: u32,

        /// Face index within a font collection
        #[arg(long, default_value = "0")]
        face: u32,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => FontSystemConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => FontSystemConfig::default(),
    };

    match cli.command {
        Commands::Layout {
            font,
            text,
            size,
            width,
            face,
            rtl,
            no_wrap,
            hit,
        } => cmd_layout(
            config,
            &font,
            &text,
            LayoutOptions {
                size,
                width,
                face,
                rtl,
                wrap: !no_wrap,
                hit: hit.map(|p| [p[0], p[1]]),
            },
        ),

        Commands::Atlas {
            font,
            size,
            face,
            output,
        } => cmd_atlas(&config, &font, size, face, &output),
    }
}

struct LayoutOptions {
    size: f32,
    width: f32,
    face: u32,
    rtl: bool,
    wrap: bool,
    hit: Option<[f32; 2]>,
}

fn cmd_layout(config: FontSystemConfig, font: &Path, text: &str, options: LayoutOptions) -> Result<()> {
    let mut system = FontSystem::builder()
        .config(config)
        .build(Box::new(HeadlessUploader::new()))
        .context("Failed to create font system")?;

    let label = font.display().to_string();
    let load = system.load_font(
        label.clone(),
        FontSource::Path(font.to_path_buf()),
        options.size.ceil() as u32,
        options.face,
    );
    let id = system
        .wait_for(load)
        .with_context(|| format!("Failed to load font {}", label))?;

    let chars: Vec<char> = text.chars().collect();
    let styles = [FontStyle::new(id, options.size)];
    let run_ends = [chars.len()];
    let mut block = TextBlock::new(&chars, &run_ends, &styles);
    block.wrap = options.wrap;
    if options.rtl {
        block.direction = TextDirection::RightToLeft;
    }

    let mut layout = TextLayout::new();
    system
        .layout_text(&block, options.width, &mut layout)
        .context("Failed to lay out text")?;

    print_layout(&layout, &chars);

    if let Some(pos) = options.hit {
        let hit = system.hit_text(&layout, options.width, -1.0, pos);
        println!(
            "hit ({}, {}): caret {} cluster {} line {} column {}",
            pos[0], pos[1], hit.caret, hit.cluster, hit.line, hit.column
        );
    }

    Ok(())
}

fn print_layout(layout: &TextLayout, chars: &[char]) {
    println!(
        "extent {:.1}x{:.1}, {} paragraph(s), {} line(s), {} caret(s)",
        layout.extent[0],
        layout.extent[1],
        layout.paragraphs.len(),
        layout.lines.len(),
        layout.num_carets
    );

    for (p, paragraph) in layout.paragraphs.iter().enumerate() {
        println!("paragraph {} codepoints {:?}", p, paragraph.codepoints);

        for l in paragraph.lines.clone() {
            let line = &layout.lines[l];
            println!(
                "  line {} codepoints {:?} carets {:?} width {:.1} height {:.1} {:?}",
                l,
                line.codepoints,
                line.carets,
                line.metrics.width,
                line.metrics.height,
                line.metrics.direction()
            );

            for run in layout.line_runs(line) {
                let text: String = chars[run.codepoints.clone()].iter().collect();
                println!(
                    "    run {:?} level {} {:?} {} glyph(s) {:?}",
                    text,
                    run.level,
                    run.kind,
                    run.glyphs.len(),
                    run.codepoints
                );
            }
        }
    }
}

fn cmd_atlas(config: &FontSystemConfig, font: &Path, size: u32, face: u32, output: &Path) -> Result<()> {
    let data = fs::read(font).with_context(|| format!("Failed to read {}", font.display()))?;
    let label = font.display().to_string();
    let face = TtfDecoder
        .decode(&label, Arc::new(data), face)
        .with_context(|| format!("Failed to decode {}", label))?;

    info!(
        "Building atlas for {} {} ({} glyphs) at {}px",
        face.family_name(),
        face.style_name(),
        face.glyph_count(),
        size
    );

    let rasterizer = SwashRasterizer::new();
    let atlas = AtlasBuilder::new(&rasterizer, config.atlas)
        .build(&face, size)
        .context("Failed to build atlas")?;

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    for layer in 0..atlas.num_layers {
        let path = output.join(format!("atlas_layer_{}.png", layer));
        write_layer(&atlas, layer, &path)?;
        info!("Wrote {}", path.display());
    }

    let color = atlas.glyphs.iter().filter(|g| g.has_color).count();
    info!(
        "{} layer(s) of {}x{}, {} color glyph(s)",
        atlas.num_layers, atlas.extent[0], atlas.extent[1], color
    );

    Ok(())
}

/// Write one BGRA layer as an RGBA PNG
fn write_layer(atlas: &CpuFontAtlas, layer: u32, path: &Path) -> Result<()> {
    let mut pixels = atlas.layer(layer).to_vec();
    for pixel in pixels.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }

    let image = image::RgbaImage::from_raw(atlas.extent[0], atlas.extent[1], pixels)
        .context("Atlas layer size mismatch")?;
    image
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
