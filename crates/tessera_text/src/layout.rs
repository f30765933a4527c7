//! Text layout
//!
//! Turns a [`TextBlock`] into a [`TextLayout`]: codepoints are segmented,
//! grouped into runs, shaped, and broken into lines whose runs are stored in
//! visual order. All layout data lives in flat vectors referenced by ranges.

use crate::bidi::{level_to_direction, reorder_visual, BidiOracle, TextDirection};
use crate::font::{FontFace, FontId};
use crate::script::{ScriptOracle, ScriptTag};
use crate::segment::{Segment, Segmenter};
use crate::shaper::{GlyphInfo, GlyphPosition, ShapeRequest, ShapingOracle};
use crate::{au_to_px, Result, TextError};
use slotmap::SlotMap;
use std::ops::Range;
use std::sync::Arc;

/// Styling of one style run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontStyle {
    pub font: FontId,
    /// Font height in pixels, before the block's `font_scale`
    pub height: f32,
    /// Line height relative to the font height, at least 1
    pub line_height: f32,
    /// Extra spacing after each word, in pixels
    pub word_spacing: f32,
}

impl FontStyle {
    pub fn new(font: FontId, height: f32) -> Self {
        Self {
            font,
            height,
            line_height: 1.0,
            word_spacing: 0.0,
        }
    }
}

/// Text to lay out with its style runs
#[derive(Debug, Clone, Copy)]
pub struct TextBlock<'a> {
    pub text: &'a [char],
    /// Run-end encoded style boundaries: style `i` covers
    /// `[run_ends[i - 1], run_ends[i])`. The last end must cover the text.
    pub run_ends: &'a [usize],
    /// One style per run
    pub fonts: &'a [FontStyle],
    pub font_scale: f32,
    /// Base direction for paragraphs without a strong character
    pub direction: TextDirection,
    /// BCP-47 language tag
    pub language: Option<&'a str>,
    /// Break lines at `max_width`
    pub wrap: bool,
    pub use_kerning: bool,
    pub use_ligatures: bool,
}

impl<'a> TextBlock<'a> {
    pub fn new(text: &'a [char], run_ends: &'a [usize], fonts: &'a [FontStyle]) -> Self {
        Self {
            text,
            run_ends,
            fonts,
            font_scale: 1.0,
            direction: TextDirection::LeftToRight,
            language: None,
            wrap: true,
            use_kerning: true,
            use_ligatures: true,
        }
    }
}

/// A shaped glyph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlyphShape {
    /// Glyph ID in the font
    pub glyph: u32,
    /// Index of the first codepoint of this glyph's cluster in the text
    pub cluster: usize,
    /// Horizontal advance in app units
    pub advance: i32,
    /// Offset from the pen position in app units (y grows downwards)
    pub offset: [i32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunKind {
    #[default]
    Char,
    WhiteSpace,
    Tab,
}

/// Run metrics in app units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMetrics {
    pub ascent: i32,
    pub descent: i32,
    pub advance: i32,
}

impl RunMetrics {
    pub fn resolve(&self, font_height: f32) -> ResolvedMetrics {
        ResolvedMetrics {
            ascent: au_to_px(self.ascent, font_height),
            descent: au_to_px(self.descent, font_height),
            advance: au_to_px(self.advance, font_height),
        }
    }
}

/// Run metrics in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResolvedMetrics {
    pub ascent: f32,
    pub descent: f32,
    pub advance: f32,
}

impl ResolvedMetrics {
    pub fn height(&self) -> f32 {
        self.ascent + self.descent
    }
}

/// Codepoints sharing style, script and level, not crossing a wrap point
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub codepoints: Range<usize>,
    /// Index into the block's font styles
    pub style: usize,
    pub font_height: f32,
    pub line_height: f32,
    pub word_spacing: f32,
    pub glyphs: Range<usize>,
    pub metrics: RunMetrics,
    pub base_level: u8,
    pub level: u8,
    /// A line may start with this run
    pub wrappable: bool,
    pub kind: RunKind,
}

impl TextRun {
    pub fn direction(&self) -> TextDirection {
        level_to_direction(self.level)
    }

    /// Spaces and tabs don't receive word spacing
    pub fn is_spacing(&self) -> bool {
        self.kind != RunKind::Char
    }

    /// Advance including word spacing, in pixels
    pub fn width(&self, font_scale: f32) -> f32 {
        let metrics = self.metrics.resolve(font_scale * self.font_height);
        if self.is_spacing() {
            metrics.advance
        } else {
            metrics.advance + font_scale * self.word_spacing
        }
    }

    /// Height of the line box this run needs, in pixels
    pub fn line_box(&self, font_scale: f32) -> f32 {
        let font_height = font_scale * self.font_height;
        let metrics = self.metrics.resolve(font_height);
        (font_height * self.line_height).max(metrics.height())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LineMetrics {
    pub width: f32,
    pub height: f32,
    pub ascent: f32,
    pub descent: f32,
    /// Paragraph embedding level
    pub base_level: u8,
}

impl LineMetrics {
    pub fn direction(&self) -> TextDirection {
        level_to_direction(self.base_level)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Line {
    pub codepoints: Range<usize>,
    /// One caret before each codepoint plus one trailing
    pub carets: Range<usize>,
    /// Runs in visual order
    pub runs: Range<usize>,
    pub metrics: LineMetrics,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Paragraph {
    pub runs: Range<usize>,
    pub codepoints: Range<usize>,
    /// The line break sequence ending the paragraph, if any
    pub break_codepoints: Range<usize>,
    pub lines: Range<usize>,
}

/// Laid out text. Reused across layout calls: cleared, not freed.
#[derive(Debug, Clone, Default)]
pub struct TextLayout {
    pub glyphs: Vec<GlyphShape>,
    pub runs: Vec<TextRun>,
    pub lines: Vec<Line>,
    pub paragraphs: Vec<Paragraph>,
    pub max_width: f32,
    pub font_scale: f32,
    pub extent: [f32; 2],
    pub num_carets: usize,
    pub num_codepoints: usize,
}

impl TextLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.glyphs.clear();
        self.runs.clear();
        self.lines.clear();
        self.paragraphs.clear();
        self.max_width = 0.0;
        self.font_scale = 1.0;
        self.extent = [0.0, 0.0];
        self.num_carets = 0;
        self.num_codepoints = 0;
    }

    pub fn line_runs(&self, line: &Line) -> &[TextRun] {
        &self.runs[line.runs.clone()]
    }

    pub fn run_glyphs(&self, run: &TextRun) -> &[GlyphShape] {
        &self.glyphs[run.glyphs.clone()]
    }
}

/// Resolves font handles referenced by style runs
pub trait FontLookup {
    fn face(&self, id: FontId) -> Option<&FontFace>;
}

impl FontLookup for SlotMap<FontId, Arc<FontFace>> {
    fn face(&self, id: FontId) -> Option<&FontFace> {
        self.get(id).map(|f| f.as_ref())
    }
}

/// Lays out text blocks, owning the oracles and the scratch buffers reused
/// between calls
pub struct TextLayoutEngine {
    scripts: Box<dyn ScriptOracle>,
    bidi: Box<dyn BidiOracle>,
    shaper: Box<dyn ShapingOracle>,
    segments: Vec<Segment>,
    script_scratch: Vec<ScriptTag>,
    infos: Vec<GlyphInfo>,
    positions: Vec<GlyphPosition>,
}

impl TextLayoutEngine {
    pub fn new(
        scripts: Box<dyn ScriptOracle>,
        bidi: Box<dyn BidiOracle>,
        shaper: Box<dyn ShapingOracle>,
    ) -> Self {
        Self {
            scripts,
            bidi,
            shaper,
            segments: Vec::new(),
            script_scratch: Vec::new(),
            infos: Vec::new(),
            positions: Vec::new(),
        }
    }

    /// Lay out `block` into `layout`, breaking lines at `max_width`.
    ///
    /// On error the layout is left cleared.
    pub fn layout_text(
        &mut self,
        block: &TextBlock<'_>,
        max_width: f32,
        fonts: &dyn FontLookup,
        layout: &mut TextLayout,
    ) -> Result<()> {
        layout.clear();

        let result = self.build(block, max_width, fonts, layout);

        if let Err(err) = &result {
            if matches!(err, TextError::OracleInconsistency { .. }) {
                tracing::error!("Aborting text layout: {}", err);
            } else {
                tracing::debug!("Text layout failed: {}", err);
            }
            layout.clear();
        }

        result
    }

    fn build(
        &mut self,
        block: &TextBlock<'_>,
        max_width: f32,
        fonts: &dyn FontLookup,
        layout: &mut TextLayout,
    ) -> Result<()> {
        layout.max_width = max_width;
        layout.font_scale = block.font_scale;

        if block.text.is_empty() {
            layout.num_carets = 1;
            return Ok(());
        }

        validate(block, fonts)?;

        Segmenter {
            scripts: self.scripts.as_ref(),
            bidi: self.bidi.as_ref(),
        }
        .segment(
            block.text,
            block.run_ends,
            block.direction,
            &mut self.segments,
            &mut self.script_scratch,
        )?;

        self.build_runs(block, fonts, layout)?;
        break_lines(block, max_width, layout);

        tracing::trace!(
            "Laid out {} codepoints: {} paragraphs, {} lines, {} runs, {} glyphs",
            layout.num_codepoints,
            layout.paragraphs.len(),
            layout.lines.len(),
            layout.runs.len(),
            layout.glyphs.len()
        );

        Ok(())
    }

    fn build_runs(
        &mut self,
        block: &TextBlock<'_>,
        fonts: &dyn FontLookup,
        layout: &mut TextLayout,
    ) -> Result<()> {
        let text = block.text;
        let len = text.len();
        let mut p = 0;

        loop {
            let paragraph_begin = p;
            while p < len && !self.segments[p].linebreak_begin {
                p += 1;
            }
            let paragraph_end = p;
            let runs_begin = layout.runs.len();
            let mut i = paragraph_begin;

            loop {
                let run_begin = i;
                let base = if run_begin < paragraph_end {
                    self.segments[run_begin]
                } else {
                    self.empty_paragraph_segment(paragraph_end, block.direction)
                };

                if i < paragraph_end {
                    i += 1;
                }

                if !base.is_wrap_point() {
                    while i < paragraph_end {
                        let next = &self.segments[i];
                        if next.style != base.style
                            || next.script != base.script
                            || next.level != base.level
                            || next.is_wrap_point()
                        {
                            break;
                        }
                        i += 1;
                    }
                }

                self.shape_run(
                    block,
                    fonts,
                    paragraph_begin..paragraph_end,
                    run_begin..i,
                    &base,
                    layout,
                )?;

                if i >= paragraph_end {
                    break;
                }
            }

            let break_begin = p;
            if p < len {
                p += 1;
            }
            while p < len && !self.segments[p].paragraph_begin {
                p += 1;
            }

            layout.paragraphs.push(Paragraph {
                runs: runs_begin..layout.runs.len(),
                codepoints: paragraph_begin..paragraph_end,
                break_codepoints: break_begin..p,
                lines: 0..0,
            });

            if p >= len {
                break;
            }
        }

        layout.num_codepoints = len;
        Ok(())
    }

    /// Stand-in segment for a paragraph with no codepoints, styled like the
    /// line break that ends it
    fn empty_paragraph_segment(&self, break_at: usize, direction: TextDirection) -> Segment {
        let source = self.segments.get(break_at).copied().unwrap_or_default();
        Segment {
            style: source.style,
            script: source.script,
            paragraph_begin: true,
            base_level: direction.base_level(),
            level: direction.base_level(),
            ..Default::default()
        }
    }

    fn shape_run(
        &mut self,
        block: &TextBlock<'_>,
        fonts: &dyn FontLookup,
        paragraph: Range<usize>,
        codepoints: Range<usize>,
        base: &Segment,
        layout: &mut TextLayout,
    ) -> Result<()> {
        let style = &block.fonts[base.style];
        let face = fonts
            .face(style.font)
            .ok_or(TextError::FontNotLoaded(style.font))?;

        let Self {
            shaper,
            infos,
            positions,
            ..
        } = self;

        infos.clear();
        positions.clear();

        if !codepoints.is_empty() {
            let request = ShapeRequest {
                paragraph: &block.text[paragraph.clone()],
                range: codepoints.start - paragraph.start..codepoints.end - paragraph.start,
                script: base.script,
                direction: level_to_direction(base.level),
                language: block.language,
                kerning: block.use_kerning,
                ligatures: block.use_ligatures,
            };
            shaper.shape(face, &request, infos, positions);
        }

        if infos.len() != positions.len() {
            return Err(TextError::OracleInconsistency {
                oracle: "shaping",
                expected: infos.len(),
                actual: positions.len(),
            });
        }

        layout
            .glyphs
            .try_reserve(infos.len())
            .map_err(|_| TextError::OutOfMemory)?;

        let first_glyph = layout.glyphs.len();
        let mut advance = 0;

        for (info, pos) in infos.iter().zip(positions.iter()) {
            layout.glyphs.push(GlyphShape {
                glyph: info.glyph_id,
                cluster: paragraph.start + info.cluster as usize,
                advance: pos.x_advance,
                offset: [pos.x_offset, -pos.y_offset],
            });
            advance += pos.x_advance;
        }

        let kind = if base.whitespace {
            RunKind::WhiteSpace
        } else if base.tab {
            RunKind::Tab
        } else {
            RunKind::Char
        };

        let metrics = face.metrics();
        layout.runs.push(TextRun {
            codepoints,
            style: base.style,
            font_height: style.height,
            line_height: style.line_height.max(1.0),
            word_spacing: style.word_spacing,
            glyphs: first_glyph..layout.glyphs.len(),
            metrics: RunMetrics {
                ascent: metrics.ascent,
                descent: metrics.descent,
                advance,
            },
            base_level: base.base_level,
            level: base.level,
            wrappable: base.wrappable,
            kind,
        });

        Ok(())
    }
}

fn validate(block: &TextBlock<'_>, fonts: &dyn FontLookup) -> Result<()> {
    let Some(&last) = block.run_ends.last() else {
        return Err(TextError::InvalidStyleRuns(
            "no style runs provided".to_string(),
        ));
    };

    if block.run_ends.len() != block.fonts.len() {
        return Err(TextError::InvalidStyleRuns(format!(
            "{} run ends for {} font styles",
            block.run_ends.len(),
            block.fonts.len()
        )));
    }

    if last < block.text.len() {
        return Err(TextError::InvalidStyleRuns(format!(
            "runs end at {} but text has {} codepoints",
            last,
            block.text.len()
        )));
    }

    if let Some(style) = block.fonts.iter().find(|s| fonts.face(s.font).is_none()) {
        return Err(TextError::FontNotLoaded(style.font));
    }

    Ok(())
}

/// Greedy line breaking per paragraph, then visual reordering of each line
fn break_lines(block: &TextBlock<'_>, max_width: f32, layout: &mut TextLayout) {
    let scale = block.font_scale;
    let mut extent = [0.0f32, 0.0];
    let mut caret = 0;

    for p in 0..layout.paragraphs.len() {
        let runs = layout.paragraphs[p].runs.clone();
        let lines_begin = layout.lines.len();
        let mut i = runs.start;

        while i < runs.end {
            let first = i;
            i += 1;

            let first_run = &layout.runs[first];
            let first_metrics = first_run.metrics.resolve(scale * first_run.font_height);
            let base_level = first_run.base_level;
            let mut width = first_run.width(scale);
            let mut height = first_run.line_box(scale);
            let mut ascent = first_metrics.ascent;
            let mut descent = first_metrics.descent;

            while i < runs.end {
                let run = &layout.runs[i];
                let advance = run.width(scale);

                if block.wrap && run.wrappable && width + advance > max_width {
                    break;
                }

                let metrics = run.metrics.resolve(scale * run.font_height);
                width += advance;
                ascent = ascent.max(metrics.ascent);
                descent = descent.max(metrics.descent);
                height = height.max(run.line_box(scale));
                i += 1;
            }

            let codepoints = layout.runs[first].codepoints.start..layout.runs[i - 1].codepoints.end;
            let num_carets = codepoints.len() + 1;

            layout.lines.push(Line {
                codepoints,
                carets: caret..caret + num_carets,
                runs: first..i,
                metrics: LineMetrics {
                    width,
                    height,
                    ascent,
                    descent,
                    base_level,
                },
            });

            reorder_visual(&mut layout.runs[first..i], |r| r.level);

            extent[0] = extent[0].max(width);
            extent[1] += height;
            caret += num_carets;
        }

        layout.paragraphs[p].lines = lines_begin..layout.lines.len();
    }

    layout.extent = extent;
    layout.num_carets = caret.max(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_engine, fake_fonts, FakeShaper, GLYPH_ADVANCE};

    fn layout(text: &str, max_width: f32, direction: TextDirection) -> TextLayout {
        let (fonts, id) = fake_fonts();
        let chars: Vec<char> = text.chars().collect();
        let styles = [FontStyle::new(id, 10.0)];
        let run_ends = [chars.len()];
        let mut block = TextBlock::new(&chars, &run_ends, &styles);
        block.direction = direction;

        let mut layout = TextLayout::new();
        fake_engine()
            .layout_text(&block, max_width, &fonts, &mut layout)
            .unwrap();
        layout
    }

    fn run_text(text: &str, run: &TextRun) -> String {
        text.chars()
            .skip(run.codepoints.start)
            .take(run.codepoints.len())
            .collect()
    }

    fn assert_runs_cover_paragraphs(layout: &TextLayout) {
        for paragraph in &layout.paragraphs {
            for line in &layout.lines[paragraph.lines.clone()] {
                let mut ranges: Vec<_> = layout.runs[line.runs.clone()]
                    .iter()
                    .map(|r| r.codepoints.clone())
                    .collect();
                ranges.sort_by_key(|r| r.start);
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start, "gap or overlap in {ranges:?}");
                }
                assert_eq!(ranges.first().unwrap().start, line.codepoints.start);
                assert_eq!(ranges.last().unwrap().end, line.codepoints.end);
            }

            let lines = &layout.lines[paragraph.lines.clone()];
            assert_eq!(lines.first().unwrap().codepoints.start, paragraph.codepoints.start);
            assert_eq!(lines.last().unwrap().codepoints.end, paragraph.codepoints.end);
            for pair in lines.windows(2) {
                assert_eq!(pair[0].codepoints.end, pair[1].codepoints.start);
            }
        }
    }

    #[test]
    fn test_empty_text() {
        let layout = layout("", 100.0, TextDirection::LeftToRight);
        assert!(layout.paragraphs.is_empty());
        assert!(layout.lines.is_empty());
        assert!(layout.runs.is_empty());
        assert!(layout.glyphs.is_empty());
        assert_eq!(layout.num_carets, 1);
        assert_eq!(layout.extent, [0.0, 0.0]);
    }

    #[test]
    fn test_empty_text_ignores_style_runs() {
        let (fonts, _) = fake_fonts();
        let block = TextBlock::new(&[], &[], &[]);
        let mut layout = TextLayout::new();
        fake_engine()
            .layout_text(&block, 10.0, &fonts, &mut layout)
            .unwrap();
        assert_eq!(layout.num_carets, 1);
    }

    #[test]
    fn test_single_word() {
        let layout = layout("hello", 1000.0, TextDirection::LeftToRight);
        assert_eq!(layout.paragraphs.len(), 1);
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(layout.runs.len(), 1);
        assert_eq!(layout.glyphs.len(), 5);
        assert_eq!(layout.num_carets, 6);
        assert_eq!(layout.num_codepoints, 5);

        let line = &layout.lines[0];
        assert_eq!(line.metrics.width, 5.0 * GLYPH_ADVANCE);
        assert_eq!(line.metrics.height, 10.0);
        assert_eq!(layout.extent, [5.0 * GLYPH_ADVANCE, 10.0]);
    }

    #[test]
    fn test_words_and_spaces_are_separate_runs() {
        let text = "ab  cd\tef";
        let layout = layout(text, 1000.0, TextDirection::LeftToRight);
        let runs: Vec<_> = layout
            .runs
            .iter()
            .map(|r| (run_text(text, r), r.kind))
            .collect();
        assert_eq!(
            runs,
            vec![
                ("ab".to_string(), RunKind::Char),
                (" ".to_string(), RunKind::WhiteSpace),
                (" ".to_string(), RunKind::WhiteSpace),
                ("cd".to_string(), RunKind::Char),
                ("\t".to_string(), RunKind::Tab),
                ("ef".to_string(), RunKind::Char),
            ]
        );
        assert!(layout.runs[3].wrappable);
        assert!(layout.runs[5].wrappable);
        assert!(!layout.runs[1].wrappable);
    }

    #[test]
    fn test_caret_count_per_line() {
        let layout = layout("one two three\n\nfour five", 30.0, TextDirection::LeftToRight);
        let mut expected_caret = 0;
        for line in &layout.lines {
            assert_eq!(line.carets.len(), line.codepoints.len() + 1);
            assert_eq!(line.carets.start, expected_caret);
            expected_caret = line.carets.end;
        }
        assert_eq!(layout.num_carets, expected_caret);
    }

    #[test]
    fn test_run_coverage() {
        let layout = layout(
            "AB \u{0644}\u{0645} CD ef\ngh\u{0644} ij",
            25.0,
            TextDirection::LeftToRight,
        );
        assert_runs_cover_paragraphs(&layout);
    }

    #[test]
    fn test_mixed_direction_runs() {
        let text = "AB\u{0644}\u{0645}CD";
        let layout = layout(text, 1000.0, TextDirection::LeftToRight);

        assert_eq!(layout.runs.len(), 3);
        assert_eq!(layout.lines.len(), 1);

        // Single LTR paragraph: the RTL run sits between the LTR runs
        let visual: Vec<_> = layout.runs.iter().map(|r| run_text(text, r)).collect();
        assert_eq!(visual, vec!["AB", "\u{0644}\u{0645}", "CD"]);
        assert_eq!(layout.runs[0].direction(), TextDirection::LeftToRight);
        assert_eq!(layout.runs[1].direction(), TextDirection::RightToLeft);
        assert_eq!(layout.runs[2].direction(), TextDirection::LeftToRight);

        // Shaped RTL glyphs come out in visual order
        let clusters: Vec<_> = layout
            .run_glyphs(&layout.runs[1])
            .iter()
            .map(|g| g.cluster)
            .collect();
        assert_eq!(clusters, vec![3, 2]);
    }

    #[test]
    fn test_mixed_direction_rtl_paragraph() {
        let text = "\u{0644}AB\u{0645}CD";
        let layout = layout(text, 1000.0, TextDirection::LeftToRight);

        assert_eq!(layout.lines[0].metrics.direction(), TextDirection::RightToLeft);
        let visual: Vec<_> = layout.runs.iter().map(|r| run_text(text, r)).collect();
        assert_eq!(visual, vec!["CD", "\u{0645}", "AB", "\u{0644}"]);
    }

    #[test]
    fn test_narrow_width_keeps_one_run_per_line() {
        let layout = layout("hello world", 1.0, TextDirection::LeftToRight);
        assert_eq!(layout.lines.len(), 2);
        for line in &layout.lines {
            assert!(!line.runs.is_empty());
            assert!(line.metrics.width > 0.0);
        }
        // The space hangs at the end of the first line
        assert_eq!(layout.lines[0].codepoints, 0..6);
        assert_eq!(layout.lines[1].codepoints, 6..11);
    }

    #[test]
    fn test_wrap_disabled() {
        let (fonts, id) = fake_fonts();
        let chars: Vec<char> = "hello world again".chars().collect();
        let styles = [FontStyle::new(id, 10.0)];
        let run_ends = [chars.len()];
        let mut block = TextBlock::new(&chars, &run_ends, &styles);
        block.wrap = false;

        let mut layout = TextLayout::new();
        fake_engine()
            .layout_text(&block, 1.0, &fonts, &mut layout)
            .unwrap();
        assert_eq!(layout.lines.len(), 1);
    }

    #[test]
    fn test_greedy_fill() {
        // Each glyph is GLYPH_ADVANCE wide; "aa bb cc" with room for 5 glyphs
        let layout = layout("aa bb cc", 5.0 * GLYPH_ADVANCE, TextDirection::LeftToRight);
        let lines: Vec<_> = layout.lines.iter().map(|l| l.codepoints.clone()).collect();
        assert_eq!(lines, vec![0..6, 6..8]);
    }

    #[test]
    fn test_paragraphs_and_breaks() {
        let layout = layout("ab\r\n\ncd", 1000.0, TextDirection::LeftToRight);
        assert_eq!(layout.paragraphs.len(), 3);

        let p = &layout.paragraphs;
        assert_eq!(p[0].codepoints, 0..2);
        assert_eq!(p[0].break_codepoints, 2..4);
        assert_eq!(p[1].codepoints, 4..4);
        assert_eq!(p[1].break_codepoints, 4..5);
        assert_eq!(p[2].codepoints, 5..7);
        assert_eq!(p[2].break_codepoints, 7..7);

        // The empty paragraph has one empty run and one line with one caret
        assert_eq!(p[1].runs.len(), 1);
        assert_eq!(p[1].lines.len(), 1);
        let line = &layout.lines[p[1].lines.start];
        assert_eq!(line.carets.len(), 1);
        assert!(layout.runs[p[1].runs.start].glyphs.is_empty());
        assert_eq!(layout.extent[1], 30.0);
    }

    #[test]
    fn test_style_runs_split() {
        let (fonts, id) = fake_fonts();
        let chars: Vec<char> = "abcd".chars().collect();
        let styles = [FontStyle::new(id, 10.0), FontStyle::new(id, 20.0)];
        let run_ends = [2, 4];
        let block = TextBlock::new(&chars, &run_ends, &styles);

        let mut layout = TextLayout::new();
        fake_engine()
            .layout_text(&block, 1000.0, &fonts, &mut layout)
            .unwrap();

        assert_eq!(layout.runs.len(), 2);
        assert_eq!(layout.runs[1].style, 1);
        assert_eq!(layout.lines[0].metrics.height, 20.0);
        assert_eq!(layout.lines[0].metrics.width, 2.0 * GLYPH_ADVANCE * 3.0);
    }

    #[test]
    fn test_word_spacing_and_line_height() {
        let (fonts, id) = fake_fonts();
        let chars: Vec<char> = "ab cd".chars().collect();
        let styles = [FontStyle {
            font: id,
            height: 10.0,
            line_height: 1.5,
            word_spacing: 4.0,
        }];
        let run_ends = [5];
        let mut block = TextBlock::new(&chars, &run_ends, &styles);
        block.font_scale = 2.0;

        let mut layout = TextLayout::new();
        fake_engine()
            .layout_text(&block, 1000.0, &fonts, &mut layout)
            .unwrap();

        let glyph = 2.0 * GLYPH_ADVANCE;
        let line = &layout.lines[0];
        assert_eq!(line.metrics.width, 5.0 * glyph + 2.0 * 8.0);
        assert_eq!(line.metrics.height, 30.0);
    }

    #[test]
    fn test_invalid_style_runs() {
        let (fonts, id) = fake_fonts();
        let chars: Vec<char> = "abcd".chars().collect();
        let styles = [FontStyle::new(id, 10.0)];
        let mut engine = fake_engine();
        let mut layout = TextLayout::new();

        let short = [3];
        let block = TextBlock::new(&chars, &short, &styles);
        let result = engine.layout_text(&block, 10.0, &fonts, &mut layout);
        assert!(matches!(result, Err(TextError::InvalidStyleRuns(_))));

        let mismatched = [2, 4];
        let block = TextBlock::new(&chars, &mismatched, &styles);
        let result = engine.layout_text(&block, 10.0, &fonts, &mut layout);
        assert!(matches!(result, Err(TextError::InvalidStyleRuns(_))));
    }

    #[test]
    fn test_font_not_loaded() {
        let (mut fonts, id) = fake_fonts();
        fonts.remove(id);
        let chars: Vec<char> = "ab".chars().collect();
        let styles = [FontStyle::new(id, 10.0)];
        let run_ends = [2];
        let block = TextBlock::new(&chars, &run_ends, &styles);

        let mut layout = TextLayout::new();
        let result = fake_engine().layout_text(&block, 10.0, &fonts, &mut layout);
        assert!(matches!(result, Err(TextError::FontNotLoaded(f)) if f == id));
    }

    #[test]
    fn test_inconsistent_shaper_clears_layout() {
        struct Broken;
        impl ShapingOracle for Broken {
            fn shape(
                &self,
                font: &FontFace,
                request: &ShapeRequest<'_>,
                infos: &mut Vec<GlyphInfo>,
                positions: &mut Vec<GlyphPosition>,
            ) {
                FakeShaper.shape(font, request, infos, positions);
                positions.pop();
            }
        }

        let (fonts, id) = fake_fonts();
        let chars: Vec<char> = "ab cd".chars().collect();
        let styles = [FontStyle::new(id, 10.0)];
        let run_ends = [5];
        let block = TextBlock::new(&chars, &run_ends, &styles);

        let mut engine = TextLayoutEngine::new(
            Box::new(crate::testing::FakeScripts),
            Box::new(crate::testing::FakeBidi),
            Box::new(Broken),
        );
        let mut layout = TextLayout::new();
        let result = engine.layout_text(&block, 100.0, &fonts, &mut layout);

        assert!(matches!(
            result,
            Err(TextError::OracleInconsistency {
                oracle: "shaping",
                ..
            })
        ));
        assert!(layout.runs.is_empty());
        assert!(layout.glyphs.is_empty());
    }

    #[test]
    fn test_layout_reuse_clears_previous() {
        let (fonts, id) = fake_fonts();
        let styles = [FontStyle::new(id, 10.0)];
        let mut engine = fake_engine();
        let mut layout = TextLayout::new();

        let long: Vec<char> = "a long line of text".chars().collect();
        let run_ends = [long.len()];
        engine
            .layout_text(&TextBlock::new(&long, &run_ends, &styles), 20.0, &fonts, &mut layout)
            .unwrap();
        assert!(layout.lines.len() > 1);

        let short: Vec<char> = "ab".chars().collect();
        let run_ends = [2];
        engine
            .layout_text(&TextBlock::new(&short, &run_ends, &styles), 20.0, &fonts, &mut layout)
            .unwrap();
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(layout.glyphs.len(), 2);
    }
}
