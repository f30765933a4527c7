//! Hit testing
//!
//! Maps a point in block space (top-left origin, y down) to a caret and the
//! codepoint cluster under it.

use crate::au_to_px;
use crate::bidi::TextDirection;
use crate::layout::{Line, TextLayout};

/// Result of [`TextLayout::hit`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextHit {
    /// Caret nearest to the point
    pub caret: usize,
    /// Source cluster (codepoint index) under the point
    pub cluster: usize,
    /// Line index
    pub line: usize,
    /// `cluster` relative to the line's first codepoint
    pub column: usize,
}

impl TextLayout {
    /// X offset of a line within a block `block_width` wide.
    ///
    /// `alignment` runs from -1 (start) through 0 (center) to 1 (end) and is
    /// mirrored for right-to-left lines.
    pub fn line_offset(&self, line: &Line, block_width: f32, alignment: f32) -> f32 {
        let alignment = match line.metrics.direction() {
            TextDirection::LeftToRight => alignment,
            TextDirection::RightToLeft => -alignment,
        };
        (block_width - line.metrics.width) * 0.5 * (1.0 + alignment)
    }

    /// Hit test `pos` against the layout aligned within `align_width`.
    ///
    /// Points above or below the text hit the first or last line; points left
    /// or right of a line hit its first or last caret depending on the line's
    /// direction.
    pub fn hit(&self, align_width: f32, alignment: f32, pos: [f32; 2]) -> TextHit {
        let Some(line_index) = self.line_at(pos[1]) else {
            return TextHit::default();
        };

        let line = &self.lines[line_index];
        let block_width = self.extent[0].max(align_width);
        let direction = line.metrics.direction();
        let mut cursor = self.line_offset(line, block_width, alignment);

        let caret_hit = |caret: usize| {
            let column = caret - line.carets.start;
            TextHit {
                caret,
                cluster: line.codepoints.start + column,
                line: line_index,
                column,
            }
        };
        let first = line.carets.start;
        let last = line.carets.end - 1;

        if pos[0] < cursor {
            return match direction {
                TextDirection::LeftToRight => caret_hit(first),
                TextDirection::RightToLeft => caret_hit(last),
            };
        }

        for run in self.line_runs(line) {
            let font_height = self.font_scale * run.font_height;
            let advance = run.metrics.resolve(font_height).advance;
            let run_width = run.width(self.font_scale);

            if pos[0] >= cursor && pos[0] <= cursor + advance {
                let mut glyph_cursor = cursor;

                for glyph in self.run_glyphs(run) {
                    let glyph_advance = au_to_px(glyph.advance, font_height);

                    if pos[0] >= glyph_cursor && pos[0] <= glyph_cursor + glyph_advance {
                        let leading = pos[0] <= glyph_cursor + 0.5 * glyph_advance;
                        let codepoint = match (run.direction(), leading) {
                            (TextDirection::LeftToRight, true) => glyph.cluster,
                            (TextDirection::LeftToRight, false) => glyph.cluster + 1,
                            (TextDirection::RightToLeft, true) => glyph.cluster + 1,
                            (TextDirection::RightToLeft, false) => glyph.cluster,
                        };
                        let offset = codepoint.clamp(line.codepoints.start, line.codepoints.end)
                            - line.codepoints.start;

                        return TextHit {
                            caret: line.carets.start + offset,
                            cluster: glyph.cluster,
                            line: line_index,
                            column: glyph.cluster - line.codepoints.start,
                        };
                    }

                    glyph_cursor += glyph_advance;
                }
            }

            cursor += run_width;
        }

        match direction {
            TextDirection::LeftToRight => caret_hit(last),
            TextDirection::RightToLeft => caret_hit(first),
        }
    }

    /// Line whose vertical band contains `y`, clamped to the first and last
    fn line_at(&self, y: f32) -> Option<usize> {
        let last = self.lines.len().checked_sub(1)?;
        let mut bottom = 0.0;

        for (i, line) in self.lines.iter().enumerate() {
            bottom += line.metrics.height;
            if y <= bottom {
                return Some(i);
            }
        }

        Some(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bidi::TextDirection;
    use crate::layout::{FontStyle, TextBlock};
    use crate::testing::{fake_engine, fake_fonts, GLYPH_ADVANCE};

    fn layout(text: &str, max_width: f32) -> TextLayout {
        let (fonts, id) = fake_fonts();
        let chars: Vec<char> = text.chars().collect();
        let styles = [FontStyle::new(id, 10.0)];
        let run_ends = [chars.len()];
        let block = TextBlock::new(&chars, &run_ends, &styles);
        let mut layout = TextLayout::new();
        fake_engine()
            .layout_text(&block, max_width, &fonts, &mut layout)
            .unwrap();
        layout
    }

    #[test]
    fn test_empty_layout() {
        let layout = layout("", 100.0);
        assert_eq!(layout.hit(100.0, -1.0, [10.0, 10.0]), TextHit::default());
    }

    #[test]
    fn test_hit_glyph_halves() {
        let layout = layout("abcd", 100.0);

        // Leading half of 'b' puts the caret before it
        let hit = layout.hit(0.0, -1.0, [GLYPH_ADVANCE * 1.25, 5.0]);
        assert_eq!(hit.cluster, 1);
        assert_eq!(hit.column, 1);
        assert_eq!(hit.caret, 1);
        assert_eq!(hit.line, 0);

        // Trailing half puts it after
        let hit = layout.hit(0.0, -1.0, [GLYPH_ADVANCE * 1.75, 5.0]);
        assert_eq!(hit.cluster, 1);
        assert_eq!(hit.caret, 2);
    }

    #[test]
    fn test_hit_outside_line() {
        let layout = layout("abcd", 100.0);

        let left = layout.hit(100.0, 1.0, [0.0, 5.0]);
        assert_eq!(left.caret, 0);

        let right = layout.hit(0.0, -1.0, [1000.0, 5.0]);
        assert_eq!(right.caret, 4);
        assert_eq!(right.column, 4);
    }

    #[test]
    fn test_hit_line_bands() {
        // Two lines: "ab " and "cd"
        let layout = layout("ab cd", 2.5 * GLYPH_ADVANCE);
        assert_eq!(layout.lines.len(), 2);

        let above = layout.hit(0.0, -1.0, [1.0, -50.0]);
        assert_eq!(above.line, 0);

        let second = layout.hit(0.0, -1.0, [1.0, 15.0]);
        assert_eq!(second.line, 1);
        assert_eq!(second.cluster, 3);
        assert_eq!(second.column, 0);
        assert_eq!(second.caret, 4);

        let below = layout.hit(0.0, -1.0, [1.0, 500.0]);
        assert_eq!(below.line, 1);
    }

    #[test]
    fn test_hit_respects_alignment() {
        let layout = layout("ab", 100.0);
        let width = 2.0 * GLYPH_ADVANCE;

        // Centered in 100px the text starts at (100 - width) / 2
        let start = (100.0 - width) / 2.0;
        let hit = layout.hit(100.0, 0.0, [start + 0.1, 5.0]);
        assert_eq!(hit.cluster, 0);
        assert_eq!(hit.caret, 0);

        let before = layout.hit(100.0, 0.0, [start - 1.0, 5.0]);
        assert_eq!(before.caret, 0);

        // End aligned
        let hit = layout.hit(100.0, 1.0, [100.0 - 0.1, 5.0]);
        assert_eq!(hit.cluster, 1);
        assert_eq!(hit.caret, 2);
    }

    #[test]
    fn test_hit_rtl_run() {
        let layout = layout("\u{0644}\u{0645}", 100.0);
        assert_eq!(
            layout.lines[0].metrics.direction(),
            TextDirection::RightToLeft
        );

        // Visually the second codepoint is on the left
        let hit = layout.hit(0.0, -1.0, [GLYPH_ADVANCE * 0.25, 5.0]);
        assert_eq!(hit.cluster, 1);
        assert_eq!(hit.caret, 2);

        let hit = layout.hit(0.0, -1.0, [GLYPH_ADVANCE * 1.75, 5.0]);
        assert_eq!(hit.cluster, 0);
        assert_eq!(hit.caret, 0);

        // Left of an RTL line is its end
        let left = layout.hit(100.0, -1.0, [-5.0, 5.0]);
        assert_eq!(left.caret, 2);
    }
}
