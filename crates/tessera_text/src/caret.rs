//! Caret queries
//!
//! Every line owns `codepoints + 1` carets: one before each codepoint and one
//! trailing. Carets are numbered consecutively across lines, so the caret
//! after the last codepoint of a line and the caret before the first codepoint
//! of the next line are distinct.

use crate::bidi::TextDirection;
use crate::layout::TextLayout;
use std::ops::Range;

/// Horizontal caret position within a line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaretX {
    #[default]
    Start,
    /// Caret offset from the start of the line, clamped to the line end
    Column(usize),
    End,
}

/// Line a caret is placed on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaretY {
    /// Before everything, the first caret of the layout
    #[default]
    Top,
    /// Line index, clamped to the last line
    Line(usize),
    /// After everything, the last caret of the layout
    Bottom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaretAlignment {
    pub x: CaretX,
    pub y: CaretY,
}

/// Codepoint position of a caret
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaretCodepoint {
    pub line: usize,
    /// Codepoint the caret precedes
    pub codepoint: usize,
    /// The caret is the line's trailing caret
    pub after: bool,
}

/// Glyph a caret is drawn against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaretPlacement {
    pub line: usize,
    /// Index into the layout's glyphs, `None` for lines without glyphs
    pub glyph: Option<usize>,
    /// Draw on the trailing edge of the glyph
    pub after: bool,
}

impl TextLayout {
    fn last_caret(&self) -> usize {
        self.num_carets.saturating_sub(1)
    }

    /// Caret before (or after) `codepoint`.
    ///
    /// Codepoints of a line break sequence belong to no line: before them is
    /// the trailing caret of the previous line, after them the first caret of
    /// the next.
    pub fn to_caret(&self, codepoint: usize, before: bool) -> usize {
        if codepoint == 0 && before {
            return 0;
        }

        if codepoint >= self.num_codepoints {
            return self.last_caret();
        }

        let index = self
            .lines
            .partition_point(|line| line.codepoints.end <= codepoint);

        let Some(line) = self.lines.get(index) else {
            return self.last_caret();
        };

        if line.codepoints.contains(&codepoint) {
            let caret = line.carets.start + (codepoint - line.codepoints.start);
            if before {
                caret
            } else {
                caret + 1
            }
        } else if before && index > 0 {
            self.lines[index - 1].carets.end - 1
        } else {
            line.carets.start
        }
    }

    /// Caret at a line/column position
    pub fn align_caret(&self, alignment: CaretAlignment) -> usize {
        let index = match alignment.y {
            CaretY::Top => return 0,
            CaretY::Bottom => return self.last_caret(),
            CaretY::Line(index) => index,
        };

        let Some(line) = self.lines.get(index) else {
            return self.last_caret();
        };

        match alignment.x {
            CaretX::Start => line.carets.start,
            CaretX::Column(column) if column < line.carets.len() => line.carets.start + column,
            CaretX::Column(_) | CaretX::End => line.carets.end - 1,
        }
    }

    /// Line, codepoint and trailing flag of `caret`, clamped to the last caret
    pub fn caret_codepoint(&self, caret: usize) -> CaretCodepoint {
        let Some(last_line) = self.lines.len().checked_sub(1) else {
            return CaretCodepoint::default();
        };

        let caret = caret.min(self.last_caret());
        let index = self
            .lines
            .partition_point(|line| line.carets.end <= caret)
            .min(last_line);
        let line = &self.lines[index];
        let column = caret.saturating_sub(line.carets.start);

        CaretCodepoint {
            line: index,
            codepoint: line.codepoints.start + column,
            after: column + 1 >= line.carets.len(),
        }
    }

    /// Codepoints between two carets
    pub fn caret_selection_codepoints(&self, carets: Range<usize>) -> Range<usize> {
        let Some(last_line) = self.lines.len().checked_sub(1) else {
            return 0..0;
        };

        let end = carets.end.min(self.num_carets);
        let start = carets.start.min(end);

        let first = &self.lines[self
            .lines
            .partition_point(|line| line.carets.end <= start)
            .min(last_line)];
        let last = &self.lines[self
            .lines
            .partition_point(|line| line.carets.end < end)
            .min(last_line)];

        let begin = first.codepoints.start + start.saturating_sub(first.carets.start);
        let end = last.codepoints.start + end.saturating_sub(last.carets.start);

        let end = end.min(self.num_codepoints);
        begin.min(end)..end
    }

    /// Carets spanning `codepoints`; the inverse of
    /// [`caret_selection_codepoints`](Self::caret_selection_codepoints)
    pub fn to_caret_selection(&self, codepoints: Range<usize>) -> Range<usize> {
        if self.num_codepoints == 0 {
            return 0..0;
        }

        let end = codepoints.end.min(self.num_codepoints);
        let start = codepoints.start.min(end);
        let first = self.to_caret(start, true);

        if start == end {
            return first..first;
        }

        let last = self.to_caret(end - 1, false);
        first..last.max(first)
    }

    /// Glyph whose cluster is nearest to the caret's codepoint.
    ///
    /// Ties go to the visually right-most glyph of left-to-right runs and the
    /// left-most glyph of right-to-left runs.
    pub fn caret_placement(&self, caret: usize) -> CaretPlacement {
        let position = self.caret_codepoint(caret);
        let Some(line) = self.lines.get(position.line) else {
            return CaretPlacement::default();
        };

        let mut best: Option<(usize, usize)> = None;

        for run in self.line_runs(line) {
            for (i, glyph) in self.run_glyphs(run).iter().enumerate() {
                let index = run.glyphs.start + i;
                let distance = glyph.cluster.abs_diff(position.codepoint);

                let better = match best {
                    None => true,
                    Some((best_index, best_distance)) => {
                        distance < best_distance
                            || (distance == best_distance
                                && match run.direction() {
                                    TextDirection::LeftToRight => index > best_index,
                                    TextDirection::RightToLeft => index < best_index,
                                })
                    }
                };

                if better {
                    best = Some((index, distance));
                }
            }
        }

        match best {
            Some((glyph, _)) => CaretPlacement {
                line: position.line,
                glyph: Some(glyph),
                after: position.after,
            },
            None => CaretPlacement {
                line: position.line,
                glyph: None,
                after: false,
            },
        }
    }
}
