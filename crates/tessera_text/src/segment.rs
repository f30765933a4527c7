//! Codepoint segmentation
//!
//! Annotates every codepoint with its style, paragraph boundaries, script,
//! bidi levels and wrap points before runs are built.

use crate::bidi::{BidiOracle, TextDirection};
use crate::script::{ScriptOracle, ScriptTag};
use crate::{Result, TextError};

/// Per-codepoint annotation, rebuilt on each layout call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Segment {
    /// Index into the block's font styles
    pub style: usize,
    pub script: ScriptTag,
    /// First codepoint after a line break
    pub paragraph_begin: bool,
    /// First codepoint of a line break sequence (`\n`, `\r` or `\r\n`)
    pub linebreak_begin: bool,
    /// U+0020 SPACE
    pub whitespace: bool,
    /// U+0009 CHARACTER TABULATION
    pub tab: bool,
    /// A line may start at this codepoint
    pub wrappable: bool,
    /// Embedding level of the codepoint's paragraph
    pub base_level: u8,
    /// Resolved embedding level
    pub level: u8,
}

impl Segment {
    /// Spaces, tabs and line breaks end words
    #[inline]
    pub fn is_wrap_point(&self) -> bool {
        self.whitespace || self.tab || self.linebreak_begin
    }
}

/// Oracles consulted during segmentation
pub(crate) struct Segmenter<'a> {
    pub scripts: &'a dyn ScriptOracle,
    pub bidi: &'a dyn BidiOracle,
}

impl Segmenter<'_> {
    /// Fill `segments` with one annotation per codepoint of `text`
    pub fn segment(
        &self,
        text: &[char],
        run_ends: &[usize],
        direction: TextDirection,
        segments: &mut Vec<Segment>,
        scratch: &mut Vec<ScriptTag>,
    ) -> Result<()> {
        segments.clear();
        segments
            .try_reserve_exact(text.len())
            .map_err(|_| TextError::OutOfMemory)?;
        segments.resize(text.len(), Segment::default());

        assign_styles(run_ends, segments);
        segment_paragraphs(text, segments);
        self.segment_scripts(text, segments, scratch)?;
        segment_wrap_points(text, segments);

        if !text.is_empty() {
            self.segment_levels(text, direction, segments)?;
        }

        Ok(())
    }

    fn segment_scripts(
        &self,
        text: &[char],
        segments: &mut [Segment],
        scratch: &mut Vec<ScriptTag>,
    ) -> Result<()> {
        self.scripts.segment_scripts(text, scratch);

        if scratch.len() != text.len() {
            return Err(TextError::OracleInconsistency {
                oracle: "script",
                expected: text.len(),
                actual: scratch.len(),
            });
        }

        for (segment, script) in segments.iter_mut().zip(scratch.iter()) {
            segment.script = *script;
        }
        Ok(())
    }

    /// Resolve levels paragraph by paragraph; break codepoints keep level 0
    fn segment_levels(
        &self,
        text: &[char],
        direction: TextDirection,
        segments: &mut [Segment],
    ) -> Result<()> {
        let len = text.len();
        let mut i = 0;

        while i < len {
            let first = i;
            while i < len && !segments[i].linebreak_begin {
                i += 1;
            }

            if i > first {
                let paragraph = self.bidi.create_paragraph(&text[first..i], direction);

                if paragraph.levels.len() != i - first {
                    return Err(TextError::OracleInconsistency {
                        oracle: "bidi",
                        expected: i - first,
                        actual: paragraph.levels.len(),
                    });
                }

                for (segment, level) in segments[first..i].iter_mut().zip(&paragraph.levels) {
                    segment.base_level = paragraph.base_level;
                    segment.level = *level;
                }
            }

            i += 1;
            while i < len && !segments[i].paragraph_begin {
                i += 1;
            }
        }

        Ok(())
    }
}

/// Style `s` covers `[run_ends[s - 1], run_ends[s])`
pub(crate) fn assign_styles(run_ends: &[usize], segments: &mut [Segment]) {
    let len = segments.len();
    let mut start = 0;

    for (style, &end) in run_ends.iter().enumerate() {
        let end = end.min(len);
        for segment in segments.get_mut(start..end).into_iter().flatten() {
            segment.style = style;
        }
        start = start.max(end);
    }
}

pub(crate) fn segment_paragraphs(text: &[char], segments: &mut [Segment]) {
    let len = text.len();
    let mut i = 0;

    while i < len {
        let width = match text[i] {
            '\r' if text.get(i + 1) == Some(&'\n') => 2,
            '\n' | '\r' => 1,
            _ => {
                i += 1;
                continue;
            }
        };

        segments[i].linebreak_begin = true;
        if let Some(next) = segments.get_mut(i + width) {
            next.paragraph_begin = true;
        }
        i += width;
    }
}

/// Marks spaces and tabs, then the codepoints a new line may start at: the
/// first codepoint of a word that follows a space, tab or line break.
/// Whitespace itself is never wrappable so it hangs at the end of the line.
pub(crate) fn segment_wrap_points(text: &[char], segments: &mut [Segment]) {
    for (c, segment) in text.iter().zip(segments.iter_mut()) {
        match c {
            ' ' => segment.whitespace = true,
            '\t' => segment.tab = true,
            _ => {}
        }
    }

    // The break opportunity is marked on the run that starts the new line
    for i in 0..segments.len() {
        segments[i].wrappable =
            i > 0 && !segments[i].is_wrap_point() && segments[i - 1].is_wrap_point();
    }
}
