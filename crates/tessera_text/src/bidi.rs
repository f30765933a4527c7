//! Bidirectional text support
//!
//! Embedding levels come from a [`BidiOracle`]; this module owns only the
//! line-level visual reordering (rule L2 of UAX #9).

use unicode_bidi::{bidi_class, BidiClass, BidiInfo, Level};

/// Base or resolved writing direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextDirection {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl TextDirection {
    /// Embedding level of a paragraph with this base direction
    pub fn base_level(self) -> u8 {
        match self {
            TextDirection::LeftToRight => 0,
            TextDirection::RightToLeft => 1,
        }
    }

    pub fn is_rtl(self) -> bool {
        self == TextDirection::RightToLeft
    }
}

/// Even levels are left-to-right, odd levels right-to-left
#[inline]
pub fn level_to_direction(level: u8) -> TextDirection {
    if level & 1 == 0 {
        TextDirection::LeftToRight
    } else {
        TextDirection::RightToLeft
    }
}

/// Resolved levels of one paragraph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BidiParagraph {
    /// Paragraph embedding level
    pub base_level: u8,
    /// One embedding level per codepoint
    pub levels: Vec<u8>,
}

/// Per-paragraph bidi level resolution service
pub trait BidiOracle: Send + Sync {
    /// Resolve levels for one paragraph (no line breaks inside `text`).
    ///
    /// `hint` is the base direction used when the paragraph has no strong
    /// character.
    fn create_paragraph(&self, text: &[char], hint: TextDirection) -> BidiParagraph;
}

/// Bidi oracle backed by `unicode-bidi`
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeBidiOracle;

impl UnicodeBidiOracle {
    fn detect_base_level(text: &[char], hint: TextDirection) -> Level {
        let first_strong = text.iter().find_map(|&c| match bidi_class(c) {
            BidiClass::L => Some(Level::ltr()),
            BidiClass::R | BidiClass::AL => Some(Level::rtl()),
            _ => None,
        });

        first_strong.unwrap_or(match hint {
            TextDirection::LeftToRight => Level::ltr(),
            TextDirection::RightToLeft => Level::rtl(),
        })
    }
}

impl BidiOracle for UnicodeBidiOracle {
    fn create_paragraph(&self, text: &[char], hint: TextDirection) -> BidiParagraph {
        if text.is_empty() {
            return BidiParagraph {
                base_level: hint.base_level(),
                levels: Vec::new(),
            };
        }

        let base = Self::detect_base_level(text, hint);
        let source: String = text.iter().collect();
        let info = BidiInfo::new(&source, Some(base));

        // Levels are stored per byte; sample the first byte of each char
        let levels = source
            .char_indices()
            .map(|(byte, _)| info.levels[byte].number())
            .collect();

        BidiParagraph {
            base_level: base.number(),
            levels,
        }
    }
}

/// Reorder `items` from logical to visual order (UAX #9 rule L2).
///
/// From the highest level down to 1, every maximal sub-sequence whose level is
/// at least the current level is reversed.
pub fn reorder_visual<T>(items: &mut [T], level: impl Fn(&T) -> u8) {
    let max_level = items.iter().map(&level).max().unwrap_or(0);

    for current in (1..=max_level).rev() {
        let mut i = 0;
        while i < items.len() {
            while i < items.len() && level(&items[i]) < current {
                i += 1;
            }
            let first = i;
            while i < items.len() && level(&items[i]) >= current {
                i += 1;
            }
            items[first..i].reverse();
        }
    }
}
