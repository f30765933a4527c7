//! Script segmentation
//!
//! Assigns an ISO 15924 script tag to every codepoint. The tags are opaque to
//! layout: runs split where the tag changes and the tag is handed to the shaper.

use std::fmt;
use unicode_script::{Script, UnicodeScript};

/// ISO 15924 / OpenType script tag, e.g. `Latn`, `Arab`
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScriptTag(pub [u8; 4]);

impl ScriptTag {
    /// Characters shared by several scripts
    pub const COMMON: ScriptTag = ScriptTag(*b"Zyyy");
    /// Combining characters taking the script of their base
    pub const INHERITED: ScriptTag = ScriptTag(*b"Zinh");
    /// Unassigned or unsupported
    pub const UNKNOWN: ScriptTag = ScriptTag(*b"Zzzz");
    pub const LATIN: ScriptTag = ScriptTag(*b"Latn");
    pub const ARABIC: ScriptTag = ScriptTag(*b"Arab");
    pub const HEBREW: ScriptTag = ScriptTag(*b"Hebr");

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("Zzzz")
    }

    /// Whether this tag names a concrete writing system
    pub fn is_real(&self) -> bool {
        !matches!(*self, Self::COMMON | Self::INHERITED | Self::UNKNOWN)
    }
}

impl fmt::Debug for ScriptTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptTag({})", self.as_str())
    }
}

impl fmt::Display for ScriptTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Script> for ScriptTag {
    fn from(script: Script) -> Self {
        let name = script.short_name().as_bytes();
        match name {
            [a, b, c, d] => ScriptTag([*a, *b, *c, *d]),
            _ => ScriptTag::UNKNOWN,
        }
    }
}

/// Per-codepoint script segmentation service
pub trait ScriptOracle: Send + Sync {
    /// Replace the contents of `out` with one script tag per codepoint of `text`
    fn segment_scripts(&self, text: &[char], out: &mut Vec<ScriptTag>);
}

/// Script oracle backed by the Unicode `Script` property.
///
/// Common and Inherited codepoints take the script of the preceding codepoint,
/// or of the first following one at the start of the text, so punctuation and
/// spaces don't fragment runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeScriptOracle;

impl ScriptOracle for UnicodeScriptOracle {
    fn segment_scripts(&self, text: &[char], out: &mut Vec<ScriptTag>) {
        out.clear();
        out.extend(text.iter().map(|c| ScriptTag::from(c.script())));

        let mut current = out.iter().copied().find(ScriptTag::is_real);
        for tag in out.iter_mut() {
            if tag.is_real() {
                current = Some(*tag);
            } else if let Some(script) = current {
                *tag = script;
            }
        }
    }
}
