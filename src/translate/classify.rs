//! Source-language gate: decides whether a selection is English text worth
//! translating. Heuristic character checks, no detection model.

use std::sync::OnceLock;

use regex::Regex;

/// Digits and punctuation ignored when judging translatability.
fn strip_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[0-9.,!?;:'"()\[\]{}/\\\-_+=<>@#$%^&*]"#).unwrap())
}

/// Returns whether `text` is translatable English source text.
///
/// The residue after stripping digits/punctuation must be at least
/// `min_length` characters, contain no Chinese characters (already-translated
/// text is not re-translated), contain at least one ASCII letter, and be at
/// most 20% characters that are neither ASCII letters nor whitespace.
pub fn is_translatable(text: &str, min_length: usize) -> bool {
    let stripped = strip_pattern().replace_all(text, "");
    let residue = stripped.trim();

    let total = residue.chars().count();
    if total < min_length {
        return false;
    }
    if residue.chars().any(is_chinese) {
        return false;
    }
    if !residue.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }

    let foreign = residue
        .chars()
        .filter(|c| !c.is_ascii_alphabetic() && !c.is_whitespace())
        .count();
    foreign as f32 / total as f32 <= 0.2
}

/// CJK unified ideographs (the target script).
#[inline]
pub(crate) fn is_chinese(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}
