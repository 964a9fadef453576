//! Sentence segmentation and overflow chunking.
//! Sentences end at terminal punctuation followed by whitespace (or end of
//! input); the punctuation stays with its sentence. Oversized sentences are
//! re-split on secondary punctuation to bound per-request sizes.

/// Sentence-terminal punctuation, ASCII and full-width variants.
const TERMINALS: &[char] = &['.', '!', '?', '。', '！', '？'];

/// Secondary split points for oversized sentences.
const SECONDARY: &[char] = &[',', ';', '，', '；'];

/// A sentence longer than this (in characters) gets re-split on secondary
/// punctuation.
const LONG_SENTENCE: usize = 200;

/// An ordered slice of the original selection, the unit of cache lookup and
/// translation dispatch. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Character offset into the source selection, for order reconstruction.
    pub offset: usize,
    pub text: String,
}

/// Split `text` into sentence-level segments. Trimmed segments shorter than
/// `min_length` are dropped as noise. Deterministic: no state, no randomness.
pub fn segment(text: &str, min_length: usize) -> Vec<Segment> {
    let mut out = Vec::new();
    for (offset, sentence) in split_after(text, TERMINALS) {
        if sentence.chars().count() > LONG_SENTENCE {
            for (sub_offset, piece) in split_after(&sentence, SECONDARY) {
                push_trimmed(&mut out, offset + sub_offset, &piece, min_length);
            }
        } else {
            push_trimmed(&mut out, offset, &sentence, min_length);
        }
    }
    out
}

/// Pack whole sentences greedily into chunks of at most `max_length`
/// characters. A single sentence longer than `max_length` is hard-split at
/// the character boundary; that loses sentence semantics for pathological
/// input and is an accepted quality compromise.
pub fn chunk(text: &str, max_length: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for (_, sentence) in split_after(text, TERMINALS) {
        let sentence_len = sentence.chars().count();
        let joined_len = current_len + sentence_len + if current.is_empty() { 0 } else { 1 };

        if joined_len <= max_length {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&sentence);
            current_len = joined_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if sentence_len > max_length {
            let chars: Vec<char> = sentence.chars().collect();
            for piece in chars.chunks(max_length) {
                chunks.push(piece.iter().collect());
            }
        } else {
            current = sentence;
            current_len = sentence_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split into pieces ending after any of `marks` when followed by
/// whitespace; the separator whitespace run is consumed. A trailing piece
/// with no mark is still emitted. Offsets are character offsets into `text`.
fn split_after(text: &str, marks: &[char]) -> Vec<(usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let at_boundary = marks.contains(&chars[i])
            && (i + 1 == chars.len() || chars[i + 1].is_whitespace());
        if !at_boundary {
            i += 1;
            continue;
        }
        pieces.push((start, chars[start..=i].iter().collect()));
        i += 1;
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        start = i;
    }

    if start < chars.len() {
        pieces.push((start, chars[start..].iter().collect()));
    }
    pieces
}

fn push_trimmed(out: &mut Vec<Segment>, offset: usize, raw: &str, min_length: usize) {
    let trimmed = raw.trim();
    if trimmed.chars().count() >= min_length {
        let lead = raw.chars().take_while(|c| c.is_whitespace()).count();
        out.push(Segment {
            offset: offset + lead,
            text: trimmed.to_string(),
        });
    }
}
