//! Canonical key derivation for cache matching.
//! Three levels, strictest to loosest: exact (trim only), normalized (edge
//! punctuation stripped, lowercased), clean (all punctuation stripped,
//! lowercased). Looser levels trade precision for hit rate: two distinct
//! inputs that normalize identically share one cache entry.

/// Characters treated as noise around or inside a key: whitespace plus ASCII
/// and common CJK punctuation.
fn is_noise(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '.' | ','
                | '!'
                | '?'
                | ';'
                | ':'
                | '\''
                | '"'
                | '('
                | ')'
                | '['
                | ']'
                | '{'
                | '}'
                | '/'
                | '\\'
                | '-'
                | '_'
                | '+'
                | '='
                | '<'
                | '>'
                | '@'
                | '#'
                | '$'
                | '%'
                | '^'
                | '&'
                | '*'
                | '。'
                | '！'
                | '？'
                | '，'
                | '；'
                | '：'
                | '、'
                | '（'
                | '）'
                | '“'
                | '”'
                | '‘'
                | '’'
        )
}

/// Strictest key: the trimmed source text.
pub fn exact_key(text: &str) -> &str {
    text.trim()
}

/// Middle key: noise stripped from both edges, lowercased. Interior
/// punctuation survives.
pub fn normalize(text: &str) -> String {
    text.trim_matches(is_noise).to_lowercase()
}

/// Loosest key: every noise character removed, lowercased.
pub fn clean(text: &str) -> String {
    text.chars()
        .filter(|&c| !is_noise(c))
        .collect::<String>()
        .to_lowercase()
}
