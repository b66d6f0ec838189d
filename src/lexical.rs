// Lexical utilities — tokenization, set overlap, and stylistic signatures
//
// Everything here is pure and deterministic; the consistency report and the
// annotation matcher are built on these scorers.

use std::collections::HashSet;

/// Split text into lower-cased alphanumeric tokens.
///
/// Apostrophes inside a word are kept ("don't" stays one token); every other
/// non-alphanumeric character is a separator.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|word| word.trim_matches('\''))
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

/// Distinct tokens of a text.
pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Jaccard similarity of two token sets, in [0, 1].
///
/// Two empty sets score 0: there is nothing to agree on.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Jaccard similarity of the token sets of two texts.
pub fn jaccard_text(a: &str, b: &str) -> f64 {
    jaccard(&token_set(a), &token_set(b))
}

/// Coarse stylistic fingerprint of a text
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StyleSignature {
    /// Mean number of tokens per sentence
    pub mean_sentence_tokens: f64,
    /// Distinct tokens / total tokens
    pub type_token_ratio: f64,
}

/// Compute the style signature of a text.
///
/// Sentences are split on `.`, `!` and `?`; segments without tokens are
/// not counted.
pub fn style_signature(text: &str) -> StyleSignature {
    let sentence_lengths: Vec<usize> = text
        .split(['.', '!', '?'])
        .map(|sentence| tokenize(sentence).len())
        .filter(|&len| len > 0)
        .collect();

    let mean_sentence_tokens = if sentence_lengths.is_empty() {
        0.0
    } else {
        sentence_lengths.iter().sum::<usize>() as f64 / sentence_lengths.len() as f64
    };

    let tokens = tokenize(text);
    let type_token_ratio = if tokens.is_empty() {
        0.0
    } else {
        let distinct: HashSet<&String> = tokens.iter().collect();
        distinct.len() as f64 / tokens.len() as f64
    };

    StyleSignature {
        mean_sentence_tokens,
        type_token_ratio,
    }
}

/// |Δ mean tokens per sentence| + |Δ type-token ratio|
pub fn style_divergence(a: &str, b: &str) -> f64 {
    let sa = style_signature(a);
    let sb = style_signature(b);
    (sa.mean_sentence_tokens - sb.mean_sentence_tokens).abs()
        + (sa.type_token_ratio - sb.type_token_ratio).abs()
}

/// Lower-case, drop punctuation, collapse whitespace.
pub fn normalize_comment(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// How much two annotation quotes cover the same passage.
///
/// 1.0 when one quote verbatim contains the other, otherwise token-set
/// Jaccard. Empty quotes score 0.
pub fn quote_overlap_score(a: &str, b: &str) -> f64 {
    let a = a.trim();
    let b = b.trim();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.contains(b) || b.contains(a) {
        return 1.0;
    }
    jaccard_text(a, b)
}

/// How closely two annotation comments say the same thing.
///
/// 1.0 when the normalized comments are equal or one contains the other,
/// otherwise token-set Jaccard of the normalized text.
pub fn comment_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_comment(a);
    let b = normalize_comment(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b || a.contains(&b) || b.contains(&a) {
        return 1.0;
    }
    jaccard_text(&a, &b)
}
