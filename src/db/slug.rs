//! Slug derivation for tag ids and readable resource paths.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Length of the id fragment appended by [`slug_with_suffix`].
const SUFFIX_LEN: usize = 8;

/// Derive a URL-safe slug from a display name.
///
/// The result holds only `[a-z0-9]` runs joined by single hyphens, with no
/// hyphen at either end. Input is decomposed (NFD) and combining marks are
/// dropped, so accented Latin letters fold to their base; `đ` has no
/// decomposition and maps to `d`. Other ASCII punctuation or whitespace
/// separates words, remaining non-ASCII characters are dropped.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;

    for c in input.nfd().flat_map(char::to_lowercase) {
        if is_combining_mark(c) {
            continue;
        }
        let c = if c == 'đ' { 'd' } else { c };

        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else if c.is_ascii() || c.is_whitespace() {
            pending_hyphen = true;
        }
    }

    slug
}

/// Slug of `source` made unique by a fragment of the document id.
pub fn slug_with_suffix(source: &str, id: &str) -> String {
    let suffix: String = id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(SUFFIX_LEN)
        .collect::<String>()
        .to_ascii_lowercase();
    let base = slugify(source);

    match (base.is_empty(), suffix.is_empty()) {
        (true, _) => suffix,
        (false, true) => base,
        (false, false) => format!("{}-{}", base, suffix),
    }
}
