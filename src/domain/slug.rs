//! Deterministic slug derivation for post URLs.
//!
//! Bridges ASCII slugification (`slug` crate) with Chinese transliteration
//! (`pinyin` crate) so titles like “基线对齐” become `ji-xian-dui-qi`. The
//! store falls back to the post id when a title yields no usable characters,
//! so derivation failures never block a save.

use pinyin::{Pinyin, ToPinyin};
use slug::slugify;
use thiserror::Error;

/// Upper bound on derived slug length, in characters.
const MAX_SLUG_CHARS: usize = 80;

/// Errors that can occur while deriving a slug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
}

/// Derive a slug from the provided human-readable text.
///
/// Lowercases, transliterates non-ASCII input, collapses runs of
/// non-alphanumeric characters into single hyphens, trims edge hyphens, and
/// caps the result at [`MAX_SLUG_CHARS`].
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let transliterated = transliterate_to_ascii(input);
    let candidate = slugify(&transliterated);

    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(truncate_slug(candidate))
}

fn truncate_slug(slug: String) -> String {
    if slug.chars().count() <= MAX_SLUG_CHARS {
        return slug;
    }
    let capped: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    capped.trim_end_matches('-').to_string()
}

fn transliterate_to_ascii(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
            continue;
        }

        match ch.to_pinyin() {
            Some(py) => append_pinyin(&mut output, py),
            None if ch.is_whitespace() => output.push(' '),
            None => {
                // Preserve unhandled characters so slugify can decide how to filter them.
                output.push(ch);
            }
        }
    }

    output
}

fn append_pinyin(buffer: &mut String, pinyin: Pinyin) {
    if !buffer.is_empty() && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(pinyin.plain());
}
