//! Signature hashing and lexical-key normalization shared by the analyzer
//! and the matcher.

use std::sync::LazyLock;

use regex::Regex;

/// Positional suffix attached to anonymous symbols, e.g. `App.useEffect$callback@L12`.
static POSITIONAL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@L\d+").expect("static regex"));

/// Instance suffix attached to branch qualified names, e.g. `f::if#2`.
static INSTANCE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\d+$").expect("static regex"));

/// Hash a normalized token stream. Tokens are joined by a single space so
/// that any whitespace between them is irrelevant.
pub fn hash_tokens<'a, I>(tokens: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = blake3::Hasher::new();
    let mut first = true;
    for token in tokens {
        if !first {
            hasher.update(b" ");
        }
        first = false;
        hasher.update(token.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Hash an arbitrary string after collapsing whitespace runs.
pub fn hash_text(text: &str) -> String {
    hash_tokens(text.split_whitespace())
}

/// Line-number-derived suffixes are stripped so a callback that moves keeps its identity.
pub fn strip_positional_suffix(qualified_name: &str) -> String {
    POSITIONAL_SUFFIX.replace_all(qualified_name, "").into_owned()
}

/// Strip both positional and trailing instance suffixes.
pub fn strip_instance_suffix(qualified_name: &str) -> String {
    let without_position = strip_positional_suffix(qualified_name);
    INSTANCE_SUFFIX.replace(&without_position, "").into_owned()
}

/// Collapse whitespace and lowercase a display snippet for keying.
pub fn normalize_snippet(snippet: &str) -> String {
    snippet
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
