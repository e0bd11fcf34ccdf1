//! Slug generation for ids derived from human names

/// Turn free text into an id fragment ("Override Brightness" -> "override_brightness")
///
/// Matches HA's `slugify`: transliterated to ASCII, lowercased, runs of
/// anything else collapse into a single `_`, no leading or trailing `_`.
/// Empty input yields `"unknown"`.
pub fn slugify(text: &str) -> String {
    let slug = ::slug::slugify(text).replace('-', "_");
    if slug.is_empty() {
        crate::STATE_UNKNOWN.to_string()
    } else {
        slug
    }
}
