// src/utils/sanitize.rs

/// Sanitizes learner-supplied free text (e.g. retry-request reasons)
/// before storage. Whitelist-based: harmless inline markup survives,
/// scripts and event handlers do not. Returns None when nothing but
/// markup or whitespace was submitted.
pub fn clean_text(input: &str) -> Option<String> {
    let cleaned = ammonia::clean(input).trim().to_string();

    if cleaned.is_empty() { None } else { Some(cleaned) }
}
