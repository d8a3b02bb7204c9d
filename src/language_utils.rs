use anyhow::{Result, anyhow};
use isolang::Language;

/// Language utilities for repository language tags
///
/// Repositories declare languages as short tags such as `en`, `fr` or
/// `zh-CN`. Prompts, commit text and the index document want readable
/// names, which come from a fixed table first and ISO 639 data second.
const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("en", "English"),
    ("zh-CN", "Chinese (Simplified)"),
    ("zh-TW", "Chinese (Traditional)"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("ru", "Russian"),
    ("pt", "Portuguese"),
    ("it", "Italian"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("tr", "Turkish"),
    ("vi", "Vietnamese"),
    ("th", "Thai"),
    ("id", "Indonesian"),
    ("ms", "Malay"),
];

/// The part of a tag before any region, lowercased (`zh-CN` -> `zh`)
pub fn primary_subtag(code: &str) -> String {
    code.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn iso_language(code: &str) -> Option<Language> {
    let primary = primary_subtag(code);
    match primary.len() {
        2 => Language::from_639_1(&primary),
        3 => Language::from_639_3(&primary),
        _ => None,
    }
}

/// Human readable name for a language tag
///
/// Unknown tags come back unchanged so callers can always interpolate the
/// result into text.
pub fn get_language_name(code: &str) -> String {
    let trimmed = code.trim();
    if let Some((_, name)) = LANGUAGE_NAMES
        .iter()
        .find(|(tag, _)| tag.eq_ignore_ascii_case(trimmed))
    {
        return (*name).to_string();
    }

    match iso_language(trimmed) {
        Some(language) => language.to_name().to_string(),
        None => trimmed.to_string(),
    }
}

/// Check that a tag is either in the known table or has an ISO 639 primary subtag
pub fn validate_language_code(code: &str) -> Result<()> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Language code cannot be empty"));
    }
    if LANGUAGE_NAMES
        .iter()
        .any(|(tag, _)| tag.eq_ignore_ascii_case(trimmed))
        || iso_language(trimmed).is_some()
    {
        Ok(())
    } else {
        Err(anyhow!("Invalid language code: {}", code))
    }
}

/// Compare two tags case-insensitively, treating `_` and `-` as equal
pub fn language_codes_match(a: &str, b: &str) -> bool {
    let normalize = |code: &str| code.trim().replace('_', "-").to_lowercase();
    normalize(a) == normalize(b)
}
