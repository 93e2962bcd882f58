use anyhow::{anyhow, Result};
use isolang::Language;

/// Language utilities for ISO language code handling
///
/// The transcribe endpoint takes an optional language hint ("en", "zh",
/// "ko", ...). Engines expect ISO 639-1 codes, so hints are validated and
/// normalized here before a job is accepted.

/// Normalize a language code to ISO 639-1 (2-letter) format if possible,
/// falling back to ISO 639-3 when no 2-letter code exists
pub fn normalize_language_hint(code: &str) -> Result<String> {
    let normalized = code.trim().to_lowercase();

    if normalized.len() == 2 {
        if Language::from_639_1(&normalized).is_some() {
            return Ok(normalized);
        }
    } else if normalized.len() == 3 {
        if let Some(lang) = Language::from_639_3(&normalized) {
            if let Some(code_639_1) = lang.to_639_1() {
                return Ok(code_639_1.to_string());
            }
            return Ok(normalized);
        }
    }

    Err(anyhow!("Invalid language code: {}", code))
}

/// Check if two language codes refer to the same language
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_language_hint(code1), normalize_language_hint(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Get the English language name for a code, for log messages
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_language_hint(code)?;
    let lang = if normalized.len() == 2 {
        Language::from_639_1(&normalized)
    } else {
        Language::from_639_3(&normalized)
    };

    lang.map(|l| l.to_name().to_string())
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))
}
