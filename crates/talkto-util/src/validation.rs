use thiserror::Error;

pub const MAX_MESSAGE_CHARS: usize = 4000;
pub const MIN_SEARCH_CHARS: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("value is too short (min {min}, got {got})")]
    TooShort { min: usize, got: usize },
    #[error("value is too long (max {max}, got {got})")]
    TooLong { max: usize, got: usize },
}

/// Trims and length-checks message content, returning the text to store.
pub fn normalize_message_content(content: &str) -> Result<&str, ValidationError> {
    let trimmed = content.trim();
    let len = trimmed.chars().count();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > MAX_MESSAGE_CHARS {
        return Err(ValidationError::TooLong {
            max: MAX_MESSAGE_CHARS,
            got: len,
        });
    }
    Ok(trimmed)
}

/// Splits a search query into lowercase terms of at least two characters.
pub fn search_terms(query: &str) -> Result<Vec<String>, ValidationError> {
    let trimmed = query.trim();
    let len = trimmed.chars().count();
    if len < MIN_SEARCH_CHARS {
        return Err(ValidationError::TooShort {
            min: MIN_SEARCH_CHARS,
            got: len,
        });
    }
    let mut terms: Vec<String> = trimmed
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| t.chars().count() >= MIN_SEARCH_CHARS)
        .collect();
    terms.sort();
    terms.dedup();
    if terms.is_empty() {
        return Err(ValidationError::TooShort {
            min: MIN_SEARCH_CHARS,
            got: 0,
        });
    }
    Ok(terms)
}
