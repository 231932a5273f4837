/// Input validators for the public API surface.
///
/// Length limits double as DoS protection: nothing oversized reaches the
/// password hasher, the store, or the AI client.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MIN_EMAIL_LENGTH: usize = 5;
const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MAX_NAME_LENGTH: usize = 256;
const MAX_PROMPT_LENGTH: usize = 1000;
const MAX_POST_CONTENT_LENGTH: usize = 3000;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();
}

/// Validates and normalizes an email address.
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }
    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }
    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }
    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    Ok(trimmed.to_lowercase())
}

/// Validates a display name: non-empty, printable, bounded.
pub fn is_valid_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("name".to_string()));
    }
    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong("name".to_string(), MAX_NAME_LENGTH));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat("name".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates an AI generation prompt.
pub fn is_valid_prompt(prompt: &str) -> Result<String, ValidationError> {
    let trimmed = prompt.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("prompt".to_string()));
    }
    if trimmed.len() > MAX_PROMPT_LENGTH {
        return Err(ValidationError::TooLong("prompt".to_string(), MAX_PROMPT_LENGTH));
    }

    Ok(trimmed.to_string())
}

/// Validates post content against the platform ceiling.
pub fn is_valid_post_content(content: &str) -> Result<String, ValidationError> {
    let trimmed = content.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("content".to_string()));
    }
    if trimmed.len() > MAX_POST_CONTENT_LENGTH {
        return Err(ValidationError::TooLong(
            "content".to_string(),
            MAX_POST_CONTENT_LENGTH,
        ));
    }

    Ok(trimmed.to_string())
}
