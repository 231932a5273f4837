/// Password hashing and verification with bcrypt.

use bcrypt::{hash, verify, DEFAULT_COST};

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Hashes a password after checking strength requirements:
/// 8–128 characters with at least one digit, one lowercase, one uppercase.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    validate_password_strength(password)?;

    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("password verification failed: {}", e)))
}

fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }

    // Upper bound doubles as bcrypt input limit and DoS protection.
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        )));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(AppError::Validation(ValidationError::BadInput(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_and_verifies() {
        let password = "CorrectHorse1";
        let hashed = hash_password(password).expect("hashing failed");

        assert_ne!(password, hashed);
        assert!(hashed.starts_with("$2"));
        assert!(verify_password(password, &hashed).unwrap());
        assert!(!verify_password("WrongHorse1", &hashed).unwrap());
    }

    #[test]
    fn rejects_weak_passwords() {
        assert!(hash_password("Sh0rt").is_err());
        assert!(hash_password("nouppercase1").is_err());
        assert!(hash_password("NOLOWERCASE1").is_err());
        assert!(hash_password("NoDigitsHere").is_err());
        assert!(hash_password(&("a".repeat(MAX_PASSWORD_LENGTH) + "A1")).is_err());
    }
}
