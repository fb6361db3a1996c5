//! Password strength policy for new vault passwords
//!
//! Applied when a password is chosen (initialize, password change), never
//! when one is presented for unlocking.

use crate::{Error, Result};

/// Minimum length for a new password
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Recommended length for a new password
pub const RECOMMENDED_PASSWORD_LENGTH: usize = 12;

/// Password strength levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PasswordStrength {
    /// Weak: < 8 characters
    Weak,
    /// Fair: 8-11 characters, or little variety
    Fair,
    /// Good: 12-15 characters with variety
    Good,
    /// Strong: 16+ characters with variety
    Strong,
}

impl PasswordStrength {
    /// Check if password meets minimum requirements
    pub fn is_acceptable(&self) -> bool {
        *self >= PasswordStrength::Fair
    }
}

/// Evaluate password strength
pub fn evaluate_strength(password: &str) -> PasswordStrength {
    let len = password.chars().count();
    let has_lower = password.chars().any(|c| c.is_lowercase());
    let has_upper = password.chars().any(|c| c.is_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric());

    let variety_score = [has_lower, has_upper, has_digit, has_special]
        .iter()
        .filter(|&&b| b)
        .count();

    if len < MIN_PASSWORD_LENGTH {
        PasswordStrength::Weak
    } else if len < RECOMMENDED_PASSWORD_LENGTH || variety_score < 2 {
        PasswordStrength::Fair
    } else if len < 16 || variety_score < 3 {
        PasswordStrength::Good
    } else {
        PasswordStrength::Strong
    }
}

/// Validate a newly chosen password
pub fn validate_new_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::WeakPassword(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_LENGTH
        )));
    }
    if password.trim().is_empty() {
        return Err(Error::WeakPassword(
            "Password cannot be only whitespace.".to_string(),
        ));
    }
    if !evaluate_strength(password).is_acceptable() {
        return Err(Error::WeakPassword(
            "Use letters, numbers, and symbols.".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_evaluation() {
        assert_eq!(evaluate_strength("short"), PasswordStrength::Weak);
        assert_eq!(evaluate_strength("password1"), PasswordStrength::Fair);
        assert_eq!(evaluate_strength("aaaaaaaaaaaaaaaa"), PasswordStrength::Fair);
        assert_eq!(evaluate_strength("MyPassword123"), PasswordStrength::Good);
        assert_eq!(evaluate_strength("Correct1!Password"), PasswordStrength::Strong);
    }

    #[test]
    fn test_validate_new_password() {
        assert!(validate_new_password("short").is_err());
        assert!(validate_new_password("        ").is_err());
        assert!(validate_new_password("password1").is_ok());
        assert!(validate_new_password("Correct1!Password").is_ok());
    }

    #[test]
    fn test_weak_password_category() {
        let err = validate_new_password("abc").unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Validation);
    }
}
