// Common validation types and input checks

#[derive(Debug)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.is_valid = false;
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimum accepted password length for new passwords set via the reset flow.
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Validate a candidate password. Length-bounded; no composition rules.
pub fn validate_password(password: &str) -> ValidationResult {
    let mut result = ValidationResult::new();

    if password.len() < MIN_PASSWORD_LENGTH {
        result.add_error(
            "password",
            &format!("must be at least {} characters", MIN_PASSWORD_LENGTH),
        );
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        result.add_error(
            "password",
            &format!("must be at most {} characters", MAX_PASSWORD_LENGTH),
        );
    }

    result
}

/// Cheap structural email check. The credential store is the authority on
/// whether an address exists; this only rejects obvious garbage early.
pub fn validate_email(email: &str) -> ValidationResult {
    let mut result = ValidationResult::new();

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || !parts[1].contains('.') {
        result.add_error("email", "invalid email address");
    }
    if email.len() > 254 {
        result.add_error("email", "email address too long");
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_length_bounds() {
        assert!(!validate_password("short").is_valid);
        assert!(validate_password("longenough1").is_valid);
        assert!(!validate_password(&"x".repeat(200)).is_valid);
    }

    #[test]
    fn test_email_shape() {
        assert!(validate_email("user@example.com").is_valid);
        assert!(!validate_email("no-at-sign").is_valid);
        assert!(!validate_email("@example.com").is_valid);
        assert!(!validate_email("user@nodot").is_valid);
    }
}
