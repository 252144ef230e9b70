//! Email address checks applied before a code is issued.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern compiles")
});

/// Whether `email` is a syntactically well-formed address.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Accepts addresses ending with a configured suffix such as `@example.org`.
#[derive(Debug, Clone)]
pub struct EmailPolicy {
    allowed_suffix: String,
}

impl EmailPolicy {
    pub fn new(allowed_suffix: impl Into<String>) -> Self {
        Self {
            allowed_suffix: allowed_suffix.into(),
        }
    }

    pub fn allowed_suffix(&self) -> &str {
        &self.allowed_suffix
    }

    /// Trim and validate submitted text. Returns the address to verify.
    ///
    /// The suffix comparison ignores ASCII case.
    pub fn check(&self, input: &str) -> Result<String, ValidationError> {
        let email = input.trim();
        if !is_valid_email(email) {
            return Err(ValidationError::MalformedEmail(email.to_string()));
        }

        let suffix = self.allowed_suffix.to_ascii_lowercase();
        if !email.to_ascii_lowercase().ends_with(&suffix) {
            return Err(ValidationError::DomainNotAllowed {
                email: email.to_string(),
                allowed: self.allowed_suffix.clone(),
            });
        }

        Ok(email.to_string())
    }
}
