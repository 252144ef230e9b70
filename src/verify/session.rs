//! Verification session model.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Maximum username length accepted by the panel.
const MAX_USERNAME_LEN: usize = 32;

/// Opaque chat identity. Holds the string form of the Telegram chat id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(String);

impl ChatId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A 6-digit numeric verification code. Leading zeros are significant.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationCode(String);

impl VerificationCode {
    /// Draw a fresh code from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
        Self(format!("{n:06}"))
    }

    #[cfg(test)]
    pub(crate) fn from_digits(digits: &str) -> Self {
        Self(digits.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact comparison against user input. Surrounding whitespace is
    /// ignored, nothing else is normalized.
    pub fn matches(&self, input: &str) -> bool {
        self.0 == input.trim()
    }
}

// Codes are secrets; keep them out of `{:?}` log output.
impl std::fmt::Debug for VerificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VerificationCode(******)")
    }
}

/// An in-flight email verification for one chat identity.
#[derive(Debug, Clone)]
pub struct VerificationSession {
    pub chat_id: ChatId,
    pub email: String,
    pub username: String,
    pub code: VerificationCode,
    pub created_at: DateTime<Utc>,
}

impl VerificationSession {
    /// Start a session with a freshly drawn code.
    pub fn issue(chat_id: ChatId, email: &str) -> Self {
        let username = derive_username(&chat_id, email);
        Self {
            chat_id,
            email: email.to_string(),
            username,
            code: VerificationCode::generate(),
            created_at: Utc::now(),
        }
    }
}

/// Map a chat identity and email to a panel username.
///
/// The result is `<local part>_<chat id>`, restricted to `[a-z0-9_]` and at
/// most 32 characters. The chat id suffix is never truncated.
pub fn derive_username(chat_id: &ChatId, email: &str) -> String {
    let id: String = chat_id
        .as_str()
        .chars()
        .map(|c| match c {
            '-' => 'n',
            c if c.is_ascii_alphanumeric() => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect();

    let local = email.split('@').next().unwrap_or_default();
    let budget = MAX_USERNAME_LEN.saturating_sub(id.len() + 1);
    let mut prefix: String = local
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(budget)
        .collect();
    if prefix.is_empty() {
        prefix.push('u');
    }

    format!("{prefix}_{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_six_digits() {
        let re = regex::Regex::new(r"^\d{6}$").unwrap();
        for _ in 0..1000 {
            let code = VerificationCode::generate();
            assert!(re.is_match(code.as_str()), "bad code {}", code.as_str());
        }
    }

    #[test]
    fn codes_are_freshly_drawn() {
        let mut repeats = 0;
        let mut previous = VerificationCode::generate();
        for _ in 0..200 {
            let next = VerificationCode::generate();
            if next == previous {
                repeats += 1;
            }
            previous = next;
        }
        // One in a million per draw; a handful would mean a broken generator.
        assert!(repeats <= 1, "{repeats} consecutive repeats");
    }

    #[test]
    fn code_comparison_is_exact() {
        let code = VerificationCode("012345".into());
        assert!(code.matches("012345"));
        assert!(code.matches(" 012345\n"));
        assert!(!code.matches("12345"));
        assert!(!code.matches("0123456"));
        assert!(!code.matches("O12345"));
    }

    #[test]
    fn code_debug_is_redacted() {
        let code = VerificationCode("654321".into());
        assert!(!format!("{code:?}").contains("654321"));
    }

    #[test]
    fn username_is_stable() {
        let chat = ChatId::from(42);
        assert_eq!(
            derive_username(&chat, "Jane.Doe@example.org"),
            derive_username(&chat, "Jane.Doe@example.org")
        );
        assert_eq!(derive_username(&chat, "Jane.Doe@example.org"), "jane_doe_42");
    }

    #[test]
    fn username_differs_per_chat() {
        let email = "jane@example.org";
        assert_ne!(
            derive_username(&ChatId::from(1), email),
            derive_username(&ChatId::from(2), email)
        );
    }

    #[test]
    fn username_fits_panel_limits() {
        let chat = ChatId::from(-1001234567890_i64);
        let name = derive_username(&chat, &format!("{}@example.org", "a".repeat(64)));
        assert!(name.len() <= 32, "{name} too long");
        assert!(name.ends_with("_n1001234567890"));
        assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
    }

    #[test]
    fn issue_populates_session() {
        let session = VerificationSession::issue(ChatId::from(7), "bob@example.org");
        assert_eq!(session.chat_id.as_str(), "7");
        assert_eq!(session.email, "bob@example.org");
        assert_eq!(session.username, "bob_7");
        assert_eq!(session.code.as_str().len(), 6);
    }
}
