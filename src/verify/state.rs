//! Verification state machine — tracks where a chat identity stands.

/// The states of a per-chat verification.
///
/// Idle → AwaitingCode → Verified. A reset returns any state to Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    /// No session exists for the chat.
    Idle,
    /// A code was issued and has not been matched yet.
    AwaitingCode,
    /// Code matched and the account was provisioned. The session is gone.
    Verified,
}

impl VerificationState {
    /// Check if a transition from `self` to `target` is valid.
    ///
    /// `AwaitingCode → AwaitingCode` covers both a mismatched code and a
    /// failed provisioning attempt.
    pub fn can_transition_to(&self, target: VerificationState) -> bool {
        use VerificationState::*;
        matches!(
            (self, target),
            (Idle, Idle)
                | (Idle, AwaitingCode)
                | (AwaitingCode, AwaitingCode)
                | (AwaitingCode, Verified)
                | (_, Idle)
        )
    }
}

impl Default for VerificationState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for VerificationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingCode => "awaiting_code",
            Self::Verified => "verified",
        };
        write!(f, "{s}")
    }
}
