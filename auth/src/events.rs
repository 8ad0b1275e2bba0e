//! Identity provider events.

use crate::state::Session;
use serde::{Deserialize, Serialize};

/// Kind of auth state change announced by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    /// A user signed in.
    SignedIn,
    /// The session ended (locally, remotely, or by expiry).
    SignedOut,
    /// The access token was refreshed.
    TokenRefreshed,
    /// The user's profile changed.
    UserUpdated,
}

impl AuthEventKind {
    /// Wire name of the event kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated => "USER_UPDATED",
        }
    }

    /// Returns `true` for kinds that must carry a session.
    #[must_use]
    pub const fn carries_session(self) -> bool {
        !matches!(self, Self::SignedOut)
    }
}

impl std::fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event from the identity provider's auth stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthEvent {
    /// What happened.
    pub kind: AuthEventKind,

    /// The session after the change, if any.
    pub session: Option<Session>,
}

impl AuthEvent {
    /// `SIGNED_IN` with a session.
    #[must_use]
    pub const fn signed_in(session: Session) -> Self {
        Self {
            kind: AuthEventKind::SignedIn,
            session: Some(session),
        }
    }

    /// `TOKEN_REFRESHED` with the refreshed session.
    #[must_use]
    pub const fn token_refreshed(session: Session) -> Self {
        Self {
            kind: AuthEventKind::TokenRefreshed,
            session: Some(session),
        }
    }

    /// `SIGNED_OUT` without a session.
    #[must_use]
    pub const fn signed_out() -> Self {
        Self {
            kind: AuthEventKind::SignedOut,
            session: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(AuthEventKind::SignedIn.to_string(), "SIGNED_IN");
        assert_eq!(
            serde_json::to_string(&AuthEventKind::TokenRefreshed).unwrap_or_default(),
            "\"TOKEN_REFRESHED\""
        );
    }

    #[test]
    fn test_session_carrying_kinds() {
        assert!(AuthEventKind::SignedIn.carries_session());
        assert!(AuthEventKind::UserUpdated.carries_session());
        assert!(!AuthEventKind::SignedOut.carries_session());
        assert!(AuthEvent::signed_out().session.is_none());
    }
}
