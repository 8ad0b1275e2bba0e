//! Session state types.
//!
//! This module defines the canonical `{user, session, loading}` state and the
//! identity types it is built from. All types are `Clone` so the store can
//! publish whole snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Unique identifier for a user, as issued by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub uuid::Uuid);

impl UserId {
    /// Generate a new random `UserId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Identity
// ═══════════════════════════════════════════════════════════════════════

/// Provider-controlled metadata describing how the user signed in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Provider used for the current sign-in (e.g. `spotify`, `email`).
    #[serde(default)]
    pub provider: Option<String>,

    /// Every provider linked to the account.
    #[serde(default)]
    pub providers: Vec<String>,
}

/// Authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User ID.
    pub id: UserId,

    /// Email address, if the provider shared one.
    #[serde(default)]
    pub email: Option<String>,

    /// User-editable metadata (profile fields from the OAuth provider).
    #[serde(default)]
    pub user_metadata: serde_json::Value,

    /// Provider-controlled metadata.
    #[serde(default)]
    pub app_metadata: AppMetadata,
}

impl User {
    /// Create a user with empty metadata.
    #[must_use]
    pub fn new(id: UserId, email: Option<String>) -> Self {
        Self {
            id,
            email,
            user_metadata: serde_json::Value::Null,
            app_metadata: AppMetadata::default(),
        }
    }

    /// Set the sign-in provider.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        let provider = provider.into();
        if !self.app_metadata.providers.contains(&provider) {
            self.app_metadata.providers.push(provider.clone());
        }
        self.app_metadata.provider = Some(provider);
        self
    }

    /// Set the user metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.user_metadata = metadata;
        self
    }

    /// Provider used for the current sign-in.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.app_metadata.provider.as_deref()
    }
}

/// Session issued by the identity provider.
///
/// A session always carries its user. `Debug` output redacts every token.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token for authenticated requests.
    pub access_token: String,

    /// Token used by the provider to refresh the session.
    pub refresh_token: String,

    /// Access token expiry (unix seconds on the wire).
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,

    /// OAuth access token of the upstream provider.
    #[serde(default)]
    pub provider_token: Option<String>,

    /// OAuth refresh token of the upstream provider.
    #[serde(default)]
    pub provider_refresh_token: Option<String>,

    /// The session's user.
    pub user: User,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const REDACTED: &str = "<redacted>";
        f.debug_struct("Session")
            .field("access_token", &REDACTED)
            .field("refresh_token", &REDACTED)
            .field("expires_at", &self.expires_at)
            .field("provider_token", &self.provider_token.as_ref().map(|_| REDACTED))
            .field(
                "provider_refresh_token",
                &self.provider_refresh_token.as_ref().map(|_| REDACTED),
            )
            .field("user", &self.user)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Core State
// ═══════════════════════════════════════════════════════════════════════

/// Canonical authentication state.
///
/// While `loading` is `true` neither `user` nor `session` may be relied on.
/// Once loaded, `user` is present exactly when `session` is.
///
/// # Examples
///
/// ```
/// # use session_guard_auth::AuthState;
/// let state = AuthState::default();
/// assert!(state.loading);
/// assert!(!state.is_authenticated());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    /// Signed-in user.
    pub user: Option<User>,

    /// Active session.
    pub session: Option<Session>,

    /// `true` until the existing-session check or the first event resolves.
    pub loading: bool,
}

impl AuthState {
    /// Loaded state for an optional session.
    #[must_use]
    pub fn from_session(session: Option<Session>) -> Self {
        Self {
            user: session.as_ref().map(|s| s.user.clone()),
            session,
            loading: false,
        }
    }

    /// Loaded, signed-out state.
    #[must_use]
    pub const fn signed_out() -> Self {
        Self {
            user: None,
            session: None,
            loading: false,
        }
    }

    /// Returns `true` once loaded with a session.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        !self.loading && self.session.is_some()
    }

    /// Returns `true` if `user` and `session` agree, or the state is loading.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.loading || self.user.is_some() == self.session.is_some()
    }

    /// ID of the signed-in user.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            user: None,
            session: None,
            loading: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Durable Records
// ═══════════════════════════════════════════════════════════════════════

/// Token record as the identity provider writes it to durable storage.
///
/// Only `access_token` is required; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Persisted access token.
    pub access_token: String,

    /// Persisted refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Expiry in unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl TokenRecord {
    /// Record for a session, as the provider would persist it.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            access_token: session.access_token.clone(),
            refresh_token: Some(session.refresh_token.clone()),
            expires_at: Some(session.expires_at.timestamp()),
        }
    }

    /// Parse a stored record.
    ///
    /// # Errors
    ///
    /// Returns the parser error for malformed content.
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Serialize for storage.
    ///
    /// # Errors
    ///
    /// Returns the serializer error (not expected for this shape).
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Provider tokens forwarded to the hand-off collaborator.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct HandOffPayload {
    /// Upstream OAuth access token.
    pub provider_token: String,

    /// Upstream OAuth refresh token.
    pub provider_refresh_token: Option<String>,

    /// Profile data from the upstream provider.
    pub user_metadata: serde_json::Value,
}

impl HandOffPayload {
    /// Payload for a session; `None` without a provider token.
    #[must_use]
    pub fn from_session(session: &Session) -> Option<Self> {
        Some(Self {
            provider_token: session.provider_token.clone()?,
            provider_refresh_token: session.provider_refresh_token.clone(),
            user_metadata: session.user.user_metadata.clone(),
        })
    }
}

impl std::fmt::Debug for HandOffPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandOffPayload")
            .field("provider_token", &"<redacted>")
            .field(
                "provider_refresh_token",
                &self.provider_refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("user_metadata", &self.user_metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session() -> Session {
        Session {
            access_token: "access-secret".into(),
            refresh_token: "refresh-secret".into(),
            expires_at: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default(),
            provider_token: Some("provider-secret".into()),
            provider_refresh_token: None,
            user: User::new(UserId::new(), Some("a@example.com".into())).with_provider("spotify"),
        }
    }

    #[test]
    fn test_default_state_is_loading() {
        let state = AuthState::default();
        assert!(state.loading);
        assert!(state.is_consistent());
        assert!(!state.is_authenticated());
    }

    #[test]
    fn test_from_session_links_user() {
        let session = session();
        let state = AuthState::from_session(Some(session.clone()));
        assert_eq!(state.user.as_ref(), Some(&session.user));
        assert!(state.is_authenticated());
        assert!(state.is_consistent());
        assert!(AuthState::from_session(None).is_consistent());
    }

    #[test]
    fn test_inconsistent_state_detected() {
        let state = AuthState {
            user: Some(session().user),
            session: None,
            loading: false,
        };
        assert!(!state.is_consistent());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let rendered = format!("{:?}", session());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));

        let payload = HandOffPayload::from_session(&session());
        assert!(!format!("{payload:?}").contains("secret"));
    }

    #[test]
    fn test_session_wire_format_uses_unix_seconds() {
        let json = serde_json::to_value(session()).unwrap_or_default();
        assert_eq!(json["expires_at"], 1_700_000_000);
        assert_eq!(json["user"]["app_metadata"]["provider"], "spotify");
    }

    #[test]
    fn test_token_record_ignores_unknown_fields() {
        let record = TokenRecord::parse(
            r#"{"access_token":"abc","token_type":"bearer","user":{"id":"x"}}"#,
        );
        assert_eq!(record.ok().map(|r| r.access_token), Some("abc".to_string()));
        assert!(TokenRecord::parse("{not json").is_err());
    }

    #[test]
    fn test_hand_off_payload_requires_provider_token() {
        let mut session = session();
        assert!(HandOffPayload::from_session(&session).is_some());
        session.provider_token = None;
        assert!(HandOffPayload::from_session(&session).is_none());
    }
}
