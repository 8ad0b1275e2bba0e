//! Mock collaborator implementations for testing.
//!
//! This module provides simple, in-memory implementations of every provider
//! trait, with failure injection and call recording, for use in unit and
//! integration tests.

pub mod hand_off;
pub mod identity;
pub mod navigator;
pub mod storage;

pub use hand_off::MockTokenHandOff;
pub use identity::MockIdentityProvider;
pub use navigator::{Navigation, RecordingNavigator};
pub use storage::FlakyStorage;

use crate::state::{Session, User, UserId};
use chrono::{Duration, Utc};

/// Session for `user` with the given access token, valid for an hour.
#[must_use]
pub fn test_session(user: User, access_token: &str) -> Session {
    Session {
        access_token: access_token.to_string(),
        refresh_token: format!("{access_token}-refresh"),
        expires_at: Utc::now() + Duration::hours(1),
        provider_token: None,
        provider_refresh_token: None,
        user,
    }
}

/// Session from a federated provider sign-in, carrying provider tokens.
#[must_use]
pub fn federated_session(provider: &str, access_token: &str) -> Session {
    let user = User::new(UserId::new(), Some("listener@example.com".to_string()))
        .with_provider(provider)
        .with_metadata(serde_json::json!({ "full_name": "Test Listener" }));
    Session {
        provider_token: Some(format!("{provider}-access")),
        provider_refresh_token: Some(format!("{provider}-refresh")),
        ..test_session(user, access_token)
    }
}
