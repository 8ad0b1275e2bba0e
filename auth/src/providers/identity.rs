//! Identity provider trait.

use crate::error::Result;
use crate::events::AuthEvent;
use crate::state::Session;
use tokio::sync::broadcast;

/// Scope of a provider sign-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignOutScope {
    /// Revoke every session of the user.
    #[default]
    Global,
    /// End only this client's session.
    Local,
    /// Revoke every session except this one.
    Others,
}

impl SignOutScope {
    /// Wire name of the scope.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Local => "local",
            Self::Others => "others",
        }
    }
}

/// Identity provider client.
///
/// Token issuance and refresh happen inside the provider; the session layer
/// only reads sessions, listens to events and requests sign-out.
pub trait IdentityProvider: Send + Sync + 'static {
    /// The session persisted by the provider, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the provider cannot be reached or its stored session
    /// is unreadable.
    fn get_session(&self) -> impl std::future::Future<Output = Result<Option<Session>>> + Send;

    /// Sign out through the provider.
    ///
    /// # Errors
    ///
    /// Returns error if the revocation request fails.
    fn sign_out(
        &self,
        scope: SignOutScope,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Subscribe to auth events.
    ///
    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
