//! Session environment.
//!
//! This module defines the environment type for dependency injection
//! in the session reducer.

use crate::gateway::TokenPersistenceGateway;
use crate::providers::{DurableStorage, IdentityProvider, TokenHandOff};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Why the session layer asked to be rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    /// The sign-out sequence finished.
    SignedOut,
}

impl ReloadReason {
    /// Whether the rebuilt layer may restore the provider's existing session.
    ///
    /// A sign-out reload never does: if the provider failed to sign out it
    /// still holds the old session, and restoring it would undo the sign-out.
    #[must_use]
    pub const fn restores_session(self) -> bool {
        match self {
            Self::SignedOut => false,
        }
    }
}

/// Sends reload requests to whoever owns the session store.
///
/// Reload means the owner discards the store with every subscription and
/// pending effect, then builds a fresh one.
#[derive(Debug, Clone)]
pub struct ReloadTrigger {
    tx: mpsc::UnboundedSender<ReloadReason>,
}

impl ReloadTrigger {
    /// Create a trigger and the receiving end.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ReloadReason>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Request a reload; a no-op if the owner is gone.
    pub fn request(&self, reason: ReloadReason) {
        if self.tx.send(reason).is_err() {
            tracing::debug!(?reason, "Reload requested after owner dropped");
        }
    }
}

/// Session environment.
///
/// Contains all external dependencies needed by the session reducer.
///
/// # Type Parameters
///
/// - `S`: Durable storage
/// - `P`: Identity provider
/// - `H`: Token hand-off collaborator
pub struct SessionEnvironment<S, P, H>
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    /// Durable storage shared with the provider.
    pub storage: Arc<S>,

    /// Identity provider client.
    pub provider: Arc<P>,

    /// Token hand-off collaborator.
    pub hand_off: Arc<H>,

    /// Token persistence gateway over `storage`.
    pub gateway: TokenPersistenceGateway<S>,

    /// Reload channel to the owning manager.
    pub reload: ReloadTrigger,
}

impl<S, P, H> SessionEnvironment<S, P, H>
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    /// Create a new session environment.
    #[must_use]
    pub const fn new(
        storage: Arc<S>,
        provider: Arc<P>,
        hand_off: Arc<H>,
        gateway: TokenPersistenceGateway<S>,
        reload: ReloadTrigger,
    ) -> Self {
        Self {
            storage,
            provider,
            hand_off,
            gateway,
            reload,
        }
    }
}

impl<S, P, H> Clone for SessionEnvironment<S, P, H>
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            provider: Arc::clone(&self.provider),
            hand_off: Arc::clone(&self.hand_off),
            gateway: self.gateway.clone(),
            reload: self.reload.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_out_reload_does_not_restore_session() {
        assert!(!ReloadReason::SignedOut.restores_session());
    }
}
