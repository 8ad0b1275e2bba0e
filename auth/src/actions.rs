//! Session actions.
//!
//! Every input to the session reducer: provider events, consumer commands and
//! the results of effects.

use crate::error::SessionError;
use crate::events::AuthEvent;
use crate::state::{HandOffPayload, Session, UserId};

/// Session action.
///
/// # Architecture Note
///
/// Actions are the **only** way to change the canonical auth state. The
/// reducer is a pure function: `(State, Action, Env) → (State, Effects)`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    // ═══════════════════════════════════════════════════════════════════════
    // Provider Input
    // ═══════════════════════════════════════════════════════════════════════
    /// Result of the existing-session check at startup.
    ///
    /// Ignored if an event already resolved the state.
    InitialSessionResolved {
        /// Session the provider had persisted, if any.
        session: Option<Session>,
    },

    /// An event from the provider's auth stream.
    AuthEventReceived(AuthEvent),

    // ═══════════════════════════════════════════════════════════════════════
    // Commands
    // ═══════════════════════════════════════════════════════════════════════
    /// Sign out: clear state, purge storage, revoke globally, reload.
    SignOut,

    // ═══════════════════════════════════════════════════════════════════════
    // Effect Results
    // ═══════════════════════════════════════════════════════════════════════
    /// The token persistence wait settled.
    TokenPersistenceSettled {
        /// `false` if the wait hit its budget.
        persisted: bool,
    },

    /// The settle delay after a federated sign-in elapsed.
    HandOffDue {
        /// User who signed in.
        user_id: UserId,
        /// Provider tokens captured from the sign-in session.
        payload: HandOffPayload,
    },

    /// The hand-off collaborator returned.
    HandOffFinished {
        /// User whose tokens were handed off.
        user_id: UserId,
        /// Collaborator failure, if any.
        error: Option<SessionError>,
    },

    /// Storage was purged and the provider sign-out returned.
    SignOutCompleted {
        /// Provider sign-out failure, if any.
        provider_error: Option<SessionError>,
        /// Number of storage keys removed.
        purged_keys: usize,
    },
}
