//! Auth session reducer.
//!
//! Owns the canonical `{user, session, loading}` state.
//!
//! # Flow
//!
//! ```text
//! InitialSessionResolved ─▶ state loaded
//! SIGNED_IN / TOKEN_REFRESHED ─▶ state replaced ─▶ gateway wait (cancellable)
//! SIGNED_IN (hand-off provider) ─▶ Delay(settle) ─▶ HandOffDue ─▶ hand-off ─▶ HandOffFinished
//! SignOut ─▶ state cleared ─▶ reset gateway, purge storage, provider sign-out ─▶ SignOutCompleted ─▶ reload
//! ```

use crate::actions::SessionAction;
use crate::config::{SessionConfig, StorageKeyPattern};
use crate::constants::effect_ids::{TOKEN_HAND_OFF, TOKEN_PERSISTENCE};
use crate::environment::{ReloadReason, SessionEnvironment};
use crate::events::{AuthEvent, AuthEventKind};
use crate::providers::{DurableStorage, IdentityProvider, SignOutScope, TokenHandOff};
use crate::state::{AuthState, HandOffPayload, Session};
use session_guard_core::effect::Effect;
use session_guard_core::reducer::Reducer;
use session_guard_core::{smallvec, SmallVec};
use std::marker::PhantomData;
use std::sync::Arc;

type Effects = SmallVec<[Effect<SessionAction>; 4]>;

/// Auth session reducer.
///
/// Applies provider events atomically and schedules the side work that
/// follows them: token persistence waits, delayed token hand-off, and the
/// sign-out sequence.
#[derive(Debug, Clone)]
pub struct SessionReducer<S, P, H> {
    config: SessionConfig,
    _phantom: PhantomData<fn() -> (S, P, H)>,
}

impl<S, P, H> SessionReducer<S, P, H>
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    /// Create a new session reducer.
    #[must_use]
    pub const fn new(config: SessionConfig) -> Self {
        Self {
            config,
            _phantom: PhantomData,
        }
    }

    /// The reducer configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn on_auth_event(
        &self,
        state: &mut AuthState,
        event: AuthEvent,
        env: &SessionEnvironment<S, P, H>,
    ) -> Effects {
        metrics::counter!("session.events.received", "kind" => event.kind.as_str()).increment(1);

        match (event.kind, event.session) {
            (AuthEventKind::SignedOut, _) => {
                tracing::info!("Provider signed out");
                *state = AuthState::signed_out();
                let gateway = env.gateway.clone();
                smallvec![
                    Effect::Cancel(TOKEN_HAND_OFF),
                    Effect::Cancel(TOKEN_PERSISTENCE),
                    Effect::future(async move {
                        gateway.reset();
                        None
                    }),
                ]
            },
            (kind, None) => {
                tracing::warn!(%kind, "Auth event without a session ignored");
                smallvec![Effect::None]
            },
            (kind, Some(session)) => {
                tracing::debug!(%kind, user_id = %session.user.id, "Session updated");
                *state = AuthState::from_session(Some(session.clone()));

                let mut effects = Effects::new();
                if matches!(kind, AuthEventKind::SignedIn | AuthEventKind::TokenRefreshed) {
                    effects.extend(wait_for_persistence(env, session.clone()));
                }
                if kind == AuthEventKind::SignedIn {
                    effects.extend(self.schedule_hand_off(&session));
                }
                if effects.is_empty() {
                    effects.push(Effect::None);
                }
                effects
            },
        }
    }

    /// Settle delay then `HandOffDue`, replacing any pending hand-off.
    fn schedule_hand_off(&self, session: &Session) -> Effects {
        let Some(provider) = session.user.provider() else {
            return Effects::new();
        };
        if !self.config.hands_off(provider) {
            return Effects::new();
        }
        let Some(payload) = HandOffPayload::from_session(session) else {
            tracing::warn!(provider, "Federated sign-in without provider token, skipping hand-off");
            return Effects::new();
        };

        tracing::debug!(
            provider,
            settle_delay = ?self.config.settle_delay,
            "Scheduling token hand-off"
        );
        smallvec![
            Effect::Cancel(TOKEN_HAND_OFF),
            Effect::Delay {
                duration: self.config.settle_delay,
                action: Box::new(SessionAction::HandOffDue {
                    user_id: session.user.id,
                    payload,
                }),
            }
            .cancellable(TOKEN_HAND_OFF),
        ]
    }

    fn sign_out(&self, state: &mut AuthState, env: &SessionEnvironment<S, P, H>) -> Effects {
        tracing::info!(user_id = ?state.user_id(), "Signing out");
        metrics::counter!("session.sign_out.total").increment(1);

        *state = AuthState::signed_out();

        let gateway = env.gateway.clone();
        let storage = Arc::clone(&env.storage);
        let provider = Arc::clone(&env.provider);
        let pattern = self.config.gateway.storage_key.clone();

        smallvec![
            Effect::Cancel(TOKEN_HAND_OFF),
            Effect::Cancel(TOKEN_PERSISTENCE),
            Effect::future(async move {
                gateway.reset();
                let purged_keys = purge_auth_keys(storage.as_ref(), &pattern);
                let provider_error = provider.sign_out(SignOutScope::Global).await.err();
                if let Some(error) = &provider_error {
                    tracing::warn!(%error, "Provider sign-out failed, continuing with local cleanup");
                }
                Some(SessionAction::SignOutCompleted {
                    provider_error,
                    purged_keys,
                })
            }),
        ]
    }
}

/// Restart the gateway wait for `session`, replacing any in-flight wait.
fn wait_for_persistence<S, P, H>(env: &SessionEnvironment<S, P, H>, session: Session) -> Effects
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    let gateway = env.gateway.clone();
    smallvec![
        Effect::Cancel(TOKEN_PERSISTENCE),
        Effect::future(async move {
            let persisted = gateway.wait_for_token_persistence(&session).await;
            Some(SessionAction::TokenPersistenceSettled { persisted })
        })
        .cancellable(TOKEN_PERSISTENCE),
    ]
}

/// Remove every auth key; failures are logged and skipped.
fn purge_auth_keys<S: DurableStorage>(storage: &S, pattern: &StorageKeyPattern) -> usize {
    let keys = match storage.list_keys() {
        Ok(keys) => keys,
        Err(error) => {
            tracing::warn!(%error, "Could not list storage keys for purge");
            return 0;
        },
    };

    keys.iter()
        .filter(|key| pattern.is_auth_key(key))
        .filter(|key| match storage.remove(key) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(key = %key, %error, "Failed to purge storage key");
                false
            },
        })
        .count()
}

impl<S, P, H> Reducer for SessionReducer<S, P, H>
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    type State = AuthState;
    type Action = SessionAction;
    type Environment = SessionEnvironment<S, P, H>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ═══════════════════════════════════════════════════════════════════
            // Provider Input
            // ═══════════════════════════════════════════════════════════════════
            SessionAction::InitialSessionResolved { session } => {
                if !state.loading {
                    tracing::debug!("Existing-session check resolved after an event, keeping newer state");
                    return smallvec![Effect::None];
                }
                *state = AuthState::from_session(session);
                tracing::debug!(authenticated = state.is_authenticated(), "Initial session resolved");
                smallvec![Effect::None]
            },

            SessionAction::AuthEventReceived(event) => self.on_auth_event(state, event, env),

            // ═══════════════════════════════════════════════════════════════════
            // Token Hand-Off
            // ═══════════════════════════════════════════════════════════════════
            SessionAction::HandOffDue { user_id, payload } => {
                if state.user_id() != Some(user_id) {
                    tracing::debug!(%user_id, "User changed before hand-off, skipping");
                    return smallvec![Effect::None];
                }

                let hand_off = Arc::clone(&env.hand_off);
                smallvec![Effect::future(async move {
                    let error = hand_off.hand_off(payload).await.err();
                    Some(SessionAction::HandOffFinished { user_id, error })
                })
                .cancellable(TOKEN_HAND_OFF)]
            },

            SessionAction::HandOffFinished { user_id, error } => {
                match error {
                    None => tracing::info!(%user_id, "Provider tokens handed off"),
                    Some(error) => {
                        tracing::error!(%user_id, %error, "Token hand-off failed, session unaffected");
                        metrics::counter!("session.hand_off.failed").increment(1);
                    },
                }
                smallvec![Effect::None]
            },

            SessionAction::TokenPersistenceSettled { persisted } => {
                tracing::debug!(persisted, "Token persistence settled");
                smallvec![Effect::None]
            },

            // ═══════════════════════════════════════════════════════════════════
            // Sign-Out
            // ═══════════════════════════════════════════════════════════════════
            SessionAction::SignOut => self.sign_out(state, env),

            SessionAction::SignOutCompleted {
                provider_error,
                purged_keys,
            } => {
                tracing::info!(
                    purged_keys,
                    provider_failed = provider_error.is_some(),
                    "Sign-out complete, reloading"
                );
                let reload = env.reload.clone();
                smallvec![Effect::future(async move {
                    reload.request(ReloadReason::SignedOut);
                    None
                })]
            },
        }
    }
}
