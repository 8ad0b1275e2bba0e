//! Mock identity provider for testing.

use crate::error::{Result, SessionError};
use crate::events::AuthEvent;
use crate::providers::{IdentityProvider, SignOutScope};
use crate::state::Session;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

#[derive(Debug)]
struct Inner {
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
    sign_out_calls: Mutex<Vec<SignOutScope>>,
    get_session_calls: AtomicUsize,
    fail_get_session: AtomicBool,
    fail_sign_out: AtomicBool,
}

/// Mock identity provider.
///
/// Holds a persisted session, emits events on demand, and records sign-outs.
/// Clones share state.
#[derive(Debug, Clone)]
pub struct MockIdentityProvider {
    inner: Arc<Inner>,
}

impl MockIdentityProvider {
    /// Create a provider with no persisted session.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(Inner {
                session: Mutex::new(None),
                events,
                sign_out_calls: Mutex::new(Vec::new()),
                get_session_calls: AtomicUsize::new(0),
                fail_get_session: AtomicBool::new(false),
                fail_sign_out: AtomicBool::new(false),
            }),
        }
    }

    /// Create a provider with a persisted session.
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        let provider = Self::new();
        provider.set_session(Some(session));
        provider
    }

    /// Replace the persisted session.
    pub fn set_session(&self, session: Option<Session>) {
        *self
            .inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = session;
    }

    /// Emit an event; returns the number of subscribers reached.
    pub fn emit(&self, event: AuthEvent) -> usize {
        self.inner.events.send(event).unwrap_or(0)
    }

    /// Number of live event subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.events.receiver_count()
    }

    /// Scopes of every `sign_out` call, in order.
    #[must_use]
    pub fn sign_out_calls(&self) -> Vec<SignOutScope> {
        self.inner
            .sign_out_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of `get_session` calls.
    #[must_use]
    pub fn get_session_calls(&self) -> usize {
        self.inner.get_session_calls.load(Ordering::SeqCst)
    }

    /// Make `get_session` fail.
    pub fn fail_get_session(&self, fail: bool) {
        self.inner.fail_get_session.store(fail, Ordering::SeqCst);
    }

    /// Make `sign_out` fail (the call is still recorded).
    pub fn fail_sign_out(&self, fail: bool) {
        self.inner.fail_sign_out.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for MockIdentityProvider {
    fn get_session(&self) -> impl Future<Output = Result<Option<Session>>> + Send {
        let inner = Arc::clone(&self.inner);

        async move {
            inner.get_session_calls.fetch_add(1, Ordering::SeqCst);
            if inner.fail_get_session.load(Ordering::SeqCst) {
                return Err(SessionError::Provider("session lookup failed".to_string()));
            }
            Ok(inner
                .session
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone())
        }
    }

    fn sign_out(&self, scope: SignOutScope) -> impl Future<Output = Result<()>> + Send {
        let inner = Arc::clone(&self.inner);

        async move {
            inner
                .sign_out_calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(scope);
            if inner.fail_sign_out.load(Ordering::SeqCst) {
                return Err(SessionError::Provider("revocation failed".to_string()));
            }
            *inner.session.lock().unwrap_or_else(PoisonError::into_inner) = None;
            Ok(())
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }
}
