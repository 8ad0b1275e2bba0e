//! Token persistence gateway.
//!
//! An auth event can be announced before the provider has written the new
//! token to durable storage. Requests that read the token from storage in
//! that window fail authorization. The gateway waits, within a fixed
//! budget, until the announced token is readable.
//!
//! ```text
//! NotReady ──(token matches | budget elapsed)──▶ Ready ──(reset)──▶ NotReady
//! ```
//!
//! Reaching the budget is not an error: the wait returns `false` and the
//! gateway still becomes ready, so callers proceed optimistically instead of
//! blocking.

use crate::config::GatewayConfig;
use crate::error::{Result, SessionError};
use crate::providers::{DurableStorage, StorageChange};
use crate::state::{Session, TokenRecord};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};

type ReadyCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct GatewayInner {
    token_ready: bool,
    /// Bumped by `reset`; waits started before it cannot mark ready.
    generation: u64,
    next_callback_id: u64,
    pending: VecDeque<(u64, ReadyCallback)>,
}

/// Bounded wait until a session's access token is durably readable.
///
/// Clones share readiness and pending callbacks.
pub struct TokenPersistenceGateway<S> {
    storage: Arc<S>,
    config: GatewayConfig,
    inner: Arc<Mutex<GatewayInner>>,
}

impl<S> Clone for TokenPersistenceGateway<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: self.config.clone(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> std::fmt::Debug for TokenPersistenceGateway<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("TokenPersistenceGateway")
            .field("token_ready", &inner.token_ready)
            .field("pending_callbacks", &inner.pending.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S> TokenPersistenceGateway<S> {
    fn lock(&self) -> MutexGuard<'_, GatewayInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: DurableStorage> TokenPersistenceGateway<S> {
    /// Create a gateway over `storage`, not ready.
    #[must_use]
    pub fn new(storage: Arc<S>, config: GatewayConfig) -> Self {
        Self {
            storage,
            config,
            inner: Arc::new(Mutex::new(GatewayInner::default())),
        }
    }

    /// The gateway configuration.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Wait up to the configured budget for `session`'s token to persist.
    ///
    /// Returns `true` once the stored token matches, `false` when the budget
    /// elapses. The gateway is ready either way.
    pub async fn wait_for_token_persistence(&self, session: &Session) -> bool {
        self.wait_for_token_persistence_within(session, self.config.max_wait)
            .await
    }

    /// Wait up to `max_wait` for `session`'s token to persist.
    ///
    /// Checks immediately, then re-checks on every poll tick and on every
    /// storage change notification for a token key, with a final check at
    /// the deadline. A `reset` during the wait leaves the new lifecycle
    /// untouched; the stale wait still settles.
    #[tracing::instrument(skip_all, fields(max_wait = ?max_wait))]
    pub async fn wait_for_token_persistence_within(
        &self,
        session: &Session,
        max_wait: Duration,
    ) -> bool {
        let started = Instant::now();
        let generation = self.lock().generation;
        let access_token = session.access_token.as_str();

        // Subscribe before the first check so no write is missed in between
        let mut changes = self.storage.subscribe_changes();

        if self.is_token_persisted(access_token) {
            tracing::debug!("Token already persisted");
            self.settle(generation, started, 0, true);
            return true;
        }

        let deadline = started + max_wait;
        let poll_interval = self.config.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(started + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut checks: u32 = 0;

        loop {
            tokio::select! {
                biased;
                () = tokio::time::sleep_until(deadline) => break,
                change = next_change(&mut changes) => {
                    if change.is_some_and(|c| !self.config.storage_key.matches(c.key())) {
                        continue;
                    }
                },
                _ = ticker.tick() => {},
            }

            checks += 1;
            if self.is_token_persisted(access_token) {
                tracing::debug!(checks, "Token persisted");
                self.settle(generation, started, checks, true);
                return true;
            }
        }

        let persisted = self.is_token_persisted(access_token);
        if !persisted {
            tracing::warn!(
                checks,
                "Token not persisted within budget, proceeding optimistically"
            );
        }
        self.settle(generation, started, checks + 1, persisted);
        persisted
    }

    fn settle(&self, generation: u64, started: Instant, checks: u32, persisted: bool) {
        let outcome = if persisted { "persisted" } else { "timeout" };
        metrics::counter!("gateway.wait.completed", "outcome" => outcome).increment(1);
        metrics::histogram!("gateway.wait.duration_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);
        metrics::histogram!("gateway.wait.checks").record(f64::from(checks));

        self.mark_ready_for(generation);
    }

    /// Returns `true` if a token record in storage holds `access_token`.
    ///
    /// Never fails: unreadable storage and malformed records count as not
    /// persisted.
    #[must_use]
    pub fn is_token_persisted(&self, access_token: &str) -> bool {
        match self.stored_tokens() {
            Ok(tokens) => tokens.iter().any(|stored| stored == access_token),
            Err(error) => {
                tracing::warn!(%error, "Token storage unreadable, treating as not persisted");
                metrics::counter!("gateway.storage.errors").increment(1);
                false
            },
        }
    }

    /// Access tokens of every parseable token record.
    fn stored_tokens(&self) -> Result<Vec<String>> {
        let mut tokens = Vec::new();
        for key in self.storage.list_keys()? {
            if !self.config.storage_key.matches(&key) {
                continue;
            }
            let Some(raw) = self.storage.get(&key)? else {
                continue;
            };
            match TokenRecord::parse(&raw) {
                Ok(record) => tokens.push(record.access_token),
                Err(e) => {
                    let error = SessionError::MalformedRecord {
                        key,
                        reason: e.to_string(),
                    };
                    tracing::warn!(%error, "Skipping malformed token record");
                },
            }
        }
        Ok(tokens)
    }
}

impl<S> TokenPersistenceGateway<S> {
    /// Mark the token ready and run pending callbacks in registration order.
    ///
    /// A no-op if already ready.
    pub fn mark_token_ready(&self) {
        let generation = self.lock().generation;
        self.mark_ready_for(generation);
    }

    fn mark_ready_for(&self, generation: u64) {
        let callbacks = {
            let mut inner = self.lock();
            if inner.generation != generation {
                tracing::debug!("Ignoring readiness from a wait superseded by reset");
                return;
            }
            if inner.token_ready {
                return;
            }
            inner.token_ready = true;
            std::mem::take(&mut inner.pending)
        };

        tracing::debug!(callbacks = callbacks.len(), "Token ready");
        for (id, callback) in callbacks {
            run_callback(id, callback);
        }
    }

    /// Run `callback` once the token is ready.
    ///
    /// If already ready, runs it before returning and the subscription is
    /// inert. Otherwise it is queued until readiness; `reset` drops it.
    pub fn on_token_ready<F>(&self, callback: F) -> ReadySubscription
    where
        F: FnOnce() + Send + 'static,
    {
        let id = {
            let mut inner = self.lock();
            let id = inner.next_callback_id;
            inner.next_callback_id += 1;
            if !inner.token_ready {
                inner.pending.push_back((id, Box::new(callback)));
                return ReadySubscription {
                    inner: Arc::downgrade(&self.inner),
                    id: Some(id),
                };
            }
            id
        };

        run_callback(id, Box::new(callback));
        ReadySubscription {
            inner: Weak::new(),
            id: None,
        }
    }

    /// Returns `true` once the token is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.lock().token_ready
    }

    /// Return to not-ready and drop pending callbacks without running them.
    pub fn reset(&self) {
        let dropped = {
            let mut inner = self.lock();
            inner.token_ready = false;
            inner.generation += 1;
            std::mem::take(&mut inner.pending)
        };
        tracing::debug!(dropped_callbacks = dropped.len(), "Gateway reset");
    }

    /// Number of callbacks waiting for readiness.
    #[must_use]
    pub fn pending_callbacks(&self) -> usize {
        self.lock().pending.len()
    }
}

fn run_callback(id: u64, callback: ReadyCallback) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        tracing::error!(callback_id = id, "Token-ready callback panicked");
        metrics::counter!("gateway.callbacks.panicked").increment(1);
    }
}

/// Wait for the next storage change; pends forever without notifications.
///
/// Returns `None` when notifications were lost (lag or closed channel), which
/// callers treat as "something may have changed".
async fn next_change(
    changes: &mut Option<broadcast::Receiver<StorageChange>>,
) -> Option<StorageChange> {
    let Some(receiver) = changes.as_mut() else {
        return std::future::pending().await;
    };
    match receiver.recv().await {
        Ok(change) => Some(change),
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::debug!(skipped, "Storage notifications lagged");
            None
        },
        Err(broadcast::error::RecvError::Closed) => {
            *changes = None;
            None
        },
    }
}

/// Handle to a queued token-ready callback.
#[derive(Debug)]
pub struct ReadySubscription {
    inner: Weak<Mutex<GatewayInner>>,
    id: Option<u64>,
}

impl ReadySubscription {
    /// Remove the callback if it has not run yet.
    ///
    /// Returns `true` if a queued callback was removed.
    pub fn unsubscribe(self) -> bool {
        let (Some(id), Some(inner)) = (self.id, self.inner.upgrade()) else {
            return false;
        };
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = inner.pending.len();
        inner.pending.retain(|(queued, _)| *queued != id);
        inner.pending.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageKeyPattern;
    use crate::state::{User, UserId};
    use crate::stores::MemoryStorage;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session(token: &str) -> Session {
        Session {
            access_token: token.to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now(),
            provider_token: None,
            provider_refresh_token: None,
            user: User::new(UserId::new(), None),
        }
    }

    fn gateway() -> (TokenPersistenceGateway<MemoryStorage>, MemoryStorage) {
        let storage = MemoryStorage::new();
        let gateway = TokenPersistenceGateway::new(Arc::new(storage.clone()), GatewayConfig::default());
        (gateway, storage)
    }

    fn store_token(storage: &MemoryStorage, token: &str) {
        let key = StorageKeyPattern::default().key_for("proj");
        let _ = storage.set(&key, &format!(r#"{{"access_token":"{token}"}}"#));
    }

    #[test]
    fn test_is_token_persisted() {
        let (gateway, storage) = gateway();
        assert!(!gateway.is_token_persisted("abc"));

        store_token(&storage, "abc");
        assert!(gateway.is_token_persisted("abc"));
        assert!(!gateway.is_token_persisted("other"));
    }

    #[test]
    fn test_unrecognised_keys_and_garbage_are_ignored() {
        let (gateway, storage) = gateway();
        let _ = storage.set("other-key", r#"{"access_token":"abc"}"#);
        let _ = storage.set("sb-proj-auth-token", "not json");
        assert!(!gateway.is_token_persisted("abc"));
    }

    #[test]
    fn test_callbacks_run_in_order_after_ready() {
        let (gateway, _) = gateway();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = Arc::clone(&order);
            let _ = gateway.on_token_ready(move || {
                order.lock().unwrap_or_else(PoisonError::into_inner).push(n);
            });
        }
        assert_eq!(gateway.pending_callbacks(), 3);
        assert!(order.lock().unwrap_or_else(PoisonError::into_inner).is_empty());

        gateway.mark_token_ready();
        gateway.mark_token_ready();

        assert_eq!(*order.lock().unwrap_or_else(PoisonError::into_inner), vec![0, 1, 2]);
        assert_eq!(gateway.pending_callbacks(), 0);
    }

    #[test]
    fn test_callback_after_ready_runs_immediately() {
        let (gateway, _) = gateway();
        gateway.mark_token_ready();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = gateway.on_token_ready(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!subscription.unsubscribe());
    }

    #[test]
    fn test_unsubscribe_before_ready() {
        let (gateway, _) = gateway();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let first = gateway.on_token_ready(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&calls);
        let _second = gateway.on_token_ready(move || {
            counter.fetch_add(10, Ordering::SeqCst);
        });

        assert!(first.unsubscribe());
        gateway.mark_token_ready();
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_drain() {
        let (gateway, _) = gateway();
        let calls = Arc::new(AtomicUsize::new(0));

        #[allow(clippy::panic)] // Exercising panic isolation
        let _ = gateway.on_token_ready(|| panic!("callback failure"));
        let counter = Arc::clone(&calls);
        let _ = gateway.on_token_ready(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        gateway.mark_token_ready();
        assert!(gateway.is_ready());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_drops_pending_callbacks() {
        let (gateway, _) = gateway();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = gateway.on_token_ready(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        gateway.reset();
        assert!(!gateway.is_ready());
        assert_eq!(gateway.pending_callbacks(), 0);

        gateway.mark_token_ready();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!subscription.unsubscribe());
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_persisted_resolves_without_waiting() {
        let (gateway, storage) = gateway();
        store_token(&storage, "abc");

        let started = Instant::now();
        assert!(gateway.wait_for_token_persistence(&session("abc")).await);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(gateway.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_supersedes_in_flight_wait() {
        let (gateway, _) = gateway();

        let waiting = gateway.clone();
        let wait = tokio::spawn(async move {
            waiting.wait_for_token_persistence(&session("abc")).await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        gateway.reset();

        let persisted = wait.await.unwrap_or(true);
        assert!(!persisted);
        assert!(!gateway.is_ready());
    }
}
