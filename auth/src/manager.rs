//! Auth session manager.
//!
//! Owns the session store and rebuilds it on reload. Each build is a
//! *generation*: one store, one provider subscription, one forwarding task.
//! Reloading tears the whole generation down (subscription, pending effects,
//! the store itself) and builds a fresh one, so nothing captured by the old
//! generation survives a sign-out.
//!
//! ```text
//! create ─▶ generation 1 ──SignOut──▶ teardown ─▶ loading ─▶ generation 2 ─▶ ...
//! ```

use crate::actions::SessionAction;
use crate::config::SessionConfig;
use crate::environment::{ReloadReason, ReloadTrigger, SessionEnvironment};
use crate::error::{Result, SessionError};
use crate::gateway::TokenPersistenceGateway;
use crate::providers::{DurableStorage, IdentityProvider, TokenHandOff};
use crate::reducers::SessionReducer;
use crate::state::AuthState;
use session_guard_runtime::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Store type driven by the manager.
pub type SessionStore<S, P, H> =
    Store<AuthState, SessionAction, SessionEnvironment<S, P, H>, SessionReducer<S, P, H>>;

struct Generation<S, P, H>
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    number: u64,
    store: SessionStore<S, P, H>,
    tasks: Vec<JoinHandle<()>>,
}

impl<S, P, H> Generation<S, P, H>
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    fn teardown(self) {
        for task in &self.tasks {
            task.abort();
        }
        self.store.close();
        let aborted = self.store.abort_all();
        tracing::debug!(generation = self.number, aborted, "Generation torn down");
    }
}

struct ManagerInner<S, P, H>
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    storage: Arc<S>,
    provider: Arc<P>,
    hand_off: Arc<H>,
    config: SessionConfig,
    gateway: TokenPersistenceGateway<S>,
    reload: ReloadTrigger,
    /// Stable across generations.
    state: watch::Sender<AuthState>,
    generation: watch::Sender<u64>,
    current: Mutex<Option<Generation<S, P, H>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl<S, P, H> ManagerInner<S, P, H>
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    fn current(&self) -> std::sync::MutexGuard<'_, Option<Generation<S, P, H>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build a generation: subscribe, resolve the initial session, apply it,
    /// then forward events.
    ///
    /// With `restore` unset the provider is not asked for an existing
    /// session and the generation starts signed out.
    async fn start_generation(&self, number: u64, restore: bool) -> Generation<S, P, H> {
        let environment = SessionEnvironment::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.provider),
            Arc::clone(&self.hand_off),
            self.gateway.clone(),
            self.reload.clone(),
        );
        let store = Store::new(
            AuthState::default(),
            SessionReducer::new(self.config.clone()),
            environment,
        );

        // Subscribe before the session check so no event is missed
        let events = self.provider.subscribe();
        let mirror = spawn_state_mirror(store.subscribe_state(), self.state.clone());

        let session = if restore {
            match self.provider.get_session().await {
                Ok(session) => session,
                Err(error) => {
                    tracing::warn!(%error, "Existing-session check failed, starting signed out");
                    None
                },
            }
        } else {
            tracing::debug!(generation = number, "Skipping existing-session check");
            None
        };
        if let Err(error) = store
            .send(SessionAction::InitialSessionResolved { session })
            .await
        {
            tracing::error!(%error, "Could not apply initial session");
        }

        let forwarder = spawn_forwarder(events, store.clone(), number);
        tracing::info!(generation = number, "Session generation started");
        metrics::counter!("session.generations.started").increment(1);

        Generation {
            number,
            store,
            tasks: vec![mirror, forwarder],
        }
    }

    /// Tear down the current generation and build the next one.
    async fn reload(&self, reason: ReloadReason) {
        tracing::info!(?reason, "Reloading session layer");

        let next = *self.generation.borrow() + 1;
        let old = self.current().take();
        if let Some(old) = old {
            old.teardown();
        }
        self.state.send_replace(AuthState::default());

        if self.disposed.load(Ordering::Acquire) {
            return;
        }

        let generation = self.start_generation(next, reason.restores_session()).await;
        if self.disposed.load(Ordering::Acquire) {
            generation.teardown();
            return;
        }
        *self.current() = Some(generation);
        self.generation.send_replace(next);
    }

    fn shutdown(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(supervisor) = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            supervisor.abort();
        }
        if let Some(generation) = self.current().take() {
            generation.teardown();
        }
        self.gateway.reset();
        // Wake anyone waiting for a new generation
        self.generation.send_modify(|_| {});
        tracing::info!("Session manager disposed");
    }
}

fn spawn_state_mirror(
    mut source: watch::Receiver<AuthState>,
    target: watch::Sender<AuthState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let state = source.borrow_and_update().clone();
            target.send_replace(state);
            if source.changed().await.is_err() {
                break;
            }
        }
    })
}

fn spawn_forwarder<S, P, H>(
    mut events: broadcast::Receiver<crate::events::AuthEvent>,
    store: SessionStore<S, P, H>,
    generation: u64,
) -> JoinHandle<()>
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if store
                        .send(SessionAction::AuthEventReceived(event))
                        .await
                        .is_err()
                    {
                        break;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(generation, skipped, "Auth event stream lagged");
                },
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!(generation, "Auth event stream closed");
                    break;
                },
            }
        }
    })
}

/// Owner of the canonical auth state.
///
/// Explicitly created and disposed; independent managers share nothing.
///
/// # Example
///
/// ```ignore
/// let manager = SessionManager::create(storage, provider, hand_off, SessionConfig::default()).await;
///
/// let mut states = manager.subscribe();
/// let state = states.wait_for(|s| !s.loading).await?.clone();
///
/// manager.sign_out().await?;
/// ```
pub struct SessionManager<S, P, H>
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    inner: Arc<ManagerInner<S, P, H>>,
}

impl<S, P, H> SessionManager<S, P, H>
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    /// Create the manager and its first generation.
    ///
    /// Returns after the existing-session check has been applied, so
    /// `state()` is already loaded.
    pub async fn create(storage: Arc<S>, provider: Arc<P>, hand_off: Arc<H>, config: SessionConfig) -> Self {
        let gateway = TokenPersistenceGateway::new(Arc::clone(&storage), config.gateway.clone());
        let (reload, reload_rx) = ReloadTrigger::channel();
        let (state, _) = watch::channel(AuthState::default());
        let (generation, _) = watch::channel(1);

        let inner = Arc::new(ManagerInner {
            storage,
            provider,
            hand_off,
            config,
            gateway,
            reload,
            state,
            generation,
            current: Mutex::new(None),
            supervisor: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });

        let first = inner.start_generation(1, true).await;
        *inner.current() = Some(first);

        let supervisor = spawn_supervisor(Arc::downgrade(&inner), reload_rx);
        *inner
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(supervisor);

        Self { inner }
    }

    /// Current auth state.
    ///
    /// Reads the live store; while a reload is in progress this is the
    /// loading state.
    pub async fn state(&self) -> AuthState {
        let store = self.store();
        match store {
            Some(store) => store.snapshot().await,
            None => self.inner.state.borrow().clone(),
        }
    }

    /// Whole-state snapshots, stable across reloads.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// The token persistence gateway.
    #[must_use]
    pub fn gateway(&self) -> &TokenPersistenceGateway<S> {
        &self.inner.gateway
    }

    /// Number of the live generation (starts at 1, bumps on every reload).
    #[must_use]
    pub fn generation(&self) -> u64 {
        *self.inner.generation.borrow()
    }

    /// Sign out and wait for the reload to finish.
    ///
    /// Provider failures do not fail the sign-out; the reload always happens.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Disposed`] if the manager is disposed before
    /// or during the sign-out.
    pub async fn sign_out(&self) -> Result<()> {
        let mut generations = self.inner.generation.subscribe();
        let before = *generations.borrow_and_update();

        let store = self.store().ok_or(SessionError::Disposed)?;
        store.send(SessionAction::SignOut).await?;

        loop {
            if self.inner.disposed.load(Ordering::Acquire) {
                return Err(SessionError::Disposed);
            }
            if *generations.borrow_and_update() > before {
                return Ok(());
            }
            generations
                .changed()
                .await
                .map_err(|_| SessionError::Disposed)?;
        }
    }

    /// Stop the manager: unsubscribe, abort pending work, reset the gateway.
    ///
    /// Idempotent. Also runs on drop.
    pub fn dispose(&self) {
        self.inner.shutdown();
    }

    /// Returns `true` once disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    fn store(&self) -> Option<SessionStore<S, P, H>> {
        self.inner.current().as_ref().map(|g| g.store.clone())
    }
}

impl<S, P, H> Drop for SessionManager<S, P, H>
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

fn spawn_supervisor<S, P, H>(
    inner: std::sync::Weak<ManagerInner<S, P, H>>,
    mut requests: mpsc::UnboundedReceiver<ReloadReason>,
) -> JoinHandle<()>
where
    S: DurableStorage,
    P: IdentityProvider,
    H: TokenHandOff,
{
    tokio::spawn(async move {
        while let Some(reason) = requests.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.reload(reason).await;
        }
    })
}
