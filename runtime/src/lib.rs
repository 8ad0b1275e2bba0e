//! # Session Guard Runtime
//!
//! Runtime implementation for the session guard layer.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: The runtime that owns state and executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to reducers
//! - **Cancellation Registry**: Tracks spawned effect tasks so they can be
//!   aborted by id (`Effect::Cancel`) or all at once on teardown
//!
//! ## Example
//!
//! ```ignore
//! use session_guard_runtime::Store;
//!
//! let store = Store::new(AuthState::default(), SessionReducer::new(config), env);
//!
//! // Send an action
//! store.send(SessionAction::SignOut).await?;
//!
//! // Read state
//! let loading = store.state(|s| s.loading).await;
//! ```

use session_guard_core::effect::{Effect, EffectId};
use session_guard_core::reducer::Reducer;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::AbortHandle;

pub use error::StoreError;
pub use store::Store;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Timeout waiting for effects
        ///
        /// Returned by [`EffectHandle::wait_with_timeout`](crate::EffectHandle::wait_with_timeout)
        /// when effects are still running at the deadline.
        #[error("Timeout waiting for effects")]
        Timeout,
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects started by
/// that action. Cancelled effects count as completed.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(SessionAction::SignOut).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// Create a new effect handle and its internal tracking counterpart
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Number of effects from this action that are still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: Effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Runs on completion, panic, and abort alike.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements the store-wide in-flight counter on drop
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A spawned effect task that can still be aborted
struct RegisteredTask {
    group: Option<EffectId>,
    abort: AbortHandle,
}

/// Every in-flight effect task, keyed by a registration sequence number
#[derive(Default)]
struct TaskRegistry {
    next_seq: AtomicU64,
    tasks: Mutex<HashMap<u64, RegisteredTask>>,
}

impl TaskRegistry {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, RegisteredTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove and return the abort handles matching `filter`
    fn take_where<F>(&self, filter: F) -> Vec<AbortHandle>
    where
        F: Fn(&RegisteredTask) -> bool,
    {
        let mut tasks = self.lock();
        let seqs: Vec<u64> = tasks
            .iter()
            .filter(|(_, task)| filter(task))
            .map(|(seq, _)| *seq)
            .collect();
        seqs.into_iter()
            .filter_map(|seq| tasks.remove(&seq))
            .map(|task| task.abort)
            .collect()
    }
}

/// Removes a task's registry entry when the task finishes or is dropped
struct RegistryGuard {
    registry: Arc<TaskRegistry>,
    seq: u64,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.seq);
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, DecrementGuard, Effect, EffectHandle,
        EffectId, EffectTracking, Ordering, Reducer, RegisteredTask, RegistryGuard, RwLock,
        StoreError, TaskRegistry,
    };
    use std::future::Future;
    use std::marker::PhantomData;
    use tokio::sync::watch;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock`, mirrored into a `watch` channel)
    /// 2. Reducer (state transitions)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        tasks: Arc<TaskRegistry>,
        /// Latest state, published while the write lock is still held.
        state_watch: Arc<watch::Sender<S>>,
        _action: PhantomData<fn(A)>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + 'static,
        S: Clone + Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            let (state_watch, _) = watch::channel(initial_state.clone());

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                tasks: Arc::new(TaskRegistry::default()),
                state_watch: Arc::new(state_watch),
                _action: PhantomData,
            }
        }

        /// Number of effect tasks currently in flight across all actions
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Returns `true` once `close` has been called
        #[must_use]
        pub fn is_closed(&self) -> bool {
            self.shutdown.load(Ordering::Acquire)
        }

        /// Stop accepting actions without waiting for effects
        pub fn close(&self) {
            self.shutdown.store(true, Ordering::Release);
        }

        /// Abort every in-flight effect task
        ///
        /// Pending delays never dispatch and running futures are dropped at
        /// their next suspension point. Returns the number of tasks aborted.
        pub fn abort_all(&self) -> usize {
            let handles = self.tasks.take_where(|_| true);
            let count = handles.len();
            for handle in handles {
                handle.abort();
            }
            if count > 0 {
                tracing::debug!(aborted = count, "Aborted all in-flight effects");
                metrics::counter!("store.effects.aborted").increment(count as u64);
            }
            count
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Publishes the new state to `subscribe_state` observers
        /// 4. Starts the returned effects, in order
        ///
        /// # Concurrency
        ///
        /// - The reducer executes synchronously while holding the write lock
        /// - Observers never see a partially applied action
        /// - `send()` returns after starting effect execution, not completion
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.actions.total").increment(1);

            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;
                tracing::trace!("Acquired write lock on state");

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                self.state_watch.send_replace(state.clone());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect_internal(effect, tracking.clone(), None);
            }

            Ok(handle)
        }

        /// Subscribe to whole-state snapshots
        ///
        /// Every snapshot is the state after a complete reducer run.
        #[must_use]
        pub fn subscribe_state(&self) -> watch::Receiver<S> {
            self.state_watch.subscribe()
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let loading = store.state(|s| s.loading).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Clone of the current state
        pub async fn snapshot(&self) -> S {
            self.state(Clone::clone).await
        }

        /// Spawn an effect task registered for cancellation and tracking
        fn spawn_effect<F>(&self, group: Option<EffectId>, tracking: &EffectTracking, fut: F)
        where
            F: Future<Output = ()> + Send + 'static,
        {
            tracking.increment();
            self.pending_effects.fetch_add(1, Ordering::SeqCst);

            let decrement = DecrementGuard(tracking.clone());
            let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));
            let seq = self.tasks.next_seq.fetch_add(1, Ordering::Relaxed);
            let release = RegistryGuard {
                registry: Arc::clone(&self.tasks),
                seq,
            };

            // Registration happens under the lock so a fast task cannot
            // release its entry before it exists.
            let mut tasks = self.tasks.lock();
            let handle = tokio::spawn(async move {
                let _decrement = decrement;
                let _pending_guard = pending_guard;
                let _release = release;
                fut.await;
            });
            tasks.insert(
                seq,
                RegisteredTask {
                    group,
                    abort: handle.abort_handle(),
                },
            );
        }

        /// Feed an action produced by an effect back into the store
        async fn feedback(&self, action: A) {
            if let Err(error) = self.send(action).await {
                tracing::debug!(%error, "Dropped feedback action");
            }
        }

        /// Execute an effect with tracking
        ///
        /// # Effect Types
        ///
        /// - `None`: No-op
        /// - `Future`: Executes async computation, sends resulting action if `Some`
        /// - `Delay`: Waits for duration, then sends action
        /// - `Cancellable`: Executes the inner effect under a cancellation group
        /// - `Cancel`: Aborts every in-flight task of a cancellation group
        ///
        /// Effect failures (panics) are isolated in their spawned task; the
        /// guards keep counters correct on panic and abort.
        #[allow(clippy::needless_pass_by_value)] // tracking is cloned per spawned task
        fn execute_effect_internal(
            &self,
            effect: Effect<A>,
            tracking: EffectTracking,
            group: Option<EffectId>,
        ) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let store = self.clone();
                    self.spawn_effect(group, &tracking, async move {
                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action, sending to store");
                            store.feedback(action).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    tracing::trace!("Executing Effect::Delay (duration: {:?})", duration);
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    let store = self.clone();
                    self.spawn_effect(group, &tracking, async move {
                        tokio::time::sleep(duration).await;
                        store.feedback(*action).await;
                    });
                },
                Effect::Cancellable { id, effect } => {
                    self.execute_effect_internal(*effect, tracking, Some(id));
                },
                Effect::Cancel(id) => {
                    let handles = self.tasks.take_where(|task| task.group == Some(id));
                    tracing::debug!(effect_id = %id, cancelled = handles.len(), "Cancelling effects");
                    metrics::counter!("store.effects.cancelled", "id" => id.as_str())
                        .increment(handles.len() as u64);
                    for handle in handles {
                        handle.abort();
                    }
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                tasks: Arc::clone(&self.tasks),
                state_watch: Arc::clone(&self.state_watch),
                _action: PhantomData,
            }
        }
    }
}
