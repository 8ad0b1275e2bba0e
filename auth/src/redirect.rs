//! Redirect coordinator.
//!
//! [`decide`] maps auth state and location to a [`RedirectDecision`]. The
//! [`RedirectCoordinator`] applies decisions, navigating at most once per
//! distinct `(loading, user-present, path, role)` tuple.
//!
//! Pending navigations live in a single slot. A new tuple atomically
//! replaces the slot, so a navigation scheduled for an older tuple can never
//! fire after a newer decision.

use crate::config::RedirectConfig;
use crate::providers::{NavigateOptions, Navigator};
use crate::state::AuthState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;

/// Outcome of evaluating a guarded route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectDecision {
    /// Stay.
    None,
    /// Send the user to sign in, remembering where they were.
    ToLogin {
        /// Path to return to after sign-in.
        return_to: String,
    },
    /// Leave the sign-in screen for the app.
    ToDestination {
        /// Where to go.
        target: String,
    },
    /// The user lacks a required role.
    ToUnauthorized,
}

impl RedirectDecision {
    /// Returns `true` for anything but `None`.
    #[must_use]
    pub const fn is_redirect(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Where the user is and what is known about them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteContext {
    /// Current path.
    pub current_path: String,

    /// Return path saved when the user was sent to sign in.
    pub stored_return_to: Option<String>,

    /// Role of the signed-in user.
    pub user_role: Option<String>,
}

impl RouteContext {
    /// Context for a path with no stored return path or role.
    #[must_use]
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            current_path: path.into(),
            ..Self::default()
        }
    }

    /// Set the stored return path.
    #[must_use]
    pub fn with_stored_return_to(mut self, path: impl Into<String>) -> Self {
        self.stored_return_to = Some(path.into());
        self
    }

    /// Set the user's role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.user_role = Some(role.into());
        self
    }
}

/// Decide whether the current route must redirect.
///
/// 1. Loading: never act.
/// 2. Signed out away from sign-in: `ToLogin`.
/// 3. Signed in on sign-in: `ToDestination` (stored return path, else default).
/// 4. Signed in without an allowed role: `ToUnauthorized`.
/// 5. Otherwise: `None`.
///
/// Configurations that would loop (empty sign-in path, destination equal to
/// the sign-in path, unauthorized path equal to the current one) yield
/// `None` and a warning.
#[must_use]
pub fn decide(state: &AuthState, route: &RouteContext, config: &RedirectConfig) -> RedirectDecision {
    if state.loading {
        return RedirectDecision::None;
    }
    if config.login_path.is_empty() {
        tracing::warn!("Redirect guard has no sign-in path configured");
        return RedirectDecision::None;
    }

    let on_login = route.current_path == config.login_path;

    if state.user.is_none() {
        return if on_login {
            RedirectDecision::None
        } else {
            RedirectDecision::ToLogin {
                return_to: route.current_path.clone(),
            }
        };
    }

    if on_login {
        let target = route
            .stored_return_to
            .as_deref()
            .filter(|path| !path.is_empty())
            .unwrap_or(&config.redirect_to);
        if target == config.login_path {
            tracing::warn!(destination = target, "Post-sign-in destination is the sign-in path, staying");
            return RedirectDecision::None;
        }
        return RedirectDecision::ToDestination {
            target: target.to_string(),
        };
    }

    let role_allowed = config.allowed_roles.is_empty()
        || route
            .user_role
            .as_ref()
            .is_some_and(|role| config.allowed_roles.contains(role));
    if role_allowed {
        return RedirectDecision::None;
    }
    if route.current_path == config.unauthorized_path {
        tracing::warn!(
            path = %route.current_path,
            "Unauthorized path is itself guarded by a role the user lacks"
        );
        return RedirectDecision::None;
    }
    RedirectDecision::ToUnauthorized
}

/// What a guarded screen should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardView {
    /// Auth state unknown: render a placeholder.
    Loading,
    /// Render the guarded content.
    Content,
    /// A redirect is underway: render nothing.
    Redirecting,
}

impl GuardView {
    /// View for a state and the decision made for it.
    #[must_use]
    pub const fn of(state: &AuthState, decision: &RedirectDecision) -> Self {
        if state.loading {
            Self::Loading
        } else if decision.is_redirect() {
            Self::Redirecting
        } else {
            Self::Content
        }
    }
}

/// The inputs a decision depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GuardKey {
    loading: bool,
    signed_in: bool,
    path: String,
    role: Option<String>,
}

impl GuardKey {
    fn new(state: &AuthState, route: &RouteContext) -> Self {
        Self {
            loading: state.loading,
            signed_in: state.user.is_some(),
            path: route.current_path.clone(),
            role: route.user_role.clone(),
        }
    }
}

#[derive(Default)]
struct TransitionSlot {
    last_key: Option<GuardKey>,
    /// Bumped whenever the slot is replaced.
    seq: u64,
    pending: Option<AbortHandle>,
    disposed: bool,
}

impl TransitionSlot {
    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

/// Applies redirect decisions through a [`Navigator`], at most once per
/// distinct guard tuple.
pub struct RedirectCoordinator<N: Navigator> {
    navigator: Arc<N>,
    config: RedirectConfig,
    slot: Arc<Mutex<TransitionSlot>>,
}

impl<N: Navigator> RedirectCoordinator<N> {
    /// Create a coordinator.
    #[must_use]
    pub fn new(navigator: Arc<N>, config: RedirectConfig) -> Self {
        Self {
            navigator,
            config,
            slot: Arc::new(Mutex::new(TransitionSlot::default())),
        }
    }

    /// The coordinator configuration.
    #[must_use]
    pub const fn config(&self) -> &RedirectConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, TransitionSlot> {
        lock_slot(&self.slot)
    }

    /// Decide for the current state and route, navigating if the guard
    /// tuple changed since the last evaluation.
    ///
    /// Evaluating an unchanged tuple returns the same decision without
    /// navigating again. After `dispose`, decisions are still returned but
    /// never applied.
    pub fn evaluate(&self, state: &AuthState, route: &RouteContext) -> RedirectDecision {
        let decision = decide(state, route, &self.config);
        let key = GuardKey::new(state, route);

        let navigation = self.navigation_for(&decision);

        let mut slot = self.lock();
        if slot.disposed || slot.last_key.as_ref() == Some(&key) {
            return decision;
        }
        slot.cancel_pending();
        slot.seq += 1;
        slot.last_key = Some(key);

        let Some((path, options)) = navigation else {
            return decision;
        };

        if self.config.navigation_delay.is_zero() {
            drop(slot);
            self.apply(&path, options);
            return decision;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            drop(slot);
            tracing::warn!("No async runtime for delayed navigation, navigating now");
            self.apply(&path, options);
            return decision;
        };

        // Spawned and recorded under the slot lock so the task cannot finish
        // before its handle is stored.
        let seq = slot.seq;
        let navigator = Arc::clone(&self.navigator);
        let shared = Arc::clone(&self.slot);
        let delay = self.config.navigation_delay;
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = lock_slot(&shared);
                if slot.disposed || slot.seq != seq {
                    return;
                }
                slot.pending = None;
            }
            navigate(navigator.as_ref(), &path, options);
        });
        slot.pending = Some(task.abort_handle());

        decision
    }

    /// Returns `true` while a delayed navigation is scheduled.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Cancel any scheduled navigation and stop navigating.
    pub fn dispose(&self) {
        let mut slot = self.lock();
        slot.disposed = true;
        slot.cancel_pending();
    }

    fn apply(&self, path: &str, options: NavigateOptions) {
        navigate(self.navigator.as_ref(), path, options);
    }

    fn navigation_for(&self, decision: &RedirectDecision) -> Option<(String, NavigateOptions)> {
        match decision {
            RedirectDecision::None => None,
            RedirectDecision::ToLogin { return_to } => Some((
                self.config.login_path.clone(),
                NavigateOptions::replace().with_state(serde_json::json!({ "from": return_to })),
            )),
            RedirectDecision::ToDestination { target } => {
                Some((target.clone(), NavigateOptions::replace()))
            },
            RedirectDecision::ToUnauthorized => Some((
                self.config.unauthorized_path.clone(),
                NavigateOptions::replace(),
            )),
        }
    }
}

impl<N: Navigator> Drop for RedirectCoordinator<N> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn lock_slot(slot: &Mutex<TransitionSlot>) -> MutexGuard<'_, TransitionSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn navigate<N: Navigator>(navigator: &N, path: &str, options: NavigateOptions) {
    tracing::debug!(path, replace = options.replace, "Navigating");
    metrics::counter!("redirect.navigations").increment(1);
    navigator.navigate(path, options);
}
