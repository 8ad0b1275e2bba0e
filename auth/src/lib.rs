//! # Session Guard Auth
//!
//! Client-side session consistency and navigation guarding, built on the
//! reducer/effect/store architecture of `session-guard-core` and
//! `session-guard-runtime`.
//!
//! ## Parts
//!
//! - **Token persistence gateway** ([`gateway`]): answers "has the current
//!   access token reached durable storage yet?" within a bounded wait, so
//!   requests never race the token write.
//! - **Auth session store** ([`manager`], [`reducers`]): canonical
//!   `{user, session, loading}` state driven by identity provider events.
//!   Handles the deferred provider-token hand-off and the sign-out sequence
//!   (purge, provider sign-out, full reload).
//! - **Redirect coordinator** ([`redirect`]): maps auth state and location to
//!   at most one navigation per distinct guard tuple.
//!
//! ## Architecture
//!
//! ```text
//! IdentityProvider ─▶ SessionAction ─▶ SessionReducer ─▶ (AuthState, Effects)
//!                                                            │
//!             gateway wait / hand-off / sign-out ◀───────────┘
//!                                │
//!                                └──▶ more SessionActions
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use session_guard_auth::*;
//!
//! let manager = SessionManager::create(storage, provider, hand_off, SessionConfig::from_env()?).await;
//!
//! let coordinator = RedirectCoordinator::new(navigator, RedirectConfig::default());
//! let state = manager.state().await;
//! let decision = coordinator.evaluate(&state, &RouteContext::at("/library"));
//!
//! if let Some(session) = &state.session {
//!     if manager.gateway().wait_for_token_persistence(session).await {
//!         // safe to issue authenticated requests
//!     }
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod actions;
pub mod config;
pub mod constants;
pub mod environment;
pub mod error;
pub mod events;
pub mod gateway;
pub mod manager;
pub mod providers;
pub mod redirect;
pub mod reducers;
pub mod state;
pub mod stores;

// Mocks for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-exports
pub use actions::SessionAction;
pub use config::{GatewayConfig, RedirectConfig, SessionConfig, StorageKeyPattern};
pub use environment::{ReloadReason, ReloadTrigger, SessionEnvironment};
pub use error::{Result, SessionError};
pub use events::{AuthEvent, AuthEventKind};
pub use gateway::{ReadySubscription, TokenPersistenceGateway};
pub use manager::{SessionManager, SessionStore};
pub use providers::{
    DurableStorage, IdentityProvider, NavigateOptions, Navigator, SignOutScope, StorageChange,
    TokenHandOff,
};
pub use redirect::{decide, GuardView, RedirectCoordinator, RedirectDecision, RouteContext};
pub use reducers::SessionReducer;
pub use state::{AppMetadata, AuthState, HandOffPayload, Session, TokenRecord, User, UserId};
pub use stores::{JsonFileStorage, MemoryStorage};
