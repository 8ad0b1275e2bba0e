//! Session collaborators.
//!
//! This module defines traits for every external dependency of the session
//! layer. The reducer, gateway and coordinator depend only on these traits;
//! concrete implementations are injected.
//!
//! ```text
//! IdentityProvider ──events──▶ SessionManager ──▶ Store<SessionReducer>
//!        ▲                                            │
//!        └──────── sign_out(Global) ◀─────────────────┤
//! DurableStorage ◀──── gateway polls / purge ─────────┤
//! TokenHandOff   ◀──── provider tokens (after settle) ┘
//! Navigator      ◀──── RedirectCoordinator
//! ```
//!
//! This enables:
//! - **Testing**: mocks with failure injection (`crate::mocks`)
//! - **Production**: the provider SDK, browser storage, the app router

pub mod hand_off;
pub mod identity;
pub mod navigator;
pub mod storage;

pub use hand_off::TokenHandOff;
pub use identity::{IdentityProvider, SignOutScope};
pub use navigator::{NavigateOptions, Navigator};
pub use storage::{DurableStorage, StorageChange};
