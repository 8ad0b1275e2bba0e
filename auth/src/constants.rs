//! Session layer constants.

use session_guard_core::effect::EffectId;
use std::time::Duration;

/// Interval between storage checks while waiting for a token to persist.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on a single token persistence wait.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(300);

/// Wait after a federated sign-in before handing provider tokens off.
///
/// Unverified against the identity provider's propagation latency; keep it
/// configurable through `SessionConfig::settle_delay`.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Durable storage key patterns used by the identity provider.
pub mod storage_keys {
    /// Prefix shared by every auth-related storage key.
    pub const AUTH_PREFIX: &str = "sb-";

    /// Suffix of the key holding the serialized token record.
    pub const TOKEN_SUFFIX: &str = "-auth-token";
}

/// Identity providers whose sign-ins trigger a token hand-off.
pub mod providers {
    /// Music-service OAuth provider.
    pub const SPOTIFY: &str = "spotify";
}

/// Cancellation groups used by the session reducer.
pub mod effect_ids {
    use super::EffectId;

    /// The in-flight token persistence wait.
    pub const TOKEN_PERSISTENCE: EffectId = EffectId::new("token-persistence");

    /// The pending settle delay and hand-off call.
    pub const TOKEN_HAND_OFF: EffectId = EffectId::new("token-hand-off");
}

/// Environment variables read by `SessionConfig::from_env`.
pub mod env_vars {
    /// Settle delay in milliseconds.
    pub const SETTLE_DELAY_MS: &str = "SESSION_GUARD_SETTLE_DELAY_MS";

    /// Gateway poll interval in milliseconds.
    pub const POLL_INTERVAL_MS: &str = "SESSION_GUARD_POLL_INTERVAL_MS";

    /// Gateway wait budget in milliseconds.
    pub const MAX_WAIT_MS: &str = "SESSION_GUARD_MAX_WAIT_MS";

    /// Comma-separated provider names that trigger a hand-off.
    pub const HANDOFF_PROVIDERS: &str = "SESSION_GUARD_HANDOFF_PROVIDERS";
}
