//! Session layer configuration.
//!
//! Every component takes its configuration explicitly. Defaults mirror the
//! identity provider's browser client: tokens under `sb-<ref>-auth-token`,
//! a 300ms persistence budget polled every 10ms, and a 1000ms settle delay
//! before provider tokens are handed off.

use crate::constants::{
    env_vars, providers, storage_keys, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL,
    DEFAULT_SETTLE_DELAY,
};
use crate::error::{Result, SessionError};
use std::time::Duration;

/// Pattern recognising the storage key that holds the token record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeyPattern {
    /// Prefix shared by every auth key; also the purge prefix on sign-out.
    pub prefix: String,

    /// Suffix of the token record key.
    pub suffix: String,
}

impl StorageKeyPattern {
    /// Create a pattern from a prefix and suffix.
    #[must_use]
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Returns `true` if `key` is a token record key.
    ///
    /// ```
    /// # use session_guard_auth::config::StorageKeyPattern;
    /// let pattern = StorageKeyPattern::default();
    /// assert!(pattern.matches("sb-abcd-auth-token"));
    /// assert!(!pattern.matches("sb-abcd-code-verifier"));
    /// ```
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        key.len() >= self.prefix.len() + self.suffix.len()
            && key.starts_with(&self.prefix)
            && key.ends_with(&self.suffix)
    }

    /// Returns `true` if `key` belongs to the auth namespace.
    #[must_use]
    pub fn is_auth_key(&self, key: &str) -> bool {
        key.starts_with(&self.prefix)
    }

    /// Token record key for a project reference.
    #[must_use]
    pub fn key_for(&self, project_ref: &str) -> String {
        format!("{}{project_ref}{}", self.prefix, self.suffix)
    }
}

impl Default for StorageKeyPattern {
    fn default() -> Self {
        Self::new(storage_keys::AUTH_PREFIX, storage_keys::TOKEN_SUFFIX)
    }
}

/// Token persistence gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Interval between storage checks.
    ///
    /// Default: 10ms
    pub poll_interval: Duration,

    /// Wait budget for `wait_for_token_persistence`.
    ///
    /// Default: 300ms
    pub max_wait: Duration,

    /// Key pattern locating the token record.
    pub storage_key: StorageKeyPattern,
}

impl GatewayConfig {
    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the default wait budget.
    #[must_use]
    pub const fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Set the storage key pattern.
    #[must_use]
    pub fn with_storage_key(mut self, storage_key: StorageKeyPattern) -> Self {
        self.storage_key = storage_key;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
            storage_key: StorageKeyPattern::default(),
        }
    }
}

/// Auth session store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay between a federated sign-in and the token hand-off.
    ///
    /// Default: 1000ms
    pub settle_delay: Duration,

    /// Providers whose sign-ins trigger a hand-off.
    ///
    /// Default: `["spotify"]`
    pub handoff_providers: Vec<String>,

    /// Gateway configuration (also supplies the purge prefix).
    pub gateway: GatewayConfig,
}

impl SessionConfig {
    /// Set the settle delay.
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the providers that trigger a hand-off.
    #[must_use]
    pub fn with_handoff_providers<I, P>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.handoff_providers = providers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the gateway configuration.
    #[must_use]
    pub fn with_gateway(mut self, gateway: GatewayConfig) -> Self {
        self.gateway = gateway;
        self
    }

    /// Returns `true` if a sign-in through `provider` should hand tokens off.
    #[must_use]
    pub fn hands_off(&self, provider: &str) -> bool {
        self.handoff_providers.iter().any(|p| p == provider)
    }

    /// Defaults overridden by `SESSION_GUARD_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if a variable is set but malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if a value is present but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = millis(&lookup, env_vars::SETTLE_DELAY_MS)? {
            config.settle_delay = ms;
        }
        if let Some(ms) = millis(&lookup, env_vars::POLL_INTERVAL_MS)? {
            if ms.is_zero() {
                return Err(SessionError::Config {
                    key: env_vars::POLL_INTERVAL_MS.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            config.gateway.poll_interval = ms;
        }
        if let Some(ms) = millis(&lookup, env_vars::MAX_WAIT_MS)? {
            config.gateway.max_wait = ms;
        }
        if let Some(list) = lookup(env_vars::HANDOFF_PROVIDERS) {
            config.handoff_providers = list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(config)
    }
}

fn millis<F>(lookup: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| SessionError::Config {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
        })
        .transpose()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            handoff_providers: vec![providers::SPOTIFY.to_string()],
            gateway: GatewayConfig::default(),
        }
    }
}

/// Redirect coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectConfig {
    /// Path of the sign-in screen.
    ///
    /// Default: `/auth`
    pub login_path: String,

    /// Destination after sign-in when no return path is stored.
    ///
    /// Default: `/`
    pub redirect_to: String,

    /// Roles allowed past the guard; empty means any signed-in user.
    pub allowed_roles: Vec<String>,

    /// Where users lacking a required role are sent.
    ///
    /// Default: `/unauthorized`
    pub unauthorized_path: String,

    /// Delay before a decided navigation is applied.
    ///
    /// Default: zero (navigate synchronously)
    pub navigation_delay: Duration,
}

impl RedirectConfig {
    /// Set the sign-in path.
    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    /// Set the default post-sign-in destination.
    #[must_use]
    pub fn with_redirect_to(mut self, path: impl Into<String>) -> Self {
        self.redirect_to = path.into();
        self
    }

    /// Set the allowed roles.
    #[must_use]
    pub fn with_allowed_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.allowed_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Set the unauthorized path.
    #[must_use]
    pub fn with_unauthorized_path(mut self, path: impl Into<String>) -> Self {
        self.unauthorized_path = path.into();
        self
    }

    /// Set the navigation delay.
    #[must_use]
    pub const fn with_navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = delay;
        self
    }
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            login_path: "/auth".to_string(),
            redirect_to: "/".to_string(),
            allowed_roles: Vec::new(),
            unauthorized_path: "/unauthorized".to_string(),
            navigation_delay: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.settle_delay, Duration::from_millis(1000));
        assert_eq!(config.gateway.poll_interval, Duration::from_millis(10));
        assert_eq!(config.gateway.max_wait, Duration::from_millis(300));
        assert!(config.hands_off("spotify"));
        assert!(!config.hands_off("google"));
    }

    #[test]
    fn test_storage_key_pattern() {
        let pattern = StorageKeyPattern::default();
        assert_eq!(pattern.key_for("xyz"), "sb-xyz-auth-token");
        assert!(pattern.matches(&pattern.key_for("xyz")));
        assert!(pattern.is_auth_key("sb-xyz-code-verifier"));
        assert!(!pattern.matches("sb-auth-token"));
        assert!(!pattern.matches("other-auth-token"));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = SessionConfig::from_lookup(lookup(&[
            (env_vars::SETTLE_DELAY_MS, "250"),
            (env_vars::MAX_WAIT_MS, " 500 "),
            (env_vars::HANDOFF_PROVIDERS, "spotify, deezer,,"),
        ]))
        .unwrap_or_default();

        assert_eq!(config.settle_delay, Duration::from_millis(250));
        assert_eq!(config.gateway.max_wait, Duration::from_millis(500));
        assert_eq!(config.handoff_providers, vec!["spotify", "deezer"]);
    }

    #[test]
    fn test_from_lookup_rejects_malformed_values() {
        let result = SessionConfig::from_lookup(lookup(&[(env_vars::SETTLE_DELAY_MS, "soon")]));
        assert!(matches!(result, Err(SessionError::Config { .. })));

        let result = SessionConfig::from_lookup(lookup(&[(env_vars::POLL_INTERVAL_MS, "0")]));
        assert!(matches!(result, Err(SessionError::Config { .. })));
    }

    #[test]
    fn test_redirect_builders() {
        let config = RedirectConfig::default()
            .with_login_path("/login")
            .with_allowed_roles(["admin"])
            .with_navigation_delay(Duration::from_millis(5));
        assert_eq!(config.login_path, "/login");
        assert_eq!(config.allowed_roles, vec!["admin"]);
        assert_eq!(config.redirect_to, "/");
    }
}
