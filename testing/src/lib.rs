//! # Session Guard Testing
//!
//! Testing utilities and helpers for the session guard layer.
//!
//! This crate provides:
//! - [`ReducerTest`], a Given-When-Then harness for reducers
//! - Effect inspection helpers for asserting on cancellation groups and delays
//! - A tracing subscriber for tests
//!
//! ## Example
//!
//! ```ignore
//! use session_guard_testing::{effects, ReducerTest};
//!
//! ReducerTest::new(SessionReducer::new(config))
//!     .with_env(env)
//!     .given_state(signed_in_state())
//!     .when_action(SessionAction::SignOut)
//!     .then_effects(|effects| {
//!         assert!(effects::cancelled_ids(effects).contains(&TOKEN_HAND_OFF));
//!     })
//!     .run();
//! ```

pub mod reducer_test;

pub use reducer_test::{ReducerTest, assertions};

/// Effect inspection helpers
///
/// Reducers return effect lists; these unwrap cancellable groups so tests can
/// assert on what would run without executing anything.
pub mod effects {
    use session_guard_core::effect::{Effect, EffectId};
    use std::time::Duration;

    /// All effects in order, each `Cancellable` followed by its inner effect
    #[must_use]
    pub fn flatten<A>(effects: &[Effect<A>]) -> Vec<&Effect<A>> {
        let mut out = Vec::new();
        for effect in effects {
            collect(effect, &mut out);
        }
        out
    }

    fn collect<'a, A>(effect: &'a Effect<A>, out: &mut Vec<&'a Effect<A>>) {
        out.push(effect);
        match effect {
            Effect::Cancellable { effect, .. } => collect(effect, out),
            Effect::None | Effect::Delay { .. } | Effect::Future(_) | Effect::Cancel(_) => {},
        }
    }

    /// Ids targeted by `Effect::Cancel`, in order
    #[must_use]
    pub fn cancelled_ids<A>(effects: &[Effect<A>]) -> Vec<EffectId> {
        flatten(effects)
            .into_iter()
            .filter_map(|effect| match effect {
                Effect::Cancel(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Ids of `Effect::Cancellable` groups started, in order
    #[must_use]
    pub fn cancellable_ids<A>(effects: &[Effect<A>]) -> Vec<EffectId> {
        flatten(effects)
            .into_iter()
            .filter_map(|effect| match effect {
                Effect::Cancellable { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Every `Effect::Delay` as `(duration, action)`
    #[must_use]
    pub fn delays<A>(effects: &[Effect<A>]) -> Vec<(Duration, &A)> {
        flatten(effects)
            .into_iter()
            .filter_map(|effect| match effect {
                Effect::Delay { duration, action } => Some((*duration, action.as_ref())),
                _ => None,
            })
            .collect()
    }

    /// Number of `Effect::Future` leaves
    #[must_use]
    pub fn future_count<A>(effects: &[Effect<A>]) -> usize {
        flatten(effects)
            .into_iter()
            .filter(|effect| matches!(effect, Effect::Future(_)))
            .count()
    }
}

/// Install a compact `fmt` subscriber honouring `RUST_LOG`
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::effects;
    use session_guard_core::effect::{Effect, EffectId};
    use std::time::Duration;

    const SETTLE: EffectId = EffectId::new("settle");

    fn sample() -> Vec<Effect<u8>> {
        vec![
            Effect::Cancel(SETTLE),
            Effect::Delay {
                duration: Duration::from_millis(1000),
                action: Box::new(3),
            }
            .cancellable(SETTLE),
            Effect::future(async { None }),
        ]
    }

    #[test]
    fn test_flatten_walks_nested_effects() {
        let effects = sample();
        assert_eq!(effects::flatten(&effects).len(), 4);
        assert_eq!(effects::future_count(&effects), 1);
    }

    #[test]
    fn test_cancellation_ids() {
        let effects = sample();
        assert_eq!(effects::cancelled_ids(&effects), vec![SETTLE]);
        assert_eq!(effects::cancellable_ids(&effects), vec![SETTLE]);
    }

    #[test]
    fn test_delays() {
        let effects = sample();
        let delays = effects::delays(&effects);
        assert_eq!(delays, vec![(Duration::from_millis(1000), &3)]);
    }

    #[test]
    fn test_init_test_tracing_is_idempotent() {
        super::init_test_tracing();
        super::init_test_tracing();
    }
}
