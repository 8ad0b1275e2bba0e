//! Mock token hand-off collaborator for testing.

use crate::error::{Result, SessionError};
use crate::providers::TokenHandOff;
use crate::state::HandOffPayload;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Mock hand-off collaborator.
///
/// Records every payload; fails on demand.
#[derive(Debug, Clone, Default)]
pub struct MockTokenHandOff {
    calls: Arc<Mutex<Vec<HandOffPayload>>>,
    fail: Arc<AtomicBool>,
}

impl MockTokenHandOff {
    /// Create a succeeding collaborator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail.
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Every payload received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<HandOffPayload> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TokenHandOff for MockTokenHandOff {
    fn hand_off(&self, payload: HandOffPayload) -> impl Future<Output = Result<()>> + Send {
        let calls = Arc::clone(&self.calls);
        let fail = self.fail.load(Ordering::SeqCst);

        async move {
            calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(payload);
            if fail {
                return Err(SessionError::HandOff("connection record rejected".to_string()));
            }
            Ok(())
        }
    }
}
