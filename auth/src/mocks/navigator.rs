//! Recording navigator for testing.

use crate::providers::{NavigateOptions, Navigator};
use std::sync::{Arc, Mutex, PoisonError};

/// A recorded navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct Navigation {
    /// Target path.
    pub path: String,
    /// Options passed.
    pub options: NavigateOptions,
}

/// Navigator that records instead of routing. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    navigations: Arc<Mutex<Vec<Navigation>>>,
}

impl RecordingNavigator {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every navigation, in order.
    #[must_use]
    pub fn navigations(&self) -> Vec<Navigation> {
        self.navigations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Paths navigated to, in order.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.navigations().into_iter().map(|n| n.path).collect()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str, options: NavigateOptions) {
        self.navigations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Navigation {
                path: path.to_string(),
                options,
            });
    }
}
