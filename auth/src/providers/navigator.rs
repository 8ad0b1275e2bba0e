//! Navigation service trait.

/// Options for a navigation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigateOptions {
    /// Replace the current history entry instead of pushing one.
    pub replace: bool,

    /// State attached to the history entry.
    pub state: Option<serde_json::Value>,
}

impl NavigateOptions {
    /// Replace the current entry, without state.
    #[must_use]
    pub const fn replace() -> Self {
        Self {
            replace: true,
            state: None,
        }
    }

    /// Attach history state.
    #[must_use]
    pub fn with_state(mut self, state: serde_json::Value) -> Self {
        self.state = Some(state);
        self
    }
}

/// Client-side router.
pub trait Navigator: Send + Sync + 'static {
    /// Navigate to `path`.
    fn navigate(&self, path: &str, options: NavigateOptions);
}
