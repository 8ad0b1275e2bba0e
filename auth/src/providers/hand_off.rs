//! Token hand-off collaborator trait.

use crate::error::Result;
use crate::state::HandOffPayload;

/// Persists upstream provider tokens into the system of record.
///
/// Called best-effort after a federated sign-in; failures never affect the
/// established session.
pub trait TokenHandOff: Send + Sync + 'static {
    /// Hand the provider tokens off.
    ///
    /// # Errors
    ///
    /// Returns error if the system of record rejects or cannot store them.
    fn hand_off(
        &self,
        payload: HandOffPayload,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
