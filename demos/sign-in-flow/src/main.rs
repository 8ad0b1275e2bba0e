//! Sign-in flow demo.
//!
//! Walks one federated sign-in through the whole session layer:
//!
//! 1. Start signed out and get redirected to the sign-in page
//! 2. Sign in; the provider writes the token a little after announcing it
//! 3. Wait for the token to persist before "calling the API", then refresh it
//! 4. Return to the page the user came from
//! 5. Hand provider tokens off after the settle delay
//! 6. Sign out: purge, provider sign-out, reload
//!
//! Run with:
//! ```bash
//! RUST_LOG=debug cargo run -p sign-in-flow
//! ```

use session_guard_auth::mocks::{federated_session, MockIdentityProvider};
use session_guard_auth::{
    AuthEvent, DurableStorage, HandOffPayload, MemoryStorage, NavigateOptions, Navigator,
    RedirectConfig, RedirectCoordinator, RouteContext, SessionConfig, SessionManager,
    StorageKeyPattern, TokenHandOff, TokenRecord,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prints navigations instead of routing.
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, path: &str, options: NavigateOptions) {
        tracing::info!(path, replace = options.replace, state = ?options.state, "→ navigate");
    }
}

/// Pretends to store provider tokens in a connections table.
struct ConsoleHandOff;

impl TokenHandOff for ConsoleHandOff {
    fn hand_off(
        &self,
        payload: HandOffPayload,
    ) -> impl Future<Output = session_guard_auth::Result<()>> + Send {
        async move {
            tracing::info!(
                name = %payload.user_metadata["full_name"],
                has_refresh_token = payload.provider_refresh_token.is_some(),
                "✓ Provider tokens stored"
            );
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,session_guard_auth=debug,sign_in_flow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = SessionConfig::from_env()?;
    tracing::info!(settle_delay = ?config.settle_delay, max_wait = ?config.gateway.max_wait, "Starting");

    let storage = Arc::new(MemoryStorage::new());
    let provider = Arc::new(MockIdentityProvider::new());
    let manager = SessionManager::create(
        Arc::clone(&storage),
        Arc::clone(&provider),
        Arc::new(ConsoleHandOff),
        config.clone(),
    )
    .await;
    let coordinator = RedirectCoordinator::new(Arc::new(ConsoleNavigator), RedirectConfig::default());

    // 1. Signed out on a guarded page
    let decision = coordinator.evaluate(&manager.state().await, &RouteContext::at("/library"));
    tracing::info!(?decision, "Visited /library");

    // 2. Federated sign-in; the token lands 40ms after the event
    let session = federated_session("spotify", "demo-access-token");
    let user_id = session.user.id;
    let record = TokenRecord::from_session(&session).to_json()?;
    let writer = Arc::clone(&storage);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        let key = StorageKeyPattern::default().key_for("demo");
        if let Err(error) = writer.set(&key, &record) {
            tracing::error!(%error, "Token write failed");
        }
    });
    provider.emit(AuthEvent::signed_in(session.clone()));

    let state = manager
        .subscribe()
        .wait_for(|s| s.user_id() == Some(user_id))
        .await?
        .clone();
    tracing::info!(user_id = %user_id, "✓ Signed in");

    // 3. Only call the API once the token is readable
    let persisted = manager.gateway().wait_for_token_persistence(&session).await;
    tracing::info!(persisted, "✓ Token persistence settled, calling API");

    // Refresh rotates the access token; requests wait again
    let mut refreshed = session.clone();
    refreshed.access_token = "demo-access-token-2".to_string();
    let record = TokenRecord::from_session(&refreshed).to_json()?;
    storage.set(&StorageKeyPattern::default().key_for("demo"), &record)?;
    provider.emit(AuthEvent::token_refreshed(refreshed.clone()));
    let persisted = manager.gateway().wait_for_token_persistence(&refreshed).await;
    tracing::info!(persisted, "✓ Refreshed token persisted");

    // 4. Back to where the user started
    let route = RouteContext::at("/auth").with_stored_return_to("/library");
    let decision = coordinator.evaluate(&state, &route);
    tracing::info!(?decision, "On sign-in page while signed in");

    // 5. Hand-off runs after the settle delay
    tokio::time::sleep(config.settle_delay + Duration::from_millis(100)).await;

    // 6. Sign out and reload
    manager.sign_out().await?;
    tracing::info!(
        generation = manager.generation(),
        stored_keys = storage.len(),
        "✓ Signed out and reloaded"
    );

    let decision = coordinator.evaluate(&manager.state().await, &RouteContext::at("/library"));
    tracing::info!(?decision, "Visited /library after sign-out");

    coordinator.dispose();
    manager.dispose();
    tracing::info!("Done");

    Ok(())
}
