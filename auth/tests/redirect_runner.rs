//! Redirect coordinator driven by live auth state.

#![allow(clippy::unwrap_used)] // Test code

use session_guard_auth::mocks::{test_session, MockIdentityProvider, MockTokenHandOff, RecordingNavigator};
use session_guard_auth::{
    AuthEvent, AuthState, GuardView, MemoryStorage, RedirectConfig, RedirectCoordinator,
    RedirectDecision, RouteContext, SessionConfig, SessionManager, User, UserId,
};
use std::sync::Arc;
use std::time::Duration;

fn signed_in() -> AuthState {
    AuthState::from_session(Some(test_session(User::new(UserId::new(), None), "t")))
}

fn delayed(ms: u64) -> RedirectConfig {
    RedirectConfig::default().with_navigation_delay(Duration::from_millis(ms))
}

#[tokio::test]
async fn test_loading_state_never_navigates() {
    let navigator = Arc::new(RecordingNavigator::new());
    let coordinator = RedirectCoordinator::new(Arc::clone(&navigator), RedirectConfig::default());

    let decision = coordinator.evaluate(&AuthState::default(), &RouteContext::at("/library"));

    assert_eq!(decision, RedirectDecision::None);
    assert_eq!(GuardView::of(&AuthState::default(), &decision), GuardView::Loading);
    assert!(navigator.navigations().is_empty());
}

#[tokio::test]
async fn test_each_distinct_tuple_navigates_once() {
    let navigator = Arc::new(RecordingNavigator::new());
    let coordinator = RedirectCoordinator::new(Arc::clone(&navigator), RedirectConfig::default());
    let user = signed_in();

    coordinator.evaluate(&AuthState::signed_out(), &RouteContext::at("/library"));
    coordinator.evaluate(&AuthState::signed_out(), &RouteContext::at("/library"));
    coordinator.evaluate(&user, &RouteContext::at("/auth").with_stored_return_to("/library"));
    coordinator.evaluate(&user, &RouteContext::at("/auth").with_stored_return_to("/library"));
    coordinator.evaluate(&user, &RouteContext::at("/library"));

    assert_eq!(navigator.paths(), vec!["/auth".to_string(), "/library".to_string()]);
}

#[tokio::test]
async fn test_role_change_is_a_new_tuple() {
    let navigator = Arc::new(RecordingNavigator::new());
    let config = RedirectConfig::default().with_allowed_roles(["admin"]);
    let coordinator = RedirectCoordinator::new(Arc::clone(&navigator), config);
    let user = signed_in();

    let decision = coordinator.evaluate(&user, &RouteContext::at("/admin").with_role("viewer"));
    assert_eq!(decision, RedirectDecision::ToUnauthorized);
    assert_eq!(GuardView::of(&user, &decision), GuardView::Redirecting);

    let decision = coordinator.evaluate(&user, &RouteContext::at("/admin").with_role("admin"));
    assert_eq!(GuardView::of(&user, &decision), GuardView::Content);

    assert_eq!(navigator.paths(), vec!["/unauthorized".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_delayed_navigation_fires_after_delay() {
    let navigator = Arc::new(RecordingNavigator::new());
    let coordinator = RedirectCoordinator::new(Arc::clone(&navigator), delayed(100));

    coordinator.evaluate(&AuthState::signed_out(), &RouteContext::at("/library"));
    assert!(coordinator.has_pending());
    assert!(navigator.navigations().is_empty());

    tokio::time::sleep(Duration::from_millis(101)).await;
    tokio::task::yield_now().await;

    assert_eq!(navigator.paths(), vec!["/auth".to_string()]);
    assert!(!coordinator.has_pending());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pending_clears_once_delayed_navigation_lands() {
    for _ in 0..20 {
        let navigator = Arc::new(RecordingNavigator::new());
        let coordinator = RedirectCoordinator::new(Arc::clone(&navigator), delayed(1));

        coordinator.evaluate(&AuthState::signed_out(), &RouteContext::at("/library"));
        tokio::time::timeout(Duration::from_secs(5), async {
            while navigator.navigations().is_empty() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        // Cleared before the navigator is called
        assert!(!coordinator.has_pending());
        assert_eq!(navigator.paths(), vec!["/auth".to_string()]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_new_decision_cancels_pending_navigation() {
    let navigator = Arc::new(RecordingNavigator::new());
    let coordinator = RedirectCoordinator::new(Arc::clone(&navigator), delayed(100));

    coordinator.evaluate(&AuthState::signed_out(), &RouteContext::at("/library"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Session restored before the redirect fired
    let decision = coordinator.evaluate(&signed_in(), &RouteContext::at("/library"));
    assert_eq!(decision, RedirectDecision::None);
    assert!(!coordinator.has_pending());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(navigator.navigations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dispose_cancels_pending_navigation() {
    let navigator = Arc::new(RecordingNavigator::new());
    let coordinator = RedirectCoordinator::new(Arc::clone(&navigator), delayed(100));

    coordinator.evaluate(&AuthState::signed_out(), &RouteContext::at("/library"));
    coordinator.dispose();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(navigator.navigations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_coordinator_cancels_pending_navigation() {
    let navigator = Arc::new(RecordingNavigator::new());
    let coordinator = RedirectCoordinator::new(Arc::clone(&navigator), delayed(100));

    coordinator.evaluate(&AuthState::signed_out(), &RouteContext::at("/library"));
    drop(coordinator);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(navigator.navigations().is_empty());
}

#[test]
fn test_delayed_navigation_without_runtime_navigates_immediately() {
    let navigator = Arc::new(RecordingNavigator::new());
    let coordinator = RedirectCoordinator::new(Arc::clone(&navigator), delayed(100));

    coordinator.evaluate(&AuthState::signed_out(), &RouteContext::at("/library"));
    assert_eq!(navigator.paths(), vec!["/auth".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_guard_follows_manager_state() {
    let storage = Arc::new(MemoryStorage::new());
    let provider = Arc::new(MockIdentityProvider::new());
    let manager = SessionManager::create(
        storage,
        Arc::clone(&provider),
        Arc::new(MockTokenHandOff::new()),
        SessionConfig::default(),
    )
    .await;

    let navigator = Arc::new(RecordingNavigator::new());
    let coordinator = RedirectCoordinator::new(Arc::clone(&navigator), RedirectConfig::default());

    // Signed out on a guarded page: sent to sign in
    let decision = coordinator.evaluate(&manager.state().await, &RouteContext::at("/library"));
    assert_eq!(
        decision,
        RedirectDecision::ToLogin {
            return_to: "/library".into()
        }
    );

    let navigation = navigator.navigations().remove(0);
    let return_to = navigation.options.state.unwrap()["from"]
        .as_str()
        .unwrap()
        .to_string();

    // Signing in on the sign-in page returns to the stored path
    let session = test_session(User::new(UserId::new(), None), "t");
    let user_id = session.user.id;
    provider.emit(AuthEvent::signed_in(session));
    let mut states = manager.subscribe();
    let state = states
        .wait_for(|s| s.user_id() == Some(user_id))
        .await
        .unwrap()
        .clone();

    let route = RouteContext::at("/auth").with_stored_return_to(return_to);
    coordinator.evaluate(&state, &route);

    // Signing out reloads into loading, then signed out: back to sign in
    manager.sign_out().await.unwrap();
    coordinator.evaluate(&manager.state().await, &RouteContext::at("/library"));

    assert_eq!(
        navigator.paths(),
        vec!["/auth".to_string(), "/library".to_string(), "/auth".to_string()]
    );
}
