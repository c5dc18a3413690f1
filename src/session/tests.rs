use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use tokio::sync::broadcast;

use super::{AuthBackend, AuthState, Navigator, SessionManager};
use crate::{
    auth::{AuthChangeEvent, AuthEvent, Session, Subscription, User},
    error::{AuthError, Error, Result},
    retry::RetryConfig,
};

fn user(email: &str) -> User {
    User {
        id: format!("id-{email}"),
        email: email.to_string(),
        email_confirmed_at: None,
        user_metadata: Default::default(),
    }
}

fn session(email: &str) -> Session {
    Session {
        access_token: format!("access-{email}"),
        token_type: "bearer".to_string(),
        expires_in: 3600,
        expires_at: Some(chrono::Utc::now().timestamp() + 3600),
        refresh_token: format!("refresh-{email}"),
        user: user(email),
    }
}

fn rejection(status: u16, message: &str) -> Error {
    Error::Auth(AuthError {
        status,
        method: http::Method::POST,
        path: "/auth/v1/token".to_string(),
        code: None,
        message: Some(message.to_string()),
    })
}

/// Scripted backend: queued results are handed out in order, and once a
/// queue is empty every call succeeds.
#[derive(Debug)]
struct FakeBackend {
    stored: Mutex<Option<Session>>,
    fetch_results: Mutex<VecDeque<Result<Option<Session>>>>,
    sign_in_results: Mutex<VecDeque<Result<Session>>>,
    sign_up_results: Mutex<VecDeque<Result<User>>>,
    sign_out_results: Mutex<VecDeque<Result<()>>>,
    calls: Mutex<Vec<String>>,
    events: broadcast::Sender<AuthEvent>,
}

impl FakeBackend {
    fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(8);
        Arc::new(Self {
            stored: Mutex::new(None),
            fetch_results: Mutex::new(VecDeque::new()),
            sign_in_results: Mutex::new(VecDeque::new()),
            sign_up_results: Mutex::new(VecDeque::new()),
            sign_out_results: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            events,
        })
    }

    fn with_session(email: &str) -> Arc<Self> {
        let backend = Self::new();
        *backend.stored.lock().unwrap() = Some(session(email));
        backend
    }

    fn calls(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(name))
            .count()
    }

    fn push(&self, event: AuthChangeEvent, session: Option<Session>) {
        self.events.send(AuthEvent { event, session }).ok();
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn session(&self) -> Result<Option<Session>> {
        self.calls.lock().unwrap().push("session".to_string());
        match self.fetch_results.lock().unwrap().pop_front() {
            Some(res) => res,
            None => Ok(self.stored.lock().unwrap().clone()),
        }
    }

    async fn sign_in_with_password(&self, email: &str, _password: &str) -> Result<Session> {
        self.calls.lock().unwrap().push(format!("sign_in {email}"));
        match self.sign_in_results.lock().unwrap().pop_front() {
            Some(res) => res,
            None => Ok(session(email)),
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
        redirect_to: Option<&str>,
    ) -> Result<User> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("sign_up {email} {}", redirect_to.unwrap_or("-")));
        match self.sign_up_results.lock().unwrap().pop_front() {
            Some(res) => res,
            None => Ok(user(email)),
        }
    }

    async fn sign_out(&self) -> Result<()> {
        self.calls.lock().unwrap().push("sign_out".to_string());
        match self.sign_out_results.lock().unwrap().pop_front() {
            Some(res) => res,
            None => Ok(()),
        }
    }

    fn on_session_change(&self) -> Subscription {
        Subscription::from(self.events.subscribe())
    }
}

#[derive(Debug)]
struct FakeNavigator {
    route: Mutex<String>,
    visits: Mutex<Vec<String>>,
}

impl FakeNavigator {
    fn at(route: &str) -> Arc<Self> {
        Arc::new(Self {
            route: Mutex::new(route.to_string()),
            visits: Mutex::new(Vec::new()),
        })
    }

    /// The user clicked somewhere; not a redirect.
    fn browse(&self, route: &str) {
        *self.route.lock().unwrap() = route.to_string();
    }

    fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

impl Navigator for FakeNavigator {
    fn current_route(&self) -> String {
        self.route.lock().unwrap().clone()
    }

    fn navigate(&self, route: &str) {
        *self.route.lock().unwrap() = route.to_string();
        self.visits.lock().unwrap().push(route.to_string());
    }
}

fn manager(backend: &Arc<FakeBackend>, navigator: &Arc<FakeNavigator>) -> SessionManager {
    SessionManager::builder(backend.clone())
        .with_navigator(navigator.clone())
        .with_confirm_redirect_url("https://app.facilitacred.com.br/auth/callback")
        .build()
}

#[tokio::test]
async fn starts_unknown() {
    let manager = manager(&FakeBackend::new(), &FakeNavigator::at("/login"));
    assert_eq!(manager.state(), AuthState::Unknown);
    assert_eq!(manager.current_user(), None);
}

#[tokio::test]
async fn sign_in_sets_user_and_redirects_once() -> Result<()> {
    let backend = FakeBackend::new();
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);

    manager.sign_in("ana@facilitacred.com.br", "s3nha").await?;

    assert_eq!(manager.current_user(), Some(user("ana@facilitacred.com.br")));
    assert!(manager.state().is_authenticated());
    assert_eq!(navigator.visits(), vec!["/creditos"]);
    assert_eq!(backend.calls("sign_in"), 1);
    Ok(())
}

#[tokio::test]
async fn sign_in_failure_keeps_previous_user() -> Result<()> {
    let backend = FakeBackend::new();
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);
    manager.sign_in("ana@facilitacred.com.br", "s3nha").await?;
    navigator.browse("/login");

    backend
        .sign_in_results
        .lock()
        .unwrap()
        .push_back(Err(rejection(400, "Invalid login credentials")));
    let err = manager
        .sign_in("bruno@facilitacred.com.br", "errada")
        .await
        .expect_err("invalid credentials");

    assert_eq!(err.to_string(), "Invalid login credentials");
    assert_eq!(manager.current_user(), Some(user("ana@facilitacred.com.br")));
    assert_eq!(navigator.visits(), vec!["/creditos"]);
    assert_eq!(backend.calls("sign_in"), 2);
    Ok(())
}

#[tokio::test]
async fn sign_in_failure_from_signed_out() {
    let backend = FakeBackend::new();
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);

    backend
        .sign_in_results
        .lock()
        .unwrap()
        .push_back(Err(rejection(400, "Email not confirmed")));
    let err = manager
        .sign_in("ana@facilitacred.com.br", "s3nha")
        .await
        .expect_err("unconfirmed");

    assert_eq!(err.to_string(), "Email not confirmed");
    assert_eq!(manager.state(), AuthState::Unknown);
    assert!(navigator.visits().is_empty());
}

#[tokio::test(start_paused = true)]
async fn sign_in_retries_rate_limit() -> Result<()> {
    let backend = FakeBackend::new();
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);
    for _ in 0..2 {
        backend
            .sign_in_results
            .lock()
            .unwrap()
            .push_back(Err(rejection(429, "Request rate limit reached")));
    }

    manager.sign_in("ana@facilitacred.com.br", "s3nha").await?;

    assert_eq!(backend.calls("sign_in"), 3);
    assert_eq!(manager.current_user(), Some(user("ana@facilitacred.com.br")));
    assert_eq!(navigator.visits(), vec!["/creditos"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn sign_in_gives_up_on_persistent_rate_limit() {
    let backend = FakeBackend::new();
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);
    for _ in 0..10 {
        backend
            .sign_in_results
            .lock()
            .unwrap()
            .push_back(Err(rejection(429, "Request rate limit reached")));
    }

    let err = manager
        .sign_in("ana@facilitacred.com.br", "s3nha")
        .await
        .expect_err("still limited");

    assert!(err.is_rate_limited());
    assert_eq!(backend.calls("sign_in"), 4);
    assert_eq!(manager.current_user(), None);
    assert!(navigator.visits().is_empty());
}

#[tokio::test]
async fn sign_in_uses_configured_retry() {
    let backend = FakeBackend::new();
    let manager = SessionManager::builder(backend.clone())
        .with_retry(RetryConfig {
            retries: 0,
            ..RetryConfig::default()
        })
        .build();
    backend
        .sign_in_results
        .lock()
        .unwrap()
        .push_back(Err(rejection(429, "Request rate limit reached")));

    assert!(manager.sign_in("ana@facilitacred.com.br", "s3nha").await.is_err());
    assert_eq!(backend.calls("sign_in"), 1);
}

#[tokio::test]
async fn sign_out_clears_user_and_redirects_once() -> Result<()> {
    let backend = FakeBackend::new();
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);
    manager.sign_in("ana@facilitacred.com.br", "s3nha").await?;

    manager.sign_out().await?;

    assert_eq!(manager.current_user(), None);
    assert_eq!(manager.state(), AuthState::Unauthenticated);
    assert_eq!(navigator.visits(), vec!["/creditos", "/login"]);
    Ok(())
}

#[tokio::test]
async fn sign_out_failure_keeps_user() -> Result<()> {
    let backend = FakeBackend::new();
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);
    manager.sign_in("ana@facilitacred.com.br", "s3nha").await?;

    backend
        .sign_out_results
        .lock()
        .unwrap()
        .push_back(Err(rejection(500, "Unexpected failure")));
    let err = manager.sign_out().await.expect_err("server failure");

    assert_eq!(err.to_string(), "Unexpected failure");
    assert_eq!(manager.current_user(), Some(user("ana@facilitacred.com.br")));
    assert_eq!(navigator.visits(), vec!["/creditos"]);
    assert_eq!(backend.calls("sign_out"), 1);
    Ok(())
}

#[tokio::test]
async fn sign_up_leaves_state_alone() -> Result<()> {
    let backend = FakeBackend::new();
    let navigator = FakeNavigator::at("/cadastro");
    let manager = manager(&backend, &navigator);

    manager.sign_up("novo@facilitacred.com.br", "s3nha").await?;

    assert_eq!(manager.state(), AuthState::Unknown);
    assert!(navigator.visits().is_empty());
    assert_eq!(
        *backend.calls.lock().unwrap(),
        vec!["sign_up novo@facilitacred.com.br https://app.facilitacred.com.br/auth/callback"]
    );
    Ok(())
}

#[tokio::test]
async fn sign_up_error_is_verbatim() {
    let backend = FakeBackend::new();
    let manager = manager(&backend, &FakeNavigator::at("/cadastro"));
    backend
        .sign_up_results
        .lock()
        .unwrap()
        .push_back(Err(rejection(422, "User already registered")));

    let err = manager
        .sign_up("ana@facilitacred.com.br", "s3nha")
        .await
        .expect_err("duplicate");
    assert_eq!(err.to_string(), "User already registered");
    assert_eq!(manager.state(), AuthState::Unknown);
}

#[tokio::test]
async fn init_without_session_on_login_route() {
    let backend = FakeBackend::new();
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);

    let _guard = manager.init().await;

    assert_eq!(manager.state(), AuthState::Unauthenticated);
    assert!(navigator.visits().is_empty());
}

#[tokio::test]
async fn init_without_session_elsewhere_redirects_to_login() {
    let backend = FakeBackend::new();
    let navigator = FakeNavigator::at("/simulacoes");
    let manager = manager(&backend, &navigator);

    let _guard = manager.init().await;

    assert_eq!(manager.state(), AuthState::Unauthenticated);
    assert_eq!(navigator.visits(), vec!["/login"]);
}

#[tokio::test]
async fn init_with_session_redirects_to_landing() {
    let backend = FakeBackend::with_session("ana@facilitacred.com.br");
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);

    let _guard = manager.init().await;

    assert_eq!(manager.current_user(), Some(user("ana@facilitacred.com.br")));
    assert_eq!(navigator.visits(), vec!["/creditos"]);
}

#[tokio::test]
async fn init_fetch_failure_assumes_signed_out() {
    let backend = FakeBackend::with_session("ana@facilitacred.com.br");
    backend
        .fetch_results
        .lock()
        .unwrap()
        .push_back(Err(rejection(500, "Database error querying schema")));
    let navigator = FakeNavigator::at("/creditos");
    let manager = manager(&backend, &navigator);

    let _guard = manager.init().await;

    assert_eq!(manager.state(), AuthState::Unauthenticated);
    assert_eq!(navigator.visits(), vec!["/login"]);
    assert_eq!(backend.calls("session"), 1);
}

#[tokio::test]
async fn external_sign_in_switches_user() {
    let backend = FakeBackend::with_session("ana@facilitacred.com.br");
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);
    let _guard = manager.init().await;
    navigator.browse("/simulacoes");

    let mut states = manager.watch();
    backend.push(
        AuthChangeEvent::SignedIn,
        Some(session("bruno@facilitacred.com.br")),
    );
    states.changed().await.expect("manager alive");

    assert_eq!(
        manager.state(),
        AuthState::Authenticated(user("bruno@facilitacred.com.br"))
    );
    assert_eq!(navigator.visits(), vec!["/creditos", "/creditos"]);
}

#[tokio::test]
async fn external_sign_out_redirects_to_login() {
    let backend = FakeBackend::with_session("ana@facilitacred.com.br");
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);
    let _guard = manager.init().await;

    let mut states = manager.watch();
    backend.push(AuthChangeEvent::SignedOut, None);
    states.changed().await.expect("manager alive");

    assert_eq!(manager.state(), AuthState::Unauthenticated);
    assert_eq!(navigator.visits(), vec!["/creditos", "/login"]);
}

#[tokio::test]
async fn token_refresh_for_same_user_does_not_redirect() {
    let backend = FakeBackend::with_session("ana@facilitacred.com.br");
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);
    let _guard = manager.init().await;

    let mut states = manager.watch();
    backend.push(
        AuthChangeEvent::TokenRefreshed,
        Some(session("ana@facilitacred.com.br")),
    );
    states.changed().await.expect("manager alive");

    assert_eq!(manager.current_user(), Some(user("ana@facilitacred.com.br")));
    assert_eq!(navigator.visits(), vec!["/creditos"]);
}

#[tokio::test]
async fn dropping_guard_stops_following_events() {
    let backend = FakeBackend::with_session("ana@facilitacred.com.br");
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);
    let guard = manager.init().await;
    drop(guard);

    backend.push(AuthChangeEvent::SignedOut, None);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(manager.current_user(), Some(user("ana@facilitacred.com.br")));
    assert_eq!(navigator.visits(), vec!["/creditos"]);
}

#[tokio::test]
async fn watchers_see_transitions() -> Result<()> {
    let backend = FakeBackend::new();
    let manager = SessionManager::builder(backend.clone()).build();
    let states = manager.watch();
    assert_eq!(*states.borrow(), AuthState::Unknown);

    manager.sign_in("ana@facilitacred.com.br", "s3nha").await?;
    assert_eq!(
        *states.borrow(),
        AuthState::Authenticated(user("ana@facilitacred.com.br"))
    );

    manager.sign_out().await?;
    assert_eq!(*states.borrow(), AuthState::Unauthenticated);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn init_retries_rate_limited_fetch() {
    let backend = FakeBackend::with_session("ana@facilitacred.com.br");
    for _ in 0..2 {
        backend
            .fetch_results
            .lock()
            .unwrap()
            .push_back(Err(rejection(429, "Request rate limit reached")));
    }
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);

    let _guard = manager.init().await;

    assert_eq!(backend.calls("session"), 3);
    assert_eq!(manager.current_user(), Some(user("ana@facilitacred.com.br")));
    assert_eq!(navigator.visits(), vec!["/creditos"]);
}

#[tokio::test(start_paused = true)]
async fn sign_up_retries_rate_limit() -> Result<()> {
    let backend = FakeBackend::new();
    let navigator = FakeNavigator::at("/cadastro");
    let manager = manager(&backend, &navigator);
    for _ in 0..3 {
        backend
            .sign_up_results
            .lock()
            .unwrap()
            .push_back(Err(rejection(429, "Email rate limit exceeded")));
    }

    manager.sign_up("novo@facilitacred.com.br", "s3nha").await?;

    assert_eq!(backend.calls("sign_up"), 4);
    assert_eq!(manager.state(), AuthState::Unknown);
    assert!(navigator.visits().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn sign_out_retries_rate_limit() -> Result<()> {
    let backend = FakeBackend::new();
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);
    manager.sign_in("ana@facilitacred.com.br", "s3nha").await?;
    backend
        .sign_out_results
        .lock()
        .unwrap()
        .push_back(Err(rejection(429, "Request rate limit reached")));

    manager.sign_out().await?;

    assert_eq!(backend.calls("sign_out"), 2);
    assert_eq!(manager.state(), AuthState::Unauthenticated);
    assert_eq!(navigator.visits(), vec!["/creditos", "/login"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn sign_out_gives_up_on_persistent_rate_limit() -> Result<()> {
    let backend = FakeBackend::new();
    let navigator = FakeNavigator::at("/login");
    let manager = manager(&backend, &navigator);
    manager.sign_in("ana@facilitacred.com.br", "s3nha").await?;
    for _ in 0..10 {
        backend
            .sign_out_results
            .lock()
            .unwrap()
            .push_back(Err(rejection(429, "Request rate limit reached")));
    }

    let err = manager.sign_out().await.expect_err("still limited");

    assert!(err.is_rate_limited());
    assert_eq!(backend.calls("sign_out"), 4);
    assert_eq!(manager.current_user(), Some(user("ana@facilitacred.com.br")));
    assert_eq!(navigator.visits(), vec!["/creditos"]);
    Ok(())
}
