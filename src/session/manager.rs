use std::{fmt, sync::Arc};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, instrument, warn};

use crate::{
    auth::User,
    error::Result,
    retry::{with_retry, RetryConfig},
    session::{AuthBackend, AuthState, Navigator, RedirectPolicy, Redirector},
};

/// Reacts to session state changes. Listeners run synchronously, in
/// registration order, right after the new state is published.
pub trait SessionListener: Send + Sync + fmt::Debug {
    fn on_change(&self, state: &AuthState);
}

/// Owns the cached signed-in user.
///
/// Every path that changes the user (initialization, pushed session
/// events, sign-in, sign-out) goes through one place, which publishes the
/// new [`AuthState`] and then notifies the listeners, typically a
/// [`Redirector`].
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn AuthBackend>,
    state: watch::Sender<AuthState>,
    listeners: Vec<Arc<dyn SessionListener>>,
    retry: RetryConfig,
    confirm_redirect_url: Option<String>,
}

impl SessionManager {
    /// Create a new session manager using a builder.
    pub fn builder(backend: Arc<dyn AuthBackend>) -> Builder {
        Builder::new(backend)
    }

    /// The signed-in user, if any. Never touches the network.
    pub fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Observe state changes.
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Resolve the initial session and follow session changes until the
    /// returned guard is dropped.
    ///
    /// A failed fetch is logged and treated as signed out.
    pub async fn init(&self) -> SessionGuard {
        let backend = &self.inner.backend;
        let mut changes = backend.on_session_change();

        match with_retry(self.inner.retry, move || backend.session()).await {
            Ok(session) => self.apply(session.map(|session| session.user)),
            Err(e) => {
                warn!(error = %e, "could not fetch the session, assuming signed out");
                self.apply(None);
            }
        }

        let manager = self.clone();
        let task = tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                debug!(event = ?change.event, "session changed");
                manager.apply(change.session.map(|session| session.user));
            }
        });
        SessionGuard { task }
    }

    /// Sign in with email and password. On failure the current state is
    /// kept and the service's error is returned as-is.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        let backend = &self.inner.backend;
        match with_retry(self.inner.retry, move || {
            backend.sign_in_with_password(email, password)
        })
        .await
        {
            Ok(session) => {
                info!(user_id = %session.user.id, "signed in");
                self.apply(Some(session.user));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "sign in failed");
                Err(e)
            }
        }
    }

    /// Register an account. The user stays signed out until they confirm
    /// their email.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<()> {
        let backend = &self.inner.backend;
        let redirect_to = self.inner.confirm_redirect_url.as_deref();
        match with_retry(self.inner.retry, move || {
            backend.sign_up(email, password, redirect_to)
        })
        .await
        {
            Ok(user) => {
                info!(user_id = %user.id, "signed up");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "sign up failed");
                Err(e)
            }
        }
    }

    /// Sign out. On failure the user stays signed in.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        let backend = &self.inner.backend;
        match with_retry(self.inner.retry, move || backend.sign_out()).await {
            Ok(()) => {
                info!("signed out");
                self.apply(None);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "sign out failed");
                Err(e)
            }
        }
    }

    fn apply(&self, user: Option<User>) {
        let next = AuthState::from(user);
        let previous = self.inner.state.send_replace(next.clone());
        if previous != next {
            debug!(
                from = ?previous.user().map(|u| &u.id),
                to = ?next.user().map(|u| &u.id),
                "auth state changed"
            );
        }
        for listener in &self.inner.listeners {
            listener.on_change(&next);
        }
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &*self.inner.state.borrow())
            .field("listeners", &self.inner.listeners)
            .field("retry", &self.inner.retry)
            .finish()
    }
}

/// Keeps the session-change subscription alive; dropping it unsubscribes.
#[derive(Debug)]
pub struct SessionGuard {
    task: JoinHandle<()>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// This builder is used to create a new session manager.
pub struct Builder {
    backend: Arc<dyn AuthBackend>,
    listeners: Vec<Arc<dyn SessionListener>>,
    navigator: Option<Arc<dyn Navigator>>,
    policy: RedirectPolicy,
    retry: RetryConfig,
    confirm_redirect_url: Option<String>,
}

impl Builder {
    fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self {
            backend,
            listeners: Vec::new(),
            navigator: None,
            policy: RedirectPolicy::default(),
            retry: RetryConfig::default(),
            confirm_redirect_url: None,
        }
    }

    /// Redirect through `navigator` on every state change.
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Override the landing and login routes.
    pub fn with_routes(mut self, policy: RedirectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Add a listener for state changes.
    pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Where the sign-up confirmation email sends the user.
    pub fn with_confirm_redirect_url<S: Into<String>>(mut self, url: S) -> Self {
        self.confirm_redirect_url = Some(url.into());
        self
    }

    /// Build the session manager. It starts in [`AuthState::Unknown`].
    pub fn build(self) -> SessionManager {
        let mut listeners = self.listeners;
        if let Some(navigator) = self.navigator {
            listeners.push(Arc::new(Redirector::new(navigator, self.policy)));
        }
        let (state, _) = watch::channel(AuthState::Unknown);

        SessionManager {
            inner: Arc::new(Inner {
                backend: self.backend,
                state,
                listeners,
                retry: self.retry,
                confirm_redirect_url: self.confirm_redirect_url,
            }),
        }
    }
}
