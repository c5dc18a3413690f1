use chrono::Utc;
use std::{fmt::Debug as FmtDebug, sync::Arc, time::Duration as StdDuration};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::{
    auth::{model::*, store::SessionStore},
    error::{Error, Result},
    http,
};

/// Sessions expiring within this margin are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 90;
/// How often the auto-refresh task checks the stored session.
const AUTO_REFRESH_TICK: StdDuration = StdDuration::from_secs(30);
/// Refresh once the session expires within this many ticks.
const AUTO_REFRESH_TICK_THRESHOLD: i64 = 3;
const EVENT_CAPACITY: usize = 16;

/// Provides methods to talk to the auth service: password sign-in, sign-up,
/// sign-out, session fetching and refresh, and the session-change stream.
#[derive(Debug, Clone)]
pub struct Client {
    http_client: http::Client,
    store: Arc<dyn SessionStore>,
    storage_key: String,
    events: broadcast::Sender<AuthEvent>,
    // Held for the whole token exchange; refresh tokens are single use.
    refresh_lock: Arc<Mutex<()>>,
}

impl Client {
    pub(crate) fn new(
        http_client: http::Client,
        store: Arc<dyn SessionStore>,
        storage_key: String,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            http_client,
            store,
            storage_key,
            events,
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The key the session is persisted under.
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Returns the current session, refreshing it first if the access token
    /// is expired or about to expire. `None` means nobody is signed in.
    #[instrument(skip(self))]
    pub async fn session(&self) -> Result<Option<Session>> {
        let session = match self.load()? {
            Some(session) => session,
            None => return Ok(None),
        };

        if !session.expires_within(Utc::now(), chrono::Duration::seconds(EXPIRY_MARGIN_SECS)) {
            return Ok(Some(session));
        }

        debug!("stored session is expiring, refreshing");
        self.refresh_with(&session.refresh_token).await
    }

    /// Sign in with email and password.
    #[instrument(skip(self, password))]
    pub async fn sign_in_with_password<E, P>(&self, email: E, password: P) -> Result<Session>
    where
        E: AsRef<str> + FmtDebug,
        P: AsRef<str>,
    {
        let query = serde_qs::to_string(&TokenQuery {
            grant_type: "password",
        })?;
        let credentials = PasswordCredentials {
            email: email.as_ref(),
            password: password.as_ref(),
        };
        let session: Session = self
            .http_client
            .post(format!("/auth/v1/token?{query}"), &credentials, None)
            .await?
            .json()
            .await?;
        let session = session.stamped(Utc::now());

        self.save(&session)?;
        info!(user_id = %session.user.id, "signed in");
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Register a new account. `redirect_to` is where the confirmation email
    /// sends the user.
    ///
    /// Returns the new user. If the service auto-confirms accounts, the
    /// session it hands out is stored and a `SignedIn` event is emitted.
    #[instrument(skip(self, password))]
    pub async fn sign_up<E, P>(
        &self,
        email: E,
        password: P,
        redirect_to: Option<&str>,
    ) -> Result<User>
    where
        E: AsRef<str> + FmtDebug,
        P: AsRef<str>,
    {
        let query = serde_qs::to_string(&SignUpQuery { redirect_to })?;
        let path = if query.is_empty() {
            "/auth/v1/signup".to_string()
        } else {
            format!("/auth/v1/signup?{query}")
        };
        let credentials = PasswordCredentials {
            email: email.as_ref(),
            password: password.as_ref(),
        };
        let res: SignUpResponse = self
            .http_client
            .post(path, &credentials, None)
            .await?
            .json()
            .await?;

        match res {
            SignUpResponse::Session(session) => {
                let session = session.stamped(Utc::now());
                self.save(&session)?;
                let user = session.user.clone();
                self.emit(AuthChangeEvent::SignedIn, Some(session));
                Ok(user)
            }
            SignUpResponse::User(user) => Ok(user),
        }
    }

    /// Sign out the current session.
    ///
    /// If the service no longer knows the session (401, 403 or 404), it is
    /// already gone and the local copy is dropped as well. Any other failure
    /// keeps the local session.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        if let Some(session) = self.load()? {
            let res = self
                .http_client
                .post_empty("/auth/v1/logout", Some(&session.access_token))
                .await?
                .check_error()
                .await;
            match res {
                Ok(_) => {}
                Err(Error::Auth(e)) if matches!(e.status, 401 | 403 | 404) => {
                    debug!(status = e.status, "session already gone on the server");
                }
                Err(e) => return Err(e),
            }
        }

        self.store.remove(&self.storage_key)?;
        info!("signed out");
        self.emit(AuthChangeEvent::SignedOut, None);
        Ok(())
    }

    /// Exchange the stored refresh token for a new session.
    #[instrument(skip(self))]
    pub async fn refresh_session(&self) -> Result<Session> {
        let session = self.load()?.ok_or(Error::MissingSession)?;
        self.refresh_with(&session.refresh_token)
            .await?
            .ok_or(Error::MissingSession)
    }

    /// Fetch the user behind the stored access token from the service,
    /// rather than trusting the local copy.
    #[instrument(skip(self))]
    pub async fn user(&self) -> Result<Option<User>> {
        let session = match self.session().await? {
            Some(session) => session,
            None => return Ok(None),
        };
        self.http_client
            .get("/auth/v1/user", Some(&session.access_token))
            .await?
            .json()
            .await
            .map(Some)
    }

    /// Subscribe to session changes. Dropping the subscription unsubscribes.
    pub fn on_session_change(&self) -> Subscription {
        Subscription::from(self.events.subscribe())
    }

    /// Keep the stored session fresh in the background. The task stops when
    /// the returned handle is dropped.
    pub fn start_auto_refresh(&self) -> AutoRefresh {
        let client = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(AUTO_REFRESH_TICK);
            loop {
                ticker.tick().await;
                client.auto_refresh_tick().await;
            }
        });
        AutoRefresh { handle }
    }

    pub(super) async fn auto_refresh_tick(&self) {
        let session = match self.load() {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "auto refresh could not read the session");
                return;
            }
        };
        let threshold = chrono::Duration::seconds(
            AUTO_REFRESH_TICK.as_secs() as i64 * AUTO_REFRESH_TICK_THRESHOLD,
        );
        if session.expires_within(Utc::now(), threshold) {
            if let Err(e) = self.refresh_with(&session.refresh_token).await {
                warn!(error = %e, "auto refresh failed");
            }
        }
    }

    /// Exchange `refresh_token` for a new session. Concurrent callers are
    /// serialized: whoever comes second finds the session already rotated
    /// and gets it without another exchange. `None` means the session was
    /// removed meanwhile.
    async fn refresh_with(&self, refresh_token: &str) -> Result<Option<Session>> {
        let _exchange = self.refresh_lock.lock().await;
        match self.load()? {
            Some(stored) if stored.refresh_token != refresh_token => {
                debug!("session already refreshed");
                return Ok(Some(stored));
            }
            Some(_) => {}
            None => return Ok(None),
        }

        let query = serde_qs::to_string(&TokenQuery {
            grant_type: "refresh_token",
        })?;
        let res = self
            .http_client
            .post(
                format!("/auth/v1/token?{query}"),
                &RefreshTokenGrant { refresh_token },
                None,
            )
            .await;
        let res = match res {
            Ok(res) => res.json::<Session>().await,
            Err(e) => Err(e),
        };

        match res {
            Ok(session) => {
                let session = session.stamped(Utc::now());
                self.save(&session)?;
                debug!(user_id = %session.user.id, "session refreshed");
                self.emit(AuthChangeEvent::TokenRefreshed, Some(session.clone()));
                Ok(Some(session))
            }
            Err(Error::Auth(e)) if e.is_client_rejection() => {
                // The refresh token was revoked or already used. A sign-in
                // may have stored a new session while the exchange ran.
                let still_stored = self
                    .load()?
                    .map_or(false, |stored| stored.refresh_token == refresh_token);
                if still_stored {
                    warn!(error = %e, "refresh token rejected, dropping session");
                    self.store.remove(&self.storage_key)?;
                    self.emit(AuthChangeEvent::SignedOut, None);
                } else {
                    warn!(error = %e, "refresh token rejected, session already replaced");
                }
                Err(Error::Auth(e))
            }
            Err(e) => {
                warn!(error = %e, "session refresh failed");
                Err(e)
            }
        }
    }

    fn load(&self) -> Result<Option<Session>> {
        let raw = match self.store.get(&self.storage_key)? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(error = %e, "discarding unreadable stored session");
                self.store.remove(&self.storage_key)?;
                Ok(None)
            }
        }
    }

    fn save(&self, session: &Session) -> Result<()> {
        let raw = serde_json::to_string(session)?;
        self.store.set(&self.storage_key, &raw)
    }

    fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        // Nobody listening is fine.
        self.events.send(AuthEvent { event, session }).ok();
    }
}

/// A live subscription to session changes.
#[derive(Debug)]
pub struct Subscription {
    inner: BroadcastStream<AuthEvent>,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once the client is gone.
    /// Events missed by a lagging subscriber are skipped.
    pub async fn next(&mut self) -> Option<AuthEvent> {
        while let Some(res) = self.inner.next().await {
            match res {
                Ok(event) => return Some(event),
                Err(e) => warn!(error = %e, "session subscriber lagged"),
            }
        }
        None
    }

    /// Turns the subscription into a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = AuthEvent> {
        self.inner.filter_map(|res| res.ok())
    }
}

impl From<broadcast::Receiver<AuthEvent>> for Subscription {
    fn from(rx: broadcast::Receiver<AuthEvent>) -> Self {
        Self {
            inner: BroadcastStream::new(rx),
        }
    }
}

/// Handle to the background refresh task; dropping it stops the task.
#[derive(Debug)]
pub struct AutoRefresh {
    handle: JoinHandle<()>,
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
