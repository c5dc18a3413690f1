//! The top-level client for the auth service.
use std::{env, sync::Arc};

use crate::{
    auth::{
        self,
        store::{default_storage_key, MemoryStore, SessionStore},
    },
    error::{Error, Result},
    http,
    retry::RetryConfig,
    session::{self, RedirectPolicy, SessionManager},
};

/// The client is the entrypoint of the whole crate.
///
/// You can create it using [`Client::builder`] or [`Client::new`].
///
/// # Examples
/// ```no_run
/// use facilita_auth::{Client, Error};
///
/// fn main() -> Result<(), Error> {
///     // Create a new client and get the URL and anon key from the
///     // environment variables SUPABASE_URL and SUPABASE_ANON_KEY.
///     let client = Client::new()?;
///
///     // Set all available options. Unset options fall back to environment
///     // variables.
///     let client = Client::builder()
///         .with_url("https://xyzcompany.supabase.co")
///         .with_anon_key("my-anon-key")
///         .with_confirm_redirect_url("https://app.facilitacred.com.br/auth/callback")
///         .build()?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    url: String,
    pub auth: auth::Client,
    retry: RetryConfig,
    routes: RedirectPolicy,
    confirm_redirect_url: Option<String>,
}

impl Client {
    /// Creates a new client. If you want to configure it, use [`Client::builder`].
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a new client using a builder.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Get the url (cloned).
    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// A session manager builder wired to this client's auth service and
    /// configured with its retry policy, routes and confirmation URL.
    pub fn session_manager(&self) -> session::Builder {
        let builder = SessionManager::builder(Arc::new(self.auth.clone()))
            .with_retry(self.retry)
            .with_routes(self.routes.clone());
        match &self.confirm_redirect_url {
            Some(url) => builder.with_confirm_redirect_url(url.clone()),
            None => builder,
        }
    }
}

/// This builder is used to create a new client.
pub struct Builder {
    env_fallback: bool,
    url: Option<String>,
    anon_key: Option<String>,
    confirm_redirect_url: Option<String>,
    store: Option<Arc<dyn SessionStore>>,
    storage_key: Option<String>,
    retry: RetryConfig,
    routes: RedirectPolicy,
}

impl Builder {
    /// Create a new builder.
    fn new() -> Self {
        Self {
            env_fallback: true,
            url: None,
            anon_key: None,
            confirm_redirect_url: None,
            store: None,
            storage_key: None,
            retry: RetryConfig::default(),
            routes: RedirectPolicy::default(),
        }
    }

    /// Don't fall back to environment variables.
    pub fn no_env(mut self) -> Self {
        self.env_fallback = false;
        self
    }

    /// Add the auth service URL to the client. If this is not set, the URL
    /// will be read from the environment variable `SUPABASE_URL`.
    pub fn with_url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Add the project's public anon key to the client. If this is not set,
    /// the key will be read from the environment variable `SUPABASE_ANON_KEY`.
    pub fn with_anon_key<S: Into<String>>(mut self, anon_key: S) -> Self {
        self.anon_key = Some(anon_key.into());
        self
    }

    /// Where the sign-up confirmation email sends the user. If this is not
    /// set, it will be read from `SUPABASE_AUTH_REDIRECT_URL`.
    pub fn with_confirm_redirect_url<S: Into<String>>(mut self, url: S) -> Self {
        self.confirm_redirect_url = Some(url.into());
        self
    }

    /// Persist the session in `store` instead of memory.
    pub fn with_store<S: SessionStore + 'static>(mut self, store: Arc<S>) -> Self {
        let store: Arc<dyn SessionStore> = store;
        self.store = Some(store);
        self
    }

    /// Override the key the session is stored under.
    pub fn with_storage_key<S: Into<String>>(mut self, key: S) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    /// Override how rate-limited calls are retried.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Override the landing and login routes.
    pub fn with_routes(mut self, routes: RedirectPolicy) -> Self {
        self.routes = routes;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client> {
        let env_fallback = self.env_fallback;

        let mut url = self.url.unwrap_or_default();
        if url.is_empty() && env_fallback {
            url = env::var("SUPABASE_URL").unwrap_or_default();
        }
        if url.is_empty() {
            return Err(Error::MissingUrl);
        }

        let mut anon_key = self.anon_key.unwrap_or_default();
        if anon_key.is_empty() && env_fallback {
            anon_key = env::var("SUPABASE_ANON_KEY").unwrap_or_default();
        }
        if anon_key.is_empty() {
            return Err(Error::MissingAnonKey);
        }

        let mut confirm_redirect_url = self.confirm_redirect_url;
        if confirm_redirect_url.is_none() && env_fallback {
            confirm_redirect_url = env::var("SUPABASE_AUTH_REDIRECT_URL")
                .ok()
                .filter(|url| !url.is_empty());
        }

        let http_client = http::Client::new(&url, anon_key)?;
        let storage_key = self
            .storage_key
            .unwrap_or_else(|| default_storage_key(http_client.host()));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn SessionStore>);

        Ok(Client {
            url,
            auth: auth::Client::new(http_client, store, storage_key),
            retry: self.retry,
            routes: self.routes,
            confirm_redirect_url,
        })
    }
}
