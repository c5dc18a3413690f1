use async_trait::async_trait;

use crate::{
    auth::{self, Session, Subscription, User},
    error::Result,
};

/// The auth operations the session manager depends on.
///
/// [`auth::Client`] is the real implementation; anything else (a test
/// double, a different provider) can stand in for it.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// The current session, `None` if nobody is signed in.
    async fn session(&self) -> Result<Option<Session>>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;

    /// Register an account; `redirect_to` is where the confirmation email
    /// points.
    async fn sign_up(&self, email: &str, password: &str, redirect_to: Option<&str>)
        -> Result<User>;

    async fn sign_out(&self) -> Result<()>;

    /// Push notifications for every session change.
    fn on_session_change(&self) -> Subscription;
}

#[async_trait]
impl AuthBackend for auth::Client {
    async fn session(&self) -> Result<Option<Session>> {
        auth::Client::session(self).await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        auth::Client::sign_in_with_password(self, email, password).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: Option<&str>,
    ) -> Result<User> {
        auth::Client::sign_up(self, email, password, redirect_to).await
    }

    async fn sign_out(&self) -> Result<()> {
        auth::Client::sign_out(self).await
    }

    fn on_session_change(&self) -> Subscription {
        auth::Client::on_session_change(self)
    }
}
