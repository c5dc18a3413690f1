//! The session manager: the single source of truth for who is signed in.
//!
//! You're probably looking for the [`SessionManager`].
//!
//! # Examples
//! ```no_run
//! use facilita_auth::{
//!     session::Navigator,
//!     Client, Error,
//! };
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Debug, Default)]
//! struct Router(Mutex<String>);
//!
//! impl Navigator for Router {
//!     fn current_route(&self) -> String {
//!         self.0.lock().unwrap().clone()
//!     }
//!
//!     fn navigate(&self, route: &str) {
//!         *self.0.lock().unwrap() = route.to_string();
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let client = Client::new()?;
//!     let sessions = client
//!         .session_manager()
//!         .with_navigator(Arc::new(Router::default()))
//!         .build();
//!
//!     // Keep the guard for as long as the session should be followed.
//!     let _guard = sessions.init().await;
//!
//!     sessions.sign_in("ana@facilitacred.com.br", "s3nha-forte").await?;
//!     dbg!(sessions.current_user());
//!
//!     sessions.sign_out().await?;
//!     Ok(())
//! }
//! ```
mod backend;
mod manager;
mod redirect;
mod state;
#[cfg(test)]
mod tests;

pub use backend::AuthBackend;
pub use manager::{Builder, SessionGuard, SessionListener, SessionManager};
pub use redirect::{
    Navigator, RedirectPolicy, Redirector, DEFAULT_LANDING_ROUTE, DEFAULT_LOGIN_ROUTE,
};
pub use state::AuthState;
