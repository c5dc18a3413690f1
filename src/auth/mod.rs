//! Talk to the auth service: sign in, sign up, sign out, fetch and refresh
//! sessions, and listen for session changes.
//!
//! You're probably looking for the [`Client`]. Most applications use it
//! through the [`SessionManager`](crate::session::SessionManager) instead of
//! directly.
//!
//! # Examples
//! ```no_run
//! use facilita_auth::{Client, Error};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let client = Client::new()?;
//!
//!     let mut changes = client.auth.on_session_change();
//!     let session = client
//!         .auth
//!         .sign_in_with_password("ana@facilitacred.com.br", "s3nha-forte")
//!         .await?;
//!     println!("signed in as {}", session.user.email);
//!
//!     let event = changes.next().await;
//!     dbg!(event);
//!
//!     client.auth.sign_out().await?;
//!     Ok(())
//! }
//! ```
mod client;
mod model;
pub mod store;

pub use client::{AutoRefresh, Client, Subscription};
pub use model::{AuthChangeEvent, AuthEvent, Session, User};
pub use store::{FileStore, MemoryStore, SessionStore};
