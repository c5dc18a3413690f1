//! Session and authentication core for Facilita Cred.
//!
//! If you're just getting started, take a look at the [`Client`] and the
//! [`SessionManager`](session::SessionManager) it hands out. The client talks
//! to the auth service; the session manager keeps track of who is signed in
//! and redirects when that changes.
//!
//! # Examples
//! ```no_run
//! use facilita_auth::{Client, Error};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let client = Client::new()?;
//!     let sessions = client.session_manager().build();
//!
//!     // Resolve the stored session and follow changes to it
//!     let _guard = sessions.init().await;
//!
//!     if sessions.current_user().is_none() {
//!         sessions.sign_in("ana@facilitacred.com.br", "s3nha-forte").await?;
//!     }
//!     dbg!(sessions.state());
//!
//!     sessions.sign_out().await?;
//!
//!     Ok(())
//! }
//! ```
pub mod client;
pub mod error;
mod http;
pub mod retry;
mod serde;

pub mod auth;
pub mod session;

pub use client::Client;
pub use error::Error;

#[doc = include_str!("../README.md")]
#[cfg(doctest)]
pub struct ReadmeDoctests;

#[cfg(all(feature = "default-tls", feature = "native-tls"))]
compile_error!("Feature \"default-tls\" and \"native-tls\" cannot be enabled at the same time");

#[cfg(all(feature = "native-tls", feature = "rustls-tls"))]
compile_error!("Feature \"native-tls\" and \"rustls-tls\" cannot be enabled at the same time");

#[cfg(all(feature = "rustls-tls", feature = "default-tls"))]
compile_error!("Feature \"rustls-tls\" and \"default-tls\" cannot be enabled at the same time");
