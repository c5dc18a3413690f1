use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::serde::deserialize_null_default;

/// An account as the auth service reports it.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct User {
    /// The user's unique identifier.
    pub id: String,
    /// The user's email address. Accounts are email and password only, so
    /// a user without one is rejected when decoding.
    pub email: String,
    /// When the user confirmed their email, if they did.
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    /// Free-form profile data set at sign-up.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub user_metadata: serde_json::Map<String, serde_json::Value>,
}

/// A session issued by the auth service.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Session {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
    /// Unix timestamp at which the access token expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub refresh_token: String,
    pub user: User,
}

impl Session {
    /// Fill in `expires_at` from `expires_in` when the service left it out.
    pub(crate) fn stamped(mut self, now: DateTime<Utc>) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = Some(now.timestamp() + self.expires_in);
        }
        self
    }

    /// The instant the access token expires.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }

    /// Whether the access token is expired, or will be within `margin`.
    /// A session without a known expiry is treated as expired.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at()
            .map_or(true, |expires_at| expires_at <= now + margin)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field("refresh_token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

/// What changed about the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// A push notification about the session, delivered to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub event: AuthChangeEvent,
    /// The session after the change; `None` once signed out.
    pub session: Option<Session>,
}

#[derive(Serialize, Debug)]
pub(crate) struct PasswordCredentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Serialize, Debug)]
pub(crate) struct RefreshTokenGrant<'a> {
    pub refresh_token: &'a str,
}

#[derive(Serialize, Debug)]
pub(crate) struct TokenQuery {
    pub grant_type: &'static str,
}

#[derive(Serialize, Debug)]
pub(crate) struct SignUpQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<&'a str>,
}

/// Sign-up answers with a session when the service auto-confirms accounts,
/// and with the bare user when confirmation is pending.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub(crate) enum SignUpResponse {
    Session(Session),
    User(User),
}
