use crate::auth::User;

/// Who is signed in, as far as this process knows.
///
/// Starts as `Unknown` until the first session fetch resolves; afterwards
/// it moves freely between `Authenticated` and `Unauthenticated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unknown,
    Authenticated(User),
    Unauthenticated,
}

impl AuthState {
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }
}

impl Default for AuthState {
    fn default() -> Self {
        AuthState::Unknown
    }
}

impl From<Option<User>> for AuthState {
    fn from(user: Option<User>) -> Self {
        match user {
            Some(user) => AuthState::Authenticated(user),
            None => AuthState::Unauthenticated,
        }
    }
}
