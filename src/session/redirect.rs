//! Navigation on session changes.
//!
//! The session manager only publishes state changes. Turning them into page
//! transitions is the job of a [`Redirector`], one of its listeners.

use std::{fmt::Debug, sync::Arc};
use tracing::debug;

use crate::session::{AuthState, SessionListener};

/// The first page shown after signing in: the credit applications list.
pub const DEFAULT_LANDING_ROUTE: &str = "/creditos";
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";

/// Performs client-side page transitions.
pub trait Navigator: Send + Sync + Debug {
    /// The route currently shown.
    fn current_route(&self) -> String;
    /// Move to `route`.
    fn navigate(&self, route: &str);
}

/// Where each state should land the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectPolicy {
    pub landing_route: String,
    pub login_route: String,
}

impl RedirectPolicy {
    pub fn new<L, G>(landing_route: L, login_route: G) -> Self
    where
        L: Into<String>,
        G: Into<String>,
    {
        Self {
            landing_route: landing_route.into(),
            login_route: login_route.into(),
        }
    }

    /// The route `state` belongs on, if any. Nothing is decided while the
    /// state is still unknown.
    pub fn target(&self, state: &AuthState) -> Option<&str> {
        match state {
            AuthState::Authenticated(_) => Some(&self.landing_route),
            AuthState::Unauthenticated => Some(&self.login_route),
            AuthState::Unknown => None,
        }
    }
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LANDING_ROUTE, DEFAULT_LOGIN_ROUTE)
    }
}

/// Applies a [`RedirectPolicy`] through a [`Navigator`] on every state
/// change, skipping the transition when already on the target route.
#[derive(Debug, Clone)]
pub struct Redirector {
    navigator: Arc<dyn Navigator>,
    policy: RedirectPolicy,
}

impl Redirector {
    pub fn new(navigator: Arc<dyn Navigator>, policy: RedirectPolicy) -> Self {
        Self { navigator, policy }
    }
}

impl SessionListener for Redirector {
    fn on_change(&self, state: &AuthState) {
        let target = match self.policy.target(state) {
            Some(target) => target,
            None => return,
        };
        let current = self.navigator.current_route();
        if current == target {
            debug!(route = target, "already on target route");
            return;
        }
        debug!(from = %current, to = target, "redirecting");
        self.navigator.navigate(target);
    }
}
