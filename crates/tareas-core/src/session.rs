//! Session controller: decides which screen is shown from the provider's
//! session, and keeps that decision live through a subscription.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthChange, AuthProvider};
use crate::models::Session;

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Live registration on the session-change stream.
///
/// Dropping it (or calling [`SessionSubscription::unsubscribe`]) stops the
/// forwarding task; the callback is never invoked afterwards.
pub struct SessionSubscription {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SessionSubscription {
    pub fn unsubscribe(self) {}

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for SessionSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Invoke `callback` for every session change published after this call.
///
/// Must be called from within a tokio runtime.
pub fn on_session_change<F>(provider: &dyn AuthProvider, mut callback: F) -> SessionSubscription
where
    F: FnMut(AuthChange) + Send + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let mut changes = WatchStream::from_changes(provider.subscribe());

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                next = changes.next() => match next {
                    Some(change) => callback(change),
                    None => break,
                },
            }
        }
    });

    SessionSubscription {
        cancel,
        handle: Some(handle),
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// What the controller currently knows about the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Initial resolution has not finished.
    Loading,
    SignedOut,
    SignedIn(Session),
}

/// Which top-level view to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Loading,
    AuthGate,
    Workspace,
}

/// Effect of applying a session value, used by the host to (re)start the
/// task workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    Unchanged,
    /// A session appeared, or a different user took over.
    SignedIn,
    /// Same user, different access token.
    TokenChanged,
    SignedOut,
}

/// Owns the cached session and the subscription that keeps it current.
pub struct SessionController {
    provider: Arc<dyn AuthProvider>,
    state: SessionState,
    subscription: Option<SessionSubscription>,
}

impl SessionController {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self {
            provider,
            state: SessionState::Loading,
            subscription: None,
        }
    }

    pub fn provider(&self) -> &Arc<dyn AuthProvider> {
        &self.provider
    }

    /// Subscribe to session changes, then resolve the current session once.
    ///
    /// Changes are handed to `on_change`; the host feeds them back through
    /// [`SessionController::apply`]. Subscribing first means nothing that
    /// happens during the initial resolution is missed. A failed resolution
    /// counts as "no session".
    pub async fn mount<F>(&mut self, on_change: F) -> SessionTransition
    where
        F: FnMut(AuthChange) + Send + 'static,
    {
        self.subscription = Some(on_session_change(self.provider.as_ref(), on_change));

        let initial = match self.provider.get_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "initial session resolution failed, treating as signed out");
                None
            }
        };
        self.resolve(initial)
    }

    /// Release the subscription. The cached state is left as it was.
    pub fn unmount(&mut self) {
        self.subscription.take();
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    /// Apply a change delivered by the subscription.
    pub fn apply(&mut self, change: AuthChange) -> SessionTransition {
        tracing::debug!(event = ?change.event, "applying session change");
        self.resolve(change.session)
    }

    fn resolve(&mut self, session: Option<Session>) -> SessionTransition {
        let transition = match (&self.state, &session) {
            (SessionState::SignedIn(old), Some(new)) if old.access_token == new.access_token => {
                SessionTransition::Unchanged
            }
            (SessionState::SignedIn(old), Some(new)) if old.user.id == new.user.id => {
                SessionTransition::TokenChanged
            }
            (_, Some(_)) => SessionTransition::SignedIn,
            (SessionState::SignedOut, None) => SessionTransition::Unchanged,
            (_, None) => SessionTransition::SignedOut,
        };

        self.state = match session {
            Some(s) => SessionState::SignedIn(s),
            None => SessionState::SignedOut,
        };
        transition
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn screen(&self) -> Screen {
        match self.state {
            SessionState::Loading => Screen::Loading,
            SessionState::SignedOut => Screen::AuthGate,
            SessionState::SignedIn(_) => Screen::Workspace,
        }
    }

    pub fn has_session(&self) -> bool {
        matches!(self.state, SessionState::SignedIn(_))
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            SessionState::SignedIn(s) => Some(s),
            _ => None,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.session().map(|s| s.access_token.as_str())
    }
}
