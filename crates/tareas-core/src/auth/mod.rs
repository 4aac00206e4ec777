//! Identity provider boundary.
//!
//! This module defines the [`AuthProvider`] trait that the session
//! controller and the auth gate talk to, the [`AuthChange`] values pushed to
//! subscribers, and the [`SessionStore`] that implementations use to own the
//! current session.
//!
//! ```text
//! SupabaseAuth ──publish──> SessionStore ──watch──> on_session_change(cb)
//!      ^                                                  |
//!      | sign_in / sign_up / sign_out / refresh           v
//!   AuthGate                                     SessionController
//! ```

pub mod store;
pub mod supabase;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::models::Session;

pub use store::SessionStore;
pub use supabase::SupabaseAuth;

/// Why the session changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// Value held before anything happened.
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// One entry of the session-change stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

/// Result of a successful sign-up request.
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    /// The account exists but must be confirmed by email before signing in.
    ConfirmationRequired,
    /// The provider confirmed the account immediately and opened a session.
    SignedIn(Session),
}

/// Errors reported by an [`AuthProvider`].
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The provider rejected the request; `message` is its own text.
    #[error("{message}")]
    Provider { message: String, status: Option<u16> },

    #[error("could not reach the identity provider: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response from the identity provider: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no active session")]
    NoSession,
}

impl AuthError {
    /// HTTP status the provider answered with, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => *status,
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) | Self::NoSession => None,
        }
    }
}

/// Hosted identity/session provider.
///
/// Implementations own the session: callers only ever see copies, and every
/// change is pushed through [`AuthProvider::subscribe`].
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve the current session once.
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// Receiver for the session-change stream.
    ///
    /// Prefer [`crate::session::on_session_change`], which forwards changes to
    /// a callback and unsubscribes on drop.
    fn subscribe(&self) -> watch::Receiver<AuthChange>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
    -> Result<Session, AuthError>;

    /// End the session. The local copy is discarded even if the provider
    /// cannot be reached.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Exchange the refresh token for a new session.
    async fn refresh_session(&self) -> Result<Session, AuthError>;
}

// Compile-time assertion: AuthProvider must be usable as `dyn AuthProvider`.
const _: () = {
    fn _assert_object_safe(_: &dyn AuthProvider) {}
};
