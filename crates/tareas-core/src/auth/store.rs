//! In-memory owner of the current session.

use tokio::sync::watch;

use super::{AuthChange, AuthEvent};
use crate::models::Session;

/// Holds the current session and broadcasts every replacement.
///
/// Built on a `watch` channel: late subscribers see only the latest value,
/// which is all a session consumer needs.
#[derive(Debug)]
pub struct SessionStore {
    tx: watch::Sender<AuthChange>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthChange {
            event: AuthEvent::InitialSession,
            session: None,
        });
        Self { tx }
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().session.clone()
    }

    /// Replace the session and notify subscribers.
    pub fn publish(&self, event: AuthEvent, session: Option<Session>) {
        tracing::info!(
            ?event,
            user = session.as_ref().and_then(|s| s.email()).unwrap_or("-"),
            "session changed"
        );
        self.tx.send_replace(AuthChange { event, session });
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthChange> {
        self.tx.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

    fn session(token: &str) -> Session {
        Session {
            access_token: token.into(),
            refresh_token: None,
            token_type: "bearer".into(),
            expires_in: None,
            expires_at: None,
            user: User {
                id: "u1".into(),
                email: Some("a@b.c".into()),
                extra: Default::default(),
            },
        }
    }

    #[test]
    fn starts_empty() {
        let store = SessionStore::new();
        assert!(store.current().is_none());
        assert_eq!(store.subscribe().borrow().event, AuthEvent::InitialSession);
    }

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();

        store.publish(AuthEvent::SignedIn, Some(session("t1")));
        rx.changed().await.unwrap();
        let change = rx.borrow_and_update().clone();
        assert_eq!(change.event, AuthEvent::SignedIn);
        assert_eq!(change.session.unwrap().access_token, "t1");
        assert_eq!(store.current().unwrap().access_token, "t1");
    }

    #[test]
    fn publish_without_subscribers_still_updates() {
        let store = SessionStore::new();
        store.publish(AuthEvent::SignedIn, Some(session("t1")));
        store.publish(AuthEvent::SignedOut, None);
        assert!(store.current().is_none());
    }
}
