//! Auth gate: the sign-in / sign-up form state.

use std::fmt;

use crate::auth::{AuthError, AuthProvider, SignUpOutcome};
use crate::models::Session;

pub const SIGN_UP_MESSAGE: &str =
    "Revisa tu correo para confirmar tu cuenta (según configuración de Supabase).";
pub const SIGN_IN_MESSAGE: &str = "Sesión iniciada correctamente.";

/// Which button was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    SignIn,
    SignUp,
}

/// Credentials captured when a request starts.
#[derive(Clone)]
pub struct Credentials {
    pub action: AuthAction,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("action", &self.action)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Completed provider call, ready to be applied to the gate.
#[derive(Debug)]
pub enum GateOutcome {
    SignedUp(Result<SignUpOutcome, AuthError>),
    SignedIn(Result<Session, AuthError>),
}

/// Issue the provider request described by `credentials`.
pub async fn perform(provider: &dyn AuthProvider, credentials: Credentials) -> GateOutcome {
    let Credentials {
        action,
        email,
        password,
    } = credentials;
    match action {
        AuthAction::SignUp => GateOutcome::SignedUp(provider.sign_up(&email, &password).await),
        AuthAction::SignIn => {
            GateOutcome::SignedIn(provider.sign_in_with_password(&email, &password).await)
        }
    }
}

/// Form state for the sign-in screen.
///
/// One loading flag covers both actions, so at most one request is ever in
/// flight.
#[derive(Debug, Default)]
pub struct AuthGate {
    pub email: String,
    pub password: String,
    loading: bool,
    message: Option<String>,
    error: Option<String>,
}

impl AuthGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Drop the last success or error message.
    pub fn clear_feedback(&mut self) {
        self.message = None;
        self.error = None;
    }

    /// Start a request. Returns `None` while another one is in flight.
    pub fn begin(&mut self, action: AuthAction) -> Option<Credentials> {
        if self.loading {
            return None;
        }
        self.loading = true;
        self.message = None;
        self.error = None;
        Some(Credentials {
            action,
            email: self.email.clone(),
            password: self.password.clone(),
        })
    }

    /// Record the result of the in-flight request. The form fields are left
    /// as typed.
    pub fn finish(&mut self, outcome: GateOutcome) {
        self.loading = false;
        let (result, success) = match outcome {
            GateOutcome::SignedUp(r) => (r.map(|_| ()), SIGN_UP_MESSAGE),
            GateOutcome::SignedIn(r) => (r.map(|_| ()), SIGN_IN_MESSAGE),
        };
        match result {
            Ok(()) => self.message = Some(success.to_owned()),
            Err(e) => {
                tracing::warn!(error = %e, "authentication request failed");
                self.error = Some(e.to_string());
            }
        }
    }

    /// Run `action` to completion against `provider`.
    ///
    /// Returns `false` if the submission was ignored because a request is
    /// already in flight.
    pub async fn submit(&mut self, provider: &dyn AuthProvider, action: AuthAction) -> bool {
        let Some(credentials) = self.begin(action) else {
            return false;
        };
        let outcome = perform(provider, credentials).await;
        self.finish(outcome);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

    fn session() -> Session {
        Session {
            access_token: "t".into(),
            refresh_token: None,
            token_type: "bearer".into(),
            expires_in: None,
            expires_at: None,
            user: User {
                id: "u".into(),
                email: None,
                extra: Default::default(),
            },
        }
    }

    #[test]
    fn begin_captures_form_and_sets_loading() {
        let mut gate = AuthGate::new();
        gate.email = "alumno@duoc.cl".into();
        gate.password = "hunter22".into();

        let creds = gate.begin(AuthAction::SignIn).unwrap();
        assert_eq!(creds.email, "alumno@duoc.cl");
        assert_eq!(creds.password, "hunter22");
        assert!(gate.is_loading());
        assert!(!format!("{creds:?}").contains("hunter22"));
    }

    #[test]
    fn second_submission_is_ignored_while_loading() {
        let mut gate = AuthGate::new();
        assert!(gate.begin(AuthAction::SignIn).is_some());
        assert!(gate.begin(AuthAction::SignUp).is_none());
        assert!(gate.begin(AuthAction::SignIn).is_none());
    }

    #[test]
    fn sign_in_success_sets_message_only() {
        let mut gate = AuthGate::new();
        gate.begin(AuthAction::SignIn);
        gate.finish(GateOutcome::SignedIn(Ok(session())));
        assert!(!gate.is_loading());
        assert_eq!(gate.message(), Some(SIGN_IN_MESSAGE));
        assert_eq!(gate.error(), None);
    }

    #[test]
    fn sign_up_success_asks_for_confirmation() {
        let mut gate = AuthGate::new();
        gate.begin(AuthAction::SignUp);
        gate.finish(GateOutcome::SignedUp(Ok(SignUpOutcome::ConfirmationRequired)));
        assert_eq!(gate.message(), Some(SIGN_UP_MESSAGE));
    }

    #[test]
    fn provider_error_text_is_shown_verbatim() {
        let mut gate = AuthGate::new();
        gate.email = "x@y.z".into();
        gate.password = "wrong".into();
        gate.begin(AuthAction::SignIn);
        gate.finish(GateOutcome::SignedIn(Err(AuthError::Provider {
            message: "Invalid login credentials".into(),
            status: Some(400),
        })));
        assert_eq!(gate.error(), Some("Invalid login credentials"));
        assert_eq!(gate.message(), None);
        // Form stays populated for resubmission.
        assert_eq!(gate.email, "x@y.z");
        assert_eq!(gate.password, "wrong");
    }

    #[test]
    fn new_attempt_clears_previous_feedback() {
        let mut gate = AuthGate::new();
        gate.begin(AuthAction::SignIn);
        gate.finish(GateOutcome::SignedIn(Err(AuthError::NoSession)));
        assert!(gate.error().is_some());

        gate.begin(AuthAction::SignUp);
        assert_eq!(gate.error(), None);
        assert_eq!(gate.message(), None);
    }

    #[test]
    fn clear_feedback_keeps_the_form() {
        let mut gate = AuthGate::new();
        gate.email = "x@y.z".into();
        gate.begin(AuthAction::SignIn);
        gate.finish(GateOutcome::SignedIn(Ok(session())));
        assert_eq!(gate.message(), Some(SIGN_IN_MESSAGE));

        gate.clear_feedback();
        assert_eq!(gate.message(), None);
        assert_eq!(gate.error(), None);
        assert_eq!(gate.email, "x@y.z");
    }
}
