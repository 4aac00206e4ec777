//! [`AuthProvider`] backed by the Supabase GoTrue REST API.
//!
//! Every request carries the project's anon key in the `apikey` header.
//! Sessions are kept in memory only.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::{AuthChange, AuthError, AuthEvent, AuthProvider, SessionStore, SignUpOutcome};
use crate::config::AuthConfig;
use crate::models::Session;

/// Refresh this many seconds before the access token expires.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Pause before retrying a refresh that failed for a transient reason.
const REFRESH_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Fields GoTrue uses for its error text, in the order they are tried.
const ERROR_FIELDS: [&str; 4] = ["msg", "message", "error_description", "error"];

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

/// Supabase auth client.
pub struct SupabaseAuth {
    http: Client,
    config: AuthConfig,
    store: SessionStore,
}

impl SupabaseAuth {
    pub fn new(config: AuthConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(http: Client, config: AuthConfig) -> Self {
        Self {
            http,
            config,
            store: SessionStore::new(),
        }
    }

    /// `{project}/auth/v1/{name}`
    fn endpoint(&self, name: &str) -> Url {
        let mut url = self.config.url.clone();
        // AuthConfig only accepts http(s) URLs, which always have path segments.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["auth", "v1", name]);
        }
        url
    }

    fn post(&self, name: &str) -> RequestBuilder {
        self.http
            .post(self.endpoint(name))
            .header("apikey", &self.config.anon_key)
    }

    async fn token_grant<B: Serialize>(&self, grant: &str, body: &B) -> Result<Session, AuthError> {
        let response = self
            .post("token")
            .query(&[("grant_type", grant)])
            .json(body)
            .send()
            .await?;
        let value = read_json(response).await?;
        let session: Session = serde_json::from_value(value)?;
        Ok(session.with_expiry_from(Utc::now()))
    }

    /// Refresh the session in the background shortly before it expires.
    ///
    /// The task follows the session-change stream, so a new sign-in resets
    /// its timer and a sign-out parks it. A session without a refresh token is
    /// never scheduled. A refresh token the provider rejects ends the session.
    /// Stops when `cancel` fires.
    pub fn spawn_auto_refresh(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut changes = self.store.subscribe();
            loop {
                let wait = refresh_delay(self.store.current().as_ref(), Utc::now());

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = sleep_or_park(wait) => {
                        match self.refresh_session().await {
                            Ok(_) => {}
                            // Session went away meanwhile; the next pass parks.
                            Err(AuthError::NoSession) => {}
                            Err(AuthError::Provider { message, status }) => {
                                warn!(?status, %message, "refresh token rejected, signing out");
                                self.store.publish(AuthEvent::SignedOut, None);
                            }
                            Err(e) => {
                                warn!(error = %e, "session refresh failed, will retry");
                                tokio::select! {
                                    _ = cancel.cancelled() => break,
                                    _ = tokio::time::sleep(REFRESH_RETRY_DELAY) => {}
                                }
                            }
                        }
                    }
                }
            }
            debug!("auto-refresh stopped");
        })
    }
}

/// Time until `session` should be refreshed, or `None` when there is nothing
/// to refresh.
fn refresh_delay(session: Option<&Session>, now: DateTime<Utc>) -> Option<Duration> {
    let session = session?;
    session.refresh_token.as_ref()?;
    let secs = session.expires_at? - REFRESH_MARGIN_SECS - now.timestamp();
    Some(Duration::from_secs(secs.max(0) as u64))
}

async fn sleep_or_park(wait: Option<Duration>) {
    match wait {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

/// Turn a non-success response into [`AuthError::Provider`], otherwise parse
/// the body as JSON.
async fn read_json(response: Response) -> Result<Value, AuthError> {
    let status = response.status();
    if !status.is_success() {
        return Err(provider_error(status, &response.text().await.unwrap_or_default()));
    }
    Ok(response.json().await?)
}

fn provider_error(status: StatusCode, body: &str) -> AuthError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ERROR_FIELDS
                .iter()
                .find_map(|field| v.get(*field).and_then(Value::as_str).map(str::to_owned))
        })
        .unwrap_or_else(|| status.to_string());
    AuthError::Provider {
        message,
        status: Some(status.as_u16()),
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.store.current() else {
            return Ok(None);
        };
        if !session.expires_within(Utc::now(), 0) || session.refresh_token.is_none() {
            return Ok(Some(session));
        }

        debug!("stored session expired, refreshing");
        match self.refresh_session().await {
            Ok(fresh) => Ok(Some(fresh)),
            Err(e) => {
                warn!(error = %e, "could not refresh expired session");
                self.store.publish(AuthEvent::SignedOut, None);
                Ok(None)
            }
        }
    }

    fn subscribe(&self) -> watch::Receiver<AuthChange> {
        self.store.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let response = self
            .post("signup")
            .json(&PasswordCredentials { email, password })
            .send()
            .await?;
        let value = read_json(response).await?;

        // With email confirmation enabled GoTrue answers with the bare user.
        if value.get("access_token").is_none() {
            debug!(email, "sign-up pending email confirmation");
            return Ok(SignUpOutcome::ConfirmationRequired);
        }

        let session: Session = serde_json::from_value(value)?;
        let session = session.with_expiry_from(Utc::now());
        self.store.publish(AuthEvent::SignedIn, Some(session.clone()));
        Ok(SignUpOutcome::SignedIn(session))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let session = self
            .token_grant("password", &PasswordCredentials { email, password })
            .await?;
        self.store.publish(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let Some(session) = self.store.current() else {
            return Ok(());
        };

        let result = self
            .post("logout")
            .bearer_auth(&session.access_token)
            .send()
            .await;

        // The local session goes away no matter what the server said.
        self.store.publish(AuthEvent::SignedOut, None);

        let response = result?;
        let status = response.status();
        let already_gone = matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        );
        if status.is_success() || already_gone {
            return Ok(());
        }
        Err(provider_error(status, &response.text().await.unwrap_or_default()))
    }

    async fn refresh_session(&self) -> Result<Session, AuthError> {
        let refresh_token = self
            .store
            .current()
            .and_then(|s| s.refresh_token)
            .ok_or(AuthError::NoSession)?;

        let session = self
            .token_grant(
                "refresh_token",
                &RefreshGrant {
                    refresh_token: &refresh_token,
                },
            )
            .await?;
        self.store
            .publish(AuthEvent::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }
}
