//! Shared test utilities for tareas integration tests.
//!
//! [`FakeBackend`] is an in-process axum server on an ephemeral port that
//! plays both remote collaborators at once:
//!
//! - the task API (`/api/tasks/`, `/api/tasks/{id}`), scoped per user by the
//!   bearer token
//! - the GoTrue endpoints used by the client (`/auth/v1/signup`,
//!   `/auth/v1/token`, `/auth/v1/logout`), gated on the `apikey` header
//!
//! Every request is appended to a log, and any route can be told to fail its
//! next call with a given status.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Anon key the fake accepts unless told otherwise.
pub const ANON_KEY: &str = "test-anon-key";

/// Token lifetime handed out by the fake, in seconds.
pub const DEFAULT_EXPIRES_IN: i64 = 3600;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Routes that can be targeted by failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    ListTasks,
    CreateTask,
    UpdateTask,
    DeleteTask,
    SignUp,
    Token,
    Logout,
}

/// One request as seen by the fake.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    /// Path plus query string.
    pub uri: String,
    pub authorization: Option<String>,
    pub apikey: Option<String>,
    /// Parsed JSON body, `None` for an empty or non-JSON body.
    pub body: Option<Value>,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.uri.split('?').next().unwrap_or(&self.uri)
    }
}

/// A task as stored by the fake.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredTask {
    pub id: i64,
    pub titulo: String,
    pub descripcion: Option<String>,
    pub completada: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub owner: String,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Account {
    id: String,
    email: String,
    password: String,
    confirmed: bool,
}

#[derive(Debug)]
struct Inner {
    anon_key: String,
    auto_confirm: bool,
    expires_in: i64,
    accounts: Vec<Account>,
    /// access token -> user id
    access_tokens: HashMap<String, String>,
    /// refresh token -> user id
    refresh_tokens: HashMap<String, String>,
    tasks: Vec<StoredTask>,
    next_task_id: i64,
    failures: HashMap<Route, VecDeque<StatusCode>>,
    requests: Vec<RecordedRequest>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            anon_key: ANON_KEY.to_owned(),
            auto_confirm: false,
            expires_in: DEFAULT_EXPIRES_IN,
            accounts: Vec::new(),
            access_tokens: HashMap::new(),
            refresh_tokens: HashMap::new(),
            tasks: Vec::new(),
            next_task_id: 1,
            failures: HashMap::new(),
            requests: Vec::new(),
        }
    }
}

impl Inner {
    fn account_by_id(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    fn user_json(account: &Account) -> Value {
        json!({
            "id": account.id,
            "aud": "authenticated",
            "role": "authenticated",
            "email": account.email,
        })
    }

    fn issue_session(&mut self, user_id: &str) -> Value {
        let access = format!("access-{}", Uuid::new_v4());
        let refresh = format!("refresh-{}", Uuid::new_v4());
        self.access_tokens.insert(access.clone(), user_id.to_owned());
        self.refresh_tokens.insert(refresh.clone(), user_id.to_owned());
        let user = self
            .account_by_id(user_id)
            .map(Self::user_json)
            .unwrap_or(Value::Null);
        json!({
            "access_token": access,
            "refresh_token": refresh,
            "token_type": "bearer",
            "expires_in": self.expires_in,
            "expires_at": Utc::now().timestamp() + self.expires_in,
            "user": user,
        })
    }

    fn take_failure(&mut self, route: Route) -> Option<StatusCode> {
        self.failures.get_mut(&route).and_then(VecDeque::pop_front)
    }
}

type Shared = Arc<Mutex<Inner>>;

fn lock(state: &Shared) -> MutexGuard<'_, Inner> {
    // Poisoning is ignored.
    state.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error response in the shape GoTrue uses.
struct FakeError {
    status: StatusCode,
    body: Value,
}

impl FakeError {
    fn msg(status: StatusCode, msg: &str) -> Self {
        Self {
            status,
            body: json!({ "code": status.as_u16(), "msg": msg }),
        }
    }

    fn injected(status: StatusCode) -> Self {
        Self::msg(status, "injected failure")
    }
}

impl IntoResponse for FakeError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type FakeResult<T> = Result<T, FakeError>;

// ---------------------------------------------------------------------------
// Request plumbing
// ---------------------------------------------------------------------------

fn record(state: &Shared, method: &Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    let request = RecordedRequest {
        method: method.clone(),
        uri: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| uri.path().to_owned()),
        authorization: text(header::AUTHORIZATION.as_str()),
        apikey: text("apikey"),
        body: serde_json::from_slice(body).ok(),
    };
    tracing::debug!(method = %request.method, uri = %request.uri, "fake backend request");
    lock(state).requests.push(request);
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve the bearer token to a user id.
fn authenticate(inner: &Inner, headers: &HeaderMap) -> FakeResult<String> {
    bearer(headers)
        .and_then(|token| inner.access_tokens.get(token).cloned())
        .ok_or_else(|| FakeError::msg(StatusCode::UNAUTHORIZED, "invalid JWT"))
}

fn check_apikey(inner: &Inner, headers: &HeaderMap) -> FakeResult<()> {
    let key = headers.get("apikey").and_then(|v| v.to_str().ok());
    if key == Some(inner.anon_key.as_str()) {
        return Ok(());
    }
    Err(FakeError {
        status: StatusCode::UNAUTHORIZED,
        body: json!({ "message": "Invalid API key" }),
    })
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &Bytes) -> FakeResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| FakeError::msg(StatusCode::BAD_REQUEST, &format!("invalid body: {e}")))
}

// ---------------------------------------------------------------------------
// Task API handlers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreateBody {
    titulo: String,
    #[serde(default)]
    descripcion: Option<String>,
    #[serde(default)]
    completada: bool,
}

#[derive(Deserialize)]
struct PatchBody {
    titulo: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    descripcion: Option<Option<String>>,
    completada: Option<bool>,
}

/// Tell an explicit `null` apart from an absent field.
fn double_option<'de, D>(d: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(d).map(Some)
}

async fn list_tasks(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> FakeResult<Json<Vec<StoredTask>>> {
    record(&state, &method, &uri, &headers, &body);
    let mut inner = lock(&state);
    let user = authenticate(&inner, &headers)?;
    if let Some(status) = inner.take_failure(Route::ListTasks) {
        return Err(FakeError::injected(status));
    }
    let tasks = inner
        .tasks
        .iter()
        .filter(|t| t.owner == user)
        .cloned()
        .collect();
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> FakeResult<(StatusCode, Json<StoredTask>)> {
    record(&state, &method, &uri, &headers, &body);
    let mut inner = lock(&state);
    let user = authenticate(&inner, &headers)?;
    if let Some(status) = inner.take_failure(Route::CreateTask) {
        return Err(FakeError::injected(status));
    }
    let input: CreateBody = parse_body(&body)?;
    if input.titulo.trim().is_empty() {
        return Err(FakeError::msg(
            StatusCode::UNPROCESSABLE_ENTITY,
            "titulo is required",
        ));
    }

    let now = Utc::now();
    let task = StoredTask {
        id: inner.next_task_id,
        titulo: input.titulo,
        descripcion: input.descripcion,
        completada: input.completada,
        created_at: now,
        updated_at: now,
        owner: user,
    };
    inner.next_task_id += 1;
    inner.tasks.push(task.clone());
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<Shared>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> FakeResult<Json<StoredTask>> {
    record(&state, &method, &uri, &headers, &body);
    let mut inner = lock(&state);
    let user = authenticate(&inner, &headers)?;
    if let Some(status) = inner.take_failure(Route::UpdateTask) {
        return Err(FakeError::injected(status));
    }
    let patch: PatchBody = parse_body(&body)?;
    let task = find_task(&mut inner, &user, &id)?;
    if let Some(titulo) = patch.titulo {
        task.titulo = titulo;
    }
    if let Some(descripcion) = patch.descripcion {
        task.descripcion = descripcion;
    }
    if let Some(completada) = patch.completada {
        task.completada = completada;
    }
    task.updated_at = Utc::now();
    Ok(Json(task.clone()))
}

async fn delete_task(
    State(state): State<Shared>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> FakeResult<StatusCode> {
    record(&state, &method, &uri, &headers, &body);
    let mut inner = lock(&state);
    let user = authenticate(&inner, &headers)?;
    if let Some(status) = inner.take_failure(Route::DeleteTask) {
        return Err(FakeError::injected(status));
    }
    let id = find_task(&mut inner, &user, &id)?.id;
    inner.tasks.retain(|t| t.id != id);
    Ok(StatusCode::NO_CONTENT)
}

fn find_task<'a>(inner: &'a mut Inner, user: &str, id: &str) -> FakeResult<&'a mut StoredTask> {
    let not_found = || FakeError::msg(StatusCode::NOT_FOUND, "task not found");
    let id: i64 = id.parse().map_err(|_| not_found())?;
    inner
        .tasks
        .iter_mut()
        .find(|t| t.id == id && t.owner == user)
        .ok_or_else(not_found)
}

// ---------------------------------------------------------------------------
// GoTrue handlers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PasswordBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh_token: String,
}

#[derive(Deserialize)]
struct TokenQuery {
    grant_type: String,
}

async fn sign_up(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> FakeResult<Json<Value>> {
    record(&state, &method, &uri, &headers, &body);
    let mut inner = lock(&state);
    check_apikey(&inner, &headers)?;
    if let Some(status) = inner.take_failure(Route::SignUp) {
        return Err(FakeError::injected(status));
    }
    let input: PasswordBody = parse_body(&body)?;
    if input.password.len() < 6 {
        return Err(FakeError::msg(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Password should be at least 6 characters.",
        ));
    }
    if inner.accounts.iter().any(|a| a.email == input.email) {
        return Err(FakeError::msg(
            StatusCode::UNPROCESSABLE_ENTITY,
            "User already registered",
        ));
    }

    let account = Account {
        id: Uuid::new_v4().to_string(),
        email: input.email,
        password: input.password,
        confirmed: inner.auto_confirm,
    };
    inner.accounts.push(account.clone());

    if account.confirmed {
        Ok(Json(inner.issue_session(&account.id)))
    } else {
        let mut user = Inner::user_json(&account);
        user["confirmation_sent_at"] = json!(Utc::now());
        Ok(Json(user))
    }
}

async fn token(
    State(state): State<Shared>,
    Query(query): Query<TokenQuery>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> FakeResult<Json<Value>> {
    record(&state, &method, &uri, &headers, &body);
    let mut inner = lock(&state);
    check_apikey(&inner, &headers)?;
    if let Some(status) = inner.take_failure(Route::Token) {
        return Err(FakeError::injected(status));
    }

    match query.grant_type.as_str() {
        "password" => {
            let input: PasswordBody = parse_body(&body)?;
            let account = inner
                .accounts
                .iter()
                .find(|a| a.email == input.email && a.password == input.password)
                .cloned()
                .ok_or_else(|| {
                    FakeError::msg(StatusCode::BAD_REQUEST, "Invalid login credentials")
                })?;
            if !account.confirmed {
                return Err(FakeError {
                    status: StatusCode::BAD_REQUEST,
                    body: json!({
                        "error": "invalid_grant",
                        "error_description": "Email not confirmed",
                    }),
                });
            }
            Ok(Json(inner.issue_session(&account.id)))
        }
        "refresh_token" => {
            let input: RefreshBody = parse_body(&body)?;
            // Refresh tokens are single use.
            let user = inner
                .refresh_tokens
                .remove(&input.refresh_token)
                .ok_or_else(|| {
                    FakeError::msg(
                        StatusCode::BAD_REQUEST,
                        "Invalid Refresh Token: Refresh Token Not Found",
                    )
                })?;
            Ok(Json(inner.issue_session(&user)))
        }
        other => Err(FakeError::msg(
            StatusCode::BAD_REQUEST,
            &format!("unsupported_grant_type: {other}"),
        )),
    }
}

async fn logout(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> FakeResult<StatusCode> {
    record(&state, &method, &uri, &headers, &body);
    let mut inner = lock(&state);
    check_apikey(&inner, &headers)?;
    if let Some(status) = inner.take_failure(Route::Logout) {
        return Err(FakeError::injected(status));
    }
    let user = authenticate(&inner, &headers)?;
    inner.access_tokens.retain(|_, u| *u != user);
    inner.refresh_tokens.retain(|_, u| *u != user);
    Ok(StatusCode::NO_CONTENT)
}

fn build_router(state: Shared) -> Router {
    Router::new()
        .route("/api/tasks/", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", put(update_task).delete(delete_task))
        .route("/auth/v1/signup", post(sign_up))
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/logout", post(logout))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// FakeBackend
// ---------------------------------------------------------------------------

/// Running fake server. Shuts down when dropped.
pub struct FakeBackend {
    addr: SocketAddr,
    state: Shared,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl FakeBackend {
    /// Bind `127.0.0.1:0` and start serving.
    pub async fn start() -> Self {
        let state: Shared = Arc::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind fake backend");
        let addr = listener.local_addr().expect("fake backend has no address");
        let shutdown = CancellationToken::new();

        let app = build_router(Arc::clone(&state));
        let signal = shutdown.clone().cancelled_owned();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(signal)
                .await
            {
                tracing::warn!(error = %e, "fake backend stopped with error");
            }
        });

        Self {
            addr,
            state,
            shutdown,
            handle: Some(handle),
        }
    }

    /// `http://127.0.0.1:<port>`, usable as both the task API and the auth
    /// project URL.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn anon_key(&self) -> String {
        lock(&self.state).anon_key.clone()
    }

    /// Sign-ups open a session straight away instead of waiting for email
    /// confirmation.
    pub fn set_auto_confirm(&self, on: bool) {
        lock(&self.state).auto_confirm = on;
    }

    pub fn set_expires_in(&self, secs: i64) {
        lock(&self.state).expires_in = secs;
    }

    /// Register a confirmed account.
    pub fn add_user(&self, email: &str, password: &str) {
        lock(&self.state).accounts.push(Account {
            id: Uuid::new_v4().to_string(),
            email: email.to_owned(),
            password: password.to_owned(),
            confirmed: true,
        });
    }

    /// Mark a pending sign-up as confirmed.
    pub fn confirm_user(&self, email: &str) {
        let mut inner = lock(&self.state);
        if let Some(account) = inner.accounts.iter_mut().find(|a| a.email == email) {
            account.confirmed = true;
        }
    }

    /// Issue an access token for `email`, registering the account if needed.
    pub fn access_token_for(&self, email: &str) -> String {
        let mut inner = lock(&self.state);
        let id = match inner.accounts.iter().find(|a| a.email == email) {
            Some(a) => a.id.clone(),
            None => {
                let account = Account {
                    id: Uuid::new_v4().to_string(),
                    email: email.to_owned(),
                    password: String::new(),
                    confirmed: true,
                };
                let id = account.id.clone();
                inner.accounts.push(account);
                id
            }
        };
        let session = inner.issue_session(&id);
        session["access_token"]
            .as_str()
            .unwrap_or_default()
            .to_owned()
    }

    /// Invalidate every token issued so far, as if the server restarted.
    pub fn revoke_all_tokens(&self) {
        let mut inner = lock(&self.state);
        inner.access_tokens.clear();
        inner.refresh_tokens.clear();
    }

    /// Store a task owned by `email`'s account and return its id.
    pub fn seed_task(&self, email: &str, titulo: &str, completada: bool) -> i64 {
        let mut inner = lock(&self.state);
        let owner = inner
            .accounts
            .iter()
            .find(|a| a.email == email)
            .map(|a| a.id.clone())
            .expect("seed_task: unknown user, call add_user first");
        let now = Utc::now();
        let id = inner.next_task_id;
        inner.next_task_id += 1;
        inner.tasks.push(StoredTask {
            id,
            titulo: titulo.to_owned(),
            descripcion: None,
            completada,
            created_at: now,
            updated_at: now,
            owner,
        });
        id
    }

    /// Tasks currently stored, across all users.
    pub fn tasks(&self) -> Vec<StoredTask> {
        lock(&self.state).tasks.clone()
    }

    /// Make the next call to `route` answer `status`. Calls queue up.
    pub fn fail_next(&self, route: Route, status: u16) {
        let status = StatusCode::from_u16(status).expect("invalid status code");
        lock(&self.state)
            .failures
            .entry(route)
            .or_default()
            .push_back(status);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).requests.clone()
    }

    /// Requests whose path equals `path`.
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path() == path)
            .collect()
    }

    pub fn clear_requests(&self) {
        lock(&self.state).requests.clear();
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn router() -> (Router, Shared) {
        let state: Shared = Arc::default();
        (build_router(Arc::clone(&state)), state)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("apikey", ANON_KEY);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn tasks_require_a_bearer_token() {
        let (app, _) = router();
        let resp = app
            .oneshot(json_request("GET", "/api/tasks/", None, Value::Null))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn created_tasks_are_listed_for_their_owner_only() {
        let (app, state) = router();
        let (alice, bob) = {
            let mut inner = lock(&state);
            for (id, email) in [("a", "alice@x"), ("b", "bob@x")] {
                inner.accounts.push(Account {
                    id: id.into(),
                    email: email.into(),
                    password: String::new(),
                    confirmed: true,
                });
            }
            let alice = inner.issue_session("a")["access_token"]
                .as_str()
                .unwrap()
                .to_owned();
            let bob = inner.issue_session("b")["access_token"]
                .as_str()
                .unwrap()
                .to_owned();
            (alice, bob)
        };

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/tasks/",
                Some(&alice),
                json!({"titulo": "Buy milk", "descripcion": null, "completada": false}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(body_json(resp).await["id"], 1);

        let resp = app
            .oneshot(json_request("GET", "/api/tasks/", Some(&bob), Value::Null))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await, json!([]));
    }

    #[tokio::test]
    async fn signup_without_auto_confirm_returns_bare_user() {
        let (app, _) = router();
        let resp = app
            .oneshot(json_request(
                "POST",
                "/auth/v1/signup",
                None,
                json!({"email": "new@x", "password": "secret123"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert!(json.get("access_token").is_none());
        assert_eq!(json["email"], "new@x");
    }

    #[tokio::test]
    async fn wrong_apikey_is_rejected() {
        let (app, _) = router();
        let request = Request::builder()
            .method("POST")
            .uri("/auth/v1/token?grant_type=password")
            .header("apikey", "nope")
            .body(Body::from(r#"{"email":"a","password":"b"}"#))
            .unwrap();
        let resp = app.oneshot(request).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["message"], "Invalid API key");
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let (app, state) = router();
        lock(&state)
            .failures
            .entry(Route::Token)
            .or_default()
            .push_back(StatusCode::SERVICE_UNAVAILABLE);

        let body = json!({"email": "a", "password": "b"});
        let first = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/auth/v1/token?grant_type=password",
                None,
                body.clone(),
            ))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::SERVICE_UNAVAILABLE);

        let second = app
            .oneshot(json_request(
                "POST",
                "/auth/v1/token?grant_type=password",
                None,
                body,
            ))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(second).await["msg"], "Invalid login credentials");
        assert_eq!(lock(&state).requests.len(), 2);
    }
}
