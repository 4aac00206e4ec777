//! Task API client.
//!
//! Every call is authenticated with `Authorization: Bearer <access token>`.
//! Non-2xx answers become [`ApiError::Status`]; nothing is retried.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use url::Url;

use crate::config::ApiConfig;
use crate::models::{NewTask, Task, TaskId, TaskPatch};

/// The four task operations, used to tag errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Fetch,
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Message shown to the user when the operation fails.
    pub fn failure_message(self) -> &'static str {
        match self {
            Self::Fetch => "Error al cargar tareas",
            Self::Create => "Error al crear tarea",
            Self::Update => "Error al actualizar tarea",
            Self::Delete => "Error al eliminar tarea",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Errors from the task API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{}: {}", .operation.failure_message(), .status.as_u16())]
    Status {
        operation: Operation,
        status: StatusCode,
    },

    #[error("{}: {source}", .operation.failure_message())]
    Transport {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },

    #[error("{}: invalid response body: {source}", .operation.failure_message())]
    Decode {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Status { operation, .. }
            | Self::Transport { operation, .. }
            | Self::Decode { operation, .. } => *operation,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Text for the error banner.
    ///
    /// Only a failed fetch mentions the status code; transport and decode
    /// failures read the same as a bad status.
    pub fn user_message(&self) -> String {
        match self {
            Self::Status {
                operation: Operation::Fetch,
                status,
            } => format!("{}: {}", Operation::Fetch.failure_message(), status.as_u16()),
            other => other.operation().failure_message().to_owned(),
        }
    }
}

/// Remote task storage.
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// All tasks of the token's owner, in display order.
    async fn list(&self, token: &str) -> Result<Vec<Task>, ApiError>;

    async fn create(&self, token: &str, task: &NewTask) -> Result<Task, ApiError>;

    /// Merge `patch` into the stored task and return the full result.
    async fn update(&self, token: &str, id: &TaskId, patch: &TaskPatch)
    -> Result<Task, ApiError>;

    async fn delete(&self, token: &str, id: &TaskId) -> Result<(), ApiError>;
}

/// [`TaskApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    http: Client,
    base_url: Url,
}

impl HttpTaskApi {
    pub fn new(config: &ApiConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(http: Client, config: &ApiConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
        }
    }

    /// `{base}/api/tasks/` for the collection, `{base}/api/tasks/{id}` for
    /// one task. The id is percent-encoded as a single path segment.
    pub fn task_url(&self, id: Option<&TaskId>) -> Url {
        let mut url = self.base_url.clone();
        // ApiConfig only accepts http(s) URLs, which always have path segments.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["api", "tasks"]);
            match id {
                Some(id) => segments.push(&id.to_string()),
                None => segments.push(""),
            };
        }
        url
    }

    async fn send(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<Response, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|source| ApiError::Transport { operation, source })?;
        let status = response.status();
        tracing::debug!(%operation, %status, "task api responded");
        if !status.is_success() {
            return Err(ApiError::Status { operation, status });
        }
        Ok(response)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        self.send(operation, request)
            .await?
            .json()
            .await
            .map_err(|source| ApiError::Decode { operation, source })
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn list(&self, token: &str) -> Result<Vec<Task>, ApiError> {
        let request = self.http.get(self.task_url(None)).bearer_auth(token);
        self.send_json(Operation::Fetch, request).await
    }

    async fn create(&self, token: &str, task: &NewTask) -> Result<Task, ApiError> {
        let request = self
            .http
            .post(self.task_url(None))
            .bearer_auth(token)
            .json(task);
        self.send_json(Operation::Create, request).await
    }

    async fn update(
        &self,
        token: &str,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> Result<Task, ApiError> {
        let request = self
            .http
            .put(self.task_url(Some(id)))
            .bearer_auth(token)
            .json(patch);
        self.send_json(Operation::Update, request).await
    }

    async fn delete(&self, token: &str, id: &TaskId) -> Result<(), ApiError> {
        let request = self.http.delete(self.task_url(Some(id))).bearer_auth(token);
        self.send(Operation::Delete, request).await?;
        Ok(())
    }
}
