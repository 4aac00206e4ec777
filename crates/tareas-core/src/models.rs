use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Server-assigned task identifier.
///
/// Opaque to the client: the task API may hand out integers or strings, and
/// whatever it sent is echoed back verbatim in request paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskId {
    Int(i64),
    Text(String),
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for TaskId {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// A task as returned by the task API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub titulo: String,
    #[serde(default)]
    pub descripcion: Option<String>,
    #[serde(default)]
    pub completada: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of a create request.
///
/// `descripcion` is always serialized, as `null` when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTask {
    pub titulo: String,
    pub descripcion: Option<String>,
    pub completada: bool,
}

impl NewTask {
    /// Build a create request from raw form input.
    ///
    /// Returns `None` when the title is empty or whitespace-only. An empty
    /// description becomes `None`.
    pub fn from_form(titulo: &str, descripcion: &str) -> Option<Self> {
        if titulo.trim().is_empty() {
            return None;
        }
        Some(Self {
            titulo: titulo.to_owned(),
            descripcion: (!descripcion.is_empty()).then(|| descripcion.to_owned()),
            completada: false,
        })
    }
}

/// Merge-patch body for an update request. Unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub titulo: Option<String>,
    /// `Some(None)` clears the description on the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completada: Option<bool>,
}

impl TaskPatch {
    /// Patch that flips the completion flag of `task` and touches nothing else.
    pub fn toggle_completion(task: &Task) -> Self {
        Self {
            completada: Some(!task.completada),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Authenticated user as described by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Provider-defined fields the client does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Proof of authentication plus the bearer credential for the task API.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds, as reported when the token was issued.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Expiry as a Unix timestamp in seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_owned()
}

impl Session {
    /// Fill in `expires_at` from `expires_in` when the provider omitted it.
    pub fn with_expiry_from(mut self, now: DateTime<Utc>) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = self.expires_in.map(|secs| now.timestamp() + secs);
        }
        self
    }

    /// Whether the token expires within `margin_secs` of `now`.
    ///
    /// A session without a known expiry never counts as expiring.
    pub fn expires_within(&self, now: DateTime<Utc>, margin_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|at| at - margin_secs <= now.timestamp())
    }

    pub fn email(&self) -> Option<&str> {
        self.user.email.as_deref()
    }
}

// Tokens never end up in logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_accepts_integer_and_string_ids() {
        let a: Task = serde_json::from_value(json!({
            "id": 1, "titulo": "A", "descripcion": null, "completada": false
        }))
        .unwrap();
        assert_eq!(a.id, TaskId::Int(1));
        assert_eq!(a.descripcion, None);

        let b: Task = serde_json::from_value(json!({
            "id": "9f1c", "titulo": "B", "completada": true,
            "created_at": "2024-05-01T10:00:00Z", "updated_at": "2024-05-01T10:05:00Z"
        }))
        .unwrap();
        assert_eq!(b.id, TaskId::Text("9f1c".into()));
        assert!(b.completada);
        assert!(b.created_at.is_some());
    }

    #[test]
    fn new_task_rejects_blank_titles() {
        assert!(NewTask::from_form("", "x").is_none());
        assert!(NewTask::from_form("   \t", "x").is_none());
    }

    #[test]
    fn new_task_sends_null_for_empty_description() {
        let task = NewTask::from_form("Buy milk", "").unwrap();
        assert_eq!(
            serde_json::to_value(&task).unwrap(),
            json!({ "titulo": "Buy milk", "descripcion": null, "completada": false })
        );
    }

    #[test]
    fn new_task_keeps_title_untrimmed() {
        let task = NewTask::from_form("  padded ", "desc").unwrap();
        assert_eq!(task.titulo, "  padded ");
        assert_eq!(task.descripcion.as_deref(), Some("desc"));
    }

    #[test]
    fn toggle_patch_only_carries_completion() {
        let task = Task {
            id: TaskId::Int(2),
            titulo: "Buy milk".into(),
            descripcion: Some("2 litres".into()),
            completada: false,
            created_at: None,
            updated_at: None,
        };
        let patch = TaskPatch::toggle_completion(&task);
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({ "completada": true })
        );
    }

    #[test]
    fn patch_can_clear_description() {
        let patch = TaskPatch {
            descripcion: Some(None),
            ..TaskPatch::default()
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({ "descripcion": null })
        );
    }

    #[test]
    fn session_debug_redacts_tokens() {
        let session: Session = serde_json::from_value(json!({
            "access_token": "secret-access",
            "refresh_token": "secret-refresh",
            "expires_in": 3600,
            "user": { "id": "u1", "email": "alumno@duoc.cl", "role": "authenticated" }
        }))
        .unwrap();
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert_eq!(session.token_type, "bearer");
        assert_eq!(session.email(), Some("alumno@duoc.cl"));
        assert_eq!(session.user.extra["role"], "authenticated");
    }

    #[test]
    fn session_expiry_is_derived_from_expires_in() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let session: Session = serde_json::from_value(json!({
            "access_token": "t",
            "expires_in": 3600,
            "user": { "id": "u1" }
        }))
        .unwrap();
        let session = session.with_expiry_from(now);
        assert_eq!(session.expires_at, Some(1_700_003_600));
        assert!(!session.expires_within(now, 60));
        assert!(session.expires_within(now + chrono::Duration::seconds(3550), 60));
    }
}
