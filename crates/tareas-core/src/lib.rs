//! Session and task synchronization for the tareas client.
//!
//! The terminal front end in `tareas-cli` is a thin renderer over the state
//! machines defined here.

pub mod api;
pub mod auth;
pub mod config;
pub mod gate;
pub mod models;
pub mod session;
pub mod workspace;

pub use api::{ApiError, HttpTaskApi, Operation, TaskApi};
pub use auth::{AuthChange, AuthError, AuthEvent, AuthProvider, SignUpOutcome, SupabaseAuth};
pub use config::{ApiConfig, AuthConfig, ConfigError};
pub use models::{NewTask, Session, Task, TaskId, TaskPatch, User};
pub use session::{Screen, SessionController, SessionTransition};
pub use workspace::TaskWorkspace;
