//! Task workspace: the locally cached task list and its synchronization with
//! the task API.
//!
//! Every operation is split in two halves so the host can run the network
//! call wherever it likes:
//!
//! ```text
//! begin_*()  ->  Request  --execute(api, token)-->  Outcome  ->  apply()
//! ```
//!
//! The sequential helpers ([`TaskWorkspace::fetch`] and friends) chain the
//! three steps for callers that can simply await.
//!
//! Fetch results carry the generation they were issued under; only the most
//! recently issued fetch may replace the list. Mutations carry the session
//! epoch instead: an answer that arrives after its session ended is dropped.

mod view;

pub use view::{COMPLETED_MARKER, DELETE_LABEL, EMPTY_MESSAGE, toggle_label};

use crate::api::{ApiError, Operation, TaskApi};
use crate::models::{NewTask, Session, Task, TaskId, TaskPatch};

/// Load state of the task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPhase {
    /// No access token yet.
    Idle,
    Loading,
    Ready,
    /// The last fetch failed.
    Error,
}

/// The single error slot, tagged with the operation that filled it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceError {
    pub operation: Operation,
    pub message: String,
    pub status: Option<u16>,
}

impl From<&ApiError> for WorkspaceError {
    fn from(e: &ApiError) -> Self {
        Self {
            operation: e.operation(),
            message: e.user_message(),
            status: e.status().map(|s| s.as_u16()),
        }
    }
}

/// Contents of the creation form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskForm {
    pub titulo: String,
    pub descripcion: String,
}

impl TaskForm {
    pub fn clear(&mut self) {
        self.titulo.clear();
        self.descripcion.clear();
    }
}

/// A network call the workspace wants made.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Fetch {
        generation: u64,
    },
    Create {
        epoch: u64,
        task: NewTask,
    },
    Update {
        epoch: u64,
        id: TaskId,
        patch: TaskPatch,
    },
    Delete {
        epoch: u64,
        id: TaskId,
    },
}

/// The answer to a [`Request`].
#[derive(Debug)]
pub enum Outcome {
    Fetched {
        generation: u64,
        result: Result<Vec<Task>, ApiError>,
    },
    Created {
        epoch: u64,
        result: Result<Task, ApiError>,
    },
    Updated {
        epoch: u64,
        id: TaskId,
        result: Result<Task, ApiError>,
    },
    Deleted {
        epoch: u64,
        id: TaskId,
        result: Result<(), ApiError>,
    },
}

impl Outcome {
    /// Session epoch of a mutation; fetches are guarded by generation.
    fn epoch(&self) -> Option<u64> {
        match self {
            Self::Fetched { .. } => None,
            Self::Created { epoch, .. }
            | Self::Updated { epoch, .. }
            | Self::Deleted { epoch, .. } => Some(*epoch),
        }
    }
}

/// Perform `request` against `api`.
pub async fn execute(api: &dyn TaskApi, token: &str, request: Request) -> Outcome {
    match request {
        Request::Fetch { generation } => Outcome::Fetched {
            generation,
            result: api.list(token).await,
        },
        Request::Create { epoch, task } => Outcome::Created {
            epoch,
            result: api.create(token, &task).await,
        },
        Request::Update { epoch, id, patch } => {
            let result = api.update(token, &id, &patch).await;
            Outcome::Updated { epoch, id, result }
        }
        Request::Delete { epoch, id } => {
            let result = api.delete(token, &id).await;
            Outcome::Deleted { epoch, id, result }
        }
    }
}

/// Local mirror of the user's tasks.
///
/// Invariant: `tasks` never holds two entries with the same id, and every
/// entry came from a request issued under the current session.
#[derive(Debug)]
pub struct TaskWorkspace {
    access_token: Option<String>,
    /// User id of the session the list belongs to.
    owner: Option<String>,
    tasks: Vec<Task>,
    phase: ListPhase,
    error: Option<WorkspaceError>,
    generation: u64,
    epoch: u64,
    pub form: TaskForm,
}

impl Default for TaskWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskWorkspace {
    pub fn new() -> Self {
        Self {
            access_token: None,
            owner: None,
            tasks: Vec::new(),
            phase: ListPhase::Idle,
            error: None,
            generation: 0,
            epoch: 0,
            form: TaskForm::default(),
        }
    }

    // -- Accessors --

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn phase(&self) -> ListPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == ListPhase::Loading
    }

    pub fn error(&self) -> Option<&WorkspaceError> {
        self.error.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Session epoch stamped on mutation requests.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // -- Token --

    /// Follow the signed-in session.
    ///
    /// A different user (or none) ends the current session: the list, the
    /// error and the form are dropped and nothing issued before can commit.
    /// A new token for the same user only triggers a refetch.
    pub fn set_session(&mut self, session: Option<&Session>) -> Option<Request> {
        let owner = session.map(|s| s.user.id.as_str());
        if owner != self.owner.as_deref() {
            self.end_session();
            self.owner = owner.map(str::to_owned);
        }
        self.set_access_token(session.map(|s| s.access_token.clone()))
    }

    /// Install the access token.
    ///
    /// Returns a fetch request when a token becomes available or changes.
    /// Losing the token ends the session.
    pub fn set_access_token(&mut self, token: Option<String>) -> Option<Request> {
        if token == self.access_token {
            return None;
        }
        match token {
            Some(token) => {
                self.access_token = Some(token);
                Some(self.begin_fetch())
            }
            None => {
                self.end_session();
                None
            }
        }
    }

    fn end_session(&mut self) {
        tracing::debug!(epoch = self.epoch, "task session ended");
        self.access_token = None;
        self.owner = None;
        self.tasks.clear();
        self.error = None;
        self.form.clear();
        self.phase = ListPhase::Idle;
        // Invalidate anything still in flight.
        self.generation += 1;
        self.epoch += 1;
    }

    // -- Request side --

    /// Enter `Loading` and stamp a new fetch generation. Clears the error.
    pub fn begin_fetch(&mut self) -> Request {
        self.generation += 1;
        self.phase = ListPhase::Loading;
        self.error = None;
        Request::Fetch {
            generation: self.generation,
        }
    }

    /// Build a create request from the form, or `None` for a blank title.
    pub fn begin_create(&self) -> Option<Request> {
        NewTask::from_form(&self.form.titulo, &self.form.descripcion).map(|task| {
            Request::Create {
                epoch: self.epoch,
                task,
            }
        })
    }

    /// Patch flipping `task`'s completion flag.
    pub fn begin_toggle(&self, task: &Task) -> Request {
        Request::Update {
            epoch: self.epoch,
            id: task.id.clone(),
            patch: TaskPatch::toggle_completion(task),
        }
    }

    /// [`Self::begin_toggle`] for a cached task, looked up by id.
    pub fn begin_toggle_id(&self, id: &TaskId) -> Option<Request> {
        self.task(id).map(|task| self.begin_toggle(task))
    }

    pub fn begin_delete(&self, id: &TaskId) -> Request {
        Request::Delete {
            epoch: self.epoch,
            id: id.clone(),
        }
    }

    // -- Outcome side --

    /// Fold a completed request into local state.
    ///
    /// Returns `false` when the outcome was discarded as stale.
    pub fn apply(&mut self, outcome: Outcome) -> bool {
        if let Some(epoch) = outcome.epoch() {
            if epoch != self.epoch {
                tracing::debug!(
                    epoch,
                    current = self.epoch,
                    "discarding mutation from an ended session"
                );
                return false;
            }
        }
        match outcome {
            Outcome::Fetched { generation, result } => {
                if generation != self.generation {
                    tracing::debug!(
                        generation,
                        current = self.generation,
                        "discarding stale fetch result"
                    );
                    return false;
                }
                match result {
                    Ok(tasks) => {
                        self.tasks = dedupe_by_id(tasks);
                        self.phase = ListPhase::Ready;
                    }
                    Err(e) => {
                        self.phase = ListPhase::Error;
                        self.record(&e);
                    }
                }
            }
            Outcome::Created { result, .. } => match result {
                Ok(task) => {
                    match self.position(&task.id) {
                        Some(i) => self.tasks[i] = task,
                        None => self.tasks.push(task),
                    }
                    self.form.clear();
                }
                Err(e) => self.record(&e),
            },
            Outcome::Updated { id, result, .. } => match result {
                Ok(task) => {
                    if let Some(i) = self.position(&id) {
                        let new_id = task.id.clone();
                        self.tasks[i] = task;
                        if new_id != id {
                            self.tasks = dedupe_by_id(std::mem::take(&mut self.tasks));
                        }
                    }
                }
                Err(e) => self.record(&e),
            },
            Outcome::Deleted { id, result, .. } => match result {
                Ok(()) => self.tasks.retain(|t| t.id != id),
                Err(e) => self.record(&e),
            },
        }
        true
    }

    fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| &t.id == id)
    }

    fn record(&mut self, e: &ApiError) {
        tracing::warn!(operation = %e.operation(), error = %e, "task operation failed");
        self.error = Some(WorkspaceError::from(e));
    }

    // -- Sequential helpers --

    async fn run(&mut self, api: &dyn TaskApi, request: Request) {
        let Some(token) = self.access_token.clone() else {
            tracing::debug!(?request, "no access token, request dropped");
            return;
        };
        let outcome = execute(api, &token, request).await;
        self.apply(outcome);
    }

    /// Reload the whole list.
    pub async fn fetch(&mut self, api: &dyn TaskApi) {
        let request = self.begin_fetch();
        self.run(api, request).await;
    }

    /// Submit the creation form. Returns `false` (and sends nothing) when the
    /// title is blank.
    pub async fn create(&mut self, api: &dyn TaskApi) -> bool {
        let Some(request) = self.begin_create() else {
            return false;
        };
        self.run(api, request).await;
        true
    }

    pub async fn toggle_complete(&mut self, api: &dyn TaskApi, task: &Task) {
        let request = self.begin_toggle(task);
        self.run(api, request).await;
    }

    pub async fn delete(&mut self, api: &dyn TaskApi, id: &TaskId) {
        let request = self.begin_delete(id);
        self.run(api, request).await;
    }
}

/// Collapse repeated ids: first position wins, last representation wins.
fn dedupe_by_id(tasks: Vec<Task>) -> Vec<Task> {
    let mut out: Vec<Task> = Vec::with_capacity(tasks.len());
    for task in tasks {
        match out.iter().position(|t| t.id == task.id) {
            Some(i) => out[i] = task,
            None => out.push(task),
        }
    }
    out
}
