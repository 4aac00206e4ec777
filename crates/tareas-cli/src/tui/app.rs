//! TUI application state and key handling.
//!
//! Only the event loop mutates [`App`]. Network calls run on spawned tokio
//! tasks and report back through the [`AppEvent`] channel.

use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc::UnboundedSender;

use tareas_core::api::TaskApi;
use tareas_core::auth::{AuthChange, AuthError, AuthProvider};
use tareas_core::gate::{self, AuthAction, AuthGate, GateOutcome};
use tareas_core::models::Task;
use tareas_core::session::{Screen, SessionController, SessionTransition};
use tareas_core::workspace::{self, Outcome, Request, TaskWorkspace};

/// Everything that can wake the event loop besides a key press.
#[derive(Debug)]
pub enum AppEvent {
    Session(AuthChange),
    Gate(GateOutcome),
    Workspace(Outcome),
    SignOut(Result<(), AuthError>),
}

/// Which input receives key presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Email,
    Password,
    Title,
    Description,
    List,
}

/// Application state for the TUI.
pub struct App {
    controller: SessionController,
    api: Arc<dyn TaskApi>,
    events: UnboundedSender<AppEvent>,
    pub gate: AuthGate,
    pub workspace: TaskWorkspace,
    pub focus: Focus,
    pub selected: usize,
    pub tick_rate: Duration,
    pub should_quit: bool,
    pub status_message: Option<String>,
}

impl App {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        api: Arc<dyn TaskApi>,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            controller: SessionController::new(provider),
            api,
            events,
            gate: AuthGate::new(),
            workspace: TaskWorkspace::new(),
            focus: Focus::Email,
            selected: 0,
            tick_rate: Duration::from_millis(100),
            should_quit: false,
            status_message: None,
        }
    }

    /// Subscribe to session changes and resolve the initial session.
    pub async fn mount(&mut self) {
        let events = self.events.clone();
        let transition = self
            .controller
            .mount(move |change| {
                let _ = events.send(AppEvent::Session(change));
            })
            .await;
        self.on_transition(transition);
    }

    pub fn unmount(&mut self) {
        self.controller.unmount();
    }

    pub fn screen(&self) -> Screen {
        self.controller.screen()
    }

    pub fn user_email(&self) -> Option<&str> {
        self.controller.session().and_then(|s| s.email())
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.workspace.tasks().get(self.selected)
    }

    // -- Events --

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Session(change) => {
                let transition = self.controller.apply(change);
                self.on_transition(transition);
            }
            AppEvent::Gate(outcome) => self.gate.finish(outcome),
            AppEvent::Workspace(outcome) => {
                self.workspace.apply(outcome);
                self.clamp_selection();
            }
            AppEvent::SignOut(Ok(())) => {}
            AppEvent::SignOut(Err(e)) => {
                tracing::warn!(error = %e, "sign-out request failed");
                self.status_message = Some(format!("Error al cerrar sesión: {e}"));
            }
        }
    }

    fn on_transition(&mut self, transition: SessionTransition) {
        match transition {
            SessionTransition::Unchanged => return,
            SessionTransition::SignedIn => {
                self.focus = Focus::Title;
                self.selected = 0;
            }
            SessionTransition::SignedOut => {
                self.focus = Focus::Email;
                self.gate.password.clear();
                self.gate.clear_feedback();
            }
            SessionTransition::TokenChanged => {}
        }
        if let Some(request) = self.workspace.set_session(self.controller.session()) {
            self.dispatch(request);
        }
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        let len = self.workspace.tasks().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    // -- Actions --

    fn dispatch(&self, request: Request) {
        let Some(token) = self.workspace.access_token().map(str::to_owned) else {
            return;
        };
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = workspace::execute(api.as_ref(), &token, request).await;
            let _ = events.send(AppEvent::Workspace(outcome));
        });
    }

    pub fn submit_auth(&mut self, action: AuthAction) {
        let Some(credentials) = self.gate.begin(action) else {
            return;
        };
        let provider = Arc::clone(self.controller.provider());
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = gate::perform(provider.as_ref(), credentials).await;
            let _ = events.send(AppEvent::Gate(outcome));
        });
    }

    pub fn sign_out(&mut self) {
        let provider = Arc::clone(self.controller.provider());
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = provider.sign_out().await;
            let _ = events.send(AppEvent::SignOut(result));
        });
    }

    pub fn create_task(&mut self) {
        match self.workspace.begin_create() {
            Some(request) => self.dispatch(request),
            None => self.status_message = Some("El título es obligatorio.".to_string()),
        }
    }

    pub fn toggle_selected(&mut self) {
        if let Some(request) = self.selected_task().map(|t| self.workspace.begin_toggle(t)) {
            self.dispatch(request);
        }
    }

    pub fn delete_selected(&mut self) {
        if let Some(request) = self.selected_task().map(|t| self.workspace.begin_delete(&t.id)) {
            self.dispatch(request);
        }
    }

    pub fn refresh(&mut self) {
        if self.workspace.access_token().is_some() {
            let request = self.workspace.begin_fetch();
            self.dispatch(request);
        }
    }

    // -- Navigation --

    pub fn move_up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn move_down(&mut self) {
        let len = self.workspace.tasks().len();
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
        }
    }

    fn cycle_focus(&mut self, back: bool) {
        self.focus = match (self.focus, back) {
            (Focus::Email, _) => Focus::Password,
            (Focus::Password, _) => Focus::Email,
            (Focus::Title, false) | (Focus::List, true) => Focus::Description,
            (Focus::Description, false) | (Focus::Title, true) => Focus::List,
            (Focus::List, false) | (Focus::Description, true) => Focus::Title,
        };
    }

    fn focused_field(&mut self) -> Option<&mut String> {
        match self.focus {
            Focus::Email => Some(&mut self.gate.email),
            Focus::Password => Some(&mut self.gate.password),
            Focus::Title => Some(&mut self.workspace.form.titulo),
            Focus::Description => Some(&mut self.workspace.form.descripcion),
            Focus::List => None,
        }
    }

    // -- Keys --

    pub fn handle_key(&mut self, key: KeyEvent) {
        self.status_message = None;
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        if ctrl && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        match self.screen() {
            Screen::Loading => {
                if key.code == KeyCode::Esc {
                    self.should_quit = true;
                }
            }
            Screen::AuthGate => self.handle_gate_key(key, ctrl),
            Screen::Workspace => self.handle_workspace_key(key, ctrl),
        }
    }

    fn handle_gate_key(&mut self, key: KeyEvent, ctrl: bool) {
        if !matches!(self.focus, Focus::Email | Focus::Password) {
            self.focus = Focus::Email;
        }
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab | KeyCode::Down | KeyCode::Up | KeyCode::BackTab => {
                self.cycle_focus(false)
            }
            KeyCode::Enter => self.submit_auth(AuthAction::SignIn),
            KeyCode::Char('r') if ctrl => self.submit_auth(AuthAction::SignUp),
            _ => self.edit_field(key, ctrl),
        }
    }

    fn handle_workspace_key(&mut self, key: KeyEvent, ctrl: bool) {
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('l') if ctrl => self.sign_out(),
            KeyCode::Char('r') if ctrl => self.refresh(),
            KeyCode::Tab => self.cycle_focus(false),
            KeyCode::BackTab => self.cycle_focus(true),
            _ if self.focus == Focus::List => match key.code {
                KeyCode::Char('j') | KeyCode::Down => self.move_down(),
                KeyCode::Char('k') | KeyCode::Up => self.move_up(),
                KeyCode::Char(' ') | KeyCode::Char('c') | KeyCode::Enter => {
                    self.toggle_selected()
                }
                KeyCode::Char('d') | KeyCode::Delete => self.delete_selected(),
                _ => {}
            },
            KeyCode::Enter => self.create_task(),
            _ => self.edit_field(key, ctrl),
        }
    }

    fn edit_field(&mut self, key: KeyEvent, ctrl: bool) {
        if ctrl {
            return;
        }
        let Some(field) = self.focused_field() else {
            return;
        };
        match key.code {
            KeyCode::Char(c) => field.push(c),
            KeyCode::Backspace => {
                field.pop();
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use tareas_core::api::HttpTaskApi;
    use tareas_core::auth::SupabaseAuth;
    use tareas_core::config::{ApiConfig, AuthConfig};
    use tareas_core::gate::SIGN_IN_MESSAGE;
    use tareas_core::workspace::ListPhase;
    use tareas_test_utils::{FakeBackend, Route};

    use super::*;

    const EMAIL: &str = "alumno@duoc.cl";
    const PASSWORD: &str = "secret123";

    async fn app() -> (FakeBackend, App, UnboundedReceiver<AppEvent>) {
        let backend = FakeBackend::start().await;
        let provider = Arc::new(SupabaseAuth::new(
            AuthConfig::new(&backend.base_url(), backend.anon_key()).unwrap(),
        ));
        let api = Arc::new(HttpTaskApi::new(
            &ApiConfig::new(&backend.base_url()).unwrap(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let mut app = App::new(provider, api, tx);
        app.mount().await;
        (backend, app, rx)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn ctrl(app: &mut App, c: char) {
        app.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL));
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    /// Apply events until `done` holds.
    async fn pump_until(
        app: &mut App,
        rx: &mut UnboundedReceiver<AppEvent>,
        done: impl Fn(&App) -> bool,
    ) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done(&*app) {
                let event = rx.recv().await.expect("event channel closed");
                app.handle_event(event);
            }
        })
        .await
        .expect("condition not reached");
    }

    async fn signed_in() -> (FakeBackend, App, UnboundedReceiver<AppEvent>) {
        let (backend, mut app, mut rx) = app().await;
        backend.add_user(EMAIL, PASSWORD);
        type_text(&mut app, EMAIL);
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, PASSWORD);
        press(&mut app, KeyCode::Enter);
        pump_until(&mut app, &mut rx, |a| {
            a.screen() == Screen::Workspace && a.workspace.phase() == ListPhase::Ready
        })
        .await;
        (backend, app, rx)
    }

    #[tokio::test]
    async fn starts_on_auth_gate() {
        let (_backend, app, _rx) = app().await;
        assert_eq!(app.screen(), Screen::AuthGate);
        assert_eq!(app.focus, Focus::Email);
    }

    #[tokio::test]
    async fn typing_fills_focused_field() {
        let (_backend, mut app, _rx) = app().await;
        type_text(&mut app, "ab");
        press(&mut app, KeyCode::Backspace);
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "pw");
        assert_eq!(app.gate.email, "a");
        assert_eq!(app.gate.password, "pw");
    }

    #[tokio::test]
    async fn sign_in_switches_to_workspace() {
        let (_backend, mut app, mut rx) = signed_in().await;
        pump_until(&mut app, &mut rx, |a| !a.gate.is_loading()).await;
        assert_eq!(app.gate.message(), Some(SIGN_IN_MESSAGE));
        assert_eq!(app.focus, Focus::Title);
        assert_eq!(app.user_email(), Some(EMAIL));
    }

    #[tokio::test]
    async fn enter_in_form_creates_task() {
        let (backend, mut app, mut rx) = signed_in().await;
        type_text(&mut app, "Buy milk");
        press(&mut app, KeyCode::Enter);
        pump_until(&mut app, &mut rx, |a| a.workspace.tasks().len() == 1).await;

        assert_eq!(app.workspace.tasks()[0].titulo, "Buy milk");
        assert!(app.workspace.form.titulo.is_empty());
        assert_eq!(backend.tasks().len(), 1);
    }

    #[tokio::test]
    async fn blank_title_shows_hint_without_request() {
        let (backend, mut app, _rx) = signed_in().await;
        backend.clear_requests();
        press(&mut app, KeyCode::Enter);
        assert!(app.status_message.is_some());
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn list_keys_toggle_and_delete() {
        let (backend, mut app, mut rx) = app().await;
        backend.add_user(EMAIL, PASSWORD);
        backend.seed_task(EMAIL, "A", false);
        backend.seed_task(EMAIL, "B", false);
        app.gate.email = EMAIL.into();
        app.gate.password = PASSWORD.into();
        press(&mut app, KeyCode::Enter);
        pump_until(&mut app, &mut rx, |a| a.workspace.tasks().len() == 2).await;

        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus, Focus::List);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char(' '));
        pump_until(&mut app, &mut rx, |a| a.workspace.tasks()[1].completada).await;
        assert!(!app.workspace.tasks()[0].completada);

        backend.fail_next(Route::DeleteTask, 500);
        press(&mut app, KeyCode::Char('d'));
        pump_until(&mut app, &mut rx, |a| a.workspace.error().is_some()).await;
        assert_eq!(app.workspace.tasks().len(), 2);

        press(&mut app, KeyCode::Char('d'));
        pump_until(&mut app, &mut rx, |a| a.workspace.tasks().len() == 1).await;
        assert_eq!(app.selected, 0);
    }

    #[tokio::test]
    async fn ctrl_l_signs_out() {
        let (_backend, mut app, mut rx) = signed_in().await;
        pump_until(&mut app, &mut rx, |a| !a.gate.is_loading()).await;
        assert_eq!(app.gate.message(), Some(SIGN_IN_MESSAGE));

        ctrl(&mut app, 'l');
        pump_until(&mut app, &mut rx, |a| a.screen() == Screen::AuthGate).await;
        assert_eq!(app.focus, Focus::Email);
        assert!(app.gate.password.is_empty());
        assert_eq!(app.gate.email, EMAIL);
        assert_eq!(app.gate.message(), None);
        assert!(app.workspace.tasks().is_empty());
    }

    #[tokio::test]
    async fn ctrl_c_quits_anywhere() {
        let (_backend, mut app, _rx) = app().await;
        ctrl(&mut app, 'c');
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn q_is_text_not_quit() {
        let (_backend, mut app, _rx) = app().await;
        press(&mut app, KeyCode::Char('q'));
        assert!(!app.should_quit);
        assert_eq!(app.gate.email, "q");
    }
}
