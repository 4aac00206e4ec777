//! Interactive terminal UI: auth gate and task list.

pub mod app;
mod ui;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::{Backend, CrosstermBackend};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

use tareas_core::api::HttpTaskApi;
use tareas_core::auth::SupabaseAuth;

use crate::config::TareasConfig;
use app::{App, AppEvent};

/// Launch the terminal UI and block until the user quits.
pub async fn run(config: TareasConfig) -> Result<()> {
    let provider = Arc::new(SupabaseAuth::new(config.auth));
    let api = Arc::new(HttpTaskApi::new(&config.api));

    let shutdown = CancellationToken::new();
    let refresher = Arc::clone(&provider).spawn_auto_refresh(shutdown.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut app = App::new(provider, api, tx);

    // Set up terminal.
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = drive(&mut terminal, &mut app, &mut rx).await;

    // Restore terminal.
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    app.unmount();
    shutdown.cancel();
    let _ = refresher.await;

    result
}

/// Everything that runs while the terminal is in raw mode. Errors are
/// returned, never propagated past the caller's restore step.
async fn drive<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    events: &mut UnboundedReceiver<AppEvent>,
) -> Result<()> {
    // Draw the loading screen while the initial session resolves.
    terminal.draw(|f| ui::render(f, app))?;
    app.mount().await;
    tracing::info!(screen = ?app.screen(), "session resolved");

    run_event_loop(terminal, app, events)
}

fn run_event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    events: &mut UnboundedReceiver<AppEvent>,
) -> Result<()> {
    let tick_rate = app.tick_rate;

    loop {
        // Apply everything the background tasks reported since the last pass.
        while let Ok(event) = events.try_recv() {
            app.handle_event(event);
        }

        terminal.draw(|f| ui::render(f, app))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key);
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use ratatui::backend::WindowSize;
    use ratatui::buffer::Cell;
    use ratatui::layout::{Position, Size};

    use tareas_core::api::HttpTaskApi;
    use tareas_core::auth::SupabaseAuth;
    use tareas_core::config::{ApiConfig, AuthConfig};
    use tareas_core::session::Screen;

    use super::*;

    /// Terminal whose writes always fail.
    struct BrokenBackend;

    impl Backend for BrokenBackend {
        fn draw<'a, I>(&mut self, _content: I) -> io::Result<()>
        where
            I: Iterator<Item = (u16, u16, &'a Cell)>,
        {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal gone"))
        }

        fn hide_cursor(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn show_cursor(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn get_cursor_position(&mut self) -> io::Result<Position> {
            Ok(Position::ORIGIN)
        }

        fn set_cursor_position<P: Into<Position>>(&mut self, _position: P) -> io::Result<()> {
            Ok(())
        }

        fn clear(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn size(&self) -> io::Result<Size> {
            Ok(Size::new(80, 24))
        }

        fn window_size(&mut self) -> io::Result<WindowSize> {
            Ok(WindowSize {
                columns_rows: Size::new(80, 24),
                pixels: Size::new(0, 0),
            })
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_first_draw_is_returned_to_the_caller() {
        // Nothing listens here; the failing draw stops before any request.
        let url = "http://127.0.0.1:9";
        let provider = Arc::new(SupabaseAuth::new(AuthConfig::new(url, "k").unwrap()));
        let api = Arc::new(HttpTaskApi::new(&ApiConfig::new(url).unwrap()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut app = App::new(provider, api, tx);
        let mut terminal = Terminal::new(BrokenBackend).unwrap();

        let err = drive(&mut terminal, &mut app, &mut rx).await.unwrap_err();
        assert!(err.to_string().contains("terminal gone"), "{err}");
        assert_eq!(app.screen(), Screen::Loading);
    }
}
