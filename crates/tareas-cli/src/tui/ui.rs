//! TUI rendering using ratatui.

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Wrap};

use tareas_core::session::Screen;
use tareas_core::workspace::{
    COMPLETED_MARKER, DELETE_LABEL, EMPTY_MESSAGE, ListPhase, toggle_label,
};

use super::app::{App, Focus};

/// Render the current screen.
pub fn render(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // main content
            Constraint::Length(1), // status bar
        ])
        .split(f.area());

    match app.screen() {
        Screen::Loading => render_loading(f, chunks[0]),
        Screen::AuthGate => render_auth_gate(f, app, chunks[0]),
        Screen::Workspace => render_workspace(f, app, chunks[0]),
    }

    render_status_bar(f, app, chunks[1]);
}

fn render_loading(f: &mut Frame, area: Rect) {
    let text = Paragraph::new("Cargando sesión...")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(" Tareas "));
    f.render_widget(text, area);
}

fn field_line<'a>(label: &'a str, value: String, focused: bool) -> Line<'a> {
    let style = if focused {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    let cursor = if focused { "_" } else { "" };
    Line::from(vec![
        Span::styled(format!("{label:<13}"), Style::default().fg(Color::Yellow)),
        Span::styled(format!("{value}{cursor}"), style),
    ])
}

fn render_auth_gate(f: &mut Frame, app: &App, area: Rect) {
    let gate = &app.gate;
    let masked = "*".repeat(gate.password.chars().count());

    let mut lines = vec![
        Line::from(""),
        field_line("Email", gate.email.clone(), app.focus == Focus::Email),
        field_line("Contraseña", masked, app.focus == Focus::Password),
        Line::from(""),
        Line::from(Span::styled(
            "Enter: Iniciar sesión   Ctrl+R: Crear cuenta",
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
    ];

    if gate.is_loading() {
        lines.push(Line::from(Span::styled(
            "Procesando...",
            Style::default().fg(Color::Cyan),
        )));
    }
    if let Some(message) = gate.message() {
        lines.push(Line::from(Span::styled(
            message,
            Style::default().fg(Color::Green),
        )));
    }
    if let Some(error) = gate.error() {
        lines.push(Line::from(Span::styled(error, Style::default().fg(Color::Red))));
    }

    let form = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Iniciar sesión "),
    );
    f.render_widget(form, area);
}

fn render_workspace(f: &mut Frame, app: &App, area: Rect) {
    let ws = &app.workspace;
    let banner_height = if ws.error().is_some() { 3 } else { 0 };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),             // user + summary
            Constraint::Length(4),             // creation form
            Constraint::Length(banner_height), // error banner
            Constraint::Min(3),                // task list
        ])
        .split(area);

    // Header.
    let who = app.user_email().unwrap_or("(sin email)");
    let header = Paragraph::new(Line::from(vec![
        Span::styled(who, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  "),
        Span::raw(ws.summary()),
    ]))
    .block(Block::default().borders(Borders::ALL).title(" Mis tareas "));
    f.render_widget(header, chunks[0]);

    // Form.
    let form = Paragraph::new(vec![
        field_line("Título", ws.form.titulo.clone(), app.focus == Focus::Title),
        field_line(
            "Descripción",
            ws.form.descripcion.clone(),
            app.focus == Focus::Description,
        ),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Nueva tarea (Enter: Agregar) "),
    );
    f.render_widget(form, chunks[1]);

    // Error banner.
    if let Some(error) = ws.error() {
        let banner = Paragraph::new(Span::styled(
            error.message.clone(),
            Style::default().fg(Color::White).bg(Color::Red),
        ))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        );
        f.render_widget(banner, chunks[2]);
    }

    render_task_list(f, app, chunks[3]);
}

fn render_task_list(f: &mut Frame, app: &App, area: Rect) {
    let ws = &app.workspace;
    let list_focused = app.focus == Focus::List;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(if list_focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        })
        .title(" Tareas ");

    if ws.tasks().is_empty() {
        let text = match ws.phase() {
            ListPhase::Loading => "Cargando tareas...",
            _ => EMPTY_MESSAGE,
        };
        let empty = Paragraph::new(Span::styled(text, Style::default().fg(Color::DarkGray)))
            .block(block);
        f.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = ws
        .tasks()
        .iter()
        .enumerate()
        .map(|(i, task)| {
            let mut title_style = Style::default().add_modifier(Modifier::BOLD);
            if task.completada {
                title_style = title_style
                    .add_modifier(Modifier::CROSSED_OUT)
                    .fg(Color::DarkGray);
            }

            let mut title = vec![Span::styled(task.titulo.clone(), title_style)];
            if task.completada {
                title.push(Span::raw("  "));
                title.push(Span::styled(
                    format!("[{COMPLETED_MARKER}]"),
                    Style::default().fg(Color::Green),
                ));
            }

            let mut lines = vec![Line::from(title)];
            if let Some(descripcion) = &task.descripcion {
                lines.push(Line::from(Span::styled(
                    format!("  {descripcion}"),
                    Style::default().fg(Color::Gray),
                )));
            }
            lines.push(Line::from(Span::styled(
                format!("  [espacio] {}   [d] {DELETE_LABEL}", toggle_label(task)),
                Style::default().fg(Color::DarkGray),
            )));

            let style = if list_focused && i == app.selected {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };
            ListItem::new(lines).style(style)
        })
        .collect();

    f.render_widget(List::new(items).block(block), area);
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let (screen_name, keys) = match app.screen() {
        Screen::Loading => ("Cargando", "Esc:salir"),
        Screen::AuthGate => ("Acceso", "Tab:campo  Esc:salir"),
        Screen::Workspace => (
            "Tareas",
            "Tab:campo  Ctrl+R:recargar  Ctrl+L:cerrar sesión  Esc:salir",
        ),
    };

    let status_msg = app.status_message.as_deref().unwrap_or("");

    let bar = Line::from(vec![
        Span::styled(
            format!(" {screen_name} "),
            Style::default().bg(Color::Blue).fg(Color::White),
        ),
        Span::raw("  "),
        Span::styled(status_msg, Style::default().fg(Color::Yellow)),
        Span::raw("  "),
        Span::styled(keys, Style::default().fg(Color::DarkGray)),
    ]);

    f.render_widget(Paragraph::new(bar), area);
}
