use std::io::{Stdout, stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::app::{App, InputMode, Screen};
use crate::domain::todo::Todo;
use crate::error::AuthError;
use crate::remote::RemoteCollection;

pub fn run<R: RemoteCollection>(mut app: App<R>, tick_rate: Duration) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = event_loop(&mut terminal, &mut app, tick_rate);

    cleanup_terminal(&mut terminal)?;
    res
}

fn event_loop<R: RemoteCollection>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App<R>,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();
    loop {
        app.sync();
        terminal.draw(|f| draw(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && handle_key(app, key.code)?
        {
            return Ok(());
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
}

/// Returns `Ok(true)` to quit. A failed or abandoned sign-in ends the
/// session with an error.
fn handle_key<R: RemoteCollection>(app: &mut App<R>, code: KeyCode) -> Result<bool> {
    match app.screen {
        Screen::SignIn => match code {
            KeyCode::Esc => return Err(AuthError::Cancelled.into()),
            KeyCode::Enter => app.submit_sign_in()?,
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Char(c) => app.input.push(c),
            _ => {}
        },
        Screen::Todos => match app.mode {
            InputMode::Normal => match code {
                KeyCode::Char('q') => return Ok(true),
                KeyCode::Char('j') | KeyCode::Down => app.select_next(),
                KeyCode::Char('k') | KeyCode::Up => app.select_previous(),
                KeyCode::Char('a') | KeyCode::Char('n') => {
                    app.mode = InputMode::Editing;
                    app.input.clear();
                    app.set_status("Type new task and press Enter");
                }
                KeyCode::Enter | KeyCode::Char(' ') => app.toggle_selected(),
                KeyCode::Char('d') | KeyCode::Delete => app.delete_selected(),
                KeyCode::Char('L') => app.sign_out(),
                _ => {}
            },
            InputMode::Editing => match code {
                KeyCode::Esc => {
                    app.mode = InputMode::Normal;
                    app.input.clear();
                    app.set_status("Canceled");
                }
                KeyCode::Enter => app.add_todo(),
                KeyCode::Backspace => {
                    app.input.pop();
                }
                KeyCode::Char(c) => app.input.push(c),
                _ => {}
            },
        },
    }

    Ok(false)
}

fn draw<R: RemoteCollection>(f: &mut ratatui::Frame, app: &App<R>) {
    let size = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(size);

    f.render_widget(render_header(app), chunks[0]);

    match app.screen {
        Screen::SignIn => {
            f.render_widget(render_sign_in(&app.input), chunks[1]);
        }
        Screen::Todos => {
            let mut list_state = ListState::default();
            if !app.todos.is_empty() {
                list_state.select(Some(app.selected));
            }
            f.render_stateful_widget(render_list(&app.todos), chunks[1], &mut list_state);
        }
    }

    f.render_widget(render_footer(app), chunks[2]);
}

/// Style of a row, decided by completion alone.
pub fn item_style(todo: &Todo) -> Style {
    if todo.is_done {
        Style::default().add_modifier(Modifier::CROSSED_OUT | Modifier::ITALIC)
    } else {
        Style::default()
    }
}

fn render_header<R: RemoteCollection>(app: &App<R>) -> Paragraph<'static> {
    let mut spans = vec![Span::styled("sync-todo", Style::default().fg(Color::Cyan))];
    match app.user_email() {
        Some(email) => {
            let total = app.todos.len();
            let done = app.todos.iter().filter(|t| t.is_done).count();
            let summary = format!("Open: {} / All: {}", total.saturating_sub(done), total);
            spans.push(Span::raw("  |  "));
            spans.push(Span::raw(email));
            spans.push(Span::raw("  |  "));
            spans.push(Span::styled(summary, Style::default().fg(Color::Yellow)));
        }
        None => {
            spans.push(Span::raw("  |  "));
            spans.push(Span::styled("signed out", Style::default().fg(Color::DarkGray)));
        }
    }
    if let Some(reason) = &app.stale {
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(
            format!("stale: {reason}"),
            Style::default().fg(Color::Red),
        ));
    }
    Paragraph::new(Line::from(spans))
        .block(Block::default().title("Overview").borders(Borders::ALL))
        .wrap(Wrap { trim: true })
}

fn render_sign_in(input: &str) -> Paragraph<'_> {
    let lines = vec![
        Line::from("Sign in with your email address to load your list."),
        Line::from(""),
        Line::from(vec![
            Span::raw("Email: "),
            Span::styled(input, Style::default().fg(Color::Yellow)),
            Span::raw("█"),
        ]),
    ];
    Paragraph::new(lines).block(
        Block::default()
            .title("Sign in (Enter to continue / Esc to quit)")
            .borders(Borders::ALL),
    )
}

fn render_list(todos: &[Todo]) -> List<'_> {
    let items: Vec<ListItem> = todos
        .iter()
        .map(|todo| {
            let line = Line::from(vec![
                Span::styled(todo.text.as_str(), item_style(todo)),
                Span::styled("  [x]", Style::default().fg(Color::DarkGray)),
            ]);
            ListItem::new(line)
        })
        .collect();

    List::new(items)
        .block(
            Block::default()
                .title("Todos (j/k move ; a/n add ; Space/Enter toggle ; d delete ; L sign out)")
                .borders(Borders::ALL),
        )
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .highlight_symbol("➤ ")
}

fn render_footer<R: RemoteCollection>(app: &App<R>) -> Paragraph<'_> {
    if app.screen == Screen::Todos && app.mode == InputMode::Editing {
        let line = Line::from(vec![
            Span::raw("New task: "),
            Span::styled(&app.input, Style::default().fg(Color::Yellow)),
            Span::raw("█"),
        ]);
        return Paragraph::new(line).block(
            Block::default()
                .title("Input (Enter to add / Esc to cancel)")
                .borders(Borders::ALL),
        );
    }
    let msg = app.status.as_deref().unwrap_or("q quit ; a add ; L sign out");
    Paragraph::new(msg).block(Block::default().title("Normal").borders(Borders::ALL))
}

fn cleanup_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::local::{LocalEmailProvider, uid_for_email};
    use crate::domain::todo::TodoId;
    use crate::remote::memory::InMemoryCollection;
    use crate::store::ErrorPolicy;
    use ratatui::backend::TestBackend;
    use ratatui::buffer::Buffer;
    use tempfile::TempDir;

    fn signed_out_app(
        remote: &InMemoryCollection,
        policy: ErrorPolicy,
    ) -> (TempDir, App<InMemoryCollection>) {
        let dir = TempDir::new().unwrap();
        let identity = LocalEmailProvider::new(dir.path());
        let app = App::new(remote.clone(), Box::new(identity), policy).unwrap();
        (dir, app)
    }

    fn signed_in_app(
        remote: &InMemoryCollection,
        policy: ErrorPolicy,
    ) -> (TempDir, App<InMemoryCollection>) {
        let (dir, mut app) = signed_out_app(remote, policy);
        type_text(&mut app, "alice@example.com");
        assert!(!handle_key(&mut app, KeyCode::Enter).unwrap());
        app.sync();
        assert_eq!(app.screen, Screen::Todos);
        (dir, app)
    }

    fn type_text(app: &mut App<InMemoryCollection>, text: &str) {
        for c in text.chars() {
            assert!(!handle_key(app, KeyCode::Char(c)).unwrap());
        }
    }

    fn press(app: &mut App<InMemoryCollection>, code: KeyCode) {
        assert!(!handle_key(app, code).unwrap());
        app.sync();
    }

    fn add_via_keys(app: &mut App<InMemoryCollection>, text: &str) {
        press(app, KeyCode::Char('a'));
        type_text(app, text);
        press(app, KeyCode::Enter);
    }

    fn todo(text: &str, is_done: bool) -> Todo {
        Todo {
            id: TodoId::new(text),
            text: text.to_owned(),
            is_done,
        }
    }

    fn buffer_text(buffer: &Buffer) -> String {
        buffer.content.iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn done_items_are_struck_through_and_italic() {
        let style = item_style(&todo("done", true));
        assert!(style.add_modifier.contains(Modifier::CROSSED_OUT));
        assert!(style.add_modifier.contains(Modifier::ITALIC));
    }

    #[test]
    fn open_items_use_default_style() {
        assert_eq!(item_style(&todo("open", false)), Style::default());
    }

    #[test]
    fn style_ignores_text_and_id() {
        assert_eq!(
            item_style(&todo("a", true)),
            item_style(&todo("something else entirely", true))
        );
    }

    #[test]
    fn list_renders_every_row_with_its_style() {
        let todos = vec![todo("buy milk", false), todo("walk dog", true)];
        let mut terminal = Terminal::new(TestBackend::new(60, 6)).unwrap();
        terminal
            .draw(|f| f.render_widget(render_list(&todos), f.area()))
            .unwrap();

        let buffer = terminal.backend().buffer();
        let text = buffer_text(buffer);
        assert!(text.contains("buy milk"));
        assert!(text.contains("walk dog"));

        // row 1 is "buy milk", row 2 is "walk dog" (inside the border)
        assert!(!buffer[(1, 1)].modifier.contains(Modifier::CROSSED_OUT));
        assert!(buffer[(1, 2)].modifier.contains(Modifier::CROSSED_OUT));
        assert!(buffer[(1, 2)].modifier.contains(Modifier::ITALIC));
    }

    #[test]
    fn mistyped_email_keeps_sign_in_open() {
        let remote = InMemoryCollection::default();
        let (_dir, mut app) = signed_out_app(&remote, ErrorPolicy::Silent);
        type_text(&mut app, "bob@localhost");

        assert!(!handle_key(&mut app, KeyCode::Enter).unwrap());
        assert_eq!(app.screen, Screen::SignIn);
        assert!(app.status.as_deref().unwrap().contains("bob@localhost"));
        assert_eq!(remote.listener_count(), 0);
    }

    #[test]
    fn esc_on_sign_in_cancels_session() {
        let remote = InMemoryCollection::default();
        let (_dir, mut app) = signed_out_app(&remote, ErrorPolicy::Silent);
        let err = handle_key(&mut app, KeyCode::Esc).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AuthError>(),
            Some(AuthError::Cancelled)
        ));
    }

    #[test]
    fn add_keys_submit_text_including_empty() {
        let remote = InMemoryCollection::default();
        let (_dir, mut app) = signed_in_app(&remote, ErrorPolicy::Silent);

        add_via_keys(&mut app, "buy milk");
        add_via_keys(&mut app, "");

        let texts: Vec<&str> = app.todos.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["buy milk", ""]);
        assert_eq!(app.mode, InputMode::Normal);
    }

    #[test]
    fn esc_while_editing_adds_nothing() {
        let remote = InMemoryCollection::default();
        let (_dir, mut app) = signed_in_app(&remote, ErrorPolicy::Silent);
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "draft");
        press(&mut app, KeyCode::Esc);

        assert!(app.todos.is_empty());
        assert_eq!(app.mode, InputMode::Normal);
        assert!(app.input.is_empty());
    }

    #[test]
    fn enter_and_space_toggle_selected_row() {
        let remote = InMemoryCollection::default();
        let (_dir, mut app) = signed_in_app(&remote, ErrorPolicy::Silent);
        add_via_keys(&mut app, "walk dog");

        press(&mut app, KeyCode::Enter);
        assert!(app.todos[0].is_done);
        press(&mut app, KeyCode::Char(' '));
        assert!(!app.todos[0].is_done);
    }

    #[test]
    fn d_and_delete_remove_selected_row() {
        let remote = InMemoryCollection::default();
        let (_dir, mut app) = signed_in_app(&remote, ErrorPolicy::Silent);
        add_via_keys(&mut app, "one");
        add_via_keys(&mut app, "two");

        press(&mut app, KeyCode::Char('d'));
        assert_eq!(app.todos.len(), 1);
        assert_eq!(app.todos[0].text, "two");

        press(&mut app, KeyCode::Delete);
        assert!(app.todos.is_empty());
    }

    #[test]
    fn shift_l_signs_out() {
        let remote = InMemoryCollection::default();
        let (_dir, mut app) = signed_in_app(&remote, ErrorPolicy::Silent);
        add_via_keys(&mut app, "private");

        press(&mut app, KeyCode::Char('L'));
        assert_eq!(app.screen, Screen::SignIn);
        assert!(app.todos.is_empty());
        assert_eq!(remote.listener_count(), 0);
    }

    #[test]
    fn q_quits() {
        let remote = InMemoryCollection::default();
        let (_dir, mut app) = signed_in_app(&remote, ErrorPolicy::Silent);
        assert!(handle_key(&mut app, KeyCode::Char('q')).unwrap());
    }

    #[test]
    fn header_shows_stale_marker() {
        let remote = InMemoryCollection::default();
        let (_dir, mut app) = signed_in_app(&remote, ErrorPolicy::Surface);
        add_via_keys(&mut app, "kept");

        let uid = uid_for_email("alice@example.com");
        remote.push_error(uid.as_str(), "unavailable");
        app.sync();
        assert_eq!(app.todos.len(), 1);

        let mut terminal = Terminal::new(TestBackend::new(120, 3)).unwrap();
        terminal
            .draw(|f| f.render_widget(render_header(&app), f.area()))
            .unwrap();
        let text = buffer_text(terminal.backend().buffer());
        assert!(text.contains("stale: unavailable"));
        assert!(text.contains("alice@example.com"));
    }
}
