use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use counsel_core::{Mode, Template};
use crate::app::{App, BackendHealth, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Reply { ticket, outcome } => app.on_reply(ticket, outcome),
        AppEvent::CopyExpired(feedback) => app.session.expire_copy_feedback(feedback),
        AppEvent::Health(ok) => {
            app.backend_health = if ok {
                BackendHealth::Healthy
            } else {
                BackendHealth::Unreachable
            };
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => {
                app.should_quit = true;
                return;
            }
            KeyCode::Char('s') => {
                app.submit();
                return;
            }
            _ => {}
        }
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Tab => app.toggle_mode(),
        KeyCode::Char('i') => {
            app.input_mode = InputMode::Editing;
            // Cursor at end of existing text
            let (buffer, cursor) = active_buffer(app);
            *cursor = buffer.chars().count();
        }

        // Transcript (Chat only)
        KeyCode::Char('j') | KeyCode::Down if app.session.mode() == Mode::Chat => {
            app.select_next_turn();
        }
        KeyCode::Char('k') | KeyCode::Up if app.session.mode() == Mode::Chat => {
            app.select_prev_turn();
        }
        KeyCode::PageDown => app.scroll_down(10),
        KeyCode::PageUp => app.scroll_up(10),
        KeyCode::Char('y') if app.session.mode() == Mode::Chat => app.copy_selected(),
        KeyCode::Char('e') if app.session.mode() == Mode::Chat => app.export_selected(),

        // Template picker (Draft only)
        KeyCode::Char('l') | KeyCode::Right if app.session.mode() == Mode::Draft => {
            app.next_template();
        }
        KeyCode::Char('h') | KeyCode::Left if app.session.mode() == Mode::Draft => {
            app.prev_template();
        }
        KeyCode::Char(c @ '1'..='3') if app.session.mode() == Mode::Draft => {
            let idx = (c as usize) - ('1' as usize);
            if let Some(&template) = Template::all().get(idx) {
                app.select_template(template);
            }
        }

        KeyCode::Enter if app.session.mode() == Mode::Draft => app.submit(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Tab => app.toggle_mode(),
        KeyCode::Enter => match app.session.mode() {
            Mode::Chat => app.submit(),
            Mode::Draft => insert_char(app, '\n'),
        },
        KeyCode::Backspace => {
            let (buffer, cursor) = active_buffer(app);
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(buffer, *cursor);
                buffer.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let (buffer, cursor) = active_buffer(app);
            if *cursor < buffer.chars().count() {
                let byte_pos = char_to_byte_index(buffer, *cursor);
                buffer.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            let (_, cursor) = active_buffer(app);
            *cursor = cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let (buffer, cursor) = active_buffer(app);
            *cursor = (*cursor + 1).min(buffer.chars().count());
        }
        KeyCode::Home => {
            let (_, cursor) = active_buffer(app);
            *cursor = 0;
        }
        KeyCode::End => {
            let (buffer, cursor) = active_buffer(app);
            *cursor = buffer.chars().count();
        }
        KeyCode::Char(c) => insert_char(app, c),
        _ => {}
    }
}

/// Buffer and cursor for the active mode
fn active_buffer(app: &mut App) -> (&mut String, &mut usize) {
    match app.session.mode() {
        Mode::Chat => (app.session.chat_input_mut(), &mut app.chat_cursor),
        Mode::Draft => (app.session.draft_facts_mut(), &mut app.facts_cursor),
    }
}

fn insert_char(app: &mut App, c: char) {
    let (buffer, cursor) = active_buffer(app);
    let byte_pos = char_to_byte_index(buffer, *cursor);
    buffer.insert(byte_pos, c);
    *cursor += 1;
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_transcript = app
        .transcript_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);

    if !in_transcript {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}
