use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

const WHEEL_STEP: u16 = 3;

pub async fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::ScrollUp => app.scroll_up(WHEEL_STEP),
        AppEvent::ScrollDown => app.scroll_down(WHEEL_STEP),
        AppEvent::Resize => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
    }

    // Every event is a chance to pick up a finished query.
    app.poll_query_task().await;
}

pub fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('i') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
        }

        // Suggestion shortcuts, numbered from 1
        KeyCode::Char(c @ '1'..='9') => {
            let idx = c as usize - '1' as usize;
            if app.session.apply_suggestion(idx) {
                app.input_mode = InputMode::Editing;
            }
        }

        KeyCode::Char('s') => app.toggle_sources(),

        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::PageDown => app.scroll_down(app.page_size()),
        KeyCode::PageUp => app.scroll_up(app.page_size()),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_down(app.page_size());
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_up(app.page_size());
        }

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.submit();
        }
        KeyCode::Backspace => app.session.backspace(),
        KeyCode::Delete => app.session.delete(),
        KeyCode::Left => app.session.move_left(),
        KeyCode::Right => app.session.move_right(),
        KeyCode::Home => app.session.move_home(),
        KeyCode::End => app.session.move_end(),
        KeyCode::PageDown => app.scroll_down(app.page_size()),
        KeyCode::PageUp => app.scroll_up(app.page_size()),
        KeyCode::Char(c) => app.session.insert_char(c),
        _ => {}
    }
}
