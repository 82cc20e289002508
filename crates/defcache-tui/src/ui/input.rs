//! Keyboard input handling for the TUI.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, AppState};

/// Handle a key press. Returns true if the app should quit.
pub fn handle_input(app: &mut App, key: KeyEvent) -> bool {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.state = AppState::Quitting;
        return true;
    }

    // Handle help overlay
    if matches!(app.state, AppState::ShowingHelp) {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
            app.state = AppState::Normal;
        }
        return false;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            app.state = AppState::Quitting;
            return true;
        }
        KeyCode::Char('?') => app.state = AppState::ShowingHelp,
        KeyCode::Left | KeyCode::Char('h') => app.move_left(),
        KeyCode::Right | KeyCode::Char('l') => app.move_right(),
        KeyCode::Up | KeyCode::Char('k') => app.move_up(),
        KeyCode::Down | KeyCode::Char('j') => app.move_down(),
        KeyCode::PageUp => app.page_up(),
        KeyCode::PageDown => app.page_down(),
        KeyCode::Home | KeyCode::Char('g') => app.select_first(),
        KeyCode::End | KeyCode::Char('G') => app.select_last(),
        KeyCode::Char(']') => app.next_table(),
        KeyCode::Char('[') => app.prev_table(),
        _ => {}
    }

    // Any navigation clears a stale status message
    app.status_message = None;
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use defcache_core::{Config, DefinitionStore};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app() -> App {
        App::new(Config::default(), DefinitionStore::open_in_memory().unwrap())
    }

    #[test]
    fn test_quit_keys() {
        let mut app = app();
        assert!(handle_input(&mut app, key(KeyCode::Char('q'))));
        assert_eq!(app.state, AppState::Quitting);

        let mut app = self::app();
        assert!(handle_input(
            &mut app,
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)
        ));
    }

    #[test]
    fn test_help_toggle_swallows_keys() {
        let mut app = app();
        assert!(!handle_input(&mut app, key(KeyCode::Char('?'))));
        assert_eq!(app.state, AppState::ShowingHelp);

        // q closes help instead of quitting
        assert!(!handle_input(&mut app, key(KeyCode::Char('q'))));
        assert_eq!(app.state, AppState::Normal);
    }

    #[test]
    fn test_navigation_clears_status() {
        let mut app = app();
        app.status_message = Some("1 table(s) failed to load: B".to_string());
        handle_input(&mut app, key(KeyCode::Down));
        assert!(app.status_message.is_none());
    }
}
