// Local keyboard control: WASD/arrows jog, Q/Esc/Ctrl-C quit
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tracing::{info, warn};

use crate::control::{lock, CommandArbiter};
use crate::messages::{Command, Direction};

// Poll timeout, so the thread notices shutdown
const POLL: Duration = Duration::from_millis(50);

/// Map a key-down event to a command
pub fn command_for_key(key: &KeyEvent) -> Option<Command> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Command::Terminate),
        KeyCode::Char('w') | KeyCode::Up => Some(Command::Jog(Direction::Up)),
        KeyCode::Char('s') | KeyCode::Down => Some(Command::Jog(Direction::Down)),
        KeyCode::Char('a') | KeyCode::Left => Some(Command::Jog(Direction::Left)),
        KeyCode::Char('d') | KeyCode::Right => Some(Command::Jog(Direction::Right)),
        KeyCode::Char('q') | KeyCode::Esc => Some(Command::Terminate),
        _ => None,
    }
}

/// Keyboard reader thread. The terminal stays in raw mode until `stop`.
pub struct KeyboardInput {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl KeyboardInput {
    pub fn spawn(arbiter: CommandArbiter) -> io::Result<Self> {
        enable_raw_mode()?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("keyboard".into())
            .spawn(move || read_keys(arbiter, stop_flag));

        match handle {
            Ok(handle) => {
                info!("Keyboard control: W/A/S/D or arrows to jog, Q or Esc to quit");
                Ok(Self { stop, handle })
            }
            Err(e) => {
                let _ = disable_raw_mode();
                Err(e)
            }
        }
    }

    /// Stop the reader thread and restore the terminal
    pub fn stop(self) -> io::Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        if self.handle.join().is_err() {
            warn!("Keyboard thread panicked");
        }
        disable_raw_mode()
    }
}

fn read_keys(arbiter: CommandArbiter, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) && !lock(arbiter.state()).terminate_requested() {
        match event::poll(POLL) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) => {
                    if let Some(command) = command_for_key(&key) {
                        arbiter.dispatch(command);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Keyboard read failed: {}", e);
                    break;
                }
            },
            Ok(false) => {}
            Err(e) => {
                warn!("Keyboard poll failed: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_movement_keys() {
        assert_eq!(command_for_key(&press(KeyCode::Char('w'))), Some(Command::Jog(Direction::Up)));
        assert_eq!(command_for_key(&press(KeyCode::Up)), Some(Command::Jog(Direction::Up)));
        assert_eq!(command_for_key(&press(KeyCode::Char('s'))), Some(Command::Jog(Direction::Down)));
        assert_eq!(command_for_key(&press(KeyCode::Left)), Some(Command::Jog(Direction::Left)));
        assert_eq!(command_for_key(&press(KeyCode::Char('d'))), Some(Command::Jog(Direction::Right)));
        assert_eq!(command_for_key(&press(KeyCode::Char('x'))), None);
    }

    #[test]
    fn test_quit_keys() {
        assert_eq!(command_for_key(&press(KeyCode::Esc)), Some(Command::Terminate));
        assert_eq!(command_for_key(&press(KeyCode::Char('q'))), Some(Command::Terminate));
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(command_for_key(&ctrl_c), Some(Command::Terminate));
        assert_eq!(command_for_key(&press(KeyCode::Char('c'))), None);
    }

    #[test]
    fn test_release_is_ignored() {
        let release = KeyEvent {
            code: KeyCode::Left,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        };
        assert_eq!(command_for_key(&release), None);
    }
}
