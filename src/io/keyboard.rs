use std::io::{self, stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, DisableFocusChange, EnableFocusChange, Event, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement};
use log::{info, warn};

use crate::error::Result;
use crate::router::InputRouter;
use crate::session::Command;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Raw-mode terminal. Restores the terminal when dropped.
pub struct Terminal {
    keyboard_enhancement_enabled: bool,
}

impl Terminal {
    /// Enter raw mode and ask for key release and focus reporting.
    pub fn start() -> Result<Self> {
        enable_raw_mode()?;

        // Check support before pushing flags, unsupported terminals print garbage
        let supports_enhancement = matches!(supports_keyboard_enhancement(), Ok(true));
        let keyboard_enhancement_enabled = supports_enhancement
            && execute!(
                stdout(),
                PushKeyboardEnhancementFlags(
                    KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                        | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
                        | KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES
                )
            )
            .is_ok();

        if let Err(err) = execute!(stdout(), EnableFocusChange) {
            warn!("focus reporting unavailable: {}", err);
        }
        info!(
            "terminal started (key release reporting: {})",
            keyboard_enhancement_enabled
        );
        Ok(Self {
            keyboard_enhancement_enabled,
        })
    }

    pub fn reports_release(&self) -> bool {
        self.keyboard_enhancement_enabled
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if self.keyboard_enhancement_enabled {
            let _ = execute!(stdout(), PopKeyboardEnhancementFlags);
        }
        let _ = execute!(stdout(), DisableFocusChange);
        let _ = disable_raw_mode();
    }
}

/// Spawn a thread that reads terminal events, routes them and sends the
/// resulting commands to `tx`. Stops on `exit` or when the receiver is gone.
pub fn spawn_keyboard_reader(
    router: InputRouter,
    tx: Sender<Command>,
    exit: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || pump_events(router, next_terminal_event, &tx, &exit))
}

fn next_terminal_event(timeout: Duration) -> io::Result<Option<Event>> {
    if event::poll(timeout)? {
        event::read().map(Some)
    } else {
        Ok(None)
    }
}

// Any terminal error ends the session with Quit.
fn pump_events<F>(
    mut router: InputRouter,
    mut next_event: F,
    tx: &Sender<Command>,
    exit: &AtomicBool,
) where
    F: FnMut(Duration) -> io::Result<Option<Event>>,
{
    while !exit.load(Ordering::SeqCst) {
        let now = Instant::now();
        let timeout = router
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now).min(POLL_INTERVAL))
            .unwrap_or(POLL_INTERVAL);

        let mut commands = Vec::new();
        match next_event(timeout) {
            Ok(Some(ev)) => commands.extend(router.route(&ev, Instant::now())),
            Ok(None) => {}
            Err(err) => {
                warn!("terminal input error: {}", err);
                let _ = tx.send(Command::Quit);
                return;
            }
        }
        commands.extend(router.expire(Instant::now()));

        for command in commands {
            if tx.send(command).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
    use std::sync::mpsc::channel;

    fn key(c: char, kind: KeyEventKind) -> Event {
        Event::Key(KeyEvent::new_with_kind(KeyCode::Char(c), KeyModifiers::NONE, kind))
    }

    #[test]
    fn read_error_quits_instead_of_spinning() {
        let (tx, rx) = channel();
        let exit = AtomicBool::new(false);
        let mut events = vec![
            Ok(Some(key('t', KeyEventKind::Press))),
            Err(io::Error::new(io::ErrorKind::Other, "read failed")),
        ]
        .into_iter();
        let mut calls = 0;
        pump_events(
            InputRouter::new(true, Duration::from_millis(500)),
            |_| {
                calls += 1;
                events.next().unwrap_or(Ok(None))
            },
            &tx,
            &exit,
        );
        drop(tx);
        assert_eq!(calls, 2);
        assert_eq!(
            rx.iter().collect::<Vec<_>>(),
            vec![Command::Press('T'), Command::Quit]
        );
    }

    #[test]
    fn exit_flag_stops_the_loop() {
        let (tx, rx) = channel();
        let exit = AtomicBool::new(false);
        pump_events(
            InputRouter::new(true, Duration::from_millis(500)),
            |_| {
                exit.store(true, Ordering::SeqCst);
                Ok(Some(key('t', KeyEventKind::Press)))
            },
            &tx,
            &exit,
        );
        drop(tx);
        assert_eq!(rx.iter().collect::<Vec<_>>(), vec![Command::Press('T')]);
    }
}
