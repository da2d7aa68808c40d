//! Turns terminal events into session commands.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, ModifierKeyCode};

use crate::general::keymap::normalize_symbol;
use crate::session::{Command, VELOCITY_STEP};

const DAMPER_KEY: char = ' ';

pub struct InputRouter {
    reports_release: bool,
    hold_timeout: Duration,
    shift: bool,
    // keys believed down when releases have to be inferred from silence
    pending: HashMap<char, Instant>,
}

impl InputRouter {
    /// `reports_release` is false when the terminal only delivers presses; key
    /// releases are then synthesized `hold_timeout` after the last press or
    /// auto-repeat of a key.
    pub fn new(reports_release: bool, hold_timeout: Duration) -> Self {
        Self {
            reports_release,
            hold_timeout,
            shift: false,
            pending: HashMap::new(),
        }
    }

    pub fn route(&mut self, event: &Event, now: Instant) -> Vec<Command> {
        match event {
            Event::Key(key) => self.route_key(key, now),
            Event::FocusLost => {
                self.pending.clear();
                let mut commands = Vec::new();
                if self.shift {
                    self.shift = false;
                    commands.push(Command::Shift(false));
                }
                commands.push(Command::AllStop);
                commands
            }
            _ => Vec::new(),
        }
    }

    /// Synthesized releases for keys that have gone quiet.
    pub fn expire(&mut self, now: Instant) -> Vec<Command> {
        let mut expired: Vec<char> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| *key)
            .collect();
        expired.sort_unstable();
        expired
            .into_iter()
            .map(|key| {
                self.pending.remove(&key);
                key_up(key)
            })
            .collect()
    }

    /// Earliest instant at which `expire` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    fn route_key(&mut self, key: &KeyEvent, now: Instant) -> Vec<Command> {
        let down = key.kind != KeyEventKind::Release;
        let first_down = key.kind == KeyEventKind::Press;

        // key releases under Ctrl still reach the note keys
        if down && key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') | KeyCode::Char('C') if first_down => vec![Command::Quit],
                _ => Vec::new(),
            };
        }

        match key.code {
            KeyCode::Esc if first_down => vec![Command::Quit],
            KeyCode::Modifier(ModifierKeyCode::LeftShift | ModifierKeyCode::RightShift) => {
                self.sync_shift(down).into_iter().collect()
            }
            KeyCode::Up if down => vec![Command::Transpose(1)],
            KeyCode::Down if down => vec![Command::Transpose(-1)],
            KeyCode::Left if down => vec![Command::Velocity(-VELOCITY_STEP)],
            KeyCode::Right if down => vec![Command::Velocity(VELOCITY_STEP)],
            KeyCode::Tab if first_down => vec![Command::ToggleSustain],
            KeyCode::Backspace if first_down => vec![Command::AllStop],
            KeyCode::Char('?') if first_down => vec![Command::Help],
            KeyCode::Char(c) => self.route_char(normalize_symbol(c), key, now),
            _ => Vec::new(),
        }
    }

    fn route_char(&mut self, symbol: char, key: &KeyEvent, now: Instant) -> Vec<Command> {
        if !self.reports_release {
            // every auto-repeat shows up as a fresh press
            if key.kind == KeyEventKind::Release {
                return Vec::new();
            }
            let deadline = now + self.hold_timeout;
            if self.pending.insert(symbol, deadline).is_some() {
                return Vec::new();
            }
            let mut commands: Vec<Command> = self.shift_from(key).into_iter().collect();
            commands.push(key_down(symbol));
            return commands;
        }

        match key.kind {
            KeyEventKind::Press => {
                let mut commands: Vec<Command> = self.shift_from(key).into_iter().collect();
                commands.push(key_down(symbol));
                commands
            }
            KeyEventKind::Release => vec![key_up(symbol)],
            KeyEventKind::Repeat => Vec::new(),
        }
    }

    // The space bar has no modifier meaning, so leave shift alone for it.
    fn shift_from(&mut self, key: &KeyEvent) -> Option<Command> {
        if key.code == KeyCode::Char(DAMPER_KEY) {
            return None;
        }
        self.sync_shift(key.modifiers.contains(KeyModifiers::SHIFT))
    }

    fn sync_shift(&mut self, held: bool) -> Option<Command> {
        if self.shift == held {
            return None;
        }
        self.shift = held;
        Some(Command::Shift(held))
    }
}

// Holding the damper key lifts sustain; letting go puts it back.
fn key_down(symbol: char) -> Command {
    if symbol == DAMPER_KEY {
        Command::Sustain(false)
    } else {
        Command::Press(symbol)
    }
}

fn key_up(symbol: char) -> Command {
    if symbol == DAMPER_KEY {
        Command::Sustain(true)
    } else {
        Command::Release(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: Vec<Command> = Vec::new();

    fn key(code: KeyCode, modifiers: KeyModifiers, kind: KeyEventKind) -> Event {
        Event::Key(KeyEvent::new_with_kind(code, modifiers, kind))
    }

    fn press(c: char) -> Event {
        key(KeyCode::Char(c), KeyModifiers::NONE, KeyEventKind::Press)
    }

    fn release(c: char) -> Event {
        key(KeyCode::Char(c), KeyModifiers::NONE, KeyEventKind::Release)
    }

    #[test]
    fn note_keys_press_and_release() {
        let mut router = InputRouter::new(true, Duration::from_millis(500));
        let now = Instant::now();
        assert_eq!(router.route(&press('q'), now), vec![Command::Press('Q')]);
        assert_eq!(
            router.route(&key(KeyCode::Char('q'), KeyModifiers::NONE, KeyEventKind::Repeat), now),
            NONE
        );
        assert_eq!(router.route(&release('q'), now), vec![Command::Release('Q')]);
    }

    #[test]
    fn shift_modifier_is_synced_before_the_press() {
        let mut router = InputRouter::new(true, Duration::from_millis(500));
        let now = Instant::now();
        let shifted = key(KeyCode::Char('!'), KeyModifiers::SHIFT, KeyEventKind::Press);
        assert_eq!(
            router.route(&shifted, now),
            vec![Command::Shift(true), Command::Press('!')]
        );
        assert_eq!(
            router.route(&press('2'), now),
            vec![Command::Shift(false), Command::Press('2')]
        );
    }

    #[test]
    fn bare_shift_key_events_toggle_shift() {
        let mut router = InputRouter::new(true, Duration::from_millis(500));
        let now = Instant::now();
        let shift = KeyCode::Modifier(ModifierKeyCode::LeftShift);
        assert_eq!(
            router.route(&key(shift, KeyModifiers::SHIFT, KeyEventKind::Press), now),
            vec![Command::Shift(true)]
        );
        assert_eq!(
            router.route(&key(shift, KeyModifiers::SHIFT, KeyEventKind::Repeat), now),
            NONE
        );
        assert_eq!(
            router.route(&key(shift, KeyModifiers::NONE, KeyEventKind::Release), now),
            vec![Command::Shift(false)]
        );
    }

    #[test]
    fn space_lifts_sustain_while_held() {
        let mut router = InputRouter::new(true, Duration::from_millis(500));
        let now = Instant::now();
        assert_eq!(router.route(&press(' '), now), vec![Command::Sustain(false)]);
        assert_eq!(router.route(&release(' '), now), vec![Command::Sustain(true)]);
    }

    #[test]
    fn control_keys() {
        let mut router = InputRouter::new(true, Duration::from_millis(500));
        let now = Instant::now();
        let down = |code| key(code, KeyModifiers::NONE, KeyEventKind::Press);
        assert_eq!(router.route(&down(KeyCode::Up), now), vec![Command::Transpose(1)]);
        assert_eq!(router.route(&down(KeyCode::Down), now), vec![Command::Transpose(-1)]);
        assert_eq!(router.route(&down(KeyCode::Tab), now), vec![Command::ToggleSustain]);
        assert_eq!(router.route(&down(KeyCode::Backspace), now), vec![Command::AllStop]);
        assert_eq!(router.route(&down(KeyCode::Esc), now), vec![Command::Quit]);
        assert_eq!(
            router.route(&key(KeyCode::Char('c'), KeyModifiers::CONTROL, KeyEventKind::Press), now),
            vec![Command::Quit]
        );
    }

    #[test]
    fn release_with_ctrl_held_still_stops_note() {
        let mut router = InputRouter::new(true, Duration::from_millis(500));
        let now = Instant::now();
        assert_eq!(router.route(&press('q'), now), vec![Command::Press('Q')]);
        let ctrl = KeyModifiers::CONTROL;
        assert_eq!(
            router.route(&key(KeyCode::Char('q'), ctrl, KeyEventKind::Press), now),
            NONE
        );
        assert_eq!(
            router.route(&key(KeyCode::Char('q'), ctrl, KeyEventKind::Release), now),
            vec![Command::Release('Q')]
        );
    }

    #[test]
    fn focus_loss_stops_everything() {
        let mut router = InputRouter::new(true, Duration::from_millis(500));
        let now = Instant::now();
        router.route(&key(KeyCode::Char('Q'), KeyModifiers::SHIFT, KeyEventKind::Press), now);
        assert_eq!(
            router.route(&Event::FocusLost, now),
            vec![Command::Shift(false), Command::AllStop]
        );
        assert_eq!(router.route(&Event::FocusLost, now), vec![Command::AllStop]);
    }

    #[test]
    fn without_release_reports_keys_time_out() {
        let hold = Duration::from_millis(500);
        let mut router = InputRouter::new(false, hold);
        let start = Instant::now();
        assert_eq!(router.route(&press('t'), start), vec![Command::Press('T')]);
        // auto-repeat keeps the note alive
        let repeat_at = start + Duration::from_millis(400);
        assert_eq!(router.route(&press('t'), repeat_at), NONE);
        assert_eq!(router.expire(start + hold), NONE);
        assert_eq!(router.next_deadline(), Some(repeat_at + hold));
        assert_eq!(router.expire(repeat_at + hold), vec![Command::Release('T')]);
        assert_eq!(router.next_deadline(), None);
    }

    #[test]
    fn timed_out_space_restores_sustain() {
        let hold = Duration::from_millis(500);
        let mut router = InputRouter::new(false, hold);
        let start = Instant::now();
        assert_eq!(router.route(&press(' '), start), vec![Command::Sustain(false)]);
        assert_eq!(router.expire(start + hold), vec![Command::Sustain(true)]);
    }
}
