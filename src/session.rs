//! The loop that owns the note tracker.
//!
//! Keyboard and remote listeners run on their own threads and send
//! [`Command`]s here; each one is applied to completion before the next is
//! received, so the tracker is never shared.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use log::{debug, info};

use crate::general::check;
use crate::general::tracker::NoteTracker;
use crate::io::sink::MidiSink;

/// Step used by the velocity keys.
pub const VELOCITY_STEP: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Press(char),
    Release(char),
    Shift(bool),
    /// Relative transpose change in semitones.
    Transpose(i32),
    /// Absolute transpose, as sent by remote controls.
    SetTranspose(i32),
    Sustain(bool),
    ToggleSustain,
    /// Relative velocity change.
    Velocity(i32),
    AllStop,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Read-only mirror of the live controls for threads that report state.
#[derive(Debug, Default)]
pub struct SharedStatus {
    transpose: AtomicI32,
    sustain: AtomicBool,
}

impl SharedStatus {
    pub fn transpose(&self) -> i32 {
        self.transpose.load(Ordering::SeqCst)
    }

    pub fn sustain(&self) -> bool {
        self.sustain.load(Ordering::SeqCst)
    }

    fn publish(&self, tracker: &NoteTracker) {
        self.transpose.store(tracker.transpose(), Ordering::SeqCst);
        self.sustain.store(tracker.sustain(), Ordering::SeqCst);
    }
}

pub struct Session<S> {
    tracker: NoteTracker,
    sink: S,
    status: Arc<SharedStatus>,
    echo: bool,
}

impl<S: MidiSink> Session<S> {
    pub fn new(tracker: NoteTracker, sink: S) -> Self {
        let status = Arc::new(SharedStatus::default());
        status.publish(&tracker);
        Self {
            tracker,
            sink,
            status,
            echo: false,
        }
    }

    /// Print a status line on the terminal whenever a control changes.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn status(&self) -> Arc<SharedStatus> {
        Arc::clone(&self.status)
    }

    pub fn tracker(&self) -> &NoteTracker {
        &self.tracker
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn apply(&mut self, command: Command) -> Flow {
        debug!("{:?}", command);
        let tracker = &mut self.tracker;
        let sink = &mut self.sink;
        let controls_changed = match command {
            Command::Press(symbol) => {
                tracker.press(symbol, sink);
                false
            }
            Command::Release(symbol) => {
                tracker.release(symbol, sink);
                false
            }
            Command::Shift(held) => {
                tracker.set_shift(held);
                false
            }
            Command::Transpose(delta) => {
                tracker.set_transpose(delta);
                delta != 0
            }
            Command::SetTranspose(value) => {
                let delta = value.saturating_sub(tracker.transpose());
                tracker.set_transpose(delta);
                delta != 0
            }
            Command::Sustain(on) => tracker.set_sustain(on, sink),
            Command::ToggleSustain => {
                let on = !tracker.sustain();
                tracker.set_sustain(on, sink)
            }
            Command::Velocity(delta) => {
                let target = (tracker.velocity() as i32 + delta).clamp(1, 127) as u8;
                let before = tracker.velocity();
                tracker.set_velocity(target) != before
            }
            Command::AllStop => {
                let stopped = tracker.all_stop(sink);
                if stopped > 0 {
                    info!("stopped {} sounding notes", stopped);
                }
                false
            }
            Command::Help => {
                if self.echo {
                    check::print_key_help();
                }
                false
            }
            Command::Quit => return Flow::Quit,
        };

        if controls_changed {
            self.status.publish(&self.tracker);
            if self.echo {
                check::print_status(
                    self.tracker.transpose(),
                    self.tracker.sustain(),
                    self.tracker.velocity(),
                );
            }
        }
        Flow::Continue
    }

    /// Apply commands until `Quit` arrives or every sender is gone, then stop
    /// whatever is still sounding.
    pub fn run(&mut self, rx: &Receiver<Command>) {
        for command in rx.iter() {
            if self.apply(command) == Flow::Quit {
                break;
            }
        }
        let stopped = self.tracker.all_stop(&mut self.sink);
        info!("session finished, {} notes stopped on exit", stopped);
    }
}
