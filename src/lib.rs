//! Play an external MIDI device from the computer keyboard.
//!
//! Keys map to notes through a [`general::keymap::NoteMapper`], transpose and
//! shift come from [`general::transpose::OffsetState`], and
//! [`general::tracker::NoteTracker`] decides which note-on, note-off and
//! sustain messages reach the [`io::sink::MidiSink`].

pub mod config;
pub mod error;
pub mod general;
pub mod io;
pub mod remote;
pub mod router;
pub mod session;

pub use error::{Error, Result};
