//! Key-to-note state machine.
//!
//! A computed note is either idle or sounding. Sounding notes struck while the
//! sustain flag was on are additionally tagged as sustained and get released
//! together when the flag goes off.

use std::collections::{BTreeSet, HashMap};

use log::debug;
use serde::Deserialize;

use crate::general::keymap::NoteMapper;
use crate::general::message::MidiMessage;
use crate::general::transpose::OffsetState;
use crate::io::sink::MidiSink;

pub const DEFAULT_VELOCITY: u8 = 127;

/// How `release` finds the note to stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReleasePolicy {
    /// Use the note computed when the key went down.
    #[default]
    Frozen,
    /// Recompute from the offsets in effect at release time. A transpose or
    /// shift change while a key is down leaves its note sounding until
    /// `all_stop`.
    Recompute,
}

#[derive(Debug, Clone)]
pub struct NoteTracker {
    mapper: NoteMapper,
    offsets: OffsetState,
    policy: ReleasePolicy,
    velocity: u8,
    sustain: bool,
    active: BTreeSet<i32>,
    sustained: BTreeSet<i32>,
    // physical key -> note it started, only used with ReleasePolicy::Frozen
    held: HashMap<char, i32>,
}

impl NoteTracker {
    pub fn new(mapper: NoteMapper, offsets: OffsetState, policy: ReleasePolicy) -> Self {
        Self {
            mapper,
            offsets,
            policy,
            velocity: DEFAULT_VELOCITY,
            sustain: false,
            active: BTreeSet::new(),
            sustained: BTreeSet::new(),
            held: HashMap::new(),
        }
    }

    /// Strike the note mapped to `symbol`. Returns whether a note-on was sent.
    pub fn press(&mut self, symbol: char, sink: &mut impl MidiSink) -> bool {
        let Some(base) = self.mapper.base_note(symbol) else {
            debug!("press of unmapped key {:?} ignored", symbol);
            return false;
        };
        let key = self.mapper.physical_key(symbol);
        if self.policy == ReleasePolicy::Frozen && self.held.contains_key(&key) {
            return false;
        }

        let note = self.offsets.compute_note(base);
        if self.policy == ReleasePolicy::Frozen {
            self.held.insert(key, note);
        }
        if !self.active.insert(note) {
            debug!("note {} already sounding", note);
            return false;
        }
        if self.sustain {
            self.sustained.insert(note);
        }
        sink.send(MidiMessage::NoteOn {
            note,
            velocity: self.velocity,
        });
        true
    }

    /// Let go of `symbol`. Returns whether a note-off was sent.
    pub fn release(&mut self, symbol: char, sink: &mut impl MidiSink) -> bool {
        let note = match self.policy {
            ReleasePolicy::Frozen => {
                let key = self.mapper.physical_key(symbol);
                match self.held.remove(&key) {
                    Some(note) => note,
                    None => return false,
                }
            }
            ReleasePolicy::Recompute => match self.mapper.base_note(symbol) {
                Some(base) => self.offsets.compute_note(base),
                None => return false,
            },
        };
        self.stop_note(note, sink)
    }

    /// Change the sustain flag. Turning it off stops every sustained note.
    /// Returns whether the flag changed.
    pub fn set_sustain(&mut self, on: bool, sink: &mut impl MidiSink) -> bool {
        if self.sustain == on {
            return false;
        }
        self.sustain = on;
        sink.send(MidiMessage::sustain(on));
        if !on {
            for note in std::mem::take(&mut self.sustained) {
                if self.active.remove(&note) {
                    sink.send(MidiMessage::NoteOff { note });
                }
            }
        }
        true
    }

    /// Stop everything that is sounding. Returns the number of notes stopped.
    pub fn all_stop(&mut self, sink: &mut impl MidiSink) -> usize {
        let stopped = std::mem::take(&mut self.active);
        for &note in &stopped {
            sink.send(MidiMessage::NoteOff { note });
        }
        self.sustained.clear();
        self.held.clear();
        stopped.len()
    }

    pub fn set_transpose(&mut self, delta: i32) -> i32 {
        self.offsets.set_transpose(delta)
    }

    pub fn set_shift(&mut self, held: bool) {
        self.offsets.set_shift(held);
    }

    /// Velocity for subsequent note-ons, kept within 1..=127.
    pub fn set_velocity(&mut self, velocity: u8) -> u8 {
        self.velocity = velocity.clamp(1, 127);
        self.velocity
    }

    fn stop_note(&mut self, note: i32, sink: &mut impl MidiSink) -> bool {
        if !self.active.remove(&note) {
            return false;
        }
        self.sustained.remove(&note);
        sink.send(MidiMessage::NoteOff { note });
        true
    }

    pub fn transpose(&self) -> i32 {
        self.offsets.transpose()
    }

    pub fn shift_held(&self) -> bool {
        self.offsets.shift_held()
    }

    pub fn sustain(&self) -> bool {
        self.sustain
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn is_sounding(&self, note: i32) -> bool {
        self.active.contains(&note)
    }

    pub fn is_sustained(&self, note: i32) -> bool {
        self.sustained.contains(&note)
    }

    pub fn active_notes(&self) -> impl Iterator<Item = i32> + '_ {
        self.active.iter().copied()
    }

    pub fn sustained_notes(&self) -> impl Iterator<Item = i32> + '_ {
        self.sustained.iter().copied()
    }
}

impl Default for NoteTracker {
    fn default() -> Self {
        Self::new(NoteMapper::default(), OffsetState::default(), ReleasePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::sink::RecordingSink;

    fn on(note: i32) -> MidiMessage {
        MidiMessage::NoteOn { note, velocity: DEFAULT_VELOCITY }
    }

    fn off(note: i32) -> MidiMessage {
        MidiMessage::NoteOff { note }
    }

    fn tracker(policy: ReleasePolicy) -> NoteTracker {
        NoteTracker::new(NoteMapper::default(), OffsetState::default(), policy)
    }

    #[test]
    fn press_then_release_pairs_up() {
        let mut t = NoteTracker::default();
        let mut sink = RecordingSink::new();
        assert!(t.press('t', &mut sink));
        assert!(t.release('t', &mut sink));
        assert_eq!(sink.take(), vec![on(60), off(60)]);
        assert_eq!(t.active_notes().count(), 0);
    }

    #[test]
    fn repeated_press_sends_one_note_on() {
        for policy in [ReleasePolicy::Frozen, ReleasePolicy::Recompute] {
            let mut t = tracker(policy);
            let mut sink = RecordingSink::new();
            t.press('T', &mut sink);
            t.press('T', &mut sink);
            t.press('t', &mut sink);
            assert_eq!(sink.take(), vec![on(60)], "{:?}", policy);
        }
    }

    #[test]
    fn release_without_press_is_silent() {
        for policy in [ReleasePolicy::Frozen, ReleasePolicy::Recompute] {
            let mut t = tracker(policy);
            let mut sink = RecordingSink::new();
            assert!(!t.release('T', &mut sink));
            assert!(sink.messages().is_empty());
        }
    }

    #[test]
    fn unmapped_keys_are_ignored() {
        let mut t = NoteTracker::default();
        let mut sink = RecordingSink::new();
        assert!(!t.press(';', &mut sink));
        assert!(!t.release(';', &mut sink));
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn shift_and_transpose_offset_new_notes() {
        let mut t = NoteTracker::default();
        let mut sink = RecordingSink::new();
        t.set_transpose(12);
        t.set_shift(true);
        t.press('1', &mut sink);
        assert_eq!(sink.take(), vec![on(36 + 12 + 1)]);
    }

    #[test]
    fn sustain_off_releases_sustained_notes() {
        let mut t = NoteTracker::default();
        let mut sink = RecordingSink::new();
        t.press('q', &mut sink);
        t.set_sustain(true, &mut sink);
        t.press('w', &mut sink);
        assert!(t.is_sustained(55));
        assert!(!t.is_sustained(53));
        t.set_sustain(false, &mut sink);
        assert_eq!(
            sink.take(),
            vec![on(53), MidiMessage::sustain(true), on(55), MidiMessage::sustain(false), off(55)]
        );
        assert!(t.is_sounding(53));
        assert_eq!(t.sustained_notes().count(), 0);
    }

    #[test]
    fn redundant_sustain_changes_send_nothing() {
        let mut t = NoteTracker::default();
        let mut sink = RecordingSink::new();
        assert!(!t.set_sustain(false, &mut sink));
        assert!(t.set_sustain(true, &mut sink));
        assert!(!t.set_sustain(true, &mut sink));
        assert_eq!(sink.take(), vec![MidiMessage::sustain(true)]);
    }

    #[test]
    fn key_up_of_sustained_note_is_immediate() {
        let mut t = NoteTracker::default();
        let mut sink = RecordingSink::new();
        t.set_sustain(true, &mut sink);
        t.press('e', &mut sink);
        t.release('e', &mut sink);
        t.set_sustain(false, &mut sink);
        assert_eq!(
            sink.take(),
            vec![MidiMessage::sustain(true), on(57), off(57), MidiMessage::sustain(false)]
        );
    }

    #[test]
    fn held_key_stays_quiet_after_sustain_release() {
        let mut t = NoteTracker::default();
        let mut sink = RecordingSink::new();
        t.set_sustain(true, &mut sink);
        t.press('r', &mut sink);
        t.set_sustain(false, &mut sink);
        sink.take();
        // auto-repeat of the key that is still down
        assert!(!t.press('r', &mut sink));
        assert!(!t.release('r', &mut sink));
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn aliased_keys_share_one_sounding_note() {
        let mut t = NoteTracker::default();
        let mut sink = RecordingSink::new();
        t.press('1', &mut sink);
        t.set_shift(true);
        // shifted spelling of the same key while it is down
        t.press('!', &mut sink);
        t.release('!', &mut sink);
        assert_eq!(sink.take(), vec![on(36), off(36)]);
    }

    #[test]
    fn all_stop_clears_everything_once() {
        let mut t = NoteTracker::default();
        let mut sink = RecordingSink::new();
        t.press('a', &mut sink);
        t.set_sustain(true, &mut sink);
        t.press('s', &mut sink);
        sink.take();
        assert_eq!(t.all_stop(&mut sink), 2);
        assert_eq!(sink.take(), vec![off(71), off(72)]);
        assert_eq!(t.all_stop(&mut sink), 0);
        assert!(sink.messages().is_empty());
        // a key whose release was lost can be struck again
        assert!(t.press('a', &mut sink));
    }

    #[test]
    fn velocity_is_clamped_and_applied() {
        let mut t = NoteTracker::default();
        let mut sink = RecordingSink::new();
        assert_eq!(t.set_velocity(0), 1);
        assert_eq!(t.set_velocity(200), 127);
        t.set_velocity(90);
        t.press('t', &mut sink);
        assert_eq!(sink.take(), vec![MidiMessage::NoteOn { note: 60, velocity: 90 }]);
    }
}
