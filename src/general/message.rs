/// Controller number of the damper (sustain) pedal.
pub const SUSTAIN_CONTROLLER: u8 = 64;
pub const SUSTAIN_ON: u8 = 127;
pub const SUSTAIN_OFF: u8 = 0;

const NOTE_OFF_STATUS: u8 = 0x80;
const NOTE_ON_STATUS: u8 = 0x90;
const CONTROL_CHANGE_STATUS: u8 = 0xB0;

/// Outbound message produced by the note tracker.
///
/// Note numbers are carried unclamped; `to_bytes` refuses anything that does
/// not fit the 7-bit data range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { note: i32, velocity: u8 },
    NoteOff { note: i32 },
    ControlChange { controller: u8, value: u8 },
}

impl MidiMessage {
    pub fn sustain(on: bool) -> Self {
        MidiMessage::ControlChange {
            controller: SUSTAIN_CONTROLLER,
            value: if on { SUSTAIN_ON } else { SUSTAIN_OFF },
        }
    }

    /// Encode as a three byte channel voice message on `channel` (0-15).
    pub fn to_bytes(&self, channel: u8) -> Option<[u8; 3]> {
        let channel = channel & 0x0F;
        match *self {
            MidiMessage::NoteOn { note, velocity } => Some([
                NOTE_ON_STATUS | channel,
                data_byte(note)?,
                velocity & 0x7F,
            ]),
            MidiMessage::NoteOff { note } => Some([NOTE_OFF_STATUS | channel, data_byte(note)?, 0]),
            MidiMessage::ControlChange { controller, value } => Some([
                CONTROL_CHANGE_STATUS | channel,
                controller & 0x7F,
                value & 0x7F,
            ]),
        }
    }
}

fn data_byte(note: i32) -> Option<u8> {
    u8::try_from(note).ok().filter(|n| *n <= 127)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_nibbles_follow_midi() {
        let on = MidiMessage::NoteOn { note: 60, velocity: 127 };
        let off = MidiMessage::NoteOff { note: 60 };
        assert_eq!(on.to_bytes(0), Some([0x90, 60, 127]));
        assert_eq!(off.to_bytes(0), Some([0x80, 60, 0]));
        assert_eq!(MidiMessage::sustain(true).to_bytes(0), Some([0xB0, 64, 127]));
        assert_eq!(MidiMessage::sustain(false).to_bytes(0), Some([0xB0, 64, 0]));
    }

    #[test]
    fn channel_is_or_ed_into_status() {
        let on = MidiMessage::NoteOn { note: 36, velocity: 100 };
        assert_eq!(on.to_bytes(9), Some([0x99, 36, 100]));
        assert_eq!(MidiMessage::sustain(true).to_bytes(15), Some([0xBF, 64, 127]));
    }

    #[test]
    fn out_of_range_notes_do_not_encode() {
        assert_eq!(MidiMessage::NoteOn { note: 128, velocity: 1 }.to_bytes(0), None);
        assert_eq!(MidiMessage::NoteOff { note: -1 }.to_bytes(0), None);
        assert_eq!(MidiMessage::NoteOff { note: 127 }.to_bytes(0), Some([0x80, 127, 0]));
    }
}
