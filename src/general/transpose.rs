/// Transpose and shift offsets applied to every newly struck note.
///
/// Neither value is bounded here; a computed note may fall outside the
/// MIDI range and it is up to the sink to refuse it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OffsetState {
    transpose: i32,
    shift_held: bool,
}

impl OffsetState {
    pub fn new(initial_transpose: i32) -> Self {
        Self {
            transpose: initial_transpose,
            shift_held: false,
        }
    }

    /// Add `delta` semitones to the current transpose and return the new value.
    pub fn set_transpose(&mut self, delta: i32) -> i32 {
        self.transpose = self.transpose.saturating_add(delta);
        self.transpose
    }

    pub fn set_shift(&mut self, held: bool) {
        self.shift_held = held;
    }

    pub fn transpose(&self) -> i32 {
        self.transpose
    }

    pub fn shift_held(&self) -> bool {
        self.shift_held
    }

    /// Offset `base_note` by the transpose and, while shift is held, one semitone.
    pub fn compute_note(&self, base_note: u8) -> i32 {
        base_note as i32 + self.transpose + i32::from(self.shift_held)
    }
}
