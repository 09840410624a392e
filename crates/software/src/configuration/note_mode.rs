/// The note mode byte of a layer.
///
/// The high bits select the behavior family (hold, cut, shuffle) and the low bits a variant of it. The byte is kept
/// as-is so that it reads back exactly as written.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NoteMode(pub u8);

impl NoteMode {
    /// Notes end when their key is released.
    pub const NORMAL: NoteMode = NoteMode(0x00);
    /// Notes may outlive their key; see [`NoteMode::holds`].
    pub const HOLD: NoteMode = NoteMode(0x40);
    /// Notes are cut short.
    pub const CUT: NoteMode = NoteMode(0x20);
    /// Notes are echoed an octave up after they end.
    pub const SHUFFLE: NoteMode = NoteMode(0x10);
    /// Hold each note until the next one starts.
    pub const HOLD_TO_NEXT: NoteMode = NoteMode(0x40 | 1);
    /// Hold each note for half of the note length.
    pub const HOLD_1_2: NoteMode = NoteMode(0x40 | 2);
    /// Hold each note for a quarter of the note length.
    pub const HOLD_1_4: NoteMode = NoteMode(0x40 | 4);
    /// Cut each note after a quarter of the note length.
    pub const CUT_1_4: NoteMode = NoteMode(0x20 | 2);

    /// Returns `true` if the HOLD bit is set.
    ///
    /// A held note whose hold counter has not yet run out ignores its Note Off.
    pub fn holds(self) -> bool {
        self.0 & Self::HOLD.0 != 0
    }
}

impl From<u8> for NoteMode {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<NoteMode> for u8 {
    fn from(mode: NoteMode) -> Self {
        mode.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds() {
        assert!(NoteMode::HOLD.holds());
        assert!(NoteMode::HOLD_1_4.holds());
        assert!(!NoteMode::NORMAL.holds());
        assert!(!NoteMode::CUT_1_4.holds());
        assert!(!NoteMode::SHUFFLE.holds());
    }
}
