//! Provides a struct [`SoundingNotes`] for tracking which notes a layer has started on the attached instrument.
//!
//! A layer transposes what it forwards, and its transposition may change while keys are still held. Each started
//! note therefore records the incoming note that triggered it, so that the matching Note Off ends the note that is
//! actually sounding rather than whatever the current transposition would produce.

use wmidi::{Note, U7};

use crate::configuration::NoteMode;

const NOTE_COUNT: usize = 128;

/// Notes a layer has started, indexed by note number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoundingNotes {
    /// Bit `n` is set while note `n` is sounding.
    playing: u128,
    /// Maps an incoming note to the transposed note it started.
    origin: [Option<Note>; NOTE_COUNT],
    /// Ticks a held note must still sound before its Note Off is honored.
    hold_ticks: [u8; NOTE_COUNT],
}

impl Default for SoundingNotes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SoundingNotes {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "SoundingNotes {{ playing: [");
        for (i, note) in self.iter().enumerate() {
            if i == 0 {
                defmt::write!(fmt, " ");
            } else {
                defmt::write!(fmt, ", ");
            }
            defmt::write!(fmt, "{} ({})", note.to_str(), note as u8);
        }
        defmt::write!(fmt, " ] }}");
    }
}

impl SoundingNotes {
    /// Construct an empty `SoundingNotes`.
    pub fn new() -> Self {
        Self {
            playing: 0,
            origin: [None; NOTE_COUNT],
            hold_ticks: [0; NOTE_COUNT],
        }
    }

    /// Returns `true` while `note` is sounding.
    pub fn is_playing(&self, note: Note) -> bool {
        self.playing & bit(note) != 0
    }

    /// Records that `incoming` started `sounding`. Any hold left over from an earlier start of `sounding` is dropped.
    pub fn press(&mut self, incoming: Note, sounding: Note) {
        self.playing |= bit(sounding);
        self.origin[incoming as usize] = Some(sounding);
        self.hold_ticks[sounding as usize] = 0;
    }

    /// Handles the release of `incoming`, returning the note to end on the attached instrument.
    ///
    /// Returns `None` if `incoming` never started a note, if that note has already ended, or if `mode` holds notes
    /// and the note's hold has not yet run out. Nothing is mutated in those cases.
    pub fn release(&mut self, incoming: Note, mode: NoteMode) -> Option<Note> {
        let sounding = self.origin[incoming as usize]?;
        if !self.is_playing(sounding) {
            return None;
        }
        if mode.holds() && self.hold_ticks[sounding as usize] != 0 {
            return None;
        }

        self.playing &= !bit(sounding);
        self.hold_ticks[sounding as usize] = 0;
        self.origin[incoming as usize] = None;
        Some(sounding)
    }

    /// Keeps a sounding note alive for `ticks` more ticks in hold modes.
    pub fn hold(&mut self, sounding: Note, ticks: u8) {
        self.hold_ticks[sounding as usize] = ticks;
    }

    /// Ticks left before the Note Off of a held note is honored.
    pub fn hold_ticks(&self, sounding: Note) -> u8 {
        self.hold_ticks[sounding as usize]
    }

    /// Determine if any notes are sounding.
    pub fn is_empty(&self) -> bool {
        self.playing == 0
    }

    /// Returns an [`Iterator`] over the sounding notes, lowest first.
    pub fn iter(&self) -> impl Iterator<Item = Note> + '_ {
        (0..NOTE_COUNT as u8)
            .map(|n| Note::from(U7::from_u8_lossy(n)))
            .filter(|&note| self.is_playing(note))
    }
}

fn bit(note: Note) -> u128 {
    1_u128 << (note as u8 & 0x7F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new() {
        let notes = SoundingNotes::new();
        assert!(notes.is_empty());
        assert_eq!(None, notes.iter().next());
    }

    #[test]
    fn press_marks_the_transposed_note() {
        let mut notes = SoundingNotes::new();
        notes.press(Note::C4, Note::E4);

        assert!(notes.is_playing(Note::E4));
        assert!(!notes.is_playing(Note::C4), "Only the sounding note is marked");
        assert_eq!(vec![Note::E4], notes.iter().collect::<Vec<_>>());
    }

    #[test]
    fn release_uses_the_recorded_origin() {
        let mut notes = SoundingNotes::new();
        notes.press(Note::C4, Note::E4);

        assert_eq!(
            Some(Note::E4),
            notes.release(Note::C4, NoteMode::NORMAL),
            "Expected left but got right"
        );
        assert!(notes.is_empty());
    }

    #[test]
    fn release_is_idempotent() {
        let mut notes = SoundingNotes::new();
        assert_eq!(None, notes.release(Note::C4, NoteMode::NORMAL), "Never started");

        notes.press(Note::C4, Note::C4);
        notes.release(Note::C4, NoteMode::NORMAL);
        let before = notes;
        assert_eq!(None, notes.release(Note::C4, NoteMode::NORMAL), "Already ended");
        assert_eq!(before, notes, "A redundant release must not mutate anything");
    }

    #[test]
    fn release_forgets_the_origin() {
        let mut notes = SoundingNotes::new();
        notes.press(Note::C4, Note::C5);
        notes.release(Note::C4, NoteMode::NORMAL);

        // C5 starts again from its own key; the earlier C4 must not be able to end it
        notes.press(Note::C5, Note::C5);
        assert_eq!(None, notes.release(Note::C4, NoteMode::NORMAL), "Expected left but got right");
        assert!(notes.is_playing(Note::C5));
    }

    #[test]
    fn hold_suppresses_release() {
        let mut notes = SoundingNotes::new();
        notes.press(Note::A3, Note::A3);
        notes.hold(Note::A3, 5);

        assert_eq!(None, notes.release(Note::A3, NoteMode::HOLD));
        assert!(notes.is_playing(Note::A3));
        assert_eq!(5, notes.hold_ticks(Note::A3));

        assert_eq!(
            Some(Note::A3),
            notes.release(Note::A3, NoteMode::NORMAL),
            "Without the HOLD bit the hold is ignored"
        );
        assert_eq!(0, notes.hold_ticks(Note::A3));
    }

    #[test]
    fn press_resets_hold() {
        let mut notes = SoundingNotes::new();
        notes.press(Note::A3, Note::A3);
        notes.hold(Note::A3, 5);
        notes.press(Note::A3, Note::A3);
        assert_eq!(0, notes.hold_ticks(Note::A3));
    }

    #[test]
    fn extreme_notes() {
        let mut notes = SoundingNotes::new();
        notes.press(Note::CMinus1, Note::CMinus1);
        notes.press(Note::G9, Note::G9);
        assert_eq!(
            vec![Note::CMinus1, Note::G9],
            notes.iter().collect::<Vec<_>>()
        );
    }
}
