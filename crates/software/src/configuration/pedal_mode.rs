use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

/// Determines what a pedal does for the global block or for a single layer.
///
/// Pedal modes are stored as raw bytes in the register blocks so that any value written by a remote editor reads back
/// unchanged; [`PedalMode::from_register`] interprets the byte and treats unknown values as [`PedalMode::Ignore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ToPrimitive, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PedalMode {
    /// The pedal has no effect.
    Ignore = 0,
    /// The pedal value is sent as a Control Change using the configured controller number.
    Normal = 1,
    /// Reserved for pedal-controlled note length. Stored, but currently has no effect.
    NoteLength = 2,
    /// Fully depressing the pedal toggles whether the layer is active.
    ToggleActive = 3,
    /// The layer's active state is inverted for as long as the pedal is held.
    PushActive = 4,
}

impl PedalMode {
    /// Interprets a pedal mode register byte.
    pub fn from_register(value: u8) -> Self {
        <Self as FromPrimitive>::from_u8(value).unwrap_or(Self::Ignore)
    }
}

impl From<PedalMode> for u8 {
    fn from(mode: PedalMode) -> Self {
        mode as u8
    }
}
