use wmidi::{Note, U7};

use crate::configuration::LayerId;

mod sounding_notes;
pub use sounding_notes::*;

/// Per-layer state which is never exposed through the register blocks.
///
/// The output channel, channel offset and vendor part id are fixed at boot; the rest changes with the performance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerRuntime {
    /// Channel (1..=16) used for resynchronization and for pedal controllers.
    pub channel: u8,
    /// Rotates the channels used when forwarding performance messages.
    pub channel_out_offset: u8,
    /// Part number addressed by vendor envelopes.
    pub part: u8,
    /// Runtime half of the layer gate, driven by activate pedals.
    pub activate: bool,
    /// Notes this layer has started.
    pub notes: SoundingNotes,
    /// Last note this layer started, kept for echo modes.
    pub last_note: Option<Note>,
    /// Velocity of [`LayerRuntime::last_note`].
    pub last_velocity: U7,
}

impl LayerRuntime {
    /// Boot state of a layer: channel and part both follow the layer number.
    pub fn new(layer: LayerId) -> Self {
        let number = layer.index() as u8 + 1;
        Self {
            channel: number,
            channel_out_offset: 0,
            part: number,
            activate: false,
            notes: SoundingNotes::new(),
            last_note: None,
            last_velocity: U7::from_u8_lossy(0),
        }
    }

    /// Channel (1..=16) used when forwarding performance messages of the layer at `index`.
    pub fn output_channel(&self, index: usize) -> u8 {
        1 + ((usize::from(self.channel_out_offset) + index) % 16) as u8
    }

    /// Records a started note for echo modes.
    pub fn note_started(&mut self, note: Note, velocity: U7) {
        self.last_note = Some(note);
        self.last_velocity = velocity;
    }
}
