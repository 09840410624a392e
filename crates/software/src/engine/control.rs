use embassy_time::Instant;
use wmidi::{MidiMessage, U7};

use super::Engine;
use crate::{
    envelope::PedalFrame,
    host::{Host, Port},
    protocol,
};

impl Engine {
    /// Handles a message which arrived on a control-facing port.
    ///
    /// Register requests are dispatched and count as a keep-alive. Pedal bridge frames go to
    /// [`Engine::handle_pedal`]. Other SysEx and channel voice messages are passed on to the attached instrument,
    /// unless keep-alive checking is enabled and the editor has gone quiet.
    pub fn handle_control_message(&mut self, now: Instant, message: &MidiMessage<'_>, host: &mut impl Host) {
        match message {
            MidiMessage::SysEx(data) => {
                let bytes = U7::data_to_bytes(data);
                match bytes.first() {
                    Some(id) if protocol::SYSEX_IDS.contains(id) => {
                        self.handle_request(bytes, host);
                        self.last_keep_alive = Some(now);
                    }
                    Some(&PedalFrame::ID) => match PedalFrame::decode(bytes) {
                        Some(frame) => self.handle_pedal(frame.pedal, frame.value, host),
                        None => {
                            #[cfg(feature = "defmt")]
                            defmt::warn!("Malformed pedal frame of {} bytes", bytes.len());
                        }
                    },
                    _ => self.pass_through(now, message, host),
                }
            }
            MidiMessage::NoteOff(..)
            | MidiMessage::NoteOn(..)
            | MidiMessage::PolyphonicKeyPressure(..)
            | MidiMessage::ControlChange(..)
            | MidiMessage::ProgramChange(..)
            | MidiMessage::ChannelPressure(..)
            | MidiMessage::PitchBendChange(..) => self.pass_through(now, message, host),
            _ => {}
        }
    }

    fn pass_through(&self, now: Instant, message: &MidiMessage<'_>, host: &mut impl Host) {
        if self.editor_alive(now) {
            host.send(Port::Performance, message);
        } else {
            #[cfg(feature = "defmt")]
            defmt::debug!("Dropped control traffic: no recent keep-alive");
        }
    }

    fn editor_alive(&self, now: Instant) -> bool {
        if self.global.check_keep_alive == 0 {
            return true;
        }
        self.last_keep_alive
            .is_some_and(|last| now.saturating_duration_since(last) < self.config.keep_alive_window)
    }
}
