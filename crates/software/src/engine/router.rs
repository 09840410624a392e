use wmidi::{Channel, MidiMessage, Note, U7};

use super::{ChangeSet, Engine, channel, controller, emitter, send_sysex};
use crate::{
    configuration::LayerId,
    host::{Host, Port},
    registers::{Block, layer_offset},
};

impl Engine {
    /// Routes a message received from the attached instrument through every layer.
    ///
    /// The engine resynchronizes the instrument first if it is not inited. The message is then mirrored to the
    /// control-facing ports as configured, and each layer in turn decides whether and how to pass it on.
    pub fn handle_performance_message(&mut self, message: &MidiMessage<'_>, host: &mut impl Host) {
        if !self.global.is_inited() {
            self.resync(host);
        }

        if matches!(message, MidiMessage::ActiveSensing | MidiMessage::TimingClock) {
            return;
        }

        self.mirror(message, host);

        for id in LayerId::ALL {
            self.route(id, message, host);
        }
    }

    fn mirror(&self, message: &MidiMessage<'_>, host: &mut impl Host) {
        let sysex = matches!(message, MidiMessage::SysEx(_));
        let config = self.global.config;

        if config.mirror_all_to_control || (sysex && config.mirror_sysex_to_control) {
            host.send(Port::Control, message);
        }
        if config.mirror_all_to_secondary || (sysex && config.mirror_sysex_to_secondary) {
            host.send(Port::Secondary, message);
        }
    }

    fn route(&mut self, id: LayerId, message: &MidiMessage<'_>, host: &mut impl Host) {
        let index = id.index();
        let enabled = self.global.config.enabled;
        let selected = usize::from(self.global.selected_layer) == index;
        let layer = &mut self.layers[index];
        let out = channel(layer.runtime.output_channel(index));

        // Note Off is honored by every layer, whatever its state, so that no note is left hanging
        match *message {
            MidiMessage::NoteOff(_, note, velocity) => {
                if let Some(sounding) = layer.runtime.notes.release(note, layer.registers.mode) {
                    host.send(Port::Performance, &MidiMessage::NoteOff(out, sounding, velocity));
                }
                return;
            }
            MidiMessage::NoteOn(_, note, velocity) if u8::from(velocity) == 0 => {
                if let Some(sounding) = layer.runtime.notes.release(note, layer.registers.mode) {
                    host.send(Port::Performance, &MidiMessage::NoteOff(out, sounding, velocity));
                }
                return;
            }
            _ => {}
        }

        if !enabled || !layer.registers.config.enabled {
            return;
        }
        let active = layer.is_active();

        match *message {
            MidiMessage::NoteOn(_, note, velocity) => {
                if !active {
                    return;
                }
                let registers = &layer.registers;
                let incoming = note as u8;
                let transposed = i16::from(incoming)
                    + i16::from(registers.transposition)
                    + i16::from(registers.transposition_extra);
                if !(0..=127).contains(&transposed) || !(registers.lo..=registers.hi).contains(&incoming) {
                    return;
                }

                let sounding = Note::from(U7::from_u8_lossy(transposed as u8));
                let scaled = (u16::from(u8::from(velocity)) * u16::from(registers.volume) / 127).min(127) as u8;
                let scaled = U7::from_u8_lossy(scaled);

                layer.runtime.notes.press(note, sounding);
                layer.runtime.note_started(sounding, scaled);
                host.send(Port::Performance, &MidiMessage::NoteOn(out, sounding, scaled));
            }
            MidiMessage::ProgramChange(_, program) => {
                if !active || !selected {
                    return;
                }
                host.send(Port::Performance, &MidiMessage::ProgramChange(out, program));

                let registers = &mut layer.registers;
                registers.program = program.into();
                registers.bank_msb = self.staged_bank.msb;
                registers.bank_lsb = self.staged_bank.lsb;

                #[cfg(feature = "defmt")]
                defmt::info!(
                    "{} captured program {} in bank {}/{}",
                    id,
                    registers.program,
                    registers.bank_msb,
                    registers.bank_lsb
                );

                self.notify(Block::Layer(id), layer_offset::PROGRAM, 3, host);
            }
            MidiMessage::ControlChange(_, function, value)
                if function == controller::BANK_SELECT || function == controller::BANK_SELECT_LSB =>
            {
                if !active || !selected {
                    return;
                }
                host.send(Port::Performance, &MidiMessage::ControlChange(out, function, value));
                if function == controller::BANK_SELECT {
                    self.staged_bank.msb = value.into();
                } else {
                    self.staged_bank.lsb = value.into();
                }
            }
            MidiMessage::ControlChange(incoming_channel, function, value) if function == controller::CHANNEL_VOLUME => {
                if !active || incoming_channel.number() != layer.registers.volume_channel {
                    return;
                }
                layer.registers.volume = value.into();

                #[cfg(feature = "defmt")]
                defmt::info!("{} captured volume {}", id, layer.registers.volume);

                emitter::emit_layer_update(layer, &layer.registers, ChangeSet::Volume, host);
                host.send(Port::Performance, &MidiMessage::ControlChange(out, function, value));
                self.notify(Block::Layer(id), layer_offset::VOLUME, 1, host);
            }
            MidiMessage::SysEx(data) => {
                if selected {
                    send_sysex(host, Port::Performance, U7::data_to_bytes(data));
                }
            }
            _ => {
                if let Some(forward) = with_channel(message, out) {
                    host.send(Port::Performance, &forward);
                }
            }
        }
    }
}

/// Copies a pressure, controller or pitch bend message onto another channel. Other messages are not forwarded as-is.
fn with_channel<'a>(message: &MidiMessage<'a>, channel: Channel) -> Option<MidiMessage<'a>> {
    match *message {
        MidiMessage::PolyphonicKeyPressure(_, note, pressure) => {
            Some(MidiMessage::PolyphonicKeyPressure(channel, note, pressure))
        }
        MidiMessage::ControlChange(_, function, value) => Some(MidiMessage::ControlChange(channel, function, value)),
        MidiMessage::ChannelPressure(_, pressure) => Some(MidiMessage::ChannelPressure(channel, pressure)),
        MidiMessage::PitchBendChange(_, bend) => Some(MidiMessage::PitchBendChange(channel, bend)),
        _ => None,
    }
}
