use bitmask_enum::bitmask;
use wmidi::{MidiMessage, U7};

use super::{Layer, channel, controller, send_control_change, send_sysex};
use crate::{
    envelope,
    host::{Host, Port},
    registers::LayerRegisters,
};

/// Layer settings found to have changed, which decide what is resent to the attached instrument.
///
/// Envelope controllers and portamento time are not part of the set: they are compared one by one against the
/// previous registers.
#[bitmask(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChangeSet {
    /// Program or either Bank Select byte.
    Program,
    /// Part volume.
    Volume,
    /// Organ percussion or harmonic bars.
    Harmonics,
    /// Everything, regardless of what changed.
    All,
}

impl ChangeSet {
    /// Compares two snapshots of a layer's registers.
    pub fn between(previous: &LayerRegisters, current: &LayerRegisters) -> Self {
        let mut changes = Self::none();
        if (previous.program, previous.bank_msb, previous.bank_lsb)
            != (current.program, current.bank_msb, current.bank_lsb)
        {
            changes |= Self::Program;
        }
        if previous.volume != current.volume {
            changes |= Self::Volume;
        }
        if previous.percussion != current.percussion || previous.harmonic_bar != current.harmonic_bar {
            changes |= Self::Harmonics;
        }
        changes
    }
}

/// Sends the attached instrument whatever it needs to match `layer`, given the registers it last matched.
pub(crate) fn emit_layer_update(
    layer: &Layer,
    previous: &LayerRegisters,
    changes: ChangeSet,
    host: &mut impl Host,
) {
    let registers = &layer.registers;
    let number = layer.runtime.channel;
    let part = layer.runtime.part;
    let all = changes.contains(ChangeSet::All);

    if all || changes.contains(ChangeSet::Program) {
        send_control_change(host, Port::Performance, number, controller::BANK_SELECT, registers.bank_msb);
        send_control_change(host, Port::Performance, number, controller::BANK_SELECT_LSB, registers.bank_lsb);
        host.send(
            Port::Performance,
            &MidiMessage::ProgramChange(channel(number), U7::from_u8_lossy(registers.program)),
        );
    }

    for (function, before, now) in [
        (controller::RELEASE_TIME, previous.release, registers.release),
        (controller::ATTACK_TIME, previous.attack, registers.attack),
        (controller::BRIGHTNESS, previous.cutoff, registers.cutoff),
        (controller::DECAY_TIME, previous.decay, registers.decay),
        (controller::PORTAMENTO_TIME, previous.portamento_time, registers.portamento_time),
    ] {
        if all || before != now {
            send_control_change(host, Port::Performance, number, function, now);
        }
    }

    if (all || changes.intersects(ChangeSet::Program | ChangeSet::Harmonics)) && registers.is_organ_voice() {
        let frame = envelope::harmonic_bars(part, registers.percussion, &registers.harmonic_bar);
        send_sysex(host, Port::Performance, &frame);
    }

    if all || changes.contains(ChangeSet::Volume) {
        send_sysex(host, Port::Performance, &envelope::volume(part, registers.volume));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{configuration::LayerId, test_host::TestHost};

    fn organ() -> Layer {
        let mut layer = Layer::new(LayerId::Layer2);
        layer.registers.program = LayerRegisters::ORGAN_PROGRAM;
        layer.registers.bank_msb = LayerRegisters::ORGAN_BANK_MSB;
        layer.registers.bank_lsb = LayerRegisters::ORGAN_BANK_LSB;
        layer
    }

    #[test]
    fn between() {
        let previous = LayerRegisters::new(LayerId::Layer1);
        assert_eq!(ChangeSet::none(), ChangeSet::between(&previous, &previous));

        let mut current = previous;
        current.bank_lsb = 71;
        current.harmonic_bar[4] = 8;
        current.release = 0;
        assert_eq!(
            ChangeSet::Program | ChangeSet::Harmonics,
            ChangeSet::between(&previous, &current),
            "Expected left but got right"
        );
    }

    #[test]
    fn all_is_sent_in_order() {
        let layer = organ();
        let mut host = TestHost::default();
        emit_layer_update(&layer, &layer.registers, ChangeSet::All, &mut host);

        let messages = host.messages(Port::Performance);
        assert_eq!(vec![0xB1, 0x00, 0x20], messages[0]);
        assert_eq!(vec![0xB1, 0x20, 0x44], messages[1]);
        assert_eq!(vec![0xC1, 0x11], messages[2]);
        assert_eq!(vec![0xB1, 72, 0x40], messages[3]);
        assert_eq!(vec![0xB1, 73, 0x40], messages[4]);
        assert_eq!(vec![0xB1, 74, 0x40], messages[5]);
        assert_eq!(vec![0xB1, 75, 0x40], messages[6]);
        assert_eq!(vec![0xB1, 5, 0x00], messages[7]);

        let sysex = host.sysex(Port::Performance);
        assert_eq!(2, sysex.len(), "Harmonic bars then volume");
        assert_eq!([0x40_u8, 0x42, 0x51], sysex[0][4..7]);
        assert_eq!(
            envelope::volume(2, 127).to_vec(),
            sysex[1],
            "Volume is sent as an envelope for part 2"
        );
        assert_eq!(10, messages.len());
    }

    #[test]
    fn harmonics_need_the_organ_voice() {
        let layer = Layer::new(LayerId::Layer2);
        let mut host = TestHost::default();
        emit_layer_update(&layer, &layer.registers, ChangeSet::Harmonics, &mut host);
        assert!(host.sent.is_empty());

        let layer = organ();
        emit_layer_update(&layer, &layer.registers, ChangeSet::Harmonics, &mut host);
        assert_eq!(1, host.sysex(Port::Performance).len());
        assert!(host.program_changes(Port::Performance).is_empty());
    }

    #[test]
    fn only_changed_controllers_are_sent() {
        let previous = LayerRegisters::new(LayerId::Layer1);
        let mut layer = Layer::new(LayerId::Layer1);
        layer.registers.cutoff = 0x10;
        layer.registers.portamento_time = 0x30;

        let mut host = TestHost::default();
        emit_layer_update(&layer, &previous, ChangeSet::none(), &mut host);
        assert_eq!(
            vec![vec![0xB0, 74, 0x10], vec![0xB0, 5, 0x30]],
            host.messages(Port::Performance)
        );
    }

    #[test]
    fn volume_only() {
        let layer = Layer::new(LayerId::Layer8);
        let mut host = TestHost::default();
        emit_layer_update(&layer, &layer.registers, ChangeSet::Volume, &mut host);
        assert_eq!(vec![envelope::volume(8, 127).to_vec()], host.sysex(Port::Performance));
    }
}
