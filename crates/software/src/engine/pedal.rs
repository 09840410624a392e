use wmidi::{ControlFunction, U7};

use super::{Engine, controller, send_control_change};
use crate::{
    configuration::{ActivationTarget, LayerId, PedalMode},
    host::{Host, Port},
    registers::{Block, PEDAL_COUNT, layer_offset},
};

impl Engine {
    /// Routes a calibrated pedal event (pedal 0..=7, value 0..=127).
    ///
    /// The global pedal settings decide what the control-facing ports see; each layer's own pedal settings decide
    /// what that layer does. Register changes caused by the pedal are announced.
    pub fn handle_pedal(&mut self, pedal: u8, value: u8, host: &mut impl Host) {
        let index = usize::from(pedal);
        if index >= PEDAL_COUNT {
            return;
        }
        let value = value & 0x7F;

        if self.global.pedal_mode(index) == PedalMode::Normal {
            let function = ControlFunction(U7::from_u8_lossy(self.global.pedal_cc[index]));
            send_control_change(host, Port::Control, 1, function, value);
            send_control_change(host, Port::Secondary, 1, function, value);
        }

        for id in LayerId::ALL {
            let activation = self.config.activation;
            let layer = &mut self.layers[id.index()];
            let was_active = layer.registers.config.active;
            let mut portamento_changed = false;

            match layer.registers.pedal_mode(index) {
                PedalMode::Normal => {
                    let function = ControlFunction(U7::from_u8_lossy(layer.registers.pedal_cc[index]));
                    send_control_change(host, Port::Performance, layer.runtime.channel, function, value);
                    if function == controller::PORTAMENTO_TIME {
                        layer.registers.portamento_time = value;
                        portamento_changed = true;
                    }
                }
                PedalMode::ToggleActive => {
                    if value == 127 {
                        match activation {
                            ActivationTarget::Register => {
                                layer.registers.config.active = !layer.registers.config.active
                            }
                            ActivationTarget::Latch => layer.runtime.activate = !layer.runtime.activate,
                        }
                    }
                }
                PedalMode::PushActive => match (value, activation) {
                    (0 | 127, ActivationTarget::Register) => {
                        layer.registers.config.active = !layer.registers.config.active
                    }
                    (0, ActivationTarget::Latch) => layer.runtime.activate = layer.registers.config.active,
                    (127, ActivationTarget::Latch) => layer.runtime.activate = !layer.registers.config.active,
                    _ => {}
                },
                PedalMode::NoteLength | PedalMode::Ignore => {}
            }

            let active_changed = layer.registers.config.active != was_active;

            #[cfg(feature = "defmt")]
            if active_changed {
                defmt::info!("Pedal {} set {} active: {}", pedal, id, layer.registers.config.active);
            }

            if portamento_changed {
                self.notify(Block::Layer(id), layer_offset::PORTAMENTO_TIME, 1, host);
            }
            if active_changed {
                self.notify(Block::Layer(id), layer_offset::CONFIG, 1, host);
            }
        }
    }
}
