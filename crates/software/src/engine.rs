//! The engine owns every register block and every layer's runtime state, and is driven by the caller's main loop.
//!
//! Each entry point runs to completion without blocking: messages arriving from the attached instrument go to the
//! router ([`Engine::handle_performance_message`]), traffic from the remote editor goes to
//! [`Engine::handle_control_message`], and calibrated pedal events go to [`Engine::handle_pedal`]. Everything the
//! engine produces is handed to a [`Host`].

mod control;
mod dispatch;
mod emitter;
mod pedal;
mod router;

pub use dispatch::RegisterBytes;
pub use emitter::ChangeSet;

use embassy_time::Instant;
use wmidi::{Channel, ControlFunction, MidiMessage, U7};

use crate::{
    configuration::{EngineConfig, LayerId},
    host::{Host, Port},
    midi_state::LayerRuntime,
    registers::{Block, GlobalRegisters, LAYER_COUNT, LayerRegisters, global_offset},
};

/// Controller numbers the engine sends or captures.
pub(crate) mod controller {
    use wmidi::{ControlFunction, U7};

    const fn function(number: u8) -> ControlFunction {
        ControlFunction(U7::from_u8_lossy(number))
    }

    pub const BANK_SELECT: ControlFunction = function(0);
    pub const PORTAMENTO_TIME: ControlFunction = function(5);
    pub const CHANNEL_VOLUME: ControlFunction = function(7);
    pub const BANK_SELECT_LSB: ControlFunction = function(32);
    pub const RELEASE_TIME: ControlFunction = function(72);
    pub const ATTACK_TIME: ControlFunction = function(73);
    pub const BRIGHTNESS: ControlFunction = function(74);
    pub const DECAY_TIME: ControlFunction = function(75);
    pub const LOCAL_CONTROL: ControlFunction = function(122);
}

/// A layer's registers together with its runtime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layer {
    /// The layer's register block.
    pub registers: LayerRegisters,
    /// State which is not exposed through the registers.
    pub runtime: LayerRuntime,
}

impl Layer {
    fn new(id: LayerId) -> Self {
        Self {
            registers: LayerRegisters::new(id),
            runtime: LayerRuntime::new(id),
        }
    }

    /// Returns `true` if exactly one of the `active` register bit and the activate latch is set.
    pub fn is_active(&self) -> bool {
        self.registers.config.active ^ self.runtime.activate
    }

    /// The layer gate: enabled, and active as per [`Layer::is_active`].
    pub fn is_open(&self) -> bool {
        self.registers.config.enabled && self.is_active()
    }
}

/// Bank Select values waiting for the Program Change which completes them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct StagedBank {
    msb: u8,
    lsb: u8,
}

/// The whole of the router's state.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    global: GlobalRegisters,
    layers: [Layer; LAYER_COUNT],
    staged_bank: StagedBank,
    last_keep_alive: Option<Instant>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// Builds an engine with every register block at its boot defaults.
    ///
    /// Nothing is sent until the first performance message arrives, which triggers [`Engine::resync`].
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            global: GlobalRegisters::default(),
            layers: LayerId::ALL.map(Layer::new),
            staged_bank: StagedBank::default(),
            last_keep_alive: None,
        }
    }

    /// The settings the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The global register block.
    pub fn global(&self) -> &GlobalRegisters {
        &self.global
    }

    /// A layer's registers and runtime state.
    pub fn layer(&self, id: LayerId) -> &Layer {
        &self.layers[id.index()]
    }

    /// Writes `bytes` into `block` at `offset`, exactly as a remote write request would.
    ///
    /// This is the entry point for a local user interface. A write which does not fit the block is refused as a
    /// whole and leaves every register untouched.
    pub fn write_registers(
        &mut self,
        block: Block,
        offset: u8,
        bytes: &[u8],
        host: &mut impl Host,
    ) -> Result<(), crate::error::RequestError> {
        self.apply(crate::protocol::Request::write(block, offset, bytes), host)
            .map(|_| ())
    }

    /// Reads `buf.len()` bytes of `block` starting at `offset`.
    pub fn read_registers(
        &self,
        block: Block,
        offset: u8,
        buf: &mut [u8],
    ) -> Result<(), crate::error::RequestError> {
        let length = u8::try_from(buf.len()).map_err(|_| crate::error::RequestError::OutOfBounds {
            offset,
            length: u8::MAX,
            size: block.size(),
        })?;
        let bytes = self.read(block, offset, length)?;
        buf.copy_from_slice(&bytes);
        Ok(())
    }

    /// Brings the attached instrument in line with the registers.
    ///
    /// Sends the local control state, then every setting of every layer, and finally marks the engine as inited.
    pub fn resync(&mut self, host: &mut impl Host) {
        #[cfg(feature = "defmt")]
        defmt::info!("Resynchronizing the attached instrument");

        self.broadcast_local_control(host);
        for layer in &self.layers {
            emitter::emit_layer_update(layer, &layer.registers, ChangeSet::All, host);
        }

        self.global.status |= GlobalRegisters::STATUS_INITED;
        self.notify(Block::Global, global_offset::STATUS, 1, host);
    }

    /// Records that the attached instrument went away, so that the next performance message resynchronizes it.
    pub fn performance_link_lost(&mut self, host: &mut impl Host) {
        if !self.global.is_inited() {
            return;
        }

        #[cfg(feature = "defmt")]
        defmt::warn!("Lost the link to the attached instrument");

        self.global.status &= !GlobalRegisters::STATUS_INITED;
        self.notify(Block::Global, global_offset::STATUS, 1, host);
    }

    /// Tells the attached instrument whether its own keyboard should sound: it should while the router is disabled.
    fn broadcast_local_control(&self, host: &mut impl Host) {
        let value = if self.global.config.enabled { 0 } else { 127 };
        for number in 1..=LAYER_COUNT as u8 {
            send_control_change(host, Port::Performance, number, controller::LOCAL_CONTROL, value);
        }
    }
}

/// Converts a channel number (1..=16) into a [`Channel`]. Out of range numbers wrap.
pub(crate) fn channel(number: u8) -> Channel {
    Channel::from_index(number.wrapping_sub(1) & 0x0F).unwrap_or(Channel::Ch1)
}

pub(crate) fn send_control_change(
    host: &mut impl Host,
    port: Port,
    channel_number: u8,
    function: ControlFunction,
    value: u8,
) {
    host.send(
        port,
        &MidiMessage::ControlChange(channel(channel_number), function, U7::from_u8_lossy(value)),
    );
}

/// Sends `data` (without the start and end markers) as a System Exclusive message.
pub(crate) fn send_sysex(host: &mut impl Host, port: Port, data: &[u8]) {
    match U7::try_from_bytes(data) {
        Ok(data) => host.send(port, &MidiMessage::SysEx(data)),
        Err(_e) => {
            #[cfg(feature = "defmt")]
            defmt::error!("Refusing to send SysEx with a byte above 0x7F");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        registers::layer_offset,
        test_host::TestHost,
        usb_midi::{QUEUE_CAPACITY, SYSEX_CAPACITY, write_packets},
    };

    #[test]
    fn channel_numbers() {
        assert_eq!(Channel::Ch1, channel(1));
        assert_eq!(Channel::Ch16, channel(16));
        assert_eq!(Channel::Ch1, channel(17), "Out of range channels wrap");
        assert_eq!(Channel::Ch16, channel(0), "Expected left but got right");
    }

    #[test]
    fn layer_gate() {
        let mut layer = Layer::new(LayerId::Layer1);
        assert!(layer.is_open());

        layer.runtime.activate = true;
        assert!(!layer.is_open(), "Toggling the latch once closes the gate");
        layer.runtime.activate = false;
        assert!(layer.is_open(), "Toggling the latch twice restores the gate");

        layer.registers.config.active = false;
        layer.runtime.activate = true;
        assert!(layer.is_open(), "Inactive layers are opened by the latch");

        layer.registers.config.enabled = false;
        assert!(!layer.is_open());
    }

    #[test]
    fn resync_sends_everything_once() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();
        engine.resync(&mut host);

        let local_control = host.control_changes(Port::Performance, 122);
        assert_eq!(8, local_control.len());
        assert!(
            local_control.iter().all(|&(_, value)| value == 127),
            "A disabled router leaves local control on"
        );

        let program_changes = host.program_changes(Port::Performance);
        assert_eq!(
            (1..=8).map(|channel| (channel, 0)).collect::<Vec<_>>(),
            program_changes,
            "Every layer is resynchronized on its own channel"
        );
        assert_eq!(8, host.sysex(Port::Performance).len(), "One volume envelope per layer");

        assert!(engine.global().is_inited());
        assert_eq!(
            vec![vec![0x77, 0x3F, 0x01, 0x01, 0x01]],
            host.sysex(Port::Control),
            "The new status is announced"
        );
        assert_eq!(host.sysex(Port::Control), host.sysex(Port::Secondary));
    }

    /// Counts the USB-MIDI packets everything sent would take.
    #[derive(Default)]
    struct PacketCount(usize);

    impl Host for PacketCount {
        fn send(&mut self, _port: Port, message: &MidiMessage<'_>) {
            let count = &mut self.0;
            write_packets(0, message, |_| *count += 1);
        }
    }

    #[test]
    fn first_message_fits_the_outgoing_queue() {
        let mut engine = Engine::default();
        let mut host = PacketCount::default();
        let note_on = MidiMessage::NoteOn(Channel::Ch1, wmidi::Note::C4, U7::from_u8_lossy(100));
        engine.handle_performance_message(&note_on, &mut host);
        assert!(host.0 <= QUEUE_CAPACITY, "{} packets overflow the queue", host.0);

        // every layer on the organ voice, every mirror on, and the longest SysEx
        let mut engine = Engine::default();
        engine
            .write_registers(Block::Global, global_offset::CONFIG, &[0x1F], &mut host)
            .unwrap();
        for id in LayerId::ALL {
            engine
                .write_registers(
                    Block::Layer(id),
                    layer_offset::PROGRAM,
                    &[
                        LayerRegisters::ORGAN_PROGRAM,
                        LayerRegisters::ORGAN_BANK_MSB,
                        LayerRegisters::ORGAN_BANK_LSB,
                    ],
                    &mut host,
                )
                .unwrap();
        }
        host.0 = 0;

        let data = [0x41_u8; SYSEX_CAPACITY - 2];
        let sysex = MidiMessage::SysEx(U7::try_from_bytes(&data).unwrap());
        engine.handle_performance_message(&sysex, &mut host);
        assert!(host.0 <= QUEUE_CAPACITY, "{} packets overflow the queue", host.0);
    }

    #[test]
    fn link_loss_clears_inited_once() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();
        engine.performance_link_lost(&mut host);
        assert!(host.sent.is_empty(), "Nothing to announce before the first resync");

        engine.resync(&mut host);
        host.sent.clear();
        engine.performance_link_lost(&mut host);
        assert!(!engine.global().is_inited());
        assert_eq!(vec![vec![0x77, 0x3F, 0x01, 0x01, 0x00]], host.sysex(Port::Control));
    }

    #[test]
    fn local_register_access() {
        let mut engine = Engine::default();
        let mut host = TestHost::default();
        let block = Block::Layer(LayerId::Layer2);

        engine
            .write_registers(block, layer_offset::LO, &[36, 60], &mut host)
            .unwrap();
        let mut range = [0_u8; 2];
        engine
            .read_registers(block, layer_offset::LO, &mut range)
            .unwrap();
        assert_eq!([36, 60], range, "Expected left but got right");
        assert_eq!(vec![(block, layer_offset::LO, 2)], host.changed);

        let mut too_long = [0_u8; 3];
        assert!(
            engine
                .read_registers(block, 42, &mut too_long)
                .is_err()
        );
        assert!(engine.write_registers(block, 43, &[1, 2], &mut host).is_err());
    }
}
