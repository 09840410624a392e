use wmidi::MidiMessage;

use crate::registers::Block;

/// The MIDI ports the engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    /// The attached instrument: performance messages come in here and routed messages go out.
    Performance,
    /// The remote editor; register requests arrive here and replies are sent back.
    Control,
    /// A secondary control-facing link, such as a wireless bridge.
    Secondary,
}

/// Everything the engine needs from its surroundings.
///
/// The engine never blocks; implementations are expected to queue outgoing messages.
pub trait Host {
    /// Queues `message` for transmission on `port`.
    fn send(&mut self, port: Port, message: &MidiMessage<'_>);

    /// Called after `length` bytes of `block` starting at `offset` changed, whatever the cause.
    fn registers_changed(&mut self, _block: Block, _offset: u8, _length: u8) {}

    /// Called whenever the tempo is (re)applied.
    fn tempo_changed(&mut self, _bpm: u16) {}
}
