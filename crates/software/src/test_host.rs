//! A [`Host`] which records everything the engine hands to it.

use wmidi::MidiMessage;

use crate::{
    host::{Host, Port},
    registers::Block,
};

#[derive(Debug, Default)]
pub struct TestHost {
    /// Raw bytes of every message sent, SysEx including its start and end markers.
    pub sent: Vec<(Port, Vec<u8>)>,
    pub changed: Vec<(Block, u8, u8)>,
    pub tempos: Vec<u16>,
}

impl TestHost {
    pub fn clear(&mut self) {
        self.sent.clear();
        self.changed.clear();
        self.tempos.clear();
    }

    pub fn messages(&self, port: Port) -> Vec<Vec<u8>> {
        self.sent
            .iter()
            .filter(|(sent_to, _)| *sent_to == port)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    /// SysEx messages sent to `port`, without their start and end markers.
    pub fn sysex(&self, port: Port) -> Vec<Vec<u8>> {
        self.messages(port)
            .into_iter()
            .filter_map(|bytes| match bytes.as_slice() {
                [0xF0, data @ .., 0xF7] => Some(data.to_vec()),
                _ => None,
            })
            .collect()
    }

    /// `(channel number, value)` of every change of controller `cc`.
    pub fn control_changes(&self, port: Port, cc: u8) -> Vec<(u8, u8)> {
        self.channel_messages(port, 0xB0)
            .filter(|bytes| bytes[1] == cc)
            .map(|bytes| (channel_number(&bytes), bytes[2]))
            .collect()
    }

    /// `(channel number, program)` of every Program Change.
    pub fn program_changes(&self, port: Port) -> Vec<(u8, u8)> {
        self.channel_messages(port, 0xC0)
            .map(|bytes| (channel_number(&bytes), bytes[1]))
            .collect()
    }

    /// `(channel number, note, velocity)` of every Note On.
    pub fn note_ons(&self, port: Port) -> Vec<(u8, u8, u8)> {
        self.channel_messages(port, 0x90)
            .map(|bytes| (channel_number(&bytes), bytes[1], bytes[2]))
            .collect()
    }

    /// `(channel number, note, velocity)` of every Note Off.
    pub fn note_offs(&self, port: Port) -> Vec<(u8, u8, u8)> {
        self.channel_messages(port, 0x80)
            .map(|bytes| (channel_number(&bytes), bytes[1], bytes[2]))
            .collect()
    }

    fn channel_messages(&self, port: Port, status: u8) -> impl Iterator<Item = Vec<u8>> {
        self.messages(port)
            .into_iter()
            .filter(move |bytes| bytes[0] & 0xF0 == status)
    }
}

fn channel_number(bytes: &[u8]) -> u8 {
    (bytes[0] & 0x0F) + 1
}

impl Host for TestHost {
    fn send(&mut self, port: Port, message: &MidiMessage<'_>) {
        let mut bytes = vec![0; message.bytes_size()];
        message
            .copy_to_slice(&mut bytes)
            .expect("Buffer sized by bytes_size");
        self.sent.push((port, bytes));
    }

    fn registers_changed(&mut self, block: Block, offset: u8, length: u8) {
        self.changed.push((block, offset, length));
    }

    fn tempo_changed(&mut self, bpm: u16) {
        self.tempos.push(bpm);
    }
}
