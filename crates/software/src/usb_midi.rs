//! USB-MIDI event packet framing.
//!
//! Every packet is four bytes: a header holding the cable number (high nibble) and the Code Index Number, or CIN
//! (low nibble), followed by up to three MIDI bytes. System Exclusive messages span as many packets as needed and are
//! reassembled here, one buffer per cable, so that interleaved cables never corrupt each other.

use tinyvec::ArrayVec;
use wmidi::MidiMessage;

/// Size of a USB-MIDI event packet.
pub const PACKET_SIZE: usize = 4;

/// Number of virtual cables: performance, control and secondary.
pub const CABLE_COUNT: usize = 3;

/// Longest System Exclusive message, markers included, that can be reassembled or sent.
pub const SYSEX_CAPACITY: usize = 128;

/// Packets an outgoing queue must hold to take everything one engine entry point can produce.
///
/// The largest burst is the first performance message after boot: a resynchronization of eight organ layers (166
/// packets) followed by a [`SYSEX_CAPACITY`] message mirrored to both control-facing cables and forwarded by the
/// selected layer (129 packets).
pub const QUEUE_CAPACITY: usize = 512;

mod cin {
    pub const TWO_BYTE_COMMON: u8 = 0x2;
    pub const THREE_BYTE_COMMON: u8 = 0x3;
    pub const SYSEX_CONTINUES: u8 = 0x4;
    pub const SYSEX_ENDS_1: u8 = 0x5;
    pub const SYSEX_ENDS_2: u8 = 0x6;
    pub const SYSEX_ENDS_3: u8 = 0x7;
    pub const SINGLE_BYTE: u8 = 0xF;
}

type SysexBuffer = ArrayVec<[u8; SYSEX_CAPACITY]>;

#[derive(Debug, Default, Clone)]
struct Reassembly {
    bytes: SysexBuffer,
    overflowed: bool,
}

impl Reassembly {
    fn append(&mut self, data: &[u8]) {
        for &byte in data {
            if self.bytes.try_push(byte).is_some() {
                self.overflowed = true;
            }
        }
    }

    fn reset(&mut self) {
        self.bytes.clear();
        self.overflowed = false;
    }
}

/// Turns incoming USB-MIDI event packets into MIDI messages.
#[derive(Debug, Default, Clone)]
pub struct PacketReader {
    sysex: [Reassembly; CABLE_COUNT],
}

impl PacketReader {
    /// Decodes `data`, which holds one or more packets, calling `on_message` with the cable number and message of
    /// every complete message.
    ///
    /// Trailing bytes which do not make up a whole packet are dropped, as are packets for unknown cables, reserved
    /// CINs and System Exclusive messages longer than [`SYSEX_CAPACITY`].
    pub fn read(&mut self, data: &[u8], mut on_message: impl FnMut(u8, &MidiMessage<'_>)) {
        let packets = data.chunks_exact(PACKET_SIZE);
        if !packets.remainder().is_empty() {
            #[cfg(feature = "defmt")]
            defmt::error!("USB-MIDI event packets must always be 32 bits long");
        }

        for packet in packets {
            let cable = packet[0] >> 4;
            let Some(reassembly) = self.sysex.get_mut(usize::from(cable)) else {
                #[cfg(feature = "defmt")]
                defmt::warn!("Dropped packet for unknown cable {}", cable);
                continue;
            };

            let message_len = match packet[0] & 0x0F {
                cin::SYSEX_CONTINUES => {
                    if packet[1] == 0xF0 {
                        reassembly.reset();
                    }
                    reassembly.append(&packet[1..]);
                    continue;
                }
                cin::SYSEX_ENDS_1 if packet[1] == 0xF7 || !reassembly.bytes.is_empty() => 1,
                cin::SYSEX_ENDS_2 => 2,
                cin::SYSEX_ENDS_3 => 3,
                cin::SYSEX_ENDS_1 | cin::SINGLE_BYTE => {
                    emit(cable, &packet[1..2], &mut on_message);
                    continue;
                }
                cin::TWO_BYTE_COMMON | 0xC | 0xD => {
                    emit(cable, &packet[1..3], &mut on_message);
                    continue;
                }
                cin::THREE_BYTE_COMMON | 0x8..=0xB | 0xE => {
                    emit(cable, &packet[1..4], &mut on_message);
                    continue;
                }
                _ => continue,
            };

            // the end of a System Exclusive message, possibly one which fits in a single packet
            if packet[1] == 0xF0 {
                reassembly.reset();
            }
            reassembly.append(&packet[1..=message_len]);
            if reassembly.overflowed {
                #[cfg(feature = "defmt")]
                defmt::warn!("Dropped SysEx longer than {} bytes on cable {}", SYSEX_CAPACITY, cable);
            } else {
                emit(cable, &reassembly.bytes, &mut on_message);
            }
            reassembly.reset();
        }
    }
}

fn emit(cable: u8, bytes: &[u8], on_message: &mut impl FnMut(u8, &MidiMessage<'_>)) {
    match MidiMessage::from_bytes(bytes) {
        Ok(message) => on_message(cable, &message),
        Err(_e) => {
            #[cfg(feature = "defmt")]
            defmt::warn!("Dropped malformed MIDI message on cable {}: {}", cable, bytes);
        }
    }
}

/// Splits `message` into packets for `cable`, handing each one to `sink` in order.
pub fn write_packets(cable: u8, message: &MidiMessage<'_>, mut sink: impl FnMut([u8; PACKET_SIZE])) {
    let mut bytes = [0_u8; SYSEX_CAPACITY];
    let Ok(len) = message.copy_to_slice(&mut bytes) else {
        #[cfg(feature = "defmt")]
        defmt::error!("MIDI message too long for a USB-MIDI cable");
        return;
    };
    let bytes = &bytes[..len];
    let header = |cin: u8| (cable << 4) | cin;

    if let MidiMessage::SysEx(_) = message {
        let mut chunks = bytes.chunks(3).peekable();
        while let Some(chunk) = chunks.next() {
            let cin = match (chunks.peek(), chunk.len()) {
                (Some(_), _) => cin::SYSEX_CONTINUES,
                (None, 1) => cin::SYSEX_ENDS_1,
                (None, 2) => cin::SYSEX_ENDS_2,
                (None, _) => cin::SYSEX_ENDS_3,
            };
            sink(packet(header(cin), chunk));
        }
        return;
    }

    let cin = match bytes {
        [status, ..] if *status < 0xF0 => status >> 4,
        [_] => cin::SINGLE_BYTE,
        [_, _] => cin::TWO_BYTE_COMMON,
        _ => cin::THREE_BYTE_COMMON,
    };
    sink(packet(header(cin), bytes));
}

fn packet(header: u8, bytes: &[u8]) -> [u8; PACKET_SIZE] {
    let mut packet = [header, 0, 0, 0];
    for (slot, byte) in packet[1..].iter_mut().zip(bytes) {
        *slot = *byte;
    }
    packet
}
