//! Vendor System Exclusive envelopes.
//!
//! The attached instrument takes part volume and organ settings as Roland "data set" messages: a fixed four-byte
//! header, an address and data payload, and a trailing checksum over the payload. Frames here exclude the SysEx start
//! and end markers, which is the form [`wmidi::MidiMessage::SysEx`] carries.
//!
//! The module also holds [`PedalFrame`], the small frame a secondary bridge uses to deliver pedal events.

use crate::registers::HARMONIC_BAR_COUNT;

/// Manufacturer, device, model and command bytes which open every envelope.
pub const HEADER: [u8; 4] = [0x41, 0x10, 0x42, 0x12];

/// Length of a [`volume`] frame.
pub const VOLUME_LEN: usize = HEADER.len() + 4 + 1;

/// Length of a [`harmonic_bars`] frame.
pub const HARMONIC_BARS_LEN: usize = HEADER.len() + 5 + HARMONIC_BAR_COUNT + 1;

/// Computes the checksum of an envelope payload: `128 - (sum mod 128)`, reduced to seven bits.
pub fn checksum(payload: &[u8]) -> u8 {
    let sum = payload.iter().fold(0_u8, |acc, &byte| acc.wrapping_add(byte));
    (128 - (sum & 0x7F)) & 0x7F
}

/// Builds the envelope which sets the volume of `part`.
pub fn volume(part: u8, volume: u8) -> [u8; VOLUME_LEN] {
    let mut frame = [0_u8; VOLUME_LEN];
    frame[HEADER.len()..HEADER.len() + 4].copy_from_slice(&[0x40, 0x10 | part, 0x19, volume]);
    seal(&mut frame);
    frame
}

/// Builds the envelope which sets the percussion switch and harmonic bars of the organ voice on `part`.
pub fn harmonic_bars(
    part: u8,
    percussion: u8,
    bars: &[u8; HARMONIC_BAR_COUNT],
) -> [u8; HARMONIC_BARS_LEN] {
    let mut frame = [0_u8; HARMONIC_BARS_LEN];
    let payload = &mut frame[HEADER.len()..HARMONIC_BARS_LEN - 1];
    payload[..5].copy_from_slice(&[0x40, 0x40 | part, 0x51, 0x00, percussion]);
    payload[5..].copy_from_slice(bars);
    seal(&mut frame);
    frame
}

/// Writes the header, clears the high bit of every payload byte and appends the checksum.
fn seal(frame: &mut [u8]) {
    let Some((checksum_byte, body)) = frame.split_last_mut() else {
        return;
    };
    body[..HEADER.len()].copy_from_slice(&HEADER);
    let payload = &mut body[HEADER.len()..];
    payload.iter_mut().for_each(|byte| *byte &= 0x7F);
    *checksum_byte = checksum(payload);
}

/// A pedal event delivered over SysEx: `[0x79, 0x01, pedal, value]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PedalFrame {
    /// Pedal index (0..=7).
    pub pedal: u8,
    /// Calibrated pedal value (0..=127).
    pub value: u8,
}

impl PedalFrame {
    /// Leading byte which identifies a pedal frame.
    pub const ID: u8 = 0x79;

    const COMMAND: u8 = 0x01;

    /// Encodes the frame, clearing the high bit of each byte.
    pub fn encode(&self) -> [u8; 4] {
        [Self::ID, Self::COMMAND, self.pedal & 0x7F, self.value & 0x7F]
    }

    /// Decodes a frame. Trailing bytes are ignored.
    pub fn decode(frame: &[u8]) -> Option<Self> {
        match frame {
            [Self::ID, _, pedal, value, ..] => Some(Self {
                pedal: *pedal,
                value: *value,
            }),
            _ => None,
        }
    }
}
