//! Frames of the register protocol.
//!
//! A request travels inside a System Exclusive message whose first data byte is one of the [`SYSEX_IDS`], followed by
//! `[command << 4 | block id, offset, length, payload...]`. Replies and notifications have the same shape with
//! [`Command::ReadResponse`] and carry the requested bytes as payload.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use tinyvec::ArrayVec;

use crate::{error::RequestError, registers::Block};

/// SysEx id used for notifications, and one of the two ids accepted for requests.
pub const SYSEX_ID: u8 = 0x77;

/// Every SysEx id which introduces a register request. Replies echo the id of their request.
pub const SYSEX_IDS: [u8; 2] = [SYSEX_ID, 0x78];

/// Capacity of a [`Frame`]; large enough for the whole of the biggest register block.
pub const FRAME_CAPACITY: usize = 64;

const HEADER_LEN: usize = 4;

/// A protocol frame without the SysEx start and end markers.
pub type Frame = ArrayVec<[u8; FRAME_CAPACITY]>;

/// The command nibble of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Reserved.
    Info = 0,
    /// Reserved.
    Update = 1,
    /// Read `length` bytes at `offset`.
    ReadRequest = 2,
    /// Reply to a read, and unsolicited change notification.
    ReadResponse = 3,
    /// Write the payload at `offset`.
    WriteRequest = 4,
    /// Reserved; writes are never acknowledged.
    WriteAck = 5,
    /// Reserved; refused writes are dropped silently.
    WriteNak = 6,
}

/// A decoded register request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Request<'a> {
    /// What to do.
    pub command: Command,
    /// Which block to do it to.
    pub block: Block,
    /// First byte of the block concerned.
    pub offset: u8,
    /// Number of bytes concerned, as declared by the sender.
    pub length: u8,
    /// Bytes to write. Empty for reads.
    pub payload: &'a [u8],
}

impl<'a> Request<'a> {
    /// Decodes a request from the bytes which follow the SysEx id.
    pub fn decode(frame: &'a [u8]) -> Result<Self, RequestError> {
        let [head, offset, length, payload @ ..] = frame else {
            return Err(RequestError::Truncated);
        };

        let command = (head >> 4) & 0x07;
        let command = Command::from_u8(command).ok_or(RequestError::UnknownCommand(command))?;
        let block = Block::from_id(head & 0x0F).ok_or(RequestError::UnknownBlock(head & 0x0F))?;

        Ok(Self {
            command,
            block,
            offset: *offset,
            length: *length,
            payload,
        })
    }

    /// Builds a read request.
    pub fn read(block: Block, offset: u8, length: u8) -> Self {
        Self {
            command: Command::ReadRequest,
            block,
            offset,
            length,
            payload: &[],
        }
    }

    /// Builds a write request. The declared length is the payload length; payloads longer than any block are
    /// truncated to 255 bytes, which the dispatcher then refuses.
    pub fn write(block: Block, offset: u8, payload: &'a [u8]) -> Self {
        Self {
            command: Command::WriteRequest,
            block,
            offset,
            length: u8::try_from(payload.len()).unwrap_or(u8::MAX),
            payload,
        }
    }

    /// Encodes the request as it is sent by a remote editor, prefixed by `sysex_id`.
    ///
    /// Payload bytes which do not fit a [`Frame`] are dropped.
    pub fn encode(&self, sysex_id: u8) -> Frame {
        encode(sysex_id, self.command, self.block, self.offset, self.length, self.payload)
    }
}

/// Encodes a read response (or notification) carrying `data`, read from `block` at `offset`.
pub fn encode_response(sysex_id: u8, block: Block, offset: u8, data: &[u8]) -> Frame {
    let length = data.len().min(FRAME_CAPACITY - HEADER_LEN) as u8;
    encode(sysex_id, Command::ReadResponse, block, offset, length, data)
}

fn encode(sysex_id: u8, command: Command, block: Block, offset: u8, length: u8, data: &[u8]) -> Frame {
    let mut frame = Frame::new();
    frame.extend_from_slice(&[sysex_id, (command as u8) << 4 | block.id(), offset, length]);
    frame.extend(data.iter().take(FRAME_CAPACITY - HEADER_LEN).copied());
    // the transport is seven-bit clean
    frame.iter_mut().for_each(|byte| *byte &= 0x7F);
    frame
}
