//! Reasons a register request is refused.
//!
//! None of these are faults: a refused request is dropped without touching any register and without a reply, and
//! it is up to the remote sender to notice and retry.

use core::fmt;

/// Why a register request was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    /// The frame is shorter than the three-byte request header.
    Truncated,
    /// The command nibble is not one the dispatcher acts upon (INFO, UPDATE, the response commands, or 7).
    UnknownCommand(u8),
    /// The layer nibble addresses neither a layer (0..=7) nor the global block (15).
    UnknownBlock(u8),
    /// `offset + length` runs past the end of the addressed block.
    OutOfBounds {
        /// Requested offset.
        offset: u8,
        /// Requested length.
        length: u8,
        /// Size of the addressed block.
        size: usize,
    },
    /// A write whose declared length disagrees with the number of payload bytes actually present.
    LengthMismatch {
        /// Length declared in the request header.
        declared: u8,
        /// Payload bytes present.
        actual: usize,
    },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RequestError::Truncated => write!(f, "request frame is truncated"),
            RequestError::UnknownCommand(cmd) => write!(f, "unsupported command {}", cmd),
            RequestError::UnknownBlock(id) => write!(f, "no register block with id {}", id),
            RequestError::OutOfBounds {
                offset,
                length,
                size,
            } => write!(
                f,
                "range {}+{} exceeds block size {}",
                offset, length, size
            ),
            RequestError::LengthMismatch { declared, actual } => write!(
                f,
                "declared length {} but {} payload bytes present",
                declared, actual
            ),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RequestError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            RequestError::Truncated => defmt::write!(f, "request frame is truncated"),
            RequestError::UnknownCommand(cmd) => defmt::write!(f, "unsupported command {}", cmd),
            RequestError::UnknownBlock(id) => defmt::write!(f, "no register block with id {}", id),
            RequestError::OutOfBounds {
                offset,
                length,
                size,
            } => defmt::write!(
                f,
                "range {}+{} exceeds block size {}",
                offset,
                length,
                size
            ),
            RequestError::LengthMismatch { declared, actual } => defmt::write!(
                f,
                "declared length {} but {} payload bytes present",
                declared,
                actual
            ),
        }
    }
}
