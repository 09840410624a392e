//! The byte-addressable register blocks exposed to the register protocol.
//!
//! There is one [`GlobalRegisters`] block and one [`LayerRegisters`] block per layer. Each block is held as a typed
//! struct and converted to and from its wire image explicitly, so the wire layout never depends on how the compiler
//! lays out memory. Requests are applied to the wire image and the result is parsed back; a request that does not
//! fit the block is refused as a whole before anything is copied.

mod global;
pub use global::*;

mod layer;
pub use layer::*;

use crate::{configuration::LayerId, error::RequestError};

/// Number of layers.
pub const LAYER_COUNT: usize = 8;

/// Number of pedal slots, both in the global block and in every layer block.
pub const PEDAL_COUNT: usize = 8;

/// Number of harmonic bars (drawbars) of the organ voice.
pub const HARMONIC_BAR_COUNT: usize = 9;

/// The layer id which addresses the global block.
pub const GLOBAL_BLOCK_ID: u8 = 15;

/// Selects a register block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Block {
    /// The global block, layer id 15.
    Global,
    /// A layer block, layer id 0..=7.
    Layer(LayerId),
}

impl Block {
    /// Resolves the four-bit layer id of a request.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            GLOBAL_BLOCK_ID => Some(Self::Global),
            _ => LayerId::from_index(id).map(Self::Layer),
        }
    }

    /// The four-bit layer id used on the wire.
    pub fn id(self) -> u8 {
        match self {
            Self::Global => GLOBAL_BLOCK_ID,
            Self::Layer(layer) => layer as u8,
        }
    }

    /// Size of the block in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Global => GlobalRegisters::SIZE,
            Self::Layer(_) => LayerRegisters::SIZE,
        }
    }
}

/// Checks that `offset..offset + length` lies within a block of `size` bytes.
pub fn check_window(offset: u8, length: u8, size: usize) -> Result<(), RequestError> {
    if usize::from(offset) + usize::from(length) > size {
        Err(RequestError::OutOfBounds {
            offset,
            length,
            size,
        })
    } else {
        Ok(())
    }
}

/// Copies `payload` into `image` at `offset`, refusing the whole write if it does not fit.
pub(crate) fn write_window(image: &mut [u8], offset: u8, payload: &[u8]) -> Result<(), RequestError> {
    let length = u8::try_from(payload.len()).map_err(|_| RequestError::OutOfBounds {
        offset,
        length: u8::MAX,
        size: image.len(),
    })?;
    check_window(offset, length, image.len())?;

    let start = usize::from(offset);
    image[start..start + payload.len()].copy_from_slice(payload);
    Ok(())
}

/// Borrows `length` bytes of `image` starting at `offset`.
pub(crate) fn read_window(image: &[u8], offset: u8, length: u8) -> Result<&[u8], RequestError> {
    check_window(offset, length, image.len())?;

    let start = usize::from(offset);
    Ok(&image[start..start + usize::from(length)])
}

fn put(image: &mut [u8], offset: u8, values: &[u8]) {
    let start = usize::from(offset);
    image[start..start + values.len()].copy_from_slice(values);
}

fn take<const N: usize>(image: &[u8], offset: u8) -> [u8; N] {
    let start = usize::from(offset);
    let mut values = [0_u8; N];
    values.copy_from_slice(&image[start..start + N]);
    values
}

/// Converts a biased wire byte into a signed value: the wire carries `value + 64`.
pub fn unbias(wire: u8) -> i8 {
    wire.wrapping_sub(0x40) as i8
}

/// Converts a signed value into its biased wire byte.
pub fn bias(value: i8) -> u8 {
    (value as u8).wrapping_add(0x40)
}
