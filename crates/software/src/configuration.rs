//! Settings of the router which are not plain bytes: layer ids, note and pedal modes, and the engine's build-time
//! configuration.

mod activation;
pub use activation::*;

mod layer_id;
pub use layer_id::*;

mod note_mode;
pub use note_mode::*;

mod pedal_mode;
pub use pedal_mode::*;

use num_traits::{FromPrimitive, ToPrimitive};

/// Steps through an enum's variants in discriminant order, wrapping around after the last one.
///
/// Front-panel buttons use it to advance a setting by one on every press.
pub trait CycleConfig {
    /// Returns the next variant, or the first one after the last.
    fn cycle(self) -> Self
    where
        Self: FromPrimitive + ToPrimitive + Sized + Copy,
    {
        let Some(index) = self.to_u8() else {
            return self;
        };
        match <Self as FromPrimitive>::from_u8(index.wrapping_add(1)) {
            Some(new_selection) => new_selection,
            None => FromPrimitive::from_u8(0).unwrap_or(self),
        }
    }
}
