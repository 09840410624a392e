use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

/// Identifies one of the eight layers.
///
/// The discriminant is the layer id used on the wire (0..=7). Cycling wraps from [`LayerId::Layer8`] back to
/// [`LayerId::Layer1`], which is how the front-panel button walks the selected layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ToPrimitive, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LayerId {
    /// Wire id 0.
    Layer1,
    /// Wire id 1.
    Layer2,
    /// Wire id 2.
    Layer3,
    /// Wire id 3.
    Layer4,
    /// Wire id 4.
    Layer5,
    /// Wire id 5.
    Layer6,
    /// Wire id 6.
    Layer7,
    /// Wire id 7.
    Layer8,
}

impl LayerId {
    /// Every layer, in routing order.
    pub const ALL: [LayerId; 8] = [
        LayerId::Layer1,
        LayerId::Layer2,
        LayerId::Layer3,
        LayerId::Layer4,
        LayerId::Layer5,
        LayerId::Layer6,
        LayerId::Layer7,
        LayerId::Layer8,
    ];

    /// Returns the layer with the given wire id, if there is one.
    pub fn from_index(index: u8) -> Option<Self> {
        <Self as FromPrimitive>::from_u8(index)
    }

    /// Zero-based position of the layer, usable as an array index.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl super::CycleConfig for LayerId {}
