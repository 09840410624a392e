//! This crate contains architecture-agnostic logic for the midibox, a MIDI splitter which sits between a keyboard
//! instrument and its sound engine. Incoming [MIDI](https://midi.org/midi-1-0) is fanned out into up to eight
//! independently configured layers (key range, transposition, velocity scaling, output channel), and every setting is
//! held in byte-addressable register blocks which a remote editor reads and writes over System Exclusive.
//!
//! The [`engine::Engine`] is the entry point; it is driven by the caller and talks back through a [`host::Host`].

#![deny(missing_docs)]
#![cfg_attr(not(test), no_std)]

pub mod configuration;
pub mod engine;
pub mod envelope;
pub mod error;

/// The interface through which the engine reaches its surroundings.
pub mod host;

/// Per-layer state which is not exposed through the registers, such as which notes are sounding.
pub mod midi_state;

pub mod protocol;
pub mod registers;
pub mod usb_midi;

#[cfg(test)]
mod test_host;

/// Re-exported so that callers build [`Instant`][embassy_time::Instant]s of the same version the engine uses.
pub use embassy_time;
