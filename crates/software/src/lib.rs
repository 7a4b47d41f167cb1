//! This crate contains architecture-agnostic logic for the Mode Bridge, a two-voice interface which translates
//! [MIDI](https://midi.org/midi-1-0) messages into the electrical signals understood by analog synthesizers
//! ([CV/gate](https://en.wikipedia.org/wiki/CV/gate)).
//!
//! The device has no buttons or menus. Its behavior is selected by the MIDI channel a message arrives on: a message on
//! channel 5 (counting from zero) puts the device into [`Mode::CcConversion`], a message on channel 6 into
//! [`Mode::Random`], and so on. See [`Mode`] for the full mapping.
//!
//! The moving parts are:
//! - [`MidiState`], which receives USB-MIDI Event Packets and keeps track of what has been played, and
//!   which advances time-based effects when [`MidiState::tick`] is called at a fixed rate;
//! - [`Renderer`], which turns a [`MidiState`] into an [`OutputFrame`] for the hardware to emit.

#![deny(missing_docs)]
#![no_std]

#[macro_use]
mod fmt;

pub mod configuration;

/// Data structures for tracking MIDI messages the device has received.
pub mod midi_state;

mod mode;
pub use mode::*;

/// Conversion of [`MidiState`] into the signals the device emits.
pub mod render;

pub use midi_state::{MidiState, Operation, PacketError};
pub use render::{OutputFrame, Renderer};
