//! Framing of USB-MIDI Event Packets into [`MidiEvent`]s.
//!
//! Each packet is four bytes: a header whose low nibble is the Code Index Number, a MIDI status byte whose low nibble
//! is the channel, and two data bytes. Dispatch is by Code Index Number; the high nibble of the status byte is not
//! consulted.

use core::fmt;
use wmidi::{Channel, ControlFunction, ControlValue, Note, U7};

/// Length of a USB-MIDI Event Packet.
pub const PACKET_LEN: usize = 4;

/// Code Index Numbers the engine responds to.
const CIN_NOTE_OFF: u8 = 0x8;
const CIN_NOTE_ON: u8 = 0x9;
const CIN_CONTROL_CHANGE: u8 = 0xb;
const CIN_PITCH_BEND: u8 = 0xe;

/// Center of the 14-bit pitch bend range.
const PITCH_BEND_CENTER: i16 = 8192;

/// Reasons a buffer of packets is refused.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketError {
    /// The buffer does not hold a whole number of packets; nothing in it was applied.
    Misaligned {
        /// Length of the refused buffer.
        len: usize,
    },
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Misaligned { len } => write!(
                f,
                "USB-MIDI Event Packets must always be 32 bits long; received {len} bytes"
            ),
        }
    }
}

/// A channel voice message the engine acts upon.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MidiEvent {
    /// A key was released. Release velocity is not used.
    NoteOff {
        /// Channel the message arrived on.
        channel: Channel,
        /// The released note.
        note: Note,
    },
    /// A key was struck.
    NoteOn {
        /// Channel the message arrived on.
        channel: Channel,
        /// The struck note.
        note: Note,
        /// Strike velocity; zero is a release in disguise.
        velocity: U7,
    },
    /// A controller moved.
    ControlChange {
        /// Channel the message arrived on.
        channel: Channel,
        /// Which controller.
        function: ControlFunction,
        /// Its new value.
        value: ControlValue,
    },
    /// The pitch wheel moved.
    PitchBend {
        /// Channel the message arrived on.
        channel: Channel,
        /// Signed offset from center, `-8192..=8191`.
        bend: i16,
    },
}

/// One decoded packet.
///
/// The channel is kept even when the packet carries nothing the engine acts upon, as any traffic on a new channel
/// ends the current session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Packet {
    /// Channel from the status byte.
    pub channel: Channel,
    /// The event, or `None` for Code Index Numbers the engine ignores.
    pub event: Option<MidiEvent>,
}

impl Packet {
    /// Decode a single four-byte packet.
    pub fn from_bytes(bytes: [u8; PACKET_LEN]) -> Self {
        let code_index = bytes[0] & 0x0f;
        let channel = channel(bytes[1]);
        let data1 = U7::from_u8_lossy(bytes[2] & 0x7f);
        let data2 = U7::from_u8_lossy(bytes[3] & 0x7f);

        let event = match code_index {
            CIN_NOTE_OFF => Some(MidiEvent::NoteOff {
                channel,
                note: Note::from(data1),
            }),
            CIN_NOTE_ON => Some(MidiEvent::NoteOn {
                channel,
                note: Note::from(data1),
                velocity: data2,
            }),
            CIN_CONTROL_CHANGE => Some(MidiEvent::ControlChange {
                channel,
                function: ControlFunction(data1),
                value: data2,
            }),
            CIN_PITCH_BEND => {
                let value = (i16::from(u8::from(data2)) << 7) + i16::from(u8::from(data1));
                Some(MidiEvent::PitchBend {
                    channel,
                    bend: value - PITCH_BEND_CENTER,
                })
            }
            _ => None,
        };

        Self { channel, event }
    }
}

/// Every nibble names a channel, so the fallback is never taken.
fn channel(status: u8) -> Channel {
    Channel::from_index(status & 0x0f).unwrap_or(Channel::Ch1)
}

/// Split a buffer into packets. A buffer which isn't a whole number of packets is refused outright.
pub fn packets(data: &[u8]) -> Result<impl Iterator<Item = Packet> + '_, PacketError> {
    if data.len() % PACKET_LEN != 0 {
        return Err(PacketError::Misaligned { len: data.len() });
    }

    Ok(data.chunks_exact(PACKET_LEN).map(|chunk| {
        let mut bytes = [0_u8; PACKET_LEN];
        bytes.copy_from_slice(chunk);
        Packet::from_bytes(bytes)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on() {
        assert_eq!(
            Packet {
                channel: Channel::Ch4,
                event: Some(MidiEvent::NoteOn {
                    channel: Channel::Ch4,
                    note: Note::C4,
                    velocity: U7::from_u8_lossy(100),
                }),
            },
            Packet::from_bytes([0x09, 0x93, 60, 100]),
            "Expected left but got right"
        );
    }

    #[test]
    fn dispatch_ignores_status_nibble() {
        // a NoteOn status inside a NoteOff packet is a NoteOff
        assert_eq!(
            Some(MidiEvent::NoteOff {
                channel: Channel::Ch1,
                note: Note::C4,
            }),
            Packet::from_bytes([0x08, 0x90, 60, 100]).event,
            "Expected left but got right"
        );
    }

    #[test]
    fn cable_number_is_ignored() {
        assert_eq!(
            Packet::from_bytes([0x09, 0x90, 60, 100]),
            Packet::from_bytes([0x39, 0x90, 60, 100]),
            "Expected left but got right"
        );
    }

    #[test]
    fn control_change() {
        assert_eq!(
            Some(MidiEvent::ControlChange {
                channel: Channel::Ch6,
                function: ControlFunction::MODULATION_WHEEL,
                value: U7::from_u8_lossy(64),
            }),
            Packet::from_bytes([0x0b, 0xb5, 1, 64]).event,
            "Expected left but got right"
        );
    }

    #[test]
    fn pitch_bend_is_centered() {
        let bend = |lsb, msb| match Packet::from_bytes([0x0e, 0xe0, lsb, msb]).event {
            Some(MidiEvent::PitchBend { bend, .. }) => bend,
            _ => panic!("Expected a pitch bend"),
        };
        assert_eq!(0, bend(0x00, 0x40), "Expected left but got right");
        assert_eq!(-8192, bend(0x00, 0x00), "Expected left but got right");
        assert_eq!(8191, bend(0x7f, 0x7f), "Expected left but got right");
    }

    #[test]
    fn data_bytes_are_masked() {
        assert_eq!(
            Some(MidiEvent::NoteOn {
                channel: Channel::Ch1,
                note: Note::C4,
                velocity: U7::from_u8_lossy(1),
            }),
            Packet::from_bytes([0x09, 0x90, 60 | 0x80, 0x81]).event,
            "Expected left but got right"
        );
    }

    #[test]
    fn unknown_code_index_keeps_channel() {
        assert_eq!(
            Packet {
                channel: Channel::Ch16,
                event: None,
            },
            Packet::from_bytes([0x0a, 0xaf, 60, 10]),
            "Expected left but got right"
        );
    }

    #[test]
    fn every_nibble_names_a_channel() {
        for nibble in 0..16_u8 {
            let packet = Packet::from_bytes([0x0b, 0xb0 | nibble, 1, 0]);
            assert_eq!(nibble, packet.channel.index(), "Expected left but got right");
        }
        // the high nibble of the status byte plays no part
        assert_eq!(Channel::Ch3, channel(0xf2), "Expected left but got right");
    }

    #[test]
    fn packets_splits_buffer() {
        let data = [0x09, 0x90, 60, 100, 0x08, 0x80, 60, 0];
        let mut iter = packets(&data).expect("buffer should be aligned");
        assert!(matches!(
            iter.next().and_then(|p| p.event),
            Some(MidiEvent::NoteOn { .. })
        ));
        assert!(matches!(
            iter.next().and_then(|p| p.event),
            Some(MidiEvent::NoteOff { .. })
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn packets_refuses_misaligned_buffer() {
        let data = [0x09, 0x90, 60, 100, 0x08];
        assert_eq!(
            Some(PacketError::Misaligned { len: 5 }),
            packets(&data).err(),
            "Expected left but got right"
        );
    }

    #[test]
    fn empty_buffer_is_aligned() {
        assert_eq!(
            Some(0),
            packets(&[]).ok().map(|iter| iter.count()),
            "Expected left but got right"
        );
    }
}
