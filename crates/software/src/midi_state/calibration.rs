//! Calibration of the pitch CV outputs.
//!
//! Each output has nine anchors, one every six semitones from F#2 (note 42) to F#6 (note 90), holding the DAC code
//! which produces the right voltage for that note. Pitches between anchors are interpolated.
//!
//! Anchors are adjusted from a keyboard on channel 14 (output 0) or 15 (output 1): playing an anchor note selects it for
//! monitoring, and playing the note just below or just above it nudges the anchor down or up by one DAC step.

use crate::configuration::{Config, DAC_MAX};
use wmidi::{Note, U7};

/// Number of adjustable anchors per output.
pub const ANCHOR_COUNT: usize = 9;

/// Note of the first anchor.
const FIRST_ANCHOR_NOTE: u8 = 42;

/// Distance between anchors, in semitones.
const ANCHOR_SPACING: u8 = 6;

/// Distance between anchors, in 1/128 semitone.
const SEGMENT: i32 = (ANCHOR_SPACING as i32) << 7;

/// Returns the note of an anchor, counting anchors from one, or `None` if there is no such anchor.
pub fn anchor_note(anchor: usize) -> Option<u8> {
    let index = u8::try_from(anchor.checked_sub(1)?).ok()?;
    (usize::from(index) < ANCHOR_COUNT).then(|| FIRST_ANCHOR_NOTE + ANCHOR_SPACING * index)
}

/// What a note received on a calibration channel asks for.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Adjustment {
    /// Monitor an anchor without changing it.
    Select {
        /// The anchor, counting from one.
        anchor: usize,
    },
    /// Move an anchor by one DAC step.
    Nudge {
        /// The anchor, counting from one.
        anchor: usize,
        /// `-1` or `+1`.
        delta: i8,
    },
}

impl Adjustment {
    /// Interpret a note received on a calibration channel; notes not adjacent to an anchor mean nothing.
    pub fn from_note(note: Note) -> Option<Self> {
        let note = note as u8;
        (1..=ANCHOR_COUNT).find_map(|anchor| {
            let anchor_note = anchor_note(anchor)?;
            if note + 1 == anchor_note {
                Some(Self::Nudge { anchor, delta: -1 })
            } else if note == anchor_note + 1 {
                Some(Self::Nudge { anchor, delta: 1 })
            } else if note == anchor_note {
                Some(Self::Select { anchor })
            } else {
                None
            }
        })
    }

    /// The anchor concerned, counting from one.
    pub fn anchor(&self) -> usize {
        match *self {
            Self::Select { anchor } | Self::Nudge { anchor, .. } => anchor,
        }
    }

    /// The note of the anchor concerned, which becomes the note under calibration. `None` if the anchor is not in
    /// `1..=ANCHOR_COUNT`.
    pub fn anchor_note(&self) -> Option<Note> {
        anchor_note(self.anchor()).map(|note| Note::from(U7::from_u8_lossy(note)))
    }
}

/// The anchor table of one output and the conversion of pitches to DAC codes.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibrator {
    channel: u8,
    anchors: [u16; ANCHOR_COUNT],
    defaults: [u16; ANCHOR_COUNT],
}

impl Calibrator {
    /// Construct the `Calibrator` for an output, with anchors placed per the [`Config`].
    pub fn new(channel: u8, config: &Config) -> Self {
        let defaults = core::array::from_fn(|i| {
            anchor_note(i + 1).map_or(0, |note| config.dac_code(Note::from(U7::from_u8_lossy(note))))
        });
        Self {
            channel,
            anchors: defaults,
            defaults,
        }
    }

    /// Restore the uncalibrated anchors and assign the output this table belongs to.
    pub fn init(&mut self, channel: u8) {
        self.channel = channel;
        self.anchors = self.defaults;
    }

    /// Index of the output this table belongs to.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Current anchor values, first anchor first.
    pub fn anchors(&self) -> &[u16; ANCHOR_COUNT] {
        &self.anchors
    }

    /// Move an anchor (counting from one) by `delta` DAC steps, staying within the DAC's range. Anchors outside
    /// `1..=ANCHOR_COUNT` are ignored.
    pub fn adjust(&mut self, anchor: usize, delta: i8) {
        let Some(value) = anchor
            .checked_sub(1)
            .and_then(|i| self.anchors.get_mut(i))
        else {
            return;
        };
        *value = value
            .saturating_add_signed(i16::from(delta))
            .min(DAC_MAX);
    }

    /// Returns the DAC code for a note bent by a 14-bit signed pitch bend (±2 semitones).
    pub fn note_to_cv(&self, note: Note, bend: i16) -> u16 {
        let pitch = (i32::from(note as u8) << 7) + i32::from(bend >> 5);
        let offset = pitch - (i32::from(FIRST_ANCHOR_NOTE) << 7);

        // outside the anchors, the nearest segment is extended
        let segment = offset.div_euclid(SEGMENT).clamp(0, ANCHOR_COUNT as i32 - 2);
        let within = offset - segment * SEGMENT;
        let low = i32::from(self.anchors[segment as usize]);
        let high = i32::from(self.anchors[segment as usize + 1]);

        (low + (high - low) * within / SEGMENT).clamp(0, i32::from(DAC_MAX)) as u16
    }
}

/// Returns the DAC code for a note on one of the outputs, using that output's anchor table.
pub fn pitch_to_voltage(calibrators: &[Calibrator], note: Note, bend: i16, channel: usize) -> u16 {
    calibrators
        .get(channel)
        .map_or(0, |calibrator| calibrator.note_to_cv(note, bend))
}
