//! Constants and configurable properties of the hardware the engine drives.
//!
//! None of these can be changed by the performer; they describe the circuit (DAC resolution, output gain) and the
//! cadence at which the firmware calls into the engine. They are gathered in [`Config`] so that a board with a
//! different output stage only needs a different `Config`.

use embassy_time::Duration;
use measurements::Voltage;
use wmidi::Note;

/// Number of analog voices, i.e., the number of CV and gate outputs.
pub const VOICE_COUNT: usize = 2;

/// The highest value accepted by the 12-bit DAC.
pub const DAC_MAX: u16 = 4095;

/// Hardware and timing properties consumed by [`MidiState`](crate::MidiState).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// How many slots the polyphonic voice allocator spreads notes across; never more than [`VOICE_COUNT`].
    pub poly_voices: usize,
    /// Interval at which [`MidiState::tick`](crate::MidiState::tick) is called.
    pub tick_interval: Duration,
    /// How long a gate is held low to retrigger an envelope when a new note is played without a break.
    pub retrigger: Duration,
    /// Length of the pulse emitted by a drum channel when it is struck.
    pub drum_trigger: Duration,
    /// The amount of voltage required to change the pitch by an octave.
    pub volts_per_octave: Voltage,
    /// The [`Note`] which maps to 0V before calibration.
    pub zero_volt_note: Note,
    /// Voltage present at the output jacks when the DAC is set to [`DAC_MAX`], i.e., after the output amplifier.
    pub dac_full_scale: Voltage,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poly_voices: VOICE_COUNT,
            tick_interval: Duration::from_millis(1),
            retrigger: Duration::from_millis(2),
            drum_trigger: Duration::from_millis(5),
            volts_per_octave: Voltage::from_volts(1.0),
            zero_volt_note: Note::C2,
            dac_full_scale: Voltage::from_volts(8.19),
        }
    }
}

impl Config {
    /// Number of ticks a retrigger keeps the gate forced low.
    pub fn retrigger_ticks(&self) -> u8 {
        self.ticks(self.retrigger)
    }

    /// Number of ticks a drum trigger pulse lasts.
    pub fn drum_trigger_ticks(&self) -> u8 {
        self.ticks(self.drum_trigger)
    }

    /// Express a duration as a whole number of ticks; always at least one so the effect is observable.
    fn ticks(&self, duration: Duration) -> u8 {
        let interval = self.tick_interval.as_micros().max(1);
        (duration.as_micros() / interval).clamp(1, u64::from(u8::MAX)) as u8
    }

    fn voltage_per_half_step(&self) -> Voltage {
        self.volts_per_octave / 12.0
    }

    /// Returns the uncalibrated DAC code for a given [`Note`], clamped to the range of the DAC.
    pub fn dac_code(&self, note: Note) -> u16 {
        let nth_key = f64::from(u8::from(note)) - f64::from(u8::from(self.zero_volt_note));
        let voltage = nth_key * self.voltage_per_half_step();
        let code = voltage.as_volts() / self.dac_full_scale.as_volts() * f64::from(DAC_MAX);

        if code <= 0.0 {
            0
        } else if code >= f64::from(DAC_MAX) {
            DAC_MAX
        } else {
            // round half up
            (code + 0.5) as u16
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tick_counts() {
        let config = Config::default();
        assert_eq!(2, config.retrigger_ticks(), "Expected left but got right");
        assert_eq!(5, config.drum_trigger_ticks(), "Expected left but got right");
    }

    #[test]
    fn ticks_never_round_to_zero() {
        let config = Config {
            retrigger: Duration::from_micros(10),
            ..Config::default()
        };
        assert_eq!(1, config.retrigger_ticks(), "Expected left but got right");
    }

    #[test]
    fn ticks_saturate() {
        let config = Config {
            retrigger: Duration::from_secs(10),
            ..Config::default()
        };
        assert_eq!(u8::MAX, config.retrigger_ticks(), "Expected left but got right");
    }

    #[test]
    fn dac_code() {
        let config = Config::default();
        assert_eq!(0, config.dac_code(Note::C2), "Expected left but got right");
        // half an octave above C2 is 0.5V; 0.5 / 8.19 * 4095 = 250
        assert_eq!(250, config.dac_code(Note::Gb2), "Expected left but got right");
        assert_eq!(500, config.dac_code(Note::C3), "Expected left but got right");
    }

    #[test]
    fn dac_code_at_top_of_midi_range() {
        // 91 semitones above C2 is 7.58V, still inside the 8.19V range
        assert_eq!(3792, Config::default().dac_code(Note::G9), "Expected left but got right");
    }

    #[test]
    fn dac_code_is_clamped() {
        let config = Config {
            dac_full_scale: Voltage::from_volts(5.0),
            ..Config::default()
        };
        assert_eq!(0, config.dac_code(Note::C1), "Expected left but got right");
        // 5V is reached at C7
        assert_eq!(DAC_MAX, config.dac_code(Note::C7), "Expected left but got right");
        assert_eq!(DAC_MAX, config.dac_code(Note::G9), "Expected left but got right");
    }
}
