//! Provides [`DrumChannel`], a trigger generator for driving drum modules.

use wmidi::U7;

/// One drum output.
///
/// Striking the drum raises a short trigger pulse and a gate which is held until the drum is stopped. The velocity of
/// the last strike outlives both.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DrumChannel {
    /// Length of the trigger pulse, in ticks.
    trigger_ticks: u8,
    /// Ticks left in the current trigger pulse.
    remaining: u8,
    gated: bool,
    velocity: U7,
}

#[cfg(feature = "defmt")]
impl defmt::Format for DrumChannel {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "DrumChannel {{ remaining: {}, gated: {}, velocity: {} }}",
            self.remaining,
            self.gated,
            u8::from(self.velocity)
        );
    }
}

impl DrumChannel {
    /// Construct a silent `DrumChannel` whose trigger pulses last `trigger_ticks` ticks.
    pub fn new(trigger_ticks: u8) -> Self {
        Self {
            trigger_ticks,
            ..Self::default()
        }
    }

    /// Strike the drum.
    pub fn trigger(&mut self, velocity: U7) {
        self.velocity = velocity;
        self.remaining = self.trigger_ticks;
        self.gated = true;
    }

    /// Silence the drum. The velocity of the last strike is kept.
    pub fn stop(&mut self) {
        self.remaining = 0;
        self.gated = false;
    }

    /// Advance the trigger pulse by one tick.
    pub fn tick(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    /// Returns `true` while the trigger pulse is high.
    pub fn is_triggered(&self) -> bool {
        self.remaining > 0
    }

    /// Velocity of the last strike.
    pub fn velocity(&self) -> U7 {
        self.velocity
    }

    /// Returns `true` from the strike until the drum is stopped.
    pub fn is_gated(&self) -> bool {
        self.gated
    }
}
