//! Provides [`Lfsr`], the source of the random voltages.

/// Value the generator starts from.
const SEED: u16 = 42;

/// Feedback taps of the 16-bit Galois shift register.
const FEEDBACK_MASK: u16 = 0xb400;

/// A 16-bit Galois linear-feedback shift register and the last two values derived from it.
///
/// Derived values are the upper 12 bits of the register, ready to be sent to the DAC.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Lfsr {
    state: u16,
    values: [u16; 2],
}

impl Default for Lfsr {
    fn default() -> Self {
        Self {
            state: SEED,
            values: [0; 2],
        }
    }
}

impl Lfsr {
    /// Shift the register once, returning the derived value.
    fn step(&mut self) -> u16 {
        let lsb = self.state & 1;
        self.state = (self.state >> 1) ^ (0_u16.wrapping_sub(lsb) & FEEDBACK_MASK);
        self.state >> 4
    }

    /// Shift the register twice, refreshing both derived values.
    pub fn advance(&mut self) {
        self.values[0] = self.step();
        self.values[1] = self.step();
    }

    /// The last two derived values.
    pub fn values(&self) -> [u16; 2] {
        self.values
    }
}
