use defmt::*;
use embassy_stm32::{
    dac::{DacCh1, DacCh2, Value},
    gpio::{Level, Output},
    mode::Async,
    peripherals::{DAC1, TIM1},
    time::Hertz,
    timer::simple_pwm::SimplePwm,
};
use mode_bridge_lib::{OutputFrame, render::dco::count_to_hertz};

/// The jacks of the device: two CVs, two gates, and the square wave of the DCO.
pub struct Outputs {
    cv0: DacCh1<'static, DAC1, Async>,
    cv1: DacCh2<'static, DAC1, Async>,
    gates: [Output<'static>; 2],
    dco: SimplePwm<'static, TIM1>,
}

impl Outputs {
    pub fn new(
        cv0: DacCh1<'static, DAC1, Async>,
        cv1: DacCh2<'static, DAC1, Async>,
        gates: [Output<'static>; 2],
        dco: SimplePwm<'static, TIM1>,
    ) -> Self {
        Self {
            cv0,
            cv1,
            gates,
            dco,
        }
    }

    /// Drive every output to match the frame.
    pub fn write(&mut self, frame: &OutputFrame) {
        self.cv0.set(Value::Bit12Right(frame.cv[0]));
        self.cv1.set(Value::Bit12Right(frame.cv[1]));

        for (gate, high) in self.gates.iter_mut().zip(frame.gate) {
            gate.set_level(Level::from(high));
        }

        match count_to_hertz(frame.dco_frequency) {
            Some(hz) => {
                trace!("DCO at {} Hz", hz);
                self.dco.set_frequency(Hertz(hz));
                let mut ch = self.dco.ch1();
                // square wave
                ch.set_duty_cycle_fraction(1, 2);
                ch.enable();
            }
            None => self.dco.ch1().disable(),
        }
    }
}
