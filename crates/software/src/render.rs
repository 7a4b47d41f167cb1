use crate::{
    configuration::{DAC_MAX, VOICE_COUNT},
    midi_state::{MidiState, calibration::pitch_to_voltage},
    mode::Mode,
};
use wmidi::{Note, U7};

pub mod dco;

/// Everything the device emits at a given moment.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputFrame {
    /// 12-bit DAC codes for the two CV outputs.
    pub cv: [u16; VOICE_COUNT],
    /// Levels of the two gate outputs.
    pub gate: [bool; VOICE_COUNT],
    /// Period of the DCO in cycles of [`dco::DCO_CLOCK_HZ`]; zero silences it.
    pub dco_frequency: u16,
}

/// Produces [`OutputFrame`]s from a [`MidiState`], remembering the last one.
///
/// The previous frame matters in two places: a pending retrigger toggles the gate relative to its previous level,
/// and [`Mode::MonoCvVelocityDco`] holds its CVs after the last note is released.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Renderer {
    frame: OutputFrame,
}

impl Renderer {
    /// Construct a `Renderer` whose previous frame is all zeroes.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently rendered frame.
    pub fn frame(&self) -> &OutputFrame {
        &self.frame
    }

    /// Render the state unconditionally.
    pub fn render(&mut self, state: &MidiState) -> &OutputFrame {
        self.frame = render(state, &self.frame);
        &self.frame
    }

    /// Render the state if it changed since it was last rendered, marking it rendered.
    pub fn refresh(&mut self, state: &mut MidiState) -> Option<&OutputFrame> {
        if !state.needs_refresh() {
            return None;
        }
        self.frame = render(state, &self.frame);
        state.mark_rendered();
        Some(&self.frame)
    }
}

/// Build the frame for the current mode.
pub fn render(state: &MidiState, previous: &OutputFrame) -> OutputFrame {
    match state.mode() {
        Mode::MonoCvGate => mono_cv_gate(state, previous),
        Mode::MonoCvVelocityDco => mono_cv_velocity_dco(state, previous),
        Mode::DualCvGateVoice0 | Mode::DualCvGateVoice1 => dual_cv_gate(state, previous),
        Mode::PolyCv => poly_cv(state),
        Mode::CcConversion => cc_conversion(state),
        Mode::Random => random(state),
        Mode::DrumTrigger => drum_trigger(state),
        Mode::DrumVelocity => drum_velocity(state),
        Mode::DrumGatedVelocity => drum_gated_velocity(state),
        Mode::Reserved10 | Mode::Reserved11 | Mode::Reserved12 | Mode::Reserved13 => {
            OutputFrame::default()
        }
        Mode::CalibrationVoice0 | Mode::CalibrationVoice1 => calibration(state),
    }
}

/// While a retrigger is pending the gate inverts on every render, which guarantees a falling and a rising edge.
fn retrigger_edge(retrigger: u8, previous_gate: bool) -> bool {
    retrigger == 0 || !previous_gate
}

/// Scale a 7-bit MIDI value to the 12-bit DAC.
fn scale_u7(value: U7) -> u16 {
    u16::from(u8::from(value)) << 5
}

fn full_scale(gate: bool) -> u16 {
    if gate { DAC_MAX } else { 0 }
}

fn note_to_cv(state: &MidiState, note: Note, bend: i16, channel: usize) -> u16 {
    pitch_to_voltage(state.calibrators(), note, bend, channel)
}

fn mono_cv_gate(state: &MidiState, previous: &OutputFrame) -> OutputFrame {
    let voice = &state.mono()[0];
    let Some(top) = voice.notes.top() else {
        return OutputFrame::default();
    };

    let gate = retrigger_edge(voice.retrigger, previous.gate[0]);
    OutputFrame {
        cv: [
            note_to_cv(state, top.note, voice.pitch_bend, 0),
            full_scale(gate),
        ],
        gate: [gate; 2],
        dco_frequency: 0,
    }
}

fn mono_cv_velocity_dco(state: &MidiState, previous: &OutputFrame) -> OutputFrame {
    let voice = &state.mono()[0];
    let Some(top) = voice.notes.top() else {
        // pitch and velocity are held for the release of the envelope
        return OutputFrame {
            gate: [false; 2],
            ..*previous
        };
    };

    let gate = retrigger_edge(voice.retrigger, previous.gate[0]);
    OutputFrame {
        cv: [
            note_to_cv(state, top.note, voice.pitch_bend, 0),
            scale_u7(top.velocity),
        ],
        gate: [gate; 2],
        dco_frequency: dco::dco_count(top.note, voice.pitch_bend),
    }
}

fn dual_cv_gate(state: &MidiState, previous: &OutputFrame) -> OutputFrame {
    let mut frame = OutputFrame::default();
    for (i, voice) in state.mono().iter().enumerate() {
        if let Some(top) = voice.notes.top() {
            frame.cv[i] = note_to_cv(state, top.note, voice.pitch_bend, i);
            frame.gate[i] = retrigger_edge(voice.retrigger, previous.gate[i]);
        }
    }
    frame
}

fn poly_cv(state: &MidiState) -> OutputFrame {
    let bend = state.mono()[0].pitch_bend;
    let mut frame = OutputFrame::default();
    for (i, slot) in state.poly().iter().enumerate() {
        if let Some(note) = slot.note {
            frame.cv[i] = note_to_cv(state, note, bend, i);
            frame.gate[i] = slot.retrigger == 0;
        }
    }
    frame
}

fn cc_conversion(state: &MidiState) -> OutputFrame {
    let values = state.control_change_values();
    OutputFrame {
        cv: values.map(scale_u7),
        gate: values.map(|value| u8::from(value) >= 64),
        dco_frequency: 0,
    }
}

fn random(state: &MidiState) -> OutputFrame {
    let values = state.random().values();
    OutputFrame {
        cv: values,
        gate: values.map(|value| value & 1 == 1),
        dco_frequency: 0,
    }
}

fn drum_trigger(state: &MidiState) -> OutputFrame {
    let gate = state.drums().map(|drum| drum.is_triggered());
    OutputFrame {
        cv: gate.map(full_scale),
        gate,
        dco_frequency: 0,
    }
}

fn drum_velocity(state: &MidiState) -> OutputFrame {
    OutputFrame {
        cv: state.drums().map(|drum| scale_u7(drum.velocity())),
        ..drum_trigger(state)
    }
}

fn drum_gated_velocity(state: &MidiState) -> OutputFrame {
    let mut frame = drum_velocity(state);
    for (cv, drum) in frame.cv.iter_mut().zip(state.drums()) {
        if !drum.is_gated() {
            *cv = 0;
        }
    }
    frame
}

fn calibration(state: &MidiState) -> OutputFrame {
    let note = state.calibrated_note();
    OutputFrame {
        cv: core::array::from_fn(|i| note_to_cv(state, note, 0, i)),
        gate: [true; 2],
        dco_frequency: 0,
    }
}
