use wmidi::Channel;

/// The behavior of the device, selected implicitly by the MIDI channel which most recently carried a message.
///
/// Channels are counted from zero here, as they are on the wire; `Channel::Ch1` selects [`Mode::MonoCvGate`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Monophonic pitch on CV 0; both gates, and CV 1 at full scale, while a note is held.
    #[default]
    MonoCvGate,
    /// Monophonic pitch on CV 0, velocity on CV 1, and the pitch as a DCO frequency.
    MonoCvVelocityDco,
    /// First half of a duophonic session; drives voice 0.
    DualCvGateVoice0,
    /// Second half of a duophonic session; drives voice 1.
    DualCvGateVoice1,
    /// Two-voice polyphony.
    PolyCv,
    /// Converts the modulation wheel and breath controller into voltages.
    CcConversion,
    /// Random voltages, sampled on each note.
    Random,
    /// Drum triggers; CVs follow the triggers.
    DrumTrigger,
    /// Drum triggers; CVs carry the velocity of the last hit.
    DrumVelocity,
    /// Drum triggers; CVs carry the velocity of the last hit while the drum is held.
    DrumGatedVelocity,
    /// Reserved; all outputs are held at zero.
    Reserved10,
    /// Reserved; all outputs are held at zero.
    Reserved11,
    /// Reserved; all outputs are held at zero.
    Reserved12,
    /// Reserved; all outputs are held at zero.
    Reserved13,
    /// Calibration of the voice 0 output.
    CalibrationVoice0,
    /// Calibration of the voice 1 output.
    CalibrationVoice1,
}

impl Mode {
    /// Returns `true` for the modes in which drum channels are advanced by the tick.
    pub fn is_drum(&self) -> bool {
        matches!(
            self,
            Self::DrumTrigger | Self::DrumVelocity | Self::DrumGatedVelocity
        )
    }

    /// Channels 2 and 3 together form one duophonic session; moving between them must not discard held notes.
    pub fn shares_session_with(&self, other: Mode) -> bool {
        matches!(
            (self, other),
            (Self::DualCvGateVoice0, Self::DualCvGateVoice1)
                | (Self::DualCvGateVoice1, Self::DualCvGateVoice0)
        )
    }
}

impl From<Channel> for Mode {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Ch1 => Self::MonoCvGate,
            Channel::Ch2 => Self::MonoCvVelocityDco,
            Channel::Ch3 => Self::DualCvGateVoice0,
            Channel::Ch4 => Self::DualCvGateVoice1,
            Channel::Ch5 => Self::PolyCv,
            Channel::Ch6 => Self::CcConversion,
            Channel::Ch7 => Self::Random,
            Channel::Ch8 => Self::DrumTrigger,
            Channel::Ch9 => Self::DrumVelocity,
            Channel::Ch10 => Self::DrumGatedVelocity,
            Channel::Ch11 => Self::Reserved10,
            Channel::Ch12 => Self::Reserved11,
            Channel::Ch13 => Self::Reserved12,
            Channel::Ch14 => Self::Reserved13,
            Channel::Ch15 => Self::CalibrationVoice0,
            Channel::Ch16 => Self::CalibrationVoice1,
        }
    }
}
