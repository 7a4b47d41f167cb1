use crate::{
    configuration::{Config, VOICE_COUNT},
    mode::Mode,
};
use bitmask_enum::bitmask;
use wmidi::{Channel, ControlFunction, ControlValue, Note, U7};

pub mod calibration;
use calibration::{Adjustment, Calibrator};

mod drum;
pub use drum::*;

mod note_stack;
pub use note_stack::*;

pub mod packet;
pub use packet::{MidiEvent, PacketError};

mod poly_allocator;
pub use poly_allocator::*;

mod random;
pub use random::*;

/// The channel whose controllers feed [`Mode::CcConversion`].
const CC_CHANNEL: u8 = 5;

/// Notes which strike the two drum channels.
const DRUM_NOTES: [u8; 2] = [36, 38];

/// Note monitored in calibration mode until an anchor is chosen.
const DEFAULT_CALIBRATED_NOTE: Note = Note::C4;

/// Operations that may be performed during a state update.
#[bitmask(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Operation {
    /// A note was added or removed, a drum was struck or stopped, or the random values were resampled.
    NoteChange,
    /// A controller value changed.
    ControlChange,
    /// A pitch bend register changed.
    PitchBendChange,
    /// A calibration anchor was adjusted or selected.
    Calibration,
    /// The mode changed.
    ModeChange,
    /// Notes, drums and pitch bend were discarded because a new channel took over.
    Reset,
}

/// One of the two monophonic voices.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MonoVoice {
    /// Held notes, most recent on top.
    pub notes: NoteStack,
    /// Signed 14-bit pitch bend.
    pub pitch_bend: i16,
    /// Ticks left during which the gate is forced to toggle, so the envelope restarts.
    pub retrigger: u8,
    /// When set (CC 68), changing notes without a break does not retrigger.
    pub legato: bool,
}

/// One voice of the polyphonic allocator.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PolySlot {
    /// The note sounding on this voice, if any.
    pub note: Option<Note>,
    /// Ticks left during which the gate is held low after the voice was stolen.
    pub retrigger: u8,
}

#[cfg(feature = "defmt")]
impl defmt::Format for PolySlot {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "PolySlot {{ note: {}, retrigger: {} }}",
            self.note.map(|n| n as u8),
            self.retrigger
        );
    }
}

/// Everything the device remembers about the MIDI it has received.
///
/// The mode is the channel of the most recent message. Moving to a different channel discards held notes, drum
/// hits and pitch bend, since the new mode would otherwise render leftovers of the old one; the exception is moving
/// between the two halves of a duophonic session (channels 2 and 3). Calibration, controller values, legato and the
/// random generator always survive.
///
/// Whenever something changes that could affect the output, the state is marked stale; see
/// [`Renderer::refresh`](crate::Renderer::refresh).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MidiState {
    mode: Mode,
    mono: [MonoVoice; VOICE_COUNT],
    poly_allocator: PolyAllocator,
    poly: [PolySlot; VOICE_COUNT],
    control_change: [U7; 2],
    random: Lfsr,
    drums: [DrumChannel; 2],
    calibrators: [Calibrator; VOICE_COUNT],
    calibrated_note: Note,
    retrigger_ticks: u8,
    needs_refresh: bool,
}

#[cfg(feature = "defmt")]
impl defmt::Format for MidiState {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "MidiState {{ mode: {}, mono: {}, poly: {}, control_change: [{}, {}], drums: {}, calibrated_note: {} }}",
            self.mode,
            self.mono,
            self.poly,
            u8::from(self.control_change[0]),
            u8::from(self.control_change[1]),
            self.drums,
            self.calibrated_note as u8
        );
    }
}

impl Default for MidiState {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl MidiState {
    /// Construct the state the device powers up in.
    pub fn new(config: &Config) -> Self {
        let mut poly_allocator = PolyAllocator::default();
        poly_allocator.set_size(config.poly_voices);
        let drum = DrumChannel::new(config.drum_trigger_ticks());

        let mut state = Self {
            mode: Mode::default(),
            mono: [MonoVoice::default(); VOICE_COUNT],
            poly_allocator,
            poly: [PolySlot::default(); VOICE_COUNT],
            control_change: [U7::from_u8_lossy(0); 2],
            random: Lfsr::default(),
            drums: [drum; 2],
            calibrators: core::array::from_fn(|i| Calibrator::new(i as u8, config)),
            calibrated_note: DEFAULT_CALIBRATED_NOTE,
            retrigger_ticks: config.retrigger_ticks(),
            needs_refresh: true,
        };
        state.reset();
        state
    }

    /// Discard held notes, drum hits and pitch bend.
    pub fn reset(&mut self) {
        for voice in self.mono.iter_mut() {
            voice.notes.clear();
            voice.pitch_bend = 0;
        }
        self.poly_allocator.init();
        for slot in self.poly.iter_mut() {
            slot.note = None;
        }
        for drum in self.drums.iter_mut() {
            drum.stop();
        }
    }

    /// Updates the `MidiState` given a slice of data. Returns the type of [`Operation`] performed.
    ///
    /// Data may contain one or more USB-MIDI Event Packets, which are applied in order. Data which isn't a whole number
    /// of packets is refused without applying any of it.
    pub fn update(&mut self, data: &[u8]) -> Result<Operation, PacketError> {
        let packets = match packet::packets(data) {
            Ok(packets) => packets,
            Err(e) => {
                error!("Refusing MIDI: {}", e);
                return Err(e);
            }
        };

        let mut operation = Operation::none();
        for packet in packets {
            let mode = Mode::from(packet.channel);
            if mode != self.mode && !self.mode.shares_session_with(mode) {
                info!("Channel {} took over; resetting", packet.channel.index());
                self.reset();
                operation |= Operation::Reset;
            }

            if let Some(event) = packet.event {
                operation |= self.apply(event);
                if mode != self.mode {
                    operation |= Operation::ModeChange;
                }
                self.mode = mode;
            } else {
                trace!("Ignoring packet on channel {}", packet.channel.index());
            }
            self.needs_refresh = true;
        }
        Ok(operation)
    }

    /// Apply a single event.
    pub fn apply(&mut self, event: MidiEvent) -> Operation {
        match event {
            MidiEvent::NoteOff { channel, note } => {
                debug!("NoteOff: channel {}, note {}", channel.index(), note.to_str());
                self.note_off(channel, note)
            }
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => {
                debug!(
                    "NoteOn: channel {}, note {}, velocity {}",
                    channel.index(),
                    note.to_str(),
                    u8::from(velocity)
                );
                self.note_on(channel, note, velocity)
            }
            MidiEvent::ControlChange {
                channel,
                function,
                value,
            } => {
                debug!(
                    "Control Change: channel {}, controller {}, value {}",
                    channel.index(),
                    u8::from(function),
                    u8::from(value)
                );
                self.control_change(channel, function, value)
            }
            MidiEvent::PitchBend { channel, bend } => {
                debug!("Pitch Bend: channel {}, value {}", channel.index(), bend);
                self.pitch_bend(channel, bend)
            }
        }
    }

    /// Handle a struck key.
    ///
    /// A velocity of zero releases the note and then carries on as a NoteOn with zero velocity, so a mono voice ends
    /// up holding the note again (at velocity zero). Rendering relies on the resulting stack, so this is kept as is.
    pub fn note_on(&mut self, channel: Channel, note: Note, velocity: U7) -> Operation {
        let mut operation = Operation::none();
        if u8::from(velocity) == 0 {
            operation |= self.note_off(channel, note);
        }

        match channel.index() {
            0..=3 => {
                let voice = &mut self.mono[mono_voice(channel)];
                voice.retrigger = if !voice.notes.is_empty() && !voice.legato {
                    self.retrigger_ticks
                } else {
                    0
                };
                voice.notes.push(note, velocity);
                operation |= Operation::NoteChange;
            }
            4 => {
                let index = self.poly_allocator.allocate(note);
                if let Some(slot) = self.poly.get_mut(index) {
                    slot.retrigger = if slot.note.is_some() {
                        self.retrigger_ticks
                    } else {
                        0
                    };
                    slot.note = Some(note);
                    operation |= Operation::NoteChange;
                }
            }
            6 => {
                self.random.advance();
                operation |= Operation::NoteChange;
            }
            7..=9 => {
                if let Some(drum) = self.drum_for(note) {
                    drum.trigger(velocity);
                    operation |= Operation::NoteChange;
                } else {
                    trace!("No drum on note {}", note as u8);
                }
            }
            14 | 15 => operation |= self.calibrate(channel, note),
            _ => {}
        }
        operation
    }

    /// Handle a released key.
    pub fn note_off(&mut self, channel: Channel, note: Note) -> Operation {
        match channel.index() {
            0..=3 => {
                let voice = &mut self.mono[mono_voice(channel)];
                let top_note = voice.notes.top().map(|entry| entry.note);
                voice.notes.pop(note);
                if let Some(uncovered) = voice.notes.top() {
                    if Some(uncovered.note) != top_note {
                        voice.retrigger = if voice.legato {
                            0
                        } else {
                            self.retrigger_ticks
                        };
                    }
                }
                Operation::NoteChange
            }
            4 => match self.poly_allocator.release(note) {
                Some(index) => {
                    if let Some(slot) = self.poly.get_mut(index) {
                        slot.note = None;
                    }
                    Operation::NoteChange
                }
                None => {
                    trace!("No voice holds note {}", note as u8);
                    Operation::none()
                }
            },
            7 => match self.drum_for(note) {
                Some(drum) => {
                    drum.stop();
                    Operation::NoteChange
                }
                None => Operation::none(),
            },
            _ => Operation::none(),
        }
    }

    /// Handle a controller.
    pub fn control_change(
        &mut self,
        channel: Channel,
        function: ControlFunction,
        value: ControlValue,
    ) -> Operation {
        match channel.index() {
            CC_CHANNEL if function == ControlFunction::MODULATION_WHEEL => {
                self.control_change[0] = value;
                Operation::ControlChange
            }
            CC_CHANNEL if function == ControlFunction::BREATH_CONTROLLER => {
                self.control_change[1] = value;
                Operation::ControlChange
            }
            0..=3 if function == ControlFunction::LEGATO_FOOTSWITCH => {
                self.mono[mono_voice(channel)].legato = u8::from(value) >= 64;
                Operation::ControlChange
            }
            _ => {
                trace!(
                    "Ignoring controller {} on channel {}",
                    u8::from(function),
                    channel.index()
                );
                Operation::none()
            }
        }
    }

    /// Handle the pitch wheel. `bend` is signed, centered on zero.
    pub fn pitch_bend(&mut self, channel: Channel, bend: i16) -> Operation {
        match channel.index() {
            0..=2 | 4 => {
                self.mono[0].pitch_bend = bend;
                Operation::PitchBendChange
            }
            3 => {
                self.mono[1].pitch_bend = bend;
                Operation::PitchBendChange
            }
            _ => Operation::none(),
        }
    }

    /// Notes on channels 14 and 15 adjust the calibration of outputs 0 and 1 respectively.
    fn calibrate(&mut self, channel: Channel, note: Note) -> Operation {
        let Some(adjustment) = Adjustment::from_note(note) else {
            return Operation::none();
        };
        let output = usize::from(channel.index() - 14);

        if let Adjustment::Nudge { anchor, delta } = adjustment {
            if let Some(calibrator) = self.calibrators.get_mut(output) {
                calibrator.adjust(anchor, delta);
                info!(
                    "Output {} anchor {} moved to {}",
                    output,
                    anchor,
                    calibrator.anchors().get(anchor.wrapping_sub(1))
                );
            }
        }
        if let Some(note) = adjustment.anchor_note() {
            self.calibrated_note = note;
        }
        Operation::Calibration
    }

    fn drum_for(&mut self, note: Note) -> Option<&mut DrumChannel> {
        let index = DRUM_NOTES.iter().position(|&n| n == note as u8)?;
        self.drums.get_mut(index)
    }

    /// Advance time-based effects by one tick. Returns `true` if anything changed.
    pub fn tick(&mut self) -> bool {
        let mut changed = false;
        if self.mode.is_drum() {
            for drum in self.drums.iter_mut() {
                drum.tick();
            }
            changed = true;
        }

        let countdowns = self
            .mono
            .iter_mut()
            .map(|voice| &mut voice.retrigger)
            .chain(self.poly.iter_mut().map(|slot| &mut slot.retrigger));
        for retrigger in countdowns {
            if *retrigger > 0 {
                *retrigger -= 1;
                changed = true;
            }
        }

        if changed {
            self.needs_refresh = true;
        }
        changed
    }

    /// The current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The monophonic voices.
    pub fn mono(&self) -> &[MonoVoice; VOICE_COUNT] {
        &self.mono
    }

    /// The polyphonic voices.
    pub fn poly(&self) -> &[PolySlot; VOICE_COUNT] {
        &self.poly
    }

    /// Values of the modulation wheel and breath controller on the CC channel.
    pub fn control_change_values(&self) -> [U7; 2] {
        self.control_change
    }

    /// The random generator.
    pub fn random(&self) -> &Lfsr {
        &self.random
    }

    /// The drum channels.
    pub fn drums(&self) -> &[DrumChannel; 2] {
        &self.drums
    }

    /// Anchor tables of the two outputs.
    pub fn calibrators(&self) -> &[Calibrator; VOICE_COUNT] {
        &self.calibrators
    }

    /// The anchor note last touched in calibration mode.
    pub fn calibrated_note(&self) -> Note {
        self.calibrated_note
    }

    /// Returns `true` if the state changed since it was last rendered.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    /// Record that the current state has been rendered.
    pub fn mark_rendered(&mut self) {
        self.needs_refresh = false;
    }
}

/// Channels 0 through 2 play voice 0; channel 3 plays voice 1.
fn mono_voice(channel: Channel) -> usize {
    if channel.index() <= 2 { 0 } else { 1 }
}
