//! Pitch to frequency conversion for the digitally controlled oscillator.
//!
//! The oscillator is a timer whose period is loaded with a count of [`DCO_CLOCK_HZ`] cycles. One octave of counts,
//! starting at E0, is tabulated with a step of 1/8 semitone; other octaves are obtained by halving.

use wmidi::Note;

/// Frequency of the clock the DCO counts are expressed in.
pub const DCO_CLOCK_HZ: u32 = 1_250_000;

/// One octave, in 1/128 semitone.
const OCTAVE: i16 = 12 << 7;

/// Lowest pitch in the table (E0), in 1/128 semitone.
const FIRST_DCO_NOTE: i16 = 16 << 7;

/// Periods of one octave from E0, in cycles of [`DCO_CLOCK_HZ`], every 1/8 semitone; the last entry is E1.
const DCO_COUNT: [u16; 97] = [
    60675, 60238, 59805, 59374, 58947, 58523, 58102, 57684, //
    57269, 56857, 56448, 56042, 55639, 55239, 54841, 54447, //
    54055, 53666, 53280, 52897, 52516, 52138, 51763, 51391, //
    51021, 50654, 50290, 49928, 49569, 49212, 48858, 48506, //
    48157, 47811, 47467, 47125, 46786, 46450, 46116, 45784, //
    45455, 45128, 44803, 44481, 44161, 43843, 43527, 43214, //
    42903, 42595, 42288, 41984, 41682, 41382, 41084, 40789, //
    40495, 40204, 39915, 39628, 39343, 39060, 38779, 38500, //
    38223, 37948, 37675, 37404, 37134, 36867, 36602, 36339, //
    36077, 35818, 35560, 35304, 35050, 34798, 34548, 34299, //
    34052, 33807, 33564, 33323, 33083, 32845, 32609, 32374, //
    32141, 31910, 31680, 31452, 31226, 31002, 30779, 30557, //
    30337,
];

/// Returns the DCO period count for a note bent by a 14-bit signed pitch bend (±2 semitones).
///
/// Notes below E0 wrap into the lowest octave.
pub fn dco_count(note: Note, bend: i16) -> u16 {
    let mut pitch = (i16::from(note as u8) << 7) + (bend >> 5);
    pitch -= FIRST_DCO_NOTE;
    while pitch < 0 {
        pitch += OCTAVE;
    }
    let mut shifts = 0;
    while pitch >= OCTAVE {
        pitch -= OCTAVE;
        shifts += 1;
    }

    let position = pitch as u16;
    let index = usize::from(position >> 4);
    let weight = u32::from((position << 4) & 0xff);
    let count = u32::from(DCO_COUNT[index]);
    let next = u32::from(DCO_COUNT[index + 1]);
    let count = count - (((count - next) * weight) >> 8);

    (count >> shifts) as u16
}

/// Returns the frequency produced by a DCO count, or `None` for a silent oscillator.
pub fn count_to_hertz(count: u16) -> Option<u32> {
    (count != 0).then(|| DCO_CLOCK_HZ / u32::from(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wmidi::U7;

    fn note(n: u8) -> Note {
        Note::from(U7::from_u8_lossy(n))
    }

    #[test]
    fn table_is_descending() {
        assert!(DCO_COUNT.windows(2).all(|pair| pair[0] > pair[1]));
        assert_eq!(DCO_COUNT[0] / 2, DCO_COUNT[96], "Last entry should be an octave up");
    }

    #[test]
    fn lowest_note() {
        assert_eq!(60675, dco_count(Note::E0, 0), "Expected left but got right");
        assert_eq!(30337, dco_count(Note::E1, 0), "Expected left but got right");
    }

    #[test]
    fn concert_pitch() {
        let count = dco_count(Note::A4, 0);
        assert_eq!(45455 >> 4, count, "Expected left but got right");
        assert_eq!(Some(440), count_to_hertz(count), "Expected left but got right");
    }

    #[test]
    fn decreases_with_pitch() {
        for n in 16..127 {
            assert!(
                dco_count(note(n + 1), 0) < dco_count(note(n), 0),
                "Count should drop from note {n} to note {}",
                n + 1
            );
        }
    }

    #[test]
    fn halves_every_octave() {
        for n in 16..=115 {
            assert_eq!(
                dco_count(note(n), 0) >> 1,
                dco_count(note(n + 12), 0),
                "Expected left but got right"
            );
        }
    }

    #[test]
    fn interpolates_between_entries() {
        // 1/16 semitone above E0, halfway between the first two entries
        assert_eq!(60457, dco_count(Note::E0, 256), "Expected left but got right");
    }

    #[test]
    fn bend() {
        assert_eq!(dco_count(Note::Db4, 0), dco_count(Note::C4, 4096), "Expected left but got right");
        assert_eq!(dco_count(Note::Bb3, 0), dco_count(Note::C4, -8192), "Expected left but got right");
    }

    #[test]
    fn below_range_wraps() {
        assert_eq!(dco_count(Note::E0, 0), dco_count(note(4), 0), "Expected left but got right");
    }

    #[test]
    fn silence() {
        assert_eq!(None, count_to_hertz(0), "Expected left but got right");
    }
}
