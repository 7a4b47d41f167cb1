//! Provides a struct [`NoteStack`] for tracking the held notes of a monophonic voice. The most recently pressed note is
//! on top and is the one voiced; releasing it uncovers the note which was pressed before it.

use tinyvec::{ArrayVec, array_vec};
use wmidi::{Note, U7};

/// How many held notes a voice remembers. Beyond this, the oldest held note is forgotten.
const MONO_STACK_DEPTH: usize = 16;

/// A held note together with the velocity with which it was struck.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEntry {
    /// The held note.
    pub note: Note,
    /// Velocity of the NoteOn which activated the note.
    pub velocity: U7,
}

/// A last-note-priority stack of held notes.
///
/// Internally, this struct uses the [`U7`] type because [`tinyvec`] requires that `Items` implement [`Default`].
/// Public interfaces deal with [`Note`] instead.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteStack {
    /// (note, velocity) pairs, oldest first
    data: ArrayVec<[(U7, U7); MONO_STACK_DEPTH]>,
}

impl Default for NoteStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NoteStack {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "NoteStack {{ data: [");
        for (i, &(note, velocity)) in self.data.iter().enumerate() {
            if i == 0 {
                defmt::write!(fmt, " ");
            } else {
                defmt::write!(fmt, ", ");
            }
            defmt::write!(
                fmt,
                "{} ({}) @ {}",
                Note::from(note).to_str(),
                u8::from(note),
                u8::from(velocity)
            );
        }
        defmt::write!(fmt, " ] }}");
    }
}

impl NoteStack {
    /// Construct an empty `NoteStack`.
    pub fn new() -> Self {
        Self { data: array_vec!() }
    }

    /// Put a [`Note`] on top of the stack. Pressing a note which is already held moves it to the top.
    pub fn push(&mut self, note: Note, velocity: U7) {
        let u7 = U7::from_u8_lossy(note as u8);
        self.data.retain(|&(n, _)| n != u7);
        if self.data.len() == self.data.capacity() {
            self.data.remove(0);
        }
        self.data.push((u7, velocity));
    }

    /// Remove a [`Note`] wherever it sits in the stack. Releasing a note that isn't held does nothing.
    pub fn pop(&mut self, note: Note) {
        let u7 = U7::from_u8_lossy(note as u8);
        self.data.retain(|&(n, _)| n != u7);
    }

    /// Forget every held note.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Number of held notes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Determine if any notes are held.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The most recently pressed note which is still held.
    pub fn top(&self) -> Option<NoteEntry> {
        self.data.last().map(|&(note, velocity)| NoteEntry {
            note: Note::from(note),
            velocity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOUD: U7 = U7::from_u8_lossy(100);
    const SOFT: U7 = U7::from_u8_lossy(20);

    fn held() -> NoteStack {
        let mut stack = NoteStack::new();
        stack.push(Note::E4, LOUD);
        stack.push(Note::C4, SOFT);
        stack.push(Note::G4, LOUD);
        stack
    }

    #[test]
    fn new_is_empty() {
        let stack = NoteStack::new();
        assert!(stack.is_empty());
        assert_eq!(None, stack.top(), "Expected left but got right");
    }

    #[test]
    fn push_places_on_top() {
        let stack = held();
        assert_eq!(3, stack.len(), "Expected left but got right");
        assert_eq!(
            Some(NoteEntry {
                note: Note::G4,
                velocity: LOUD
            }),
            stack.top(),
            "Expected left but got right"
        );
    }

    #[test]
    fn repeated_push_moves_to_top() {
        let mut stack = held();
        stack.push(Note::E4, SOFT);
        assert_eq!(3, stack.len(), "Expected left but got right");
        assert_eq!(
            Some(NoteEntry {
                note: Note::E4,
                velocity: SOFT
            }),
            stack.top(),
            "Expected left but got right"
        );
    }

    #[test]
    fn pop_top_uncovers_previous() {
        let mut stack = held();
        stack.pop(Note::G4);
        assert_eq!(Some(Note::C4), stack.top().map(|e| e.note), "Expected left but got right");
    }

    #[test]
    fn pop_buried_keeps_top() {
        let mut stack = held();
        stack.pop(Note::E4);
        assert_eq!(2, stack.len(), "Expected left but got right");
        assert_eq!(Some(Note::G4), stack.top().map(|e| e.note), "Expected left but got right");
    }

    #[test]
    fn pop_unheld_is_ignored() {
        let mut stack = held();
        stack.pop(Note::A0);
        assert_eq!(held(), stack, "Expected left but got right");
    }

    #[test]
    fn push_evicts_oldest_rather_than_overflow() {
        let mut stack = NoteStack::new();
        for n in 0..MONO_STACK_DEPTH as u8 {
            stack.push(Note::from(U7::from_u8_lossy(40 + n)), LOUD);
        }
        assert_eq!(MONO_STACK_DEPTH, stack.len(), "Expected stack to be full");

        stack.push(Note::C8, LOUD);
        assert_eq!(MONO_STACK_DEPTH, stack.len(), "Expected length not to change");
        assert_eq!(Some(Note::C8), stack.top().map(|e| e.note), "Expected left but got right");

        // the first note pushed (40) is gone; releasing the rest leaves only C8
        for n in 1..MONO_STACK_DEPTH as u8 {
            stack.pop(Note::from(U7::from_u8_lossy(40 + n)));
        }
        assert_eq!(1, stack.len(), "Expected left but got right");
    }

    #[test]
    fn clear() {
        let mut stack = held();
        stack.clear();
        assert!(stack.is_empty());
    }
}
