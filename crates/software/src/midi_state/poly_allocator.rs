//! Provides [`PolyAllocator`], which decides which of the analog voices plays a note when the device is polyphonic.

use crate::configuration::VOICE_COUNT;
use tinyvec::{ArrayVec, array_vec};
use wmidi::{Note, U7};

/// Least-recently-used voice allocator.
///
/// A note that already owns a slot keeps it. Otherwise a free slot is preferred, and when every slot is busy the one
/// which was assigned longest ago is stolen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PolyAllocator {
    /// Number of slots in use; never more than [`VOICE_COUNT`].
    size: u8,
    /// Note held by each slot.
    assigned: [Option<u8>; VOICE_COUNT],
    /// Slot indices in order of use, least recently used first.
    usage: ArrayVec<[u8; VOICE_COUNT]>,
}

impl Default for PolyAllocator {
    fn default() -> Self {
        let mut allocator = Self {
            size: VOICE_COUNT as u8,
            assigned: [None; VOICE_COUNT],
            usage: array_vec!(),
        };
        allocator.init();
        allocator
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PolyAllocator {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "PolyAllocator {{ size: {}, assigned: {}, usage: {} }}",
            self.size,
            self.assigned,
            self.usage.as_slice()
        );
    }
}

impl PolyAllocator {
    /// Free every slot and forget the order in which they were used.
    pub fn init(&mut self) {
        self.assigned = [None; VOICE_COUNT];
        self.usage.clear();
        for slot in 0..self.size {
            self.usage.push(slot);
        }
    }

    /// Restrict allocation to the first `size` slots, clamped to `1..=VOICE_COUNT`. Frees every slot.
    pub fn set_size(&mut self, size: usize) {
        self.size = size.clamp(1, VOICE_COUNT) as u8;
        self.init();
    }

    /// Number of slots notes are spread across.
    pub fn size(&self) -> usize {
        usize::from(self.size)
    }

    /// Assign a slot to a [`Note`], returning its index.
    pub fn allocate(&mut self, note: Note) -> usize {
        let note = u8::from(U7::from_u8_lossy(note as u8));
        let slot = self
            .find(note)
            .or_else(|| {
                self.usage
                    .iter()
                    .copied()
                    .find(|&slot| self.assigned[usize::from(slot)].is_none())
            })
            .or_else(|| self.usage.first().copied())
            .unwrap_or(0);

        self.assigned[usize::from(slot)] = Some(note);
        self.touch(slot);
        usize::from(slot)
    }

    /// Free the slot holding a [`Note`], returning its index, or `None` if no slot holds it.
    pub fn release(&mut self, note: Note) -> Option<usize> {
        let slot = self.find(note as u8)?;
        self.assigned[usize::from(slot)] = None;
        Some(usize::from(slot))
    }

    fn find(&self, note: u8) -> Option<u8> {
        (0..self.size).find(|&slot| self.assigned[usize::from(slot)] == Some(note))
    }

    fn touch(&mut self, slot: u8) {
        self.usage.retain(|&s| s != slot);
        self.usage.push(slot);
    }
}
