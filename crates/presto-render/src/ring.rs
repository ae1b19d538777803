// SPDX-License-Identifier: CEPL-1.0

/// Fixed set of per-frame slots handed out round robin.
///
/// Single producer only: the caller must make sure a returned slot's previous
/// GPU work has completed before it touches the slot again.
#[derive(Debug)]
pub struct FrameRing<T> {
    slots: Vec<T>,
    counter: u64,
}

impl<T> FrameRing<T> {
    pub fn new(slots: Vec<T>) -> Self {
        Self { slots, counter: 0 }
    }

    /// Index of the next slot, advancing the counter. `None` when the ring has no slots.
    pub fn advance(&mut self) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        let index = (self.counter % self.slots.len() as u64) as usize;
        self.counter += 1;
        Some(index)
    }

    pub fn next(&mut self) -> Option<(usize, &mut T)> {
        let index = self.advance()?;
        Some((index, &mut self.slots[index]))
    }

    /// Swaps in a new slot set. The counter keeps running so frame numbers stay
    /// monotonic across rebuilds.
    pub fn replace(&mut self, slots: Vec<T>) -> Vec<T> {
        std::mem::replace(&mut self.slots, slots)
    }

    pub fn take(&mut self) -> Vec<T> {
        std::mem::take(&mut self.slots)
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.slots.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total number of slots handed out so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }
}

impl<T> Default for FrameRing<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
