//! Reorder buffer: turns out-of-order completions into an in-order stream.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// Buffers items keyed by a dense sequence index and releases them strictly
/// in ascending order, starting from a given index.
#[derive(Debug, Clone)]
pub struct ReorderBuffer<T> {
    next: usize,
    /// Set once `usize::MAX` has been released; nothing can follow it.
    exhausted: bool,
    pending: BTreeMap<usize, T>,
}

/// An item released by [`ReorderBuffer::drain`], with the run of indexes
/// that never arrived before it.
pub type Drained<T> = (Option<RangeInclusive<usize>>, usize, T);

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::starting_at(0)
    }
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(next: usize) -> Self {
        Self {
            next,
            exhausted: false,
            pending: BTreeMap::new(),
        }
    }

    /// Index the buffer is waiting for.
    pub fn next_index(&self) -> usize {
        self.next
    }

    /// Number of items held behind a gap.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Accept an item. Returns `false` (dropping it) when the index was
    /// already released or is already buffered.
    pub fn push(&mut self, index: usize, item: T) -> bool {
        if self.exhausted || index < self.next || self.pending.contains_key(&index) {
            return false;
        }
        self.pending.insert(index, item);
        true
    }

    /// Release the next in-order item, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<(usize, T)> {
        if self.exhausted {
            return None;
        }
        let index = self.next;
        let item = self.pending.remove(&index)?;
        self.advance_past(index);
        Some((index, item))
    }

    /// Release everything still buffered in ascending order. Each item comes
    /// with the range of indexes that never arrived before it, if any.
    pub fn drain(&mut self) -> Vec<Drained<T>> {
        let pending = std::mem::take(&mut self.pending);
        let mut released = Vec::with_capacity(pending.len());
        for (index, item) in pending {
            let gap = (index > self.next).then(|| self.next..=index - 1);
            self.advance_past(index);
            released.push((gap, index, item));
        }
        released
    }

    fn advance_past(&mut self, index: usize) {
        match index.checked_add(1) {
            Some(next) => self.next = next,
            None => {
                self.next = index;
                self.exhausted = true;
            }
        }
    }
}
