//! Rate-limited reader over collection snapshots.
//!
//! A [`ThrottledReader`] holds at most one committed snapshot at a time.
//! Consumers pull up to N items per tick via [`ThrottledReader::take`]; a
//! refill is accepted only once the previous snapshot is fully drained, so a
//! slow consumer finishes its batch before seeing newer data and the queue
//! never grows without bound.

use std::collections::VecDeque;

/// FIFO of the most recently accepted snapshot. Single-consumer: `take`
/// needs `&mut self`, which rules out concurrent drains statically.
#[derive(Debug)]
pub struct ThrottledReader<T> {
    queue: VecDeque<T>,
}

impl<T> Default for ThrottledReader<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ThrottledReader<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Replace the queue with `items`, but only if it is currently empty.
    ///
    /// Returns whether the refill was accepted. A refill against a
    /// non-empty queue is a no-op: the in-flight batch wins.
    pub fn refill<I: IntoIterator<Item = T>>(&mut self, items: I) -> bool {
        if !self.queue.is_empty() {
            return false;
        }
        self.queue.extend(items);
        true
    }

    /// Dequeue up to `max` items as a lazy, finite iterator.
    ///
    /// The iterator advances shared state: items it yields are gone from
    /// the queue whether or not the caller keeps them. Stops early when the
    /// queue empties. Not restartable.
    pub fn take(&mut self, max: usize) -> TakeIter<'_, T> {
        TakeIter {
            reader: self,
            remaining: max,
        }
    }
}

/// Iterator returned by [`ThrottledReader::take`].
#[derive(Debug)]
pub struct TakeIter<'a, T> {
    reader: &'a mut ThrottledReader<T>,
    remaining: usize,
}

impl<T> Iterator for TakeIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.reader.queue.pop_front()?;
        self.remaining -= 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.min(self.reader.queue.len());
        (n, Some(n))
    }
}
