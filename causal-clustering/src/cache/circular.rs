/// Fixed-capacity ring of values.
///
/// Appending to a full buffer overwrites the oldest value and hands it back.
/// Every slot that leaves the live window is reset to `None`, so the buffer
/// never keeps a value alive after it has been removed.
#[derive(Debug)]
pub struct CircularBuffer<V> {
    slots: Vec<Option<V>>,
    /// Slot of the oldest live value.
    start: usize,
    size: usize,
}

impl<V> CircularBuffer<V> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "CircularBuffer requires a non-zero capacity");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            start: 0,
            size: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Appends at the newest end. Returns the evicted oldest value when full.
    pub fn append(&mut self, value: V) -> Option<V> {
        let capacity = self.capacity();
        if self.size == capacity {
            let evicted = self.slots[self.start].replace(value);
            self.start = (self.start + 1) % capacity;
            return evicted;
        }
        let slot = (self.start + self.size) % capacity;
        self.slots[slot] = Some(value);
        self.size += 1;
        None
    }

    /// Reads the value `offset` positions after the oldest one.
    pub fn read(&self, offset: usize) -> Option<&V> {
        if offset >= self.size {
            return None;
        }
        self.slots[(self.start + offset) % self.capacity()].as_ref()
    }

    /// Removes the oldest value.
    pub fn remove(&mut self) -> Option<V> {
        if self.size == 0 {
            return None;
        }
        let value = self.slots[self.start].take();
        self.start = (self.start + 1) % self.capacity();
        self.size -= 1;
        value
    }

    /// Removes the newest value.
    pub fn remove_head(&mut self) -> Option<V> {
        if self.size == 0 {
            return None;
        }
        let slot = (self.start + self.size - 1) % self.capacity();
        self.size -= 1;
        self.slots[slot].take()
    }

    /// Empties the buffer, returning the evicted values oldest first.
    pub fn clear(&mut self) -> Vec<V> {
        let mut evicted = Vec::with_capacity(self.size);
        while let Some(value) = self.remove() {
            evicted.push(value);
        }
        self.start = 0;
        evicted
    }

    #[cfg(test)]
    fn occupied_slots(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_last_capacity_values_in_order() {
        let mut buffer = CircularBuffer::new(3);
        let mut evicted = Vec::new();
        for value in 0..7 {
            evicted.extend(buffer.append(value));
        }

        assert_eq!(buffer.size(), 3);
        assert_eq!(evicted, vec![0, 1, 2, 3]);
        assert_eq!(buffer.read(0), Some(&4));
        assert_eq!(buffer.read(1), Some(&5));
        assert_eq!(buffer.read(2), Some(&6));
        assert_eq!(buffer.read(3), None);
    }

    #[test]
    fn remove_is_fifo_and_remove_head_is_lifo() {
        let mut buffer = CircularBuffer::new(4);
        for value in 1..=4 {
            buffer.append(value);
        }

        assert_eq!(buffer.remove(), Some(1));
        assert_eq!(buffer.remove_head(), Some(4));
        assert_eq!(buffer.size(), 2);
        assert_eq!(buffer.read(0), Some(&2));
        assert_eq!(buffer.read(1), Some(&3));
    }

    #[test]
    fn draining_leaves_no_stale_slots() {
        let mut buffer = CircularBuffer::new(3);
        for value in 0..5 {
            buffer.append(value.to_string());
        }

        while buffer.remove().is_some() {}

        assert!(buffer.is_empty());
        assert_eq!(buffer.occupied_slots(), 0);
        for offset in 0..3 {
            assert_eq!(buffer.read(offset), None);
        }
        assert_eq!(buffer.remove(), None);
        assert_eq!(buffer.remove_head(), None);
    }

    #[test]
    fn clear_returns_values_oldest_first() {
        let mut buffer = CircularBuffer::new(3);
        for value in 0..4 {
            buffer.append(value);
        }

        assert_eq!(buffer.clear(), vec![1, 2, 3]);
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.occupied_slots(), 0);

        buffer.append(9);
        assert_eq!(buffer.read(0), Some(&9));
    }

    #[test]
    fn wraps_after_mixed_operations() {
        let mut buffer = CircularBuffer::new(2);
        buffer.append('a');
        buffer.append('b');
        assert_eq!(buffer.remove(), Some('a'));
        buffer.append('c');
        assert_eq!(buffer.append('d'), Some('b'));
        assert_eq!(buffer.read(0), Some(&'c'));
        assert_eq!(buffer.read(1), Some(&'d'));
    }

    #[test]
    #[should_panic(expected = "non-zero capacity")]
    fn zero_capacity_panics() {
        let _ = CircularBuffer::<u8>::new(0);
    }
}
