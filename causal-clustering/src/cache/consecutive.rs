use super::CircularBuffer;

/// Cache of values addressed by consecutive log index.
///
/// The live window always covers `lowest_index..=highest_index` without gaps.
/// A `put` at any index other than the next one (after a gap, or going
/// backwards) throws the current window away and starts a new one there.
#[derive(Debug)]
pub struct ConsecutiveCache<V> {
    buffer: CircularBuffer<V>,
    /// Index of the oldest live value; meaningless while empty.
    start_index: i64,
}

impl<V> ConsecutiveCache<V> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: CircularBuffer::new(capacity),
            start_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn size(&self) -> usize {
        self.buffer.size()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn lowest_index(&self) -> Option<i64> {
        (!self.is_empty()).then_some(self.start_index)
    }

    pub fn highest_index(&self) -> Option<i64> {
        (!self.is_empty()).then(|| self.end_index() - 1)
    }

    fn end_index(&self) -> i64 {
        self.start_index + self.buffer.size() as i64
    }

    /// Stores `value` at `index`, returning every evicted `(index, value)`.
    ///
    /// At capacity the single oldest entry is evicted. A non-consecutive
    /// index evicts the whole previous window first.
    pub fn put(&mut self, index: i64, value: V) -> Vec<(i64, V)> {
        let mut evicted = Vec::new();
        if self.is_empty() {
            self.start_index = index;
        } else if index != self.end_index() {
            evicted = self.clear();
            self.start_index = index;
        }

        if let Some(oldest) = self.buffer.append(value) {
            evicted.push((self.start_index, oldest));
            self.start_index += 1;
        }
        evicted
    }

    pub fn get(&self, index: i64) -> Option<&V> {
        if index < self.start_index || index >= self.end_index() {
            return None;
        }
        self.buffer.read((index - self.start_index) as usize)
    }

    /// Removes the lowest-index entry.
    pub fn remove(&mut self) -> Option<(i64, V)> {
        let value = self.buffer.remove()?;
        let index = self.start_index;
        self.start_index += 1;
        Some((index, value))
    }

    /// Evicts every entry with index `<= upto_inclusive`, lowest first.
    pub fn prune(&mut self, upto_inclusive: i64) -> Vec<(i64, V)> {
        let mut evicted = Vec::new();
        while !self.is_empty() && self.start_index <= upto_inclusive {
            evicted.extend(self.remove());
        }
        evicted
    }

    /// Evicts every entry with index `>= from_inclusive`, highest first.
    pub fn truncate(&mut self, from_inclusive: i64) -> Vec<(i64, V)> {
        let mut evicted = Vec::new();
        while !self.is_empty() && self.end_index() - 1 >= from_inclusive {
            let index = self.end_index() - 1;
            if let Some(value) = self.buffer.remove_head() {
                evicted.push((index, value));
            }
        }
        evicted
    }

    /// Evicts everything, lowest index first.
    pub fn clear(&mut self) -> Vec<(i64, V)> {
        let start = self.start_index;
        self.buffer
            .clear()
            .into_iter()
            .enumerate()
            .map(|(offset, value)| (start + offset as i64, value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(capacity: usize, count: i64) -> ConsecutiveCache<String> {
        let mut cache = ConsecutiveCache::new(capacity);
        for index in 0..count {
            cache.put(index, format!("v{index}"));
        }
        cache
    }

    #[test]
    fn put_beyond_capacity_evicts_oldest() {
        let mut cache = filled(4, 4);
        let evicted = cache.put(4, "v4".to_string());

        assert_eq!(evicted, vec![(0, "v0".to_string())]);
        assert_eq!(cache.size(), 4);
        assert_eq!(cache.get(0), None);
        assert_eq!(cache.get(1).map(String::as_str), Some("v1"));
        assert_eq!(cache.get(4).map(String::as_str), Some("v4"));
        assert_eq!(cache.lowest_index(), Some(1));
        assert_eq!(cache.highest_index(), Some(4));
    }

    #[test]
    fn prune_removes_prefix() {
        let mut cache = filled(8, 8);
        let evicted = cache.prune(3);

        assert_eq!(evicted.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        for index in 0..=3 {
            assert_eq!(cache.get(index), None);
        }
        for index in 4..8 {
            assert!(cache.get(index).is_some());
        }
    }

    #[test]
    fn truncate_removes_suffix_highest_first() {
        let mut cache = filled(8, 8);
        let evicted = cache.truncate(5);

        assert_eq!(evicted.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![7, 6, 5]);
        for index in 5..8 {
            assert_eq!(cache.get(index), None);
        }
        for index in 0..5 {
            assert!(cache.get(index).is_some());
        }

        // appending continues right after the truncation point
        assert!(cache.put(5, "new5".to_string()).is_empty());
        assert_eq!(cache.get(5).map(String::as_str), Some("new5"));
    }

    #[test]
    fn remove_pops_lowest_index() {
        let mut cache = filled(4, 3);
        assert_eq!(cache.remove(), Some((0, "v0".to_string())));
        assert_eq!(cache.remove(), Some((1, "v1".to_string())));
        assert_eq!(cache.lowest_index(), Some(2));
    }

    #[test]
    fn non_consecutive_put_resets_window() {
        let mut cache = filled(4, 3);
        let evicted = cache.put(10, "v10".to_string());

        assert_eq!(evicted.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.get(2), None);
        assert_eq!(cache.get(10).map(String::as_str), Some("v10"));
    }

    #[test]
    fn window_can_start_anywhere() {
        let mut cache = ConsecutiveCache::new(2);
        cache.put(100, 'a');
        cache.put(101, 'b');
        assert_eq!(cache.put(102, 'c'), vec![(100, 'a')]);
        assert_eq!(cache.get(101), Some(&'b'));
        assert_eq!(cache.get(99), None);
        assert_eq!(cache.get(103), None);
    }

    #[test]
    fn clear_reports_indices() {
        let mut cache = filled(3, 5);
        let evicted = cache.clear();
        assert_eq!(evicted.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![2, 3, 4]);
        assert!(cache.is_empty());
        assert_eq!(cache.lowest_index(), None);
    }
}
