/// Bitmap over subsystem indices.
///
/// Used for a session's enabled-set and for the probed-set of the current
/// content-probing round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsystemSet {
    words: Vec<u64>,
    capacity: usize,
}

impl SubsystemSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            capacity,
        }
    }

    /// Highest index + 1 this set can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add `index`; returns false if it was already present.
    pub fn insert(&mut self, index: usize) -> bool {
        debug_assert!(index < self.capacity, "index {index} out of range");
        let (word, mask) = Self::locate(index);
        let was_set = self.words[word] & mask != 0;
        self.words[word] |= mask;
        !was_set
    }

    /// Remove `index`; returns true if it was present.
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.capacity {
            return false;
        }
        let (word, mask) = Self::locate(index);
        let was_set = self.words[word] & mask != 0;
        self.words[word] &= !mask;
        was_set
    }

    pub fn contains(&self, index: usize) -> bool {
        if index >= self.capacity {
            return false;
        }
        let (word, mask) = Self::locate(index);
        self.words[word] & mask != 0
    }

    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.capacity).filter(move |i| self.contains(*i))
    }

    fn locate(index: usize) -> (usize, u64) {
        (index / 64, 1u64 << (index % 64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_remove_contains() {
        let mut set = SubsystemSet::new(70);
        assert!(set.insert(3));
        assert!(!set.insert(3));
        assert!(set.insert(69));
        assert!(set.contains(3));
        assert!(set.contains(69));
        assert!(!set.contains(4));
        assert_eq!(set.len(), 2);

        assert!(set.remove(3));
        assert!(!set.remove(3));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![69]);
    }

    #[test]
    fn out_of_range_queries_are_false() {
        let mut set = SubsystemSet::new(2);
        assert!(!set.contains(5));
        assert!(!set.remove(5));
    }

    #[test]
    fn clear_empties_every_word() {
        let mut set = SubsystemSet::new(130);
        set.insert(0);
        set.insert(64);
        set.insert(129);
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.capacity(), 130);
    }
}
