//! Fixed-width set of combined DTC groups already visited in one iteration

/// Stack-allocated bitset over combined group ids
///
/// Created per "for each DTC" pass so events sharing a combined group are
/// counted once. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CombinedGroupSet {
    words: [u64; 4],
}

impl CombinedGroupSet {
    /// Number of distinct group ids the set can hold
    pub const CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, group: u8) -> bool {
        let (word, bit) = Self::position(group);
        self.words[word] & (1u64 << bit) != 0
    }

    /// Mark `group` processed; returns false if it already was
    pub fn insert(&mut self, group: u8) -> bool {
        let (word, bit) = Self::position(group);
        let fresh = self.words[word] & (1u64 << bit) == 0;
        self.words[word] |= 1u64 << bit;
        fresh
    }

    pub fn clear(&mut self) {
        self.words = [0; 4];
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    fn position(group: u8) -> (usize, u32) {
        ((group / 64) as usize, (group % 64) as u32)
    }
}
