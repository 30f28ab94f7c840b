use crate::constants::WINDOW_CAPACITY;

/// Bounded history of the most recent raw values of one column,
/// most-recent-first.
///
/// The encoder and decoder each keep one window per column and feed it the
/// same values in the same order, so offsets written by one resolve to the
/// same entry in the other.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    slots: [u64; WINDOW_CAPACITY],
    /// Number of populated slots, at most `WINDOW_CAPACITY`.
    len: usize,
}

impl HistoryWindow {
    /// Creates an empty window.
    pub fn new() -> Self {
        Self {
            slots: [0; WINDOW_CAPACITY],
            len: 0,
        }
    }

    /// Number of values currently remembered.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `value` at offset 0, dropping the oldest entry when full.
    pub fn add(&mut self, value: u64) {
        let keep = self.len.min(WINDOW_CAPACITY - 1);
        self.slots.copy_within(0..keep, 1);
        self.slots[0] = value;
        self.len = keep + 1;
    }

    /// Offset of the most recent entry equal to `value`, if any.
    #[inline]
    pub fn contains(&self, value: u64) -> Option<usize> {
        self.slots[..self.len].iter().position(|&v| v == value)
    }

    /// Finds the entry sharing the most leading and trailing zero bytes with
    /// `value` once XORed, returning its offset and raw bits. Ties go to the
    /// most recent entry.
    ///
    /// # Panics
    ///
    /// Panics if the window is empty.
    pub fn best_candidate(&self, value: u64) -> (usize, u64) {
        assert!(!self.is_empty(), "best_candidate on an empty window");

        let mut best = 0;
        let mut best_score = 0;
        for (i, &v) in self.slots[..self.len].iter().enumerate() {
            let score = shared_zero_bytes(v ^ value);
            if i == 0 || score > best_score {
                best = i;
                best_score = score;
            }
        }
        (best, self.slots[best])
    }

    /// Raw value at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` has not been populated.
    #[inline]
    pub fn at(&self, offset: usize) -> u64 {
        assert!(
            offset < self.len,
            "window offset {offset} not populated (len {})",
            self.len
        );
        self.slots[offset]
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Leading plus trailing zero bytes of `xor`.
#[inline]
pub(crate) fn shared_zero_bytes(xor: u64) -> u32 {
    xor.leading_zeros() / 8 + xor.trailing_zeros() / 8
}
