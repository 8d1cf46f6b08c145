//! Count-Min Sketch — a fixed-size table approximating per-key frequency
//! counts with one-sided error (`estimate(k) >= true_count(k)`).
//!
//! The hash family mirrors the polynomial rolling hash of the system this
//! was distilled from: row `i` hashes a key's bytes with `i` folded in as a
//! per-row seed, so the `D` rows are independent without needing `D`
//! unrelated hash functions.

/// A width-`W` by depth-`D` Count-Min Sketch over byte-string keys.
#[derive(Debug, Clone)]
pub struct CountMinSketch {
    width: usize,
    depth: usize,
    table: Vec<Vec<u64>>,
    total: u64,
}

impl CountMinSketch {
    /// Both `width` and `depth` must be non-zero.
    pub fn new(width: usize, depth: usize) -> Self {
        assert!(width > 0 && depth > 0, "CountMinSketch requires width > 0 and depth > 0");
        Self {
            width,
            depth,
            table: vec![vec![0u64; width]; depth],
            total: 0,
        }
    }

    fn row_hash(row: usize, key: &[u8], width: usize) -> usize {
        let mut hash: u64 = 0;
        for &byte in key {
            hash = hash
                .wrapping_mul(31)
                .wrapping_add(u64::from(byte))
                .wrapping_add(row as u64);
        }
        (hash as usize) % width
    }

    pub fn increment(&mut self, key: &[u8], n: u64) {
        for row in 0..self.depth {
            let col = Self::row_hash(row, key, self.width);
            self.table[row][col] = self.table[row][col].saturating_add(n);
        }
        self.total = self.total.saturating_add(n);
    }

    /// Minimum count across all rows — the sketch's point estimate.
    pub fn estimate(&self, key: &[u8]) -> u64 {
        (0..self.depth)
            .map(|row| {
                let col = Self::row_hash(row, key, self.width);
                self.table[row][col]
            })
            .min()
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Zero every cell. Atomic from the caller's point of view: no reader
    /// observes a partially-reset table because resets happen on the same
    /// task that performs per-tick reads.
    pub fn reset(&mut self) {
        for row in &mut self.table {
            row.fill(0);
        }
        self.total = 0;
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn estimate_is_never_below_true_count() {
        let mut sketch = CountMinSketch::new(8, 3);
        let mut truth: HashMap<&[u8], u64> = HashMap::new();

        for key in [b"10.0.0.1".as_slice(), b"10.0.0.2", b"10.0.0.3", b"10.0.0.1"] {
            sketch.increment(key, 1);
            *truth.entry(key).or_default() += 1;
        }

        for (key, count) in &truth {
            assert!(sketch.estimate(key) >= *count);
        }
    }

    #[test]
    fn reset_zeroes_every_estimate() {
        let mut sketch = CountMinSketch::new(16, 4);
        sketch.increment(b"1.1.1.1", 50);
        assert!(sketch.estimate(b"1.1.1.1") > 0);

        sketch.reset();
        assert_eq!(sketch.estimate(b"1.1.1.1"), 0);
        assert_eq!(sketch.total(), 0);
    }

    #[test]
    fn increment_accumulates_total() {
        let mut sketch = CountMinSketch::new(4, 2);
        sketch.increment(b"a", 3);
        sketch.increment(b"b", 4);
        assert_eq!(sketch.total(), 7);
    }

    #[test]
    #[should_panic(expected = "width > 0")]
    fn zero_width_panics() {
        let _ = CountMinSketch::new(0, 1);
    }
}
