//! Aggregated count statistics
//!
//! Tracks the number of unique (count == 1), distinct (count > 0), and
//! total k-mers, plus a histogram of counts: a dense array for the low
//! tail where almost all mass lives, and a sorted sparse map for the
//! rare large counts.
//!
//! Two serialized framings exist. The v1 framing (master index v01/v02)
//! dumps the dense array raw; the v3 framing stores the histogram as a
//! compact list of `(value, occurrences)` pairs. Current code writes v3
//! and reads both.

use crate::bitstream::BitStream;
use crate::constants::HIST_MAX;
use std::collections::BTreeMap;

/// Aggregated statistics over all counts in a database.
#[derive(Debug, Clone)]
pub struct CountStats {
    num_unique: u64,
    num_distinct: u64,
    num_total: u64,
    hist: Vec<u64>,
    hist_big: BTreeMap<u64, u64>,
}

impl Default for CountStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CountStats {
    /// Create empty statistics.
    pub fn new() -> Self {
        Self {
            num_unique: 0,
            num_distinct: 0,
            num_total: 0,
            hist: vec![0; HIST_MAX as usize],
            hist_big: BTreeMap::new(),
        }
    }

    /// Record one k-mer with count `value`. Zero counts are ignored.
    #[inline]
    pub fn add_value(&mut self, value: u64) {
        if value == 0 {
            return;
        }
        if value == 1 {
            self.num_unique += 1;
        }
        self.num_distinct += 1;
        self.num_total += value;

        if value < HIST_MAX {
            self.hist[value as usize] += 1;
        } else {
            *self.hist_big.entry(value).or_insert(0) += 1;
        }
    }

    /// Fold another statistics object into this one.
    pub fn merge(&mut self, other: &CountStats) {
        self.num_unique += other.num_unique;
        self.num_distinct += other.num_distinct;
        self.num_total += other.num_total;
        for (slot, &occ) in self.hist.iter_mut().zip(other.hist.iter()) {
            *slot += occ;
        }
        for (&value, &occ) in &other.hist_big {
            *self.hist_big.entry(value).or_insert(0) += occ;
        }
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.num_unique = 0;
        self.num_distinct = 0;
        self.num_total = 0;
        self.hist.iter_mut().for_each(|slot| *slot = 0);
        self.hist_big.clear();
    }

    /// Number of k-mers with count exactly 1.
    #[inline]
    pub fn num_unique(&self) -> u64 {
        self.num_unique
    }

    /// Number of k-mers with count > 0.
    #[inline]
    pub fn num_distinct(&self) -> u64 {
        self.num_distinct
    }

    /// Sum of all counts.
    #[inline]
    pub fn num_total(&self) -> u64 {
        self.num_total
    }

    /// The histogram as ascending `(value, occurrences)` pairs.
    pub fn histogram(&self) -> Vec<(u64, u64)> {
        let mut pairs: Vec<(u64, u64)> = self
            .hist
            .iter()
            .enumerate()
            .filter(|(_, &occ)| occ > 0)
            .map(|(value, &occ)| (value as u64, occ))
            .collect();
        pairs.extend(self.hist_big.iter().map(|(&value, &occ)| (value, occ)));
        pairs
    }

    fn insert_occurrences(&mut self, value: u64, occ: u64) {
        if occ == 0 {
            return;
        }
        if value < HIST_MAX {
            self.hist[value as usize] += occ;
        } else {
            *self.hist_big.entry(value).or_insert(0) += occ;
        }
    }

    /// Serialize in the v3 framing.
    pub fn dump(&self, bits: &mut BitStream) {
        let pairs = self.histogram();
        bits.push_binary(64, self.num_unique);
        bits.push_binary(64, self.num_distinct);
        bits.push_binary(64, self.num_total);
        bits.push_binary(64, pairs.len() as u64);
        for (value, occ) in pairs {
            bits.push_binary(64, value);
            bits.push_binary(64, occ);
        }
    }

    /// Serialize in the v1 framing: the dense array is dumped raw,
    /// then the sparse tail as pairs.
    pub(crate) fn dump_v01(&self, bits: &mut BitStream) {
        bits.push_binary(64, self.num_unique);
        bits.push_binary(64, self.num_distinct);
        bits.push_binary(64, self.num_total);
        bits.push_binary(64, HIST_MAX);
        for &occ in &self.hist {
            bits.push_binary(64, occ);
        }
        bits.push_binary(64, self.hist_big.len() as u64);
        for (&value, &occ) in &self.hist_big {
            bits.push_binary(64, value);
            bits.push_binary(64, occ);
        }
    }

    /// Deserialize the framing used by master index `version` (1..=3).
    pub fn load(bits: &mut BitStream, version: u32) -> Self {
        match version {
            1 | 2 => Self::load_v01(bits),
            _ => Self::load_v03(bits),
        }
    }

    fn load_v01(bits: &mut BitStream) -> Self {
        let mut stats = Self::new();
        stats.num_unique = bits.get_binary(64);
        stats.num_distinct = bits.get_binary(64);
        stats.num_total = bits.get_binary(64);

        // A corrupt length cannot claim more entries than the stream holds.
        let hist_max = bits.get_binary(64).min(bits.remaining() / 64);
        for value in 0..hist_max {
            let occ = bits.get_binary(64);
            stats.insert_occurrences(value, occ);
        }
        let n_big = bits.get_binary(64).min(bits.remaining() / 128);
        for _ in 0..n_big {
            let value = bits.get_binary(64);
            let occ = bits.get_binary(64);
            stats.insert_occurrences(value, occ);
        }
        stats
    }

    fn load_v03(bits: &mut BitStream) -> Self {
        let mut stats = Self::new();
        stats.num_unique = bits.get_binary(64);
        stats.num_distinct = bits.get_binary(64);
        stats.num_total = bits.get_binary(64);

        let hist_len = bits.get_binary(64).min(bits.remaining() / 128);
        for _ in 0..hist_len {
            let value = bits.get_binary(64);
            let occ = bits.get_binary(64);
            stats.insert_occurrences(value, occ);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CountStats {
        let mut stats = CountStats::new();
        for value in [1u64, 1, 2, 3, 3, 3, 7, HIST_MAX + 5, HIST_MAX + 5, 1 << 40] {
            stats.add_value(value);
        }
        stats
    }

    #[test]
    fn test_totals() {
        let stats = sample();
        assert_eq!(stats.num_unique(), 2);
        assert_eq!(stats.num_distinct(), 10);
        assert_eq!(
            stats.num_total(),
            1 + 1 + 2 + 3 + 3 + 3 + 7 + 2 * (HIST_MAX + 5) + (1 << 40)
        );
    }

    #[test]
    fn test_histogram_consistency() {
        let stats = sample();
        let pairs = stats.histogram();

        // Ascending values, no duplicates.
        for window in pairs.windows(2) {
            assert!(window[0].0 < window[1].0);
        }

        let total: u64 = pairs.iter().map(|&(v, o)| v * o).sum();
        let distinct: u64 = pairs.iter().map(|&(_, o)| o).sum();
        let unique: u64 = pairs.iter().filter(|&&(v, _)| v == 1).map(|&(_, o)| o).sum();
        assert_eq!(total, stats.num_total());
        assert_eq!(distinct, stats.num_distinct());
        assert_eq!(unique, stats.num_unique());
    }

    #[test]
    fn test_v3_roundtrip() {
        let stats = sample();
        let mut bits = BitStream::new();
        stats.dump(&mut bits);

        let loaded = CountStats::load(&mut bits, 3);
        assert_eq!(loaded.num_unique(), stats.num_unique());
        assert_eq!(loaded.num_distinct(), stats.num_distinct());
        assert_eq!(loaded.num_total(), stats.num_total());
        assert_eq!(loaded.histogram(), stats.histogram());
    }

    #[test]
    fn test_v1_roundtrip() {
        let stats = sample();
        let mut bits = BitStream::new();
        stats.dump_v01(&mut bits);

        let loaded = CountStats::load(&mut bits, 1);
        assert_eq!(loaded.num_unique(), stats.num_unique());
        assert_eq!(loaded.num_distinct(), stats.num_distinct());
        assert_eq!(loaded.num_total(), stats.num_total());
        assert_eq!(loaded.histogram(), stats.histogram());
    }

    #[test]
    fn test_merge() {
        let mut a = sample();
        let b = sample();
        a.merge(&b);
        assert_eq!(a.num_distinct(), 2 * b.num_distinct());
        assert_eq!(a.num_total(), 2 * b.num_total());
        for (&(av, ao), &(bv, bo)) in a.histogram().iter().zip(b.histogram().iter()) {
            assert_eq!(av, bv);
            assert_eq!(ao, 2 * bo);
        }
    }

    #[test]
    fn test_zero_is_ignored() {
        let mut stats = CountStats::new();
        stats.add_value(0);
        assert_eq!(stats.num_distinct(), 0);
        assert!(stats.histogram().is_empty());
    }
}
