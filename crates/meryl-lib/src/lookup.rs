//! In-memory exact lookup table
//!
//! Built from a [`Reader`] in four passes: size the table, count the
//! population of every prefix, allocate packed arrays, then fill them.
//! The k-mer word splits into a high `prefixBits` part indexing a
//! start-offset table and a low `suffixBits` part stored in a packed
//! array, sorted within each prefix; queries binary-search the prefix's
//! run and finish with a short linear scan.
//!
//! Values outside the admitted `[min, max]` range are counted and
//! skipped during construction, never fatal.

use crate::constants::{ceil_log2, mask_u64};
use crate::error::StoreError;
use crate::kmer::Kmer;
use crate::reader::Reader;
use crate::word_array::WordArray;
use tracing::debug;

/// Window size below which the query switches to linear scan.
const LINEAR_SEARCH_WINDOW: u64 = 8;

/// Exact k-mer to value lookup.
pub struct ExactLookup {
    min_value: u64,
    max_value: u64,
    value_offset: u64,

    n_loaded: u64,
    n_too_low: u64,
    n_too_high: u64,

    k: u32,
    prefix_bits: u32,
    suffix_bits: u32,
    value_bits: u32,
    suffix_mask: u64,

    suffix_bgn: Vec<u64>,
    suf_data: WordArray,
    val_data: Option<WordArray>,
}

impl ExactLookup {
    /// Build a lookup over every k-mer in `reader` whose value lies in
    /// `[min_value, max_value]`.
    ///
    /// A `min_value` of 0 and a `max_value` of `u64::MAX` are resolved
    /// from the stored histogram, so an unrestricted lookup still packs
    /// values into the fewest bits that fit. Passing `min_value ==
    /// max_value` requests a presence-only table storing no values at
    /// all.
    pub fn build(reader: &mut Reader, min_value: u64, max_value: u64) -> Result<Self, StoreError> {
        let presence_only = min_value == max_value;

        // Resolve the open ends of the range from the histogram.
        let histogram = reader.stats()?.histogram();
        let min_value = if min_value == 0 {
            histogram.first().map_or(1, |&(v, _)| v)
        } else {
            min_value
        };
        let max_value = if max_value == u64::MAX {
            histogram.last().map_or(min_value, |&(v, _)| v)
        } else {
            max_value
        };
        if max_value < min_value {
            return Err(StoreError::InvalidConfig(format!(
                "empty value range [{min_value}, {max_value}]"
            )));
        }

        let value_offset = min_value - 1;
        let value_bits = if presence_only {
            0
        } else {
            ceil_log2(max_value - value_offset + 1)
        };

        let k = reader.k();
        let n_estimate = reader.stats()?.num_distinct().max(1);
        let (prefix_bits, suffix_bits) = configure(2 * k, value_bits, n_estimate);

        debug!(
            "lookup over {:?}: {} prefix bits + {} suffix bits, {} value bits, range [{}, {}]",
            reader.path(),
            prefix_bits,
            suffix_bits,
            value_bits,
            min_value,
            max_value,
        );

        let mut lookup = Self {
            min_value,
            max_value,
            value_offset,
            n_loaded: 0,
            n_too_low: 0,
            n_too_high: 0,
            k,
            prefix_bits,
            suffix_bits,
            value_bits,
            suffix_mask: mask_u64(suffix_bits),
            suffix_bgn: Vec::new(),
            suf_data: WordArray::new(0, suffix_bits),
            val_data: None,
        };
        lookup.count(reader)?;
        lookup.allocate_and_load(reader)?;
        Ok(lookup)
    }

    /// Count the admitted population of every prefix.
    fn count(&mut self, reader: &mut Reader) -> Result<(), StoreError> {
        let mut counts = vec![0u64; (1usize << self.prefix_bits) + 1];

        reader.rewind();
        while reader.next()? {
            let value = reader.value();
            if value < self.min_value {
                self.n_too_low += 1;
                continue;
            }
            if value > self.max_value {
                self.n_too_high += 1;
                continue;
            }
            counts[(reader.fmer().word() >> self.suffix_bits) as usize] += 1;
        }

        // Prefix-sum in place: counts[p] becomes the start offset of
        // prefix p, with the sentinel at the end holding the total.
        let mut total = 0u64;
        for slot in counts.iter_mut() {
            let run = *slot;
            *slot = total;
            total += run;
        }
        self.n_loaded = total;
        self.suffix_bgn = counts;
        Ok(())
    }

    /// Allocate the packed arrays and fill them in a second sweep.
    fn allocate_and_load(&mut self, reader: &mut Reader) -> Result<(), StoreError> {
        self.suf_data = WordArray::new(self.n_loaded, self.suffix_bits);
        self.val_data = if self.value_bits > 0 {
            Some(WordArray::new(self.n_loaded, self.value_bits))
        } else {
            None
        };

        // Per-prefix write cursors, advanced as entries land.
        let mut suffix_end: Vec<u64> = self.suffix_bgn[..self.suffix_bgn.len() - 1].to_vec();

        reader.rewind();
        while reader.next()? {
            let value = reader.value();
            if value < self.min_value || value > self.max_value {
                continue;
            }

            let word = reader.fmer().word();
            let prefix = (word >> self.suffix_bits) as usize;
            let suffix = word & self.suffix_mask;

            let idx = suffix_end[prefix];
            if idx > self.suffix_bgn[prefix] {
                // The reader hands out k-mers ascending, so each run
                // arrives pre-sorted.
                debug_assert!(self.suf_data.get(idx - 1) <= suffix);
            }
            self.suf_data.set(idx, suffix);
            if let Some(val_data) = self.val_data.as_mut() {
                val_data.set(idx, value - self.value_offset);
            }
            suffix_end[prefix] = idx + 1;
        }

        debug_assert!(suffix_end
            .iter()
            .zip(self.suffix_bgn[1..].iter())
            .all(|(&end, &next_bgn)| end == next_bgn));
        Ok(())
    }

    /// Number of k-mers loaded into the table.
    #[inline]
    pub fn n_kmers(&self) -> u64 {
        self.n_loaded
    }

    /// K-mers skipped because their value was below the range.
    #[inline]
    pub fn n_too_low(&self) -> u64 {
        self.n_too_low
    }

    /// K-mers skipped because their value was above the range.
    #[inline]
    pub fn n_too_high(&self) -> u64 {
        self.n_too_high
    }

    /// Memory footprint of the packed arrays and offset table, in bits.
    pub fn size_bits(&self) -> u64 {
        self.suffix_bgn.len() as u64 * 64
            + self.suf_data.size_bits()
            + self.val_data.as_ref().map_or(0, WordArray::size_bits)
    }

    /// The stored value of `kmer`, or 0 if absent.
    ///
    /// Presence-only tables report 1 for any stored k-mer.
    pub fn value(&self, kmer: &Kmer) -> u64 {
        debug_assert_eq!(kmer.k(), self.k);
        let word = kmer.word();
        let prefix = (word >> self.suffix_bits) as usize;
        let suffix = word & self.suffix_mask;

        let mut bgn = self.suffix_bgn[prefix];
        let mut end = self.suffix_bgn[prefix + 1];

        while bgn + LINEAR_SEARCH_WINDOW < end {
            let mid = bgn + (end - bgn) / 2;
            let tag = self.suf_data.get(mid);
            if tag == suffix {
                return self.value_at(mid);
            }
            if suffix < tag {
                end = mid;
            } else {
                bgn = mid + 1;
            }
        }

        for mid in bgn..end {
            if self.suf_data.get(mid) == suffix {
                return self.value_at(mid);
            }
        }

        0
    }

    /// True iff `kmer` is stored with an admitted value.
    #[inline]
    pub fn exists(&self, kmer: &Kmer) -> bool {
        self.value(kmer) != 0
    }

    #[inline]
    fn value_at(&self, idx: u64) -> u64 {
        match &self.val_data {
            Some(val_data) => val_data.get(idx) + self.value_offset,
            None => 1,
        }
    }
}

/// Pick the prefix/suffix split minimizing total table memory.
///
/// Cost of a candidate split: the offset table grows as `2^prefixBits`
/// while the packed suffix array shrinks by one bit per k-mer for every
/// bit moved into the prefix.
fn configure(k_bits: u32, value_bits: u32, n_estimate: u64) -> (u32, u32) {
    let mut best_bits = u128::MAX;
    let mut best_pb = 1;

    for pb in 1..k_bits {
        let table = ((1u128 << pb) + 1) * 64;
        let packed = n_estimate as u128 * ((k_bits - pb) as u128 + value_bits as u128);
        let total = table + packed;
        if total < best_bits {
            best_bits = total;
            best_pb = pb;
        }
    }

    (best_pb, k_bits - best_pb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_balances_memory() {
        // A million k-mers of 40 bits: the best split puts the table in
        // the same ballpark as one packed bit per k-mer.
        let (pb, sb) = configure(40, 8, 1_000_000);
        assert_eq!(pb + sb, 40);
        assert!(pb >= 10 && pb <= 20, "unbalanced split: {pb}/{sb}");

        // Tiny input: a big table can never pay for itself.
        let (pb, _) = configure(40, 8, 10);
        assert!(pb <= 4);
    }
}
