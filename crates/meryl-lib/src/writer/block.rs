//! In-memory batching sub-writer
//!
//! Accepts `(kmer, value)` pairs in arbitrary order, bucketed by data
//! file as they arrive. On finish, each file's bucket is sorted, grouped
//! by prefix, and written as one block per non-empty prefix; files are
//! processed in parallel. In single-set mode duplicate k-mers collapse
//! to one entry with their values summed; in multi-set mode they are
//! kept in arrival order.

use super::Writer;
use crate::constants::mask_u64;
use crate::error::StoreError;
use crate::index::{data_file_path, BlockIndexEntry};
use crate::kmer::Kmer;
use crate::stats::CountStats;
use rayon::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use tracing::debug;

/// Sub-writer that buffers everything and sorts at the end.
pub struct BlockWriter<'w> {
    writer: &'w Writer,
    buckets: Vec<Vec<(u64, u64)>>,
}

impl<'w> BlockWriter<'w> {
    pub(super) fn new(writer: &'w Writer) -> Self {
        let buckets = vec![Vec::new(); writer.num_files() as usize];
        Self { writer, buckets }
    }

    /// Add one k-mer with its value. Order is irrelevant.
    pub fn add(&mut self, kmer: Kmer, value: u64) {
        debug_assert_eq!(kmer.k(), self.writer.k());
        let word = kmer.word();
        let file = self.writer.file_for_prefix(self.writer.prefix_of(word));
        self.buckets[file as usize].push((word, value));
    }

    /// Number of pairs buffered so far.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// True if nothing was added yet.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    /// Sort and write every data file, then merge the block indices and
    /// statistics into the parent writer.
    ///
    /// Files are independent and processed in parallel.
    pub fn finish(self) -> Result<(), StoreError> {
        let writer = self.writer;
        self.buckets
            .into_par_iter()
            .enumerate()
            .try_for_each(|(file_index, pairs)| write_file(writer, file_index as u32, pairs))
    }
}

/// Sort one file's pairs, emit its blocks, and merge into the parent.
fn write_file(writer: &Writer, file_index: u32, mut pairs: Vec<(u64, u64)>) -> Result<(), StoreError> {
    // Stable sort: in multi-set mode duplicates must keep arrival order.
    pairs.sort_by_key(|&(word, _)| word);

    let path = data_file_path(writer.path(), file_index);
    let mut dat = BufWriter::new(File::create(&path)?);

    let mut index = vec![BlockIndexEntry::EMPTY; writer.num_blocks() as usize];
    let mut stats = CountStats::new();

    let mut suffixes: Vec<u64> = Vec::new();
    let mut values: Vec<u64> = Vec::new();

    let mut i = 0;
    while i < pairs.len() {
        let prefix = writer.prefix_of(pairs[i].0);
        let mut j = i;
        while j < pairs.len() && writer.prefix_of(pairs[j].0) == prefix {
            j += 1;
        }

        suffixes.clear();
        values.clear();
        if writer.is_multi_set() {
            for &(word, value) in &pairs[i..j] {
                suffixes.push(word & mask_u64(writer.suffix_size()));
                values.push(value);
            }
        } else {
            // Collapse runs of the same k-mer, summing their values.
            let mut run = i;
            while run < j {
                let word = pairs[run].0;
                let mut value = 0u64;
                while run < j && pairs[run].0 == word {
                    value += pairs[run].1;
                    run += 1;
                }
                suffixes.push(word & mask_u64(writer.suffix_size()));
                values.push(value);
            }
        }

        writer.write_block(&mut dat, &mut index, &mut stats, prefix, &suffixes, &values)?;
        i = j;
    }

    dat.into_inner().map_err(|e| StoreError::Io(e.into_error()))?;

    debug!(
        "data file {:>4}: {} kmers in {} blocks",
        file_index,
        stats.num_distinct(),
        index.iter().filter(|entry| !entry.is_empty()).count(),
    );

    writer.merge_file(file_index, &index, &stats);
    Ok(())
}
