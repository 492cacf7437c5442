//! Streaming sub-writer for pre-sorted input
//!
//! Writes one data file. The caller promises k-mers arrive in ascending
//! order and within this file's prefix range; a block is flushed each
//! time the prefix changes, so memory is bounded by the largest single
//! prefix run. Out-of-order input is a programmer error and aborts.

use super::Writer;
use crate::error::StoreError;
use crate::index::{data_file_path, BlockIndexEntry};
use crate::kmer::Kmer;
use crate::stats::CountStats;
use std::fs::File;
use std::io::BufWriter;

/// Sub-writer that streams one data file of ascending k-mers.
pub struct StreamWriter<'w> {
    writer: &'w Writer,
    file_index: u32,

    dat: BufWriter<File>,
    index: Vec<BlockIndexEntry>,
    stats: CountStats,

    prefix: u64,
    suffixes: Vec<u64>,
    values: Vec<u64>,
}

impl<'w> StreamWriter<'w> {
    pub(super) fn new(writer: &'w Writer, file_index: u32) -> Result<Self, StoreError> {
        if file_index >= writer.num_files() {
            return Err(StoreError::InvalidConfig(format!(
                "file index {file_index} out of range, database has {} files",
                writer.num_files()
            )));
        }

        let path = data_file_path(writer.path(), file_index);
        let dat = BufWriter::new(File::create(path)?);
        let index = vec![BlockIndexEntry::EMPTY; writer.num_blocks() as usize];

        Ok(Self {
            writer,
            file_index,
            dat,
            index,
            stats: CountStats::new(),
            prefix: u64::MAX,
            suffixes: Vec::new(),
            values: Vec::new(),
        })
    }

    /// The data file this writer feeds.
    #[inline]
    pub fn file_index(&self) -> u32 {
        self.file_index
    }

    /// Append one k-mer. Input must be ascending and routed to this
    /// writer's file.
    pub fn add(&mut self, kmer: Kmer, value: u64) -> Result<(), StoreError> {
        debug_assert_eq!(kmer.k(), self.writer.k());

        let (prefix, suffix) = kmer.split(self.writer.suffix_size());
        assert!(
            prefix >= self.writer.first_prefix_in_file(self.file_index)
                && prefix <= self.writer.last_prefix_in_file(self.file_index),
            "prefix {prefix:#x} is not routed to data file {}",
            self.file_index
        );

        if prefix != self.prefix {
            assert!(
                self.prefix == u64::MAX || prefix > self.prefix,
                "stream input must be ascending: prefix {prefix:#x} after {:#x}",
                self.prefix
            );
            self.flush_block()?;
            self.prefix = prefix;
        }

        if let Some(&last) = self.suffixes.last() {
            assert!(suffix >= last, "stream input must be ascending");
            if suffix == last && !self.writer.is_multi_set() {
                // Same k-mer again: single-set databases sum the values.
                *self.values.last_mut().expect("values aligned with suffixes") += value;
                return Ok(());
            }
        }

        self.suffixes.push(suffix);
        self.values.push(value);
        Ok(())
    }

    /// Write any open block, then merge this file's index and
    /// statistics into the parent writer.
    pub fn finish(mut self) -> Result<(), StoreError> {
        self.flush_block()?;
        self.dat.into_inner().map_err(|e| StoreError::Io(e.into_error()))?;
        self.writer.merge_file(self.file_index, &self.index, &self.stats);
        Ok(())
    }

    fn flush_block(&mut self) -> Result<(), StoreError> {
        if self.suffixes.is_empty() {
            return Ok(());
        }
        // Split borrows: write_block reads the buffers while updating
        // the per-file index and statistics.
        let suffixes = std::mem::take(&mut self.suffixes);
        let values = std::mem::take(&mut self.values);
        self.writer.write_block(
            &mut self.dat,
            &mut self.index,
            &mut self.stats,
            self.prefix,
            &suffixes,
            &values,
        )?;
        self.suffixes = suffixes;
        self.suffixes.clear();
        self.values = values;
        self.values.clear();
        Ok(())
    }
}
