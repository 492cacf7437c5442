//! Writing a k-mer count database
//!
//! [`Writer`] owns the output directory, the prefix/suffix geometry, and
//! the shared master-index state. It does not accept k-mers itself; it
//! hands out sub-writers:
//!
//! - [`BlockWriter`] buffers `(kmer, value)` pairs in any order, then
//!   sorts and writes every data file on finish.
//! - [`StreamWriter`] writes one data file from input that is already
//!   sorted, holding at most one prefix run in memory.
//!
//! Sub-writers borrow the parent's immutable configuration and merge
//! their per-file block indices and statistics into it under a mutex
//! when they finish; [`Writer::finalize`] then writes the master index.
//! If `finalize` is never called the master index is left unwritten and
//! the partial data files are recoverable by a later run.

pub mod block;
pub mod stream;

pub use block::BlockWriter;
pub use stream::StreamWriter;

use crate::block::encode_block;
use crate::bitstream::BitStream;
use crate::constants::is_valid_k;
use crate::error::StoreError;
use crate::index::{data_file_path, BlockIndexEntry, MasterIndex};
use crate::stats::CountStats;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Parameters for creating a database.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// K-mer size, 2..=32.
    pub k: u32,

    /// Bits of each k-mer used for file/block routing; 0 picks a
    /// default from `k`. Must leave at least one suffix bit.
    pub prefix_size: u32,

    /// Keep duplicate k-mers as separate entries instead of summing
    /// their values.
    pub is_multi_set: bool,
}

impl WriterConfig {
    /// Configuration with default geometry for `k`.
    pub fn new(k: u32) -> Self {
        Self {
            k,
            prefix_size: 0,
            is_multi_set: false,
        }
    }

    /// Check parameter sanity.
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_k(self.k) {
            return Err(format!("k must be in range [2, 32], got k={}", self.k));
        }
        if self.prefix_size != 0 {
            if self.prefix_size < 2 {
                return Err(format!("prefix size must be at least 2, got {}", self.prefix_size));
            }
            if self.prefix_size >= 2 * self.k {
                return Err(format!(
                    "prefix size {} leaves no suffix bits for k={}",
                    self.prefix_size, self.k
                ));
            }
        }
        Ok(())
    }

    /// The routing prefix width, resolving 0 to the default for `k`.
    pub fn resolved_prefix_size(&self) -> u32 {
        if self.prefix_size != 0 {
            return self.prefix_size;
        }
        // Keep blocks around a thousand k-mers for typical inputs while
        // never eating the whole word.
        (2 * self.k).saturating_sub(10).clamp(2, 16).min(2 * self.k - 2)
    }

    /// Log the configuration.
    pub fn print(&self) {
        info!("Writer configuration:");
        info!("  k = {}", self.k);
        info!("  prefix size = {} bits", self.resolved_prefix_size());
        info!("  multi-set = {}", self.is_multi_set);
    }
}

/// Owner of a database being written.
pub struct Writer {
    out_dir: PathBuf,

    k: u32,
    prefix_size: u32,
    suffix_size: u32,

    num_files_bits: u32,
    num_blocks_bits: u32,

    is_multi_set: bool,

    stats: Mutex<CountStats>,
    block_index: Mutex<Vec<BlockIndexEntry>>,
}

impl Writer {
    /// Create the database directory and a writer for it.
    pub fn create(out_dir: impl AsRef<Path>, config: WriterConfig) -> Result<Self, StoreError> {
        config.validate().map_err(StoreError::InvalidConfig)?;

        let out_dir = out_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&out_dir)?;

        let prefix_size = config.resolved_prefix_size();
        let suffix_size = 2 * config.k - prefix_size;
        let num_files_bits = 6.min(prefix_size - 1);
        let num_blocks_bits = prefix_size - num_files_bits;

        debug!(
            "creating database {:?}: prefix {} bits ({} files x {} blocks), suffix {} bits",
            out_dir,
            prefix_size,
            1u32 << num_files_bits,
            1u64 << num_blocks_bits,
            suffix_size,
        );

        let n_entries = 1usize << prefix_size;
        Ok(Self {
            out_dir,
            k: config.k,
            prefix_size,
            suffix_size,
            num_files_bits,
            num_blocks_bits,
            is_multi_set: config.is_multi_set,
            stats: Mutex::new(CountStats::new()),
            block_index: Mutex::new(vec![BlockIndexEntry::EMPTY; n_entries]),
        })
    }

    /// The database directory.
    pub fn path(&self) -> &Path {
        &self.out_dir
    }

    /// The k-mer size this database stores.
    #[inline]
    pub fn k(&self) -> u32 {
        self.k
    }

    /// Bits of each k-mer used for routing.
    #[inline]
    pub fn prefix_size(&self) -> u32 {
        self.prefix_size
    }

    /// Bits of each k-mer stored inside blocks.
    #[inline]
    pub fn suffix_size(&self) -> u32 {
        self.suffix_size
    }

    /// Whether duplicate k-mers keep separate values.
    #[inline]
    pub fn is_multi_set(&self) -> bool {
        self.is_multi_set
    }

    /// Number of data files.
    #[inline]
    pub fn num_files(&self) -> u32 {
        1 << self.num_files_bits
    }

    /// Number of block slots per data file.
    #[inline]
    pub fn num_blocks(&self) -> u64 {
        1 << self.num_blocks_bits
    }

    /// The routing prefix of a k-mer word.
    #[inline]
    pub(crate) fn prefix_of(&self, word: u64) -> u64 {
        word >> self.suffix_size
    }

    /// Data file holding `prefix`.
    #[inline]
    pub fn file_for_prefix(&self, prefix: u64) -> u32 {
        (prefix >> self.num_blocks_bits) as u32
    }

    /// Smallest prefix routed to data file `file_index`.
    #[inline]
    pub fn first_prefix_in_file(&self, file_index: u32) -> u64 {
        (file_index as u64) << self.num_blocks_bits
    }

    /// Largest prefix routed to data file `file_index`.
    #[inline]
    pub fn last_prefix_in_file(&self, file_index: u32) -> u64 {
        self.first_prefix_in_file(file_index + 1) - 1
    }

    /// A sub-writer that accepts k-mers in any order.
    pub fn block_writer(&self) -> BlockWriter<'_> {
        BlockWriter::new(self)
    }

    /// A sub-writer for one data file that demands pre-sorted input.
    pub fn stream_writer(&self, file_index: u32) -> Result<StreamWriter<'_>, StoreError> {
        StreamWriter::new(self, file_index)
    }

    /// Write the master index. Every sub-writer must have finished.
    ///
    /// Data files never touched by a sub-writer are created empty so the
    /// reader can open the full set.
    pub fn finalize(&self) -> Result<(), StoreError> {
        for file_index in 0..self.num_files() {
            let path = data_file_path(&self.out_dir, file_index);
            if !path.exists() {
                File::create(path)?;
            }
        }

        let stats = self.stats.lock().expect("stats mutex poisoned").clone();
        let block_index = self.block_index.lock().expect("index mutex poisoned").clone();

        let index = MasterIndex {
            prefix_size: self.prefix_size,
            suffix_size: self.suffix_size,
            num_files_bits: self.num_files_bits,
            num_blocks_bits: self.num_blocks_bits,
            is_multi_set: self.is_multi_set,
            block_index,
            stats,
        };
        index.write(&self.out_dir)?;

        info!(
            "finalized database {:?}: {} distinct kmers, {} total",
            self.out_dir,
            index.stats.num_distinct(),
            index.stats.num_total(),
        );
        Ok(())
    }

    /// Encode one block, append it to `dat`, and record it in the
    /// caller's per-file index and statistics.
    pub(crate) fn write_block<W: Write + Seek>(
        &self,
        dat: &mut W,
        index: &mut [BlockIndexEntry],
        stats: &mut CountStats,
        prefix: u64,
        suffixes: &[u64],
        values: &[u64],
    ) -> Result<(), StoreError> {
        let position = dat.stream_position()?;
        let block = (prefix & (self.num_blocks() - 1)) as usize;
        index[block].set(prefix, position, suffixes.len() as u64);

        for &value in values {
            stats.add_value(value);
        }

        let mut bits = BitStream::new();
        encode_block(&mut bits, prefix, self.suffix_size, suffixes, values);
        bits.dump(dat)?;
        Ok(())
    }

    /// Fold one finished data file's index slice and statistics into the
    /// shared master-index state.
    pub(crate) fn merge_file(
        &self,
        file_index: u32,
        local_index: &[BlockIndexEntry],
        local_stats: &CountStats,
    ) {
        debug_assert_eq!(local_index.len() as u64, self.num_blocks());

        let base = file_index as usize * self.num_blocks() as usize;
        let mut global = self.block_index.lock().expect("index mutex poisoned");
        for (offset, entry) in local_index.iter().enumerate() {
            if entry.is_empty() {
                continue;
            }
            debug_assert!(global[base + offset].is_empty(), "data file {file_index} written twice");
            global[base + offset] = *entry;
        }
        drop(global);

        self.stats.lock().expect("stats mutex poisoned").merge(local_stats);
    }
}
