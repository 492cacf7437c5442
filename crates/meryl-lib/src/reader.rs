//! Reading a k-mer count database
//!
//! [`Reader`] parses the master index, then iterates every stored
//! `(kmer, value)` pair in ascending order, loading and decoding one
//! block at a time. Data files are visited in order, so the sequence is
//! globally ascending; restricted to a single file via
//! [`enable_threads`](Reader::enable_threads), independent readers can
//! cover disjoint prefix ranges in parallel without sharing handles.
//!
//! # Example
//! ```no_run
//! use meryl_lib::reader::Reader;
//!
//! # fn main() -> Result<(), meryl_lib::error::StoreError> {
//! let mut reader = Reader::open("reads.meryl")?;
//! while reader.next()? {
//!     println!("{}\t{}", reader.fmer(), reader.value());
//! }
//! # Ok(())
//! # }
//! ```

use crate::block::Block;
use crate::error::StoreError;
use crate::index::{data_file_path, BlockIndexEntry, MasterIndex};
use crate::kmer::Kmer;
use crate::stats::CountStats;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Streaming reader over a database directory.
pub struct Reader {
    dir: PathBuf,

    k: u32,
    prefix_size: u32,
    suffix_size: u32,
    num_files_bits: u32,
    num_blocks_bits: u32,
    is_multi_set: bool,

    stats: Option<CountStats>,
    block_index: Vec<BlockIndexEntry>,

    dat: Option<BufReader<File>>,
    block: Block,
    active_file: u32,
    active_idx: usize,
    thread_file: Option<u32>,

    kmer: Kmer,
    value: u64,
}

impl Reader {
    /// Open a database, parsing its master index and statistics.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        let index = MasterIndex::read(&dir)?;
        let k = index.k();

        debug!(
            "opened database {:?}: k={}, prefix {} bits ({} files x {} blocks), multiset={}",
            dir,
            k,
            index.prefix_size,
            index.num_files(),
            index.num_blocks(),
            index.is_multi_set,
        );

        Ok(Self {
            dir,
            k,
            prefix_size: index.prefix_size,
            suffix_size: index.suffix_size,
            num_files_bits: index.num_files_bits,
            num_blocks_bits: index.num_blocks_bits,
            is_multi_set: index.is_multi_set,
            stats: Some(index.stats),
            block_index: index.block_index,
            dat: None,
            block: Block::new(),
            active_file: 0,
            active_idx: 0,
            thread_file: None,
            kmer: Kmer::new(k),
            value: 0,
        })
    }

    /// Open a database restricted to one data file.
    pub fn open_for_file(dir: impl AsRef<Path>, file_index: u32) -> Result<Self, StoreError> {
        let mut reader = Self::open(dir)?;
        reader.enable_threads(file_index)?;
        Ok(reader)
    }

    /// Restrict iteration to data file `file_index` and restart there.
    ///
    /// Separate readers pinned to distinct files iterate disjoint
    /// prefix ranges with no shared state.
    pub fn enable_threads(&mut self, file_index: u32) -> Result<(), StoreError> {
        if file_index >= self.num_files() {
            return Err(StoreError::InvalidConfig(format!(
                "file index {file_index} out of range, database has {} files",
                self.num_files()
            )));
        }
        self.thread_file = Some(file_index);
        self.rewind();
        Ok(())
    }

    /// Restart iteration from the first block of the active range.
    pub fn rewind(&mut self) {
        self.active_file = self.thread_file.unwrap_or(0);
        self.dat = None;
        self.block = Block::new();
        self.active_idx = 0;
    }

    /// Advance to the next stored k-mer, in ascending order.
    ///
    /// On `Ok(true)`, [`fmer`](Self::fmer) and [`value`](Self::value)
    /// hold the pair. Blocks are loaded lazily; a freshly exhausted file
    /// advances to the next one unless this reader is pinned.
    pub fn next(&mut self) -> Result<bool, StoreError> {
        loop {
            if self.active_idx < self.block.suffixes().len() {
                let suffix = self.block.suffixes()[self.active_idx];
                self.value = self.block.values()[self.active_idx];
                self.active_idx += 1;
                self.kmer = Kmer::from_parts(self.block.prefix(), suffix, self.suffix_size, self.k);
                return Ok(true);
            }

            if self.active_file >= self.num_files() {
                return Ok(false);
            }

            let path = data_file_path(&self.dir, self.active_file);
            if self.dat.is_none() {
                self.dat = Some(BufReader::new(File::open(&path)?));
            }
            let dat = self.dat.as_mut().expect("data file opened above");

            if self.block.load(dat, &path, self.active_file)? {
                self.block.decode(&path, self.active_file)?;
                self.active_idx = 0;
            } else {
                // End of this data file.
                self.dat = None;
                if self.thread_file.is_some() {
                    self.active_file = self.num_files();
                    return Ok(false);
                }
                self.active_file += 1;
            }
        }
    }

    /// The forward k-mer of the current pair.
    #[inline]
    pub fn fmer(&self) -> Kmer {
        self.kmer
    }

    /// The value of the current pair.
    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }

    /// The database directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// The k-mer size stored in this database.
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

    /// High bits of the prefix selecting the data file.
    #[inline]
    pub fn num_files_bits(&self) -> u32 {
        self.num_files_bits
    }

    /// Low bits of the prefix selecting the block slot.
    #[inline]
    pub fn num_blocks_bits(&self) -> u32 {
        self.num_blocks_bits
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

    /// Whether duplicate k-mers keep separate values.
    #[inline]
    pub fn is_multi_set(&self) -> bool {
        self.is_multi_set
    }

    /// The per-prefix block index.
    pub fn block_index(&self) -> &[BlockIndexEntry] {
        &self.block_index
    }

    /// The stored statistics, re-reading the master index if they were
    /// dropped.
    pub fn stats(&mut self) -> Result<&CountStats, StoreError> {
        if self.stats.is_none() {
            self.load_statistics()?;
        }
        Ok(self.stats.as_ref().expect("statistics loaded above"))
    }

    /// Re-read the statistics from the master index.
    pub fn load_statistics(&mut self) -> Result<(), StoreError> {
        let index = MasterIndex::read(&self.dir)?;
        self.stats = Some(index.stats);
        Ok(())
    }

    /// Free the in-memory statistics.
    pub fn drop_statistics(&mut self) {
        self.stats = None;
    }
}
