//! Master index and per-prefix block index
//!
//! A database directory holds one `merylIndex` file and `2^numFilesBits`
//! data files. The master index records the prefix/suffix geometry, the
//! multi-set flag, one [`BlockIndexEntry`] per prefix across all files,
//! and the aggregated [`CountStats`].
//!
//! Three framings exist, v01..v03, sharing the leading `merylInd` magic
//! word and differing in an ASCII version word: v02 added the multi-set
//! flag, v03 switched statistics to the compact pair framing. Readers
//! accept all three; writers emit v03. Pre-versioned files carry no
//! magic and are reported as unsupported.

use crate::bitstream::BitStream;
use crate::constants::{INDEX_MAGIC, INDEX_VERSION_01, INDEX_VERSION_02, INDEX_VERSION_03};
use crate::error::StoreError;
use crate::stats::CountStats;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Newest master index version; what the writer emits.
pub const CURRENT_VERSION: u32 = 3;

/// Path of the master index inside a database directory.
pub fn master_index_path(dir: &Path) -> PathBuf {
    dir.join("merylIndex")
}

/// Path of data file `file_index` inside a database directory.
pub fn data_file_path(dir: &Path, file_index: u32) -> PathBuf {
    dir.join(format!("{file_index:04}.dat"))
}

/// Where in a data file the blocks for one prefix start, and how many
/// k-mers they hold.
///
/// A prefix may span several physically consecutive blocks; appending a
/// later block for the same prefix accumulates the k-mer count and keeps
/// the earliest offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockIndexEntry {
    prefix: u64,
    position: u64,
    num_kmers: u64,
}

impl BlockIndexEntry {
    /// An unoccupied index slot.
    pub const EMPTY: Self = Self {
        prefix: u64::MAX,
        position: u64::MAX,
        num_kmers: 0,
    };

    /// Record a block of `num_kmers` k-mers for `prefix` at byte
    /// `position`, or extend a contiguous run already recorded.
    ///
    /// The slot's prefix is immutable once set, and offsets must not go
    /// backwards; both are programmer errors and abort.
    pub fn set(&mut self, prefix: u64, position: u64, num_kmers: u64) {
        if self.prefix == u64::MAX {
            self.prefix = prefix;
            self.position = position;
            self.num_kmers = num_kmers;
            return;
        }

        assert_eq!(self.prefix, prefix, "block index slot rebound to a different prefix");
        assert!(self.position <= position, "block offsets must be monotonic");
        self.num_kmers += num_kmers;
    }

    /// Reset the slot to unoccupied.
    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }

    /// True if no block was recorded for this slot.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.prefix == u64::MAX
    }

    /// The prefix this slot indexes.
    #[inline]
    pub fn prefix(&self) -> u64 {
        self.prefix
    }

    /// Byte offset of the first block for this prefix.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total k-mers recorded for this prefix.
    #[inline]
    pub fn num_kmers(&self) -> u64 {
        self.num_kmers
    }
}

/// The deserialized master index of a database.
#[derive(Debug)]
pub struct MasterIndex {
    /// Bits of each k-mer used for file/block routing.
    pub prefix_size: u32,
    /// Bits of each k-mer stored inside blocks.
    pub suffix_size: u32,
    /// High bits of the prefix selecting the data file.
    pub num_files_bits: u32,
    /// Low bits of the prefix selecting the block slot within a file.
    pub num_blocks_bits: u32,
    /// Whether duplicate k-mers keep separate values.
    pub is_multi_set: bool,
    /// One entry per prefix, across all files; `numFiles * numBlocks` long.
    pub block_index: Vec<BlockIndexEntry>,
    /// Aggregated statistics over all stored counts.
    pub stats: CountStats,
}

impl MasterIndex {
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

    /// The k-mer size stored in this database.
    #[inline]
    pub fn k(&self) -> u32 {
        (self.prefix_size + self.suffix_size) / 2
    }

    /// Data file holding `prefix`.
    #[inline]
    pub fn file_for_prefix(&self, prefix: u64) -> u32 {
        (prefix >> self.num_blocks_bits) as u32
    }

    /// Block slot of `prefix` within its data file.
    #[inline]
    pub fn block_for_prefix(&self, prefix: u64) -> u64 {
        prefix & (self.num_blocks() - 1)
    }

    /// Serialize to `<dir>/merylIndex` in the newest framing.
    pub fn write(&self, dir: &Path) -> Result<(), StoreError> {
        self.write_with_version(dir, CURRENT_VERSION)
    }

    /// Serialize in an older framing.
    ///
    /// Useful for interoperating with tools that read only a specific
    /// version, and for compatibility tests.
    pub fn write_with_version(&self, dir: &Path, version: u32) -> Result<(), StoreError> {
        let version_word = match version {
            1 => INDEX_VERSION_01,
            2 => INDEX_VERSION_02,
            3 => INDEX_VERSION_03,
            _ => {
                return Err(StoreError::InvalidConfig(format!(
                    "cannot write master index version {version}"
                )))
            }
        };

        let mut bits = BitStream::new();
        bits.push_binary(64, INDEX_MAGIC);
        bits.push_binary(64, version_word);

        bits.push_binary(32, self.prefix_size as u64);
        bits.push_binary(32, self.suffix_size as u64);
        bits.push_binary(32, self.num_files_bits as u64);
        bits.push_binary(32, self.num_blocks_bits as u64);
        if version >= 2 {
            bits.push_binary(8, self.is_multi_set as u64);
        }

        for entry in &self.block_index {
            bits.push_binary(64, entry.prefix);
            bits.push_binary(64, entry.position);
            bits.push_binary(64, entry.num_kmers);
        }

        if version >= 3 {
            self.stats.dump(&mut bits);
        } else {
            self.stats.dump_v01(&mut bits);
        }

        let path = master_index_path(dir);
        let mut out = BufWriter::new(File::create(path)?);
        bits.dump(&mut out)?;
        out.flush()?;
        Ok(())
    }

    /// Deserialize from `<dir>/merylIndex`, auto-detecting v01..v03.
    pub fn read(dir: &Path) -> Result<Self, StoreError> {
        let path = master_index_path(dir);
        let mut input = BufReader::new(File::open(&path)?);

        let mut bits = BitStream::new();
        if !bits.load(&mut input)? {
            return Err(StoreError::UnsupportedVersion {
                file: path,
                detail: "file is empty".to_string(),
            });
        }

        let magic = bits.get_binary(64);
        if magic != INDEX_MAGIC {
            return Err(StoreError::UnsupportedVersion {
                file: path,
                detail: format!(
                    "leading magic {magic:#018x} is not {INDEX_MAGIC:#018x}; \
                     pre-versioned indexes are not supported"
                ),
            });
        }

        let version_word = bits.get_binary(64);
        let version = match version_word {
            INDEX_VERSION_01 => 1,
            INDEX_VERSION_02 => 2,
            INDEX_VERSION_03 => 3,
            other => {
                return Err(StoreError::UnsupportedVersion {
                    file: path,
                    detail: format!("unknown version word {other:#018x}"),
                });
            }
        };

        let prefix_size = bits.get_binary(32) as u32;
        let suffix_size = bits.get_binary(32) as u32;
        let num_files_bits = bits.get_binary(32) as u32;
        let num_blocks_bits = bits.get_binary(32) as u32;
        let is_multi_set = if version >= 2 { bits.get_binary(8) != 0 } else { false };

        if num_files_bits + num_blocks_bits != prefix_size
            || prefix_size == 0
            || (prefix_size + suffix_size) % 2 != 0
        {
            return Err(StoreError::UnsupportedVersion {
                file: path,
                detail: format!(
                    "inconsistent geometry: prefixSize {prefix_size}, suffixSize {suffix_size}, \
                     numFilesBits {num_files_bits}, numBlocksBits {num_blocks_bits}"
                ),
            });
        }

        let n_entries = 1u64 << prefix_size.min(63);
        if n_entries as u128 * 3 * 64 > bits.remaining() as u128 {
            return Err(StoreError::UnsupportedVersion {
                file: path,
                detail: format!("block index of {n_entries} entries does not fit the file"),
            });
        }
        let mut block_index = Vec::with_capacity(n_entries as usize);
        for _ in 0..n_entries {
            let prefix = bits.get_binary(64);
            let position = bits.get_binary(64);
            let num_kmers = bits.get_binary(64);
            block_index.push(BlockIndexEntry {
                prefix,
                position,
                num_kmers,
            });
        }

        let stats = CountStats::load(&mut bits, version);

        Ok(Self {
            prefix_size,
            suffix_size,
            num_files_bits,
            num_blocks_bits,
            is_multi_set,
            block_index,
            stats,
        })
    }
}
