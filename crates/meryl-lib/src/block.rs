//! On-disk block encoding and decoding
//!
//! A block holds every stored k-mer sharing one routing prefix. Suffixes
//! are sorted, so their high bits form a slowly-growing sequence: each
//! suffix is stored as a unary-coded *gap* in its high `unaryBits` part
//! followed by `binaryBits` of raw low bits. Values follow the suffix
//! stream, 32 or 64 bits each as declared by the header.
//!
//! Layout inside one length-prefixed [`BitStream`]:
//!
//! ```text
//! magic1:64  magic2:64                  ("merylDataFile00\n")
//! prefix:64  nKmers:64
//! kCode:8    unaryBits:32  binaryBits:32  k1:64
//! cCode:8    c1:64         c2:64
//! suffix stream: nKmers x (unary gap, binary tail)
//! value stream:  nKmers x (32 or 64 bits)
//! ```
//!
//! Only `kCode == 1` and `cCode` in {1, 2} exist; anything else is a
//! fatal, reported error rather than a silent fallback.

use crate::bitstream::BitStream;
use crate::constants::{ceil_log2, mask_u64, BLOCK_MAGIC1, BLOCK_MAGIC2};
use crate::error::StoreError;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Suffix encoding: unary high-part gap plus binary tail.
const KMER_CODE_UNARY_BINARY: u8 = 1;
/// Value encoding: 32-bit binary per k-mer.
const VALUE_CODE_U32: u8 = 1;
/// Value encoding: 64-bit binary per k-mer.
const VALUE_CODE_U64: u8 = 2;

/// Split `suffix_bits` into unary and binary parts for a block of
/// `n_kmers` sorted suffixes.
///
/// The binary tail keeps the bits that carry no exploitable order:
/// `binaryBits = suffixBits - ceil(log2(nKmers + 1))`, leaving the high
/// part's total unary cost at roughly one bit per k-mer.
#[inline]
pub fn split_suffix_bits(suffix_bits: u32, n_kmers: u64) -> (u32, u32) {
    let binary_bits = suffix_bits.saturating_sub(ceil_log2(n_kmers + 1));
    (suffix_bits - binary_bits, binary_bits)
}

/// Encode one block into `bits`.
///
/// `suffixes` must be sorted ascending; duplicates are legal only for
/// multi-set databases and encode as a zero gap. `values` is aligned
/// 1:1 with `suffixes`.
pub fn encode_block(bits: &mut BitStream, prefix: u64, suffix_bits: u32, suffixes: &[u64], values: &[u64]) {
    debug_assert_eq!(suffixes.len(), values.len());
    debug_assert!(suffixes.windows(2).all(|w| w[0] <= w[1]), "suffixes must be sorted");

    let n_kmers = suffixes.len() as u64;
    let (unary_bits, binary_bits) = split_suffix_bits(suffix_bits, n_kmers);

    let c_code = if values.iter().any(|&v| v > u32::MAX as u64) {
        VALUE_CODE_U64
    } else {
        VALUE_CODE_U32
    };

    bits.push_binary(64, BLOCK_MAGIC1);
    bits.push_binary(64, BLOCK_MAGIC2);

    bits.push_binary(64, prefix);
    bits.push_binary(64, n_kmers);

    bits.push_binary(8, KMER_CODE_UNARY_BINARY as u64);
    bits.push_binary(32, unary_bits as u64);
    bits.push_binary(32, binary_bits as u64);
    bits.push_binary(64, 0); // k1, reserved

    bits.push_binary(8, c_code as u64);
    bits.push_binary(64, 0); // c1, reserved
    bits.push_binary(64, 0); // c2, reserved

    let mut prev_high = 0u64;
    for &suffix in suffixes {
        debug_assert_eq!(suffix & !mask_u64(suffix_bits), 0);
        let high = suffix >> binary_bits;
        bits.push_unary(high - prev_high);
        bits.push_binary(binary_bits, suffix & mask_u64(binary_bits));
        prev_high = high;
    }

    let value_width = if c_code == VALUE_CODE_U64 { 64 } else { 32 };
    for &value in values {
        bits.push_binary(value_width, value);
    }
}

/// A block read back from a data file.
///
/// [`load`](Self::load) pulls the next length-prefixed stream off the
/// file and decodes only the header; [`decode`](Self::decode) expands
/// the suffix and value streams into the block's own arrays, which are
/// reused across blocks. Loading with a block already pending is a
/// no-op, so a peeked block is never lost.
#[derive(Debug, Default)]
pub struct Block {
    data: Option<BitStream>,

    prefix: u64,
    n_kmers: u64,

    k_code: u8,
    unary_bits: u32,
    binary_bits: u32,

    c_code: u8,

    suffixes: Vec<u64>,
    values: Vec<u64>,
}

impl Block {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// The routing prefix shared by every k-mer in this block.
    #[inline]
    pub fn prefix(&self) -> u64 {
        self.prefix
    }

    /// Number of k-mers in this block.
    #[inline]
    pub fn n_kmers(&self) -> u64 {
        self.n_kmers
    }

    /// Decoded suffixes, ascending. Empty until [`decode`](Self::decode).
    #[inline]
    pub fn suffixes(&self) -> &[u64] {
        &self.suffixes
    }

    /// Decoded values, aligned with [`suffixes`](Self::suffixes).
    #[inline]
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    /// Read the next block from `input` and decode its header.
    ///
    /// Returns `Ok(false)` on a clean end-of-file. If a loaded block is
    /// already pending, returns `Ok(true)` without touching the file.
    pub fn load<R: Read>(&mut self, input: &mut R, file: &Path, file_index: u32) -> Result<bool, StoreError> {
        if self.data.is_some() {
            return Ok(true);
        }

        let mut data = BitStream::new();
        if !data.load(input)? {
            return Ok(false);
        }

        let position = data.position();
        let m1 = data.get_binary(64);
        let m2 = data.get_binary(64);
        for (expected, found) in [(BLOCK_MAGIC1, m1), (BLOCK_MAGIC2, m2)] {
            if found != expected {
                return Err(StoreError::BadMagic {
                    file: file.to_path_buf(),
                    file_index,
                    position,
                    expected,
                    found,
                });
            }
        }

        self.prefix = data.get_binary(64);
        self.n_kmers = data.get_binary(64);

        self.k_code = data.get_binary(8) as u8;
        self.unary_bits = data.get_binary(32) as u32;
        self.binary_bits = data.get_binary(32) as u32;
        let _k1 = data.get_binary(64);

        self.c_code = data.get_binary(8) as u8;
        let _c1 = data.get_binary(64);
        let _c2 = data.get_binary(64);

        self.data = Some(data);
        Ok(true)
    }

    /// Expand the pending suffix and value streams into this block's
    /// arrays, consuming the raw data.
    pub fn decode(&mut self, file: &Path, file_index: u32) -> Result<(), StoreError> {
        let Some(mut data) = self.data.take() else {
            return Ok(());
        };

        self.suffixes.clear();
        self.values.clear();
        self.suffixes.reserve(self.n_kmers as usize);
        self.values.reserve(self.n_kmers as usize);

        let truncated = |data: &BitStream| StoreError::TruncatedBlock {
            file: file.to_path_buf(),
            file_index,
            position: data.position(),
        };

        match self.k_code {
            KMER_CODE_UNARY_BINARY => {
                let mut high = 0u64;
                for _ in 0..self.n_kmers {
                    if data.remaining() < 1 + self.binary_bits as u64 {
                        return Err(truncated(&data));
                    }
                    high += data.get_unary();
                    let tail = data.get_binary(self.binary_bits);
                    self.suffixes.push((high << self.binary_bits) | tail);
                }
            }
            code => {
                return Err(StoreError::UnknownKmerCode {
                    code,
                    file: file.to_path_buf(),
                    file_index,
                });
            }
        }

        let value_width = match self.c_code {
            VALUE_CODE_U32 => 32,
            VALUE_CODE_U64 => 64,
            code => {
                return Err(StoreError::UnknownValueCode {
                    code,
                    file: file.to_path_buf(),
                    file_index,
                });
            }
        };
        if data.remaining() < self.n_kmers * value_width as u64 {
            return Err(truncated(&data));
        }
        for _ in 0..self.n_kmers {
            self.values.push(data.get_binary(value_width));
        }

        Ok(())
    }

    /// Drop a pending raw stream without decoding it.
    pub fn discard(&mut self) {
        self.data = None;
    }
}

/// Walk a data file and log every block header.
///
/// Returns the number of blocks seen. The block bodies are not decoded.
pub fn inspect_data_file(path: &Path, file_index: u32) -> Result<u64, StoreError> {
    let mut input = std::io::BufReader::new(std::fs::File::open(path)?);
    let mut block = Block::new();
    let mut n_blocks = 0u64;

    while block.load(&mut input, path, file_index)? {
        info!(
            "block {:>6}  prefix {:#014x}  nKmers {:>9}  kCode {} unary {:>2} binary {:>2}  cCode {}",
            n_blocks, block.prefix, block.n_kmers, block.k_code, block.unary_bits, block.binary_bits, block.c_code,
        );
        block.discard();
        n_blocks += 1;
    }

    Ok(n_blocks)
}
