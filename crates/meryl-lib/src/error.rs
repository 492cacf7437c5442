//! Store-wide error type
//!
//! Malformed on-disk data carries enough context to find the byte in a
//! hex dump: the file path, the data-file ordinal, and the bit position
//! inside the offending block stream.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or writing a k-mer count database.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Block magic words did not match
    #[error(
        "magic number mismatch in {file:?} (data file {file_index}) at bit position {position}: \
         expected {expected:#018x}, found {found:#018x}"
    )]
    BadMagic {
        /// Path of the data file
        file: PathBuf,
        /// Ordinal of the data file within the database
        file_index: u32,
        /// Bit position of the block inside its stream
        position: u64,
        /// The magic word expected at this position
        expected: u64,
        /// The word actually read
        found: u64,
    },

    /// A block declared a suffix encoding this library does not know
    #[error("unknown kmer encoding code {code} in {file:?} (data file {file_index})")]
    UnknownKmerCode {
        /// The unrecognized kCode
        code: u8,
        /// Path of the data file
        file: PathBuf,
        /// Ordinal of the data file within the database
        file_index: u32,
    },

    /// A block declared a value encoding this library does not know
    #[error("unknown value encoding code {code} in {file:?} (data file {file_index})")]
    UnknownValueCode {
        /// The unrecognized cCode
        code: u8,
        /// Path of the data file
        file: PathBuf,
        /// Ordinal of the data file within the database
        file_index: u32,
    },

    /// A block ended before its declared k-mer count was decoded
    #[error("truncated block in {file:?} (data file {file_index}) at bit position {position}")]
    TruncatedBlock {
        /// Path of the data file
        file: PathBuf,
        /// Ordinal of the data file within the database
        file_index: u32,
        /// Bit position where decoding ran out of data
        position: u64,
    },

    /// The master index is missing its magic or carries an unknown version
    #[error("unsupported master index format in {file:?}: {detail}")]
    UnsupportedVersion {
        /// Path of the master index file
        file: PathBuf,
        /// What was found instead of a supported framing
        detail: String,
    },

    /// Invalid writer or lookup configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
