// meryl-lib: block-structured k-mer count database
//
// A Rust implementation of the meryl on-disk format: bit-packed,
// prefix-partitioned storage of k-mer counts, with streaming writers,
// a streaming reader, and an in-memory exact lookup table.

#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod constants;
pub mod encoding;
pub mod error;
pub mod kmer;
pub mod bitstream;
pub mod word_array;
pub mod stats;
pub mod block;
pub mod index;
pub mod writer;
pub mod reader;
pub mod lookup;

// Re-export common types at crate root
pub use bitstream::BitStream;
pub use error::StoreError;
pub use kmer::{Kmer, KmerIterator};
pub use lookup::ExactLookup;
pub use reader::Reader;
pub use stats::CountStats;
pub use word_array::WordArray;
pub use writer::{BlockWriter, StreamWriter, Writer, WriterConfig};

/// Version information
pub fn version() -> (u8, u8, u8) {
    constants::VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let (major, minor, patch) = version();
        assert_eq!(major, 0);
        assert_eq!(minor, 1);
        assert_eq!(patch, 0);
    }
}
