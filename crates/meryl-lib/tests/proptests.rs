use meryl_lib::bitstream::BitStream;
use meryl_lib::block::{encode_block, Block};
use meryl_lib::kmer::{Kmer, KmerIterator};
use proptest::prelude::*;
use std::path::PathBuf;

/// Count k-mers a naive way: longest stretches of valid bases of length
/// L each contribute L - k + 1 windows.
fn naive_emission_count(seq: &[u8], k: usize) -> usize {
    seq.split(|&b| !matches!(b, b'A' | b'C' | b'G' | b'T' | b'a' | b'c' | b'g' | b't'))
        .map(|stretch| stretch.len().saturating_sub(k - 1))
        .sum()
}

proptest! {
    #[test]
    fn prop_reverse_complement_involution(
        k in 2u32..=32,
        word in any::<u64>(),
    ) {
        let mask = if k == 32 { u64::MAX } else { (1u64 << (2 * k)) - 1 };
        let kmer = Kmer::from_word(word & mask, k);
        prop_assert_eq!(kmer.reverse_complement().reverse_complement(), kmer);
    }

    #[test]
    fn prop_canonical_trichotomy(
        k in 2u32..=32,
        word in any::<u64>(),
    ) {
        let mask = if k == 32 { u64::MAX } else { (1u64 << (2 * k)) - 1 };
        let kmer = Kmer::from_word(word & mask, k);
        let rc = kmer.reverse_complement();

        // Exactly one of <, ==, > holds, and canonicality flips between
        // a k-mer and its reverse complement unless they are equal.
        if kmer.is_palindrome() {
            prop_assert_eq!(kmer, rc);
            prop_assert!(kmer.is_canonical() && rc.is_canonical());
        } else {
            prop_assert!(kmer.is_canonical() ^ rc.is_canonical());
        }
        prop_assert!(kmer.canonical() == rc.canonical());
    }

    #[test]
    fn prop_iterator_emission_count(
        k in 2usize..=12,
        seq in prop::collection::vec(prop::sample::select(b"ACGTNacgt".to_vec()), 0..300),
    ) {
        let mut it = KmerIterator::new(&seq, k as u32);
        let mut emitted = 0usize;
        while it.next() {
            emitted += 1;
        }
        prop_assert_eq!(emitted, naive_emission_count(&seq, k));
    }

    #[test]
    fn prop_iterator_tracks_reverse_complement(
        k in 2usize..=12,
        seq in prop::collection::vec(prop::sample::select(b"ACGT".to_vec()), 2..64),
    ) {
        let mut it = KmerIterator::new(&seq, k as u32);
        while it.next() {
            prop_assert_eq!(it.rmer(), it.fmer().reverse_complement());
        }
    }

    #[test]
    fn prop_bitstream_binary_roundtrip(
        fields in prop::collection::vec((1u32..=64, any::<u64>()), 1..100),
    ) {
        let mut bits = BitStream::new();
        for &(width, value) in &fields {
            bits.push_binary(width, value);
        }
        for &(width, value) in &fields {
            let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
            prop_assert_eq!(bits.get_binary(width), value & mask);
        }
    }

    #[test]
    fn prop_bitstream_unary_roundtrip(
        values in prop::collection::vec(0u64..500, 1..100),
    ) {
        let mut bits = BitStream::new();
        for &v in &values {
            bits.push_unary(v);
        }
        for &v in &values {
            prop_assert_eq!(bits.get_unary(), v);
        }
    }

    #[test]
    fn prop_block_roundtrip(
        suffix_bits in 4u32..=24,
        raw in prop::collection::vec((any::<u64>(), 1u64..1_000_000), 1..200),
    ) {
        let mask = (1u64 << suffix_bits) - 1;
        let mut pairs: Vec<(u64, u64)> = raw.iter().map(|&(s, v)| (s & mask, v)).collect();
        pairs.sort_unstable();
        pairs.dedup_by_key(|pair| pair.0);

        let suffixes: Vec<u64> = pairs.iter().map(|&(s, _)| s).collect();
        let values: Vec<u64> = pairs.iter().map(|&(_, v)| v).collect();

        let mut bits = BitStream::new();
        encode_block(&mut bits, 1, suffix_bits, &suffixes, &values);
        let mut file = Vec::new();
        bits.dump(&mut file).unwrap();

        let path = PathBuf::from("prop.dat");
        let mut block = Block::new();
        prop_assert!(block.load(&mut file.as_slice(), &path, 0).unwrap());
        block.decode(&path, 0).unwrap();
        prop_assert_eq!(block.suffixes(), &suffixes[..]);
        prop_assert_eq!(block.values(), &values[..]);
    }
}
