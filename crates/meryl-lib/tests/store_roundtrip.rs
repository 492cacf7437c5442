//! End-to-end tests: writer -> data files -> reader -> lookup.

use meryl_lib::index::MasterIndex;
use meryl_lib::kmer::Kmer;
use meryl_lib::lookup::ExactLookup;
use meryl_lib::reader::Reader;
use meryl_lib::writer::{Writer, WriterConfig};
use std::path::Path;

fn build_db(dir: &Path, k: u32, pairs: &[(&str, u64)], is_multi_set: bool) {
    let config = WriterConfig {
        k,
        prefix_size: 0,
        is_multi_set,
    };
    let writer = Writer::create(dir, config).unwrap();
    let mut block_writer = writer.block_writer();
    for &(bases, value) in pairs {
        block_writer.add(Kmer::from_ascii(bases.as_bytes()).unwrap(), value);
    }
    block_writer.finish().unwrap();
    writer.finalize().unwrap();
}

fn collect(reader: &mut Reader) -> Vec<(String, u64)> {
    let mut found = Vec::new();
    while reader.next().unwrap() {
        found.push((reader.fmer().to_string(), reader.value()));
    }
    found
}

#[test]
fn test_single_set_sums_duplicates() {
    // {AAAAA:3, AAAAC:1, AAAAC:2} reads back as AAAAA:3, AAAAC:3.
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("dups.meryl");
    build_db(&db, 5, &[("AAAAA", 3), ("AAAAC", 1), ("AAAAC", 2)], false);

    let mut reader = Reader::open(&db).unwrap();
    assert!(!reader.is_multi_set());
    assert_eq!(
        collect(&mut reader),
        vec![("AAAAA".to_string(), 3), ("AAAAC".to_string(), 3)]
    );
}

#[test]
fn test_multi_set_preserves_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("multi.meryl");
    build_db(&db, 5, &[("AAAAA", 3), ("AAAAC", 1), ("AAAAC", 2)], true);

    let mut reader = Reader::open(&db).unwrap();
    assert!(reader.is_multi_set());
    assert_eq!(
        collect(&mut reader),
        vec![
            ("AAAAA".to_string(), 3),
            ("AAAAC".to_string(), 1),
            ("AAAAC".to_string(), 2),
        ]
    );
}

#[test]
fn test_unsorted_input_reads_back_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("sorted.meryl");

    // A spread of 9-mers in scrambled insertion order.
    let mut pairs: Vec<(u64, u64)> = (0..2000u64)
        .map(|i| (i.wrapping_mul(0x9E3779B97F4A7C15) >> 46, i % 7 + 1))
        .collect();
    pairs.sort_by_key(|&(word, _)| word.rotate_left(13));
    pairs.dedup_by_key(|pair| pair.0);

    let writer = Writer::create(&db, WriterConfig::new(9)).unwrap();
    let mut block_writer = writer.block_writer();
    for &(word, value) in &pairs {
        block_writer.add(Kmer::from_word(word, 9), value);
    }
    block_writer.finish().unwrap();
    writer.finalize().unwrap();

    let mut expected: Vec<(u64, u64)> = pairs;
    expected.sort_by_key(|&(word, _)| word);

    let mut reader = Reader::open(&db).unwrap();
    let mut found = Vec::new();
    while reader.next().unwrap() {
        found.push((reader.fmer().word(), reader.value()));
    }
    assert_eq!(found, expected);
}

#[test]
fn test_stream_writer_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("stream.meryl");

    let config = WriterConfig {
        k: 6,
        prefix_size: 5,
        is_multi_set: false,
    };
    let writer = Writer::create(&db, config).unwrap();

    // Every 11th 6-mer, already ascending, fanned out to the file each
    // prefix routes to.
    let pairs: Vec<(u64, u64)> = (0..(1u64 << 12)).step_by(11).map(|w| (w, w % 5 + 1)).collect();

    for file_index in 0..writer.num_files() {
        let mut stream_writer = writer.stream_writer(file_index).unwrap();
        for &(word, value) in &pairs {
            let kmer = Kmer::from_word(word, 6);
            let prefix = word >> writer.suffix_size();
            if writer.file_for_prefix(prefix) == file_index {
                stream_writer.add(kmer, value).unwrap();
            }
        }
        stream_writer.finish().unwrap();
    }
    writer.finalize().unwrap();

    let mut reader = Reader::open(&db).unwrap();
    let mut found = Vec::new();
    while reader.next().unwrap() {
        found.push((reader.fmer().word(), reader.value()));
    }
    assert_eq!(found, pairs);
}

#[test]
fn test_pinned_readers_cover_disjoint_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("pinned.meryl");

    let pairs: Vec<(&str, u64)> = vec![
        ("AAAAACC", 1),
        ("ACGTACG", 2),
        ("CCCCCCC", 3),
        ("GGGGGGG", 4),
        ("TATATAT", 5),
        ("TTTTTTT", 6),
    ];
    build_db(&db, 7, &pairs, false);

    let probe = Reader::open(&db).unwrap();
    let mut union = Vec::new();
    for file_index in 0..probe.num_files() {
        let mut reader = Reader::open_for_file(&db, file_index).unwrap();
        while reader.next().unwrap() {
            let prefix = reader.fmer().word() >> reader.suffix_size();
            assert_eq!((prefix >> reader.num_blocks_bits()) as u32, file_index);
            union.push((reader.fmer().to_string(), reader.value()));
        }
    }
    union.sort();

    let mut reader = Reader::open(&db).unwrap();
    let mut expected = collect(&mut reader);
    expected.sort();
    assert_eq!(union, expected);
}

#[test]
fn test_stats_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("stats.meryl");
    build_db(
        &db,
        5,
        &[("AAAAA", 1), ("AAAAC", 1), ("AAAAG", 2), ("AAATT", 9)],
        false,
    );

    let mut reader = Reader::open(&db).unwrap();
    let stats = reader.stats().unwrap();
    assert_eq!(stats.num_unique(), 2);
    assert_eq!(stats.num_distinct(), 4);
    assert_eq!(stats.num_total(), 13);

    let histogram = stats.histogram();
    let total: u64 = histogram.iter().map(|&(v, o)| v * o).sum();
    let distinct: u64 = histogram.iter().map(|&(_, o)| o).sum();
    assert_eq!(total, 13);
    assert_eq!(distinct, 4);

    // Statistics survive a drop and reload.
    reader.drop_statistics();
    assert_eq!(reader.stats().unwrap().num_total(), 13);
}

#[test]
fn test_exact_lookup_agreement() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("lookup.meryl");

    let pairs: Vec<(u64, u64)> = (0..3000u64)
        .map(|i| (i.wrapping_mul(0x2545F4914F6CDD1D) >> 44, i % 100 + 1))
        .collect();
    let mut pairs = pairs;
    pairs.sort_unstable();
    pairs.dedup_by_key(|pair| pair.0);

    let writer = Writer::create(&db, WriterConfig::new(10)).unwrap();
    let mut block_writer = writer.block_writer();
    for &(word, value) in &pairs {
        block_writer.add(Kmer::from_word(word, 10), value);
    }
    block_writer.finish().unwrap();
    writer.finalize().unwrap();

    let mut reader = Reader::open(&db).unwrap();
    let lookup = ExactLookup::build(&mut reader, 0, u64::MAX).unwrap();
    assert_eq!(lookup.n_kmers(), pairs.len() as u64);

    // Every stored k-mer answers with its count.
    for &(word, value) in &pairs {
        assert_eq!(lookup.value(&Kmer::from_word(word, 10)), value);
        assert!(lookup.exists(&Kmer::from_word(word, 10)));
    }

    // Absent k-mers answer 0.
    let stored: std::collections::HashSet<u64> = pairs.iter().map(|&(w, _)| w).collect();
    for word in 0..(1u64 << 20) / 97 {
        let word = word * 97;
        if !stored.contains(&word) {
            assert_eq!(lookup.value(&Kmer::from_word(word, 10)), 0);
        }
    }
}

#[test]
fn test_exact_lookup_range_filter() {
    // Counts {X:1, Y:5, Z:11} with range [2, 10]: only Y is admitted.
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("range.meryl");
    build_db(&db, 5, &[("AACGT", 1), ("CACGT", 5), ("GACGT", 11)], false);

    let mut reader = Reader::open(&db).unwrap();
    let lookup = ExactLookup::build(&mut reader, 2, 10).unwrap();

    assert_eq!(lookup.value(&Kmer::from_ascii(b"AACGT").unwrap()), 0);
    assert_eq!(lookup.value(&Kmer::from_ascii(b"CACGT").unwrap()), 5);
    assert_eq!(lookup.value(&Kmer::from_ascii(b"GACGT").unwrap()), 0);
    assert_eq!(lookup.n_too_low(), 1);
    assert_eq!(lookup.n_too_high(), 1);
    assert_eq!(lookup.n_kmers(), 1);
}

#[test]
fn test_exact_lookup_presence_only() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("presence.meryl");
    build_db(&db, 5, &[("AACGT", 2), ("CACGT", 7)], false);

    let mut reader = Reader::open(&db).unwrap();
    // min == max requests a presence-only table: stored k-mers in range
    // answer 1, everything else 0.
    let lookup = ExactLookup::build(&mut reader, 2, 2).unwrap();
    assert_eq!(lookup.value(&Kmer::from_ascii(b"AACGT").unwrap()), 1);
    assert_eq!(lookup.value(&Kmer::from_ascii(b"CACGT").unwrap()), 0);
    assert_eq!(lookup.value(&Kmer::from_ascii(b"TACGT").unwrap()), 0);
}

#[test]
fn test_master_index_version_compatibility() {
    // A database whose master index was written by v02-era code reads
    // back identically with current code.
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("compat.meryl");
    build_db(&db, 5, &[("AAAAA", 3), ("AAAAC", 1), ("ACGTA", 2)], false);

    let mut reader = Reader::open(&db).unwrap();
    let expected = collect(&mut reader);
    let expected_total = reader.stats().unwrap().num_total();

    // Rewrite only the master index in the older framing.
    let index = MasterIndex::read(db.as_path()).unwrap();
    index.write_with_version(db.as_path(), 2).unwrap();

    let mut reader = Reader::open(&db).unwrap();
    assert_eq!(collect(&mut reader), expected);
    assert_eq!(reader.stats().unwrap().num_total(), expected_total);
}
