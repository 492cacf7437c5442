use anyhow::Context;
use clap::{Parser, Subcommand};
use meryl_lib::block::inspect_data_file;
use meryl_lib::index::data_file_path;
use meryl_lib::kmer::{Kmer, KmerIterator};
use meryl_lib::lookup::ExactLookup;
use meryl_lib::reader::Reader;
use meryl_lib::writer::{Writer, WriterConfig};
use needletail::parse_fastx_file;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "meryl")]
#[command(version = "0.1.0")]
#[command(about = "Block-structured k-mer count database", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count canonical k-mers from a FASTA/FASTQ file into a database
    Count {
        /// Input FASTA/FASTQ file (may be gzipped)
        #[arg(short, long)]
        input: PathBuf,

        /// K-mer length (2..=32)
        #[arg(short, long)]
        k: u32,

        /// Output database directory
        #[arg(short, long)]
        output: PathBuf,

        /// Routing prefix width in bits (0 = pick from k)
        #[arg(long, default_value = "0")]
        prefix_bits: u32,
    },

    /// Print every stored k-mer and its count
    Dump {
        /// Database directory
        #[arg(short, long)]
        db: PathBuf,
    },

    /// Print the count histogram as value<TAB>occurrences
    Histogram {
        /// Database directory
        #[arg(short, long)]
        db: PathBuf,
    },

    /// Print summary statistics
    Statistics {
        /// Database directory
        #[arg(short, long)]
        db: PathBuf,
    },

    /// Query counts for k-mers listed one per line
    Lookup {
        /// Database directory
        #[arg(short, long)]
        db: PathBuf,

        /// Query file, one k-mer per line
        #[arg(short, long)]
        queries: PathBuf,

        /// Smallest admitted count
        #[arg(long, default_value = "0")]
        min: u64,

        /// Largest admitted count
        #[arg(long, default_value_t = u64::MAX)]
        max: u64,
    },

    /// Log the block headers of one data file
    Inspect {
        /// Database directory
        #[arg(short, long)]
        db: PathBuf,

        /// Data file ordinal
        #[arg(short, long)]
        file: u32,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing: use RUST_LOG if set, otherwise default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Count {
            input,
            k,
            output,
            prefix_bits,
        } => count_command(input, k, output, prefix_bits)?,
        Commands::Dump { db } => dump_command(db)?,
        Commands::Histogram { db } => histogram_command(db)?,
        Commands::Statistics { db } => statistics_command(db)?,
        Commands::Lookup {
            db,
            queries,
            min,
            max,
        } => lookup_command(db, queries, min, max)?,
        Commands::Inspect { db, file } => inspect_command(db, file)?,
    }

    Ok(())
}

/// Count canonical k-mers from a sequence file into a new database.
fn count_command(input: PathBuf, k: u32, output: PathBuf, prefix_bits: u32) -> anyhow::Result<()> {
    let config = WriterConfig {
        k,
        prefix_size: prefix_bits,
        is_multi_set: false,
    };
    config.validate().map_err(|e| anyhow::anyhow!("{e}"))?;
    config.print();

    info!("Counting {k}-mers from {}...", input.display());

    let mut counts: HashMap<u64, u64> = HashMap::new();
    let mut num_sequences = 0u64;
    let mut num_bases = 0u64;

    let mut fastx = parse_fastx_file(&input)
        .with_context(|| format!("Failed to open sequence file: {}", input.display()))?;
    while let Some(record) = fastx.next() {
        let record = record
            .with_context(|| format!("Failed to parse sequence record in {}", input.display()))?;
        let seq = record.seq();
        num_sequences += 1;
        num_bases += seq.len() as u64;

        let mut it = KmerIterator::new(&seq, k);
        while it.next() {
            *counts.entry(it.canonical().word()).or_insert(0) += 1;
        }
    }
    info!(
        "Read {num_sequences} sequences, {num_bases} bases, {} distinct kmers",
        counts.len()
    );

    let writer = Writer::create(&output, config)
        .with_context(|| format!("Failed to create database {}", output.display()))?;
    let mut block_writer = writer.block_writer();
    for (word, value) in counts {
        block_writer.add(Kmer::from_word(word, k), value);
    }
    block_writer.finish()?;
    writer.finalize()?;

    info!("Wrote database {}", output.display());
    Ok(())
}

/// Stream the database to stdout as kmer<TAB>count lines.
fn dump_command(db: PathBuf) -> anyhow::Result<()> {
    let mut reader = Reader::open(&db)
        .with_context(|| format!("Failed to open database {}", db.display()))?;

    let stdout = std::io::stdout().lock();
    let mut out = BufWriter::new(stdout);
    while reader.next()? {
        writeln!(out, "{}\t{}", reader.fmer(), reader.value())?;
    }
    out.flush()?;
    Ok(())
}

/// Print the stored histogram.
fn histogram_command(db: PathBuf) -> anyhow::Result<()> {
    let mut reader = Reader::open(&db)
        .with_context(|| format!("Failed to open database {}", db.display()))?;

    let stdout = std::io::stdout().lock();
    let mut out = BufWriter::new(stdout);
    for (value, occurrences) in reader.stats()?.histogram() {
        writeln!(out, "{value}\t{occurrences}")?;
    }
    out.flush()?;
    Ok(())
}

/// Print summary statistics.
fn statistics_command(db: PathBuf) -> anyhow::Result<()> {
    let mut reader = Reader::open(&db)
        .with_context(|| format!("Failed to open database {}", db.display()))?;
    let stats = reader.stats()?;

    println!("unique   {}", stats.num_unique());
    println!("distinct {}", stats.num_distinct());
    println!("total    {}", stats.num_total());
    Ok(())
}

/// Query the database for k-mers listed one per line.
fn lookup_command(db: PathBuf, queries: PathBuf, min: u64, max: u64) -> anyhow::Result<()> {
    let mut reader = Reader::open(&db)
        .with_context(|| format!("Failed to open database {}", db.display()))?;
    let k = reader.k();

    info!("Building exact lookup for {}...", db.display());
    let lookup = ExactLookup::build(&mut reader, min, max)?;
    info!(
        "Loaded {} kmers ({} below range, {} above)",
        lookup.n_kmers(),
        lookup.n_too_low(),
        lookup.n_too_high()
    );

    let input = BufReader::new(
        std::fs::File::open(&queries)
            .with_context(|| format!("Failed to open query file: {}", queries.display()))?,
    );
    let stdout = std::io::stdout().lock();
    let mut out = BufWriter::new(stdout);

    for line in input.lines() {
        let line = line?;
        let bases = line.trim();
        if bases.is_empty() {
            continue;
        }
        match Kmer::from_ascii(bases.as_bytes()) {
            Ok(kmer) if kmer.k() == k => {
                writeln!(out, "{bases}\t{}", lookup.value(&kmer.canonical()))?;
            }
            _ => {
                warn!("Skipping query {bases:?}: not a valid {k}-mer");
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// Log the block headers of one data file.
fn inspect_command(db: PathBuf, file: u32) -> anyhow::Result<()> {
    let path = data_file_path(&db, file);
    let n_blocks = inspect_data_file(&path, file)
        .with_context(|| format!("Failed to inspect {}", path.display()))?;
    info!("{} blocks in {}", n_blocks, path.display());
    Ok(())
}
