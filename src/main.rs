use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use readscope::alignment::{
    write_reads_tsv, FilterSettings, IndexedBamSource, RecordSource, RegionQueryEngine,
};
use readscope::QueryConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "readscope", about = "Query aligned reads and their mutations for a genomic region")]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print reads overlapping a region as TSV.
    Query {
        /// Indexed BAM/CRAM file.
        alignments: PathBuf,
        /// Reference name to query.
        chrom: String,
        /// 0-based start (inclusive).
        start: i64,
        /// 0-based end (exclusive).
        end: i64,
        /// Minimum mapping quality.
        #[arg(long, default_value_t = 0)]
        min_mapq: u8,
        /// Include unmapped records.
        #[arg(long)]
        show_unmapped: bool,
        /// Exclude secondary alignments.
        #[arg(long)]
        hide_secondary: bool,
        /// Exclude supplementary alignments.
        #[arg(long)]
        hide_supplementary: bool,
        /// Query every reference instead of `chrom`.
        #[arg(long)]
        all_references: bool,
        /// Seed for down-sampling dense regions.
        #[arg(long)]
        seed: Option<u64>,
        /// Records processed per chunk.
        #[arg(long, default_value_t = 5_000)]
        chunk_size: usize,
    },
    /// List the reference names of an alignment file.
    References {
        /// Indexed BAM/CRAM file.
        alignments: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Query {
            alignments,
            chrom,
            start,
            end,
            min_mapq,
            show_unmapped,
            hide_secondary,
            hide_supplementary,
            all_references,
            seed,
            chunk_size,
        } => {
            let settings = FilterSettings::default()
                .with_min_mapping_quality(min_mapq)
                .with_unmapped(show_unmapped)
                .with_secondary(!hide_secondary)
                .with_supplementary(!hide_supplementary)
                .with_ignore_chromosome(all_references);
            let mut config = QueryConfig::default().with_chunk_size(chunk_size);
            if let Some(seed) = seed {
                config = config.with_seed(seed);
            }
            run_query(alignments, &chrom, start, end, &settings, config)?
        }
        Commands::References { alignments } => run_references(alignments)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_source(path: &PathBuf) -> Result<IndexedBamSource> {
    IndexedBamSource::open(path)
        .with_context(|| format!("failed to open indexed alignments {}", path.display()))
}

fn run_query(
    alignments: PathBuf,
    chrom: &str,
    start: i64,
    end: i64,
    settings: &FilterSettings,
    config: QueryConfig,
) -> Result<()> {
    let engine = RegionQueryEngine::with_config(open_source(&alignments)?, config);
    let outcome = engine
        .get_records_for_range(chrom, start, end, settings)
        .with_context(|| format!("region query {chrom}:{start}-{end} failed"))?;

    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    write_reads_tsv(&mut writer, &outcome.reads).context("failed to write reads")?;

    info!(stats = %outcome.stats, "query finished");
    if let Some(sampling) = outcome.sampling {
        info!(
            original = sampling.original,
            retained = sampling.retained,
            "result was down-sampled"
        );
    }
    for (reference, err) in outcome.fetch_report.failures() {
        info!(reference, %err, "reference skipped");
    }

    Ok(())
}

fn run_references(alignments: PathBuf) -> Result<()> {
    let source = open_source(&alignments)?;
    for name in source.reference_names() {
        println!("{name}");
    }
    Ok(())
}
