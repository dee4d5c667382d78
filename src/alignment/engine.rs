use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::alignment::cigar::parse_cigar;
use crate::alignment::filter::{FilterSettings, FilterStats};
use crate::alignment::mutation::extract_mutations;
use crate::alignment::sampler::RegionSampler;
use crate::alignment::source::{FetchReport, RecordSource, SourceError};
use crate::alignment::types::{RawAlignmentRecord, Read};
use crate::framework::{
    ChunkConfig, ChunkContext, ChunkProcessor, ChunkedEvaluator, FrameworkError,
};
use crate::QueryConfig;

/// Errors that abort a region query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Caller supplied an unusable interval.
    #[error("invalid range {start}..{end}")]
    InvalidRange {
        /// Requested start.
        start: i64,
        /// Requested end.
        end: i64,
    },

    /// Streaming was requested with a zero chunk size.
    #[error("chunk size must be > 0")]
    InvalidChunkSize,

    /// The single requested reference could not be fetched.
    #[error("failed to fetch records for '{reference}': {source}")]
    SourceFetch {
        /// Reference that was queried.
        reference: String,
        /// Underlying failure.
        #[source]
        source: SourceError,
    },

    /// Every reference of a fan-out query failed.
    #[error("all {attempted} reference fetches failed")]
    AllFetchesFailed {
        /// Number of references attempted.
        attempted: usize,
        /// Per-reference outcomes.
        report: FetchReport,
    },

    /// Error propagated from the chunked evaluation framework.
    #[error("framework error: {0}")]
    Framework(#[from] FrameworkError),
}

/// Record of a down-sampling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingSummary {
    /// Reads assembled before sampling.
    pub original: usize,
    /// Reads kept.
    pub retained: usize,
}

/// Reads for a region plus diagnostics.
#[derive(Debug)]
pub struct QueryOutcome {
    /// Normalized reads, possibly sampled.
    pub reads: Vec<Read>,
    /// Filter and parse counters.
    pub stats: FilterStats,
    /// Per-reference fetch outcomes.
    pub fetch_report: FetchReport,
    /// Present when the result was down-sampled.
    pub sampling: Option<SamplingSummary>,
}

impl QueryOutcome {
    /// Whether the reads are a sample of a larger result.
    pub fn is_sampled(&self) -> bool {
        self.sampling.is_some()
    }
}

/// Finite, non-restartable sequence of read chunks over a materialized result.
#[derive(Debug)]
pub struct ReadChunks {
    reads: std::vec::IntoIter<Read>,
    chunk_size: usize,
}

impl Iterator for ReadChunks {
    type Item = Vec<Read>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk: Vec<Read> = self.reads.by_ref().take(self.chunk_size).collect();
        (!chunk.is_empty()).then_some(chunk)
    }
}

/// Raw records of one query with the settings that govern them.
#[derive(Debug)]
pub struct RecordBatch {
    /// Records in fetch order.
    pub records: Vec<RawAlignmentRecord>,
    /// Inclusion rules.
    pub settings: FilterSettings,
}

/// Reads assembled from a run of records.
#[derive(Debug, Default)]
pub struct AssembledReads {
    /// Reads in record order.
    pub reads: Vec<Read>,
    /// Counters for the run.
    pub stats: FilterStats,
}

/// Filter one record and turn it into a read; `None` when dropped.
pub fn assemble_read(
    raw: &RawAlignmentRecord,
    settings: &FilterSettings,
    stats: &mut FilterStats,
) -> Option<Read> {
    if !stats.observe(raw, settings) {
        return None;
    }

    let cigar = match parse_cigar(&raw.cigar) {
        Ok(cigar) => cigar,
        Err(err) => {
            debug!(read = %raw.name, %err, "dropping record");
            stats.malformed_cigar += 1;
            return None;
        }
    };

    let extracted = extract_mutations(&cigar, &raw.sequence, raw.start, raw.md());
    if let Some(err) = &extracted.md_error {
        debug!(read = %raw.name, %err, "partial mismatch reconstruction");
        stats.malformed_md += 1;
    }

    let mut read = Read::from_raw(raw, Vec::new());
    let mut mutations = extracted.mutations;
    let before = mutations.len();
    mutations.retain(|mutation| read.covers(mutation.position));
    stats.out_of_bounds_mutations += before - mutations.len();
    read.mutations = mutations;

    stats.accepted += 1;
    Some(read)
}

/// Chunk processor that filters records and assembles reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadAssembler;

impl ChunkProcessor for ReadAssembler {
    type Input = RecordBatch;
    type ChunkSummary = AssembledReads;
    type Output = AssembledReads;

    fn process_chunk(
        &mut self,
        input: &Self::Input,
        context: &ChunkContext,
    ) -> Result<Self::ChunkSummary, FrameworkError> {
        let mut summary = AssembledReads::default();
        for raw in &input.records[context.range.clone()] {
            if let Some(read) = assemble_read(raw, &input.settings, &mut summary.stats) {
                summary.reads.push(read);
            }
        }
        Ok(summary)
    }

    fn merge(
        &mut self,
        mut accumulated: Self::ChunkSummary,
        next: Self::ChunkSummary,
    ) -> Result<Self::ChunkSummary, FrameworkError> {
        accumulated.reads.extend(next.reads);
        accumulated.stats += next.stats;
        Ok(accumulated)
    }

    fn finalize(
        &mut self,
        root: Self::ChunkSummary,
        _input: &Self::Input,
    ) -> Result<Self::Output, FrameworkError> {
        Ok(root)
    }
}

/// Assemble reads from a record batch, `chunk_size` records at a time.
///
/// `None` processes the batch in one pass; the result is identical either way.
pub fn assemble_reads(
    batch: &RecordBatch,
    chunk_size: Option<usize>,
    yield_threshold: Option<usize>,
) -> Result<AssembledReads, FrameworkError> {
    let total = batch.records.len();
    let mut config = match chunk_size {
        Some(size) => ChunkConfig::with_chunk_size(total, size)?,
        None => ChunkConfig::single_chunk(total),
    };
    if let Some(threshold) = yield_threshold {
        config = config.with_yield_threshold(threshold);
    }

    let mut evaluator = ChunkedEvaluator::new(ReadAssembler, config);
    let evaluation = evaluator.evaluate(batch)?;
    debug!(
        records = total,
        chunks = evaluation.chunks_processed,
        yields = evaluation.yields,
        "assembled reads"
    );
    Ok(evaluation.output)
}

/// Region query orchestrator over a record source.
#[derive(Debug)]
pub struct RegionQueryEngine<S> {
    source: S,
    config: QueryConfig,
}

impl<S: RecordSource> RegionQueryEngine<S> {
    /// Engine with default configuration.
    pub fn new(source: S) -> Self {
        Self::with_config(source, QueryConfig::default())
    }

    /// Engine with explicit configuration.
    pub fn with_config(source: S, config: QueryConfig) -> Self {
        Self { source, config }
    }

    /// Access configuration.
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Access the record source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch, filter and normalize the reads overlapping `[start, end)`.
    ///
    /// Coordinates are 0-based; returned reads are 1-based.
    pub fn get_records_for_range(
        &self,
        chromosome: &str,
        start: i64,
        end: i64,
        settings: &FilterSettings,
    ) -> Result<QueryOutcome, QueryError> {
        let (start_pos, end_pos) = validate_range(start, end)?;

        let (records, fetch_report) = self.fetch(chromosome, start_pos, end_pos, settings)?;
        let batch = RecordBatch {
            records,
            settings: settings.clone(),
        };
        let assembled = assemble_reads(
            &batch,
            Some(self.config.chunk_size),
            Some(self.config.yield_threshold),
        )?;
        drop(batch);

        let mut reads = assembled.reads;
        let mut sampling = None;
        if reads.len() > self.config.oversize_threshold {
            let original = reads.len();
            let mut rng = self.config.rng();
            reads = RegionSampler::new(self.config.strata).sample(
                reads,
                self.config.target_size,
                &mut rng,
            );
            info!(
                chromosome,
                original,
                retained = reads.len(),
                "down-sampled dense region"
            );
            sampling = Some(SamplingSummary {
                original,
                retained: reads.len(),
            });
        }

        Ok(QueryOutcome {
            reads,
            stats: assembled.stats,
            fetch_report,
            sampling,
        })
    }

    /// Run [`get_records_for_range`](Self::get_records_for_range) and hand the
    /// reads back in chunks of `chunk_size`.
    pub fn stream_reads_for_region(
        &self,
        chromosome: &str,
        start: i64,
        end: i64,
        settings: &FilterSettings,
        chunk_size: usize,
    ) -> Result<ReadChunks, QueryError> {
        if chunk_size == 0 {
            return Err(QueryError::InvalidChunkSize);
        }
        let outcome = self.get_records_for_range(chromosome, start, end, settings)?;
        Ok(ReadChunks {
            reads: outcome.reads.into_iter(),
            chunk_size,
        })
    }

    fn fetch(
        &self,
        chromosome: &str,
        start: u64,
        end: u64,
        settings: &FilterSettings,
    ) -> Result<(Vec<RawAlignmentRecord>, FetchReport), QueryError> {
        let references = self.source.reference_names();
        let mut report = FetchReport::default();

        if settings.ignore_chromosome {
            let mut records = Vec::new();
            for reference in &references {
                match self.source.fetch_raw_records(reference, start, end) {
                    Ok(batch) => {
                        report.record_success(reference.as_str(), batch.len());
                        records.extend(batch);
                    }
                    Err(err) => {
                        warn!(reference = %reference, %err, "skipping reference");
                        report.record_failure(reference.as_str(), err);
                    }
                }
            }
            if report.all_failed() {
                return Err(QueryError::AllFetchesFailed {
                    attempted: report.attempted(),
                    report,
                });
            }
            return Ok((records, report));
        }

        if chromosome.is_empty() || !references.iter().any(|name| name == chromosome) {
            warn!(chromosome, "chromosome not among source references");
        }

        match self.source.fetch_raw_records(chromosome, start, end) {
            Ok(records) => {
                report.record_success(chromosome, records.len());
                Ok((records, report))
            }
            Err(source) => Err(QueryError::SourceFetch {
                reference: chromosome.to_string(),
                source,
            }),
        }
    }
}

fn validate_range(start: i64, end: i64) -> Result<(u64, u64), QueryError> {
    if start < 0 || end <= start {
        return Err(QueryError::InvalidRange { start, end });
    }
    Ok((start as u64, end as u64))
}

impl QueryConfig {
    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::source::MemorySource;
    use crate::alignment::types::{flags, Mutation};

    fn engine(records: Vec<RawAlignmentRecord>) -> RegionQueryEngine<MemorySource> {
        RegionQueryEngine::new(records.into_iter().collect())
    }

    fn record(name: &str, start: u64) -> RawAlignmentRecord {
        RawAlignmentRecord::aligned(name, "chr1", start, "4M", "ACGT").unwrap()
    }

    #[test]
    fn rejects_negative_start_and_empty_ranges() {
        let engine = engine(vec![record("a", 0)]);
        let settings = FilterSettings::default();
        assert!(matches!(
            engine.get_records_for_range("chr1", 100, 50, &settings),
            Err(QueryError::InvalidRange { start: 100, end: 50 })
        ));
        assert!(matches!(
            engine.get_records_for_range("chr1", -1, 50, &settings),
            Err(QueryError::InvalidRange { .. })
        ));
        assert!(matches!(
            engine.get_records_for_range("chr1", 10, 10, &settings),
            Err(QueryError::InvalidRange { .. })
        ));
    }

    #[test]
    fn assembles_reads_with_mutations() {
        let raw = RawAlignmentRecord::aligned("a", "chr1", 9, "2M1I2M", "ACTGT")
            .unwrap()
            .with_md("3A0");
        let outcome = engine(vec![raw])
            .get_records_for_range("chr1", 0, 100, &FilterSettings::default())
            .unwrap();

        assert_eq!(outcome.reads.len(), 1);
        let read = &outcome.reads[0];
        assert_eq!((read.start, read.end), (10, 14));
        assert_eq!(
            read.mutations,
            vec![Mutation::insertion(12, 1, "T"), Mutation::mismatch(13, 'T', 'A')]
        );
        assert_eq!(outcome.stats.accepted, 1);
        assert!(!outcome.is_sampled());
    }

    #[test]
    fn malformed_cigar_drops_only_that_record() {
        let mut broken = record("broken", 5);
        broken.cigar = "4Q".to_string();
        let outcome = engine(vec![record("a", 0), broken, record("b", 8)])
            .get_records_for_range("chr1", 0, 20, &FilterSettings::default())
            .unwrap();
        let ids: Vec<&str> = outcome.reads.iter().map(|read| read.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(outcome.stats.malformed_cigar, 1);
    }

    #[test]
    fn malformed_md_keeps_read_and_decoded_mismatches() {
        let raw = RawAlignmentRecord::aligned("m", "chr1", 0, "10M", "ACGTACGTAC")
            .unwrap()
            .with_md("1G2#4");
        let outcome = engine(vec![raw])
            .get_records_for_range("chr1", 0, 20, &FilterSettings::default())
            .unwrap();

        assert_eq!(outcome.reads.len(), 1);
        assert_eq!(outcome.reads[0].mutations, vec![Mutation::mismatch(2, 'C', 'G')]);
        assert_eq!(outcome.stats.malformed_md, 1);
        assert_eq!(outcome.stats.accepted, 1);
    }

    #[test]
    fn filter_stats_are_returned() {
        let outcome = engine(vec![record("a", 0), record("u", 1).with_flags(flags::UNMAPPED)])
            .get_records_for_range("chr1", 0, 20, &FilterSettings::default())
            .unwrap();
        assert_eq!(outcome.reads.len(), 1);
        assert_eq!(outcome.stats.unmapped, 1);
        assert_eq!(outcome.stats.rejected, 1);
    }

    #[test]
    fn unknown_chromosome_is_tolerated() {
        let outcome = engine(vec![record("a", 0)])
            .get_records_for_range("1", 0, 20, &FilterSettings::default())
            .unwrap();
        assert!(outcome.reads.is_empty());
        assert_eq!(outcome.fetch_report.attempted(), 1);
        assert!(!outcome.fetch_report.all_failed());
    }

    #[test]
    fn streaming_chunks_cover_the_result() {
        let records = (0..7).map(|i| record(&format!("r{i}"), i)).collect();
        let engine = engine(records);
        let chunks: Vec<Vec<Read>> = engine
            .stream_reads_for_region("chr1", 0, 100, &FilterSettings::default(), 3)
            .unwrap()
            .collect();
        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3, 1]);
        assert!(matches!(
            engine.stream_reads_for_region("chr1", 0, 100, &FilterSettings::default(), 0),
            Err(QueryError::InvalidChunkSize)
        ));
    }
}
