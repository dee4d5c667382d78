//! # Region queries over aligned reads
//!
//! This library turns a genomic interval into a bounded list of normalized
//! reads, ready for a genome browser to draw.
//!
//! ## Pipeline
//!
//! 1. **Fetch**: pull raw records overlapping the interval from a
//!    [`RecordSource`](alignment::RecordSource) (indexed BAM/CRAM via htslib)
//! 2. **Filter**: drop unmapped/secondary/supplementary/low-MAPQ records per
//!    caller settings
//! 3. **Reconstruct**: walk CIGAR and `MD` to recover insertions, deletions
//!    and mismatches
//! 4. **Bound**: past 200 000 reads, keep 100 000 via position-stratified
//!    sampling
//!
//! ## Usage Example
//!
//! ```ignore
//! use readscope::alignment::{FilterSettings, IndexedBamSource, RegionQueryEngine};
//!
//! let engine = RegionQueryEngine::new(IndexedBamSource::open("sample.bam")?);
//! let outcome = engine.get_records_for_range("chr1", 10_000, 20_000, &FilterSettings::default())?;
//! for read in &outcome.reads {
//!     println!("{} {}-{} {} mutations", read.id, read.start, read.end, read.mutations.len());
//! }
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod alignment; // Record model, CIGAR/MD decoding, filtering, sampling, engine
pub mod framework; // Chunked evaluation

// Re-exports for convenience
pub use alignment::{
    FilterSettings, FilterStats, Mutation, MutationKind, QueryError, QueryOutcome,
    RawAlignmentRecord, Read, RecordSource, RegionQueryEngine,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tuning parameters for the region query engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QueryConfig {
    /// Read count above which results are down-sampled.
    pub oversize_threshold: usize,

    /// Read count kept when down-sampling.
    pub target_size: usize,

    /// Raw records processed per chunk.
    pub chunk_size: usize,

    /// Number of positional strata used by the sampler.
    pub strata: usize,

    /// Batches larger than this yield the thread between chunks.
    pub yield_threshold: usize,

    /// Seed for the sampler; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            oversize_threshold: 200_000,
            target_size: 100_000,
            chunk_size: 5_000,
            strata: alignment::DEFAULT_STRATA,
            yield_threshold: 50_000,
            seed: None,
        }
    }
}

impl QueryConfig {
    /// Set the sampling trigger and target sizes.
    pub fn with_sampling(mut self, oversize_threshold: usize, target_size: usize) -> Self {
        self.oversize_threshold = oversize_threshold;
        self.target_size = target_size.min(oversize_threshold);
        self
    }

    /// Set the processing chunk size (at least one record).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the number of sampling strata (at least one).
    pub fn with_strata(mut self, strata: usize) -> Self {
        self.strata = strata.max(1);
        self
    }

    /// Set the cooperative-yield threshold.
    pub fn with_yield_threshold(mut self, yield_threshold: usize) -> Self {
        self.yield_threshold = yield_threshold;
        self
    }

    /// Seed the sampler for reproducible output.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds() {
        let config = QueryConfig::default();
        assert_eq!(config.oversize_threshold, 200_000);
        assert_eq!(config.target_size, 100_000);
        assert_eq!(config.chunk_size, 5_000);
        assert_eq!(config.strata, 100);
        assert!(config.seed.is_none());
    }

    #[test]
    fn builders_clamp_degenerate_values() {
        let config = QueryConfig::default()
            .with_chunk_size(0)
            .with_strata(0)
            .with_sampling(10, 50)
            .with_seed(4);
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.strata, 1);
        assert_eq!(config.target_size, 10);
        assert_eq!(config.seed, Some(4));
    }
}
