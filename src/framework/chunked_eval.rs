use std::ops::Range;

use thiserror::Error;
use tracing::debug;

/// Errors that can occur while using the chunked evaluator.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// Configuration invalid (e.g., zero chunk size).
    #[error("invalid evaluator configuration: {0}")]
    InvalidConfiguration(String),

    /// Requested chunk index is out of range for the configured number of chunks.
    #[error("chunk id {chunk_id} out of range (max {max_chunks})")]
    ChunkOutOfRange {
        /// Chunk identifier (1-indexed) that was requested.
        chunk_id: usize,
        /// Maximum valid chunk identifier.
        max_chunks: usize,
    },
}

/// Configuration parameters for chunked evaluation.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Number of logical units handed to the processor per chunk.
    pub chunk_size: usize,
    /// Number of chunks `⌈n / chunk_size⌉` (zero for empty input).
    pub num_chunks: usize,
    /// Total number of logical units (e.g., raw records).
    pub total_units: usize,
    /// Yield the thread between chunks once `total_units` exceeds this.
    pub yield_threshold: Option<usize>,
}

impl ChunkConfig {
    /// Construct configuration with explicit chunk size.
    pub fn with_chunk_size(total_units: usize, chunk_size: usize) -> Result<Self, FrameworkError> {
        if chunk_size == 0 {
            return Err(FrameworkError::InvalidConfiguration(
                "chunk size must be > 0".to_string(),
            ));
        }
        Ok(Self {
            chunk_size,
            num_chunks: total_units.div_ceil(chunk_size),
            total_units,
            yield_threshold: None,
        })
    }

    /// Configuration that hands the whole input to the processor at once.
    pub fn single_chunk(total_units: usize) -> Self {
        Self {
            chunk_size: total_units.max(1),
            num_chunks: usize::from(total_units > 0),
            total_units,
            yield_threshold: None,
        }
    }

    /// Enable cooperative yielding for inputs larger than `threshold`.
    pub fn with_yield_threshold(mut self, threshold: usize) -> Self {
        self.yield_threshold = Some(threshold);
        self
    }

    fn should_yield(&self) -> bool {
        self.yield_threshold
            .is_some_and(|threshold| self.total_units > threshold)
    }

    /// Compute chunk context (start/end indices) for a given chunk id (1-indexed).
    pub fn chunk_context(&self, chunk_id: usize) -> Result<ChunkContext, FrameworkError> {
        if chunk_id == 0 || chunk_id > self.num_chunks {
            return Err(FrameworkError::ChunkOutOfRange {
                chunk_id,
                max_chunks: self.num_chunks,
            });
        }
        let start = (chunk_id - 1) * self.chunk_size;
        let end = (start + self.chunk_size).min(self.total_units);
        Ok(ChunkContext {
            chunk_id,
            range: start..end,
        })
    }
}

/// Per-chunk metadata supplied to processors.
#[derive(Debug, Clone)]
pub struct ChunkContext {
    /// 1-indexed chunk identifier.
    pub chunk_id: usize,
    /// Range within the logical input covered by the chunk.
    pub range: Range<usize>,
}

impl ChunkContext {
    /// Number of logical units covered by this chunk.
    pub fn len(&self) -> usize {
        self.range.end.saturating_sub(self.range.start)
    }

    /// Whether the chunk is empty.
    pub fn is_empty(&self) -> bool {
        self.range.end <= self.range.start
    }
}

/// Trait implemented by domain-specific processors that operate on chunks.
///
/// Summaries are folded left to right starting from `ChunkSummary::default()`,
/// so `merge` only has to be associative for adjacent chunks.
pub trait ChunkProcessor {
    /// Type describing the full input workload.
    type Input;
    /// Summary emitted per chunk (must be mergeable).
    type ChunkSummary: Default;
    /// Final output type produced after evaluation.
    type Output;

    /// Process the units covered by a single chunk.
    fn process_chunk(
        &mut self,
        input: &Self::Input,
        context: &ChunkContext,
    ) -> Result<Self::ChunkSummary, FrameworkError>;

    /// Merge the accumulated summary with the next adjacent chunk.
    fn merge(
        &mut self,
        accumulated: Self::ChunkSummary,
        next: Self::ChunkSummary,
    ) -> Result<Self::ChunkSummary, FrameworkError>;

    /// Finalize the result from the fully merged summary.
    fn finalize(
        &mut self,
        root: Self::ChunkSummary,
        input: &Self::Input,
    ) -> Result<Self::Output, FrameworkError>;
}

/// Result returned by the chunked evaluator.
#[derive(Debug)]
pub struct EvaluationResult<O> {
    /// Final output synthesized from the merged summary.
    pub output: O,
    /// Number of chunks processed.
    pub chunks_processed: usize,
    /// Number of cooperative yields performed between chunks.
    pub yields: usize,
}

/// Sequential evaluator that feeds a processor one chunk at a time.
#[derive(Debug)]
pub struct ChunkedEvaluator<P: ChunkProcessor> {
    processor: P,
    config: ChunkConfig,
}

impl<P: ChunkProcessor> ChunkedEvaluator<P> {
    /// Create a new evaluator with the provided processor and configuration.
    pub fn new(processor: P, config: ChunkConfig) -> Self {
        Self { processor, config }
    }

    /// Access configuration.
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Execute evaluation and return the final output and metadata.
    pub fn evaluate(&mut self, input: &P::Input) -> Result<EvaluationResult<P::Output>, FrameworkError> {
        let mut accumulated = P::ChunkSummary::default();
        let mut yields = 0;
        let should_yield = self.config.should_yield();

        for chunk_id in 1..=self.config.num_chunks {
            let context = self.config.chunk_context(chunk_id)?;
            let summary = self.processor.process_chunk(input, &context)?;
            accumulated = self.processor.merge(accumulated, summary)?;

            if should_yield && chunk_id < self.config.num_chunks {
                debug!(
                    chunk_id,
                    num_chunks = self.config.num_chunks,
                    "yielding between chunks"
                );
                std::thread::yield_now();
                yields += 1;
            }
        }

        let output = self.processor.finalize(accumulated, input)?;
        Ok(EvaluationResult {
            output,
            chunks_processed: self.config.num_chunks,
            yields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Concat;

    impl ChunkProcessor for Concat {
        type Input = Vec<u32>;
        type ChunkSummary = Vec<u32>;
        type Output = Vec<u32>;

        fn process_chunk(
            &mut self,
            input: &Self::Input,
            context: &ChunkContext,
        ) -> Result<Self::ChunkSummary, FrameworkError> {
            Ok(input[context.range.clone()].to_vec())
        }

        fn merge(
            &mut self,
            mut accumulated: Self::ChunkSummary,
            next: Self::ChunkSummary,
        ) -> Result<Self::ChunkSummary, FrameworkError> {
            accumulated.extend(next);
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

    #[test]
    fn chunk_contexts_cover_input() {
        let config = ChunkConfig::with_chunk_size(10, 4).unwrap();
        assert_eq!(config.num_chunks, 3);
        assert_eq!(config.chunk_context(3).unwrap().range, 8..10);
        assert!(matches!(
            config.chunk_context(4),
            Err(FrameworkError::ChunkOutOfRange { chunk_id: 4, max_chunks: 3 })
        ));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        assert!(ChunkConfig::with_chunk_size(10, 0).is_err());
    }

    #[test]
    fn evaluation_preserves_order_and_yields() {
        let input: Vec<u32> = (0..23).collect();
        let config = ChunkConfig::with_chunk_size(input.len(), 5)
            .unwrap()
            .with_yield_threshold(10);
        let mut evaluator = ChunkedEvaluator::new(Concat, config);
        let result = evaluator.evaluate(&input).unwrap();
        assert_eq!(result.output, input);
        assert_eq!(result.chunks_processed, 5);
        assert_eq!(result.yields, 4);
    }

    #[test]
    fn empty_input_finalizes_default_summary() {
        let mut evaluator = ChunkedEvaluator::new(Concat, ChunkConfig::single_chunk(0));
        let result = evaluator.evaluate(&Vec::new()).unwrap();
        assert!(result.output.is_empty());
        assert_eq!(result.chunks_processed, 0);
    }
}
