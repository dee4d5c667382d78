//! Chunked evaluation framework used by the region query engine.
//!
//! Large record batches are handed to a processor in fixed-size chunks and the
//! per-chunk summaries are folded in order, so the result is identical to a
//! single pass over the whole batch.

mod chunked_eval;

pub use chunked_eval::{
    ChunkConfig, ChunkContext, ChunkProcessor, ChunkedEvaluator, EvaluationResult,
    FrameworkError,
};
