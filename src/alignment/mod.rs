//! Alignment-region query pipeline.
//!
//! Raw records from a [`RecordSource`] are filtered by flags and mapping
//! quality, their mutations are rebuilt from CIGAR and `MD`, and dense results
//! are thinned by position-stratified sampling.

mod cigar;
mod engine;
mod filter;
mod io;
mod mutation;
mod report;
mod sampler;
mod source;
mod types;

pub use cigar::{parse_cigar, Cigar, CigarError, CigarOp, CigarOpKind};
pub use engine::{
    assemble_read, assemble_reads, AssembledReads, QueryError, QueryOutcome, ReadAssembler,
    ReadChunks, RecordBatch, RegionQueryEngine, SamplingSummary,
};
pub use filter::{accept, classify, FilterSettings, FilterStats, RejectReason};
pub use io::IndexedBamSource;
pub use mutation::{extract_mutations, ExtractedMutations, MdTagError};
pub use report::{render_reads_tsv, write_reads_tsv};
pub use sampler::{Positioned, RegionSampler, DEFAULT_STRATA};
pub use source::{FetchReport, MemorySource, RecordSource, ReferenceFetch, SourceError};
pub use types::{flags, Mutation, MutationKind, RawAlignmentRecord, Read, Strand, TagValue};
