use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::alignment::types::RawAlignmentRecord;

/// Failures reported by a record source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Error bubbled up from htslib while opening or reading alignments.
    #[error("htslib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    /// A coordinate could not be represented by the underlying reader.
    #[error("coordinate {0} out of range for the alignment reader")]
    CoordinateOverflow(u64),

    /// Record content the pipeline could not interpret.
    #[error("invalid record: {0}")]
    Format(String),
}

/// Provider of raw alignment records for a reference interval.
///
/// Implementations must be shareable across concurrent region queries.
pub trait RecordSource: Send + Sync {
    /// Reference names known to the source, in header order.
    fn reference_names(&self) -> Vec<String>;

    /// Records overlapping the 0-based half-open interval `[start, end)`.
    ///
    /// A reference the source does not know yields no records.
    fn fetch_raw_records(
        &self,
        reference_name: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<RawAlignmentRecord>, SourceError>;
}

impl<S: RecordSource + ?Sized> RecordSource for Arc<S> {
    fn reference_names(&self) -> Vec<String> {
        (**self).reference_names()
    }

    fn fetch_raw_records(
        &self,
        reference_name: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<RawAlignmentRecord>, SourceError> {
        (**self).fetch_raw_records(reference_name, start, end)
    }
}

/// Record source backed by in-memory vectors, one per reference.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    order: Vec<String>,
    records: HashMap<String, Vec<RawAlignmentRecord>>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reference with no records.
    pub fn with_reference(mut self, name: impl Into<String>) -> Self {
        self.ensure_reference(name.into());
        self
    }

    /// Add a record under its own reference name.
    pub fn push(&mut self, record: RawAlignmentRecord) {
        let name = record.reference_name.to_string();
        self.ensure_reference(name.clone());
        self.records.entry(name).or_default().push(record);
    }

    /// Add many records.
    pub fn extend<I: IntoIterator<Item = RawAlignmentRecord>>(&mut self, records: I) {
        for record in records {
            self.push(record);
        }
    }

    fn ensure_reference(&mut self, name: String) {
        if !self.records.contains_key(&name) {
            self.order.push(name.clone());
            self.records.insert(name, Vec::new());
        }
    }
}

impl FromIterator<RawAlignmentRecord> for MemorySource {
    fn from_iter<I: IntoIterator<Item = RawAlignmentRecord>>(iter: I) -> Self {
        let mut source = Self::new();
        source.extend(iter);
        source
    }
}

impl RecordSource for MemorySource {
    fn reference_names(&self) -> Vec<String> {
        self.order.clone()
    }

    fn fetch_raw_records(
        &self,
        reference_name: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<RawAlignmentRecord>, SourceError> {
        Ok(self
            .records
            .get(reference_name)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| record.start < end && record.end.max(record.start + 1) > start)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Outcome of fetching one reference.
#[derive(Debug)]
pub struct ReferenceFetch {
    /// Reference that was queried.
    pub reference: String,
    /// Number of raw records returned, or the failure.
    pub result: Result<usize, SourceError>,
}

/// Per-reference fetch outcomes for one region query.
///
/// Distinguishes "no records matched" from "every fetch failed".
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Outcomes in query order.
    pub fetches: Vec<ReferenceFetch>,
}

impl FetchReport {
    /// Record a successful fetch.
    pub fn record_success(&mut self, reference: impl Into<String>, records: usize) {
        self.fetches.push(ReferenceFetch {
            reference: reference.into(),
            result: Ok(records),
        });
    }

    /// Record a failed fetch.
    pub fn record_failure(&mut self, reference: impl Into<String>, error: SourceError) {
        self.fetches.push(ReferenceFetch {
            reference: reference.into(),
            result: Err(error),
        });
    }

    /// References that were queried.
    pub fn attempted(&self) -> usize {
        self.fetches.len()
    }

    /// Failed fetches.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &SourceError)> {
        self.fetches.iter().filter_map(|fetch| match &fetch.result {
            Err(err) => Some((fetch.reference.as_str(), err)),
            Ok(_) => None,
        })
    }

    /// Number of failed fetches.
    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// Whether at least one reference was queried and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.fetches.is_empty() && self.fetches.iter().all(|fetch| fetch.result.is_err())
    }

    /// Raw records returned across successful fetches.
    pub fn records_fetched(&self) -> usize {
        self.fetches
            .iter()
            .filter_map(|fetch| fetch.result.as_ref().ok())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(reference: &str, start: u64, cigar: &str) -> RawAlignmentRecord {
        let len = crate::alignment::parse_cigar(cigar).unwrap().query_len() as usize;
        RawAlignmentRecord::aligned("r", reference, start, cigar, "A".repeat(len)).unwrap()
    }

    #[test]
    fn memory_source_returns_overlapping_records() {
        let source: MemorySource = vec![
            record("chr1", 0, "10M"),
            record("chr1", 10, "10M"),
            record("chr1", 25, "5M"),
            record("chr2", 0, "10M"),
        ]
        .into_iter()
        .collect();

        let hits = source.fetch_raw_records("chr1", 5, 20).unwrap();
        assert_eq!(hits.iter().map(|r| r.start).collect::<Vec<_>>(), vec![0, 10]);
        assert_eq!(source.reference_names(), vec!["chr1", "chr2"]);
        assert!(source.fetch_raw_records("chrX", 0, 10).unwrap().is_empty());
    }

    #[test]
    fn report_tracks_total_failure() {
        let mut report = FetchReport::default();
        assert!(!report.all_failed());
        report.record_failure("chr1", SourceError::Format("truncated block".into()));
        assert!(report.all_failed());
        report.record_success("chr2", 4);
        assert!(!report.all_failed());
        assert_eq!(report.failed(), 1);
        assert_eq!(report.records_fetched(), 4);
    }
}
