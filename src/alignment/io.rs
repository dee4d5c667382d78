use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rust_htslib::bam::{self, record::Aux, Read as _};
use tracing::debug;

use crate::alignment::source::{RecordSource, SourceError};
use crate::alignment::types::{RawAlignmentRecord, Strand, TagValue};

/// Record source over an indexed BAM/CRAM file.
///
/// Each fetch opens its own reader, so one source can serve concurrent queries.
#[derive(Debug, Clone)]
pub struct IndexedBamSource {
    path: PathBuf,
    reference_names: Vec<String>,
}

impl IndexedBamSource {
    /// Open an alignment file that has an accompanying `.bai`/`.csi`/`.crai` index.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let reader = bam::IndexedReader::from_path(&path)?;
        let reference_names = reader
            .header()
            .target_names()
            .into_iter()
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect();
        Ok(Self {
            path,
            reference_names,
        })
    }

    /// Path of the underlying alignment file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for IndexedBamSource {
    fn reference_names(&self) -> Vec<String> {
        self.reference_names.clone()
    }

    fn fetch_raw_records(
        &self,
        reference_name: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<RawAlignmentRecord>, SourceError> {
        if !self.reference_names.iter().any(|name| name == reference_name) {
            debug!(
                reference = reference_name,
                path = %self.path.display(),
                "reference absent from header"
            );
            return Ok(Vec::new());
        }
        let fetch_start = i64::try_from(start).map_err(|_| SourceError::CoordinateOverflow(start))?;
        let fetch_end = i64::try_from(end).map_err(|_| SourceError::CoordinateOverflow(end))?;

        let mut reader = bam::IndexedReader::from_path(&self.path)?;
        reader.fetch((reference_name, fetch_start, fetch_end))?;

        let reference: Arc<str> = Arc::from(reference_name);
        let mut records = Vec::new();
        let mut record = bam::Record::new();
        while let Some(result) = reader.read(&mut record) {
            result?;
            records.push(convert_record(&record, &reference)?);
        }
        Ok(records)
    }
}

fn convert_record(
    record: &bam::Record,
    reference: &Arc<str>,
) -> Result<RawAlignmentRecord, SourceError> {
    let name = String::from_utf8_lossy(record.qname()).into_owned();
    // Region fetches only return placed records.
    let start = u64::try_from(record.pos()).map_err(|_| {
        SourceError::Format(format!("read '{name}' has position {}", record.pos()))
    })?;
    let end = u64::try_from(record.cigar().end_pos()).unwrap_or(start).max(start);

    let cigar = if record.cigar_len() == 0 {
        "*".to_string()
    } else {
        record.cigar().to_string()
    };

    let sequence = if record.seq_len() == 0 {
        "*".to_string()
    } else {
        String::from_utf8_lossy(&record.seq().as_bytes()).into_owned()
    };

    let qualities = record.qual();
    let quality = if qualities.is_empty() || qualities[0] == 0xff {
        "*".to_string()
    } else {
        qualities.iter().map(|&q| (q.saturating_add(33)) as char).collect()
    };

    Ok(RawAlignmentRecord {
        name,
        reference_name: Arc::clone(reference),
        start,
        end,
        strand: if record.is_reverse() {
            Strand::Reverse
        } else {
            Strand::Forward
        },
        mapping_quality: record.mapq(),
        flags: record.flags(),
        cigar,
        sequence,
        quality,
        template_length: record.insert_size(),
        tags: convert_tags(record),
    })
}

fn convert_tags(record: &bam::Record) -> BTreeMap<String, TagValue> {
    let mut tags = BTreeMap::new();
    for entry in record.aux_iter() {
        let (tag, value) = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(read = %String::from_utf8_lossy(record.qname()), %err, "unreadable aux data");
                break;
            }
        };
        let name = String::from_utf8_lossy(tag).into_owned();
        let value = match value {
            Aux::Char(c) => TagValue::Char(c),
            Aux::I8(v) => TagValue::Int(i64::from(v)),
            Aux::U8(v) => TagValue::Int(i64::from(v)),
            Aux::I16(v) => TagValue::Int(i64::from(v)),
            Aux::U16(v) => TagValue::Int(i64::from(v)),
            Aux::I32(v) => TagValue::Int(i64::from(v)),
            Aux::U32(v) => TagValue::Int(i64::from(v)),
            Aux::Float(v) => TagValue::Float(f64::from(v)),
            Aux::Double(v) => TagValue::Float(v),
            Aux::String(v) | Aux::HexByteArray(v) => TagValue::String(v.to_string()),
            _ => {
                debug!(tag = %name, "skipping array-valued tag");
                continue;
            }
        };
        tags.insert(name, value);
    }
    tags
}
