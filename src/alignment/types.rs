use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::alignment::cigar::{parse_cigar, CigarError};

/// SAM flag bit values consulted by the pipeline.
pub mod flags {
    /// Segment unmapped.
    pub const UNMAPPED: u16 = 0x4;
    /// Sequence reverse complemented.
    pub const REVERSE: u16 = 0x10;
    /// Secondary alignment.
    pub const SECONDARY: u16 = 0x100;
    /// Supplementary alignment.
    pub const SUPPLEMENTARY: u16 = 0x800;
}

/// Strand the read aligns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Strand {
    /// Forward strand (`+`).
    #[default]
    Forward,
    /// Reverse strand (`-`).
    Reverse,
}

impl Strand {
    /// Strand implied by the reverse-complement bit of a flag word.
    pub fn from_flags(flag_bits: u16) -> Self {
        if flag_bits & flags::REVERSE != 0 {
            Strand::Reverse
        } else {
            Strand::Forward
        }
    }

    /// Single-character symbol.
    pub fn symbol(self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Value of an optional alignment tag.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TagValue {
    /// Printable character (`A`).
    Char(u8),
    /// Signed integer of any width (`c`, `C`, `s`, `S`, `i`, `I`).
    Int(i64),
    /// Floating point (`f`, `d`).
    Float(f64),
    /// Text or hex string (`Z`, `H`).
    String(String),
}

impl TagValue {
    /// String payload, if the tag holds text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::String(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Char(c) => write!(f, "{}", *c as char),
            TagValue::Int(value) => write!(f, "{value}"),
            TagValue::Float(value) => write!(f, "{value}"),
            TagValue::String(text) => f.write_str(text),
        }
    }
}

/// Alignment record as delivered by a [`RecordSource`](crate::alignment::RecordSource).
///
/// Coordinates are 0-based, `end` exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAlignmentRecord {
    /// Read name.
    pub name: String,
    /// Reference contig the record is placed on.
    pub reference_name: Arc<str>,
    /// 0-based leftmost reference coordinate (inclusive).
    pub start: u64,
    /// 0-based reference end (exclusive).
    pub end: u64,
    /// Alignment strand.
    pub strand: Strand,
    /// Mapping quality (Phred-scaled).
    pub mapping_quality: u8,
    /// SAM flag word.
    pub flags: u16,
    /// CIGAR string (`*` when absent).
    pub cigar: String,
    /// Read bases (`*` or empty when absent).
    pub sequence: String,
    /// Phred+33 quality string (`*` when absent).
    pub quality: String,
    /// Observed template length.
    pub template_length: i64,
    /// Optional tags keyed by two-letter name.
    pub tags: BTreeMap<String, TagValue>,
}

impl RawAlignmentRecord {
    /// Build a forward-strand, mapped record whose end is derived from the CIGAR.
    pub fn aligned(
        name: impl Into<String>,
        reference_name: impl Into<Arc<str>>,
        start: u64,
        cigar: &str,
        sequence: impl Into<String>,
    ) -> Result<Self, CigarError> {
        let reference_len = parse_cigar(cigar)?.reference_len();
        let sequence = sequence.into();
        Ok(Self {
            name: name.into(),
            reference_name: reference_name.into(),
            start,
            end: start + reference_len,
            strand: Strand::Forward,
            mapping_quality: 60,
            flags: 0,
            cigar: cigar.to_string(),
            quality: "I".repeat(sequence.len()),
            sequence,
            template_length: 0,
            tags: BTreeMap::new(),
        })
    }

    /// Replace the flag word; the strand follows the reverse bit.
    pub fn with_flags(mut self, flag_bits: u16) -> Self {
        self.flags = flag_bits;
        self.strand = Strand::from_flags(flag_bits);
        self
    }

    /// Replace the mapping quality.
    pub fn with_mapping_quality(mut self, mapping_quality: u8) -> Self {
        self.mapping_quality = mapping_quality;
        self
    }

    /// Attach or replace a tag.
    pub fn with_tag(mut self, name: impl Into<String>, value: TagValue) -> Self {
        self.tags.insert(name.into(), value);
        self
    }

    /// Attach an `MD` tag.
    pub fn with_md(self, md: impl Into<String>) -> Self {
        self.with_tag("MD", TagValue::String(md.into()))
    }

    /// Replace the template length.
    pub fn with_template_length(mut self, template_length: i64) -> Self {
        self.template_length = template_length;
        self
    }

    /// `MD` tag text, if present.
    pub fn md(&self) -> Option<&str> {
        self.tags.get("MD").and_then(TagValue::as_str)
    }

    /// Flag 0x4.
    pub fn is_unmapped(&self) -> bool {
        self.flags & flags::UNMAPPED != 0
    }

    /// Flag 0x100.
    pub fn is_secondary(&self) -> bool {
        self.flags & flags::SECONDARY != 0
    }

    /// Flag 0x800.
    pub fn is_supplementary(&self) -> bool {
        self.flags & flags::SUPPLEMENTARY != 0
    }
}

/// Classification of a reconstructed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MutationKind {
    /// Bases present in the read but not in the reference.
    Insertion,
    /// Reference bases missing from the read.
    Deletion,
    /// Single-base substitution.
    Mismatch,
}

impl MutationKind {
    /// Label used by renderers.
    pub fn label(self) -> &'static str {
        match self {
            MutationKind::Insertion => "insertion",
            MutationKind::Deletion => "deletion",
            MutationKind::Mismatch => "mismatch",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Mutation anchored to a 1-based reference coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Mutation {
    /// Mutation class.
    pub kind: MutationKind,
    /// 1-based reference position.
    pub position: u64,
    /// Number of bases affected.
    pub length: u32,
    /// Read bases (empty for deletions).
    pub sequence: String,
    /// Reference bases (empty for insertions, `N` placeholders for deletions).
    pub reference: String,
}

impl Mutation {
    /// Insertion of `length` read bases before reference position `position`.
    pub fn insertion(position: u64, length: u32, sequence: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Insertion,
            position,
            length,
            sequence: sequence.into(),
            reference: String::new(),
        }
    }

    /// Deletion of `length` reference bases starting at `position`.
    pub fn deletion(position: u64, length: u32) -> Self {
        Self {
            kind: MutationKind::Deletion,
            position,
            length,
            sequence: String::new(),
            reference: "N".repeat(length as usize),
        }
    }

    /// Single-base mismatch.
    pub fn mismatch(position: u64, read_base: char, reference_base: char) -> Self {
        Self {
            kind: MutationKind::Mismatch,
            position,
            length: 1,
            sequence: read_base.to_string(),
            reference: reference_base.to_string(),
        }
    }
}

/// Normalized read handed to rendering code.
///
/// Coordinates are 1-based: `start == raw.start + 1`, `end == raw.end + 1`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Read {
    /// Read name.
    pub id: String,
    /// Reference contig.
    pub chromosome: Arc<str>,
    /// 1-based start.
    pub start: u64,
    /// 1-based end.
    pub end: u64,
    /// Alignment strand.
    pub strand: Strand,
    /// Mapping quality.
    pub mapping_quality: u8,
    /// CIGAR string.
    pub cigar: String,
    /// Read bases.
    pub sequence: String,
    /// Phred+33 quality string.
    pub quality: String,
    /// SAM flag word.
    pub flags: u16,
    /// Observed template length.
    pub template_length: i64,
    /// Optional tags.
    pub tags: BTreeMap<String, TagValue>,
    /// Mutations in CIGAR walk order.
    pub mutations: Vec<Mutation>,
}

impl Read {
    /// Build a read from a raw record and its reconstructed mutations.
    pub fn from_raw(raw: &RawAlignmentRecord, mutations: Vec<Mutation>) -> Self {
        Self {
            id: raw.name.clone(),
            chromosome: Arc::clone(&raw.reference_name),
            start: raw.start + 1,
            end: raw.end + 1,
            strand: raw.strand,
            mapping_quality: raw.mapping_quality,
            cigar: raw.cigar.clone(),
            sequence: raw.sequence.clone(),
            quality: raw.quality.clone(),
            flags: raw.flags,
            template_length: raw.template_length,
            tags: raw.tags.clone(),
            mutations,
        }
    }

    /// Whether a 1-based coordinate lies within the read's span.
    pub fn covers(&self, position: u64) -> bool {
        self.start <= position && position <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_record_end_follows_cigar() {
        let raw = RawAlignmentRecord::aligned("r1", "chr1", 100, "5S10M2D3M1I", "A".repeat(19))
            .unwrap();
        assert_eq!(raw.end, 115);
        assert_eq!(raw.quality.len(), 19);
    }

    #[test]
    fn read_conversion_shifts_to_one_based() {
        let raw = RawAlignmentRecord::aligned("r1", "chr1", 0, "4M", "ACGT")
            .unwrap()
            .with_flags(flags::REVERSE | flags::SECONDARY)
            .with_md("4");
        let read = Read::from_raw(&raw, Vec::new());
        assert_eq!(read.start, 1);
        assert_eq!(read.end, 5);
        assert_eq!(read.strand, Strand::Reverse);
        assert_eq!(read.tags.get("MD"), Some(&TagValue::String("4".into())));
    }

    #[test]
    fn deletion_uses_placeholder_reference() {
        let deletion = Mutation::deletion(10, 3);
        assert_eq!(deletion.reference, "NNN");
        assert!(deletion.sequence.is_empty());
    }
}
