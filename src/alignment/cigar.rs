use std::fmt;

use thiserror::Error;

/// CIGAR operation kinds describing how a read aligns to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CigarOpKind {
    /// `M`: alignment match (sequence match or mismatch).
    Match,
    /// `I`: insertion relative to the reference.
    Insertion,
    /// `D`: deletion relative to the reference.
    Deletion,
    /// `N`: skipped reference region (e.g. intron).
    Skip,
    /// `S`: soft clipping (sequence present in read only).
    SoftClip,
    /// `H`: hard clipping (trimmed sequence not present in read).
    HardClip,
    /// `P`: padding.
    Padding,
    /// `=`: sequence match.
    SequenceMatch,
    /// `X`: sequence mismatch.
    SequenceMismatch,
}

impl CigarOpKind {
    /// Decode an operation letter.
    pub fn from_char(op: char) -> Option<Self> {
        Some(match op {
            'M' => CigarOpKind::Match,
            'I' => CigarOpKind::Insertion,
            'D' => CigarOpKind::Deletion,
            'N' => CigarOpKind::Skip,
            'S' => CigarOpKind::SoftClip,
            'H' => CigarOpKind::HardClip,
            'P' => CigarOpKind::Padding,
            '=' => CigarOpKind::SequenceMatch,
            'X' => CigarOpKind::SequenceMismatch,
            _ => return None,
        })
    }

    /// Operation letter.
    pub fn as_char(self) -> char {
        match self {
            CigarOpKind::Match => 'M',
            CigarOpKind::Insertion => 'I',
            CigarOpKind::Deletion => 'D',
            CigarOpKind::Skip => 'N',
            CigarOpKind::SoftClip => 'S',
            CigarOpKind::HardClip => 'H',
            CigarOpKind::Padding => 'P',
            CigarOpKind::SequenceMatch => '=',
            CigarOpKind::SequenceMismatch => 'X',
        }
    }

    /// Whether the operation advances the reference coordinate.
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            CigarOpKind::Match
                | CigarOpKind::Deletion
                | CigarOpKind::Skip
                | CigarOpKind::SequenceMatch
                | CigarOpKind::SequenceMismatch
        )
    }

    /// Whether the operation advances the read coordinate.
    pub fn consumes_query(self) -> bool {
        matches!(
            self,
            CigarOpKind::Match
                | CigarOpKind::Insertion
                | CigarOpKind::SoftClip
                | CigarOpKind::SequenceMatch
                | CigarOpKind::SequenceMismatch
        )
    }
}

/// CIGAR operation with length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CigarOp {
    /// Operation kind.
    pub kind: CigarOpKind,
    /// Number of bases affected by the operation.
    pub len: u32,
}

impl CigarOp {
    /// Construct a new CIGAR operation.
    pub fn new(kind: CigarOpKind, len: u32) -> Self {
        Self { kind, len }
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len, self.kind.as_char())
    }
}

/// Ordered sequence of CIGAR operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Cigar(Vec<CigarOp>);

impl Cigar {
    /// Wrap an operation list.
    pub fn new(ops: Vec<CigarOp>) -> Self {
        Self(ops)
    }

    /// Operations in alignment order.
    pub fn ops(&self) -> &[CigarOp] {
        &self.0
    }

    /// Whether the CIGAR carries no alignment information.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Reference bases spanned by the alignment.
    pub fn reference_len(&self) -> u64 {
        self.0
            .iter()
            .filter(|op| op.kind.consumes_reference())
            .map(|op| u64::from(op.len))
            .sum()
    }

    /// Read bases described by the alignment.
    pub fn query_len(&self) -> u64 {
        self.0
            .iter()
            .filter(|op| op.kind.consumes_query())
            .map(|op| u64::from(op.len))
            .sum()
    }
}

impl fmt::Display for Cigar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in &self.0 {
            write!(f, "{op}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Cigar {
    type Item = &'a CigarOp;
    type IntoIter = std::slice::Iter<'a, CigarOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Errors raised while decoding a CIGAR string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CigarError {
    /// A length was not followed by an operation letter.
    #[error("malformed CIGAR '{cigar}': length at offset {offset} has no operation")]
    MissingOperation {
        /// Offending CIGAR string.
        cigar: String,
        /// Byte offset of the dangling length.
        offset: usize,
    },

    /// An operation letter outside `MIDNSHP=X`.
    #[error("malformed CIGAR '{cigar}': unknown operation '{op}' at offset {offset}")]
    UnknownOperation {
        /// Offending CIGAR string.
        cigar: String,
        /// Unrecognized character.
        op: char,
        /// Byte offset of the character.
        offset: usize,
    },

    /// An operation letter without a preceding length.
    #[error("malformed CIGAR '{cigar}': operation at offset {offset} has no length")]
    MissingLength {
        /// Offending CIGAR string.
        cigar: String,
        /// Byte offset of the operation.
        offset: usize,
    },

    /// A zero or overflowing length.
    #[error("malformed CIGAR '{cigar}': invalid length at offset {offset}")]
    InvalidLength {
        /// Offending CIGAR string.
        cigar: String,
        /// Byte offset of the length.
        offset: usize,
    },
}

/// Decode a CIGAR string into its operations.
///
/// Empty input and `*` yield an empty [`Cigar`].
pub fn parse_cigar(cigar: &str) -> Result<Cigar, CigarError> {
    if cigar.is_empty() || cigar == "*" {
        return Ok(Cigar::default());
    }

    let mut ops = Vec::new();
    let mut len: Option<u32> = None;
    let mut len_offset = 0;

    for (offset, ch) in cigar.char_indices() {
        if let Some(digit) = ch.to_digit(10) {
            if len.is_none() {
                len_offset = offset;
            }
            let next = len
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|value| value.checked_add(digit))
                .ok_or_else(|| CigarError::InvalidLength {
                    cigar: cigar.to_string(),
                    offset: len_offset,
                })?;
            len = Some(next);
            continue;
        }

        let kind = CigarOpKind::from_char(ch).ok_or_else(|| CigarError::UnknownOperation {
            cigar: cigar.to_string(),
            op: ch,
            offset,
        })?;
        let op_len = len.take().ok_or_else(|| CigarError::MissingLength {
            cigar: cigar.to_string(),
            offset,
        })?;
        if op_len == 0 {
            return Err(CigarError::InvalidLength {
                cigar: cigar.to_string(),
                offset: len_offset,
            });
        }
        ops.push(CigarOp::new(kind, op_len));
    }

    if len.is_some() {
        return Err(CigarError::MissingOperation {
            cigar: cigar.to_string(),
            offset: len_offset,
        });
    }

    Ok(Cigar(ops))
}
