//! Reconstruction of per-read mutations from CIGAR operations and the `MD` tag.
//!
//! Two cursors walk the alignment: `ref_pos` (0-based reference coordinate)
//! and `seq_pos` (offset into the read). Insertions never advance `ref_pos`,
//! deletions never advance `seq_pos`. Mismatches inside match blocks come from
//! the `MD` tag, which is consumed lazily across all match blocks of a record.

use thiserror::Error;

use crate::alignment::cigar::{Cigar, CigarOpKind};
use crate::alignment::types::Mutation;

/// Errors raised while reading an `MD` tag.
///
/// These never abort extraction; mismatches decoded before the error are kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MdTagError {
    /// A character outside `[0-9A-Za-z^]`.
    #[error("malformed MD tag '{md}': unexpected '{ch}' at offset {offset}")]
    InvalidCharacter {
        /// Offending tag text.
        md: String,
        /// Unexpected character.
        ch: char,
        /// Byte offset of the character.
        offset: usize,
    },

    /// `^` not followed by any reference base.
    #[error("malformed MD tag '{md}': empty deletion at offset {offset}")]
    EmptyDeletion {
        /// Offending tag text.
        md: String,
        /// Byte offset of the `^`.
        offset: usize,
    },

    /// A match run that does not fit in 32 bits.
    #[error("malformed MD tag '{md}': match length overflow at offset {offset}")]
    LengthOverflow {
        /// Offending tag text.
        md: String,
        /// Byte offset of the run.
        offset: usize,
    },

    /// The tag describes fewer aligned bases than the CIGAR.
    #[error("MD tag '{md}' is shorter than the CIGAR alignment")]
    Exhausted {
        /// Offending tag text.
        md: String,
    },
}

/// Mutations reconstructed for one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedMutations {
    /// Mutations in CIGAR walk order.
    pub mutations: Vec<Mutation>,
    /// Set when the `MD` tag stopped being usable part-way through.
    pub md_error: Option<MdTagError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MdToken {
    Matches(u32),
    Mismatch(u8),
    Deletion(usize),
}

/// Lazy tokenizer over `digits | letter | ^letters`.
#[derive(Debug)]
struct MdTokens<'a> {
    md: &'a str,
    offset: usize,
}

impl<'a> MdTokens<'a> {
    fn new(md: &'a str) -> Self {
        Self { md, offset: 0 }
    }

    fn run_end(&self, from: usize, predicate: impl Fn(u8) -> bool) -> usize {
        self.md.as_bytes()[from..]
            .iter()
            .position(|&b| !predicate(b))
            .map_or(self.md.len(), |len| from + len)
    }
}

impl Iterator for MdTokens<'_> {
    type Item = Result<MdToken, MdTagError>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.md.as_bytes();
        let start = self.offset;
        let first = *bytes.get(start)?;

        let token = match first {
            b'0'..=b'9' => {
                let end = self.run_end(start, |b| b.is_ascii_digit());
                self.offset = end;
                self.md[start..end]
                    .parse::<u32>()
                    .map(MdToken::Matches)
                    .map_err(|_| MdTagError::LengthOverflow {
                        md: self.md.to_string(),
                        offset: start,
                    })
            }
            b'^' => {
                let end = self.run_end(start + 1, |b| b.is_ascii_alphabetic());
                self.offset = end;
                if end == start + 1 {
                    Err(MdTagError::EmptyDeletion {
                        md: self.md.to_string(),
                        offset: start,
                    })
                } else {
                    Ok(MdToken::Deletion(end - start - 1))
                }
            }
            b if b.is_ascii_alphabetic() => {
                self.offset += 1;
                Ok(MdToken::Mismatch(b.to_ascii_uppercase()))
            }
            _ => {
                let ch = self.md[start..].chars().next().unwrap_or('?');
                self.offset = self.md.len();
                Err(MdTagError::InvalidCharacter {
                    md: self.md.to_string(),
                    ch,
                    offset: start,
                })
            }
        };

        if token.is_err() {
            self.offset = self.md.len();
        }
        Some(token)
    }
}

/// `MD` cursor shared across the match blocks of one record.
#[derive(Debug)]
struct MdWalker<'a> {
    tokens: MdTokens<'a>,
    pending_matches: u32,
}

impl<'a> MdWalker<'a> {
    fn new(md: &'a str) -> Self {
        Self {
            tokens: MdTokens::new(md),
            pending_matches: 0,
        }
    }

    /// Walk `len` aligned bases starting at the given cursors, emitting mismatches.
    fn walk_block(
        &mut self,
        len: u32,
        ref_pos: u64,
        seq_pos: usize,
        sequence: &[u8],
        sink: &mut MutationSink,
    ) -> Result<(), MdTagError> {
        let mut offset = 0u32;
        while offset < len {
            if self.pending_matches > 0 {
                let take = self.pending_matches.min(len - offset);
                self.pending_matches -= take;
                offset += take;
                continue;
            }

            match self.tokens.next() {
                None => {
                    return Err(MdTagError::Exhausted {
                        md: self.tokens.md.to_string(),
                    })
                }
                Some(Err(err)) => return Err(err),
                Some(Ok(MdToken::Matches(run))) => self.pending_matches = run,
                // Already emitted from the CIGAR `D` operation.
                Some(Ok(MdToken::Deletion(_))) => {}
                Some(Ok(MdToken::Mismatch(reference_base))) => {
                    let read_base = read_base_at(sequence, seq_pos + offset as usize);
                    let position = ref_pos + u64::from(offset) + 1;
                    if !sink.push(Mutation::mismatch(position, read_base, reference_base as char)) {
                        return Ok(());
                    }
                    offset += 1;
                }
            }
        }
        Ok(())
    }
}

/// Collects mutations while keeping the count within the read length.
#[derive(Debug)]
struct MutationSink {
    mutations: Vec<Mutation>,
    capacity: usize,
}

impl MutationSink {
    fn push(&mut self, mutation: Mutation) -> bool {
        if self.is_full() {
            return false;
        }
        self.mutations.push(mutation);
        true
    }

    fn is_full(&self) -> bool {
        self.mutations.len() >= self.capacity
    }
}

fn read_base_at(sequence: &[u8], offset: usize) -> char {
    sequence.get(offset).map_or('N', |&b| b as char)
}

fn read_slice(sequence: &[u8], start: usize, len: usize) -> String {
    let start = start.min(sequence.len());
    let end = start.saturating_add(len).min(sequence.len());
    String::from_utf8_lossy(&sequence[start..end]).into_owned()
}

/// Reconstruct insertions, deletions and mismatches for one alignment.
///
/// `reference_start` is the record's 0-based start; emitted positions are
/// 1-based. Without an `MD` tag, `M`/`=` blocks contribute no mismatches and
/// each base of an `X` block becomes a mismatch against an unknown (`N`)
/// reference base. Records without sequence (`*`) yield no mutations.
pub fn extract_mutations(
    cigar: &Cigar,
    sequence: &str,
    reference_start: u64,
    md: Option<&str>,
) -> ExtractedMutations {
    let sequence = if sequence == "*" { "" } else { sequence };
    let bases = sequence.as_bytes();

    let mut sink = MutationSink {
        mutations: Vec::new(),
        capacity: bases.len(),
    };
    let mut md_walker = md.map(MdWalker::new);
    let mut md_error = None;

    let mut ref_pos = reference_start;
    let mut seq_pos = 0usize;

    for op in cigar {
        if sink.is_full() {
            break;
        }
        let len = op.len;
        match op.kind {
            CigarOpKind::Insertion => {
                sink.push(Mutation::insertion(
                    ref_pos + 1,
                    len,
                    read_slice(bases, seq_pos, len as usize),
                ));
                seq_pos += len as usize;
            }
            CigarOpKind::Deletion => {
                sink.push(Mutation::deletion(ref_pos + 1, len));
                ref_pos += u64::from(len);
            }
            CigarOpKind::Skip => ref_pos += u64::from(len),
            CigarOpKind::Match | CigarOpKind::SequenceMatch | CigarOpKind::SequenceMismatch => {
                match md_walker.as_mut() {
                    Some(walker) => {
                        if let Err(err) = walker.walk_block(len, ref_pos, seq_pos, bases, &mut sink) {
                            md_error = Some(err);
                            md_walker = None;
                        }
                    }
                    None if md.is_none() && op.kind == CigarOpKind::SequenceMismatch => {
                        for offset in 0..len {
                            let read_base = read_base_at(bases, seq_pos + offset as usize);
                            let position = ref_pos + u64::from(offset) + 1;
                            if !sink.push(Mutation::mismatch(position, read_base, 'N')) {
                                break;
                            }
                        }
                    }
                    None => {}
                }
                ref_pos += u64::from(len);
                seq_pos += len as usize;
            }
            CigarOpKind::SoftClip => seq_pos += len as usize,
            CigarOpKind::HardClip | CigarOpKind::Padding => {}
        }
    }

    ExtractedMutations {
        mutations: sink.mutations,
        md_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::cigar::parse_cigar;
    use crate::alignment::types::MutationKind;

    fn extract(cigar: &str, sequence: &str, start: u64, md: Option<&str>) -> ExtractedMutations {
        extract_mutations(&parse_cigar(cigar).unwrap(), sequence, start, md)
    }

    #[test]
    fn insertion_then_mismatch_scenario() {
        // 10M2I5M over ACGTACGTAC|GG|TACGT with MD 10A4.
        let sequence = "ACGTACGTACGGTACGT";
        let result = extract("10M2I5M", sequence, 100, Some("10A4"));
        assert_eq!(result.md_error, None);
        assert_eq!(
            result.mutations,
            vec![
                Mutation::insertion(111, 2, "GG"),
                Mutation::mismatch(111, 'T', 'A'),
            ]
        );
    }

    #[test]
    fn deletion_advances_reference_only() {
        let result = extract("3M2D3M", "ACGTAC", 10, Some("3^GG0C2"));
        assert_eq!(
            result.mutations,
            vec![Mutation::deletion(14, 2), Mutation::mismatch(16, 'T', 'C')]
        );
        assert_eq!(result.md_error, None);
    }

    #[test]
    fn skip_and_soft_clip_move_cursors() {
        let result = extract("2S3M100N3M1I", "NNACGTTTC", 0, Some("4G1"));
        assert_eq!(
            result.mutations,
            vec![
                Mutation::mismatch(105, 'T', 'G'),
                Mutation::insertion(107, 1, "C"),
            ]
        );
    }

    #[test]
    fn no_md_means_no_mismatches_for_match_blocks() {
        let result = extract("5M", "ACGTA", 0, None);
        assert!(result.mutations.is_empty());
        assert!(result.md_error.is_none());
    }

    #[test]
    fn mismatch_ops_without_md_are_synthesized() {
        let result = extract("2=2X1=", "ACGTA", 50, None);
        assert_eq!(
            result.mutations,
            vec![Mutation::mismatch(53, 'G', 'N'), Mutation::mismatch(54, 'T', 'N')]
        );
    }

    #[test]
    fn malformed_md_keeps_earlier_mutations() {
        let result = extract("4M1I4M", "ACGTTACGT", 0, Some("1C2#4"));
        assert_eq!(
            result.mutations,
            vec![Mutation::mismatch(2, 'C', 'C'), Mutation::insertion(5, 1, "T")]
        );
        assert!(matches!(
            result.md_error,
            Some(MdTagError::InvalidCharacter { ch: '#', offset: 3, .. })
        ));
    }

    #[test]
    fn short_md_is_reported_as_exhausted() {
        let result = extract("6M", "ACGTAC", 0, Some("2A"));
        assert_eq!(result.mutations, vec![Mutation::mismatch(3, 'G', 'A')]);
        assert!(matches!(result.md_error, Some(MdTagError::Exhausted { .. })));
    }

    #[test]
    fn empty_deletion_is_malformed() {
        let result = extract("4M", "ACGT", 0, Some("2^2"));
        assert!(matches!(result.md_error, Some(MdTagError::EmptyDeletion { offset: 1, .. })));
    }

    #[test]
    fn mutation_count_is_capped_by_read_length() {
        let result = extract("1M1D1M1D1M1D1M", "ACGT", 0, None);
        assert_eq!(result.mutations.len(), 3);
        assert!(result
            .mutations
            .iter()
            .all(|mutation| mutation.kind == MutationKind::Deletion));
    }

    #[test]
    fn missing_sequence_yields_nothing() {
        let result = extract("3M2I", "*", 0, Some("1A1"));
        assert!(result.mutations.is_empty());
    }
}
