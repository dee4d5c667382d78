use std::fmt;
use std::ops::{Add, AddAssign};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::alignment::types::RawAlignmentRecord;

/// Caller-supplied inclusion rules for a region query.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FilterSettings {
    /// Records below this mapping quality are dropped.
    pub min_mapping_quality: u8,
    /// Keep records flagged unmapped (0x4).
    pub show_unmapped: bool,
    /// Keep secondary alignments (0x100).
    pub show_secondary: bool,
    /// Keep supplementary alignments (0x800).
    pub show_supplementary: bool,
    /// Query every reference of the source instead of the named chromosome.
    pub ignore_chromosome: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            min_mapping_quality: 0,
            show_unmapped: false,
            show_secondary: true,
            show_supplementary: true,
            ignore_chromosome: false,
        }
    }
}

impl FilterSettings {
    /// Set the minimum mapping quality.
    pub fn with_min_mapping_quality(mut self, min_mapping_quality: u8) -> Self {
        self.min_mapping_quality = min_mapping_quality;
        self
    }

    /// Toggle unmapped records.
    pub fn with_unmapped(mut self, show: bool) -> Self {
        self.show_unmapped = show;
        self
    }

    /// Toggle secondary alignments.
    pub fn with_secondary(mut self, show: bool) -> Self {
        self.show_secondary = show;
        self
    }

    /// Toggle supplementary alignments.
    pub fn with_supplementary(mut self, show: bool) -> Self {
        self.show_supplementary = show;
        self
    }

    /// Toggle fan-out across all references.
    pub fn with_ignore_chromosome(mut self, ignore: bool) -> Self {
        self.ignore_chromosome = ignore;
        self
    }
}

/// First rule that excluded a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Unmapped while `show_unmapped` is off.
    Unmapped,
    /// Secondary while `show_secondary` is off.
    Secondary,
    /// Supplementary while `show_supplementary` is off.
    Supplementary,
    /// Mapping quality below the configured minimum.
    LowMappingQuality,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RejectReason::Unmapped => "unmapped",
            RejectReason::Secondary => "secondary",
            RejectReason::Supplementary => "supplementary",
            RejectReason::LowMappingQuality => "low mapping quality",
        })
    }
}

/// Apply the inclusion rules in order, returning the first failing one.
pub fn classify(raw: &RawAlignmentRecord, settings: &FilterSettings) -> Result<(), RejectReason> {
    if raw.is_unmapped() && !settings.show_unmapped {
        return Err(RejectReason::Unmapped);
    }
    if raw.is_secondary() && !settings.show_secondary {
        return Err(RejectReason::Secondary);
    }
    if raw.is_supplementary() && !settings.show_supplementary {
        return Err(RejectReason::Supplementary);
    }
    if raw.mapping_quality < settings.min_mapping_quality {
        return Err(RejectReason::LowMappingQuality);
    }
    Ok(())
}

/// Whether a record passes every inclusion rule.
pub fn accept(raw: &RawAlignmentRecord, settings: &FilterSettings) -> bool {
    classify(raw, settings).is_ok()
}

/// Diagnostic counters returned alongside query results.
///
/// Flag counters record what was seen, independent of whether the record was
/// kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FilterStats {
    /// Raw records examined.
    pub total: usize,
    /// Records that became reads.
    pub accepted: usize,
    /// Records excluded by a filter rule.
    pub rejected: usize,
    /// Records carrying the unmapped flag.
    pub unmapped: usize,
    /// Records carrying the secondary flag.
    pub secondary: usize,
    /// Records carrying the supplementary flag.
    pub supplementary: usize,
    /// Records below the mapping-quality threshold.
    pub low_quality: usize,
    /// Accepted records dropped because their CIGAR could not be parsed.
    pub malformed_cigar: usize,
    /// Reads whose `MD` tag was only partially usable.
    pub malformed_md: usize,
    /// Mutations discarded for falling outside their read's span.
    pub out_of_bounds_mutations: usize,
}

impl FilterStats {
    /// Count a record's flags and mapping quality; returns the filter verdict.
    pub fn observe(&mut self, raw: &RawAlignmentRecord, settings: &FilterSettings) -> bool {
        self.total += 1;
        if raw.is_unmapped() {
            self.unmapped += 1;
        }
        if raw.is_secondary() {
            self.secondary += 1;
        }
        if raw.is_supplementary() {
            self.supplementary += 1;
        }
        if raw.mapping_quality < settings.min_mapping_quality {
            self.low_quality += 1;
        }

        let kept = accept(raw, settings);
        if !kept {
            self.rejected += 1;
        }
        kept
    }
}

impl AddAssign for FilterStats {
    fn add_assign(&mut self, other: Self) {
        self.total += other.total;
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        self.unmapped += other.unmapped;
        self.secondary += other.secondary;
        self.supplementary += other.supplementary;
        self.low_quality += other.low_quality;
        self.malformed_cigar += other.malformed_cigar;
        self.malformed_md += other.malformed_md;
        self.out_of_bounds_mutations += other.out_of_bounds_mutations;
    }
}

impl Add for FilterStats {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

impl fmt::Display for FilterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} accepted={} rejected={} unmapped={} secondary={} supplementary={} \
             low_quality={} malformed_cigar={} malformed_md={}",
            self.total,
            self.accepted,
            self.rejected,
            self.unmapped,
            self.secondary,
            self.supplementary,
            self.low_quality,
            self.malformed_cigar,
            self.malformed_md
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::types::flags;
    use test_case::test_case;

    fn record(flag_bits: u16, mapq: u8) -> RawAlignmentRecord {
        RawAlignmentRecord::aligned("r", "chr1", 0, "4M", "ACGT")
            .unwrap()
            .with_flags(flag_bits)
            .with_mapping_quality(mapq)
    }

    #[test_case(flags::UNMAPPED, FilterSettings::default() => Err(RejectReason::Unmapped) ; "unmapped hidden by default")]
    #[test_case(flags::UNMAPPED, FilterSettings::default().with_unmapped(true) => Ok(()) ; "unmapped shown")]
    #[test_case(flags::SECONDARY, FilterSettings::default() => Ok(()) ; "secondary shown by default")]
    #[test_case(flags::SECONDARY, FilterSettings::default().with_secondary(false) => Err(RejectReason::Secondary) ; "secondary hidden")]
    #[test_case(flags::SUPPLEMENTARY, FilterSettings::default().with_supplementary(false) => Err(RejectReason::Supplementary) ; "supplementary hidden")]
    #[test_case(flags::UNMAPPED | flags::SECONDARY, FilterSettings::default().with_secondary(false) => Err(RejectReason::Unmapped) ; "unmapped rule wins")]
    fn flag_rules(flag_bits: u16, settings: FilterSettings) -> Result<(), RejectReason> {
        classify(&record(flag_bits, 60), &settings)
    }

    #[test_case(9, 10 => false ; "below threshold")]
    #[test_case(10, 10 => true ; "at threshold")]
    #[test_case(0, 0 => true ; "default threshold keeps zero")]
    fn mapping_quality_rule(mapq: u8, min: u8) -> bool {
        accept(&record(0, mapq), &FilterSettings::default().with_min_mapping_quality(min))
    }

    #[test]
    fn stats_count_flags_even_when_kept() {
        let settings = FilterSettings::default().with_min_mapping_quality(20);
        let mut stats = FilterStats::default();
        assert!(stats.observe(&record(flags::SECONDARY, 30), &settings));
        assert!(!stats.observe(&record(flags::UNMAPPED, 5), &settings));
        assert!(!stats.observe(&record(0, 5), &settings));

        assert_eq!(stats.total, 3);
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.secondary, 1);
        assert_eq!(stats.unmapped, 1);
        assert_eq!(stats.low_quality, 2);
    }

    #[test]
    fn stats_add_fieldwise() {
        let left = FilterStats {
            total: 2,
            malformed_md: 1,
            ..FilterStats::default()
        };
        let right = FilterStats {
            total: 3,
            accepted: 3,
            ..FilterStats::default()
        };
        let sum = left + right;
        assert_eq!(sum.total, 5);
        assert_eq!(sum.accepted, 3);
        assert_eq!(sum.malformed_md, 1);
    }
}
