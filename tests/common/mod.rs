#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use readscope::alignment::RawAlignmentRecord;

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("READSCOPE_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set READSCOPE_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

/// Mapped forward-strand record with the given CIGAR and bases.
pub fn record(name: &str, chrom: &str, start: u64, cigar: &str, sequence: &str) -> RawAlignmentRecord {
    RawAlignmentRecord::aligned(name, chrom, start, cigar, sequence).expect("valid CIGAR")
}

/// `count` 4-base reads with starts drawn uniformly from `[0, span)`.
pub fn uniform_records(chrom: &str, count: usize, span: u64, seed: u64) -> Vec<RawAlignmentRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| record(&format!("u{i}"), chrom, rng.random_range(0..span), "4M", "ACGT"))
        .collect()
}
