#[path = "common/mod.rs"]
mod common;
use common::{assert_snapshot, record};
use readscope::alignment::{flags, render_reads_tsv, FilterSettings, MemorySource, RegionQueryEngine};

#[test]
fn render_reads_matches_golden() {
    let source: MemorySource = vec![
        record("r1", "chr1", 99, "10M2I5M", "ACGTACGTACGGTACGT").with_md("10A4"),
        record("r2", "chr1", 120, "5M", "ACGTA")
            .with_flags(flags::REVERSE)
            .with_mapping_quality(30)
            .with_template_length(-150),
        record("r3", "chr1", 130, "3M2D3M", "ACGTAC").with_md("3^GG0C2"),
        record("r4", "chr1", 140, "4M", "ACGT").with_flags(flags::UNMAPPED),
    ]
    .into_iter()
    .collect();

    let outcome = RegionQueryEngine::new(source)
        .get_records_for_range("chr1", 0, 1_000, &FilterSettings::default())
        .expect("query should succeed");
    assert_eq!(outcome.stats.unmapped, 1);

    let actual = render_reads_tsv(&outcome.reads).expect("TSV rendering should succeed");
    assert_snapshot("reads/simple.tsv", &actual);
}
