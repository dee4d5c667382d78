use anyhow::{anyhow, Result};
use std::io::Write;

use super::{Mutation, Read};

const HEADER: &str =
    "#id\tchrom\tstart\tend\tstrand\tmapq\tflags\tcigar\ttlen\tmutations\n";

fn format_mutation(mutation: &Mutation) -> String {
    format!(
        "{kind}:{pos}:{len}:{seq}>{reference}",
        kind = mutation.kind.label(),
        pos = mutation.position,
        len = mutation.length,
        seq = mutation.sequence,
        reference = mutation.reference,
    )
}

/// Write reads as tab-separated lines, one per read.
///
/// Mutations are joined with `,` as `kind:position:length:read>reference`;
/// reads without mutations show `.`.
pub fn write_reads_tsv<W: Write>(writer: &mut W, reads: &[Read]) -> Result<()> {
    writer.write_all(HEADER.as_bytes())?;

    for read in reads {
        let mutations = if read.mutations.is_empty() {
            ".".to_string()
        } else {
            read.mutations
                .iter()
                .map(format_mutation)
                .collect::<Vec<_>>()
                .join(",")
        };
        let line = format!(
            "{id}\t{chrom}\t{start}\t{end}\t{strand}\t{mapq}\t{flags}\t{cigar}\t{tlen}\t{mutations}\n",
            id = read.id,
            chrom = read.chromosome,
            start = read.start,
            end = read.end,
            strand = read.strand,
            mapq = read.mapping_quality,
            flags = read.flags,
            cigar = read.cigar,
            tlen = read.template_length,
        );
        writer.write_all(line.as_bytes())?;
    }

    writer.flush()?;
    Ok(())
}

/// Render reads into a TSV string (useful for tests and snapshots).
pub fn render_reads_tsv(reads: &[Read]) -> Result<String> {
    let mut buffer = Vec::new();
    write_reads_tsv(&mut buffer, reads)?;
    String::from_utf8(buffer).map_err(|_| anyhow!("rendered TSV is not valid UTF-8"))
}
