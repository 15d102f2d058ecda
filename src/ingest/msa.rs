//! MSA (aligned FASTA) → EDS / l-EDS conversion.
//!
//! Pass 1 reads every sequence once, keeping only the first (the reference)
//! in memory and marking each alignment column as common or variant in a
//! bit vector. Pass 2 derives symbol boundaries from the column runs. Pass 3
//! emits the symbols, re-reading non-reference sequences by seeking.

use std::io::{BufRead, Read, Seek, SeekFrom};

use rustc_hash::FxHashMap;

use crate::errors::{Error, Result};
use crate::ingest::{Conversion, IngestStats};
use crate::sources::SourceSet;
use crate::types::PathId;

const GAP: u8 = b'-';

struct Alignment {
    reference: String,
    /// Offset of each sequence's first data byte; index 0 is the reference.
    seq_starts: Vec<u64>,
    n_sequences: usize,
    line_width: usize,
}

/// Convert an aligned FASTA stream to EDS text with per-sequence sources.
/// Every maximal run of common or variant columns becomes one symbol.
pub fn msa_to_eds<R: BufRead + Seek>(reader: &mut R) -> Result<Conversion> {
    let (alignment, common) = scan_alignment(reader)?;
    let boundaries = eds_boundaries(&common, alignment.reference.len());
    let (eds, sources) = emit(reader, &alignment, &common, &boundaries)?;
    Ok(Conversion {
        eds,
        sources,
        stats: stats_for(&alignment),
    })
}

/// Convert an aligned FASTA stream to l-EDS text: common runs shorter than
/// `context_length` are absorbed into the neighbouring variant regions
/// unless they touch the alignment boundary.
pub fn msa_to_leds<R: BufRead + Seek>(reader: &mut R, context_length: usize) -> Result<Conversion> {
    if context_length == 0 {
        return Err(Error::argument("context length must be greater than zero"));
    }
    let (alignment, common) = scan_alignment(reader)?;
    let boundaries = leds_boundaries(&common, alignment.reference.len(), context_length);
    let (eds, sources) = emit(reader, &alignment, &common, &boundaries)?;
    Ok(Conversion {
        eds,
        sources,
        stats: stats_for(&alignment),
    })
}

fn stats_for(alignment: &Alignment) -> IngestStats {
    IngestStats {
        records: alignment.n_sequences,
        paths: alignment.n_sequences,
        ..IngestStats::default()
    }
}

/// Pass 1: read the alignment, build the common-column bit vector.
/// `common[j]` stays true only while every sequence agrees with the
/// reference at column `j` and nobody has a gap there. One extra sentinel
/// entry holds the complement of the last column.
fn scan_alignment<R: BufRead + Seek>(reader: &mut R) -> Result<(Alignment, Vec<bool>)> {
    let mut reference = String::new();
    let mut seq_starts = Vec::new();
    let mut common: Vec<bool> = Vec::new();
    let mut sequences = 0usize;
    let mut column = 0usize;
    let mut line_width = 0usize;
    let mut line = String::new();
    let mut line_start = 0usize;

    loop {
        line.clear();
        let n = reader
            .read_line(&mut line)
            .map_err(|e| Error::io("<msa>", e))?;
        if n == 0 {
            break;
        }
        let data = line.trim_end();
        if data.is_empty() {
            line_start += n;
            continue;
        }

        if data.starts_with('>') {
            if sequences == 1 {
                common = vec![true; reference.len() + 1];
            }
            if sequences >= 2 && column != reference.len() {
                return Err(Error::format(
                    line_start,
                    format!(
                        "aligned sequence has {column} columns, reference has {}",
                        reference.len()
                    ),
                ));
            }
            column = 0;
            sequences += 1;
            seq_starts.push(
                reader
                    .stream_position()
                    .map_err(|e| Error::io("<msa>", e))?,
            );
        } else if sequences == 0 {
            return Err(Error::format(line_start, "expected '>' header line"));
        } else if sequences == 1 {
            reference.push_str(data);
            if line_width == 0 {
                line_width = data.len();
            }
        } else {
            let ref_bytes = reference.as_bytes();
            for (j, b) in data.bytes().enumerate() {
                let col = column + j;
                if col >= reference.len() {
                    return Err(Error::format(
                        line_start + j,
                        format!(
                            "aligned sequence exceeds reference length {}",
                            reference.len()
                        ),
                    ));
                }
                if b != ref_bytes[col] || b == GAP {
                    common[col] = false;
                }
            }
            column += data.len();
        }
        line_start += n;
    }

    if sequences == 0 || reference.is_empty() {
        return Err(Error::format(0, "MSA has no sequences"));
    }
    if sequences == 1 {
        common = vec![true; reference.len() + 1];
    } else if column != reference.len() {
        return Err(Error::format(
            line_start,
            format!(
                "aligned sequence has {column} columns, reference has {}",
                reference.len()
            ),
        ));
    }

    let last = reference.len();
    common[last] = !common[last - 1];

    Ok((
        Alignment {
            reference,
            seq_starts,
            n_sequences: sequences,
            line_width,
        },
        common,
    ))
}

/// Pass 2, EDS mode: a boundary at every transition between common and
/// variant columns.
fn eds_boundaries(common: &[bool], columns: usize) -> Vec<usize> {
    let mut boundaries = vec![0];
    for j in 1..columns {
        if common[j] != common[j - 1] {
            boundaries.push(j);
        }
    }
    boundaries
}

/// Pass 2, l-EDS mode: walk alternating runs. A common run stands alone
/// when it is long enough or touches either end of the alignment; short
/// internal common runs merge into the surrounding variant regions.
fn leds_boundaries(common: &[bool], columns: usize, context_length: usize) -> Vec<usize> {
    let mut boundaries = Vec::new();
    let mut prev_standalone = false;
    let mut i = 0;

    while i < columns {
        let mut j = i;
        while j < columns && common[j] == common[i] {
            j += 1;
        }

        if common[i] {
            let standalone = (j - i) >= context_length || i == 0 || j == columns;
            if standalone {
                boundaries.push(i);
                prev_standalone = true;
            } else {
                if prev_standalone {
                    boundaries.push(i);
                }
                prev_standalone = false;
            }
        } else {
            if prev_standalone {
                boundaries.push(i);
            }
            prev_standalone = false;
        }
        i = j;
    }

    if boundaries.first() != Some(&0) {
        boundaries.insert(0, 0);
    }
    boundaries
}

/// Pass 3: emit one symbol per boundary region. Common regions come from
/// the in-memory reference with gaps stripped and the universal source;
/// variant regions re-read every sequence's slice by seeking, grouping
/// identical strings in order of first appearance.
fn emit<R: BufRead + Seek>(
    reader: &mut R,
    alignment: &Alignment,
    common: &[bool],
    boundaries: &[usize],
) -> Result<(String, String)> {
    let columns = alignment.reference.len();
    let mut eds = String::new();
    let mut sources = String::new();

    for (k, &start) in boundaries.iter().enumerate() {
        let end = boundaries.get(k + 1).copied().unwrap_or(columns);
        let is_common = common[start..end].iter().all(|&c| c);

        eds.push('{');
        if is_common {
            for &b in &alignment.reference.as_bytes()[start..end] {
                if b != GAP {
                    eds.push(b as char);
                }
            }
            sources.push_str("{0}");
        } else {
            let mut order: Vec<String> = Vec::new();
            let mut groups: FxHashMap<String, SourceSet> = FxHashMap::default();

            for seq_idx in 0..alignment.n_sequences {
                let slice = read_sequence_region(reader, alignment, seq_idx, start, end - start)?;
                let set = groups.entry(slice.clone()).or_insert_with(|| {
                    order.push(slice);
                    SourceSet::new()
                });
                set.insert((seq_idx + 1) as PathId);
            }

            for (v, slice) in order.iter().enumerate() {
                if v > 0 {
                    eds.push(',');
                }
                eds.push_str(slice);

                sources.push('{');
                for (p, id) in groups[slice].iter().enumerate() {
                    if p > 0 {
                        sources.push(',');
                    }
                    sources.push_str(&id.to_string());
                }
                sources.push('}');
            }
        }
        eds.push('}');
    }

    Ok((eds, sources))
}

/// Seek-and-read one sequence's columns `[start, start + len)`, stripping
/// newlines and gaps. The byte count to read accounts for the line breaks
/// crossed inside the region.
fn read_sequence_region<R: BufRead + Seek>(
    reader: &mut R,
    alignment: &Alignment,
    seq_idx: usize,
    start: usize,
    len: usize,
) -> Result<String> {
    let width = alignment.line_width;
    let offset = alignment.seq_starts[seq_idx] + (start + start / width) as u64;
    let to_read = len + ((start % width) + len) / width;

    reader
        .seek(SeekFrom::Start(offset))
        .map_err(|e| Error::io("<msa>", e))?;

    let mut out = String::new();
    let mut remaining = to_read;
    let mut buf = [0u8; 4096];
    while remaining > 0 {
        let n = reader
            .read(&mut buf[..remaining.min(4096)])
            .map_err(|e| Error::io("<msa>", e))?;
        if n == 0 {
            break;
        }
        for &b in &buf[..n] {
            if b != b'\n' && b != b'\r' && b != GAP {
                out.push(b as char);
            }
        }
        remaining -= n;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TINY: &str = ">s1\nAGTC--TCTATA\n>s2\nAGTCCCTATATA\n>s3\nAGTC--TATATA\n";

    #[test]
    fn tiny_alignment_to_eds() {
        let mut reader = Cursor::new(TINY.as_bytes());
        let conversion = msa_to_eds(&mut reader).unwrap();
        assert_eq!(conversion.eds, "{AGTC}{,CC}{T}{C,A}{TATA}");
        assert_eq!(conversion.sources, "{0}{1,3}{2}{0}{1}{2,3}{0}");
        assert_eq!(conversion.stats.records, 3);
        assert_eq!(conversion.stats.paths, 3);
    }

    #[test]
    fn tiny_alignment_to_leds() {
        let mut reader = Cursor::new(TINY.as_bytes());
        let conversion = msa_to_leds(&mut reader, 4).unwrap();
        assert_eq!(conversion.eds, "{AGTC}{TC,CCTA,TA}{TATA}");
        assert_eq!(conversion.sources, "{0}{1}{2}{3}{0}");
    }

    #[test]
    fn single_sequence_is_one_common_symbol() {
        let mut reader = Cursor::new(b">only\nACGT-ACGT\n".as_slice());
        let conversion = msa_to_eds(&mut reader).unwrap();
        assert_eq!(conversion.eds, "{ACGTACGT}");
        assert_eq!(conversion.sources, "{0}");
    }

    #[test]
    fn wrapped_lines_are_reassembled() {
        let msa = ">a\nAGTC\nAGTC\n>b\nAGTC\nAGTG\n";
        let mut reader = Cursor::new(msa.as_bytes());
        let conversion = msa_to_eds(&mut reader).unwrap();
        assert_eq!(conversion.eds, "{AGTCAGT}{C,G}");
        assert_eq!(conversion.sources, "{0}{1}{2}");
    }

    #[test]
    fn unequal_lengths_are_rejected() {
        let msa = ">a\nAGTC\n>b\nAGT\n";
        let mut reader = Cursor::new(msa.as_bytes());
        assert!(matches!(
            msa_to_eds(&mut reader),
            Err(Error::InvalidFormat { .. })
        ));
    }

    #[test]
    fn leds_keeps_boundary_runs() {
        // short leading and trailing common runs survive because they touch
        // the alignment boundary
        let msa = ">a\nAGTCAG\n>b\nACTCAG\n";
        let mut reader = Cursor::new(msa.as_bytes());
        let conversion = msa_to_leds(&mut reader, 3).unwrap();
        assert_eq!(conversion.eds, "{A}{G,C}{TCAG}");
        assert_eq!(conversion.sources, "{0}{1}{2}{0}");
    }
}
