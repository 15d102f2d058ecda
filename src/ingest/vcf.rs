//! VCF + FASTA reference → EDS / l-EDS conversion.
//!
//! Records are parsed, sorted by position, grouped by reference-span
//! overlap, and expanded into per-group haplotype symbols. Sample columns
//! become 1-indexed path ids; without sample columns every alternative is
//! universal.

use std::collections::BTreeSet;
use std::io::{BufRead, Seek};

use rustc_hash::FxHashMap;

use crate::eds::{Eds, OutputFormat};
use crate::errors::{Error, Result};
use crate::ingest::fasta::{index_fasta, read_fasta_region, FastaIndex};
use crate::ingest::{Conversion, IngestStats};
use crate::sources::{universal, SourceSet};
use crate::transform::eds_to_leds_linear;
use crate::types::PathId;

/// One parsed VCF data record.
#[derive(Debug, Clone)]
pub struct VcfRecord {
    pub chrom: String,
    /// 1-indexed reference position.
    pub pos: usize,
    pub ref_allele: String,
    pub alts: Vec<String>,
    /// Per-sample allele indices (0 = REF, k = k-th ALT).
    pub genotypes: Vec<Vec<usize>>,
}

/// Convert a VCF stream plus its FASTA reference to EDS text with
/// sample-level sources.
pub fn vcf_to_eds<V: BufRead, F: BufRead + Seek>(
    vcf: &mut V,
    fasta: &mut F,
) -> Result<Conversion> {
    let index = index_fasta(fasta)?;
    let mut stats = IngestStats::default();
    let mut n_samples = 0usize;
    let mut records = Vec::new();

    for line in vcf.lines() {
        let line = line.map_err(|e| Error::io("<vcf>", e))?;
        if let Some(record) = parse_vcf_line(&line, &mut n_samples, &mut stats) {
            records.push(record);
        }
    }
    stats.paths = n_samples;

    records.sort_by_key(|r| r.pos);
    let groups = build_groups(&records, fasta, &index, n_samples)?;
    let (eds, sources) = emit(fasta, &index, &groups, n_samples)?;

    Ok(Conversion {
        eds,
        sources,
        stats,
    })
}

/// Convert VCF + FASTA to l-EDS text. The variant assembly cannot see
/// context lengths ahead of time, so this is the mandatory two-stage
/// pipeline: VCF → EDS, then the linear driver.
pub fn vcf_to_leds<V: BufRead, F: BufRead + Seek>(
    vcf: &mut V,
    fasta: &mut F,
    context_length: usize,
    num_threads: usize,
) -> Result<Conversion> {
    let conversion = vcf_to_eds(vcf, fasta)?;
    let eds = Eds::from_text_with_sources(&conversion.eds, &conversion.sources)?;
    let leds = eds_to_leds_linear(&eds, context_length, num_threads)?;

    let mut sources = Vec::new();
    leds.save_sources(&mut sources)?;
    Ok(Conversion {
        eds: leds.to_text(OutputFormat::Compact)?,
        sources: String::from_utf8(sources)
            .expect("sEDS text is valid UTF-8")
            .trim_end()
            .to_string(),
        stats: conversion.stats,
    })
}

// ----- record parsing ---------------------------------------------------

/// Split an ALT field into concrete alleles. `<DEL>` becomes the empty
/// string and `<INS>` the REF sequence; any other symbolic allele fails the
/// record.
fn parse_alt_field(alt_field: &str, ref_allele: &str) -> std::result::Result<Vec<String>, String> {
    let mut alts = Vec::new();
    for alt in alt_field.split(',') {
        if alt.starts_with('<') && alt.ends_with('>') && alt.len() > 2 {
            match &alt[1..alt.len() - 1] {
                "DEL" => alts.push(String::new()),
                "INS" => alts.push(ref_allele.to_string()),
                other => return Err(format!("unsupported structural variant type <{other}>")),
            }
        } else {
            alts.push(alt.to_string());
        }
    }
    Ok(alts)
}

/// Split a GT field on `|` or `/` into allele indices; missing (`.`) and
/// malformed entries are dropped.
fn parse_genotype(gt_field: &str) -> Vec<usize> {
    gt_field
        .split(['|', '/'])
        .filter(|a| *a != ".")
        .filter_map(|a| a.parse().ok())
        .collect()
}

/// Parse one VCF line. Header lines update the sample count and yield
/// nothing; malformed or unsupported data lines are counted and skipped.
fn parse_vcf_line(
    line: &str,
    n_samples: &mut usize,
    stats: &mut IngestStats,
) -> Option<VcfRecord> {
    if line.is_empty() || line.starts_with('#') {
        if line.starts_with("#CHROM") {
            let columns = line.split_whitespace().count();
            if columns > 9 {
                *n_samples = columns - 9;
            }
        }
        return None;
    }

    stats.records += 1;

    // tab-separated per the standard, whitespace-separated as a fallback
    let mut fields: Vec<&str> = line.split('\t').filter(|f| !f.is_empty()).collect();
    if fields.len() < 5 {
        fields = line.split_whitespace().collect();
    }
    if fields.len() < 5 {
        tracing::warn!(line = %line, "skipping truncated VCF record");
        stats.skipped += 1;
        stats.warnings += 1;
        return None;
    }

    let pos = match fields[1].parse::<usize>() {
        Ok(pos) if pos > 0 => pos,
        _ => {
            tracing::warn!(pos = fields[1], "skipping VCF record with invalid position");
            stats.skipped += 1;
            stats.warnings += 1;
            return None;
        }
    };

    let ref_allele = fields[3].to_string();
    let alts = match parse_alt_field(fields[4], &ref_allele) {
        Ok(alts) => alts,
        Err(reason) => {
            tracing::warn!(chrom = fields[0], pos, reason = %reason, "skipping VCF record");
            stats.skipped += 1;
            stats.warnings += 1;
            return None;
        }
    };

    // sample columns start after FORMAT; only the GT subfield matters
    let genotypes = if fields.len() >= 10 {
        fields[9..]
            .iter()
            .map(|f| parse_genotype(f.split(':').next().unwrap_or("")))
            .collect()
    } else {
        Vec::new()
    };

    Some(VcfRecord {
        chrom: fields[0].to_string(),
        pos,
        ref_allele,
        alts,
        genotypes,
    })
}

// ----- grouping and haplotype expansion ---------------------------------

struct VariantGroup {
    /// 0-indexed reference span `[start, end)`.
    start: usize,
    end: usize,
    /// Deduplicated haplotypes, reference first.
    haplotypes: Vec<String>,
    /// Haplotype indices each sample can realize.
    sample_haplotypes: Vec<BTreeSet<usize>>,
}

/// Replace the record's REF slice inside the group span with the chosen
/// allele. Allele 0 and out-of-range indices keep the reference.
fn apply_variant(ref_span: &str, span_start: usize, record: &VcfRecord, allele: usize) -> String {
    if allele == 0 || allele > record.alts.len() {
        return ref_span.to_string();
    }
    // a REF running past the reference end leaves the span clipped
    let offset = ((record.pos - 1) - span_start).min(ref_span.len());
    let after = (offset + record.ref_allele.len()).min(ref_span.len());

    let mut haplotype = String::with_capacity(ref_span.len());
    haplotype.push_str(&ref_span[..offset]);
    haplotype.push_str(&record.alts[allele - 1]);
    haplotype.push_str(&ref_span[after..]);
    haplotype
}

/// Walk position-sorted records, opening a new group whenever the next
/// record's span does not intersect the running union of the current one.
fn build_groups<F: BufRead + Seek>(
    records: &[VcfRecord],
    fasta: &mut F,
    index: &FastaIndex,
    n_samples: usize,
) -> Result<Vec<VariantGroup>> {
    let mut groups = Vec::new();
    let mut i = 0;

    while i < records.len() {
        let start = records[i].pos - 1;
        let mut end = start + records[i].ref_allele.len();
        let mut j = i + 1;
        while j < records.len() && records[j].pos - 1 < end {
            end = end.max(records[j].pos - 1 + records[j].ref_allele.len());
            j += 1;
        }

        let members = &records[i..j];
        let ref_span = read_fasta_region(fasta, index, start, end - start)?;
        groups.push(expand_group(members, &ref_span, start, n_samples));
        i = j;
    }

    Ok(groups)
}

/// Enumerate the haplotypes reachable in one group and map each sample to
/// the haplotype indices its genotypes generate. Samples without relevant
/// calls get the reference.
fn expand_group(
    members: &[VcfRecord],
    ref_span: &str,
    span_start: usize,
    n_samples: usize,
) -> VariantGroup {
    let mut haplotypes = vec![ref_span.to_string()];
    let mut by_string: FxHashMap<String, usize> = FxHashMap::default();
    by_string.insert(ref_span.to_string(), 0);

    for record in members {
        for alt_idx in 1..=record.alts.len() {
            let haplotype = apply_variant(ref_span, span_start, record, alt_idx);
            if !by_string.contains_key(&haplotype) {
                by_string.insert(haplotype.clone(), haplotypes.len());
                haplotypes.push(haplotype);
            }
        }
    }

    let mut sample_haplotypes = vec![BTreeSet::new(); n_samples];
    for (sample, set) in sample_haplotypes.iter_mut().enumerate() {
        for record in members {
            let Some(genotype) = record.genotypes.get(sample) else {
                continue;
            };
            for &allele in genotype {
                let haplotype = apply_variant(ref_span, span_start, record, allele);
                if let Some(&idx) = by_string.get(&haplotype) {
                    set.insert(idx);
                }
            }
        }
        if set.is_empty() {
            set.insert(0);
        }
    }

    VariantGroup {
        start: span_start,
        end: span_start + ref_span.len(),
        haplotypes,
        sample_haplotypes,
    }
}

// ----- emission ---------------------------------------------------------

fn push_symbol(eds: &mut String, sources: &mut String, alts: &[(String, SourceSet)]) {
    eds.push('{');
    for (v, (alt, set)) in alts.iter().enumerate() {
        if v > 0 {
            eds.push(',');
        }
        eds.push_str(alt);

        sources.push('{');
        for (p, id) in set.iter().enumerate() {
            if p > 0 {
                sources.push(',');
            }
            sources.push_str(&id.to_string());
        }
        sources.push('}');
    }
    eds.push('}');
}

fn emit<F: BufRead + Seek>(
    fasta: &mut F,
    index: &FastaIndex,
    groups: &[VariantGroup],
    n_samples: usize,
) -> Result<(String, String)> {
    let mut eds = String::new();
    let mut sources = String::new();
    let mut current = 0usize;

    for group in groups {
        if group.start > current {
            let stretch = read_fasta_region(fasta, index, current, group.start - current)?;
            if !stretch.is_empty() {
                push_symbol(&mut eds, &mut sources, &[(stretch, universal())]);
            }
        }

        let alts: Vec<(String, SourceSet)> = if n_samples == 0 {
            group
                .haplotypes
                .iter()
                .map(|h| (h.clone(), universal()))
                .collect()
        } else {
            let mut realized: FxHashMap<usize, SourceSet> = FxHashMap::default();
            for (sample, set) in group.sample_haplotypes.iter().enumerate() {
                for &idx in set {
                    realized
                        .entry(idx)
                        .or_default()
                        .insert((sample + 1) as PathId);
                }
            }
            // unrealizable haplotypes are dropped; the reference stays first
            (0..group.haplotypes.len())
                .filter_map(|idx| {
                    realized
                        .remove(&idx)
                        .map(|samples| (group.haplotypes[idx].clone(), samples))
                })
                .collect()
        };
        push_symbol(&mut eds, &mut sources, &alts);

        current = group.end;
    }

    if current < index.len {
        let stretch = read_fasta_region(fasta, index, current, index.len - current)?;
        if !stretch.is_empty() {
            push_symbol(&mut eds, &mut sources, &[(stretch, universal())]);
        }
    }

    Ok((eds, sources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn convert(vcf: &str, fasta: &str) -> Conversion {
        let mut vcf = Cursor::new(vcf.as_bytes());
        let mut fasta = Cursor::new(fasta.as_bytes());
        vcf_to_eds(&mut vcf, &mut fasta).unwrap()
    }

    #[test]
    fn genotype_parsing() {
        assert_eq!(parse_genotype("0|0"), vec![0, 0]);
        assert_eq!(parse_genotype("0/1"), vec![0, 1]);
        assert_eq!(parse_genotype("1|2"), vec![1, 2]);
        assert_eq!(parse_genotype(".|."), Vec::<usize>::new());
        assert_eq!(parse_genotype("./1"), vec![1]);
    }

    #[test]
    fn alt_field_parsing() {
        assert_eq!(parse_alt_field("C", "A").unwrap(), vec!["C"]);
        assert_eq!(parse_alt_field("C,G", "A").unwrap(), vec!["C", "G"]);
        assert_eq!(parse_alt_field("<DEL>", "A").unwrap(), vec![""]);
        assert_eq!(parse_alt_field("<INS>", "AT").unwrap(), vec!["AT"]);
        assert!(parse_alt_field("<INV>", "A").is_err());
    }

    #[test]
    fn multi_allelic_records_merge_at_one_position() {
        let vcf = "##fileformat=VCFv4.2\nref\t2\t.\tA\tC\t.\t.\t.\nref\t2\t.\tA\tG\t.\t.\t.\n";
        let conversion = convert(vcf, ">ref\nAAAA\n");
        assert_eq!(conversion.eds, "{A}{A,C,G}{AA}");
        assert_eq!(conversion.sources, "{0}{0}{0}{0}{0}");
        assert_eq!(conversion.stats.records, 2);
        assert_eq!(conversion.stats.skipped, 0);
    }

    #[test]
    fn sample_columns_become_path_ids() {
        let vcf = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\ts1\ts2\n\
                   ref\t2\t.\tA\tC\t.\t.\t.\tGT\t0|1\t1|1\n";
        let conversion = convert(vcf, ">ref\nAAAA\n");
        assert_eq!(conversion.eds, "{A}{A,C}{AA}");
        assert_eq!(conversion.sources, "{0}{1}{1,2}{0}");
        assert_eq!(conversion.stats.paths, 2);
    }

    #[test]
    fn reference_haplotype_defaults_for_uncalled_samples() {
        let vcf = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\ts1\ts2\n\
                   ref\t2\t.\tA\tC\t.\t.\t.\tGT\t1|1\t.|.\n";
        let conversion = convert(vcf, ">ref\nAAAA\n");
        // s1 only realizes the alt; s2 has no calls and stays on reference
        assert_eq!(conversion.eds, "{A}{A,C}{AA}");
        assert_eq!(conversion.sources, "{0}{2}{1}{0}");
    }

    #[test]
    fn overlapping_spans_group_together() {
        let vcf = "ref\t2\t.\tAAA\tA\t.\t.\t.\nref\t3\t.\tA\tC\t.\t.\t.\n";
        let conversion = convert(vcf, ">ref\nGAAAG\n");
        // group spans [1, 4): haplotypes ref AAA, deletion A, snp ACA
        assert_eq!(conversion.eds, "{G}{AAA,A,ACA}{G}");
        assert_eq!(conversion.sources, "{0}{0}{0}{0}{0}");
    }

    #[test]
    fn deletion_and_insertion_alleles() {
        let vcf = "ref\t2\t.\tA\t<DEL>\t.\t.\t.\n";
        let conversion = convert(vcf, ">ref\nGAG\n");
        assert_eq!(conversion.eds, "{G}{A,}{G}");
        assert_eq!(conversion.sources, "{0}{0}{0}{0}");
    }

    #[test]
    fn unsupported_symbolic_alts_are_skipped() {
        let vcf = "ref\t2\t.\tA\t<INV>\t.\t.\t.\nref\t3\t.\tA\tC\t.\t.\t.\n";
        let conversion = convert(vcf, ">ref\nGAAG\n");
        assert_eq!(conversion.eds, "{GA}{A,C}{G}");
        assert_eq!(conversion.stats.skipped, 1);
        assert_eq!(conversion.stats.warnings, 1);
    }

    #[test]
    fn vcf_to_leds_runs_the_linear_pipeline() {
        let vcf = "ref\t2\t.\tA\tC\t.\t.\t.\nref\t4\t.\tA\tG\t.\t.\t.\n";
        let mut vcf = Cursor::new(vcf.as_bytes());
        let mut fasta = Cursor::new(b">ref\nGAGAG\n".as_slice());
        let conversion = vcf_to_leds(&mut vcf, &mut fasta, 2, 1).unwrap();
        let eds = Eds::from_text_with_sources(&conversion.eds, &conversion.sources).unwrap();
        assert!(crate::transform::is_leds(&eds, 2));
    }
}
