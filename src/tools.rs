//! Command-shaped entry points over files.
//!
//! These back the four tool contracts: MSA → EDS/l-EDS, VCF + FASTA →
//! EDS/l-EDS, EDS → l-EDS, and statistics over an EDS file. Outputs land at
//! `<base>.eds` or `<base>_l<ℓ>.leds` plus a sibling `.seds` whenever
//! sources exist.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use crate::eds::{create_writer, Eds, OutputFormat, StorageMode};
use crate::errors::{Error, Result};
use crate::ingest::{self, Conversion, IngestStats};
use crate::metadata::Statistics;
use crate::transform::{eds_to_leds_cartesian, eds_to_leds_linear};
use crate::types::{EXT_EDS, EXT_LEDS, EXT_PATTERNS, EXT_SEDS};

/// Artifact paths for an output base: `(<base>.eds, <base>.seds)` or
/// `(<base>_l<ℓ>.leds, <base>_l<ℓ>.seds)` when a context length is given.
pub fn artifact_paths(base: &Path, context_length: Option<usize>) -> (PathBuf, PathBuf) {
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match context_length {
        None => (
            base.with_file_name(format!("{name}.{EXT_EDS}")),
            base.with_file_name(format!("{name}.{EXT_SEDS}")),
        ),
        Some(l) => (
            base.with_file_name(format!("{name}_l{l}.{EXT_LEDS}")),
            base.with_file_name(format!("{name}_l{l}.{EXT_SEDS}")),
        ),
    }
}

fn open_reader(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(
        File::open(path).map_err(|e| Error::io(path, e))?,
    ))
}

fn write_conversion(
    conversion: &Conversion,
    out_base: &Path,
    context_length: Option<usize>,
) -> Result<()> {
    let (eds_path, seds_path) = artifact_paths(out_base, context_length);

    let mut writer = create_writer(&eds_path)?;
    writeln!(writer, "{}", conversion.eds).map_err(|e| Error::io(&eds_path, e))?;
    writer.flush().map_err(|e| Error::io(&eds_path, e))?;

    if !conversion.sources.is_empty() {
        let mut writer = create_writer(&seds_path)?;
        writeln!(writer, "{}", conversion.sources).map_err(|e| Error::io(&seds_path, e))?;
        writer.flush().map_err(|e| Error::io(&seds_path, e))?;
    }
    Ok(())
}

/// MSA file → `<base>.eds` + `<base>.seds`.
pub fn msa_to_eds_files(msa: &Path, out_base: &Path) -> Result<IngestStats> {
    let mut reader = open_reader(msa)?;
    let conversion = ingest::msa_to_eds(&mut reader)?;
    write_conversion(&conversion, out_base, None)?;
    Ok(conversion.stats)
}

/// MSA file → `<base>_l<ℓ>.leds` + `<base>_l<ℓ>.seds`.
pub fn msa_to_leds_files(msa: &Path, out_base: &Path, context_length: usize) -> Result<IngestStats> {
    let mut reader = open_reader(msa)?;
    let conversion = ingest::msa_to_leds(&mut reader, context_length)?;
    write_conversion(&conversion, out_base, Some(context_length))?;
    Ok(conversion.stats)
}

/// VCF + FASTA reference → `<base>.eds` + `<base>.seds`.
pub fn vcf_to_eds_files(vcf: &Path, fasta: &Path, out_base: &Path) -> Result<IngestStats> {
    let mut vcf_reader = open_reader(vcf)?;
    let mut fasta_reader = open_reader(fasta)?;
    let conversion = ingest::vcf_to_eds(&mut vcf_reader, &mut fasta_reader)?;
    write_conversion(&conversion, out_base, None)?;
    Ok(conversion.stats)
}

/// VCF + FASTA reference → `<base>_l<ℓ>.leds` + `<base>_l<ℓ>.seds` via the
/// linear driver.
pub fn vcf_to_leds_files(
    vcf: &Path,
    fasta: &Path,
    out_base: &Path,
    context_length: usize,
    num_threads: usize,
) -> Result<IngestStats> {
    let mut vcf_reader = open_reader(vcf)?;
    let mut fasta_reader = open_reader(fasta)?;
    let conversion =
        ingest::vcf_to_leds(&mut vcf_reader, &mut fasta_reader, context_length, num_threads)?;
    write_conversion(&conversion, out_base, Some(context_length))?;
    Ok(conversion.stats)
}

/// EDS file (with optional sources) → `<base>_l<ℓ>.leds`, compact form.
/// The merge strategy follows the presence of a sources file: linear with,
/// cartesian without.
pub fn eds_to_leds_files(
    eds_path: &Path,
    seds_path: Option<&Path>,
    out_base: &Path,
    context_length: usize,
    num_threads: usize,
) -> Result<()> {
    let eds = match seds_path {
        Some(seds) => Eds::load_with_sources(eds_path, seds, StorageMode::Full)?,
        None => Eds::load(eds_path, StorageMode::Full)?,
    };

    let leds = if eds.has_sources() {
        eds_to_leds_linear(&eds, context_length, num_threads)?
    } else {
        eds_to_leds_cartesian(&eds, context_length, num_threads)?
    };

    let (out_eds, out_seds) = artifact_paths(out_base, Some(context_length));
    leds.save_to_path(&out_eds, OutputFormat::Compact)?;
    if leds.has_sources() {
        leds.save_sources_to_path(&out_seds)?;
    }
    Ok(())
}

/// EDS file → `<base>.edp`, one random pattern of `pattern_length`
/// characters per line. Metadata-only loading is enough: patterns are drawn
/// through streamed symbol reads.
pub fn generate_patterns_file(
    eds_path: &Path,
    out_base: &Path,
    count: usize,
    pattern_length: usize,
) -> Result<()> {
    let eds = Eds::load(eds_path, StorageMode::MetadataOnly)?;
    let patterns = eds.generate_patterns(count, pattern_length)?;

    let name = out_base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let out = out_base.with_file_name(format!("{name}.{EXT_PATTERNS}"));
    let mut writer = create_writer(&out)?;
    for pattern in &patterns {
        writeln!(writer, "{pattern}").map_err(|e| Error::io(&out, e))?;
    }
    writer.flush().map_err(|e| Error::io(&out, e))
}

/// Statistics over an EDS file. Loads metadata only, so the cost is
/// O(n + m) regardless of the character count.
pub fn stats_file(eds_path: &Path, seds_path: Option<&Path>) -> Result<Statistics> {
    let eds = match seds_path {
        Some(seds) => Eds::load_with_sources(eds_path, seds, StorageMode::MetadataOnly)?,
        None => Eds::load(eds_path, StorageMode::MetadataOnly)?,
    };
    Ok(eds.statistics())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_naming() {
        let (eds, seds) = artifact_paths(Path::new("out/sample"), None);
        assert_eq!(eds, Path::new("out/sample.eds"));
        assert_eq!(seds, Path::new("out/sample.seds"));

        let (leds, seds) = artifact_paths(Path::new("out/sample"), Some(7));
        assert_eq!(leds, Path::new("out/sample_l7.leds"));
        assert_eq!(seds, Path::new("out/sample_l7.seds"));
    }
}
