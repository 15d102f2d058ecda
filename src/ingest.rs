//! Streaming converters from alignment and variant formats to EDS text.
//!
//! Both converters emit a pair of texts, the EDS itself and the flat
//! sources, plus a per-call statistics record. They keep at most one
//! reference sequence in memory; everything else is re-read by seeking.

mod fasta;
mod msa;
mod vcf;

pub use fasta::*;
pub use msa::*;
pub use vcf::*;

use serde::Serialize;

/// Per-call ingestion statistics. Warnings never halt ingestion; they are
/// logged and counted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Input records processed: aligned sequences for MSA, variant records
    /// for VCF.
    pub records: usize,
    /// Records dropped (malformed lines, unsupported symbolic alleles).
    pub skipped: usize,
    /// Warnings emitted to the diagnostic sink.
    pub warnings: usize,
    /// Paths discovered: sequences for MSA, sample columns for VCF.
    pub paths: usize,
}

/// Result of one ingestion run: EDS text, flat sources text, statistics.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub eds: String,
    pub sources: String,
    pub stats: IngestStats,
}
