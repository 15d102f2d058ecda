//! Per-symbol index data and derived statistics.

use serde::Serialize;

use crate::sources::{SourceSet, UNIVERSAL_PATH};
use crate::types::{Length, Position};

/// Navigation index kept alongside every EDS, whatever the storage mode.
///
/// `base_offsets` holds raw byte offsets into the backing text and is only
/// populated when an EDS is loaded from a seekable file.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub base_offsets: Vec<u64>,
    pub symbol_sizes: Vec<usize>,
    pub string_lengths: Vec<Length>,
    pub cum_set_sizes: Vec<usize>,
    pub is_degenerate: Vec<bool>,
    /// Common characters strictly before each symbol; `n + 1` entries.
    pub cum_common_positions: Vec<Position>,
    /// Degenerate alternatives strictly before each symbol; `n + 1` entries.
    pub cum_degenerate_counts: Vec<usize>,
}

impl Metadata {
    /// Recompute the cumulative navigation arrays from the per-symbol data.
    /// Must be called after the per-symbol vectors change.
    pub(crate) fn finalize(&mut self) {
        let n = self.symbol_sizes.len();

        self.cum_common_positions.clear();
        self.cum_common_positions.reserve(n + 1);
        self.cum_common_positions.push(0);
        let mut common = 0;
        for i in 0..n {
            if !self.is_degenerate[i] {
                common += self.string_lengths[self.cum_set_sizes[i]];
            }
            self.cum_common_positions.push(common);
        }

        self.cum_degenerate_counts.clear();
        self.cum_degenerate_counts.reserve(n + 1);
        self.cum_degenerate_counts.push(0);
        let mut degenerate = 0;
        for i in 0..n {
            if self.is_degenerate[i] {
                degenerate += self.symbol_sizes[i];
            }
            self.cum_degenerate_counts.push(degenerate);
        }
    }

    /// Total characters in non-degenerate symbols.
    pub fn num_common_chars(&self) -> usize {
        *self.cum_common_positions.last().unwrap_or(&0)
    }
}

/// Operational statistics over an EDS, computed from the metadata alone.
/// The path fields are zero unless sources are attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub num_symbols: usize,
    pub cardinality: usize,
    pub total_chars: usize,
    pub min_context_length: Length,
    pub max_context_length: Length,
    pub avg_context_length: f64,
    pub num_degenerate_symbols: usize,
    pub num_common_chars: usize,
    pub total_change_size: usize,
    pub num_empty_strings: usize,
    pub num_paths: usize,
    pub max_paths_per_string: usize,
    pub avg_paths_per_string: f64,
}

impl Statistics {
    pub(crate) fn compute(
        metadata: &Metadata,
        total_chars: usize,
        sources: Option<&[SourceSet]>,
    ) -> Self {
        let n = metadata.symbol_sizes.len();
        let m = metadata.string_lengths.len();

        let mut min_context = Length::MAX;
        let mut max_context = 0;
        let mut context_total = 0usize;
        let mut context_blocks = 0usize;
        let mut degenerate_symbols = 0usize;
        let mut change_size = 0usize;

        for i in 0..n {
            if metadata.is_degenerate[i] {
                degenerate_symbols += 1;
                change_size += metadata.symbol_sizes[i] - 1;
            } else {
                let len = metadata.string_lengths[metadata.cum_set_sizes[i]];
                min_context = min_context.min(len);
                max_context = max_context.max(len);
                context_total += len;
                context_blocks += 1;
            }
        }

        let num_empty_strings = metadata.string_lengths.iter().filter(|&&l| l == 0).count();

        let (num_paths, max_paths, avg_paths) = match sources {
            Some(sets) if !sets.is_empty() => {
                let mut all = SourceSet::new();
                let mut total = 0usize;
                let mut max = 0usize;
                for set in sets {
                    total += set.len();
                    max = max.max(set.len());
                    all.extend(set.iter().copied());
                }
                all.remove(&UNIVERSAL_PATH);
                (all.len(), max, total as f64 / sets.len() as f64)
            }
            _ => (0, 0, 0.0),
        };

        Statistics {
            num_symbols: n,
            cardinality: m,
            total_chars,
            min_context_length: if min_context == Length::MAX {
                0
            } else {
                min_context
            },
            max_context_length: max_context,
            avg_context_length: if context_blocks > 0 {
                context_total as f64 / context_blocks as f64
            } else {
                0.0
            },
            num_degenerate_symbols: degenerate_symbols,
            num_common_chars: metadata.num_common_chars(),
            total_change_size: change_size,
            num_empty_strings,
            num_paths,
            max_paths_per_string: max_paths,
            avg_paths_per_string: avg_paths,
        }
    }
}

impl Statistics {
    /// Machine-readable form of the record.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).expect("statistics always serialize")
    }
}

impl std::fmt::Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Structure:")?;
        writeln!(f, "  Number of symbols (n):  {}", self.num_symbols)?;
        writeln!(f, "  Total characters (N):   {}", self.total_chars)?;
        writeln!(f, "  Total strings (m):      {}", self.cardinality)?;
        writeln!(f, "  Degenerate symbols:     {}", self.num_degenerate_symbols)?;
        writeln!(f, "Context lengths:")?;
        writeln!(f, "  Minimum:                {}", self.min_context_length)?;
        writeln!(f, "  Maximum:                {}", self.max_context_length)?;
        writeln!(f, "  Average:                {:.2}", self.avg_context_length)?;
        writeln!(f, "Variation:")?;
        writeln!(f, "  Total change size:      {}", self.total_change_size)?;
        writeln!(f, "  Common characters:      {}", self.num_common_chars)?;
        writeln!(f, "  Empty strings:          {}", self.num_empty_strings)?;
        if self.num_paths > 0 {
            writeln!(f, "Paths:")?;
            writeln!(f, "  Distinct paths:         {}", self.num_paths)?;
            writeln!(f, "  Max paths per string:   {}", self.max_paths_per_string)?;
            writeln!(f, "  Avg paths per string:   {:.2}", self.avg_paths_per_string)?;
        }
        Ok(())
    }
}
