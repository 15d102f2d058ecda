//! Merging of adjacent symbols.
//!
//! Without sources the merge is CARTESIAN: every concatenation of a left and
//! a right alternative, outer index first. With sources it is LINEAR: a pair
//! is kept only when its source intersection is non-empty, and the merged
//! alternative carries that intersection.

use crate::errors::{Error, Result};
use crate::sources::{intersect, SourceSet};

use super::Eds;

/// Concatenate two adjacent symbols into one. Returns the merged
/// alternatives and, when sources are supplied, their source sets. An empty
/// result means every pair was filtered out by the source algebra.
pub(crate) fn merge_symbol_pair(
    left: &[String],
    right: &[String],
    left_sources: Option<&[SourceSet]>,
    right_sources: Option<&[SourceSet]>,
) -> (Vec<String>, Option<Vec<SourceSet>>) {
    match (left_sources, right_sources) {
        (Some(ls), Some(rs)) => {
            let mut alts = Vec::new();
            let mut srcs = Vec::new();
            for (a, sa) in left.iter().zip(ls) {
                for (b, sb) in right.iter().zip(rs) {
                    let paths = intersect(sa, sb);
                    if !paths.is_empty() {
                        alts.push(format!("{a}{b}"));
                        srcs.push(paths);
                    }
                }
            }
            (alts, Some(srcs))
        }
        _ => {
            let mut alts = Vec::with_capacity(left.len() * right.len());
            for a in left {
                for b in right {
                    alts.push(format!("{a}{b}"));
                }
            }
            (alts, None)
        }
    }
}

impl Eds {
    /// Source sets of the alternatives of one symbol, when attached.
    pub(crate) fn symbol_sources(&self, pos: usize) -> Option<&[SourceSet]> {
        let sources = self.sources.as_ref()?;
        let start = self.metadata.cum_set_sizes[pos];
        Some(&sources[start..start + self.metadata.symbol_sizes[pos]])
    }

    /// Merge the adjacent symbols at `pos1` and `pos2 = pos1 + 1` into a new
    /// EDS with one fewer symbol. `self` is unchanged. The variant (CARTESIAN
    /// or LINEAR) is selected by whether sources are attached.
    pub fn merge_adjacent(&self, pos1: usize, pos2: usize) -> Result<Eds> {
        if pos2 != pos1 + 1 {
            return Err(Error::argument(format!(
                "positions {pos1} and {pos2} are not adjacent"
            )));
        }
        self.check_symbol_index(pos1)?;
        self.check_symbol_index(pos2)?;

        let sets = match &self.storage {
            super::Storage::Full(sets) => sets,
            super::Storage::MetadataOnly { .. } => {
                return Err(Error::ModeUnsupported {
                    op: "merge_adjacent",
                    required: "full",
                })
            }
        };

        let (merged, merged_sources) = merge_symbol_pair(
            &sets[pos1],
            &sets[pos2],
            self.symbol_sources(pos1),
            self.symbol_sources(pos2),
        );
        if merged.is_empty() {
            return Err(Error::EmptySetResult { pos1, pos2 });
        }

        let mut new_sets = Vec::with_capacity(self.len() - 1);
        new_sets.extend_from_slice(&sets[..pos1]);
        new_sets.push(merged);
        new_sets.extend_from_slice(&sets[pos2 + 1..]);

        let new_sources = self.sources.as_ref().map(|sources| {
            let start1 = self.metadata.cum_set_sizes[pos1];
            let end2 = self.metadata.cum_set_sizes[pos2] + self.metadata.symbol_sizes[pos2];
            let mut out = Vec::with_capacity(
                sources.len() - (end2 - start1) + merged_sources.as_ref().unwrap().len(),
            );
            out.extend_from_slice(&sources[..start1]);
            out.extend(merged_sources.unwrap());
            out.extend_from_slice(&sources[end2..]);
            out
        });

        Eds::from_parts(new_sets, new_sources)
    }
}

#[cfg(test)]
mod tests {
    use super::super::OutputFormat;
    use super::*;

    #[test]
    fn cartesian_product_order() {
        let eds = Eds::from_text("{G,C}{T}").unwrap();
        let merged = eds.merge_adjacent(0, 1).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.cardinality(), 2);
        assert_eq!(merged.sets().unwrap()[0], vec!["GT", "CT"]);
        assert!(merged.is_degenerate(0).unwrap());
    }

    #[test]
    fn cartesian_counts_are_products() {
        let eds = Eds::from_text("{T}{A,C,G}").unwrap();
        let merged = eds.merge_adjacent(0, 1).unwrap();
        assert_eq!(merged.sets().unwrap()[0], vec!["TA", "TC", "TG"]);

        let eds = Eds::from_text("{G,C}{T}{A,C}").unwrap();
        let step1 = eds.merge_adjacent(0, 1).unwrap();
        let step2 = step1.merge_adjacent(0, 1).unwrap();
        assert_eq!(step2.cardinality(), 4);
        assert_eq!(step2.sets().unwrap()[0], vec!["GTA", "GTC", "CTA", "CTC"]);
    }

    #[test]
    fn cartesian_with_empty_alternative() {
        let eds = Eds::from_text("{,A}{C}").unwrap();
        let merged = eds.merge_adjacent(0, 1).unwrap();
        assert_eq!(merged.sets().unwrap()[0], vec!["C", "AC"]);
    }

    #[test]
    fn linear_merge_filters_by_sources() {
        let eds = Eds::from_text_with_sources("{A,B}{C,D}", "{1}{2}{1}{3}").unwrap();
        let merged = eds.merge_adjacent(0, 1).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.cardinality(), 1);
        assert_eq!(merged.sets().unwrap()[0], vec!["AC"]);
        assert_eq!(
            merged.sources().unwrap()[0],
            SourceSet::from([1]),
        );
        // single surviving alternative makes the symbol non-degenerate
        assert!(!merged.is_degenerate(0).unwrap());
    }

    #[test]
    fn linear_merge_keeps_universal_semantics() {
        let eds = Eds::from_text_with_sources("{AC}{G,T}", "{0}{1}{2}").unwrap();
        let merged = eds.merge_adjacent(0, 1).unwrap();
        assert_eq!(merged.sets().unwrap()[0], vec!["ACG", "ACT"]);
        assert_eq!(merged.sources().unwrap()[0], SourceSet::from([1]));
        assert_eq!(merged.sources().unwrap()[1], SourceSet::from([2]));
    }

    #[test]
    fn linear_merge_with_no_survivors_fails() {
        let eds = Eds::from_text_with_sources("{A}{C}", "{1}{2}").unwrap();
        assert!(matches!(
            eds.merge_adjacent(0, 1),
            Err(Error::EmptySetResult { pos1: 0, pos2: 1 })
        ));
    }

    #[test]
    fn merge_is_pure_and_deterministic() {
        let eds = Eds::from_text("{AC}{G,T}{TT}").unwrap();
        let before = eds.to_text(OutputFormat::Full).unwrap();
        let a = eds.merge_adjacent(1, 2).unwrap();
        let b = eds.merge_adjacent(1, 2).unwrap();
        assert_eq!(eds.to_text(OutputFormat::Full).unwrap(), before);
        assert_eq!(
            a.to_text(OutputFormat::Full).unwrap(),
            b.to_text(OutputFormat::Full).unwrap()
        );
        assert_eq!(a.len(), 2);
        assert_eq!(a.sets().unwrap()[1], vec!["GTT", "TTT"]);
    }

    #[test]
    fn merge_rejects_bad_positions() {
        let eds = Eds::from_text("{A}{C}{G}").unwrap();
        assert!(matches!(
            eds.merge_adjacent(0, 2),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            eds.merge_adjacent(2, 3),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn merge_requires_full_storage() {
        use super::super::StorageMode;
        use std::io::Write as _;

        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"{A,B}{C}").unwrap();
        f.flush().unwrap();
        let eds = Eds::load(f.path(), StorageMode::MetadataOnly).unwrap();
        assert!(matches!(
            eds.merge_adjacent(0, 1),
            Err(Error::ModeUnsupported { .. })
        ));
    }

    #[test]
    fn merge_recomputes_metadata() {
        let mut eds = Eds::from_text("{AA}{C,G}{T,A}{GG}").unwrap();
        eds.attach_sources("{0}{1}{2}{1,2}{0}{0}").unwrap();
        let merged = eds.merge_adjacent(1, 2).unwrap();
        assert_eq!(merged.len(), 3);
        // {C,G} x {T,A} under {1}{2} x {1,2}{0}: CT{1}, CA{1}, GT{2}, GA{2}
        assert_eq!(merged.sets().unwrap()[1], vec!["CT", "CA", "GT", "GA"]);
        assert_eq!(merged.cardinality(), 6);
        let meta = merged.metadata();
        assert_eq!(meta.cum_set_sizes, vec![0, 1, 5]);
        assert_eq!(meta.cum_common_positions, vec![0, 2, 2, 4]);
        assert_eq!(meta.cum_degenerate_counts, vec![0, 0, 4, 4]);
    }
}
