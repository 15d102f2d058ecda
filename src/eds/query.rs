//! Query primitives: extraction, random pattern generation, and pointwise
//! occurrence checks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::{Error, Result};
use crate::sources::{intersect, SourceSet};

use super::Eds;

impl Eds {
    /// Locate the symbol at which a match starting at `common_pos` begins.
    ///
    /// Common positions index the concatenation of non-degenerate symbols
    /// only. A position on a symbol boundary resolves to the earliest symbol
    /// starting there, which may be degenerate (offset 0); a position inside
    /// a common block resolves to that block with its offset.
    pub(crate) fn find_symbol_at_common_position(
        &self,
        common_pos: usize,
    ) -> Result<(usize, usize)> {
        let n = self.len();
        let out_of_range = || Error::OutOfRange {
            what: "common position",
            value: common_pos,
            bound: self.metadata.num_common_chars(),
        };
        if n == 0 {
            return Err(out_of_range());
        }

        let cum = &self.metadata.cum_common_positions;
        let first_at = cum[..n].partition_point(|&c| c < common_pos);
        if first_at < n && cum[first_at] == common_pos {
            return Ok((first_at, 0));
        }
        if first_at == 0 {
            return Err(out_of_range());
        }

        let idx = first_at - 1;
        if self.metadata.is_degenerate[idx] {
            return Err(out_of_range());
        }
        let offset = common_pos - cum[idx];
        let len = self.metadata.string_lengths[self.metadata.cum_set_sizes[idx]];
        if offset >= len {
            return Err(out_of_range());
        }
        Ok((idx, offset))
    }

    /// Map a global degenerate ordinal to `(symbol index, local index)`.
    pub(crate) fn decode_degenerate_ordinal(&self, ordinal: usize) -> Result<(usize, usize)> {
        let cum = &self.metadata.cum_degenerate_counts;
        let total = *cum.last().unwrap_or(&0);
        if ordinal >= total {
            return Err(Error::OutOfRange {
                what: "degenerate ordinal",
                value: ordinal,
                bound: total,
            });
        }
        let idx = cum.partition_point(|&c| c <= ordinal) - 1;
        Ok((idx, ordinal - cum[idx]))
    }

    /// Walk symbols from `(start, offset)` consuming degenerate ordinals in
    /// order, until `limit` characters are gathered or the EDS ends.
    /// Returns the reconstructed text and the global string ids chosen.
    fn walk_span(
        &self,
        start: usize,
        offset: usize,
        ordinals: &[usize],
        limit: usize,
    ) -> Result<(String, Vec<usize>)> {
        let mut text = String::with_capacity(limit);
        let mut chosen = Vec::new();
        let mut next_ordinal = 0;

        let mut sym = start;
        while sym < self.len() && text.len() < limit {
            let alt_idx = if self.metadata.is_degenerate[sym] {
                if next_ordinal >= ordinals.len() {
                    return Err(Error::argument(format!(
                        "not enough degenerate ordinals: symbol {sym} needs ordinal {}",
                        next_ordinal + 1
                    )));
                }
                let ordinal = ordinals[next_ordinal];
                next_ordinal += 1;
                let (owner, local) = self.decode_degenerate_ordinal(ordinal)?;
                if owner != sym {
                    return Err(Error::argument(format!(
                        "degenerate ordinal {ordinal} belongs to symbol {owner}, expected {sym}"
                    )));
                }
                local
            } else {
                0
            };

            chosen.push(self.metadata.cum_set_sizes[sym] + alt_idx);
            let set = self.read_symbol(sym)?;
            let alt = &set[alt_idx];
            let skip = if sym == start { offset } else { 0 };
            if skip < alt.len() {
                let take = (limit - text.len()).min(alt.len() - skip);
                text.push_str(&alt[skip..skip + take]);
            }
            sym += 1;
        }

        if next_ordinal < ordinals.len() {
            tracing::warn!(
                supplied = ordinals.len(),
                used = next_ordinal,
                "extra degenerate ordinals ignored"
            );
        }
        Ok((text, chosen))
    }

    /// Concatenate chosen alternatives of symbols `[pos, pos + len)`. Full
    /// storage only. `choices[j]` selects the alternative of symbol
    /// `pos + j`; the range is clipped at the end of the EDS and the choice
    /// vector must match the clipped length.
    pub fn extract(&self, pos: usize, len: usize, choices: &[usize]) -> Result<String> {
        let sets = self.sets().map_err(|_| Error::ModeUnsupported {
            op: "extract",
            required: "full",
        })?;
        self.check_symbol_index(pos)?;
        if len == 0 {
            return Ok(String::new());
        }

        let end = (pos + len).min(self.len());
        if choices.len() != end - pos {
            return Err(Error::argument(format!(
                "choice vector has {} entries, range needs {}",
                choices.len(),
                end - pos
            )));
        }

        let mut out = String::new();
        for (i, &choice) in choices.iter().enumerate() {
            let set = &sets[pos + i];
            if choice >= set.len() {
                return Err(Error::OutOfRange {
                    what: "alternative index",
                    value: choice,
                    bound: set.len(),
                });
            }
            out.push_str(&set[choice]);
        }
        Ok(out)
    }

    /// Decide whether `pattern` occurs starting at the `common_pos`-th
    /// common character, resolving degenerate symbols with the supplied
    /// global ordinals. With sources attached, the choice must also have a
    /// non-empty path intersection.
    pub fn check_position(
        &self,
        common_pos: usize,
        degenerate_strings: &[usize],
        pattern: &str,
    ) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }
        if pattern.is_empty() {
            return Ok(true);
        }

        let (start, offset) = self.find_symbol_at_common_position(common_pos)?;
        let (text, chosen) = self.walk_span(start, offset, degenerate_strings, pattern.len())?;

        if let Some(sources) = &self.sources {
            let mut acc: Option<SourceSet> = None;
            for &gid in &chosen {
                let next = match &acc {
                    None => sources[gid].clone(),
                    Some(prev) => intersect(prev, &sources[gid]),
                };
                if next.is_empty() {
                    return Ok(false);
                }
                acc = Some(next);
            }
        }

        Ok(text == pattern)
    }

    /// Generate `count` random strings of exactly `pattern_length`
    /// characters, each drawn by walking the EDS from a random common
    /// position with uniformly random alternative choices. Wraps around from
    /// position 0 when the EDS runs out of characters. Works in both storage
    /// modes.
    pub fn generate_patterns(&self, count: usize, pattern_length: usize) -> Result<Vec<String>> {
        if self.is_empty() {
            return Err(Error::argument("cannot generate patterns from an empty EDS"));
        }
        if pattern_length == 0 {
            return Err(Error::argument("pattern length must be greater than zero"));
        }
        if self.total_chars() == 0 {
            return Err(Error::argument(
                "cannot generate patterns: EDS has no characters",
            ));
        }

        let mut rng = StdRng::from_entropy();
        let num_common = self.metadata.num_common_chars();
        let mut patterns = Vec::with_capacity(count);

        for _ in 0..count {
            // start positions that cannot complete in-bounds are excluded
            // unless the whole EDS is too short, where wrap-around applies
            let (start, offset) = if num_common >= pattern_length {
                self.find_symbol_at_common_position(rng.gen_range(0..=num_common - pattern_length))?
            } else if num_common > 0 {
                self.find_symbol_at_common_position(rng.gen_range(0..num_common))?
            } else {
                (0, 0)
            };

            let mut pattern = String::with_capacity(pattern_length);
            let mut sym = start;
            while sym < self.len() && pattern.len() < pattern_length {
                let set = self.read_symbol(sym)?;
                let alt = &set[rng.gen_range(0..set.len())];
                let skip = if sym == start { offset } else { 0 };
                if skip < alt.len() {
                    let take = (pattern_length - pattern.len()).min(alt.len() - skip);
                    pattern.push_str(&alt[skip..skip + take]);
                }
                sym += 1;
            }

            // wrap around from position 0 for patterns longer than the EDS
            while pattern.len() < pattern_length {
                for sym in 0..self.len() {
                    if pattern.len() >= pattern_length {
                        break;
                    }
                    let set = self.read_symbol(sym)?;
                    let alt = &set[rng.gen_range(0..set.len())];
                    let take = (pattern_length - pattern.len()).min(alt.len());
                    pattern.push_str(&alt[..take]);
                }
            }

            patterns.push(pattern);
        }

        Ok(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Eds {
        Eds::from_text("{ACGT}{A,ACA}{CGT}{T,TG}").unwrap()
    }

    #[test]
    fn extract_selects_alternatives() {
        let eds = sample();
        assert_eq!(eds.extract(0, 2, &[0, 1]).unwrap(), "ACGTACA");
        assert_eq!(eds.extract(1, 3, &[0, 0, 1]).unwrap(), "ACGTTG");
        assert_eq!(eds.extract(0, 1, &[0]).unwrap(), "ACGT");
        assert_eq!(eds.extract(2, 0, &[]).unwrap(), "");
    }

    #[test]
    fn extract_clips_at_end() {
        let eds = sample();
        assert_eq!(eds.extract(3, 5, &[1]).unwrap(), "TG");
    }

    #[test]
    fn extract_validates_arguments() {
        let eds = sample();
        assert!(matches!(
            eds.extract(4, 1, &[0]),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            eds.extract(0, 2, &[0]),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            eds.extract(1, 1, &[2]),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn find_symbol_boundary_prefers_earliest() {
        let eds = sample();
        assert_eq!(eds.find_symbol_at_common_position(0).unwrap(), (0, 0));
        assert_eq!(eds.find_symbol_at_common_position(3).unwrap(), (0, 3));
        // boundary after the first block starts at the degenerate symbol
        assert_eq!(eds.find_symbol_at_common_position(4).unwrap(), (1, 0));
        assert_eq!(eds.find_symbol_at_common_position(5).unwrap(), (2, 1));
        // end boundary starts at the trailing degenerate symbol
        assert_eq!(eds.find_symbol_at_common_position(7).unwrap(), (3, 0));
        assert!(matches!(
            eds.find_symbol_at_common_position(8),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn decode_ordinals() {
        let eds = sample();
        assert_eq!(eds.decode_degenerate_ordinal(0).unwrap(), (1, 0));
        assert_eq!(eds.decode_degenerate_ordinal(1).unwrap(), (1, 1));
        assert_eq!(eds.decode_degenerate_ordinal(2).unwrap(), (3, 0));
        assert_eq!(eds.decode_degenerate_ordinal(3).unwrap(), (3, 1));
        assert!(matches!(
            eds.decode_degenerate_ordinal(4),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn check_position_structural() {
        let eds = sample();
        assert!(eds.check_position(0, &[], "ACG").unwrap());
        assert!(eds.check_position(0, &[0], "ACGTA").unwrap());
        assert!(eds.check_position(4, &[0], "ACG").unwrap());
        assert!(eds.check_position(5, &[2], "GTT").unwrap());
        assert!(eds.check_position(5, &[3], "GTT").unwrap());
        assert!(eds.check_position(4, &[0, 2], "ACGTT").unwrap());
        assert!(eds.check_position(4, &[0, 3], "ACGTT").unwrap());
        assert!(eds.check_position(7, &[3], "TG").unwrap());

        assert!(!eds.check_position(0, &[], "XYZ").unwrap());
        assert!(!eds.check_position(0, &[], "ACGX").unwrap());
        assert!(!eds.check_position(4, &[1], "ACG").unwrap());
    }

    #[test]
    fn check_position_empty_cases() {
        let eds = sample();
        assert!(eds.check_position(0, &[], "").unwrap());
        assert!(eds.check_position(7, &[], "").unwrap());

        let empty = Eds::from_text("").unwrap();
        assert!(!empty.check_position(0, &[], "A").unwrap());
    }

    #[test]
    fn check_position_errors() {
        let eds = sample();
        assert!(matches!(
            eds.check_position(100, &[], "ACG"),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            eds.check_position(4, &[999], "ACG"),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            eds.check_position(4, &[], "ACGTT"),
            Err(Error::InvalidArgument { .. })
        ));
        // ordinal 2 belongs to symbol 3, not symbol 1
        assert!(matches!(
            eds.check_position(4, &[2], "ACG"),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn check_position_gates_on_sources() {
        let mut eds = sample();
        eds.attach_sources("{0}{1,3}{2}{0}{1}{2,3}").unwrap();
        // intersection {1,3} ∩ {0} ∩ {1} = {1}
        assert!(eds.check_position(4, &[0, 2], "ACGTT").unwrap());
        // intersection {2} ∩ {0} ∩ {1} is empty
        assert!(!eds.check_position(4, &[1, 2], "ACACGTT").unwrap());
    }

    #[test]
    fn check_position_in_metadata_only_mode() {
        use super::super::StorageMode;
        use std::io::Write as _;

        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"{ACGT}{A,ACA}{CGT}{T,TG}\n").unwrap();
        f.flush().unwrap();
        let eds = Eds::load(f.path(), StorageMode::MetadataOnly).unwrap();
        assert!(eds.check_position(0, &[], "ACG").unwrap());
        assert!(eds.check_position(4, &[0, 2], "ACGTT").unwrap());
        assert!(!eds.check_position(4, &[1], "ACG").unwrap());
    }

    #[test]
    fn generated_patterns_have_exact_length() {
        let eds = sample();
        for pattern in eds.generate_patterns(20, 5).unwrap() {
            assert_eq!(pattern.len(), 5);
        }
    }

    #[test]
    fn generated_patterns_wrap_short_eds() {
        let eds = Eds::from_text("{AC}").unwrap();
        let patterns = eds.generate_patterns(3, 9).unwrap();
        for pattern in patterns {
            // start falls on either character of the single symbol
            assert!(pattern == "ACACACACA" || pattern == "CACACACAC");
        }
    }

    #[test]
    fn generate_patterns_rejects_degenerate_inputs() {
        let empty = Eds::from_text("").unwrap();
        assert!(matches!(
            empty.generate_patterns(1, 4),
            Err(Error::InvalidArgument { .. })
        ));
        let eds = sample();
        assert!(matches!(
            eds.generate_patterns(1, 0),
            Err(Error::InvalidArgument { .. })
        ));
        let blank = Eds::from_text("{,}").unwrap();
        assert!(matches!(
            blank.generate_patterns(1, 4),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn generated_patterns_are_reconstructible() {
        let eds = Eds::from_text("{ACGT}{A,CA}{GG}{T,TG}").unwrap();
        let num_common = eds.metadata().num_common_chars();

        let mut choice_vectors: Vec<Vec<usize>> = vec![vec![]];
        for d1 in 0..2 {
            choice_vectors.push(vec![d1]);
            choice_vectors.push(vec![d1, 2]);
            choice_vectors.push(vec![d1, 3]);
        }
        choice_vectors.push(vec![2]);
        choice_vectors.push(vec![3]);

        for pattern in eds.generate_patterns(10, 5).unwrap() {
            let mut found = false;
            'search: for pos in 0..=num_common {
                for choices in &choice_vectors {
                    if let Ok(true) = eds.check_position(pos, choices, &pattern) {
                        found = true;
                        break 'search;
                    }
                }
            }
            assert!(found, "pattern {pattern:?} not reconstructible");
        }
    }
}
