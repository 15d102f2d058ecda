//! Path-provenance sets ("sources") and their algebra.
//!
//! Each alternative of an EDS may carry a set of path ids naming the input
//! sequences or samples it came from. The id `0` is the universal marker:
//! the alternative belongs to every path.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::errors::{Error, Result};
use crate::types::{PathId, SET_CLOSE, SET_OPEN, SET_SEPARATOR};

/// Reserved path id meaning "all paths".
pub const UNIVERSAL_PATH: PathId = 0;

/// An ordered set of path ids labeling one alternative. Never empty once
/// attached to an EDS.
pub type SourceSet = BTreeSet<PathId>;

/// Convenience constructor for the universal singleton `{0}`.
pub fn universal() -> SourceSet {
    BTreeSet::from([UNIVERSAL_PATH])
}

/// Intersection with universal semantics:
/// `{0} ∩ {0} = {0}`, `{0} ∩ A = A`, otherwise plain set intersection.
///
/// An empty result means the combination is invalid and must be discarded.
pub fn intersect(a: &SourceSet, b: &SourceSet) -> SourceSet {
    let a_universal = a.contains(&UNIVERSAL_PATH);
    let b_universal = b.contains(&UNIVERSAL_PATH);

    if a_universal && b_universal {
        universal()
    } else if a_universal {
        b.clone()
    } else if b_universal {
        a.clone()
    } else {
        a.intersection(b).copied().collect()
    }
}

/// Parse the flat sEDS form `{id,id,...}{...}...` into one set per
/// alternative. `cardinality` is the `m` of the EDS the sets attach to.
pub fn parse_sources(text: &str, cardinality: usize) -> Result<Vec<SourceSet>> {
    let mut sets = Vec::new();
    let mut current: Option<SourceSet> = None;
    let mut number = String::new();

    fn push_number(set: &mut SourceSet, number: &mut String, pos: usize) -> Result<()> {
        if !number.is_empty() {
            let id = number
                .parse::<PathId>()
                .map_err(|_| Error::format(pos, format!("path id '{number}' out of range")))?;
            set.insert(id);
            number.clear();
        }
        Ok(())
    }

    for (pos, b) in text.bytes().enumerate() {
        if b.is_ascii_whitespace() {
            continue;
        }
        match (&mut current, b) {
            (None, SET_OPEN) => current = Some(SourceSet::new()),
            (None, _) => {
                return Err(Error::format(pos, "expected '{' to open a path set"));
            }
            (Some(set), SET_CLOSE) => {
                push_number(set, &mut number, pos)?;
                if set.is_empty() {
                    return Err(Error::EmptyPathSet {
                        string_id: sets.len(),
                    });
                }
                sets.push(current.take().unwrap());
            }
            (Some(set), SET_SEPARATOR) => push_number(set, &mut number, pos)?,
            (Some(_), b'0'..=b'9') => number.push(b as char),
            (Some(_), other) => {
                return Err(Error::format(
                    pos,
                    format!("invalid character '{}' in path set", other as char),
                ));
            }
        }
    }

    if current.is_some() {
        return Err(Error::format(text.len(), "unterminated path set"));
    }
    if sets.is_empty() {
        return Err(Error::format(0, "sources input is empty"));
    }
    if sets.len() != cardinality {
        return Err(Error::CardinalityMismatch {
            found: sets.len(),
            expected: cardinality,
        });
    }

    Ok(sets)
}

/// Serialize source sets back to the flat canonical form.
pub fn format_sources(sets: &[SourceSet]) -> String {
    let mut out = String::new();
    for set in sets {
        out.push(SET_OPEN as char);
        for (i, id) in set.iter().enumerate() {
            if i > 0 {
                out.push(SET_SEPARATOR as char);
            }
            let _ = write!(out, "{id}");
        }
        out.push(SET_CLOSE as char);
    }
    out
}
