//! EDS → l-EDS conversion.
//!
//! An EDS is an l-EDS for context length `ℓ` when every internal
//! non-degenerate symbol is at least `ℓ` characters long and no two adjacent
//! symbols are both degenerate. The first and last symbols are exempt.
//!
//! The driver repairs violations by repeatedly merging independent adjacent
//! pairs until the predicate holds. Pair selection is greedy left-to-right
//! and never picks overlapping pairs, so the merges of one iteration can run
//! on a bounded pool of scoped threads; reconstruction is sequential.

use std::fmt::Write as _;
use std::thread;

use crate::eds::{merge_symbol_pair, Eds, StorageMode};
use crate::errors::{Error, Result};
use crate::metadata::Metadata;
use crate::sources::{format_sources, SourceSet};
use crate::types::{SET_CLOSE, SET_OPEN, SET_SEPARATOR};

/// Iteration cap for the fixed-point loop. Convergence normally takes
/// O(n/ℓ) iterations since every iteration strictly reduces `n`.
pub const MAX_ITERATIONS: usize = 10_000;

/// Check the l-EDS predicate for `context_length`. Every EDS is a 0-EDS.
pub fn is_leds(eds: &Eds, context_length: usize) -> bool {
    if context_length == 0 {
        return true;
    }
    let meta = eds.metadata();
    let n = eds.len();

    for i in 0..n {
        if !meta.is_degenerate[i] && i > 0 && i < n - 1 {
            let len = meta.string_lengths[meta.cum_set_sizes[i]];
            if len < context_length {
                return false;
            }
        }
        // adjacent degenerate symbols enclose an implicit empty common block
        if i + 1 < n && meta.is_degenerate[i] && meta.is_degenerate[i + 1] {
            return false;
        }
    }
    true
}

/// Convert to an l-EDS with source-aware (LINEAR) merging. Requires
/// attached sources and full storage. The input is unchanged.
pub fn eds_to_leds_linear(eds: &Eds, context_length: usize, num_threads: usize) -> Result<Eds> {
    if !eds.has_sources() {
        return Err(Error::argument(
            "linear transform requires sources; use the cartesian transform instead",
        ));
    }
    run_driver(eds, context_length, num_threads)
}

/// Convert to an l-EDS with all-combinations (CARTESIAN) merging. Rejects
/// inputs with sources. The input is unchanged.
pub fn eds_to_leds_cartesian(eds: &Eds, context_length: usize, num_threads: usize) -> Result<Eds> {
    if eds.has_sources() {
        return Err(Error::argument(
            "cartesian transform cannot be used with sources; use the linear transform",
        ));
    }
    run_driver(eds, context_length, num_threads)
}

fn run_driver(eds: &Eds, context_length: usize, num_threads: usize) -> Result<Eds> {
    if context_length == 0 {
        return Err(Error::argument("context length must be greater than zero"));
    }
    if eds.mode() != StorageMode::Full {
        return Err(Error::ModeUnsupported {
            op: "eds_to_leds",
            required: "full",
        });
    }

    let mut current: Option<Eds> = None;
    for _ in 0..MAX_ITERATIONS {
        let view = current.as_ref().unwrap_or(eds);
        if is_leds(view, context_length) {
            break;
        }

        let pairs = select_independent_pairs(view, context_length);
        if pairs.is_empty() {
            // only exempt boundary violations remain
            break;
        }

        let merged = merge_pairs(view, &pairs, num_threads)?;
        current = Some(reconstruct(view, merged)?);
    }

    match current {
        Some(result) => {
            if !is_leds(&result, context_length) && !select_independent_pairs(&result, context_length).is_empty() {
                return Err(Error::MergeDidNotConverge {
                    iterations: MAX_ITERATIONS,
                });
            }
            Ok(result)
        }
        // input already satisfied the predicate; hand back a fresh copy
        None => clone_full(eds),
    }
}

/// Left indices of non-overlapping adjacent pairs whose merge repairs a
/// violation: a too-short internal common block on either side, or two
/// adjacent degenerate symbols.
fn select_independent_pairs(eds: &Eds, context_length: usize) -> Vec<usize> {
    let meta = eds.metadata();
    let n = eds.len();
    let mut pairs = Vec::new();
    if n < 2 {
        return pairs;
    }

    let short_internal = |i: usize| {
        !meta.is_degenerate[i]
            && i > 0
            && i < n - 1
            && meta.string_lengths[meta.cum_set_sizes[i]] < context_length
    };

    let mut used = vec![false; n];
    for i in 0..n - 1 {
        if used[i] || used[i + 1] {
            continue;
        }
        if short_internal(i)
            || short_internal(i + 1)
            || (meta.is_degenerate[i] && meta.is_degenerate[i + 1])
        {
            pairs.push(i);
            used[i] = true;
            used[i + 1] = true;
        }
    }
    pairs
}

struct MergedSymbol {
    pos: usize,
    alts: Vec<String>,
    sources: Option<Vec<SourceSet>>,
}

fn symbol_sources_at<'a>(
    sources: Option<&'a [SourceSet]>,
    meta: &Metadata,
    pos: usize,
) -> Option<&'a [SourceSet]> {
    sources.map(|s| {
        let start = meta.cum_set_sizes[pos];
        &s[start..start + meta.symbol_sizes[pos]]
    })
}

/// Merge every selected pair. The pairs are disjoint, so with
/// `num_threads > 1` they are chunked over scoped worker threads; the input
/// is only read. Results come back in pair order either way.
fn merge_pairs(eds: &Eds, pairs: &[usize], num_threads: usize) -> Result<Vec<MergedSymbol>> {
    let sets = eds.sets()?;
    let sources = eds.sources();
    let meta = eds.metadata();

    let merge_one = |&pos: &usize| -> Result<MergedSymbol> {
        let (alts, merged_sources) = merge_symbol_pair(
            &sets[pos],
            &sets[pos + 1],
            symbol_sources_at(sources, meta, pos),
            symbol_sources_at(sources, meta, pos + 1),
        );
        if alts.is_empty() {
            return Err(Error::EmptySetResult {
                pos1: pos,
                pos2: pos + 1,
            });
        }
        Ok(MergedSymbol {
            pos,
            alts,
            sources: merged_sources,
        })
    };

    if num_threads <= 1 || pairs.len() < 2 {
        return pairs.iter().map(merge_one).collect();
    }

    let merge_one = &merge_one;
    let chunk_size = pairs.len().div_ceil(num_threads);
    thread::scope(|scope| {
        let handles: Vec<_> = pairs
            .chunks(chunk_size)
            .map(|chunk| scope.spawn(move || chunk.iter().map(merge_one).collect::<Result<Vec<_>>>()))
            .collect();

        let mut out = Vec::with_capacity(pairs.len());
        for handle in handles {
            out.extend(handle.join().expect("merge worker panicked")?);
        }
        Ok(out)
    })
}

fn write_symbol(out: &mut String, alts: &[String]) {
    out.push(SET_OPEN as char);
    for (i, alt) in alts.iter().enumerate() {
        if i > 0 {
            out.push(SET_SEPARATOR as char);
        }
        out.push_str(alt);
    }
    out.push(SET_CLOSE as char);
}

/// Build the next-iteration EDS from untouched symbols plus the merged
/// replacements, by re-serializing and reparsing.
fn reconstruct(eds: &Eds, merged: Vec<MergedSymbol>) -> Result<Eds> {
    let n = eds.len();
    let mut replacement: Vec<Option<MergedSymbol>> = (0..n).map(|_| None).collect();
    let mut absorbed = vec![false; n];
    for symbol in merged {
        let pos = symbol.pos;
        absorbed[pos + 1] = true;
        replacement[pos] = Some(symbol);
    }

    let sets = eds.sets()?;
    let sources = eds.sources();
    let meta = eds.metadata();
    let mut eds_text = String::new();
    let mut seds_text = String::new();

    for pos in 0..n {
        if absorbed[pos] {
            continue;
        }
        match &replacement[pos] {
            Some(symbol) => {
                write_symbol(&mut eds_text, &symbol.alts);
                if let Some(merged_sources) = &symbol.sources {
                    let _ = write!(seds_text, "{}", format_sources(merged_sources));
                }
            }
            None => {
                write_symbol(&mut eds_text, &sets[pos]);
                if let Some(slice) = symbol_sources_at(sources, meta, pos) {
                    let _ = write!(seds_text, "{}", format_sources(slice));
                }
            }
        }
    }

    if sources.is_some() {
        Eds::from_text_with_sources(&eds_text, &seds_text)
    } else {
        Eds::from_text(&eds_text)
    }
}

fn clone_full(eds: &Eds) -> Result<Eds> {
    Eds::from_parts(eds.sets()?.to_vec(), eds.sources().map(|s| s.to_vec()))
}
