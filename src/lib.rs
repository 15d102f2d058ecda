//! Rust library for elastic-degenerate strings (EDS).
//!
//! # Overview
//! An elastic-degenerate string is a sequence of *symbols*, each carrying
//! one or more alternative strings; together they represent every sequence
//! obtainable by picking one alternative per symbol. EDS is a compact way to
//! hold a reference genome plus its known variation in a single object.
//!
//! This crate covers the full round trip:
//! * parse and serialize the textual EDS format (compact or bracketed) and
//!   the flat sources ("sEDS") sidecar that records which input path each
//!   alternative came from,
//! * build EDS from multiple sequence alignments ([`ingest::msa_to_eds`])
//!   and from VCF + FASTA references ([`ingest::vcf_to_eds`]),
//! * transform an EDS into an *l-EDS* whose internal common blocks are at
//!   least `ℓ` characters long ([`transform::eds_to_leds_linear`]),
//! * query it: [`Eds::extract`], [`Eds::generate_patterns`], and
//!   [`Eds::check_position`].
//!
//! ## Storage modes
//! [`Eds::load`] can keep every alternative in memory
//! ([`StorageMode::Full`]) or hold only the navigation metadata plus a
//! seekable file handle ([`StorageMode::MetadataOnly`]), re-parsing symbols
//! on demand with [`Eds::read_symbol`]. Metadata-only storage scales with
//! the number of symbols and alternatives, not with the character count.
//!
//! ## Sources
//! Each alternative may carry a set of path ids naming the sequences or
//! samples it came from; `{0}` marks an alternative shared by all paths.
//! Sources turn the cartesian merge into a linear one: combinations whose
//! path sets do not intersect are discarded, so a transformed EDS never
//! spells out haplotypes that no input exhibits.
//!
//! # Example
//! ```
//! use edstring::Eds;
//!
//! let mut eds = Eds::from_text("ACGT{A,ACA}CGT{T,TG}")?;
//! assert_eq!(eds.len(), 4);
//! assert_eq!(eds.cardinality(), 6);
//!
//! eds.attach_sources("{0}{1,3}{2}{0}{1}{2,3}")?;
//! // "ACGTT" occurs at common position 4 choosing "A" and "T",
//! // and paths {1,3} ∩ {1} witness it
//! assert!(eds.check_position(4, &[0, 2], "ACGTT")?);
//! # Ok::<(), edstring::errors::Error>(())
//! ```

pub mod errors;
pub mod ingest;
pub mod tools;
pub mod transform;

mod eds;
mod metadata;
mod sources;
mod types;

// commonly used types and functions

pub use crate::eds::*;
pub use crate::metadata::*;
pub use crate::sources::*;
pub use crate::types::*;
