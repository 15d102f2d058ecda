//! Crate-wide error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed EDS, sEDS, MSA, or VCF text.
    #[error("invalid format at byte {pos}: {reason}")]
    InvalidFormat { pos: usize, reason: String },

    /// sEDS set count does not equal the EDS cardinality.
    #[error("source count ({found}) does not match cardinality ({expected})")]
    CardinalityMismatch { found: usize, expected: usize },

    /// sEDS contained an empty path set.
    #[error("empty path set for alternative {string_id}")]
    EmptyPathSet { string_id: usize },

    /// Symbol index, degenerate ordinal, or position beyond bounds.
    #[error("{what} {value} out of range (bound {bound})")]
    OutOfRange {
        what: &'static str,
        value: usize,
        bound: usize,
    },

    /// Wrong-size choice vector, ordinal for a different symbol,
    /// non-adjacent merge request, or a driver/source mode mismatch.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Operation not available in the current storage mode.
    #[error("{op} requires {required} storage")]
    ModeUnsupported {
        op: &'static str,
        required: &'static str,
    },

    /// A linear merge left no alternative with a non-empty source
    /// intersection.
    #[error("merging symbols {pos1} and {pos2} produced no valid source combination")]
    EmptySetResult { pos1: usize, pos2: usize },

    /// The l-EDS driver hit its iteration cap.
    #[error("l-EDS transform did not converge after {iterations} iterations")]
    MergeDidNotConverge { iterations: usize },

    #[error("io error on \"{file}\": {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn format(pos: usize, reason: impl Into<String>) -> Self {
        Error::InvalidFormat {
            pos,
            reason: reason.into(),
        }
    }

    pub(crate) fn argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub(crate) fn io(file: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Error::Io {
            file: file.as_ref().display().to_string(),
            source,
        }
    }
}
