//! Catalog error types.

use crate::domain::DomainError;

use super::coords::CoordError;

/// Why a raw record could not be admitted to the catalog.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    /// Record is not even shaped like an offer or listing
    #[error("undecodable record: {0}")]
    Decode(String),

    /// Required field is absent
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field holds a value of the wrong type or range
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    /// A coordinate failed to parse
    #[error("invalid {field} coordinate: {source}")]
    Coordinate {
        field: &'static str,
        #[source]
        source: CoordError,
    },

    /// The decoded segment violates a domain invariant
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Errors from a segment source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// Reading the backing data failed
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// Backing data is not a JSON array of records
    #[error("malformed source data: {0}")]
    Malformed(String),
}
