//! Domain error types.
//!
//! These errors represent validation failures and invariant violations in
//! the domain layer. They are distinct from source, ledger and I/O errors.

use super::{SegmentId, SegmentStatus, Tick};

/// Domain-level errors for validation and data consistency.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    /// Segment ids must be non-empty
    #[error("segment id must not be empty")]
    EmptyId,

    /// A segment cannot arrive before it departs
    #[error("segment arrives at {arrive} before departing at {depart}")]
    ArrivesBeforeDeparture { depart: Tick, arrive: Tick },

    /// Prices must be finite and non-negative
    #[error("invalid price: {0}")]
    InvalidPrice(f64),

    /// Coordinates must be finite
    #[error("coordinates must be finite")]
    NonFiniteCoordinate,

    /// Consumed units can never exceed capacity
    #[error("consumed {consumed} exceeds capacity {capacity}")]
    ConsumedExceedsCapacity { consumed: u32, capacity: u32 },

    /// Not enough capacity left for an allocation
    #[error("segment {segment} has {remaining} units left, {requested} requested")]
    InsufficientCapacity {
        segment: SegmentId,
        remaining: u32,
        requested: u32,
    },

    /// Segment is not open for booking
    #[error("segment {segment} is not bookable (status {status})")]
    NotBookable {
        segment: SegmentId,
        status: SegmentStatus,
    },

    /// Status transitions may only tighten
    #[error("status cannot move from {from} to {to}")]
    StatusRegression {
        from: SegmentStatus,
        to: SegmentStatus,
    },

    /// Paths and bundles need at least one segment
    #[error("path must have at least one segment")]
    EmptyPath,
}
