//! Domain types for the mobility marketplace.
//!
//! This module contains the core domain model types that represent
//! validated marketplace data. All types enforce their invariants at
//! construction time, so code that receives these types can trust their
//! validity.

mod error;
mod ids;
mod point;
mod segment;
mod tick;

pub use error::DomainError;
pub use ids::{RequestId, ReservationId, TxId};
pub use point::{NodeId, Point};
pub use segment::{
    Capacity, Mode, PricingParams, Segment, SegmentDraft, SegmentId, SegmentKind, SegmentStatus,
};
pub use tick::{Tick, TickWindow};
