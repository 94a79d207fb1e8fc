//! Capacity segments.
//!
//! A `Segment` is one provider's time-boxed offer to carry travelers between
//! two points. Segments are validated once, when the catalog admits them;
//! everything downstream trusts the invariants below.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{DomainError, NodeId, Point, Tick};

/// Identifier of a segment, unique within the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    /// Create a segment id. Empty (or all-whitespace) ids are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(DomainError::EmptyId);
        }
        if trimmed.len() == id.len() {
            Ok(Self(id))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Travel mode of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Bus,
    Rail,
    Tram,
    Ferry,
    Car,
    Taxi,
    Bike,
    Scooter,
    Walk,
    Other,
}

impl Mode {
    /// Parse a mode name leniently. Unknown names map to `Other`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "bus" => Mode::Bus,
            "rail" | "train" => Mode::Rail,
            "tram" | "light_rail" => Mode::Tram,
            "ferry" | "boat" => Mode::Ferry,
            "car" | "carpool" | "rideshare" => Mode::Car,
            "taxi" | "cab" => Mode::Taxi,
            "bike" | "bicycle" => Mode::Bike,
            "scooter" => Mode::Scooter,
            "walk" => Mode::Walk,
            _ => Mode::Other,
        }
    }
}

/// Booking status of a segment.
///
/// Status only tightens: `Available → Reserved → SoldOut`, and any unsold
/// status may move to `Expired`. The single way back is a capacity release,
/// which is the cancellation path used by ledger rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Available,
    Reserved,
    SoldOut,
    Expired,
}

impl SegmentStatus {
    /// Parse a status name. Returns `None` for unknown names.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" | "open" => Some(Self::Available),
            "reserved" => Some(Self::Reserved),
            "sold_out" | "soldout" | "sold" => Some(Self::SoldOut),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Available => 0,
            Self::Reserved => 1,
            Self::SoldOut => 2,
            Self::Expired => 3,
        }
    }

    /// Returns true if moving from `self` to `next` keeps or tightens status.
    pub fn can_tighten_to(self, next: SegmentStatus) -> bool {
        next.rank() >= self.rank()
    }

    /// The tighter of two statuses.
    pub fn tightest(self, other: SegmentStatus) -> SegmentStatus {
        if other.rank() > self.rank() { other } else { self }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::SoldOut => "sold_out",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seats (or vehicles, or docks) a segment can sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capacity {
    Limited(u32),
    Unbounded,
}

/// Dynamic-pricing parameters attached to a resale listing.
///
/// Carried through the catalog for the external pricing process; the engine
/// never evaluates them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PricingParams {
    pub start_price: Option<f64>,
    pub floor_price: Option<f64>,
    pub decay_per_tick: Option<f64>,
}

/// What published a segment, and who owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentKind {
    /// Scheduled capacity published by a transport provider.
    Offer { provider: String },
    /// Capacity resold on the secondary market.
    Listing {
        seller: String,
        pricing: Option<PricingParams>,
    },
    /// Synthetic walking edge injected by the graph builder.
    Walk,
}

impl SegmentKind {
    pub fn label(&self) -> &'static str {
        match self {
            SegmentKind::Offer { .. } => "offer",
            SegmentKind::Listing { .. } => "listing",
            SegmentKind::Walk => "walk",
        }
    }
}

/// A validated capacity segment.
///
/// # Invariants
///
/// - `arrive >= depart`
/// - `price` is finite and non-negative
/// - endpoints are finite
/// - `consumed <= capacity` for limited capacity
/// - a segment with `consumed == capacity` is `SoldOut`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    id: SegmentId,
    mode: Mode,
    origin: Point,
    destination: Point,
    depart: Tick,
    arrive: Tick,
    price: f64,
    capacity: Capacity,
    consumed: u32,
    status: SegmentStatus,
    kind: SegmentKind,
}

/// Unvalidated segment fields, turned into a `Segment` by [`SegmentDraft::build`].
///
/// # Examples
///
/// ```
/// use mobility_engine::domain::{Capacity, Point, SegmentDraft, Tick};
///
/// let segment = SegmentDraft::offer("a-b", "metro", Point::new(0.0, 0.0), Point::new(10.0, 0.0))
///     .times(Tick::new(10), Tick::new(20))
///     .price(5.0)
///     .capacity(Capacity::Limited(1))
///     .build()
///     .unwrap();
///
/// assert_eq!(segment.duration(), 10);
/// assert!(segment.is_bookable());
/// ```
#[derive(Debug, Clone)]
pub struct SegmentDraft {
    pub id: String,
    pub mode: Mode,
    pub origin: Point,
    pub destination: Point,
    pub depart: Tick,
    pub arrive: Tick,
    pub price: f64,
    pub capacity: Capacity,
    pub consumed: u32,
    pub status: SegmentStatus,
    pub kind: SegmentKind,
}

impl SegmentDraft {
    /// Start a provider offer with one seat, zero price and zero duration.
    pub fn offer(
        id: impl Into<String>,
        provider: impl Into<String>,
        origin: Point,
        destination: Point,
    ) -> Self {
        Self {
            id: id.into(),
            mode: Mode::Other,
            origin,
            destination,
            depart: Tick::default(),
            arrive: Tick::default(),
            price: 0.0,
            capacity: Capacity::Limited(1),
            consumed: 0,
            status: SegmentStatus::Available,
            kind: SegmentKind::Offer {
                provider: provider.into(),
            },
        }
    }

    /// Start a resale listing with one seat.
    pub fn listing(
        id: impl Into<String>,
        seller: impl Into<String>,
        origin: Point,
        destination: Point,
    ) -> Self {
        Self {
            kind: SegmentKind::Listing {
                seller: seller.into(),
                pricing: None,
            },
            ..Self::offer(id, String::new(), origin, destination)
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn times(mut self, depart: Tick, arrive: Tick) -> Self {
        self.depart = depart;
        self.arrive = arrive;
        self
    }

    pub fn price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn consumed(mut self, consumed: u32) -> Self {
        self.consumed = consumed;
        self
    }

    pub fn status(mut self, status: SegmentStatus) -> Self {
        self.status = status;
        self
    }

    /// Validate the draft.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the id is empty, times are reversed, the price is
    /// negative or non-finite, an endpoint is non-finite, or more units are
    /// consumed than exist.
    pub fn build(self) -> Result<Segment, DomainError> {
        let id = SegmentId::new(self.id)?;

        if self.arrive < self.depart {
            return Err(DomainError::ArrivesBeforeDeparture {
                depart: self.depart,
                arrive: self.arrive,
            });
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(DomainError::InvalidPrice(self.price));
        }
        if !self.origin.is_finite() || !self.destination.is_finite() {
            return Err(DomainError::NonFiniteCoordinate);
        }

        let mut status = self.status;
        if let Capacity::Limited(capacity) = self.capacity {
            if self.consumed > capacity {
                return Err(DomainError::ConsumedExceedsCapacity {
                    consumed: self.consumed,
                    capacity,
                });
            }
            if self.consumed == capacity {
                status = status.tightest(SegmentStatus::SoldOut);
            } else if self.consumed > 0 {
                status = status.tightest(SegmentStatus::Reserved);
            }
        }

        Ok(Segment {
            id,
            mode: self.mode,
            origin: self.origin,
            destination: self.destination,
            depart: self.depart,
            arrive: self.arrive,
            price: self.price,
            capacity: self.capacity,
            consumed: self.consumed,
            status,
            kind: self.kind,
        })
    }
}

impl Segment {
    /// Build a synthetic walk between two points.
    ///
    /// The id depends only on the quantized endpoints, so the same walk gets
    /// the same id whenever it is injected.
    pub fn walk(from: Point, to: Point, depart: Tick, duration: i64) -> Self {
        let id = format!("walk:{}->{}", from.quantize(), to.quantize());
        Segment {
            id: SegmentId(id),
            mode: Mode::Walk,
            origin: from,
            destination: to,
            depart,
            arrive: depart + duration.max(0),
            price: 0.0,
            capacity: Capacity::Unbounded,
            consumed: 0,
            status: SegmentStatus::Available,
            kind: SegmentKind::Walk,
        }
    }

    pub fn id(&self) -> &SegmentId {
        &self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn destination(&self) -> Point {
        self.destination
    }

    /// Graph node of the origin.
    pub fn origin_node(&self) -> NodeId {
        self.origin.quantize()
    }

    /// Graph node of the destination.
    pub fn destination_node(&self) -> NodeId {
        self.destination.quantize()
    }

    pub fn depart(&self) -> Tick {
        self.depart
    }

    pub fn arrive(&self) -> Tick {
        self.arrive
    }

    /// Scheduled duration in ticks.
    pub fn duration(&self) -> i64 {
        self.arrive - self.depart
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    pub fn status(&self) -> SegmentStatus {
        self.status
    }

    pub fn kind(&self) -> &SegmentKind {
        &self.kind
    }

    /// Provider or seller that owns the segment. Walks have no owner.
    pub fn owner(&self) -> Option<&str> {
        match &self.kind {
            SegmentKind::Offer { provider } => Some(provider),
            SegmentKind::Listing { seller, .. } => Some(seller),
            SegmentKind::Walk => None,
        }
    }

    pub fn is_walk(&self) -> bool {
        matches!(self.kind, SegmentKind::Walk)
    }

    /// Units left to sell. `None` means unbounded.
    pub fn remaining(&self) -> Option<u32> {
        match self.capacity {
            Capacity::Limited(capacity) => Some(capacity - self.consumed),
            Capacity::Unbounded => None,
        }
    }

    /// Returns true if the segment can still be sold.
    pub fn is_bookable(&self) -> bool {
        matches!(
            self.status,
            SegmentStatus::Available | SegmentStatus::Reserved
        ) && self.remaining().is_none_or(|left| left > 0)
    }

    /// Returns a copy of this segment shifted to depart at `depart`,
    /// keeping its duration. Used to place walks on the timeline.
    pub fn retimed(&self, depart: Tick) -> Segment {
        let duration = self.duration();
        Segment {
            depart,
            arrive: depart + duration,
            ..self.clone()
        }
    }

    /// Allocate `units` of capacity.
    ///
    /// # Errors
    ///
    /// Fails without changing anything if the segment is not bookable or
    /// does not have `units` left.
    pub(crate) fn allocate(&mut self, units: u32) -> Result<(), DomainError> {
        if !self.is_bookable() {
            return Err(DomainError::NotBookable {
                segment: self.id.clone(),
                status: self.status,
            });
        }
        match self.capacity {
            Capacity::Unbounded => Ok(()),
            Capacity::Limited(capacity) => {
                let remaining = capacity - self.consumed;
                if units > remaining {
                    return Err(DomainError::InsufficientCapacity {
                        segment: self.id.clone(),
                        remaining,
                        requested: units,
                    });
                }
                self.consumed += units;
                self.status = if self.consumed == capacity {
                    SegmentStatus::SoldOut
                } else {
                    SegmentStatus::Reserved
                };
                Ok(())
            }
        }
    }

    /// Return `units` of previously allocated capacity.
    ///
    /// This is the cancellation path: it is the only operation that loosens
    /// status. Expired segments stay expired.
    pub(crate) fn release(&mut self, units: u32) {
        if let Capacity::Limited(_) = self.capacity {
            self.consumed = self.consumed.saturating_sub(units);
            if self.status != SegmentStatus::Expired {
                self.status = if self.consumed == 0 {
                    SegmentStatus::Available
                } else {
                    SegmentStatus::Reserved
                };
            }
        }
    }

    /// Move to a tighter status.
    ///
    /// # Errors
    ///
    /// Returns `StatusRegression` if `next` would loosen the status.
    pub(crate) fn tighten(&mut self, next: SegmentStatus) -> Result<(), DomainError> {
        if !self.status.can_tighten_to(next) {
            return Err(DomainError::StatusRegression {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Merge a freshly published copy of this segment into the live record.
    ///
    /// Live allocation state wins: status only tightens and consumed never
    /// decreases.
    pub(crate) fn absorb(&mut self, published: &Segment) {
        if let (Capacity::Limited(capacity), Capacity::Limited(_)) =
            (self.capacity, published.capacity)
        {
            self.consumed = self.consumed.max(published.consumed).min(capacity);
            if self.consumed == capacity {
                self.status = self.status.tightest(SegmentStatus::SoldOut);
            }
        }
        self.status = self.status.tightest(published.status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> SegmentDraft {
        SegmentDraft::offer("s1", "metro", Point::new(0.0, 0.0), Point::new(10.0, 0.0))
            .times(Tick::new(10), Tick::new(20))
            .price(5.0)
            .capacity(Capacity::Limited(2))
    }

    #[test]
    fn build_valid() {
        let s = draft().build().unwrap();
        assert_eq!(s.id().as_str(), "s1");
        assert_eq!(s.duration(), 10);
        assert_eq!(s.remaining(), Some(2));
        assert_eq!(s.owner(), Some("metro"));
        assert_eq!(s.origin_node(), NodeId::new(0, 0));
        assert_eq!(s.destination_node(), NodeId::new(10, 0));
    }

    #[test]
    fn build_rejects_reversed_times() {
        let err = draft()
            .times(Tick::new(20), Tick::new(10))
            .build()
            .unwrap_err();
        assert!(matches!(err, DomainError::ArrivesBeforeDeparture { .. }));
    }

    #[test]
    fn build_rejects_negative_price() {
        assert!(matches!(
            draft().price(-1.0).build(),
            Err(DomainError::InvalidPrice(_))
        ));
        assert!(matches!(
            draft().price(f64::NAN).build(),
            Err(DomainError::InvalidPrice(_))
        ));
    }

    #[test]
    fn build_rejects_blank_id() {
        let mut d = draft();
        d.id = "   ".into();
        assert_eq!(d.build().unwrap_err(), DomainError::EmptyId);
    }

    #[test]
    fn build_rejects_overconsumed() {
        let err = draft().consumed(3).build().unwrap_err();
        assert_eq!(
            err,
            DomainError::ConsumedExceedsCapacity {
                consumed: 3,
                capacity: 2
            }
        );
    }

    #[test]
    fn build_derives_status_from_consumed() {
        let s = draft().consumed(2).build().unwrap();
        assert_eq!(s.status(), SegmentStatus::SoldOut);
        assert!(!s.is_bookable());

        let s = draft().consumed(1).build().unwrap();
        assert_eq!(s.status(), SegmentStatus::Reserved);
        assert!(s.is_bookable());
    }

    #[test]
    fn zero_capacity_is_sold_out() {
        let s = draft().capacity(Capacity::Limited(0)).build().unwrap();
        assert_eq!(s.status(), SegmentStatus::SoldOut);
        assert!(!s.is_bookable());
    }

    #[test]
    fn allocate_until_sold_out() {
        let mut s = draft().build().unwrap();
        s.allocate(1).unwrap();
        assert_eq!(s.status(), SegmentStatus::Reserved);
        s.allocate(1).unwrap();
        assert_eq!(s.status(), SegmentStatus::SoldOut);
        assert_eq!(s.consumed(), 2);

        let err = s.allocate(1).unwrap_err();
        assert!(matches!(err, DomainError::NotBookable { .. }));
        assert_eq!(s.consumed(), 2);
    }

    #[test]
    fn allocate_more_than_remaining_changes_nothing() {
        let mut s = draft().build().unwrap();
        let err = s.allocate(3).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InsufficientCapacity {
                remaining: 2,
                requested: 3,
                ..
            }
        ));
        assert_eq!(s.consumed(), 0);
        assert_eq!(s.status(), SegmentStatus::Available);
    }

    #[test]
    fn release_reopens() {
        let mut s = draft().capacity(Capacity::Limited(1)).build().unwrap();
        s.allocate(1).unwrap();
        assert_eq!(s.status(), SegmentStatus::SoldOut);
        s.release(1);
        assert_eq!(s.status(), SegmentStatus::Available);
        assert_eq!(s.consumed(), 0);
    }

    #[test]
    fn release_keeps_expired() {
        let mut s = draft().build().unwrap();
        s.allocate(1).unwrap();
        s.tighten(SegmentStatus::Expired).unwrap();
        s.release(1);
        assert_eq!(s.status(), SegmentStatus::Expired);
    }

    #[test]
    fn tighten_rejects_regression() {
        let mut s = draft().build().unwrap();
        s.tighten(SegmentStatus::SoldOut).unwrap();
        let err = s.tighten(SegmentStatus::Available).unwrap_err();
        assert!(matches!(err, DomainError::StatusRegression { .. }));
    }

    #[test]
    fn absorb_never_loosens() {
        let mut live = draft().build().unwrap();
        live.allocate(1).unwrap();

        let published = draft().build().unwrap();
        live.absorb(&published);
        assert_eq!(live.consumed(), 1);
        assert_eq!(live.status(), SegmentStatus::Reserved);

        let sold = draft().status(SegmentStatus::SoldOut).build().unwrap();
        live.absorb(&sold);
        assert_eq!(live.status(), SegmentStatus::SoldOut);
    }

    #[test]
    fn walk_is_unbounded_and_free() {
        let w = Segment::walk(Point::new(0.2, 0.0), Point::new(3.0, 4.0), Tick::new(5), 10);
        assert!(w.is_walk());
        assert_eq!(w.id().as_str(), "walk:0,0->3,4");
        assert_eq!(w.price(), 0.0);
        assert_eq!(w.remaining(), None);
        assert_eq!(w.arrive(), Tick::new(15));
        assert!(w.is_bookable());
        assert_eq!(w.owner(), None);
    }

    #[test]
    fn retimed_keeps_duration_and_id() {
        let w = Segment::walk(Point::new(0.0, 0.0), Point::new(1.0, 0.0), Tick::new(0), 4);
        let moved = w.retimed(Tick::new(30));
        assert_eq!(moved.depart(), Tick::new(30));
        assert_eq!(moved.arrive(), Tick::new(34));
        assert_eq!(moved.id(), w.id());
    }

    #[test]
    fn status_tightening_order() {
        use SegmentStatus::*;
        assert!(Available.can_tighten_to(Reserved));
        assert!(Reserved.can_tighten_to(SoldOut));
        assert!(SoldOut.can_tighten_to(Expired));
        assert!(!SoldOut.can_tighten_to(Reserved));
        assert!(Available.can_tighten_to(Available));
    }

    #[test]
    fn lenient_mode_parsing() {
        assert_eq!(Mode::parse_lenient("Train"), Mode::Rail);
        assert_eq!(Mode::parse_lenient(" bus "), Mode::Bus);
        assert_eq!(Mode::parse_lenient("hovercraft"), Mode::Other);
    }

    #[test]
    fn status_parsing() {
        assert_eq!(SegmentStatus::parse("SOLD_OUT"), Some(SegmentStatus::SoldOut));
        assert_eq!(SegmentStatus::parse("nope"), None);
    }
}
