//! Bundle pricing, time decomposition and scoring.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::{DomainError, Segment, SegmentId, Tick};

/// Weights and discount parameters for scoring bundles.
#[derive(Debug, Clone)]
pub struct ScoreConfig {
    /// Discount earned per segment beyond the first.
    pub per_segment_discount: f64,

    /// Upper bound on the multi-segment discount rate.
    pub discount_cap: f64,

    /// Price units per tick of weighted travel time.
    pub time_weight: f64,

    /// Penalty multiplier for walking time.
    pub walk_weight: f64,

    /// Penalty multiplier for waiting time.
    pub wait_weight: f64,
}

impl ScoreConfig {
    /// Create a new configuration with the given parameters.
    pub fn new(
        per_segment_discount: f64,
        discount_cap: f64,
        time_weight: f64,
        walk_weight: f64,
        wait_weight: f64,
    ) -> Self {
        Self {
            per_segment_discount,
            discount_cap,
            time_weight,
            walk_weight,
            wait_weight,
        }
    }

    /// Discount rate for a bundle of `segments` segments, walks included.
    pub fn discount_rate(&self, segments: usize) -> f64 {
        let steps = segments.saturating_sub(1) as f64;
        (steps * self.per_segment_discount).min(self.discount_cap)
    }
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            per_segment_discount: 0.05,
            discount_cap: 0.2,
            time_weight: 0.5,
            walk_weight: 1.5,
            wait_weight: 1.2,
        }
    }
}

/// Deterministic bundle identity: `bdl_` + SHA-256 of the sorted segment ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct BundleId(String);

impl BundleId {
    /// Derive the id of a bundle over `ids`.
    ///
    /// Order and repetition of the ids do not matter.
    ///
    /// # Examples
    ///
    /// ```
    /// use mobility_engine::domain::SegmentId;
    /// use mobility_engine::planner::BundleId;
    ///
    /// let a = SegmentId::new("a").unwrap();
    /// let b = SegmentId::new("b").unwrap();
    /// assert_eq!(BundleId::derive([&a, &b]), BundleId::derive([&b, &a, &b]));
    /// assert!(BundleId::derive([&a]).as_str().starts_with("bdl_"));
    /// ```
    pub fn derive<'a, I>(ids: I) -> Self
    where
        I: IntoIterator<Item = &'a SegmentId>,
    {
        let mut ids: Vec<&str> = ids.into_iter().map(SegmentId::as_str).collect();
        ids.sort_unstable();
        ids.dedup();

        let digest = Sha256::digest(ids.join("\n").as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Self(format!("bdl_{hex}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a bundle's travel time goes, in ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeBreakdown {
    pub in_vehicle: i64,
    pub walk: i64,
    pub wait: i64,
}

impl TimeBreakdown {
    /// Decompose the time of a segment sequence boarded after `desired`.
    pub fn of(segments: &[Segment], desired: Tick) -> Self {
        let mut time = Self::default();
        let mut ready = desired;
        for segment in segments {
            time.wait += segment.depart().saturating_since(ready);
            if segment.is_walk() {
                time.walk += segment.duration();
            } else {
                time.in_vehicle += segment.duration();
            }
            ready = segment.arrive();
        }
        time
    }

    pub fn total(&self) -> i64 {
        self.in_vehicle + self.walk + self.wait
    }
}

/// A priced, scored itinerary.
#[derive(Debug, Clone, Serialize)]
pub struct Bundle {
    id: BundleId,
    segments: Vec<Segment>,
    desired: Tick,
    raw_price: f64,
    discount_rate: f64,
    discounted_price: f64,
    time: TimeBreakdown,
    transfers: usize,
    score: f64,
}

impl Bundle {
    /// Price and score a segment sequence for a query desired at `desired`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EmptyPath` if `segments` is empty.
    pub fn new(
        segments: Vec<Segment>,
        desired: Tick,
        config: &ScoreConfig,
    ) -> Result<Self, DomainError> {
        if segments.is_empty() {
            return Err(DomainError::EmptyPath);
        }

        let raw_price: f64 = segments.iter().map(Segment::price).sum();
        let discount_rate = config.discount_rate(segments.len());
        let discounted_price = raw_price * (1.0 - discount_rate);

        let time = TimeBreakdown::of(&segments, desired);
        let weighted_time = time.in_vehicle as f64
            + config.walk_weight * time.walk as f64
            + config.wait_weight * time.wait as f64;
        let score = -(discounted_price + config.time_weight * weighted_time);

        Ok(Self {
            id: BundleId::derive(segments.iter().map(Segment::id)),
            transfers: segments.len() - 1,
            segments,
            desired,
            raw_price,
            discount_rate,
            discounted_price,
            time,
            score,
        })
    }

    pub fn id(&self) -> &BundleId {
        &self.id
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segments that consume capacity when booked.
    pub fn priced_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(|s| !s.is_walk())
    }

    /// The departure tick the bundle was scored against.
    pub fn desired(&self) -> Tick {
        self.desired
    }

    pub fn raw_price(&self) -> f64 {
        self.raw_price
    }

    pub fn discount_rate(&self) -> f64 {
        self.discount_rate
    }

    pub fn discounted_price(&self) -> f64 {
        self.discounted_price
    }

    pub fn time(&self) -> TimeBreakdown {
        self.time
    }

    pub fn transfers(&self) -> usize {
        self.transfers
    }

    /// Higher is better.
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn depart(&self) -> Tick {
        self.segments
            .first()
            .map(Segment::depart)
            .unwrap_or(self.desired)
    }

    pub fn arrive(&self) -> Tick {
        self.segments
            .last()
            .map(Segment::arrive)
            .unwrap_or(self.desired)
    }

    /// Returns true if every segment is a walk.
    pub fn is_walk_only(&self) -> bool {
        self.segments.iter().all(Segment::is_walk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Point, SegmentDraft};

    fn seg(id: &str, depart: i64, arrive: i64, price: f64) -> Segment {
        SegmentDraft::offer(id, "prov", Point::new(0.0, 0.0), Point::new(1.0, 0.0))
            .times(Tick::new(depart), Tick::new(arrive))
            .price(price)
            .build()
            .unwrap()
    }

    fn walk(depart: i64, duration: i64) -> Segment {
        Segment::walk(
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
            Tick::new(depart),
            duration,
        )
    }

    #[test]
    fn discount_rate_is_capped() {
        let config = ScoreConfig::default();
        assert_eq!(config.discount_rate(0), 0.0);
        assert_eq!(config.discount_rate(1), 0.0);
        assert!((config.discount_rate(2) - 0.05).abs() < 1e-12);
        assert_eq!(config.discount_rate(10), 0.2);
    }

    #[test]
    fn two_segment_bundle() {
        let config = ScoreConfig::default();
        let bundle = Bundle::new(
            vec![seg("ab", 10, 20, 5.0), seg("bc", 22, 30, 5.0)],
            Tick::new(10),
            &config,
        )
        .unwrap();

        assert_eq!(bundle.raw_price(), 10.0);
        assert!((bundle.discounted_price() - 9.5).abs() < 1e-9);
        assert_eq!(
            bundle.time(),
            TimeBreakdown {
                in_vehicle: 18,
                walk: 0,
                wait: 2
            }
        );
        assert_eq!(bundle.transfers(), 1);
        // -(9.5 + 0.5 * (18 + 1.2 * 2))
        assert!((bundle.score() - -19.7).abs() < 1e-9);
        assert_eq!(bundle.depart(), Tick::new(10));
        assert_eq!(bundle.arrive(), Tick::new(30));
    }

    #[test]
    fn walks_count_toward_discount() {
        let config = ScoreConfig::default();
        let bundle = Bundle::new(
            vec![seg("ab", 10, 20, 4.0), walk(20, 3)],
            Tick::new(8),
            &config,
        )
        .unwrap();

        assert!((bundle.discount_rate() - 0.05).abs() < 1e-12);
        assert!((bundle.discounted_price() - 3.8).abs() < 1e-9);
        assert_eq!(bundle.transfers(), 1);
        assert_eq!(bundle.time().walk, 3);
        assert_eq!(bundle.time().wait, 2);
        assert_eq!(bundle.priced_segments().count(), 1);
        assert!(!bundle.is_walk_only());
    }

    #[test]
    fn empty_bundle_is_rejected() {
        let err = Bundle::new(Vec::new(), Tick::new(0), &ScoreConfig::default()).unwrap_err();
        assert_eq!(err, DomainError::EmptyPath);
    }

    #[test]
    fn id_ignores_discovery_order() {
        let config = ScoreConfig::default();
        let forward = Bundle::new(
            vec![seg("ab", 10, 20, 5.0), seg("bc", 22, 30, 5.0)],
            Tick::new(10),
            &config,
        )
        .unwrap();
        let backward = Bundle::new(
            vec![seg("bc", 22, 30, 5.0), seg("ab", 10, 20, 5.0)],
            Tick::new(10),
            &config,
        )
        .unwrap();
        assert_eq!(forward.id(), backward.id());
        assert_eq!(forward.id().as_str().len(), 4 + 64);
    }

    #[test]
    fn known_digest() {
        // sha256("a\nb")
        let a = SegmentId::new("a").unwrap();
        let b = SegmentId::new("b").unwrap();
        let id = BundleId::derive([&b, &a]);
        let expected = {
            let digest = Sha256::digest(b"a\nb");
            let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
            format!("bdl_{hex}")
        };
        assert_eq!(id.as_str(), expected);
    }
}
