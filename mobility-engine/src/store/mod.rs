//! Live segment store.
//!
//! The store is the single owner of mutable segment state. Each segment
//! sits behind its own mutex; multi-segment operations lock the segments
//! they touch in ascending id order, so a check-then-act across several
//! segments is atomic with respect to every other store operation and two
//! overlapping claims can never deadlock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, trace};

use crate::domain::{DomainError, Segment, SegmentId, SegmentStatus, Tick, TickWindow};

/// Errors from store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// No segment with this id is in the store
    #[error("unknown segment: {0}")]
    UnknownSegment(SegmentId),

    /// The segment exists but cannot supply the requested capacity
    #[error("segment unavailable: {0}")]
    Unavailable(DomainError),
}

/// What `upsert` did with a published segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// First time this id was seen.
    Inserted,
    /// Merged into an existing live record.
    Merged,
}

/// Capacity taken from one segment by a successful claim.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedUnits {
    pub segment: SegmentId,
    pub units: u32,
}

type Slot = Arc<Mutex<Segment>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Segment> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared store of live segments.
#[derive(Debug, Default)]
pub struct SegmentStore {
    segments: RwLock<HashMap<SegmentId, Slot>>,
}

impl SegmentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of segments in the store.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if the store holds no segments.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SegmentId, Slot>> {
        self.segments.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SegmentId, Slot>> {
        self.segments.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a published segment, or merge it into the live record.
    ///
    /// Walks are never stored; they are rebuilt per query.
    pub fn upsert(&self, segment: Segment) -> Upsert {
        if let Some(slot) = self.read().get(segment.id()).cloned() {
            lock(&slot).absorb(&segment);
            return Upsert::Merged;
        }

        let mut segments = self.write();
        match segments.get(segment.id()) {
            // Lost the race to another publisher of the same id.
            Some(slot) => {
                lock(slot).absorb(&segment);
                Upsert::Merged
            }
            None => {
                trace!(segment = %segment.id(), "segment inserted");
                segments.insert(segment.id().clone(), Arc::new(Mutex::new(segment)));
                Upsert::Inserted
            }
        }
    }

    /// Remove a segment entirely. Returns the removed record.
    pub fn withdraw(&self, id: &SegmentId) -> Option<Segment> {
        let slot = self.write().remove(id)?;
        let segment = lock(&slot).clone();
        Some(segment)
    }

    /// Snapshot of one segment.
    pub fn get(&self, id: &SegmentId) -> Option<Segment> {
        let slot = self.read().get(id).cloned()?;
        let segment = lock(&slot).clone();
        Some(segment)
    }

    /// Snapshot of every bookable segment departing within `window`,
    /// sorted by id.
    pub fn active(&self, window: Option<TickWindow>) -> Vec<Segment> {
        let slots: Vec<Slot> = self.read().values().cloned().collect();
        let mut active: Vec<Segment> = slots
            .iter()
            .map(|slot| lock(slot).clone())
            .filter(|s| s.is_bookable())
            .filter(|s| window.is_none_or(|w| w.contains(s.depart())))
            .collect();
        active.sort_by(|a, b| a.id().cmp(b.id()));
        active
    }

    /// Mark every unsold segment that departed before `now` as expired.
    ///
    /// Returns the number of segments expired by this call.
    pub fn expire_departed(&self, now: Tick) -> usize {
        let slots: Vec<Slot> = self.read().values().cloned().collect();
        let mut expired = 0;
        for slot in &slots {
            let mut segment = lock(slot);
            if segment.depart() < now
                && matches!(
                    segment.status(),
                    SegmentStatus::Available | SegmentStatus::Reserved
                )
                && segment.tighten(SegmentStatus::Expired).is_ok()
            {
                expired += 1;
            }
        }
        if expired > 0 {
            debug!(expired, now = %now, "segments expired");
        }
        expired
    }

    /// Atomically allocate one unit on every listed segment, or nothing.
    ///
    /// Walk segments are skipped. Duplicate ids claim one unit per
    /// occurrence. All affected segments stay locked from the first check
    /// to the last decrement.
    ///
    /// # Errors
    ///
    /// Returns the first segment (in id order) that is unknown or cannot
    /// supply its units. No segment is modified in that case.
    pub fn claim<'a, I>(&self, segments: I) -> Result<Vec<ClaimedUnits>, StoreError>
    where
        I: IntoIterator<Item = &'a Segment>,
    {
        let mut wanted: BTreeMap<SegmentId, u32> = BTreeMap::new();
        for segment in segments {
            if segment.is_walk() {
                continue;
            }
            *wanted.entry(segment.id().clone()).or_default() += 1;
        }

        // Holding the map read lock keeps claimed segments from being
        // withdrawn underneath us.
        let map = self.read();
        let mut slots = Vec::with_capacity(wanted.len());
        for id in wanted.keys() {
            let slot = map
                .get(id)
                .ok_or_else(|| StoreError::UnknownSegment(id.clone()))?;
            slots.push(slot);
        }

        // BTreeMap iteration gives ascending id order.
        let mut guards: Vec<MutexGuard<'_, Segment>> = slots.iter().map(|s| lock(s)).collect();

        for (guard, (id, units)) in guards.iter().zip(wanted.iter()) {
            if !guard.is_bookable() {
                return Err(StoreError::Unavailable(DomainError::NotBookable {
                    segment: id.clone(),
                    status: guard.status(),
                }));
            }
            if let Some(remaining) = guard.remaining() {
                if remaining < *units {
                    return Err(StoreError::Unavailable(
                        DomainError::InsufficientCapacity {
                            segment: id.clone(),
                            remaining,
                            requested: *units,
                        },
                    ));
                }
            }
        }

        let mut claimed = Vec::with_capacity(wanted.len());
        for (guard, (id, units)) in guards.iter_mut().zip(wanted) {
            // Checked above under the same locks.
            guard.allocate(units).map_err(StoreError::Unavailable)?;
            claimed.push(ClaimedUnits { segment: id, units });
        }
        Ok(claimed)
    }

    /// Return capacity taken by a claim.
    ///
    /// Segments withdrawn since the claim are ignored.
    pub fn release(&self, claimed: &[ClaimedUnits]) {
        let map = self.read();
        let mut sorted: Vec<&ClaimedUnits> = claimed.iter().collect();
        sorted.sort_by(|a, b| a.segment.cmp(&b.segment));
        for unit in sorted {
            if let Some(slot) = map.get(&unit.segment) {
                lock(slot).release(unit.units);
            }
        }
    }
}
