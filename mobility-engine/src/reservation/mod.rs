//! Atomic reservation of bundles.
//!
//! A reservation takes one unit from every priced segment of a bundle or
//! takes nothing. The check and the decrement happen under the store's
//! per-segment locks, so concurrent reservations of overlapping bundles see
//! a consistent view and can never oversell.
//!
//! Reserving is split in two phases so the ledger engine can sit between
//! them: [`ReservationCoordinator::claim`] takes the capacity, then either
//! [`ReservationCoordinator::confirm`] records the reservation or
//! [`ReservationCoordinator::release`] hands the capacity back.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{RequestId, ReservationId, SegmentId, Tick};
use crate::planner::{Bundle, BundleId, SearchRequest};
use crate::store::{ClaimedUnits, SegmentStore, StoreError};

/// Why a claim was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReservationError {
    /// This requester already holds a confirmed reservation of the bundle
    #[error("bundle already reserved as {0}")]
    AlreadyReserved(ReservationId),

    /// Another reservation of this bundle by the same requester is running
    #[error("reservation of {0} already in progress")]
    InFlight(BundleId),

    /// A segment could not supply its capacity
    #[error(transparent)]
    Unavailable(#[from] StoreError),
}

/// Result of a one-shot reservation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    /// Capacity taken and reservation recorded.
    Confirmed(ReservationId),
    /// The same requester had already reserved this bundle.
    AlreadyConfirmed(ReservationId),
    /// Nothing was reserved.
    Unavailable(ReservationError),
}

impl ReserveOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Confirmed(_) | Self::AlreadyConfirmed(_))
    }

    pub fn reservation_id(&self) -> Option<ReservationId> {
        match self {
            Self::Confirmed(id) | Self::AlreadyConfirmed(id) => Some(*id),
            Self::Unavailable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Confirmed,
    /// Capacity was claimed and later handed back.
    Failed,
}

/// One priced segment of a reservation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservationEntry {
    pub segment: SegmentId,
    pub owner: Option<String>,
    pub units: u32,
    /// Share of the discounted bundle price owed to the owner.
    pub price: f64,
}

/// A reservation record. Never changes once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub bundle_id: BundleId,
    pub requester: String,
    pub entries: Vec<ReservationEntry>,
    pub total_price: f64,
    pub tick: Tick,
    pub status: ReservationStatus,
    pub ledger_ref: Option<String>,
}

/// What the ledger has to settle for a reservation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementRecord {
    pub reservation_id: ReservationId,
    pub bundle_id: BundleId,
    pub requester: String,
    pub total_price: f64,
    pub entries: Vec<ReservationEntry>,
}

/// Capacity held for a bundle, awaiting confirmation or release.
#[derive(Debug)]
pub struct Claim {
    reservation_id: ReservationId,
    requester: String,
    /// The open request this claim answers, if any.
    request: Option<RequestId>,
    bundle_id: BundleId,
    entries: Vec<ReservationEntry>,
    total_price: f64,
    tick: Tick,
    claimed: Vec<ClaimedUnits>,
}

impl Claim {
    /// The id the reservation will carry once confirmed.
    pub fn reservation_id(&self) -> ReservationId {
        self.reservation_id
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }

    pub fn request(&self) -> Option<RequestId> {
        self.request
    }

    pub fn bundle_id(&self) -> &BundleId {
        &self.bundle_id
    }

    pub fn total_price(&self) -> f64 {
        self.total_price
    }

    /// Capacity units taken from each segment.
    pub fn claimed(&self) -> &[ClaimedUnits] {
        &self.claimed
    }

    /// The settlement this claim will owe once confirmed.
    pub fn settlement(&self) -> SettlementRecord {
        SettlementRecord {
            reservation_id: self.reservation_id,
            bundle_id: self.bundle_id.clone(),
            requester: self.requester.clone(),
            total_price: self.total_price,
            entries: self.entries.clone(),
        }
    }

    fn key(&self) -> (String, BundleId) {
        (self.requester.clone(), self.bundle_id.clone())
    }

    fn into_reservation(
        self,
        status: ReservationStatus,
        ledger_ref: Option<String>,
    ) -> Reservation {
        Reservation {
            id: self.reservation_id,
            bundle_id: self.bundle_id,
            requester: self.requester,
            entries: self.entries,
            total_price: self.total_price,
            tick: self.tick,
            status,
            ledger_ref,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Open,
    Matched(ReservationId),
}

/// A traveler's registered itinerary request.
#[derive(Debug, Clone)]
pub struct TravelRequest {
    pub id: RequestId,
    pub requester: String,
    pub query: SearchRequest,
    pub opened: Tick,
    pub status: RequestStatus,
}

#[derive(Debug, Default)]
struct Book {
    reservations: HashMap<ReservationId, Reservation>,
    /// Reservation ids in creation order.
    order: Vec<ReservationId>,
    confirmed: HashMap<(String, BundleId), ReservationId>,
    in_flight: HashSet<(String, BundleId)>,
    requests: HashMap<RequestId, TravelRequest>,
    outbox: Vec<SettlementRecord>,
}

impl Book {
    fn record(&mut self, reservation: Reservation) {
        self.order.push(reservation.id);
        self.reservations.insert(reservation.id, reservation);
    }
}

/// Coordinates all-or-nothing reservations against a segment store.
#[derive(Debug)]
pub struct ReservationCoordinator {
    store: Arc<SegmentStore>,
    book: Mutex<Book>,
}

impl ReservationCoordinator {
    pub fn new(store: Arc<SegmentStore>) -> Self {
        Self {
            store,
            book: Mutex::new(Book::default()),
        }
    }

    pub fn store(&self) -> &Arc<SegmentStore> {
        &self.store
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a traveler's request so a later reservation can match it.
    pub fn open_request(&self, requester: &str, query: SearchRequest, now: Tick) -> RequestId {
        let id = RequestId::generate();
        self.book().requests.insert(
            id,
            TravelRequest {
                id,
                requester: requester.to_string(),
                query,
                opened: now,
                status: RequestStatus::Open,
            },
        );
        debug!(request = %id, requester, "Request opened");
        id
    }

    pub fn request(&self, id: RequestId) -> Option<TravelRequest> {
        self.book().requests.get(&id).cloned()
    }

    /// Take one unit of capacity from every priced segment of `bundle`.
    ///
    /// `request` names the open request this claim answers; confirming
    /// the claim marks it matched.
    ///
    /// # Errors
    ///
    /// Fails without touching any capacity if the requester already holds
    /// or is already claiming this bundle, or if any segment is no longer
    /// bookable.
    pub fn claim(
        &self,
        requester: &str,
        bundle: &Bundle,
        request: Option<RequestId>,
        now: Tick,
    ) -> Result<Claim, ReservationError> {
        let key = (requester.to_string(), bundle.id().clone());
        {
            let mut book = self.book();
            if let Some(existing) = book.confirmed.get(&key) {
                return Err(ReservationError::AlreadyReserved(*existing));
            }
            if !book.in_flight.insert(key.clone()) {
                return Err(ReservationError::InFlight(bundle.id().clone()));
            }
        }

        let claimed = match self.store.claim(bundle.priced_segments()) {
            Ok(claimed) => claimed,
            Err(e) => {
                self.book().in_flight.remove(&key);
                debug!(bundle = %bundle.id(), requester, error = %e, "Claim refused");
                return Err(e.into());
            }
        };

        let keep = 1.0 - bundle.discount_rate();
        let entries = bundle
            .priced_segments()
            .map(|segment| ReservationEntry {
                segment: segment.id().clone(),
                owner: segment.owner().map(str::to_string),
                units: 1,
                price: segment.price() * keep,
            })
            .collect();

        let claim = Claim {
            reservation_id: ReservationId::generate(),
            requester: requester.to_string(),
            request,
            bundle_id: bundle.id().clone(),
            entries,
            total_price: bundle.discounted_price(),
            tick: now,
            claimed,
        };
        debug!(
            reservation = %claim.reservation_id,
            bundle = %claim.bundle_id,
            requester,
            "Capacity claimed"
        );
        Ok(claim)
    }

    /// Record a claimed bundle as reserved and match the request it
    /// answers.
    ///
    /// Without a `ledger_ref` the settlement is queued for
    /// [`drain_settlements`](Self::drain_settlements); with one it has
    /// already been settled.
    pub fn confirm(&self, claim: Claim, ledger_ref: Option<String>) -> Reservation {
        let mut book = self.book();
        let key = claim.key();
        book.in_flight.remove(&key);

        let settled = ledger_ref.is_some();
        if !settled {
            book.outbox.push(claim.settlement());
        }

        let answered = claim.request;
        let reservation = claim.into_reservation(ReservationStatus::Confirmed, ledger_ref);
        book.confirmed.insert(key, reservation.id);
        let request = match answered {
            Some(id) => book.requests.get_mut(&id),
            None => None,
        };
        if let Some(request) = request {
            if request.requester == reservation.requester && request.status == RequestStatus::Open
            {
                request.status = RequestStatus::Matched(reservation.id);
            } else {
                debug!(request = %request.id, "Request not matchable, left as is");
            }
        }
        book.record(reservation.clone());

        info!(
            reservation = %reservation.id,
            bundle = %reservation.bundle_id,
            requester = %reservation.requester,
            total_price = reservation.total_price,
            settled,
            "Reservation confirmed"
        );
        reservation
    }

    /// Hand a claim's capacity back and keep a failed record of the attempt.
    pub fn release(&self, claim: Claim) -> Reservation {
        self.store.release(&claim.claimed);

        let mut book = self.book();
        book.in_flight.remove(&claim.key());
        let reservation = claim.into_reservation(ReservationStatus::Failed, None);
        book.record(reservation.clone());

        info!(
            reservation = %reservation.id,
            bundle = %reservation.bundle_id,
            requester = %reservation.requester,
            "Claim released"
        );
        reservation
    }

    /// Claim and confirm in one step, without a ledger.
    ///
    /// Repeating a successful reservation returns the original id and takes
    /// no further capacity.
    pub fn reserve(
        &self,
        requester: &str,
        bundle: &Bundle,
        request: Option<RequestId>,
        now: Tick,
    ) -> ReserveOutcome {
        match self.claim(requester, bundle, request, now) {
            Ok(claim) => ReserveOutcome::Confirmed(self.confirm(claim, None).id),
            Err(ReservationError::AlreadyReserved(id)) => ReserveOutcome::AlreadyConfirmed(id),
            Err(e) => ReserveOutcome::Unavailable(e),
        }
    }

    pub fn reservation(&self, id: ReservationId) -> Option<Reservation> {
        self.book().reservations.get(&id).cloned()
    }

    /// Every reservation made by `requester`, oldest first.
    pub fn reservations_for(&self, requester: &str) -> Vec<Reservation> {
        let book = self.book();
        book.order
            .iter()
            .filter_map(|id| book.reservations.get(id))
            .filter(|r| r.requester == requester)
            .cloned()
            .collect()
    }

    /// Take every queued settlement record.
    pub fn drain_settlements(&self) -> Vec<SettlementRecord> {
        std::mem::take(&mut self.book().outbox)
    }
}
