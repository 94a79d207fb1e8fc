//! Marketplace façade.
//!
//! Ties the catalog, planner, reservation coordinator and ledger engine
//! together behind the operations a traveler, provider or seller uses.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::catalog::{CatalogConfig, CatalogError, RawOffer, SegmentCatalog, SegmentSource, normalize_offer};
use crate::domain::{RequestId, ReservationId, Segment, SegmentId, Tick, TxId};
use crate::graph::WalkConfig;
use crate::ledger::{
    Ledger, LedgerError, LedgerTxEngine, Mutation, MutationError, Operation, Receipt,
    RetryConfig, TxOutcome,
};
use crate::planner::{Bundle, Planner, ScoreConfig, SearchConfig, SearchError, SearchRequest};
use crate::reservation::{Claim, Reservation, ReservationCoordinator, ReservationError};
use crate::store::SegmentStore;

/// Ledger charges are whole minor units of the price currency.
const MINOR_UNITS: f64 = 100.0;

/// Convert a price to ledger minor units.
pub fn to_minor_units(price: f64) -> u64 {
    // `as` saturates, and NaN becomes zero.
    (price * MINOR_UNITS).round().max(0.0) as u64
}

/// Configuration for every component of the marketplace.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub search: SearchConfig,
    pub walk: WalkConfig,
    pub score: ScoreConfig,
    pub catalog: CatalogConfig,
    pub retry: RetryConfig,

    /// Fee offered with every ledger operation.
    pub ledger_fee: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            walk: WalkConfig::default(),
            score: ScoreConfig::default(),
            catalog: CatalogConfig::default(),
            retry: RetryConfig::default(),
            ledger_fee: 1,
        }
    }
}

impl MarketConfig {
    /// Defaults overridden by `MOBILITY_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each
    /// `MOBILITY_*` key. Unparsable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        set(&lookup, "MOBILITY_MAX_RESULTS", &mut config.search.max_results);
        set(&lookup, "MOBILITY_MAX_PATHS", &mut config.search.max_paths);
        set(&lookup, "MOBILITY_PRUNE_DOMINATED", &mut config.search.prune_dominated);
        set(&lookup, "MOBILITY_WALK_RADIUS", &mut config.walk.radius);
        set(&lookup, "MOBILITY_WALK_TICKS_PER_UNIT", &mut config.walk.ticks_per_unit);
        set(&lookup, "MOBILITY_DISCOUNT_PER_SEGMENT", &mut config.score.per_segment_discount);
        set(&lookup, "MOBILITY_DISCOUNT_CAP", &mut config.score.discount_cap);
        set(&lookup, "MOBILITY_LEDGER_MAX_RETRIES", &mut config.retry.max_retries);
        set(&lookup, "MOBILITY_LEDGER_FEE", &mut config.ledger_fee);

        if let Some(secs) = parse::<u64>(&lookup, "MOBILITY_CATALOG_TTL_SECS") {
            config.catalog.ttl = Duration::from_secs(secs);
        }
        if let Some(ms) = parse::<u64>(&lookup, "MOBILITY_LEDGER_INITIAL_DELAY_MS") {
            config.retry.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64>(&lookup, "MOBILITY_LEDGER_MAX_DELAY_MS") {
            config.retry.max_delay = Duration::from_millis(ms);
        }

        config
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "Ignoring unparsable setting");
            None
        }
    }
}

fn set<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T)
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(value) = parse(lookup, key) {
        *slot = value;
    }
}

/// Errors surfaced by the marketplace.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    /// The query was malformed
    #[error(transparent)]
    Search(#[from] SearchError),

    /// The offer could not be normalized
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The segment could not be issued locally
    #[error("issuance refused: {0}")]
    Issuance(MutationError),

    /// The ledger refused and local state was rolled back
    #[error("ledger refused: {0}")]
    Ledger(LedgerError),

    /// The ledger refused and local state could not be rolled back
    #[error("transaction {tx} needs operator attention: {error}")]
    OperatorAttention { tx: TxId, error: LedgerError },
}

/// Answer to an itinerary query.
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// Ranked bundles, best first. Never empty.
    Found(Vec<Bundle>),
    NotFound,
}

impl QueryOutcome {
    pub fn bundles(&self) -> &[Bundle] {
        match self {
            QueryOutcome::Found(bundles) => bundles,
            QueryOutcome::NotFound => &[],
        }
    }
}

/// Why a booking did not go through. Nothing stays reserved either way.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookingRefusal {
    /// Capacity could not be claimed
    #[error(transparent)]
    Unavailable(ReservationError),

    /// The ledger would not settle the booking
    #[error("settlement failed: {0}")]
    Settlement(LedgerError),
}

/// Result of a booking attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum BookingOutcome {
    /// Settled on the ledger and reserved.
    Booked(Reservation),
    /// The requester already holds this bundle.
    AlreadyBooked(ReservationId),
    NotBooked(BookingRefusal),
}

/// Claims a bundle's capacity; releasing the claim undoes it.
struct ClaimBundle {
    reservations: Arc<ReservationCoordinator>,
    requester: String,
    bundle: Bundle,
    request: Option<RequestId>,
    now: Tick,
}

impl Mutation for ClaimBundle {
    type Applied = Claim;
    type Committed = Reservation;
    type Error = ReservationError;

    fn apply(&mut self) -> Result<Claim, ReservationError> {
        self.reservations
            .claim(&self.requester, &self.bundle, self.request, self.now)
    }

    fn commit(&mut self, claim: Claim, receipt: &Receipt) -> Reservation {
        self.reservations
            .confirm(claim, Some(receipt.reference.clone()))
    }

    fn revert(&mut self, claim: Claim) -> Result<(), ReservationError> {
        self.reservations.release(claim);
        Ok(())
    }

    fn payload(&self, claim: &Claim) -> Value {
        serde_json::to_value(claim.settlement()).unwrap_or_else(|e| {
            warn!(reservation = %claim.reservation_id(), error = %e, "Settlement not serializable");
            Value::Null
        })
    }
}

/// Lists a freshly issued segment; withdrawing it undoes it.
struct ListSegment {
    store: Arc<SegmentStore>,
    issuer: String,
    segment: Option<Segment>,
}

impl Mutation for ListSegment {
    type Applied = SegmentId;
    type Committed = SegmentId;
    type Error = MutationError;

    fn apply(&mut self) -> Result<SegmentId, MutationError> {
        let segment = self
            .segment
            .take()
            .ok_or_else(|| MutationError::new("segment already issued"))?;
        let id = segment.id().clone();
        if self.store.get(&id).is_some() {
            return Err(MutationError::new(format!("segment {id} is already listed")));
        }
        self.store.upsert(segment);
        Ok(id)
    }

    fn commit(&mut self, id: SegmentId, _receipt: &Receipt) -> SegmentId {
        id
    }

    fn revert(&mut self, id: SegmentId) -> Result<(), MutationError> {
        self.store
            .withdraw(&id)
            .map(|_| ())
            .ok_or_else(|| MutationError::new(format!("segment {id} vanished before rollback")))
    }

    fn payload(&self, id: &SegmentId) -> Value {
        json!({ "issue": id.as_str(), "issuer": self.issuer })
    }
}

/// The marketplace: discovery, booking and issuance over one segment store.
pub struct Marketplace<S, L> {
    config: MarketConfig,
    catalog: SegmentCatalog<S>,
    reservations: Arc<ReservationCoordinator>,
    engine: LedgerTxEngine<L>,
}

impl<S: SegmentSource, L: Ledger> Marketplace<S, L> {
    pub fn new(source: S, ledger: Arc<L>, config: MarketConfig) -> Self {
        let store = Arc::new(SegmentStore::new());
        let catalog = SegmentCatalog::new(source, store.clone(), &config.catalog);
        let reservations = Arc::new(ReservationCoordinator::new(store));
        let engine = LedgerTxEngine::new(ledger, config.retry.clone());

        Self {
            config,
            catalog,
            reservations,
            engine,
        }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SegmentCatalog<S> {
        &self.catalog
    }

    pub fn reservations(&self) -> &ReservationCoordinator {
        &self.reservations
    }

    pub fn engine(&self) -> &LedgerTxEngine<L> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<SegmentStore> {
        self.catalog.store()
    }

    /// Find ranked bundles for `request` over the currently bookable
    /// segments.
    ///
    /// # Errors
    ///
    /// Only a malformed request is an error; no itinerary is
    /// [`QueryOutcome::NotFound`].
    pub async fn query(&self, request: &SearchRequest) -> Result<QueryOutcome, MarketError> {
        request.validate()?;

        let listing = self.catalog.list_active_segments(None).await;
        let planner = Planner::new(&self.config.search, &self.config.walk, &self.config.score);
        let result = planner.search(listing.segments, request)?;

        debug!(
            bundles = result.bundles.len(),
            explored = result.explored,
            truncated = result.truncated,
            skipped = listing.skipped,
            "Query answered"
        );

        if result.bundles.is_empty() {
            return Ok(QueryOutcome::NotFound);
        }
        Ok(QueryOutcome::Found(result.bundles))
    }

    /// Register a traveler's request; a later booking by the same traveler
    /// that names it matches it.
    pub fn open_request(&self, requester: &str, request: SearchRequest, now: Tick) -> RequestId {
        self.reservations.open_request(requester, request, now)
    }

    /// Reserve `bundle` for `requester` and settle it on the ledger.
    ///
    /// The capacity claim is the local mutation; if the ledger refuses, the
    /// claim is released and a failed reservation is kept for audit. Either
    /// way the claim is settled on the ledger task, so a caller that stops
    /// waiting leaves a confirmed or released claim behind, never a held
    /// one. `request` is the open request this booking answers.
    pub async fn book(
        &self,
        requester: &str,
        bundle: &Bundle,
        request: Option<RequestId>,
        now: Tick,
    ) -> Result<BookingOutcome, MarketError> {
        let mutation = ClaimBundle {
            reservations: self.reservations.clone(),
            requester: requester.to_string(),
            bundle: bundle.clone(),
            request,
            now,
        };
        let key = format!("book:{requester}:{}", bundle.id());
        let op = Operation::new(requester, &key, mutation)
            .with_charge(to_minor_units(bundle.discounted_price()))
            .with_fee(self.config.ledger_fee);

        match self.engine.execute(op).await {
            TxOutcome::Confirmed { committed, .. } => Ok(BookingOutcome::Booked(committed)),
            TxOutcome::Aborted {
                error: ReservationError::AlreadyReserved(id),
                ..
            } => Ok(BookingOutcome::AlreadyBooked(id)),
            TxOutcome::Aborted { error, .. } => {
                Ok(BookingOutcome::NotBooked(BookingRefusal::Unavailable(error)))
            }
            TxOutcome::Failed { error, .. } => {
                Ok(BookingOutcome::NotBooked(BookingRefusal::Settlement(error)))
            }
            TxOutcome::NeedsOperator { tx, error, .. } => {
                Err(MarketError::OperatorAttention { tx, error })
            }
        }
    }

    /// Issue a new provider segment on demand, recorded on the ledger.
    ///
    /// The segment is bookable once this returns `Ok`.
    pub async fn issue_segment(
        &self,
        raw: &RawOffer,
        issuer: &str,
    ) -> Result<SegmentId, MarketError> {
        let segment = normalize_offer(raw)?;
        let key = format!("issue:{}", segment.id());
        let mutation = ListSegment {
            store: self.store().clone(),
            issuer: issuer.to_string(),
            segment: Some(segment),
        };
        let op = Operation::new(issuer, &key, mutation).with_fee(self.config.ledger_fee);

        match self.engine.execute(op).await {
            TxOutcome::Confirmed {
                committed, receipt, ..
            } => {
                info!(segment = %committed, issuer, reference = %receipt.reference, "Segment issued");
                Ok(committed)
            }
            TxOutcome::Aborted { error, .. } => Err(MarketError::Issuance(error)),
            TxOutcome::Failed { error, .. } => Err(MarketError::Ledger(error)),
            TxOutcome::NeedsOperator { tx, error, .. } => {
                Err(MarketError::OperatorAttention { tx, error })
            }
        }
    }

    /// Move the market clock to `now`, expiring unsold departed segments.
    pub fn advance_clock(&self, now: Tick) -> usize {
        let expired = self.store().expire_departed(now);
        if expired > 0 {
            info!(now = %now, expired, "Expired departed segments");
        }
        expired
    }
}
