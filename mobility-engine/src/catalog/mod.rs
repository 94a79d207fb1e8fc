//! Segment catalog.
//!
//! Pulls raw offers and listings from a [`SegmentSource`], normalizes them
//! into [`Segment`]s and merges them into the shared [`SegmentStore`].
//! Normalized batches are cached per source kind so repeated queries within
//! the TTL do not re-fetch.

mod coords;
mod error;
mod raw;
mod source;

pub use coords::{CoordError, parse_point};
pub use error::{CatalogError, SourceError};
pub use raw::{
    RawListing, RawOffer, listing_from_value, normalize_listing, normalize_offer,
    offer_from_value,
};
pub use source::{JsonFileSource, MemorySource, SegmentSource};

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache as MokaCache;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{Segment, SegmentId, TickWindow};
use crate::store::SegmentStore;

/// Configuration for the catalog's batch cache.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// How long a fetched batch is trusted before the source is asked again.
    pub ttl: Duration,

    /// Maximum number of cached batches.
    pub max_capacity: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_capacity: 16,
        }
    }
}

/// Which feed a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SourceKind {
    Offers,
    Listings,
}

/// Outcome of normalizing one fetched feed.
#[derive(Debug, Clone, Copy, Default)]
struct Batch {
    admitted: usize,
    skipped: usize,
}

/// Active segments plus the number of raw records rejected while building
/// the listing.
#[derive(Debug, Clone, Default)]
pub struct CatalogListing {
    pub segments: Vec<Segment>,
    pub skipped: usize,
}

/// Normalizing, caching front of the segment store.
pub struct SegmentCatalog<S> {
    source: S,
    store: Arc<SegmentStore>,
    batches: MokaCache<SourceKind, Arc<Batch>>,
}

impl<S: SegmentSource> SegmentCatalog<S> {
    /// Create a catalog over `source`, merging into `store`.
    pub fn new(source: S, store: Arc<SegmentStore>, config: &CatalogConfig) -> Self {
        let batches = MokaCache::builder()
            .time_to_live(config.ttl)
            .max_capacity(config.max_capacity)
            .build();

        Self {
            source,
            store,
            batches,
        }
    }

    /// The store this catalog feeds.
    pub fn store(&self) -> &Arc<SegmentStore> {
        &self.store
    }

    /// The underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// List bookable segments, refreshing stale feeds first.
    ///
    /// `window` restricts the result to segments departing within it.
    /// Malformed records are skipped and counted, never fatal.
    pub async fn list_active_segments(&self, window: Option<TickWindow>) -> CatalogListing {
        let skipped = self.refresh().await;
        let segments = self.store.active(window);
        debug!(
            segments = segments.len(),
            skipped,
            "Listed active segments"
        );
        CatalogListing { segments, skipped }
    }

    /// Refresh every feed whose cached batch has expired.
    ///
    /// Returns the number of records skipped across the current batches.
    pub async fn refresh(&self) -> usize {
        let (offers, listings) = futures::join!(
            self.batch(SourceKind::Offers),
            self.batch(SourceKind::Listings)
        );
        offers.skipped + listings.skipped
    }

    /// Drop cached batches so the next listing re-fetches every feed.
    pub fn invalidate(&self) {
        self.batches.invalidate_all();
    }

    /// Admit a provider offer directly, bypassing the source.
    pub fn broadcast(&self, raw: &RawOffer) -> Result<SegmentId, CatalogError> {
        let segment = normalize_offer(raw)?;
        let id = segment.id().clone();
        let upsert = self.store.upsert(segment);
        debug!(segment = %id, ?upsert, "Offer broadcast");
        Ok(id)
    }

    /// Admit a resale listing directly, bypassing the source.
    pub fn publish_listing(&self, raw: &RawListing) -> Result<SegmentId, CatalogError> {
        let segment = normalize_listing(raw)?;
        let id = segment.id().clone();
        let upsert = self.store.upsert(segment);
        debug!(segment = %id, ?upsert, "Listing published");
        Ok(id)
    }

    async fn batch(&self, kind: SourceKind) -> Arc<Batch> {
        if let Some(cached) = self.batches.get(&kind).await {
            return cached;
        }

        let fetched = match kind {
            SourceKind::Offers => self.source.fetch_offers().await,
            SourceKind::Listings => self.source.fetch_listings().await,
        };
        let records = match fetched {
            Ok(records) => records,
            Err(e) => {
                warn!(?kind, error = %e, "Segment source failed, treating feed as empty");
                return Arc::new(Batch::default());
            }
        };

        let batch = Arc::new(self.merge(kind, records));
        self.batches.insert(kind, batch.clone()).await;
        batch
    }

    fn merge(&self, kind: SourceKind, records: Vec<Value>) -> Batch {
        let mut batch = Batch::default();
        for (index, record) in records.into_iter().enumerate() {
            let normalized = match kind {
                SourceKind::Offers => offer_from_value(record),
                SourceKind::Listings => listing_from_value(record),
            };
            match normalized {
                Ok(segment) => {
                    self.store.upsert(segment);
                    batch.admitted += 1;
                }
                Err(e) => {
                    warn!(?kind, index, error = %e, "Skipping malformed record");
                    batch.skipped += 1;
                }
            }
        }
        debug!(?kind, admitted = batch.admitted, skipped = batch.skipped, "Merged feed");
        batch
    }
}
