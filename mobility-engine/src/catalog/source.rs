//! Raw record sources.
//!
//! A source hands the catalog undecoded JSON records. Decoding happens per
//! record in the catalog, so one bad record never poisons a whole batch.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::error::SourceError;

/// Supplier of raw offer and listing records.
#[async_trait]
pub trait SegmentSource: Send + Sync {
    /// Fetch every scheduled offer currently published.
    async fn fetch_offers(&self) -> Result<Vec<Value>, SourceError>;

    /// Fetch every resale listing currently published.
    async fn fetch_listings(&self) -> Result<Vec<Value>, SourceError>;
}

/// In-process bulletin board that providers and sellers post records to.
#[derive(Debug, Default)]
pub struct MemorySource {
    offers: Mutex<Vec<Value>>,
    listings: Mutex<Vec<Value>>,
}

impl MemorySource {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Post an offer record.
    pub fn push_offer(&self, record: Value) {
        self.offers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Post a listing record.
    pub fn push_listing(&self, record: Value) {
        self.listings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

#[async_trait]
impl SegmentSource for MemorySource {
    async fn fetch_offers(&self) -> Result<Vec<Value>, SourceError> {
        Ok(self
            .offers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn fetch_listings(&self) -> Result<Vec<Value>, SourceError> {
        Ok(self
            .listings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// Source that reads `offers.json` and `listings.json` from a directory.
///
/// Each file must hold a JSON array of records. A missing file is treated as
/// an empty feed.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    dir: PathBuf,
}

impl JsonFileSource {
    /// Offers file name inside the data directory.
    pub const OFFERS_FILE: &'static str = "offers.json";
    /// Listings file name inside the data directory.
    pub const LISTINGS_FILE: &'static str = "listings.json";

    /// Create a source rooted at `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn read_array(&self, name: &str) -> Result<Vec<Value>, SourceError> {
        let path = self.dir.join(name);
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SourceError::Unavailable(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        match serde_json::from_str::<Value>(&json) {
            Ok(Value::Array(records)) => Ok(records),
            Ok(_) => Err(SourceError::Malformed(format!(
                "{} is not a JSON array",
                path.display()
            ))),
            Err(e) => Err(SourceError::Malformed(format!(
                "failed to parse {}: {e}",
                path.display()
            ))),
        }
    }
}

#[async_trait]
impl SegmentSource for JsonFileSource {
    async fn fetch_offers(&self) -> Result<Vec<Value>, SourceError> {
        self.read_array(Self::OFFERS_FILE)
    }

    async fn fetch_listings(&self) -> Result<Vec<Value>, SourceError> {
        self.read_array(Self::LISTINGS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_source_returns_posted_records() {
        let source = MemorySource::new();
        source.push_offer(json!({"id": "a"}));
        source.push_listing(json!({"id": "b"}));
        source.push_listing(json!({"id": "c"}));

        assert_eq!(source.fetch_offers().await.unwrap().len(), 1);
        assert_eq!(source.fetch_listings().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn file_source_reads_arrays() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(JsonFileSource::OFFERS_FILE),
            r#"[{"id": "a"}, {"id": "b"}]"#,
        )
        .unwrap();

        let source = JsonFileSource::new(dir.path());
        assert_eq!(source.fetch_offers().await.unwrap().len(), 2);
        // Missing listings file is an empty feed.
        assert!(source.fetch_listings().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_source_rejects_non_array() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(JsonFileSource::OFFERS_FILE), r#"{"id": "a"}"#).unwrap();
        std::fs::write(dir.path().join(JsonFileSource::LISTINGS_FILE), "not json").unwrap();

        let source = JsonFileSource::new(dir.path());
        assert!(matches!(
            source.fetch_offers().await,
            Err(SourceError::Malformed(_))
        ));
        assert!(matches!(
            source.fetch_listings().await,
            Err(SourceError::Malformed(_))
        ));
    }
}
