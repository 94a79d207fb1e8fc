//! Raw offer and listing records, and their normalization into `Segment`s.
//!
//! Raw records are deliberately loose: every field is optional and
//! numeric fields accept numbers or numeric strings. Validation happens
//! exactly once, here, so the rest of the engine only ever sees `Segment`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    Capacity, Mode, Point, PricingParams, Segment, SegmentDraft, SegmentKind, SegmentStatus, Tick,
};

use super::coords::parse_point;
use super::error::CatalogError;

/// A scheduled capacity offer as published by a transport provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOffer {
    #[serde(default, alias = "segment_id")]
    pub id: Option<String>,
    #[serde(default, alias = "provider_id")]
    pub provider: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default, alias = "from")]
    pub origin: Option<Value>,
    #[serde(default, alias = "to")]
    pub destination: Option<Value>,
    #[serde(default, alias = "depart_tick")]
    pub depart: Option<Value>,
    #[serde(default, alias = "arrive_tick")]
    pub arrive: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub capacity: Option<Value>,
    #[serde(default)]
    pub consumed: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
}

/// A resale listing published by a secondary-market seller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    #[serde(default, alias = "listing_id")]
    pub id: Option<String>,
    #[serde(default, alias = "seller_id")]
    pub seller: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default, alias = "from")]
    pub origin: Option<Value>,
    #[serde(default, alias = "to")]
    pub destination: Option<Value>,
    #[serde(default, alias = "depart_tick")]
    pub depart: Option<Value>,
    #[serde(default, alias = "arrive_tick")]
    pub arrive: Option<Value>,
    #[serde(default, alias = "current_price")]
    pub price: Option<Value>,
    #[serde(default)]
    pub capacity: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub pricing: Option<PricingParams>,
}

/// Decode and normalize an offer record.
pub fn offer_from_value(value: Value) -> Result<Segment, CatalogError> {
    let raw: RawOffer =
        serde_json::from_value(value).map_err(|e| CatalogError::Decode(e.to_string()))?;
    normalize_offer(&raw)
}

/// Decode and normalize a listing record.
pub fn listing_from_value(value: Value) -> Result<Segment, CatalogError> {
    let raw: RawListing =
        serde_json::from_value(value).map_err(|e| CatalogError::Decode(e.to_string()))?;
    normalize_listing(&raw)
}

/// Normalize a provider offer.
///
/// # Errors
///
/// Fails if id, provider, endpoints, times, price or capacity are missing
/// or malformed, or if the result violates a segment invariant.
pub fn normalize_offer(raw: &RawOffer) -> Result<Segment, CatalogError> {
    let provider = required_text(raw.provider.as_deref(), "provider")?;
    let common = Common::parse(
        raw.id.as_deref(),
        raw.mode.as_deref(),
        raw.origin.as_ref(),
        raw.destination.as_ref(),
        raw.depart.as_ref(),
        raw.arrive.as_ref(),
        raw.price.as_ref(),
        raw.status.as_deref(),
    )?;
    let capacity = required(raw.capacity.as_ref(), "capacity").and_then(|v| count(v, "capacity"))?;
    let consumed = match &raw.consumed {
        Some(v) if !v.is_null() => count(v, "consumed")?,
        _ => 0,
    };

    let draft = SegmentDraft {
        capacity: Capacity::Limited(capacity),
        consumed,
        kind: SegmentKind::Offer { provider },
        ..common.into_draft()
    };
    Ok(draft.build()?)
}

/// Normalize a resale listing. Listings without a capacity resell one unit.
///
/// # Errors
///
/// Fails on the same conditions as [`normalize_offer`], with `seller`
/// required instead of `provider`.
pub fn normalize_listing(raw: &RawListing) -> Result<Segment, CatalogError> {
    let seller = required_text(raw.seller.as_deref(), "seller")?;
    let common = Common::parse(
        raw.id.as_deref(),
        raw.mode.as_deref(),
        raw.origin.as_ref(),
        raw.destination.as_ref(),
        raw.depart.as_ref(),
        raw.arrive.as_ref(),
        raw.price.as_ref(),
        raw.status.as_deref(),
    )?;
    let capacity = match &raw.capacity {
        Some(v) if !v.is_null() => count(v, "capacity")?,
        _ => 1,
    };

    let draft = SegmentDraft {
        capacity: Capacity::Limited(capacity),
        kind: SegmentKind::Listing {
            seller,
            pricing: raw.pricing.clone(),
        },
        ..common.into_draft()
    };
    Ok(draft.build()?)
}

/// Fields shared by offers and listings, already parsed.
struct Common {
    id: String,
    mode: Mode,
    origin: Point,
    destination: Point,
    depart: Tick,
    arrive: Tick,
    price: f64,
    status: SegmentStatus,
}

impl Common {
    #[allow(clippy::too_many_arguments)]
    fn parse(
        id: Option<&str>,
        mode: Option<&str>,
        origin: Option<&Value>,
        destination: Option<&Value>,
        depart: Option<&Value>,
        arrive: Option<&Value>,
        price: Option<&Value>,
        status: Option<&str>,
    ) -> Result<Self, CatalogError> {
        let id = required_text(id, "id")?;
        let origin = parse_point(required(origin, "origin")?).map_err(|source| {
            CatalogError::Coordinate {
                field: "origin",
                source,
            }
        })?;
        let destination = parse_point(required(destination, "destination")?).map_err(
            |source| CatalogError::Coordinate {
                field: "destination",
                source,
            },
        )?;
        let depart = tick(required(depart, "depart")?, "depart")?;
        let arrive = tick(required(arrive, "arrive")?, "arrive")?;
        let price = decimal(required(price, "price")?, "price")?;
        let status = match status {
            None => SegmentStatus::Available,
            Some(s) => SegmentStatus::parse(s).ok_or_else(|| CatalogError::InvalidField {
                field: "status",
                value: s.to_string(),
            })?,
        };

        Ok(Self {
            id,
            mode: mode.map(Mode::parse_lenient).unwrap_or(Mode::Other),
            origin,
            destination,
            depart,
            arrive,
            price,
            status,
        })
    }

    fn into_draft(self) -> SegmentDraft {
        SegmentDraft {
            id: self.id,
            mode: self.mode,
            origin: self.origin,
            destination: self.destination,
            depart: self.depart,
            arrive: self.arrive,
            price: self.price,
            capacity: Capacity::Limited(1),
            consumed: 0,
            status: self.status,
            kind: SegmentKind::Walk,
        }
    }
}

fn required<'a>(value: Option<&'a Value>, field: &'static str) -> Result<&'a Value, CatalogError> {
    match value {
        Some(v) if !v.is_null() => Ok(v),
        _ => Err(CatalogError::MissingField(field)),
    }
}

fn required_text(value: Option<&str>, field: &'static str) -> Result<String, CatalogError> {
    match value.map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(CatalogError::MissingField(field)),
    }
}

fn invalid(field: &'static str, value: &Value) -> CatalogError {
    CatalogError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn decimal(value: &Value, field: &'static str) -> Result<f64, CatalogError> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
        .ok_or_else(|| invalid(field, value))
}

/// Ticks must be integral; `12.0` is accepted, `12.5` is not.
fn tick(value: &Value, field: &'static str) -> Result<Tick, CatalogError> {
    if let Some(i) = value.as_i64() {
        return Ok(Tick::new(i));
    }
    let n = decimal(value, field)?;
    if n.fract() != 0.0 || n.abs() > i64::MAX as f64 {
        return Err(invalid(field, value));
    }
    Ok(Tick::new(n as i64))
}

fn count(value: &Value, field: &'static str) -> Result<u32, CatalogError> {
    if let Some(i) = value.as_u64() {
        return u32::try_from(i).map_err(|_| invalid(field, value));
    }
    let n = decimal(value, field)?;
    if n < 0.0 || n.fract() != 0.0 || n > u32::MAX as f64 {
        return Err(invalid(field, value));
    }
    Ok(n as u32)
}
