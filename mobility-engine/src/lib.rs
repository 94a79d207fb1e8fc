//! Decentralized mobility marketplace engine.
//!
//! Providers and sellers publish priced travel segments; travelers ask for
//! itineraries between two points and book them. Bookings take capacity
//! atomically and settle on a shared ledger, with retries and rollback.

pub mod catalog;
pub mod domain;
pub mod graph;
pub mod ledger;
pub mod market;
pub mod planner;
pub mod reservation;
pub mod store;
