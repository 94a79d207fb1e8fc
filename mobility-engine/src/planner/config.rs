//! Search configuration for the itinerary planner.

use crate::domain::{Tick, TickWindow};

/// Configuration parameters for itinerary search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// The first segment may depart up to `first_hop_factor × tolerance`
    /// ticks after the desired departure.
    pub first_hop_factor: i64,

    /// Later segments may depart up to `transfer_factor × tolerance` ticks
    /// after the previous arrival.
    pub transfer_factor: i64,

    /// Departures from nodes this close to the origin are also considered
    /// for the first segment.
    pub nearby_distance: f64,

    /// A path ending this close to the destination counts as arrived.
    pub arrival_distance: f64,

    /// Hard cap on enumerated paths per query.
    pub max_paths: usize,

    /// Maximum number of bundles to return.
    pub max_results: usize,

    /// Drop bundles beaten on price, arrival and transfers by another one.
    pub prune_dominated: bool,
}

impl SearchConfig {
    /// Create a new configuration with the given parameters.
    pub fn new(
        first_hop_factor: i64,
        transfer_factor: i64,
        nearby_distance: f64,
        arrival_distance: f64,
        max_paths: usize,
        max_results: usize,
        prune_dominated: bool,
    ) -> Self {
        Self {
            first_hop_factor,
            transfer_factor,
            nearby_distance,
            arrival_distance,
            max_paths,
            max_results,
            prune_dominated,
        }
    }

    /// Departure window for the first segment of a query desired at `desired`.
    pub fn first_hop_window(&self, desired: Tick, tolerance: i64) -> TickWindow {
        TickWindow::new(
            desired - tolerance,
            desired + self.first_hop_factor.saturating_mul(tolerance),
        )
    }

    /// Departure window for a segment boarded after arriving at `arrival`.
    pub fn transfer_window(&self, arrival: Tick, tolerance: i64) -> TickWindow {
        TickWindow::new(
            arrival,
            arrival + self.transfer_factor.saturating_mul(tolerance),
        )
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            first_hop_factor: 2,
            transfer_factor: 5,
            nearby_distance: 2.0,
            arrival_distance: 1.0,
            max_paths: 10_000,
            max_results: 10,
            prune_dominated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SearchConfig::default();

        assert_eq!(config.first_hop_factor, 2);
        assert_eq!(config.transfer_factor, 5);
        assert_eq!(config.nearby_distance, 2.0);
        assert_eq!(config.arrival_distance, 1.0);
        assert_eq!(config.max_paths, 10_000);
        assert_eq!(config.max_results, 10);
        assert!(!config.prune_dominated);
    }

    #[test]
    fn window_methods() {
        let config = SearchConfig::default();

        let first = config.first_hop_window(Tick::new(10), 5);
        assert_eq!((first.start, first.end), (Tick::new(5), Tick::new(20)));

        let transfer = config.transfer_window(Tick::new(20), 5);
        assert_eq!((transfer.start, transfer.end), (Tick::new(20), Tick::new(45)));
    }

    #[test]
    fn custom_config() {
        let config = SearchConfig::new(3, 4, 1.5, 0.5, 100, 5, true);

        assert_eq!(config.first_hop_factor, 3);
        assert_eq!(config.transfer_factor, 4);
        assert_eq!(config.nearby_distance, 1.5);
        assert_eq!(config.arrival_distance, 0.5);
        assert_eq!(config.max_paths, 100);
        assert_eq!(config.max_results, 5);
        assert!(config.prune_dominated);

        let first = config.first_hop_window(Tick::new(0), 2);
        assert_eq!((first.start, first.end), (Tick::new(-2), Tick::new(6)));
    }
}
