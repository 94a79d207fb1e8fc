//! Itinerary search.
//!
//! Builds a graph from the live segments, adds walk access and egress
//! around the query endpoints, enumerates feasible paths and turns them into
//! ranked bundles.

use tracing::debug;

use crate::domain::{Point, Segment, Tick};
use crate::graph::{Graph, WalkConfig};

use super::config::SearchConfig;
use super::dfs::{Path, PathEnumerator};
use super::rank::{deduplicate, rank_bundles, remove_dominated};
use super::score::{Bundle, ScoreConfig};

/// Error from itinerary search.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    /// Invalid search request
    #[error("invalid search request: {0}")]
    InvalidRequest(String),
}

/// A traveler's itinerary query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub origin: Point,
    pub destination: Point,

    /// When the traveler wants to leave.
    pub desired_depart: Tick,

    /// Slack, in ticks, applied to departure windows.
    pub tolerance: i64,

    pub max_transfers: usize,
}

impl SearchRequest {
    /// Create a new search request.
    pub fn new(
        origin: Point,
        destination: Point,
        desired_depart: Tick,
        tolerance: i64,
        max_transfers: usize,
    ) -> Self {
        Self {
            origin,
            destination,
            desired_depart,
            tolerance,
            max_transfers,
        }
    }

    /// Validate the search request.
    pub fn validate(&self) -> Result<(), SearchError> {
        if !self.origin.is_finite() || !self.destination.is_finite() {
            return Err(SearchError::InvalidRequest(
                "origin and destination must be finite".to_string(),
            ));
        }
        if self.tolerance < 0 {
            return Err(SearchError::InvalidRequest(format!(
                "tolerance must not be negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Result of itinerary search.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    /// Found bundles, ranked best-first.
    pub bundles: Vec<Bundle>,

    /// Number of search states visited.
    pub explored: usize,

    /// True if enumeration hit the path cap.
    pub truncated: bool,
}

impl SearchResult {
    /// Create an empty result.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Itinerary planner.
pub struct Planner<'a> {
    search: &'a SearchConfig,
    walk: &'a WalkConfig,
    score: &'a ScoreConfig,
}

impl<'a> Planner<'a> {
    /// Create a new planner.
    pub fn new(search: &'a SearchConfig, walk: &'a WalkConfig, score: &'a ScoreConfig) -> Self {
        Self {
            search,
            walk,
            score,
        }
    }

    /// Search `segments` for itineraries answering `request`.
    pub fn search(
        &self,
        segments: Vec<Segment>,
        request: &SearchRequest,
    ) -> Result<SearchResult, SearchError> {
        request.validate()?;

        let origin = request.origin;
        let destination = request.destination;

        // Same node: nothing to enumerate, at most a short walk.
        if origin.quantize() == destination.quantize() {
            return Ok(self.same_node(request));
        }

        let mut graph = Graph::build(segments);
        graph.inject_walk_edges(origin, destination, request.desired_depart, self.walk);

        let enumeration = PathEnumerator::new(&graph, self.search).enumerate(
            origin,
            destination,
            request.desired_depart,
            request.tolerance,
            request.max_transfers,
        );

        let found = enumeration.paths.len();
        let bundles = self.score_paths(enumeration.paths, request.desired_depart);

        debug!(
            origin = %origin,
            destination = %destination,
            desired = %request.desired_depart,
            explored = enumeration.explored,
            paths = found,
            bundles = bundles.len(),
            truncated = enumeration.truncated,
            "Search complete"
        );

        Ok(SearchResult {
            bundles,
            explored: enumeration.explored,
            truncated: enumeration.truncated,
        })
    }

    fn same_node(&self, request: &SearchRequest) -> SearchResult {
        let distance = request.origin.distance(&request.destination);
        if distance > self.walk.radius {
            return SearchResult::empty();
        }
        let walk = Segment::walk(
            request.origin,
            request.destination,
            request.desired_depart,
            self.walk.walk_ticks(distance),
        );
        let bundles = self.score_paths(vec![Path::new(vec![walk])], request.desired_depart);
        SearchResult {
            bundles,
            explored: 1,
            truncated: false,
        }
    }

    fn score_paths(&self, paths: Vec<Path>, desired: Tick) -> Vec<Bundle> {
        let bundles: Vec<Bundle> = paths
            .into_iter()
            .filter_map(|path| Bundle::new(path.into_segments(), desired, self.score).ok())
            .collect();

        let bundles = deduplicate(bundles);
        let bundles = if self.search.prune_dominated {
            remove_dominated(bundles)
        } else {
            bundles
        };
        let mut bundles = rank_bundles(bundles);
        bundles.truncate(self.search.max_results);
        bundles
    }
}
