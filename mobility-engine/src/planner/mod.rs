//! Itinerary planner using bounded depth-first search.
//!
//! Answers "which combinations of published segments get me from here to
//! there around this time?" Every feasible combination within the transfer
//! budget is enumerated, priced and scored, then ranked best-first.

mod config;
mod dfs;
mod rank;
mod score;
mod search;


pub use config::SearchConfig;
pub use dfs::{Enumeration, Path, PathEnumerator};
pub use rank::{deduplicate, rank_bundles, remove_dominated};
pub use score::{Bundle, BundleId, ScoreConfig, TimeBreakdown};
pub use search::{Planner, SearchError, SearchRequest, SearchResult};
