//! Bounded-depth path enumeration.
//!
//! Depth-first and exhaustive: every feasible path within the depth budget
//! is produced, not just the shortest. Each explored branch carries its own
//! path and visited set, so pruning in one branch never hides a path from
//! another.

use std::collections::HashSet;

use tracing::{trace, warn};

use crate::domain::{NodeId, Point, Segment, Tick};
use crate::graph::Graph;

use super::config::SearchConfig;

/// An ordered, time-feasible sequence of segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    pub(crate) fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Arrival tick of the final segment.
    pub fn arrive(&self) -> Option<Tick> {
        self.segments.last().map(Segment::arrive)
    }
}

/// Everything the enumerator produced for one query.
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    pub paths: Vec<Path>,

    /// Number of search states visited.
    pub explored: usize,

    /// True if enumeration stopped at the path cap.
    pub truncated: bool,
}

/// Fixed inputs of one enumeration.
struct Query {
    destination: Point,
    destination_node: NodeId,
    tolerance: i64,
}

/// Depth-first enumerator over a built graph.
pub struct PathEnumerator<'a> {
    graph: &'a Graph,
    config: &'a SearchConfig,
}

impl<'a> PathEnumerator<'a> {
    pub fn new(graph: &'a Graph, config: &'a SearchConfig) -> Self {
        Self { graph, config }
    }

    /// Enumerate every path from `origin` to `destination`.
    ///
    /// `desired` anchors the first-hop departure window, `tolerance` scales
    /// both windows and at most `max_transfers + 1` segments (walks
    /// included) are used.
    pub fn enumerate(
        &self,
        origin: Point,
        destination: Point,
        desired: Tick,
        tolerance: i64,
        max_transfers: usize,
    ) -> Enumeration {
        let query = Query {
            destination,
            destination_node: destination.quantize(),
            tolerance,
        };
        let start = origin.quantize();
        let mut out = Enumeration::default();
        let mut path = Vec::new();
        let mut visited = HashSet::from([start]);

        self.search(
            &query,
            start,
            desired,
            max_transfers.saturating_add(1),
            &mut path,
            &mut visited,
            &mut out,
        );

        trace!(
            paths = out.paths.len(),
            explored = out.explored,
            truncated = out.truncated,
            "Enumeration finished"
        );
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn search(
        &self,
        query: &Query,
        node: NodeId,
        tick: Tick,
        depth_left: usize,
        path: &mut Vec<Segment>,
        visited: &mut HashSet<NodeId>,
        out: &mut Enumeration,
    ) {
        if out.truncated {
            return;
        }
        out.explored += 1;

        if self.arrived(query, node, path) {
            out.paths.push(Path::new(path.clone()));
            if out.paths.len() >= self.config.max_paths {
                warn!(
                    max_paths = self.config.max_paths,
                    "Path cap reached, stopping enumeration"
                );
                out.truncated = true;
            }
            return;
        }
        if depth_left == 0 {
            return;
        }

        let first_hop = path.is_empty();
        for from in self.sources(node, first_hop) {
            // A nearby boarding node is part of the path too.
            let boarded_nearby = from != node && visited.insert(from);
            for edge in self.graph.edges_from(from) {
                if visited.contains(&edge.to) {
                    continue;
                }
                let Some(segment) = self.board(query, &edge.segment, from == node, tick, path)
                else {
                    continue;
                };

                let next_tick = segment.arrive();
                visited.insert(edge.to);
                path.push(segment);
                self.search(query, edge.to, next_tick, depth_left - 1, path, visited, out);
                path.pop();
                visited.remove(&edge.to);

                if out.truncated {
                    break;
                }
            }
            if boarded_nearby {
                visited.remove(&from);
            }
            if out.truncated {
                return;
            }
        }
    }

    /// A path ending in a walk must end exactly on the destination node, so
    /// walks serve only as access and egress.
    fn arrived(&self, query: &Query, node: NodeId, path: &[Segment]) -> bool {
        let Some(last) = path.last() else {
            return false;
        };
        if last.is_walk() {
            return node == query.destination_node;
        }
        node.distance_to(&query.destination) <= self.config.arrival_distance
    }

    /// Nodes whose departures are candidates from `node`.
    ///
    /// The first hop also considers nodes within `nearby_distance`.
    fn sources(&self, node: NodeId, first_hop: bool) -> Vec<NodeId> {
        if !first_hop {
            return vec![node];
        }
        let here = node.point();
        let mut sources = vec![node];
        sources.extend(
            self.graph
                .nodes_near(&here, self.config.nearby_distance)
                .filter(|n| *n != node),
        );
        sources
    }

    /// Decide whether `segment` can be taken at `tick` after `path`.
    ///
    /// Returns the segment as it would be ridden: walks are re-timed to
    /// start now.
    fn board(
        &self,
        query: &Query,
        segment: &Segment,
        local: bool,
        tick: Tick,
        path: &[Segment],
    ) -> Option<Segment> {
        if segment.is_walk() {
            // Walks leave from where the traveler stands and never chain.
            if !local || path.last().is_some_and(Segment::is_walk) {
                return None;
            }
            return Some(segment.retimed(tick));
        }

        if !segment.is_bookable() {
            return None;
        }
        let window = if path.is_empty() {
            self.config.first_hop_window(tick, query.tolerance)
        } else {
            self.config.transfer_window(tick, query.tolerance)
        };
        window.contains(segment.depart()).then(|| segment.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Capacity, SegmentDraft, SegmentStatus};
    use crate::graph::WalkConfig;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn seg(id: &str, from: Point, to: Point, depart: i64, arrive: i64) -> Segment {
        SegmentDraft::offer(id, "prov", from, to)
            .times(Tick::new(depart), Tick::new(arrive))
            .price(1.0)
            .build()
            .unwrap()
    }

    fn ids(path: &Path) -> Vec<&str> {
        path.segments().iter().map(|s| s.id().as_str()).collect()
    }

    #[test]
    fn abutting_segments_connect() {
        let graph = Graph::build(vec![
            seg("ab", p(0.0, 0.0), p(10.0, 0.0), 10, 20),
            seg("bc", p(10.0, 0.0), p(20.0, 0.0), 20, 30),
        ]);
        let config = SearchConfig::default();
        let out =
            PathEnumerator::new(&graph, &config).enumerate(p(0.0, 0.0), p(20.0, 0.0), Tick::new(10), 0, 2);

        assert_eq!(out.paths.len(), 1);
        assert_eq!(ids(&out.paths[0]), vec!["ab", "bc"]);
        assert_eq!(out.paths[0].arrive(), Some(Tick::new(30)));
    }

    #[test]
    fn first_hop_window_is_asymmetric() {
        let config = SearchConfig::default();
        let origin = p(0.0, 0.0);
        let dest = p(10.0, 0.0);
        let find = |depart: i64| {
            let graph = Graph::build(vec![seg("x", origin, dest, depart, depart + 5)]);
            PathEnumerator::new(&graph, &config)
                .enumerate(origin, dest, Tick::new(100), 5, 0)
                .paths
                .len()
        };

        assert_eq!(find(94), 0);
        assert_eq!(find(95), 1);
        assert_eq!(find(110), 1);
        assert_eq!(find(111), 0);
    }

    #[test]
    fn transfer_window_bounds_waiting() {
        let config = SearchConfig::default();
        let find = |second_depart: i64| {
            let graph = Graph::build(vec![
                seg("ab", p(0.0, 0.0), p(10.0, 0.0), 0, 10),
                seg("bc", p(10.0, 0.0), p(20.0, 0.0), second_depart, second_depart + 5),
            ]);
            PathEnumerator::new(&graph, &config)
                .enumerate(p(0.0, 0.0), p(20.0, 0.0), Tick::new(0), 2, 1)
                .paths
                .len()
        };

        // Departs before we arrive.
        assert_eq!(find(9), 0);
        assert_eq!(find(10), 1);
        assert_eq!(find(20), 1);
        assert_eq!(find(21), 0);
    }

    #[test]
    fn depth_limits_transfers() {
        let graph = Graph::build(vec![
            seg("1", p(0.0, 0.0), p(10.0, 0.0), 0, 1),
            seg("2", p(10.0, 0.0), p(20.0, 0.0), 1, 2),
            seg("3", p(20.0, 0.0), p(30.0, 0.0), 2, 3),
        ]);
        let config = SearchConfig::default();
        let enumerator = PathEnumerator::new(&graph, &config);

        let run = |max_transfers| {
            enumerator
                .enumerate(p(0.0, 0.0), p(30.0, 0.0), Tick::new(0), 1, max_transfers)
                .paths
                .len()
        };
        assert_eq!(run(1), 0);
        assert_eq!(run(2), 1);
    }

    #[test]
    fn unbookable_segments_are_skipped() {
        let sold = SegmentDraft::offer("sold", "prov", p(0.0, 0.0), p(10.0, 0.0))
            .times(Tick::new(0), Tick::new(5))
            .capacity(Capacity::Limited(1))
            .consumed(1)
            .build()
            .unwrap();
        assert_eq!(sold.status(), SegmentStatus::SoldOut);

        let graph = Graph::build(vec![sold]);
        let config = SearchConfig::default();
        let out =
            PathEnumerator::new(&graph, &config).enumerate(p(0.0, 0.0), p(10.0, 0.0), Tick::new(0), 5, 2);
        assert!(out.paths.is_empty());
    }

    #[test]
    fn cycles_are_not_revisited() {
        let graph = Graph::build(vec![
            seg("out", p(0.0, 0.0), p(10.0, 0.0), 0, 1),
            seg("back", p(10.0, 0.0), p(0.0, 0.0), 1, 2),
            seg("on", p(10.0, 0.0), p(20.0, 0.0), 2, 3),
        ]);
        let config = SearchConfig::default();
        let out =
            PathEnumerator::new(&graph, &config).enumerate(p(0.0, 0.0), p(20.0, 0.0), Tick::new(0), 1, 5);
        assert_eq!(out.paths.len(), 1);
        assert_eq!(ids(&out.paths[0]), vec!["out", "on"]);
    }

    #[test]
    fn nearby_departures_only_on_first_hop() {
        // Boarding at (1,0) is allowed from origin (0,0); the onward leg
        // from (11,0) is not reachable from the first segment's end (10,0).
        let graph = Graph::build(vec![
            seg("near", p(1.0, 0.0), p(10.0, 0.0), 0, 5),
            seg("offset", p(11.0, 0.0), p(30.0, 0.0), 6, 10),
        ]);
        let config = SearchConfig::default();
        let enumerator = PathEnumerator::new(&graph, &config);

        let out = enumerator.enumerate(p(0.0, 0.0), p(10.0, 0.0), Tick::new(0), 5, 2);
        assert_eq!(out.paths.len(), 1);
        assert_eq!(ids(&out.paths[0]), vec!["near"]);

        let out = enumerator.enumerate(p(0.0, 0.0), p(30.0, 0.0), Tick::new(0), 5, 2);
        assert!(out.paths.is_empty());
    }

    #[test]
    fn nearby_boarding_node_is_not_revisited() {
        // Boarding "near" at (1,0) counts as visiting (1,0), so riding
        // "back" there and on again is a cycle.
        let graph = Graph::build(vec![
            seg("near", p(1.0, 0.0), p(10.0, 0.0), 0, 5),
            seg("back", p(10.0, 0.0), p(1.0, 0.0), 6, 8),
            seg("on", p(1.0, 0.0), p(30.0, 0.0), 9, 12),
        ]);
        let config = SearchConfig::default();
        let out =
            PathEnumerator::new(&graph, &config).enumerate(p(0.0, 0.0), p(30.0, 0.0), Tick::new(0), 5, 3);

        assert_eq!(out.paths.len(), 1);
        assert_eq!(ids(&out.paths[0]), vec!["on"]);
    }

    #[test]
    fn walks_are_retimed_and_never_chained() {
        let mut graph = Graph::build(vec![seg("bus", p(2.0, 0.0), p(20.0, 0.0), 10, 20)]);
        let origin = p(0.0, 0.0);
        let dest = p(22.0, 0.0);
        graph.inject_walk_edges(origin, dest, Tick::new(5), &WalkConfig::new(3.0, 1.0));

        let config = SearchConfig::new(2, 5, 0.0, 0.0, 100, 10, false);
        let out = PathEnumerator::new(&graph, &config).enumerate(origin, dest, Tick::new(5), 5, 2);

        assert_eq!(out.paths.len(), 1);
        let path = &out.paths[0];
        assert_eq!(ids(path), vec!["walk:0,0->2,0", "bus", "walk:20,0->22,0"]);
        assert_eq!(path.segments()[0].depart(), Tick::new(5));
        assert_eq!(path.segments()[2].depart(), Tick::new(20));
        assert_eq!(path.arrive(), Some(Tick::new(22)));
    }

    #[test]
    fn path_cap_truncates() {
        // Many parallel segments, each a separate path.
        let segments: Vec<_> = (0..20)
            .map(|i| seg(&format!("s{i}"), p(0.0, 0.0), p(10.0, 0.0), 0, 5))
            .collect();
        let graph = Graph::build(segments);
        let config = SearchConfig::new(2, 5, 0.0, 0.0, 7, 10, false);
        let out =
            PathEnumerator::new(&graph, &config).enumerate(p(0.0, 0.0), p(10.0, 0.0), Tick::new(0), 1, 0);
        assert_eq!(out.paths.len(), 7);
        assert!(out.truncated);
    }
}
