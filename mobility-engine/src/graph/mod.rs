//! Per-query segment graph.
//!
//! Segment endpoints are snapped to integer grid nodes; each segment becomes
//! a directed edge from its origin node to its destination node. Walk edges
//! are synthesized around the query's origin and destination so a traveler
//! can reach nearby departures and leave from nearby arrivals.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::trace;

use crate::domain::{NodeId, Point, Segment, Tick};

/// Walking parameters.
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Maximum straight-line distance of a synthesized walk.
    pub radius: f64,

    /// Ticks needed to walk one grid unit.
    pub ticks_per_unit: f64,
}

impl WalkConfig {
    /// Create a new configuration with the given parameters.
    pub fn new(radius: f64, ticks_per_unit: f64) -> Self {
        Self {
            radius,
            ticks_per_unit,
        }
    }

    /// Ticks needed to walk `distance`, rounded up, never less than one.
    pub fn walk_ticks(&self, distance: f64) -> i64 {
        let ticks = (distance * self.ticks_per_unit).ceil();
        if ticks.is_finite() { (ticks as i64).max(1) } else { 1 }
    }
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            radius: 5.0,
            ticks_per_unit: 1.0,
        }
    }
}

/// A traversable segment leaving some node.
#[derive(Debug, Clone)]
pub struct Edge {
    pub to: NodeId,
    pub segment: Segment,
}

/// Adjacency list over quantized nodes.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    adjacency: HashMap<NodeId, Vec<Edge>>,
    nodes: BTreeSet<NodeId>,
    walks: HashSet<(NodeId, NodeId)>,
}

impl Graph {
    /// Build a graph with one edge per segment.
    pub fn build<I>(segments: I) -> Self
    where
        I: IntoIterator<Item = Segment>,
    {
        let mut graph = Self::default();
        for segment in segments {
            graph.add_edge(segment);
        }
        trace!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Graph built"
        );
        graph
    }

    fn add_edge(&mut self, segment: Segment) {
        let from = segment.origin_node();
        let to = segment.destination_node();
        self.nodes.insert(from);
        self.nodes.insert(to);
        self.adjacency
            .entry(from)
            .or_default()
            .push(Edge { to, segment });
    }

    fn add_walk(&mut self, from: Point, to: Point, start: Tick, config: &WalkConfig) -> bool {
        let key = (from.quantize(), to.quantize());
        if key.0 == key.1 || !self.walks.insert(key) {
            return false;
        }
        let duration = config.walk_ticks(from.distance(&to));
        self.add_edge(Segment::walk(from, to, start, duration));
        true
    }

    /// Add walk edges from `origin` to every node within the walk radius and
    /// from every such node to `destination`.
    ///
    /// Walks depart at `start`; the search re-times them to the moment the
    /// traveler actually sets off. A direct origin-to-destination walk is
    /// added first when the two are within radius. At most one walk joins any
    /// ordered pair of nodes. Returns the number of walks added.
    pub fn inject_walk_edges(
        &mut self,
        origin: Point,
        destination: Point,
        start: Tick,
        config: &WalkConfig,
    ) -> usize {
        let origin_node = origin.quantize();
        let destination_node = destination.quantize();
        self.nodes.insert(origin_node);
        self.nodes.insert(destination_node);

        let mut added = 0;
        if origin.distance(&destination) <= config.radius
            && self.add_walk(origin, destination, start, config)
        {
            added += 1;
        }

        let nodes: Vec<NodeId> = self.nodes.iter().copied().collect();
        for node in &nodes {
            if node.distance_to(&origin) <= config.radius
                && self.add_walk(origin, node.point(), start, config)
            {
                added += 1;
            }
        }
        for node in &nodes {
            if node.distance_to(&destination) <= config.radius
                && self.add_walk(node.point(), destination, start, config)
            {
                added += 1;
            }
        }

        trace!(
            added,
            origin = %origin_node,
            destination = %destination_node,
            "Walk edges injected"
        );
        added
    }

    /// Edges leaving `node`, in insertion order.
    pub fn edges_from(&self, node: NodeId) -> &[Edge] {
        self.adjacency.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes within `distance` of `point`, in ascending node order.
    pub fn nodes_near<'a>(
        &'a self,
        point: &'a Point,
        distance: f64,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes
            .iter()
            .copied()
            .filter(move |node| node.distance_to(point) <= distance)
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SegmentDraft;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn segment(id: &str, from: Point, to: Point) -> Segment {
        SegmentDraft::offer(id, "prov", from, to)
            .times(Tick::new(0), Tick::new(10))
            .build()
            .unwrap()
    }

    #[test]
    fn build_groups_edges_by_origin_node() {
        let graph = Graph::build(vec![
            segment("a", p(0.0, 0.0), p(10.0, 0.0)),
            segment("b", p(0.4, 0.2), p(0.0, 10.0)),
            segment("c", p(10.0, 0.0), p(20.0, 0.0)),
        ]);

        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.edges_from(NodeId::new(0, 0)).len(), 2);
        assert_eq!(graph.edges_from(NodeId::new(10, 0)).len(), 1);
        assert!(graph.edges_from(NodeId::new(20, 0)).is_empty());
    }

    #[test]
    fn direct_walk_when_within_radius() {
        let mut graph = Graph::default();
        let added = graph.inject_walk_edges(
            p(0.0, 0.0),
            p(3.0, 4.0),
            Tick::new(7),
            &WalkConfig::new(5.0, 2.0),
        );

        assert_eq!(added, 1);
        let edges = graph.edges_from(NodeId::new(0, 0));
        assert_eq!(edges.len(), 1);
        let walk = &edges[0].segment;
        assert!(walk.is_walk());
        assert_eq!(walk.id().as_str(), "walk:0,0->3,4");
        assert_eq!(walk.depart(), Tick::new(7));
        assert_eq!(walk.duration(), 10);
        assert_eq!(walk.price(), 0.0);
    }

    #[test]
    fn no_walk_beyond_radius() {
        let mut graph = Graph::default();
        let added =
            graph.inject_walk_edges(p(0.0, 0.0), p(30.0, 0.0), Tick::new(0), &WalkConfig::default());
        assert_eq!(added, 0);
        // Query endpoints are still nodes.
        assert!(graph.contains_node(NodeId::new(0, 0)));
        assert!(graph.contains_node(NodeId::new(30, 0)));
    }

    #[test]
    fn walks_reach_nearby_stops() {
        let mut graph = Graph::build(vec![segment("bus", p(2.0, 0.0), p(20.0, 0.0))]);
        let added =
            graph.inject_walk_edges(p(0.0, 0.0), p(21.0, 0.0), Tick::new(0), &WalkConfig::default());

        // origin -> (2,0) and (20,0) -> destination
        assert_eq!(added, 2);
        let from_origin: Vec<_> = graph
            .edges_from(NodeId::new(0, 0))
            .iter()
            .map(|e| e.to)
            .collect();
        assert_eq!(from_origin, vec![NodeId::new(2, 0)]);
        let into_destination: Vec<_> = graph
            .edges_from(NodeId::new(20, 0))
            .iter()
            .filter(|e| e.segment.is_walk())
            .map(|e| e.to)
            .collect();
        assert_eq!(into_destination, vec![NodeId::new(21, 0)]);
    }

    #[test]
    fn walks_are_not_duplicated() {
        let mut graph = Graph::default();
        let config = WalkConfig::default();
        graph.inject_walk_edges(p(0.0, 0.0), p(1.0, 0.0), Tick::new(0), &config);
        let again = graph.inject_walk_edges(p(0.0, 0.0), p(1.0, 0.0), Tick::new(0), &config);
        assert_eq!(again, 0);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn walk_duration_is_at_least_one_tick() {
        let config = WalkConfig::new(5.0, 0.1);
        assert_eq!(config.walk_ticks(0.2), 1);
        assert_eq!(config.walk_ticks(15.0), 2);
        assert_eq!(WalkConfig::default().walk_ticks(2.5), 3);
    }

    #[test]
    fn nodes_near_is_sorted() {
        let graph = Graph::build(vec![
            segment("a", p(1.0, 0.0), p(50.0, 50.0)),
            segment("b", p(-1.0, 0.0), p(0.0, 1.0)),
        ]);
        let origin = p(0.0, 0.0);
        let near: Vec<_> = graph.nodes_near(&origin, 1.5).collect();
        assert_eq!(
            near,
            vec![NodeId::new(-1, 0), NodeId::new(0, 1), NodeId::new(1, 0)]
        );
    }
}
