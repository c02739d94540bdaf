//! # Network Model
//!
//! Immutable arena of nodes and edges built once per planning run.
//!
//! Every distinct input coordinate gets a stable [`NodeId`] at ingestion;
//! after that, coordinates are only an attribute. Load counters, pheromone
//! tables and the like are indexed by these ids instead of by float tuples.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::geometry::{Axis, Bounds, Point3, PointKey};
use crate::error::InputError;

/// Stable index of a node within a [`Network`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// Stable index of an edge (input order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub usize);

/// Stable index of a row; rows are numbered by ascending coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl EdgeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl RowId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Edge tag supplied by the ingestion layer
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EdgeCategory {
    #[default]
    Normal,
    /// Leads to an intercom endpoint, which may only ever receive data
    Intercom,
}

/// One cable as supplied by the ingestion layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeInput {
    pub start: Point3,
    pub end: Point3,
    #[serde(default)]
    pub category: EdgeCategory,
}

/// Raw network as supplied by the ingestion layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInput {
    pub nodes: Vec<Point3>,
    pub edges: Vec<EdgeInput>,
}

impl NetworkInput {
    /// Build an input whose node set is every distinct edge endpoint
    pub fn from_edges(edges: Vec<EdgeInput>) -> Self {
        let mut seen = HashMap::new();
        let mut nodes = Vec::new();
        for e in &edges {
            for p in [e.start, e.end] {
                if seen.insert(p.key(), ()).is_none() {
                    nodes.push(p);
                }
            }
        }
        Self { nodes, edges }
    }
}

/// A cable between two distinct nodes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Edge {
    pub id: EdgeId,
    pub a: NodeId,
    pub b: NodeId,
    pub category: EdgeCategory,
}

impl Edge {
    pub fn touches(&self, node: NodeId) -> bool {
        self.a == node || self.b == node
    }

    /// The endpoint opposite to `node`, if `node` is an endpoint
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if self.a == node {
            Some(self.b)
        } else if self.b == node {
            Some(self.a)
        } else {
            None
        }
    }
}

/// A group of nodes sharing one coordinate on the row axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Row {
    pub id: RowId,
    pub coordinate: f64,
}

/// General network statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    /// Sum of edge lengths (m)
    pub total_length: f64,
    pub avg_degree: f64,
    /// Edges relative to a complete graph on the same nodes
    pub density: f64,
}

#[derive(Debug, Clone)]
pub struct Network {
    positions: Vec<Point3>,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<NodeId>>,
    incident: Vec<Vec<EdgeId>>,
    restricted: Vec<bool>,
    row_of: Vec<RowId>,
    rows: Vec<Row>,
    row_axis: Axis,
    bounds: Bounds,
}

impl Network {
    /// Validate raw input and build the arena.
    ///
    /// Duplicate node coordinates collapse to one node. Edges must reference
    /// known nodes and must not be self-loops. Parallel edges are kept as
    /// independent units.
    pub fn from_input(input: &NetworkInput, row_axis: Axis) -> Result<Self, InputError> {
        if input.nodes.is_empty() {
            return Err(InputError::EmptyNodes);
        }
        if input.edges.is_empty() {
            return Err(InputError::EmptyEdges);
        }

        let mut ids: HashMap<PointKey, NodeId> = HashMap::with_capacity(input.nodes.len());
        let mut positions = Vec::with_capacity(input.nodes.len());
        for point in &input.nodes {
            if !point.is_finite() {
                return Err(InputError::NonFiniteCoordinate { point: *point });
            }
            if ids.contains_key(&point.key()) {
                debug!(%point, "duplicate node coordinate collapsed");
                continue;
            }
            ids.insert(point.key(), NodeId(positions.len()));
            positions.push(*point);
        }

        let lookup = |edge: usize, point: &Point3| {
            ids.get(&point.key())
                .copied()
                .ok_or(InputError::UnknownNode { edge, point: *point })
        };

        let mut edges = Vec::with_capacity(input.edges.len());
        for (i, raw) in input.edges.iter().enumerate() {
            let a = lookup(i, &raw.start)?;
            let b = lookup(i, &raw.end)?;
            if a == b {
                return Err(InputError::SelfLoop {
                    edge: i,
                    point: raw.start,
                });
            }
            edges.push(Edge {
                id: EdgeId(i),
                a,
                b,
                category: raw.category,
            });
        }

        let n = positions.len();
        let mut adjacency = vec![Vec::new(); n];
        let mut incident = vec![Vec::new(); n];
        for edge in &edges {
            adjacency[edge.a.0].push(edge.b);
            adjacency[edge.b.0].push(edge.a);
            incident[edge.a.0].push(edge.id);
            incident[edge.b.0].push(edge.id);
        }

        // Restricted sinks: nodes whose every cable is an intercom cable
        let restricted = incident
            .iter()
            .map(|list| {
                !list.is_empty()
                    && list
                        .iter()
                        .all(|e| edges[e.0].category == EdgeCategory::Intercom)
            })
            .collect();

        let mut coords: BTreeMap<OrderedFloat<f64>, RowId> = BTreeMap::new();
        for p in &positions {
            coords.insert(OrderedFloat(p.along(row_axis)), RowId(0));
        }
        let mut rows = Vec::with_capacity(coords.len());
        for (i, (coord, id)) in coords.iter_mut().enumerate() {
            *id = RowId(i);
            rows.push(Row {
                id: RowId(i),
                coordinate: coord.0,
            });
        }
        let row_of = positions
            .iter()
            .map(|p| coords[&OrderedFloat(p.along(row_axis))])
            .collect();

        let bounds = Bounds::from_points(&positions).ok_or(InputError::EmptyNodes)?;

        Ok(Self {
            positions,
            edges,
            adjacency,
            incident,
            restricted,
            row_of,
            rows,
            row_axis,
            bounds,
        })
    }

    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All node ids in ascending order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.positions.len()).map(NodeId)
    }

    pub fn position(&self, node: NodeId) -> Point3 {
        self.positions[node.0]
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0]
    }

    pub fn edge_length(&self, id: EdgeId) -> f64 {
        let e = &self.edges[id.0];
        self.positions[e.a.0].distance(&self.positions[e.b.0])
    }

    /// Nodes one cable away, one entry per cable
    pub fn neighbors(&self, node: NodeId) -> &[NodeId] {
        &self.adjacency[node.0]
    }

    pub fn incident_edges(&self, node: NodeId) -> &[EdgeId] {
        &self.incident[node.0]
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.incident[node.0].len()
    }

    /// True for intercom endpoints, which may never be hubs or data sources
    pub fn is_restricted(&self, node: NodeId) -> bool {
        self.restricted[node.0]
    }

    pub fn row_axis(&self) -> Axis {
        self.row_axis
    }

    pub fn row_of(&self, node: NodeId) -> RowId {
        self.row_of[node.0]
    }

    /// Rows sorted by ascending coordinate (`rows()[i].id == RowId(i)`)
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn stats(&self) -> NetworkStats {
        let n = self.node_count();
        let m = self.edge_count();
        let total_length = self.edges.iter().map(|e| self.edge_length(e.id)).sum();
        let avg_degree = self.incident.iter().map(Vec::len).sum::<usize>() as f64 / n as f64;
        let density = if n > 1 {
            m as f64 / (n as f64 * (n as f64 - 1.0) / 2.0)
        } else {
            0.0
        };
        NetworkStats {
            total_nodes: n,
            total_edges: m,
            total_length,
            avg_degree,
            density,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(a: (f64, f64), b: (f64, f64)) -> EdgeInput {
        EdgeInput {
            start: Point3::new(a.0, a.1, 0.0),
            end: Point3::new(b.0, b.1, 0.0),
            category: EdgeCategory::Normal,
        }
    }

    #[test]
    fn test_build_assigns_stable_ids_and_rows() {
        let input = NetworkInput::from_edges(vec![
            edge((0.0, 0.0), (1.0, 0.0)),
            edge((1.0, 0.0), (1.0, 2.0)),
        ]);
        let net = Network::from_input(&input, Axis::Y).unwrap();

        assert_eq!(net.node_count(), 3);
        assert_eq!(net.edge_count(), 2);
        assert_eq!(net.rows().len(), 2);
        assert_eq!(net.row_of(NodeId(0)), RowId(0));
        assert_eq!(net.row_of(NodeId(2)), RowId(1));
        assert_eq!(net.degree(NodeId(1)), 2);
        assert_eq!(net.neighbors(NodeId(1)), &[NodeId(0), NodeId(2)]);
    }

    #[test]
    fn test_empty_input_rejected() {
        let empty = NetworkInput::default();
        assert_eq!(
            Network::from_input(&empty, Axis::Y).unwrap_err(),
            InputError::EmptyNodes
        );

        let no_edges = NetworkInput {
            nodes: vec![Point3::new(0.0, 0.0, 0.0)],
            edges: vec![],
        };
        assert_eq!(
            Network::from_input(&no_edges, Axis::Y).unwrap_err(),
            InputError::EmptyEdges
        );
    }

    #[test]
    fn test_unknown_node_rejected() {
        let input = NetworkInput {
            nodes: vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)],
            edges: vec![edge((0.0, 0.0), (5.0, 0.0))],
        };
        assert!(matches!(
            Network::from_input(&input, Axis::Y),
            Err(InputError::UnknownNode { edge: 0, .. })
        ));
    }

    #[test]
    fn test_self_loop_rejected() {
        let input = NetworkInput::from_edges(vec![edge((1.0, 1.0), (1.0, 1.0))]);
        assert!(matches!(
            Network::from_input(&input, Axis::Y),
            Err(InputError::SelfLoop { edge: 0, .. })
        ));
    }

    #[test]
    fn test_parallel_edges_are_independent() {
        let input = NetworkInput::from_edges(vec![
            edge((0.0, 0.0), (1.0, 0.0)),
            edge((1.0, 0.0), (0.0, 0.0)),
        ]);
        let net = Network::from_input(&input, Axis::Y).unwrap();
        assert_eq!(net.edge_count(), 2);
        assert_eq!(net.degree(NodeId(0)), 2);
    }

    #[test]
    fn test_pure_intercom_nodes_are_restricted() {
        let mut intercom = edge((1.0, 0.0), (2.0, 0.0));
        intercom.category = EdgeCategory::Intercom;
        let input = NetworkInput::from_edges(vec![edge((0.0, 0.0), (1.0, 0.0)), intercom]);
        let net = Network::from_input(&input, Axis::Y).unwrap();

        assert!(!net.is_restricted(NodeId(0)));
        // Shared between a normal and an intercom cable
        assert!(!net.is_restricted(NodeId(1)));
        assert!(net.is_restricted(NodeId(2)));
    }

    #[test]
    fn test_network_stats() {
        let input = NetworkInput::from_edges(vec![
            edge((0.0, 0.0), (3.0, 0.0)),
            edge((3.0, 0.0), (3.0, 4.0)),
        ]);
        let stats = Network::from_input(&input, Axis::Y).unwrap().stats();
        assert_eq!(stats.total_nodes, 3);
        assert!((stats.total_length - 7.0).abs() < 1e-12);
        assert!((stats.avg_degree - 4.0 / 3.0).abs() < 1e-12);
        assert!((stats.density - 2.0 / 3.0).abs() < 1e-12);
    }
}
