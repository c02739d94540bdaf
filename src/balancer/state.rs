//! Mutable load bookkeeping shared by the balancing phases.

use crate::coverage::HubSet;
use crate::domain::{EdgeId, Network, NodeId, RowId};

use super::{DirectedEdge, PortViolation, RowViolation};

/// Current directions plus the per-hub and per-row counters derived from them
pub(crate) struct LoadState<'a> {
    pub network: &'a Network,
    pub hubs: &'a HubSet,
    pub directions: Vec<Option<DirectedEdge>>,
    /// Outgoing edges per node (always 0 for non-hubs)
    pub outputs: Vec<u32>,
    /// Outgoing edges per row, by the row of the source hub
    pub row_loads: Vec<u32>,
}

impl<'a> LoadState<'a> {
    /// Hub → other for single-hub edges; between two hubs the one with fewer
    /// outputs so far is the source (first endpoint on ties)
    pub fn initial(network: &'a Network, hubs: &'a HubSet) -> Self {
        let mut state = Self {
            network,
            hubs,
            directions: vec![None; network.edge_count()],
            outputs: vec![0; network.node_count()],
            row_loads: vec![0; network.rows().len()],
        };

        for edge in network.edges() {
            let source = match (hubs.contains(edge.a), hubs.contains(edge.b)) {
                (true, true) => {
                    if state.outputs[edge.a.0] <= state.outputs[edge.b.0] {
                        edge.a
                    } else {
                        edge.b
                    }
                }
                (true, false) => edge.a,
                (false, true) => edge.b,
                (false, false) => continue,
            };
            let sink = if source == edge.a { edge.b } else { edge.a };
            state.assign(DirectedEdge {
                edge: edge.id,
                source,
                sink,
            });
        }
        state
    }

    fn assign(&mut self, directed: DirectedEdge) {
        self.outputs[directed.source.0] += 1;
        self.row_loads[self.network.row_of(directed.source).0] += 1;
        self.directions[directed.edge.0] = Some(directed);
    }

    fn release(&mut self, edge: EdgeId) -> Option<DirectedEdge> {
        let directed = self.directions[edge.0].take()?;
        self.outputs[directed.source.0] -= 1;
        self.row_loads[self.network.row_of(directed.source).0] -= 1;
        Some(directed)
    }

    /// Feed the sink of `edge` from `new_source` instead
    pub fn redirect(&mut self, edge: EdgeId, new_source: NodeId) {
        if let Some(directed) = self.release(edge) {
            self.assign(DirectedEdge {
                source: new_source,
                ..directed
            });
        }
    }

    /// Swap source and sink of `edge`
    pub fn reverse(&mut self, edge: EdgeId) {
        if let Some(directed) = self.release(edge) {
            self.assign(DirectedEdge {
                edge: directed.edge,
                source: directed.sink,
                sink: directed.source,
            });
        }
    }

    pub fn directed(&self) -> impl Iterator<Item = &DirectedEdge> + '_ {
        self.directions.iter().flatten()
    }

    /// Directed edges whose source sits in `row`, in edge order
    pub fn sourced_in_row(&self, row: RowId) -> Vec<DirectedEdge> {
        self.directed()
            .filter(|d| self.network.row_of(d.source) == row)
            .copied()
            .collect()
    }

    /// Directed edges fed by `hub`, in edge order
    pub fn sourced_at(&self, hub: NodeId) -> Vec<DirectedEdge> {
        self.directed().filter(|d| d.source == hub).copied().collect()
    }

    /// Hubs adjacent to the sink that could feed it instead of the current source
    pub fn alternates(&self, directed: &DirectedEdge) -> Vec<NodeId> {
        let mut alternates: Vec<NodeId> = Vec::new();
        for &n in self.network.neighbors(directed.sink) {
            if n != directed.source && self.hubs.contains(n) && !alternates.contains(&n) {
                alternates.push(n);
            }
        }
        alternates
    }

    pub fn row_of(&self, node: NodeId) -> RowId {
        self.network.row_of(node)
    }

    pub fn max_row_load(&self) -> u32 {
        self.row_loads.iter().copied().max().unwrap_or(0)
    }

    /// Over-subscribed hubs, ascending by node id
    pub fn port_violations(&self, port_limit: u32) -> Vec<PortViolation> {
        self.outputs
            .iter()
            .enumerate()
            .filter(|(_, &outputs)| outputs > port_limit)
            .map(|(i, &outputs)| PortViolation {
                hub: NodeId(i),
                outputs,
            })
            .collect()
    }

    pub fn row_violations(&self, amp_limit: u32) -> Vec<RowViolation> {
        self.row_loads
            .iter()
            .enumerate()
            .filter(|(_, &load)| load > amp_limit)
            .map(|(i, &load)| RowViolation {
                row: RowId(i),
                load,
            })
            .collect()
    }
}
