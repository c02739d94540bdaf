//! # Coverage Planner
//!
//! Chooses the hub nodes that carry the data signal.
//!
//! The default mode is a greedy minimum set cover over edges: keep picking
//! the candidate touching the most still-uncovered edges until every edge
//! has a hub endpoint. An optional target count truncates the result by
//! degree, and the clustered mode spreads a fixed number of hubs with
//! k-means instead. Partial coverage is reported in [`CoverageStats`],
//! never raised as an error.

pub mod clustering;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::config::CoverageConfig;
use crate::domain::{EdgeCategory, EdgeId, Network, NodeId};
use crate::progress::{CancelFlag, ProgressEvent, ProgressObserver};

pub use clustering::{kmeans_medoids, select_central_hubs};

/// How hubs are chosen
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
#[strum(serialize_all = "snake_case")]
pub enum HubSelection {
    /// Greedy edge cover, optionally truncated to the target count
    #[default]
    GreedyCover,
    /// Degree-ranked candidates spread over the target count with k-means
    Clustered,
}

/// Immutable set of hub nodes, in selection order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HubSet {
    order: Vec<NodeId>,
    #[serde(skip)]
    member: Vec<bool>,
}

impl HubSet {
    /// Build a hub set over a network of `node_count` nodes; duplicates are dropped
    pub fn new(node_count: usize, hubs: impl IntoIterator<Item = NodeId>) -> Self {
        let mut member = vec![false; node_count];
        let mut order = Vec::new();
        for hub in hubs {
            if !member[hub.0] {
                member[hub.0] = true;
                order.push(hub);
            }
        }
        Self { order, member }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.member.get(node.0).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().copied()
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.order
    }

    /// DMX universe of a hub: selection position + 1
    pub fn universe(&self, node: NodeId) -> Option<u16> {
        self.order
            .iter()
            .position(|&h| h == node)
            .and_then(|i| u16::try_from(i + 1).ok())
    }
}

/// Coverage statistics for a hub set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub hub_count: usize,
    pub end_nodes: usize,
    pub covered_edges: usize,
    pub uncovered_edges: usize,
    /// Share of edges with at least one hub endpoint (0-100)
    pub coverage_percent: f64,
    /// Mean distance from each node to its nearest hub
    pub avg_hub_distance: Option<f64>,
    pub max_hub_distance: Option<f64>,
    /// Nodes served per hub
    pub nodes_per_hub: Option<f64>,
}

impl CoverageStats {
    pub fn is_complete(&self) -> bool {
        self.uncovered_edges == 0
    }
}

/// Result of the coverage stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoveragePlan {
    pub hubs: HubSet,
    pub uncovered: Vec<EdgeId>,
    pub stats: CoverageStats,
}

/// Greedy minimum edge cover.
///
/// Restricted (intercom) nodes are never candidates. Ties go to the lowest
/// node id. Stops early when no candidate covers anything or when cancelled;
/// the edges still uncovered are returned alongside the hubs.
pub fn greedy_cover(
    network: &Network,
    observer: &dyn ProgressObserver,
    cancel: &CancelFlag,
) -> (Vec<NodeId>, Vec<EdgeId>) {
    let mut covered = vec![false; network.edge_count()];
    let mut open: Vec<usize> = network.node_ids().map(|n| network.degree(n)).collect();
    let mut is_hub = vec![false; network.node_count()];
    let mut remaining = network.edge_count();
    let mut hubs = Vec::new();

    while remaining > 0 && !cancel.is_cancelled() {
        let mut best: Option<(NodeId, usize)> = None;
        for node in network.node_ids() {
            if is_hub[node.0] || network.is_restricted(node) {
                continue;
            }
            let gain = open[node.0];
            if gain > best.map_or(0, |(_, g)| g) {
                best = Some((node, gain));
            }
        }
        let Some((hub, gain)) = best else {
            break;
        };

        is_hub[hub.0] = true;
        hubs.push(hub);
        for &edge_id in network.incident_edges(hub) {
            if covered[edge_id.0] {
                continue;
            }
            covered[edge_id.0] = true;
            let edge = network.edge(edge_id);
            open[edge.a.0] -= 1;
            open[edge.b.0] -= 1;
        }
        remaining -= gain;

        observer.on_event(&ProgressEvent::HubAdded {
            node: hub,
            covered: gain,
            remaining,
        });
    }

    let uncovered = network
        .edges()
        .iter()
        .filter(|e| !covered[e.id.0])
        .map(|e| e.id)
        .collect();
    (hubs, uncovered)
}

/// Non-restricted endpoints of intercom cables, in edge order.
///
/// An intercom endpoint can only be fed through its cable, so these nodes
/// must be hubs whatever the selection mode.
pub fn intercom_feeders(network: &Network) -> Vec<NodeId> {
    network
        .edges()
        .iter()
        .filter(|e| e.category == EdgeCategory::Intercom)
        .filter_map(|e| match (network.is_restricted(e.a), network.is_restricted(e.b)) {
            (false, true) => Some(e.a),
            (true, false) => Some(e.b),
            _ => None,
        })
        .unique()
        .collect()
}

/// Keep intercom feeders, then the hubs with the most incident edges
/// (stable on ties) up to `target`. Feeders are never dropped, so the
/// result exceeds `target` when there are more feeders than that.
pub fn truncate_to_target(network: &Network, hubs: &[NodeId], target: usize) -> Vec<NodeId> {
    if hubs.len() <= target {
        return hubs.to_vec();
    }
    let feeders = intercom_feeders(network);
    let (pinned, rest): (Vec<NodeId>, Vec<NodeId>) =
        hubs.iter().copied().partition(|h| feeders.contains(h));
    let keep = target.saturating_sub(pinned.len());
    pinned
        .into_iter()
        .chain(
            rest.into_iter()
                .sorted_by(|a, b| network.degree(*b).cmp(&network.degree(*a)))
                .take(keep),
        )
        .collect()
}

/// Append every intercom feeder missing from `hubs`
fn pin_intercom_feeders(network: &Network, hubs: &mut Vec<NodeId>) {
    for feeder in intercom_feeders(network) {
        if !hubs.contains(&feeder) {
            tracing::debug!(node = feeder.0, "intercom feeder pinned as hub");
            hubs.push(feeder);
        }
    }
}

/// Edge coverage and distance statistics of a hub set
pub fn coverage_of(network: &Network, hubs: &HubSet) -> (Vec<EdgeId>, CoverageStats) {
    let uncovered: Vec<EdgeId> = network
        .edges()
        .iter()
        .filter(|e| !hubs.contains(e.a) && !hubs.contains(e.b))
        .map(|e| e.id)
        .collect();

    let total_edges = network.edge_count();
    let covered_edges = total_edges - uncovered.len();

    let nearest: Vec<f64> = if hubs.is_empty() {
        Vec::new()
    } else {
        network
            .node_ids()
            .map(|n| {
                let p = network.position(n);
                hubs.iter()
                    .map(|h| p.distance(&network.position(h)))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect()
    };

    let stats = CoverageStats {
        total_nodes: network.node_count(),
        total_edges,
        hub_count: hubs.len(),
        end_nodes: network.node_count() - hubs.len(),
        covered_edges,
        uncovered_edges: uncovered.len(),
        coverage_percent: covered_edges as f64 / total_edges as f64 * 100.0,
        avg_hub_distance: (!nearest.is_empty())
            .then(|| nearest.iter().sum::<f64>() / nearest.len() as f64),
        max_hub_distance: nearest.iter().copied().reduce(f64::max),
        nodes_per_hub: (!hubs.is_empty())
            .then(|| network.node_count() as f64 / hubs.len() as f64),
    };
    (uncovered, stats)
}

/// Greedy cover, truncated to `target_count` when the cover is larger
pub fn plan_hubs(
    network: &Network,
    target_count: Option<usize>,
    observer: &dyn ProgressObserver,
    cancel: &CancelFlag,
) -> CoveragePlan {
    let (mut hubs, _) = greedy_cover(network, observer, cancel);
    if let Some(target) = target_count {
        if hubs.len() > target {
            tracing::info!(
                greedy = hubs.len(),
                target,
                "truncating hub set to target count"
            );
            hubs = truncate_to_target(network, &hubs, target);
        }
    }
    finish(network, hubs, observer)
}

/// Run the coverage stage as configured
pub fn plan(
    network: &Network,
    config: &CoverageConfig,
    observer: &dyn ProgressObserver,
    cancel: &CancelFlag,
) -> CoveragePlan {
    match (config.selection, config.target_hub_count) {
        (HubSelection::Clustered, Some(k)) => {
            let mut hubs = select_central_hubs(
                network,
                k,
                config.kmeans_max_iterations,
                config.kmeans_tolerance,
            );
            pin_intercom_feeders(network, &mut hubs);
            finish(network, hubs, observer)
        }
        (HubSelection::Clustered, None) => {
            tracing::warn!("clustered hub selection needs a target count, using greedy cover");
            plan_hubs(network, None, observer, cancel)
        }
        (HubSelection::GreedyCover, target) => plan_hubs(network, target, observer, cancel),
    }
}

fn finish(network: &Network, hubs: Vec<NodeId>, observer: &dyn ProgressObserver) -> CoveragePlan {
    let hubs = HubSet::new(network.node_count(), hubs);
    let (uncovered, stats) = coverage_of(network, &hubs);
    if !uncovered.is_empty() {
        observer.on_event(&ProgressEvent::CoverageIncomplete {
            uncovered: uncovered.len(),
        });
    }
    CoveragePlan {
        hubs,
        uncovered,
        stats,
    }
}
