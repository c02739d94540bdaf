//! Per-hub power demand derived from the balanced data directions

use crate::balancer::BalanceResult;
use crate::coverage::HubSet;
use crate::domain::Network;

use super::types::HubDemand;

/// Demand per hub, in hub selection order: outgoing edges × `watts_per_edge`
pub fn hub_demands(
    network: &Network,
    hubs: &HubSet,
    balance: &BalanceResult,
    watts_per_edge: f64,
) -> Vec<HubDemand> {
    hubs.iter()
        .map(|node| HubDemand {
            node,
            position: network.position(node),
            power_w: f64::from(balance.outputs_of(node)) * watts_per_edge,
        })
        .collect()
}
