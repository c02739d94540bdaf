//! Greedy angular routing
//!
//! Hubs go to their nearest supply point. Around each supply they are swept
//! by bearing into wedge-shaped, power-limited sectors, and each sector is
//! chained from the supply with the penalised nearest-neighbour rule. The
//! sweep keeps circuits from crossing the whole network.

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;

use crate::domain::Point3;
use crate::routing::circuit::{group_by_supply, nearest_assignment, penalised_chains, split_by_power};
use crate::routing::types::{Circuit, RouteContext, RoutingProblem, RoutingSolution, RoutingStrategy, SupplyPoint};
use crate::routing::RoutingError;

pub struct GreedyAngular;

impl RoutingStrategy for GreedyAngular {
    fn name(&self) -> &'static str {
        "greedy_angular"
    }

    fn route(
        &self,
        ctx: &RouteContext<'_>,
        _rng: &mut StdRng,
    ) -> Result<RoutingSolution, RoutingError> {
        let circuits = greedy_circuits(ctx.problem, ctx.supplies);
        Ok(RoutingSolution::new(self.name(), ctx.supplies.to_vec(), circuits))
    }
}

/// Hubs ordered by bearing from the depot, nearest first within a bearing.
///
/// Hubs sitting on the depot have no bearing and sort before all others.
pub fn angular_order(problem: &RoutingProblem, depot: Point3, hubs: &[usize]) -> Vec<usize> {
    let mut ordered = hubs.to_vec();
    ordered.sort_by_key(|&h| {
        let bearing = depot.bearing_to(&problem.position(h));
        (
            bearing.is_some(),
            OrderedFloat(bearing.unwrap_or(0.0)),
            OrderedFloat(problem.depot_distance(depot, h)),
            h,
        )
    });
    ordered
}

/// Greedy angular circuits for the given supply points
pub fn greedy_circuits(problem: &RoutingProblem, supplies: &[SupplyPoint]) -> Vec<Circuit> {
    let groups = group_by_supply(&nearest_assignment(problem, supplies), supplies.len());
    let mut circuits = Vec::new();
    for (s, hubs) in groups.iter().enumerate() {
        if hubs.is_empty() {
            continue;
        }
        let depot = supplies[s].position;
        let sectors = split_by_power(problem, &angular_order(problem, depot, hubs));
        tracing::debug!(supply = s, hubs = hubs.len(), sectors = sectors.len(), "angular sectors");

        for sector in sectors {
            for route in penalised_chains(problem, depot, &sector) {
                circuits.push(Circuit::new(problem, depot, s, route));
            }
        }
    }
    circuits
}
