//! Routing problem, solution and strategy types

use rand::rngs::StdRng;
use serde::Serialize;

use crate::config::RoutingConfig;
use crate::domain::{Bounds, NodeId, Point3, Side};
use crate::progress::{CancelFlag, ProgressObserver};

use super::RoutingError;

/// Power comparisons tolerate this much floating-point slack (W)
pub const POWER_EPSILON: f64 = 1e-9;

/// One hub that needs power
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HubDemand {
    pub node: NodeId,
    pub position: Point3,
    /// Outgoing data edges × watts per edge
    pub power_w: f64,
}

/// External power source outside the network's bounding rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SupplyPoint {
    pub position: Point3,
    /// Side it was placed on, `None` once moved freely (annealing)
    pub side: Option<Side>,
}

impl SupplyPoint {
    pub fn on_side(side: Side, position: Point3) -> Self {
        Self {
            position,
            side: Some(side),
        }
    }

    pub fn free(position: Point3) -> Self {
        Self {
            position,
            side: None,
        }
    }
}

/// Hubs fed in order from one supply point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Circuit {
    /// Index into [`RoutingSolution::supply_points`]
    pub supply: usize,
    /// Visiting order, as indices into [`RoutingProblem::hubs`]
    pub route: Vec<usize>,
    pub power_w: f64,
    /// Supply to first hub plus every hub-to-hub segment (m)
    pub length: f64,
    /// Set when a single hub alone exceeds the circuit budget
    pub over_capacity: bool,
}

impl Circuit {
    /// Build a circuit and compute its power and length
    pub fn new(problem: &RoutingProblem, depot: Point3, supply: usize, route: Vec<usize>) -> Self {
        let power_w = route.iter().map(|&h| problem.demand(h)).sum::<f64>();
        let length = problem.route_length(depot, &route);
        Self {
            supply,
            route,
            power_w,
            length,
            over_capacity: power_w > problem.power_limit_w + POWER_EPSILON,
        }
    }
}

/// Read-only input shared by every strategy
#[derive(Debug, Clone)]
pub struct RoutingProblem {
    pub hubs: Vec<HubDemand>,
    pub bounds: Bounds,
    pub power_limit_w: f64,
    /// Row-major hub-to-hub distances
    distances: Vec<f64>,
}

impl RoutingProblem {
    pub fn new(hubs: Vec<HubDemand>, bounds: Bounds, power_limit_w: f64) -> Self {
        let n = hubs.len();
        let mut distances = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = hubs[i].position.distance(&hubs[j].position);
                distances[i * n + j] = d;
                distances[j * n + i] = d;
            }
        }
        Self {
            hubs,
            bounds,
            power_limit_w,
            distances,
        }
    }

    pub fn hub_count(&self) -> usize {
        self.hubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty()
    }

    pub fn demand(&self, hub: usize) -> f64 {
        self.hubs[hub].power_w
    }

    pub fn position(&self, hub: usize) -> Point3 {
        self.hubs[hub].position
    }

    pub fn distance(&self, a: usize, b: usize) -> f64 {
        self.distances[a * self.hubs.len() + b]
    }

    pub fn depot_distance(&self, depot: Point3, hub: usize) -> f64 {
        depot.distance(&self.hubs[hub].position)
    }

    /// Whether one hub alone exceeds the circuit budget
    pub fn is_oversized(&self, hub: usize) -> bool {
        self.hubs[hub].power_w > self.power_limit_w + POWER_EPSILON
    }

    pub fn fits(&self, current_w: f64, hub: usize) -> bool {
        current_w + self.hubs[hub].power_w <= self.power_limit_w + POWER_EPSILON
    }

    /// Depot to first hub plus each consecutive segment
    pub fn route_length(&self, depot: Point3, route: &[usize]) -> f64 {
        let Some(&first) = route.first() else {
            return 0.0;
        };
        self.depot_distance(depot, first)
            + route
                .windows(2)
                .map(|w| self.distance(w[0], w[1]))
                .sum::<f64>()
    }
}

/// Output of the power router
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingSolution {
    pub supply_points: Vec<SupplyPoint>,
    pub circuits: Vec<Circuit>,
    pub total_length: f64,
    /// Strategy that produced the circuits, suffixed when refined
    pub strategy: String,
    /// The selected strategy could not run and greedy routing was used
    pub fallback_used: bool,
    pub refined: bool,
}

impl RoutingSolution {
    pub fn new(
        strategy: &str,
        supply_points: Vec<SupplyPoint>,
        circuits: Vec<Circuit>,
    ) -> Self {
        let total_length = circuits.iter().map(|c| c.length).sum();
        Self {
            supply_points,
            circuits,
            total_length,
            strategy: strategy.to_string(),
            fallback_used: false,
            refined: false,
        }
    }

    pub fn total_power_w(&self) -> f64 {
        self.circuits.iter().map(|c| c.power_w).sum()
    }

    pub fn over_capacity_count(&self) -> usize {
        self.circuits.iter().filter(|c| c.over_capacity).count()
    }
}

/// Everything a strategy may read while routing
pub struct RouteContext<'a> {
    pub problem: &'a RoutingProblem,
    /// Starting supply points
    pub supplies: &'a [SupplyPoint],
    pub config: &'a RoutingConfig,
    pub observer: &'a dyn ProgressObserver,
    pub cancel: &'a CancelFlag,
}

/// A routing algorithm: partition hubs into power-limited circuits and order them
pub trait RoutingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// True when the strategy moves supply points itself, so the router
    /// skips the exhaustive position search
    fn places_supplies(&self) -> bool {
        false
    }

    fn route(
        &self,
        ctx: &RouteContext<'_>,
        rng: &mut StdRng,
    ) -> Result<RoutingSolution, RoutingError>;
}
