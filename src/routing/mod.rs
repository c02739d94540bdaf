//! # Power Router
//!
//! Computes where the external supply points go and splits hubs into
//! power-limited circuits, each with a cable-length-minimising visiting
//! order. The algorithm is a boxed [`RoutingStrategy`] chosen from
//! configuration; the router wraps it with supply placement and the
//! optional 2-opt pass.

pub mod circuit;
pub mod demand;
pub mod refine;
pub mod strategies;
pub mod supply;
pub mod types;

pub use demand::hub_demands;
pub use strategies::*;
pub use types::*;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RoutingConfig;
use crate::progress::{CancelFlag, ProgressObserver};

/// Selectable routing algorithm
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    /// Angular pre-clustering plus penalised nearest-neighbour chains
    #[default]
    Greedy,
    /// Capacitated VRP per supply point, greedy on solver failure
    Vrp,
    Genetic,
    AntColony,
    SimulatedAnnealing,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    #[error("no supply points to route from")]
    NoSupplyPoints,

    #[error("no supply point configuration could be evaluated")]
    NoCandidateConfiguration,
}

/// Build the strategy for a configured kind
pub fn strategy_for(kind: StrategyKind) -> Box<dyn RoutingStrategy> {
    match kind {
        StrategyKind::Greedy => Box::new(GreedyAngular),
        StrategyKind::Vrp => Box::new(VrpStrategy::default()),
        StrategyKind::Genetic => Box::new(GeneticStrategy),
        StrategyKind::AntColony => Box::new(AntColonyStrategy),
        StrategyKind::SimulatedAnnealing => Box::new(AnnealingStrategy),
    }
}

/// Supply placement + strategy + refinement
pub struct PowerRouter {
    pub strategy: Box<dyn RoutingStrategy>,
    pub config: RoutingConfig,
}

impl PowerRouter {
    pub fn new(strategy: Box<dyn RoutingStrategy>, config: RoutingConfig) -> Self {
        Self { strategy, config }
    }

    pub fn from_config(config: &RoutingConfig) -> Self {
        Self::new(strategy_for(config.strategy), config.clone())
    }

    /// Starting supply points for the strategy.
    ///
    /// Strategies that move supplies themselves always start from the side
    /// centres, as does a router with position search switched off.
    pub fn initial_supplies(
        &self,
        problem: &RoutingProblem,
        observer: &dyn ProgressObserver,
        cancel: &CancelFlag,
    ) -> Result<Vec<SupplyPoint>, RoutingError> {
        let supply = &self.config.supply;
        if supply.optimize_positions && !self.strategy.places_supplies() {
            supply::search_supply_points(problem, supply, observer, cancel)
        } else {
            Ok(supply::default_supply_points(
                &problem.bounds,
                supply.offset_m,
                supply.max_count,
            ))
        }
    }

    pub fn route(
        &self,
        problem: &RoutingProblem,
        observer: &dyn ProgressObserver,
        cancel: &CancelFlag,
        rng: &mut StdRng,
    ) -> Result<RoutingSolution, RoutingError> {
        let supplies = self.initial_supplies(problem, observer, cancel)?;
        if supplies.is_empty() {
            return Err(RoutingError::NoSupplyPoints);
        }

        if problem.is_empty() {
            tracing::info!("no hub draws power, nothing to route");
            return Ok(RoutingSolution::new(self.strategy.name(), supplies, Vec::new()));
        }

        tracing::info!(
            strategy = self.strategy.name(),
            hubs = problem.hub_count(),
            supplies = supplies.len(),
            limit_w = problem.power_limit_w,
            "routing power circuits"
        );

        let ctx = RouteContext {
            problem,
            supplies: &supplies,
            config: &self.config,
            observer,
            cancel,
        };
        let mut solution = self.strategy.route(&ctx, rng)?;

        if self.config.two_opt.enabled && !solution.circuits.is_empty() {
            refine::refine_solution(problem, &mut solution, self.config.two_opt.max_passes, observer);
        }

        let over = solution.over_capacity_count();
        if over > 0 {
            tracing::warn!(circuits = over, "hubs exceed the circuit power limit on their own");
        }
        tracing::info!(
            strategy = %solution.strategy,
            circuits = solution.circuits.len(),
            total_length = solution.total_length,
            "routing finished"
        );
        Ok(solution)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::grid_problem;
    use super::*;
    use crate::progress::NoopObserver;
    use rand::SeedableRng;
    use std::str::FromStr;

    #[test]
    fn test_strategy_kind_names() {
        assert_eq!(StrategyKind::AntColony.to_string(), "ant_colony");
        assert_eq!(
            StrategyKind::from_str("simulated_annealing").unwrap(),
            StrategyKind::SimulatedAnnealing
        );
        assert_eq!(StrategyKind::default(), StrategyKind::Greedy);
    }

    #[test]
    fn test_router_uses_default_supplies_without_search() {
        let problem = grid_problem(3, 2, 240.0, 1800.0);
        let router = PowerRouter::from_config(&RoutingConfig::default());
        let mut rng = StdRng::seed_from_u64(7);
        let solution = router
            .route(&problem, &NoopObserver, &CancelFlag::new(), &mut rng)
            .unwrap();

        assert_eq!(solution.supply_points.len(), 4);
        assert_eq!(solution.strategy, "greedy_angular + 2-opt");
        let routed: usize = solution.circuits.iter().map(|c| c.route.len()).sum();
        assert_eq!(routed, 6);
    }

    #[test]
    fn test_router_without_refinement_keeps_name() {
        let problem = grid_problem(2, 2, 100.0, 1800.0);
        let mut config = RoutingConfig::default();
        config.two_opt.enabled = false;
        let router = PowerRouter::from_config(&config);
        let mut rng = StdRng::seed_from_u64(7);
        let solution = router
            .route(&problem, &NoopObserver, &CancelFlag::new(), &mut rng)
            .unwrap();
        assert_eq!(solution.strategy, "greedy_angular");
        assert!(!solution.refined);
    }

    #[test]
    fn test_empty_problem_has_no_circuits() {
        let problem = grid_problem(0, 0, 100.0, 1800.0);
        let router = PowerRouter::from_config(&RoutingConfig::default());
        let mut rng = StdRng::seed_from_u64(1);
        let solution = router
            .route(&problem, &NoopObserver, &CancelFlag::new(), &mut rng)
            .unwrap();
        assert!(solution.circuits.is_empty());
        assert_eq!(solution.total_length, 0.0);
    }
}
