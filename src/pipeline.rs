//! # Planning Pipeline
//!
//! Runs Coverage → Balance → Route over one network. Each stage gets the
//! previous stage's finished output and its own configuration section; the
//! cancel flag is checked at every stage boundary. The result is a
//! serializable [`PlanReport`].

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::balancer::{balance, BalancePhase, BalanceResult, DirectedEdge, PortViolation, RowViolation};
use crate::config::PlannerConfig;
use crate::coverage::{self, CoveragePlan, CoverageStats};
use crate::domain::{EdgeId, Network, NetworkInput, NetworkStats, NodeId, Point3, RowId};
use crate::error::PlanError;
use crate::progress::{CancelFlag, ProgressEvent, ProgressObserver, Stage, TracingObserver};
use crate::routing::{hub_demands, PowerRouter, RoutingProblem, RoutingSolution, SupplyPoint};

/// One selected hub
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HubReport {
    pub node: NodeId,
    pub position: Point3,
    /// DMX universe, selection order starting at 1
    pub universe: Option<u16>,
    /// Outgoing data edges
    pub outputs: u32,
    pub power_w: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowLoad {
    pub row: RowId,
    pub coordinate: f64,
    pub load: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSummary {
    pub iterations: usize,
    pub moves: usize,
    pub final_phase: BalancePhase,
    pub max_row_load: u32,
    pub satisfied: bool,
}

/// A circuit with hub node ids instead of problem indices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitReport {
    pub supply: usize,
    pub hubs: Vec<NodeId>,
    pub power_w: f64,
    pub length: f64,
    pub over_capacity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanSummary {
    pub total_cable_length: f64,
    pub total_power_w: f64,
    pub circuit_count: usize,
    pub supply_count: usize,
    pub over_capacity_circuits: usize,
    pub strategy: String,
    pub fallback_used: bool,
}

/// Everything the planner produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReport {
    pub network: NetworkStats,
    pub coverage: CoverageStats,
    pub hubs: Vec<HubReport>,
    pub uncovered_edges: Vec<EdgeId>,
    pub directions: Vec<DirectedEdge>,
    pub row_loads: Vec<RowLoad>,
    pub port_violations: Vec<PortViolation>,
    pub row_violations: Vec<RowViolation>,
    pub balance: BalanceSummary,
    pub supply_points: Vec<SupplyPoint>,
    pub circuits: Vec<CircuitReport>,
    pub summary: PlanSummary,
}

impl PlanReport {
    fn assemble(
        network: &Network,
        coverage: CoveragePlan,
        balanced: BalanceResult,
        problem: &RoutingProblem,
        solution: RoutingSolution,
    ) -> Self {
        let hubs = problem
            .hubs
            .iter()
            .map(|demand| HubReport {
                node: demand.node,
                position: demand.position,
                universe: coverage.hubs.universe(demand.node),
                outputs: balanced.outputs_of(demand.node),
                power_w: demand.power_w,
            })
            .collect();

        let row_loads = network
            .rows()
            .iter()
            .map(|row| RowLoad {
                row: row.id,
                coordinate: row.coordinate,
                load: balanced.row_loads.get(row.id.0).copied().unwrap_or(0),
            })
            .collect();

        let circuits = solution
            .circuits
            .iter()
            .map(|c| CircuitReport {
                supply: c.supply,
                hubs: c.route.iter().map(|&h| problem.hubs[h].node).collect(),
                power_w: c.power_w,
                length: c.length,
                over_capacity: c.over_capacity,
            })
            .collect();

        let summary = PlanSummary {
            total_cable_length: solution.total_length,
            total_power_w: solution.total_power_w(),
            circuit_count: solution.circuits.len(),
            supply_count: solution.supply_points.len(),
            over_capacity_circuits: solution.over_capacity_count(),
            strategy: solution.strategy.clone(),
            fallback_used: solution.fallback_used,
        };

        Self {
            network: network.stats(),
            coverage: coverage.stats,
            hubs,
            uncovered_edges: coverage.uncovered,
            directions: balanced.directed_edges().copied().collect(),
            row_loads,
            port_violations: balanced.port_violations.clone(),
            row_violations: balanced.row_violations.clone(),
            balance: BalanceSummary {
                iterations: balanced.iterations,
                moves: balanced.moves,
                final_phase: balanced.final_phase,
                max_row_load: balanced.max_row_load(),
                satisfied: balanced.is_satisfied(),
            },
            supply_points: solution.supply_points,
            circuits,
            summary,
        }
    }
}

/// Runs the three planning stages
pub struct Planner {
    config: PlannerConfig,
    observer: Arc<dyn ProgressObserver>,
    cancel: CancelFlag,
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            observer: Arc::new(TracingObserver),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Handle for cancelling a run from another thread
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Validate raw input and plan it
    pub fn plan(&self, input: &NetworkInput) -> Result<PlanReport, PlanError> {
        let network = Network::from_input(input, self.config.network.row_axis)?;
        self.plan_network(&network)
    }

    pub fn plan_network(&self, network: &Network) -> Result<PlanReport, PlanError> {
        let observer = self.observer.as_ref();
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let coverage = self.stage(Stage::Coverage, || {
            coverage::plan(network, &self.config.coverage, observer, &self.cancel)
        })?;
        tracing::info!(
            hubs = coverage.hubs.len(),
            coverage_percent = coverage.stats.coverage_percent,
            "hubs selected"
        );

        let balanced = self.stage(Stage::Balance, || {
            balance(network, &coverage.hubs, &self.config.balance, observer, &self.cancel)
        })?;
        tracing::info!(
            max_row_load = balanced.max_row_load(),
            port_violations = balanced.port_violations.len(),
            row_violations = balanced.row_violations.len(),
            "directions balanced"
        );

        let routing = &self.config.routing;
        let problem = RoutingProblem::new(
            hub_demands(network, &coverage.hubs, &balanced, routing.watts_per_edge),
            network.bounds(),
            routing.circuit_power_limit_w,
        );
        let router = PowerRouter::from_config(routing);
        let solution = self.stage(Stage::Routing, || {
            router.route(&problem, observer, &self.cancel, &mut rng)
        })??;

        if self.cancel.is_cancelled() {
            return Err(PlanError::Cancelled("report"));
        }
        Ok(PlanReport::assemble(network, coverage, balanced, &problem, solution))
    }

    fn stage<T>(&self, stage: Stage, run: impl FnOnce() -> T) -> Result<T, PlanError> {
        if self.cancel.is_cancelled() {
            return Err(PlanError::Cancelled(stage_name(stage)));
        }
        self.observer.on_event(&ProgressEvent::StageStarted { stage });
        let started = Instant::now();
        let output = run();
        self.observer.on_event(&ProgressEvent::StageFinished {
            stage,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        Ok(output)
    }
}

fn stage_name(stage: Stage) -> &'static str {
    match stage {
        Stage::Coverage => "coverage",
        Stage::Balance => "balance",
        Stage::Routing => "routing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EdgeCategory, EdgeInput};
    use crate::progress::CollectingObserver;

    fn cable(a: (f64, f64), b: (f64, f64)) -> EdgeInput {
        EdgeInput {
            start: Point3::new(a.0, a.1, 0.0),
            end: Point3::new(b.0, b.1, 0.0),
            category: EdgeCategory::Normal,
        }
    }

    fn ladder() -> NetworkInput {
        NetworkInput::from_edges(vec![
            cable((0.0, 0.0), (1.0, 0.0)),
            cable((1.0, 0.0), (2.0, 0.0)),
            cable((0.0, 1.0), (1.0, 1.0)),
            cable((1.0, 1.0), (2.0, 1.0)),
            cable((0.0, 0.0), (0.0, 1.0)),
            cable((1.0, 0.0), (1.0, 1.0)),
            cable((2.0, 0.0), (2.0, 1.0)),
        ])
    }

    #[test]
    fn test_stages_report_in_order() {
        let observer = Arc::new(CollectingObserver::new());
        let planner = Planner::new(PlannerConfig::default()).with_observer(observer.clone());
        let report = planner.plan(&ladder()).unwrap();

        let stages: Vec<Stage> = observer
            .events()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::StageStarted { stage } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(stages, vec![Stage::Coverage, Stage::Balance, Stage::Routing]);
        assert!(report.coverage.is_complete());
        assert_eq!(report.directions.len(), 7);
    }

    #[test]
    fn test_cancelled_planner_stops_before_coverage() {
        let planner = Planner::new(PlannerConfig::default());
        planner.cancel_flag().cancel();
        let err = planner.plan(&ladder()).unwrap_err();
        assert!(matches!(err, PlanError::Cancelled("coverage")));
    }

    #[test]
    fn test_invalid_input_fails_fast() {
        let planner = Planner::new(PlannerConfig::default());
        let err = planner.plan(&NetworkInput::default()).unwrap_err();
        assert!(matches!(err, PlanError::InvalidInput(_)));
    }

    #[test]
    fn test_report_maps_circuits_to_nodes() {
        let planner = Planner::new(PlannerConfig::default());
        let report = planner.plan(&ladder()).unwrap();

        let mut routed: Vec<NodeId> = report.circuits.iter().flat_map(|c| c.hubs.clone()).collect();
        routed.sort();
        let mut hubs: Vec<NodeId> = report.hubs.iter().map(|h| h.node).collect();
        hubs.sort();
        assert_eq!(routed, hubs);
        assert_eq!(report.hubs[0].universe, Some(1));
        let power: f64 = report.hubs.iter().map(|h| h.power_w).sum();
        assert!((power - 7.0 * 120.0).abs() < 1e-9);
    }
}
