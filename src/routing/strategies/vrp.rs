//! Capacitated VRP Strategy
//!
//! Every supply point is an independent single-depot capacitated vehicle
//! routing instance over the hubs nearest to it. Instances are handed to a
//! [`VrpSolver`] with a per-depot time budget. If any depot fails the whole
//! routing is redone by the greedy strategy and the solution is marked with
//! `fallback_used`.
//!
//! The bundled [`MilpVrpSolver`] formulates the open-route CVRP as a MILP:
//! - binary arc variables from the depot or a hub to every other hub
//! - each hub entered exactly once and left at most once
//! - Miller-Tucker-Zemlin order and load variables against subtours and
//!   over-budget circuits
//!
//! It needs the `optimization` feature; without it the solver reports
//! [`SolverError::Unavailable`].

use rand::rngs::StdRng;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

use crate::config::VrpConfig;
use crate::domain::Point3;
use crate::progress::ProgressEvent;
use crate::routing::circuit::{group_by_supply, nearest_assignment};
use crate::routing::types::{Circuit, RouteContext, RoutingProblem, RoutingSolution, RoutingStrategy};
use crate::routing::RoutingError;

use super::greedy::greedy_circuits;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("VRP solver not available: {0}")]
    Unavailable(&'static str),

    #[error("VRP solver exceeded its {0:?} budget")]
    Timeout(Duration),

    #[error("VRP instance has {hubs} hubs, solver limit is {limit}")]
    InstanceTooLarge { hubs: usize, limit: usize },

    #[error("VRP solver failed: {0}")]
    Failed(String),
}

/// Solves one single-depot instance: returns routes as hub index sequences
pub trait VrpSolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve_depot(
        &self,
        problem: &RoutingProblem,
        depot: Point3,
        hubs: &[usize],
        config: &VrpConfig,
    ) -> Result<Vec<Vec<usize>>, SolverError>;
}

pub struct VrpStrategy {
    pub solver: Box<dyn VrpSolver>,
}

impl Default for VrpStrategy {
    fn default() -> Self {
        Self {
            solver: Box::new(MilpVrpSolver),
        }
    }
}

impl VrpStrategy {
    pub fn new(solver: Box<dyn VrpSolver>) -> Self {
        Self { solver }
    }

    fn solve_all(&self, ctx: &RouteContext<'_>) -> Result<Vec<Circuit>, SolverError> {
        let problem = ctx.problem;
        let groups = group_by_supply(&nearest_assignment(problem, ctx.supplies), ctx.supplies.len());
        let mut circuits = Vec::new();

        for (s, hubs) in groups.iter().enumerate() {
            if hubs.is_empty() {
                continue;
            }
            if ctx.cancel.is_cancelled() {
                return Err(SolverError::Failed("cancelled".to_string()));
            }
            let depot = ctx.supplies[s].position;

            // A hub over the budget on its own can never share a circuit
            let (oversized, regular): (Vec<usize>, Vec<usize>) =
                hubs.iter().partition(|&&h| problem.is_oversized(h));
            for hub in oversized {
                circuits.push(Circuit::new(problem, depot, s, vec![hub]));
            }
            if regular.is_empty() {
                continue;
            }

            tracing::debug!(
                supply = s,
                hubs = regular.len(),
                solver = self.solver.name(),
                "solving depot"
            );
            for route in self.solver.solve_depot(problem, depot, &regular, &ctx.config.vrp)? {
                if !route.is_empty() {
                    circuits.push(Circuit::new(problem, depot, s, route));
                }
            }
        }
        Ok(circuits)
    }
}

impl RoutingStrategy for VrpStrategy {
    fn name(&self) -> &'static str {
        "vrp"
    }

    fn route(
        &self,
        ctx: &RouteContext<'_>,
        _rng: &mut StdRng,
    ) -> Result<RoutingSolution, RoutingError> {
        match self.solve_all(ctx) {
            Ok(circuits) => Ok(RoutingSolution::new(self.name(), ctx.supplies.to_vec(), circuits)),
            Err(e) => {
                ctx.observer.on_event(&ProgressEvent::Fallback {
                    from: self.name(),
                    to: "greedy_angular",
                    reason: e.to_string(),
                });
                let circuits = greedy_circuits(ctx.problem, ctx.supplies);
                let mut solution =
                    RoutingSolution::new("greedy_angular", ctx.supplies.to_vec(), circuits);
                solution.fallback_used = true;
                Ok(solution)
            }
        }
    }
}

/// Exact open-route CVRP through `good_lp`
#[derive(Debug, Default, Clone, Copy)]
pub struct MilpVrpSolver;

impl VrpSolver for MilpVrpSolver {
    fn name(&self) -> &'static str {
        "milp"
    }

    #[cfg(feature = "optimization")]
    fn solve_depot(
        &self,
        problem: &RoutingProblem,
        depot: Point3,
        hubs: &[usize],
        config: &VrpConfig,
    ) -> Result<Vec<Vec<usize>>, SolverError> {
        use std::time::Instant;

        let m = hubs.len();
        if m > config.max_nodes {
            return Err(SolverError::InstanceTooLarge {
                hubs: m,
                limit: config.max_nodes,
            });
        }
        let budget = Duration::from_secs(config.time_limit_secs);
        let started = Instant::now();

        // Location 0 is the depot, location k + 1 is hubs[k]
        let costs: Vec<Vec<f64>> = (0..=m)
            .map(|from| {
                (0..=m)
                    .map(|to| match (from, to) {
                        (_, 0) => 0.0,
                        (0, to) => problem.depot_distance(depot, hubs[to - 1]),
                        (from, to) => problem.distance(hubs[from - 1], hubs[to - 1]),
                    })
                    .collect()
            })
            .collect();
        let demand: Vec<f64> = hubs.iter().map(|&h| problem.demand(h)).collect();
        let capacity = problem.power_limit_w;

        let chosen =
            solve_with_deadline(budget, move || solve_open_cvrp(&costs, &demand, capacity))??;

        let mut routes = Vec::new();
        let mut visited = vec![false; m + 1];
        for first in 1..=m {
            if !chosen[0][first] {
                continue;
            }
            let mut route = Vec::new();
            let mut current = first;
            loop {
                if visited[current] {
                    return Err(SolverError::Failed("route revisits a hub".to_string()));
                }
                visited[current] = true;
                route.push(hubs[current - 1]);
                match (1..=m).find(|&next| chosen[current][next]) {
                    Some(next) => current = next,
                    None => break,
                }
            }
            routes.push(route);
        }
        if visited.iter().skip(1).any(|v| !v) {
            return Err(SolverError::Failed("solution leaves hubs unrouted".to_string()));
        }

        tracing::debug!(
            hubs = m,
            routes = routes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "MILP depot solved"
        );
        Ok(routes)
    }

    #[cfg(not(feature = "optimization"))]
    fn solve_depot(
        &self,
        _problem: &RoutingProblem,
        _depot: Point3,
        _hubs: &[usize],
        _config: &VrpConfig,
    ) -> Result<Vec<Vec<usize>>, SolverError> {
        Err(SolverError::Unavailable(
            "MILP VRP requires the 'optimization' feature",
        ))
    }
}

/// Run `job` on a worker thread and wait at most `budget` for its result.
///
/// On expiry the worker is detached; its result is dropped when it finishes.
pub fn solve_with_deadline<T, F>(budget: Duration, job: F) -> Result<T, SolverError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("vrp-solver".to_string())
        .spawn(move || {
            // The receiver is gone once the deadline passed
            let _ = tx.send(job());
        })
        .map_err(|e| SolverError::Failed(e.to_string()))?;

    match rx.recv_timeout(budget) {
        Ok(result) => Ok(result),
        Err(RecvTimeoutError::Timeout) => Err(SolverError::Timeout(budget)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(SolverError::Failed("solver thread panicked".to_string()))
        }
    }
}

/// Open-route CVRP over a `(hubs + 1)²` cost matrix, depot at index 0.
/// Returns the chosen arcs as an adjacency matrix.
#[cfg(feature = "optimization")]
fn solve_open_cvrp(
    costs: &[Vec<f64>],
    demand: &[f64],
    capacity: f64,
) -> Result<Vec<Vec<bool>>, SolverError> {
    use good_lp::*;

    let m = demand.len();
    let mut vars = ProblemVariables::new();
    let mut arcs: Vec<Vec<Option<Variable>>> = vec![vec![None; m + 1]; m + 1];
    for (from, row) in arcs.iter_mut().enumerate() {
        for (to, slot) in row.iter_mut().enumerate().skip(1) {
            if from != to {
                *slot = Some(vars.add(variable().binary()));
            }
        }
    }
    let load: Vec<Variable> = demand
        .iter()
        .map(|&d| vars.add(variable().min(d).max(capacity)))
        .collect();
    let order: Vec<Variable> = (0..m)
        .map(|_| vars.add(variable().min(1.0).max(m as f64)))
        .collect();

    let objective: Expression = arcs
        .iter()
        .enumerate()
        .flat_map(|(from, row)| {
            row.iter()
                .enumerate()
                .filter_map(move |(to, slot)| slot.map(|x| x * costs[from][to]))
        })
        .sum();

    let mut model = vars.minimise(objective).using(default_solver);

    for to in 1..=m {
        let entering: Expression = (0..=m).filter_map(|from| arcs[from][to]).sum();
        model = model.with(constraint!(entering == 1.0));
        let leaving: Expression = (1..=m).filter_map(|next| arcs[to][next]).sum();
        model = model.with(constraint!(leaving <= 1.0));
    }

    let big_order = m as f64;
    for i in 1..=m {
        for j in 1..=m {
            let Some(x) = arcs[i][j] else {
                continue;
            };
            let (ui, uj) = (load[i - 1], load[j - 1]);
            let (pi, pj) = (order[i - 1], order[j - 1]);
            // x = 1 forces u_j >= u_i + d_j and p_j >= p_i + 1
            model = model.with(constraint!(uj - ui - x * capacity >= demand[j - 1] - capacity));
            model = model.with(constraint!(pj - pi - x * big_order >= 1.0 - big_order));
        }
    }

    let solution = model
        .solve()
        .map_err(|e| SolverError::Failed(e.to_string()))?;

    Ok(arcs
        .iter()
        .map(|row| {
            row.iter()
                .map(|slot| slot.map_or(false, |x| solution.value(x) > 0.5))
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutingConfig;
    use crate::progress::{CancelFlag, CollectingObserver};
    use crate::routing::fixtures::line_problem;
    use crate::routing::types::SupplyPoint;
    use rand::SeedableRng;

    /// Splits each depot's hubs into runs of one
    struct OnePerCircuit;

    impl VrpSolver for OnePerCircuit {
        fn name(&self) -> &'static str {
            "one_per_circuit"
        }

        fn solve_depot(
            &self,
            _problem: &RoutingProblem,
            _depot: Point3,
            hubs: &[usize],
            _config: &VrpConfig,
        ) -> Result<Vec<Vec<usize>>, SolverError> {
            Ok(hubs.iter().map(|&h| vec![h]).collect())
        }
    }

    struct AlwaysTimesOut;

    impl VrpSolver for AlwaysTimesOut {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn solve_depot(
            &self,
            _problem: &RoutingProblem,
            _depot: Point3,
            _hubs: &[usize],
            config: &VrpConfig,
        ) -> Result<Vec<Vec<usize>>, SolverError> {
            Err(SolverError::Timeout(Duration::from_secs(config.time_limit_secs)))
        }
    }

    /// Hands every depot to a worker that outlives its budget
    struct StallsPastBudget {
        budget: Duration,
    }

    impl VrpSolver for StallsPastBudget {
        fn name(&self) -> &'static str {
            "stalls"
        }

        fn solve_depot(
            &self,
            _problem: &RoutingProblem,
            _depot: Point3,
            hubs: &[usize],
            _config: &VrpConfig,
        ) -> Result<Vec<Vec<usize>>, SolverError> {
            let hubs = hubs.to_vec();
            solve_with_deadline(self.budget, move || {
                thread::sleep(Duration::from_millis(500));
                vec![hubs]
            })
        }
    }

    fn run(strategy: &VrpStrategy, observer: &CollectingObserver) -> RoutingSolution {
        let problem = line_problem(&[300.0, 2000.0, 300.0], 1800.0);
        let supplies = [SupplyPoint::free(Point3::new(-1.0, 0.0, 0.0))];
        let config = RoutingConfig::default();
        let cancel = CancelFlag::new();
        let ctx = RouteContext {
            problem: &problem,
            supplies: &supplies,
            config: &config,
            observer,
            cancel: &cancel,
        };
        strategy.route(&ctx, &mut StdRng::seed_from_u64(0)).unwrap()
    }

    #[test]
    fn test_solver_routes_are_used() {
        let observer = CollectingObserver::new();
        let solution = run(&VrpStrategy::new(Box::new(OnePerCircuit)), &observer);

        assert_eq!(solution.strategy, "vrp");
        assert!(!solution.fallback_used);
        assert_eq!(solution.circuits.len(), 3);
        // Oversized hub 1 is routed alone before the solver runs
        assert_eq!(solution.circuits[0].route, vec![1]);
        assert!(solution.circuits[0].over_capacity);
    }

    #[test]
    fn test_timeout_falls_back_to_greedy() {
        let observer = CollectingObserver::new();
        let solution = run(&VrpStrategy::new(Box::new(AlwaysTimesOut)), &observer);

        assert!(solution.fallback_used);
        assert_eq!(solution.strategy, "greedy_angular");
        assert!(observer
            .events()
            .iter()
            .any(|e| matches!(e, ProgressEvent::Fallback { from: "vrp", .. })));
    }

    #[test]
    fn test_deadline_returns_finished_result() {
        let result = solve_with_deadline(Duration::from_secs(5), || 6 * 7);
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn test_deadline_expires_while_job_runs() {
        let started = std::time::Instant::now();
        let result = solve_with_deadline(Duration::from_millis(10), || {
            thread::sleep(Duration::from_millis(500));
        });

        assert_eq!(result, Err(SolverError::Timeout(Duration::from_millis(10))));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_deadline_reports_panicked_job() {
        let result: Result<(), SolverError> = solve_with_deadline(Duration::from_secs(5), || {
            panic!("solver crashed");
        });
        assert!(matches!(result, Err(SolverError::Failed(_))));
    }

    #[test]
    fn test_stalled_solver_falls_back_within_budget() {
        let observer = CollectingObserver::new();
        let strategy = VrpStrategy::new(Box::new(StallsPastBudget {
            budget: Duration::from_millis(10),
        }));
        let started = std::time::Instant::now();
        let solution = run(&strategy, &observer);

        assert!(solution.fallback_used);
        assert_eq!(solution.strategy, "greedy_angular");
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(observer.events().iter().any(|e| matches!(
            e,
            ProgressEvent::Fallback { reason, .. } if reason.contains("budget")
        )));
    }

    #[cfg(not(feature = "optimization"))]
    #[test]
    fn test_milp_unavailable_without_feature() {
        let observer = CollectingObserver::new();
        let solution = run(&VrpStrategy::default(), &observer);
        assert!(solution.fallback_used);
    }

    #[cfg(feature = "optimization")]
    #[test]
    fn test_milp_splits_by_capacity() {
        let problem = line_problem(&[1000.0, 1000.0, 600.0], 1800.0);
        let config = VrpConfig::default();
        let routes = MilpVrpSolver
            .solve_depot(&problem, Point3::new(-1.0, 0.0, 0.0), &[0, 1, 2], &config)
            .unwrap();

        assert_eq!(routes.len(), 2);
        for route in &routes {
            assert!(route.iter().map(|&h| problem.demand(h)).sum::<f64>() <= 1800.0);
        }
    }

    #[cfg(feature = "optimization")]
    #[test]
    fn test_milp_rejects_large_instances() {
        let problem = line_problem(&[10.0; 5], 1800.0);
        let config = VrpConfig {
            max_nodes: 3,
            ..VrpConfig::default()
        };
        let result = MilpVrpSolver.solve_depot(&problem, Point3::new(-1.0, 0.0, 0.0), &[0, 1, 2, 3, 4], &config);
        assert_eq!(result, Err(SolverError::InstanceTooLarge { hubs: 5, limit: 3 }));
    }
}
