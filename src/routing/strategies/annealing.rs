//! Simulated Annealing Strategy
//!
//! Searches supply positions and hub assignments together. Each step makes
//! one of three moves:
//! - 40 %: shift one supply point by up to `max_displacement_m` scaled by
//!   T / T0, clamp it back outside the bounding rectangle, then send every
//!   hub to its nearest supply again
//! - 30 %: move one hub to a random supply point
//! - 30 %: swap one hub each between two supply points
//!
//! Worse states are accepted with probability exp(-Δ / T) and T decays
//! geometrically. The best state seen is kept apart from the current one.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::Rng;

use crate::domain::Point3;
use crate::progress::ProgressEvent;
use crate::routing::circuit::{assignment_length, circuits_for_assignment, nearest_assignment};
use crate::routing::types::{RouteContext, RoutingSolution, RoutingStrategy, SupplyPoint};
use crate::routing::RoutingError;

const SUPPLY_MOVE: f64 = 0.4;
const REASSIGN_MOVE: f64 = 0.7;
const LOG_EVERY: usize = 500;

pub struct AnnealingStrategy;

#[derive(Clone)]
struct State {
    supplies: Vec<SupplyPoint>,
    assignment: Vec<usize>,
    cost: f64,
}

impl RoutingStrategy for AnnealingStrategy {
    fn name(&self) -> &'static str {
        "simulated_annealing"
    }

    fn places_supplies(&self) -> bool {
        true
    }

    fn route(
        &self,
        ctx: &RouteContext<'_>,
        rng: &mut StdRng,
    ) -> Result<RoutingSolution, RoutingError> {
        let problem = ctx.problem;
        let config = &ctx.config.annealing;
        let offset = ctx.config.supply.offset_m;

        let supplies = ctx.supplies.to_vec();
        let assignment = nearest_assignment(problem, &supplies);
        let cost = assignment_length(problem, &supplies, &assignment);
        let mut current = State {
            supplies,
            assignment,
            cost,
        };
        let mut best = current.clone();
        let mut temperature = config.initial_temperature;
        let mut accepted = 0usize;

        for iteration in 0..config.iterations {
            if ctx.cancel.is_cancelled() {
                tracing::warn!(iteration, "simulated annealing cancelled");
                break;
            }

            let mut candidate = current.clone();
            let choice: f64 = rng.gen();
            if choice < SUPPLY_MOVE {
                let s = rng.gen_range(0..candidate.supplies.len());
                let range = if config.initial_temperature > 0.0 {
                    temperature / config.initial_temperature * config.max_displacement_m
                } else {
                    0.0
                };
                let old = candidate.supplies[s].position;
                let dx = if range > 0.0 { rng.gen_range(-range..=range) } else { 0.0 };
                let dy = if range > 0.0 { rng.gen_range(-range..=range) } else { 0.0 };
                let (x, y) = problem.bounds.clamp_outside(
                    old.x + dx,
                    old.y + dy,
                    offset,
                    config.wander_margin_m,
                );
                candidate.supplies[s] = SupplyPoint::free(Point3::new(x, y, 0.0));
                candidate.assignment = nearest_assignment(problem, &candidate.supplies);
            } else if choice < REASSIGN_MOVE {
                let hub = rng.gen_range(0..problem.hub_count());
                candidate.assignment[hub] = rng.gen_range(0..candidate.supplies.len());
            } else {
                swap_between_supplies(&mut candidate, rng);
            }
            candidate.cost = assignment_length(problem, &candidate.supplies, &candidate.assignment);

            let delta = candidate.cost - current.cost;
            let accept = delta < 0.0
                || (temperature > 0.0 && rng.gen::<f64>() < (-delta / temperature).exp());
            if accept {
                current = candidate;
                accepted += 1;
                if current.cost < best.cost {
                    best = current.clone();
                    ctx.observer.on_event(&ProgressEvent::NewBest {
                        source: self.name(),
                        step: iteration,
                        length: best.cost,
                    });
                }
            }

            temperature *= config.cooling_rate;

            if (iteration + 1) % LOG_EVERY == 0 {
                tracing::debug!(
                    iteration = iteration + 1,
                    best = best.cost,
                    current = current.cost,
                    temperature,
                    accept_rate = accepted as f64 / LOG_EVERY as f64,
                    "annealing"
                );
                accepted = 0;
            }
        }

        let circuits = circuits_for_assignment(problem, &best.supplies, &best.assignment);
        Ok(RoutingSolution::new(self.name(), best.supplies, circuits))
    }
}

/// Exchange one random hub each between two random supplies that have hubs
fn swap_between_supplies(state: &mut State, rng: &mut StdRng) {
    let mut used: Vec<usize> = state.assignment.clone();
    used.sort_unstable();
    used.dedup();
    if used.len() < 2 {
        return;
    }
    let picked = sample(rng, used.len(), 2);
    let (s1, s2) = (used[picked.index(0)], used[picked.index(1)]);

    let pick_hub = |supply: usize, rng: &mut StdRng| -> usize {
        let members: Vec<usize> = (0..state.assignment.len())
            .filter(|&h| state.assignment[h] == supply)
            .collect();
        members[rng.gen_range(0..members.len())]
    };
    let h1 = pick_hub(s1, rng);
    let h2 = pick_hub(s2, rng);
    state.assignment[h1] = s2;
    state.assignment[h2] = s1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutingConfig;
    use crate::progress::{CancelFlag, NoopObserver};
    use crate::routing::fixtures::grid_problem;
    use crate::routing::supply::default_supply_points;
    use crate::routing::types::RoutingProblem;
    use rand::SeedableRng;

    fn solve(problem: &RoutingProblem, seed: u64, config: &RoutingConfig) -> RoutingSolution {
        let supplies = default_supply_points(&problem.bounds, config.supply.offset_m, 4);
        let cancel = CancelFlag::new();
        let ctx = RouteContext {
            problem,
            supplies: &supplies,
            config,
            observer: &NoopObserver,
            cancel: &cancel,
        };
        AnnealingStrategy
            .route(&ctx, &mut StdRng::seed_from_u64(seed))
            .unwrap()
    }

    #[test]
    fn test_zero_iterations_returns_initial_state() {
        let problem = grid_problem(4, 3, 400.0, 1800.0);
        let mut config = RoutingConfig::default();
        config.annealing.iterations = 0;
        let solution = solve(&problem, 1, &config);

        let initial = default_supply_points(&problem.bounds, config.supply.offset_m, 4);
        assert_eq!(solution.supply_points, initial);
        let expected = circuits_for_assignment(
            &problem,
            &initial,
            &nearest_assignment(&problem, &initial),
        );
        assert_eq!(solution.circuits, expected);
    }

    #[test]
    fn test_supplies_stay_outside_bounds() {
        let problem = grid_problem(5, 4, 300.0, 1800.0);
        let mut config = RoutingConfig::default();
        config.annealing.iterations = 400;
        let solution = solve(&problem, 17, &config);

        let b = problem.bounds;
        for supply in &solution.supply_points {
            let p = supply.position;
            assert!(!b.contains_xy(p.x, p.y));
            assert!(p.x >= b.min_x - config.annealing.wander_margin_m - 1e-9);
            assert!(p.x <= b.max_x + config.annealing.wander_margin_m + 1e-9);
        }
        assert!(solution.circuits.iter().all(|c| c.power_w <= 1800.0));
    }

    #[test]
    fn test_annealing_never_worse_than_start() {
        let problem = grid_problem(5, 4, 300.0, 1800.0);
        let mut config = RoutingConfig::default();
        config.annealing.iterations = 300;
        let mut frozen = config.clone();
        frozen.annealing.iterations = 0;
        let start = solve(&problem, 2, &frozen);
        let solution = solve(&problem, 2, &config);
        assert!(solution.total_length <= start.total_length + 1e-9);
        assert_eq!(solution, solve(&problem, 2, &config));
    }
}
