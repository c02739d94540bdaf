//! 2-opt refinement of circuit visiting orders.
//!
//! The supply point is a fixed start and the route is open at the far end,
//! so reversing a suffix only changes one segment.

use crate::domain::Point3;
use crate::progress::{ProgressEvent, ProgressObserver};

use super::types::{RoutingProblem, RoutingSolution};

/// Improvements smaller than this are ignored (m)
const MIN_GAIN: f64 = 1e-9;

/// Reverse route segments while that shortens the route, for at most
/// `max_passes` full sweeps. The result is never longer than the input.
pub fn two_opt(problem: &RoutingProblem, depot: Point3, route: &[usize], max_passes: usize) -> Vec<usize> {
    let n = route.len();
    let mut best = route.to_vec();
    if n < 2 {
        return best;
    }

    let before = |r: &[usize], i: usize| -> f64 {
        if i == 0 {
            problem.depot_distance(depot, r[0])
        } else {
            problem.distance(r[i - 1], r[i])
        }
    };

    for _ in 0..max_passes {
        let mut improved = false;
        for i in 0..n - 1 {
            for j in (i + 1)..n {
                // Reversing best[i..=j] swaps the segments entering i and leaving j
                let entering_old = before(&best, i);
                let entering_new = if i == 0 {
                    problem.depot_distance(depot, best[j])
                } else {
                    problem.distance(best[i - 1], best[j])
                };
                let (leaving_old, leaving_new) = if j + 1 < n {
                    (problem.distance(best[j], best[j + 1]), problem.distance(best[i], best[j + 1]))
                } else {
                    (0.0, 0.0)
                };

                let delta = entering_new + leaving_new - entering_old - leaving_old;
                if delta < -MIN_GAIN {
                    best[i..=j].reverse();
                    improved = true;
                }
            }
        }
        if !improved {
            break;
        }
    }

    if problem.route_length(depot, &best) > problem.route_length(depot, route) {
        route.to_vec()
    } else {
        best
    }
}

/// Apply [`two_opt`] to every circuit and recompute lengths.
///
/// Marks the solution as refined and appends " + 2-opt" to its strategy name.
pub fn refine_solution(
    problem: &RoutingProblem,
    solution: &mut RoutingSolution,
    max_passes: usize,
    observer: &dyn ProgressObserver,
) {
    let before = solution.total_length;
    for circuit in &mut solution.circuits {
        let depot = solution.supply_points[circuit.supply].position;
        circuit.route = two_opt(problem, depot, &circuit.route, max_passes);
        circuit.length = problem.route_length(depot, &circuit.route);
    }
    solution.total_length = solution.circuits.iter().map(|c| c.length).sum();
    solution.refined = true;
    solution.strategy.push_str(" + 2-opt");

    observer.on_event(&ProgressEvent::Refined {
        before,
        after: solution.total_length,
    });
}
