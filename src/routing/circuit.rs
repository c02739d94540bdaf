//! Circuit building blocks shared by the strategies: nearest-supply
//! assignment, power splitting and nearest-neighbour ordering.
//!
//! Every scan walks hubs in ascending index and only replaces the incumbent
//! on a strictly better value, so ties resolve to the lowest index.

use crate::domain::Point3;

use super::types::{Circuit, RoutingProblem, SupplyPoint};

/// Weight of the isolation penalty in the penalised nearest-neighbour chain
pub const ISOLATION_WEIGHT: f64 = 0.5;

/// Closest supply point to a hub
pub fn nearest_supply(problem: &RoutingProblem, supplies: &[SupplyPoint], hub: usize) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (s, supply) in supplies.iter().enumerate() {
        let d = problem.depot_distance(supply.position, hub);
        if d < best_dist {
            best_dist = d;
            best = s;
        }
    }
    best
}

/// Supply index per hub, each hub going to its closest supply point
pub fn nearest_assignment(problem: &RoutingProblem, supplies: &[SupplyPoint]) -> Vec<usize> {
    (0..problem.hub_count())
        .map(|h| nearest_supply(problem, supplies, h))
        .collect()
}

/// Hubs per supply point, ascending hub index
pub fn group_by_supply(assignment: &[usize], supply_count: usize) -> Vec<Vec<usize>> {
    let mut groups = vec![Vec::new(); supply_count];
    for (hub, &supply) in assignment.iter().enumerate() {
        groups[supply].push(hub);
    }
    groups
}

/// Repeatedly visit the closest unvisited hub, starting from `start`
pub fn nearest_neighbor_order(problem: &RoutingProblem, start: Point3, hubs: &[usize]) -> Vec<usize> {
    let mut remaining: Vec<usize> = hubs.to_vec();
    remaining.sort_unstable();
    let mut order = Vec::with_capacity(remaining.len());
    let mut current: Option<usize> = None;

    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, &h) in remaining.iter().enumerate() {
            let d = match current {
                Some(c) => problem.distance(c, h),
                None => problem.depot_distance(start, h),
            };
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        let next = remaining.remove(best);
        order.push(next);
        current = Some(next);
    }
    order
}

/// Cut an ordered hub sequence into consecutive runs within the power budget.
///
/// A hub that exceeds the budget on its own ends up alone in its run.
pub fn split_by_power(problem: &RoutingProblem, ordered: &[usize]) -> Vec<Vec<usize>> {
    let mut runs = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut power = 0.0;
    for &hub in ordered {
        if problem.fits(power, hub) {
            current.push(hub);
            power += problem.demand(hub);
        } else {
            if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
            current.push(hub);
            power = problem.demand(hub);
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Build power-limited routes from one depot, choosing the next hub by
/// distance plus a penalty for leaving it isolated from the rest.
///
/// The penalty is [`ISOLATION_WEIGHT`] × the candidate's distance to its
/// closest other remaining hub, which favours sweeping through clusters over
/// lone long jumps. A route closes when no remaining hub fits; a hub too
/// large for any route gets one of its own.
pub fn penalised_chains(problem: &RoutingProblem, depot: Point3, hubs: &[usize]) -> Vec<Vec<usize>> {
    let mut remaining: Vec<usize> = hubs.to_vec();
    remaining.sort_unstable();
    let mut routes = Vec::new();

    while !remaining.is_empty() {
        let mut route: Vec<usize> = Vec::new();
        let mut power = 0.0;

        loop {
            let pick = best_penalised(problem, depot, route.last().copied(), &remaining, |h| {
                problem.fits(power, h)
            });
            let Some(i) = pick else {
                break;
            };
            let hub = remaining.remove(i);
            power += problem.demand(hub);
            route.push(hub);
        }

        if route.is_empty() {
            // Nothing fits even on an empty route: isolate the best oversized hub
            let i = best_penalised(problem, depot, None, &remaining, |_| true).unwrap_or(0);
            route.push(remaining.remove(i));
        }
        routes.push(route);
    }
    routes
}

fn best_penalised(
    problem: &RoutingProblem,
    depot: Point3,
    current: Option<usize>,
    remaining: &[usize],
    admissible: impl Fn(usize) -> bool,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &h) in remaining.iter().enumerate() {
        if !admissible(h) {
            continue;
        }
        let distance = match current {
            Some(c) => problem.distance(c, h),
            None => problem.depot_distance(depot, h),
        };
        let isolation = remaining
            .iter()
            .filter(|&&o| o != h)
            .map(|&o| problem.distance(h, o))
            .fold(f64::INFINITY, f64::min);
        let score = if isolation.is_finite() {
            distance + ISOLATION_WEIGHT * isolation
        } else {
            distance
        };
        if best.map_or(true, |(_, s)| score < s) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

/// Total length of the penalised chains over a nearest-supply assignment
pub fn nearest_chain_length(problem: &RoutingProblem, supplies: &[SupplyPoint]) -> f64 {
    let groups = group_by_supply(&nearest_assignment(problem, supplies), supplies.len());
    groups
        .iter()
        .zip(supplies)
        .map(|(hubs, supply)| {
            penalised_chains(problem, supply.position, hubs)
                .iter()
                .map(|route| problem.route_length(supply.position, route))
                .sum::<f64>()
        })
        .sum()
}

/// Circuits for a fixed hub-to-supply assignment.
///
/// Each supply's hubs are ordered nearest-neighbour from the supply, cut
/// into power-limited runs, and every run is re-ordered nearest-neighbour
/// from the supply again.
pub fn circuits_for_assignment(
    problem: &RoutingProblem,
    supplies: &[SupplyPoint],
    assignment: &[usize],
) -> Vec<Circuit> {
    let groups = group_by_supply(assignment, supplies.len());
    let mut circuits = Vec::new();
    for (s, hubs) in groups.iter().enumerate() {
        if hubs.is_empty() {
            continue;
        }
        let depot = supplies[s].position;
        let ordered = nearest_neighbor_order(problem, depot, hubs);
        for run in split_by_power(problem, &ordered) {
            let route = nearest_neighbor_order(problem, depot, &run);
            circuits.push(Circuit::new(problem, depot, s, route));
        }
    }
    circuits
}

/// Total circuit length for a fixed assignment
pub fn assignment_length(
    problem: &RoutingProblem,
    supplies: &[SupplyPoint],
    assignment: &[usize],
) -> f64 {
    circuits_for_assignment(problem, supplies, assignment)
        .iter()
        .map(|c| c.length)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::fixtures::line_problem;

    fn supply(x: f64, y: f64) -> SupplyPoint {
        SupplyPoint::free(Point3::new(x, y, 0.0))
    }

    #[test]
    fn test_nearest_assignment_ties_go_to_first_supply() {
        let problem = line_problem(&[100.0, 100.0, 100.0], 1800.0);
        // Hub 1 sits at x=1, equally far from both supplies
        let supplies = [supply(-1.0, 0.0), supply(3.0, 0.0)];
        assert_eq!(nearest_assignment(&problem, &supplies), vec![0, 0, 1]);
    }

    #[test]
    fn test_split_by_power_respects_budget() {
        let problem = line_problem(&[1000.0, 700.0, 200.0, 900.0], 1800.0);
        let runs = split_by_power(&problem, &[0, 1, 2, 3]);
        assert_eq!(runs, vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_split_isolates_oversized_hub() {
        let problem = line_problem(&[100.0, 2500.0, 100.0], 1800.0);
        let runs = split_by_power(&problem, &[0, 1, 2]);
        assert_eq!(runs, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_nearest_neighbor_order_from_depot() {
        let problem = line_problem(&[0.0; 4], 1800.0);
        let order = nearest_neighbor_order(&problem, Point3::new(5.0, 0.0, 0.0), &[0, 1, 2, 3]);
        assert_eq!(order, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_penalised_chains_respect_budget_and_cover_all() {
        let problem = line_problem(&[600.0; 7], 1800.0);
        let routes = penalised_chains(&problem, Point3::new(-1.0, 0.0, 0.0), &[0, 1, 2, 3, 4, 5, 6]);

        let mut seen: Vec<usize> = routes.iter().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
        for route in &routes {
            assert!(route.iter().map(|&h| problem.demand(h)).sum::<f64>() <= 1800.0);
        }
        assert_eq!(routes.len(), 3);
    }

    #[test]
    fn test_penalised_chains_isolate_oversized() {
        let problem = line_problem(&[3000.0, 100.0], 1800.0);
        let routes = penalised_chains(&problem, Point3::new(-1.0, 0.0, 0.0), &[0, 1]);
        assert_eq!(routes, vec![vec![1], vec![0]]);
    }

    #[test]
    fn test_circuits_for_assignment() {
        let problem = line_problem(&[1000.0, 1000.0, 1000.0], 1800.0);
        let supplies = [supply(-1.0, 0.0)];
        let circuits = circuits_for_assignment(&problem, &supplies, &[0, 0, 0]);

        assert_eq!(circuits.len(), 3);
        assert!(circuits.iter().all(|c| c.power_w <= 1800.0));
        assert!((circuits[0].length - 1.0).abs() < 1e-12);
        assert!((assignment_length(&problem, &supplies, &[0, 0, 0]) - 6.0).abs() < 1e-12);
    }
}
