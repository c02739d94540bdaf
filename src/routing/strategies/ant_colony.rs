//! Ant Colony Strategy
//!
//! Hubs stay with their nearest supply point. Ants build that supply's
//! circuits hop by hop, choosing the next hub with weight
//! `pheromone^alpha * (1 / (distance + 0.1))^beta` among the hubs that still
//! fit the running power budget; a circuit closes when none fits.
//!
//! Pheromone lives in a flat table over (supplies + hubs)² locations. After
//! every round all trails evaporate and the arcs of the best solution found
//! so far receive `deposit / best_length`.

use ordered_float::OrderedFloat;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::AntColonyConfig;
use crate::progress::ProgressEvent;
use crate::routing::circuit::{circuits_for_assignment, group_by_supply, nearest_assignment};
use crate::routing::types::{Circuit, RouteContext, RoutingProblem, RoutingSolution, RoutingStrategy, SupplyPoint};
use crate::routing::RoutingError;

/// Keeps the inverse distance finite for coincident locations
const DISTANCE_FLOOR: f64 = 0.1;

pub struct AntColonyStrategy;

/// Pheromone per ordered location pair; supplies first, then hubs
struct Pheromone {
    supplies: usize,
    locations: usize,
    trail: Vec<f64>,
}

impl Pheromone {
    fn new(supplies: usize, hubs: usize) -> Self {
        let locations = supplies + hubs;
        Self {
            supplies,
            locations,
            trail: vec![1.0; locations * locations],
        }
    }

    fn slot(&self, from: Location, hub: usize) -> usize {
        let from = match from {
            Location::Supply(s) => s,
            Location::Hub(h) => self.supplies + h,
        };
        from * self.locations + self.supplies + hub
    }

    fn get(&self, from: Location, hub: usize) -> f64 {
        self.trail[self.slot(from, hub)]
    }

    fn evaporate(&mut self, rate: f64) {
        self.trail.iter_mut().for_each(|t| *t *= 1.0 - rate);
    }

    fn deposit(&mut self, circuits: &[Circuit], amount: f64) {
        for circuit in circuits {
            let mut from = Location::Supply(circuit.supply);
            for &hub in &circuit.route {
                let slot = self.slot(from, hub);
                self.trail[slot] += amount;
                from = Location::Hub(hub);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Location {
    Supply(usize),
    Hub(usize),
}

struct Ant<'a> {
    problem: &'a RoutingProblem,
    supplies: &'a [SupplyPoint],
    groups: &'a [Vec<usize>],
    pheromone: &'a Pheromone,
    config: &'a AntColonyConfig,
}

impl Ant<'_> {
    fn attraction(&self, from: Location, hub: usize) -> f64 {
        let distance = match from {
            Location::Supply(s) => self.problem.depot_distance(self.supplies[s].position, hub),
            Location::Hub(h) => self.problem.distance(h, hub),
        };
        self.pheromone.get(from, hub).powf(self.config.alpha)
            * (1.0 / (distance + DISTANCE_FLOOR)).powf(self.config.beta)
    }

    fn choose(&self, from: Location, candidates: &[usize], rng: &mut StdRng) -> usize {
        let weights: Vec<f64> = candidates.iter().map(|&h| self.attraction(from, h)).collect();
        match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            Err(_) => 0,
        }
    }

    /// One complete solution: circuits and their total length
    fn tour(&self, rng: &mut StdRng) -> (Vec<Circuit>, f64) {
        let mut circuits = Vec::new();
        for (s, hubs) in self.groups.iter().enumerate() {
            let depot = self.supplies[s].position;
            let mut remaining = hubs.clone();
            let mut route: Vec<usize> = Vec::new();
            let mut power = 0.0;

            while !remaining.is_empty() {
                let (from, candidates): (Location, Vec<usize>) = match route.last() {
                    None => (Location::Supply(s), remaining.clone()),
                    Some(&last) => (
                        Location::Hub(last),
                        remaining
                            .iter()
                            .copied()
                            .filter(|&h| self.problem.fits(power, h))
                            .collect(),
                    ),
                };

                if candidates.is_empty() {
                    circuits.push(Circuit::new(self.problem, depot, s, std::mem::take(&mut route)));
                    power = 0.0;
                    continue;
                }

                let hub = candidates[self.choose(from, &candidates, rng)];
                remaining.retain(|&h| h != hub);
                power += self.problem.demand(hub);
                route.push(hub);
            }
            if !route.is_empty() {
                circuits.push(Circuit::new(self.problem, depot, s, route));
            }
        }
        let length = circuits.iter().map(|c| c.length).sum();
        (circuits, length)
    }
}

impl RoutingStrategy for AntColonyStrategy {
    fn name(&self) -> &'static str {
        "ant_colony"
    }

    fn route(
        &self,
        ctx: &RouteContext<'_>,
        rng: &mut StdRng,
    ) -> Result<RoutingSolution, RoutingError> {
        let problem = ctx.problem;
        let supplies = ctx.supplies;
        let config = &ctx.config.ant_colony;
        let assignment = nearest_assignment(problem, supplies);
        let groups = group_by_supply(&assignment, supplies.len());
        let mut pheromone = Pheromone::new(supplies.len(), problem.hub_count());
        let mut best: Option<(Vec<Circuit>, f64)> = None;

        for round in 0..config.iterations {
            if ctx.cancel.is_cancelled() {
                tracing::warn!(round, "ant colony cancelled");
                break;
            }

            let seeds: Vec<u64> = (0..config.ants.max(1)).map(|_| rng.gen()).collect();
            let ant = Ant {
                problem,
                supplies,
                groups: &groups,
                pheromone: &pheromone,
                config,
            };
            let round_best = seeds
                .par_iter()
                .enumerate()
                .map(|(i, &seed)| {
                    let (circuits, length) = ant.tour(&mut StdRng::seed_from_u64(seed));
                    (OrderedFloat(length), i, circuits)
                })
                .min_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

            if let Some((length, _, circuits)) = round_best {
                if best.as_ref().map_or(true, |(_, b)| length.into_inner() < *b) {
                    ctx.observer.on_event(&ProgressEvent::NewBest {
                        source: self.name(),
                        step: round,
                        length: length.into_inner(),
                    });
                    best = Some((circuits, length.into_inner()));
                }
            }

            pheromone.evaporate(config.evaporation);
            if let Some((circuits, length)) = &best {
                if *length > 0.0 {
                    pheromone.deposit(circuits, config.deposit / length);
                }
            }
        }

        let circuits = match best {
            Some((circuits, _)) => circuits,
            None => circuits_for_assignment(problem, supplies, &assignment),
        };
        Ok(RoutingSolution::new(self.name(), supplies.to_vec(), circuits))
    }
}
