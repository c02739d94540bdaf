//! Genetic Algorithm Strategy
//!
//! A chromosome assigns every hub to one supply point. Its cost is the total
//! length of the circuits [`circuits_for_assignment`] builds from it. Each
//! generation keeps an elite fraction unchanged and fills the rest with
//! children of tournament-selected parents:
//! - uniform crossover: each gene comes from either parent with equal odds
//! - mutation: a gene is redrawn with probability `mutation_rate`, closer
//!   supply points weighted higher (1 / (1 + distance))
//!
//! Fitness is evaluated in parallel. Random draws happen on the calling
//! thread only, so a seed fixes the outcome.

use ordered_float::OrderedFloat;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::Rng;
use rayon::prelude::*;

use crate::progress::ProgressEvent;
use crate::routing::circuit::{assignment_length, circuits_for_assignment, nearest_assignment};
use crate::routing::types::{RouteContext, RoutingProblem, RoutingSolution, RoutingStrategy, SupplyPoint};
use crate::routing::RoutingError;

type Chromosome = Vec<usize>;

pub struct GeneticStrategy;

impl RoutingStrategy for GeneticStrategy {
    fn name(&self) -> &'static str {
        "genetic"
    }

    fn route(
        &self,
        ctx: &RouteContext<'_>,
        rng: &mut StdRng,
    ) -> Result<RoutingSolution, RoutingError> {
        let problem = ctx.problem;
        let supplies = ctx.supplies;
        let config = &ctx.config.genetic;
        let population_size = config.population_size.max(2);
        let elite = ((population_size as f64 * config.elite_fraction).floor() as usize)
            .clamp(1, population_size);
        let mutation = mutation_tables(problem, supplies);

        // Seed with the nearest-supply assignment so the result never loses to it
        let mut population: Vec<Chromosome> = Vec::with_capacity(population_size);
        population.push(nearest_assignment(problem, supplies));
        while population.len() < population_size {
            population.push(
                (0..problem.hub_count())
                    .map(|_| rng.gen_range(0..supplies.len()))
                    .collect(),
            );
        }

        let mut ranked = rank(problem, supplies, &population);
        let (mut best_length, first) = ranked[0];
        let mut best = population[first].clone();

        for generation in 0..config.generations {
            if ctx.cancel.is_cancelled() {
                tracing::warn!(generation, "genetic search cancelled");
                break;
            }

            let mut next: Vec<Chromosome> = ranked
                .iter()
                .take(elite)
                .map(|&(_, i)| population[i].clone())
                .collect();
            while next.len() < population_size {
                let a = tournament(&ranked, config.tournament_size, rng);
                let b = tournament(&ranked, config.tournament_size, rng);
                let mut child = crossover(&population[a], &population[b], rng);
                mutate(&mut child, &mutation, config.mutation_rate, rng);
                next.push(child);
            }
            population = next;
            ranked = rank(problem, supplies, &population);

            let (length, index) = ranked[0];
            if length < best_length {
                best_length = length;
                best = population[index].clone();
                ctx.observer.on_event(&ProgressEvent::NewBest {
                    source: self.name(),
                    step: generation + 1,
                    length: length.into_inner(),
                });
            }
        }

        tracing::debug!(length = best_length.into_inner(), "genetic search finished");
        let circuits = circuits_for_assignment(problem, supplies, &best);
        Ok(RoutingSolution::new(self.name(), supplies.to_vec(), circuits))
    }
}

/// Population indices sorted by (length, index)
fn rank(
    problem: &RoutingProblem,
    supplies: &[SupplyPoint],
    population: &[Chromosome],
) -> Vec<(OrderedFloat<f64>, usize)> {
    let mut ranked: Vec<(OrderedFloat<f64>, usize)> = population
        .par_iter()
        .enumerate()
        .map(|(i, c)| (OrderedFloat(assignment_length(problem, supplies, c)), i))
        .collect();
    ranked.sort_unstable();
    ranked
}

/// Best of `size` distinct random contestants
fn tournament(ranked: &[(OrderedFloat<f64>, usize)], size: usize, rng: &mut StdRng) -> usize {
    let k = size.clamp(1, ranked.len());
    // Positions in `ranked` are ordered best first
    let winner = sample(rng, ranked.len(), k)
        .into_iter()
        .min()
        .unwrap_or(0);
    ranked[winner].1
}

fn crossover(a: &[usize], b: &[usize], rng: &mut StdRng) -> Chromosome {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| if rng.gen_bool(0.5) { x } else { y })
        .collect()
}

/// Per-hub supply weights 1 / (1 + distance)
fn mutation_tables(problem: &RoutingProblem, supplies: &[SupplyPoint]) -> Vec<Option<WeightedIndex<f64>>> {
    (0..problem.hub_count())
        .map(|h| {
            let weights = supplies
                .iter()
                .map(|s| 1.0 / (1.0 + problem.depot_distance(s.position, h)));
            WeightedIndex::new(weights).ok()
        })
        .collect()
}

fn mutate(
    chromosome: &mut [usize],
    tables: &[Option<WeightedIndex<f64>>],
    rate: f64,
    rng: &mut StdRng,
) {
    for (gene, table) in chromosome.iter_mut().zip(tables) {
        if rng.gen::<f64>() < rate {
            if let Some(table) = table {
                *gene = table.sample(rng);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutingConfig;
    use crate::domain::Point3;
    use crate::progress::{CancelFlag, NoopObserver};
    use crate::routing::fixtures::grid_problem;
    use rand::SeedableRng;

    fn supplies() -> Vec<SupplyPoint> {
        vec![
            SupplyPoint::free(Point3::new(-2.0, 1.0, 0.0)),
            SupplyPoint::free(Point3::new(6.0, 1.0, 0.0)),
        ]
    }

    fn solve(seed: u64, config: &RoutingConfig) -> RoutingSolution {
        let problem = grid_problem(5, 3, 360.0, 1800.0);
        let supplies = supplies();
        let cancel = CancelFlag::new();
        let ctx = RouteContext {
            problem: &problem,
            supplies: &supplies,
            config,
            observer: &NoopObserver,
            cancel: &cancel,
        };
        GeneticStrategy
            .route(&ctx, &mut StdRng::seed_from_u64(seed))
            .unwrap()
    }

    fn small_config() -> RoutingConfig {
        let mut config = RoutingConfig::default();
        config.genetic.population_size = 20;
        config.genetic.generations = 15;
        config
    }

    #[test]
    fn test_genetic_is_reproducible() {
        let config = small_config();
        assert_eq!(solve(3, &config), solve(3, &config));
    }

    #[test]
    fn test_genetic_never_worse_than_nearest_assignment() {
        let config = small_config();
        let problem = grid_problem(5, 3, 360.0, 1800.0);
        let baseline = assignment_length(&problem, &supplies(), &nearest_assignment(&problem, &supplies()));

        let solution = solve(11, &config);
        assert!(solution.total_length <= baseline + 1e-9);
        assert!(solution.circuits.iter().all(|c| c.power_w <= 1800.0));
    }

    #[test]
    fn test_zero_generations_keeps_best_initial() {
        let mut config = small_config();
        config.genetic.generations = 0;
        let solution = solve(5, &config);
        let routed: usize = solution.circuits.iter().map(|c| c.route.len()).sum();
        assert_eq!(routed, 15);
    }

    #[test]
    fn test_tournament_picks_best_contestant() {
        let ranked = vec![(OrderedFloat(1.0), 7), (OrderedFloat(2.0), 3), (OrderedFloat(3.0), 5)];
        let mut rng = StdRng::seed_from_u64(0);
        // Every contestant drawn means the overall best wins
        assert_eq!(tournament(&ranked, 3, &mut rng), 7);
    }
}
