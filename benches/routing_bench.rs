//! Criterion benchmarks for the power router.
//!
//! Every strategy routes the same grid of hubs from the side-centre supply
//! points, plus the 2-opt pass on its own.
//!
//! Run with: `cargo bench -- routing/`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ledgrid_planner::config::RoutingConfig;
use ledgrid_planner::domain::{Bounds, NodeId, Point3};
use ledgrid_planner::progress::{CancelFlag, NoopObserver};
use ledgrid_planner::routing::refine::two_opt;
use ledgrid_planner::routing::{HubDemand, PowerRouter, RoutingProblem, StrategyKind};
use rand::rngs::StdRng;
use rand::SeedableRng;
use strum::IntoEnumIterator;

fn grid(cols: usize, rows: usize) -> RoutingProblem {
    let hubs: Vec<HubDemand> = (0..cols * rows)
        .map(|i| HubDemand {
            node: NodeId(i),
            position: Point3::new((i % cols) as f64 * 2.0, (i / cols) as f64 * 1.5, 0.0),
            power_w: 240.0 + (i % 3) as f64 * 120.0,
        })
        .collect();
    let positions: Vec<Point3> = hubs.iter().map(|h| h.position).collect();
    let bounds = Bounds::from_points(&positions).expect("grid has hubs");
    RoutingProblem::new(hubs, bounds, 1800.0)
}

fn bench_config(strategy: StrategyKind) -> RoutingConfig {
    let mut config = RoutingConfig::default();
    config.strategy = strategy;
    config.genetic.generations = 40;
    config.ant_colony.iterations = 20;
    config.annealing.iterations = 1000;
    config
}

fn bench_strategies(c: &mut Criterion) {
    let problem = grid(8, 6);
    let mut group = c.benchmark_group("routing/strategy");
    group.sample_size(10);

    for kind in StrategyKind::iter() {
        let router = PowerRouter::from_config(&bench_config(kind));
        group.bench_with_input(BenchmarkId::from_parameter(kind), &problem, |b, problem| {
            b.iter(|| {
                let mut rng = StdRng::seed_from_u64(42);
                router
                    .route(black_box(problem), &NoopObserver, &CancelFlag::new(), &mut rng)
                    .expect("routing succeeds")
            });
        });
    }
    group.finish();
}

fn bench_two_opt(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing/two_opt");
    for hubs in [10usize, 25, 50] {
        let problem = grid(hubs, 1);
        let depot = Point3::new(-2.0, 0.0, 0.0);
        // Worst case start: visit the line back to front
        let route: Vec<usize> = (0..hubs).rev().collect();
        group.bench_with_input(BenchmarkId::from_parameter(hubs), &route, |b, route| {
            b.iter(|| two_opt(&problem, depot, black_box(route), 100));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_strategies, bench_two_opt);
criterion_main!(benches);
