//! Routing Strategies
//!
//! One [`RoutingStrategy`](super::RoutingStrategy) per algorithm:
//! - Greedy: angular sectors per supply, penalised nearest-neighbour chains
//! - VRP: capacitated vehicle routing per supply point, exact when the
//!   `optimization` feature is on
//! - Genetic: evolves the hub-to-supply assignment
//! - Ant colony: pheromone-guided circuit construction
//! - Simulated annealing: moves supply points and reassigns hubs together

pub mod annealing;
pub mod ant_colony;
pub mod genetic;
pub mod greedy;
pub mod vrp;

pub use annealing::AnnealingStrategy;
pub use ant_colony::AntColonyStrategy;
pub use genetic::GeneticStrategy;
pub use greedy::{greedy_circuits, GreedyAngular};
pub use vrp::{SolverError, VrpSolver, VrpStrategy};
