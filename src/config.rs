//! # Planner Configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `LEDGRID__`-prefixed environment variables split on `__`
//! (`LEDGRID__ROUTING__STRATEGY=genetic`). Validated before any stage runs.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::coverage::HubSelection;
use crate::domain::Axis;
use crate::routing::StrategyKind;

/// Default configuration file, merged when present
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "LEDGRID__";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PlannerConfig {
    /// Seed for every randomized strategy
    pub seed: u64,

    #[validate(nested)]
    pub network: NetworkConfig,

    #[validate(nested)]
    pub coverage: CoverageConfig,

    #[validate(nested)]
    pub balance: BalanceConfig,

    #[validate(nested)]
    pub routing: RoutingConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            network: NetworkConfig::default(),
            coverage: CoverageConfig::default(),
            balance: BalanceConfig::default(),
            routing: RoutingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct NetworkConfig {
    /// Axis whose coordinate groups nodes into rows
    pub row_axis: Axis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CoverageConfig {
    pub selection: HubSelection,

    /// Explicit hub count; the greedy cover is truncated to it when larger
    #[validate(range(min = 1))]
    pub target_hub_count: Option<usize>,

    pub kmeans_max_iterations: usize,

    /// Medoid movement (m) below which k-means has converged
    #[validate(range(min = 0.0))]
    pub kmeans_tolerance: f64,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            selection: HubSelection::GreedyCover,
            target_hub_count: None,
            kmeans_max_iterations: 10,
            kmeans_tolerance: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BalanceConfig {
    /// Output ports per hub
    #[validate(range(min = 1))]
    pub port_limit: u32,

    /// Current budget per row (A); every outgoing edge draws 1 A
    #[validate(range(min = 1))]
    pub amp_limit: u32,

    pub max_iterations: usize,

    /// Non-improving iterations before redistribution gives way to reversal
    pub redistribution_patience: usize,

    /// Non-improving iterations before reversal stops
    pub reversal_patience: usize,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            port_limit: 4,
            amp_limit: 20,
            max_iterations: 1000,
            redistribution_patience: 30,
            reversal_patience: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RoutingConfig {
    pub strategy: StrategyKind,

    /// Power budget per circuit (W)
    #[validate(range(min = 1.0))]
    pub circuit_power_limit_w: f64,

    /// Power drawn per outgoing data edge (W)
    #[validate(range(min = 0.0))]
    pub watts_per_edge: f64,

    #[validate(nested)]
    pub supply: SupplyConfig,

    #[validate(nested)]
    pub two_opt: TwoOptConfig,

    #[validate(nested)]
    pub genetic: GeneticConfig,

    #[validate(nested)]
    pub ant_colony: AntColonyConfig,

    #[validate(nested)]
    pub annealing: AnnealingConfig,

    #[validate(nested)]
    pub vrp: VrpConfig,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Greedy,
            circuit_power_limit_w: 1800.0,
            watts_per_edge: 120.0,
            supply: SupplyConfig::default(),
            two_opt: TwoOptConfig::default(),
            genetic: GeneticConfig::default(),
            ant_colony: AntColonyConfig::default(),
            annealing: AnnealingConfig::default(),
            vrp: VrpConfig::default(),
        }
    }
}

/// Supply point placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_supply_range"))]
pub struct SupplyConfig {
    /// Search side positions exhaustively instead of using the side centres
    pub optimize_positions: bool,

    /// Distance (m) outside the bounding rectangle
    #[validate(range(min = 0.0))]
    pub offset_m: f64,

    /// Candidate positions sampled along each side
    #[validate(range(min = 1))]
    pub positions_per_side: usize,

    #[validate(range(min = 1, max = 4))]
    pub min_count: usize,

    #[validate(range(min = 1, max = 4))]
    pub max_count: usize,
}

impl Default for SupplyConfig {
    fn default() -> Self {
        Self {
            optimize_positions: false,
            offset_m: 2.0,
            positions_per_side: 10,
            min_count: 1,
            max_count: 4,
        }
    }
}

fn validate_supply_range(supply: &SupplyConfig) -> Result<(), ValidationError> {
    if supply.min_count > supply.max_count {
        return Err(ValidationError::new("supply_count_range"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TwoOptConfig {
    pub enabled: bool,
    pub max_passes: usize,
}

impl Default for TwoOptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_passes: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GeneticConfig {
    #[validate(range(min = 2))]
    pub population_size: usize,

    pub generations: usize,

    /// Per-hub reassignment probability
    #[validate(range(min = 0.0, max = 1.0))]
    pub mutation_rate: f64,

    /// Share of the population carried over unchanged
    #[validate(range(min = 0.0, max = 1.0))]
    pub elite_fraction: f64,

    #[validate(range(min = 1))]
    pub tournament_size: usize,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            generations: 200,
            mutation_rate: 0.15,
            elite_fraction: 0.2,
            tournament_size: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AntColonyConfig {
    #[validate(range(min = 1))]
    pub ants: usize,

    pub iterations: usize,

    /// Pheromone exponent
    pub alpha: f64,

    /// Inverse-distance exponent
    pub beta: f64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub evaporation: f64,

    #[validate(range(min = 0.0))]
    pub deposit: f64,
}

impl Default for AntColonyConfig {
    fn default() -> Self {
        Self {
            ants: 50,
            iterations: 100,
            alpha: 1.0,
            beta: 2.0,
            evaporation: 0.1,
            deposit: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_cooling"))]
pub struct AnnealingConfig {
    #[validate(range(min = 0.0))]
    pub initial_temperature: f64,

    /// Geometric decay per iteration, in (0, 1]
    pub cooling_rate: f64,

    pub iterations: usize,

    /// Largest supply point move (m) at the initial temperature
    #[validate(range(min = 0.0))]
    pub max_displacement_m: f64,

    /// How far (m) supply points may wander from the bounding rectangle
    #[validate(range(min = 0.0))]
    pub wander_margin_m: f64,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            initial_temperature: 1000.0,
            cooling_rate: 0.995,
            iterations: 5000,
            max_displacement_m: 10.0,
            wander_margin_m: 10.0,
        }
    }
}

fn validate_cooling(annealing: &AnnealingConfig) -> Result<(), ValidationError> {
    if !(annealing.cooling_rate > 0.0 && annealing.cooling_rate <= 1.0) {
        return Err(ValidationError::new("cooling_rate"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct VrpConfig {
    /// Wall-clock budget per supply point (s)
    #[validate(range(min = 1))]
    pub time_limit_secs: u64,

    /// Largest per-depot instance handed to the exact solver
    #[validate(range(min = 1))]
    pub max_nodes: usize,
}

impl Default for VrpConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: 10,
            max_nodes: 40,
        }
    }
}

impl PlannerConfig {
    /// Defaults, then `config/default.toml` if present, then the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Defaults, then `path` if present, then the environment
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(PlannerConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// Extract and validate from an already assembled figment
    pub fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: PlannerConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.balance.port_limit, 4);
        assert_eq!(config.balance.amp_limit, 20);
        assert_eq!(config.routing.circuit_power_limit_w, 1800.0);
        assert_eq!(config.routing.watts_per_edge, 120.0);
        assert_eq!(config.routing.strategy, StrategyKind::Greedy);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(PlannerConfig::default())).merge(
            Toml::string(
                r#"
                seed = 7

                [routing]
                strategy = "ant_colony"

                [routing.ant_colony]
                ants = 5
                "#,
            ),
        );
        let config = PlannerConfig::extract(figment).unwrap();

        assert_eq!(config.seed, 7);
        assert_eq!(config.routing.strategy, StrategyKind::AntColony);
        assert_eq!(config.routing.ant_colony.ants, 5);
        // Untouched keys keep their defaults
        assert_eq!(config.routing.ant_colony.iterations, 100);
        assert_eq!(config.balance.port_limit, 4);
    }

    #[test]
    fn test_invalid_supply_range_rejected() {
        let mut config = PlannerConfig::default();
        config.routing.supply.min_count = 3;
        config.routing.supply.max_count = 2;
        assert!(config.validate().is_err());

        config.routing.supply.min_count = 1;
        config.routing.supply.max_count = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let mut config = PlannerConfig::default();
        config.balance.port_limit = 0;
        assert!(config.validate().is_err());

        let mut config = PlannerConfig::default();
        config.routing.annealing.cooling_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = PlannerConfig::default();
        config.routing.genetic.mutation_rate = 1.5;
        assert!(matches!(
            PlannerConfig::extract(Figment::from(Serialized::defaults(config))),
            Err(ConfigError::Invalid(_))
        ));
    }
}
