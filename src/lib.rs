//! LED network planner: hub coverage, data-direction balancing and power
//! circuit routing.

pub mod balancer;
pub mod config;
pub mod coverage;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod routing;
pub mod telemetry;

pub use error::{InputError, PlanError};
pub use pipeline::{PlanReport, Planner};
