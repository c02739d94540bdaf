use thiserror::Error;

use crate::domain::Point3;
use crate::routing::RoutingError;

/// Input that cannot be planned at all. Nothing downstream runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("network has no nodes")]
    EmptyNodes,

    #[error("network has no edges")]
    EmptyEdges,

    #[error("node {point} has a non-finite coordinate")]
    NonFiniteCoordinate { point: Point3 },

    #[error("edge #{edge} references unknown node {point}")]
    UnknownNode { edge: usize, point: Point3 },

    #[error("edge #{edge} starts and ends at the same node {point}")]
    SelfLoop { edge: usize, point: Point3 },
}

/// Fatal pipeline errors.
///
/// Partial coverage, port/row violations and oversized circuits are not
/// errors; they are reported in the stage results.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("infeasible input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("planning cancelled before stage '{0}'")]
    Cancelled(&'static str),

    #[error("routing failed: {0}")]
    Routing(#[from] RoutingError),
}
