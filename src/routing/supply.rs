//! # Supply Point Placement
//!
//! Supply points always sit `offset_m` outside the network's bounding
//! rectangle. Either the side centres are used as-is, or every combination
//! of sides and evenly spaced positions along them is scored and the
//! shortest one wins.

use itertools::Itertools;
use ordered_float::OrderedFloat;
use rayon::prelude::*;

use crate::config::SupplyConfig;
use crate::domain::{Bounds, Side};
use crate::progress::{CancelFlag, ProgressEvent, ProgressObserver};

use super::circuit::nearest_chain_length;
use super::types::{RoutingProblem, SupplyPoint};
use super::RoutingError;

/// Configurations scored between progress events and cancellation checks
const SEARCH_CHUNK: usize = 256;

/// The first `count` side centres in left, right, bottom, top order
pub fn default_supply_points(bounds: &Bounds, offset: f64, count: usize) -> Vec<SupplyPoint> {
    Side::ALL
        .iter()
        .take(count.clamp(1, Side::ALL.len()))
        .map(|&side| SupplyPoint::on_side(side, bounds.side_center(side, offset)))
        .collect()
}

/// Evenly spaced candidates along one side, corners included.
/// A single position means the side centre.
pub fn side_candidates(bounds: &Bounds, side: Side, positions: usize, offset: f64) -> Vec<SupplyPoint> {
    if positions <= 1 {
        return vec![SupplyPoint::on_side(side, bounds.side_center(side, offset))];
    }
    let steps = (positions - 1) as f64;
    (0..positions)
        .map(|i| SupplyPoint::on_side(side, bounds.side_point(side, i as f64 / steps, offset)))
        .collect()
}

/// Every candidate configuration, larger supply counts first
fn candidate_configurations(bounds: &Bounds, config: &SupplyConfig) -> Vec<Vec<SupplyPoint>> {
    let per_side: Vec<Vec<SupplyPoint>> = Side::ALL
        .iter()
        .map(|&side| side_candidates(bounds, side, config.positions_per_side, config.offset_m))
        .collect();

    let max = config.max_count.min(Side::ALL.len());
    let min = config.min_count.max(1);

    let mut configurations = Vec::new();
    for count in (min..=max).rev() {
        for sides in (0..Side::ALL.len()).combinations(count) {
            configurations.extend(
                sides
                    .iter()
                    .map(|&s| per_side[s].iter().copied())
                    .multi_cartesian_product(),
            );
        }
    }
    configurations
}

/// Score every side/position combination and keep the shortest.
///
/// The score is the total length of penalised nearest-neighbour chains after
/// sending each hub to its closest supply. Equal scores keep the configuration
/// enumerated first, so the result does not depend on thread scheduling.
/// Cancellation stops the search and keeps the best configuration seen so far.
pub fn search_supply_points(
    problem: &RoutingProblem,
    config: &SupplyConfig,
    observer: &dyn ProgressObserver,
    cancel: &CancelFlag,
) -> Result<Vec<SupplyPoint>, RoutingError> {
    let mut configurations = candidate_configurations(&problem.bounds, config);
    let total = configurations.len();
    tracing::info!(
        configurations = total,
        positions_per_side = config.positions_per_side,
        "searching supply point positions"
    );

    let mut best: Option<(OrderedFloat<f64>, usize)> = None;
    let mut tested = 0;

    for (chunk_index, chunk) in configurations.chunks(SEARCH_CHUNK).enumerate() {
        if cancel.is_cancelled() {
            tracing::warn!(tested, total, "supply point search cancelled");
            break;
        }
        let base = chunk_index * SEARCH_CHUNK;
        let chunk_best = chunk
            .par_iter()
            .enumerate()
            .map(|(i, supplies)| (OrderedFloat(nearest_chain_length(problem, supplies)), base + i))
            .min();

        if let Some(candidate) = chunk_best {
            if best.map_or(true, |b| candidate < b) {
                best = Some(candidate);
                observer.on_event(&ProgressEvent::NewBest {
                    source: "supply_search",
                    step: candidate.1,
                    length: candidate.0.into_inner(),
                });
            }
        }
        tested += chunk.len();
        observer.on_event(&ProgressEvent::SupplySearch { tested, total });
    }

    let (length, index) = best.ok_or(RoutingError::NoCandidateConfiguration)?;
    let chosen = configurations.swap_remove(index);
    tracing::info!(
        supplies = chosen.len(),
        length = length.into_inner(),
        "supply points selected"
    );
    Ok(chosen)
}
