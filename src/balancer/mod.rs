//! # Direction Balancer
//!
//! Decides which endpoint of every covered edge is the data source so that
//! no hub exceeds its output ports and no row exceeds its current budget.
//!
//! Runs as a bounded three-phase local search:
//!
//! 1. **Repair**: move edges off over-budget rows, then off over-subscribed
//!    hubs, onto alternate hubs with spare capacity on both dimensions.
//! 2. **Redistribute**: lower the peak row load by re-feeding sinks from hubs
//!    in less loaded (preferably neighbouring) rows.
//! 3. **Reverse**: once redistribution stalls, flip hub-to-hub edges out of
//!    the peak row.
//!
//! Unresolvable violations are returned as data, not errors.

mod state;

use serde::Serialize;
use std::time::Instant;
use tracing::debug;

use crate::config::BalanceConfig;
use crate::coverage::HubSet;
use crate::domain::{EdgeId, Network, NodeId, RowId};
use crate::progress::{CancelFlag, ProgressEvent, ProgressObserver};

use state::LoadState;

/// Iterations between periodic progress events
const PROGRESS_INTERVAL: usize = 100;

/// Priority bonus for moving load into an adjacent row
const NEIGHBOUR_ROW_BONUS: i64 = 100;

/// An edge with its data flow: `source` feeds `sink`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DirectedEdge {
    pub edge: EdgeId,
    /// Always a hub
    pub source: NodeId,
    pub sink: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BalancePhase {
    Repair,
    Redistribute,
    Reverse,
}

/// Hub with more outgoing edges than ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortViolation {
    pub hub: NodeId,
    pub outputs: u32,
}

/// Row drawing more current than its budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowViolation {
    pub row: RowId,
    pub load: u32,
}

/// Port and current limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceLimits {
    pub port_limit: u32,
    pub amp_limit: u32,
}

impl From<&BalanceConfig> for BalanceLimits {
    fn from(config: &BalanceConfig) -> Self {
        Self {
            port_limit: config.port_limit,
            amp_limit: config.amp_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceResult {
    /// Direction per edge, indexed by [`EdgeId`]; `None` where no hub touches the edge
    pub directions: Vec<Option<DirectedEdge>>,
    /// Outgoing edges per node, indexed by [`NodeId`]
    pub outputs: Vec<u32>,
    /// Outgoing edges per row, indexed by [`RowId`]
    pub row_loads: Vec<u32>,
    pub port_violations: Vec<PortViolation>,
    pub row_violations: Vec<RowViolation>,
    pub iterations: usize,
    pub moves: usize,
    /// Phase the search ended in
    pub final_phase: BalancePhase,
}

impl BalanceResult {
    pub fn directed_edges(&self) -> impl Iterator<Item = &DirectedEdge> + '_ {
        self.directions.iter().flatten()
    }

    pub fn direction(&self, edge: EdgeId) -> Option<&DirectedEdge> {
        self.directions.get(edge.0).and_then(Option::as_ref)
    }

    pub fn outputs_of(&self, hub: NodeId) -> u32 {
        self.outputs.get(hub.0).copied().unwrap_or(0)
    }

    pub fn max_row_load(&self) -> u32 {
        self.row_loads.iter().copied().max().unwrap_or(0)
    }

    /// True when every hub and row is within budget
    pub fn is_satisfied(&self) -> bool {
        self.port_violations.is_empty() && self.row_violations.is_empty()
    }
}

/// Assign and repair edge directions.
///
/// Bounded by `config.max_iterations`; cancellation ends the search early
/// with the directions reached so far.
pub fn balance(
    network: &Network,
    hubs: &HubSet,
    config: &BalanceConfig,
    observer: &dyn ProgressObserver,
    cancel: &CancelFlag,
) -> BalanceResult {
    let limits = BalanceLimits::from(config);
    let mut state = LoadState::initial(network, hubs);
    let started = Instant::now();

    let mut phase = BalancePhase::Repair;
    let mut iteration = 0;
    let mut moves = 0;
    let mut best_peak = u32::MAX;
    let mut stall = 0;

    observer.on_event(&ProgressEvent::BalancePhaseChanged { phase, iteration });

    while iteration < config.max_iterations && !cancel.is_cancelled() {
        let next = match phase {
            BalancePhase::Repair => {
                let rows = state.row_violations(limits.amp_limit);
                let ports = state.port_violations(limits.port_limit);
                if rows.is_empty() && ports.is_empty() {
                    Some(BalancePhase::Redistribute)
                } else if let Some(repair) = repair_move(&state, &rows, &ports, limits) {
                    match repair {
                        RepairMove::Redirect { edge, to } => state.redirect(edge, to),
                        RepairMove::Reverse(edge) => state.reverse(edge),
                    }
                    moves += 1;
                    None
                } else {
                    debug!(iteration, "no repair move left");
                    break;
                }
            }
            BalancePhase::Redistribute => {
                if stall >= config.redistribution_patience {
                    Some(BalancePhase::Reverse)
                } else if let Some((edge, alt)) = redistribute_move(&state, limits) {
                    state.redirect(edge, alt);
                    moves += 1;
                    track_peak(&state, &mut best_peak, &mut stall);
                    None
                } else {
                    Some(BalancePhase::Reverse)
                }
            }
            BalancePhase::Reverse => {
                if stall >= config.reversal_patience {
                    break;
                }
                match reverse_move(&state, limits) {
                    Some(edge) => {
                        state.reverse(edge);
                        moves += 1;
                        track_peak(&state, &mut best_peak, &mut stall);
                        None
                    }
                    None => break,
                }
            }
        };

        if let Some(next_phase) = next {
            phase = next_phase;
            best_peak = state.max_row_load();
            stall = 0;
            observer.on_event(&ProgressEvent::BalancePhaseChanged { phase, iteration });
            continue;
        }

        iteration += 1;
        if iteration % PROGRESS_INTERVAL == 0 {
            report(&state, phase, iteration, limits, observer);
        }
    }

    report(&state, phase, iteration, limits, observer);
    debug!(
        iterations = iteration,
        moves,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "balancing finished"
    );

    BalanceResult {
        port_violations: state.port_violations(limits.port_limit),
        row_violations: state.row_violations(limits.amp_limit),
        directions: state.directions,
        outputs: state.outputs,
        row_loads: state.row_loads,
        iterations: iteration,
        moves,
        final_phase: phase,
    }
}

fn track_peak(state: &LoadState<'_>, best_peak: &mut u32, stall: &mut usize) {
    let peak = state.max_row_load();
    if peak < *best_peak {
        *best_peak = peak;
        *stall = 0;
    } else {
        *stall += 1;
    }
}

fn report(
    state: &LoadState<'_>,
    phase: BalancePhase,
    iteration: usize,
    limits: BalanceLimits,
    observer: &dyn ProgressObserver,
) {
    observer.on_event(&ProgressEvent::BalanceProgress {
        phase,
        iteration,
        max_row_load: state.max_row_load(),
        port_violations: state.port_violations(limits.port_limit).len(),
        row_violations: state.row_violations(limits.amp_limit).len(),
    });
}

/// One step of the repair phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepairMove {
    /// Feed the sink of `edge` from hub `to` instead
    Redirect { edge: EdgeId, to: NodeId },
    /// Swap source and sink of a hub-to-hub edge
    Reverse(EdgeId),
}

/// First move that relieves a violated row, else a violated hub.
///
/// For each edge leaving the violation, alternate hubs next to the sink are
/// tried first, then flipping the edge when its sink is itself a hub. The
/// new source must have a free port, and its row must have spare current
/// unless it is the row already carrying the edge.
fn repair_move(
    state: &LoadState<'_>,
    rows: &[RowViolation],
    ports: &[PortViolation],
    limits: BalanceLimits,
) -> Option<RepairMove> {
    let can_take = |hub: NodeId, carrying_row: RowId, same_row_ok: bool| {
        let row = state.row_of(hub);
        state.outputs[hub.0] < limits.port_limit
            && ((same_row_ok && row == carrying_row)
                || (row != carrying_row && state.row_loads[row.0] < limits.amp_limit))
    };

    for violation in rows {
        for directed in state.sourced_in_row(violation.row) {
            if let Some(to) = state
                .alternates(&directed)
                .into_iter()
                .find(|&alt| can_take(alt, violation.row, false))
            {
                return Some(RepairMove::Redirect {
                    edge: directed.edge,
                    to,
                });
            }
            if is_hub_pair(state, &directed) && can_take(directed.sink, violation.row, false) {
                return Some(RepairMove::Reverse(directed.edge));
            }
        }
    }

    for violation in ports {
        for directed in state.sourced_at(violation.hub) {
            let source_row = state.row_of(directed.source);
            if let Some(to) = state
                .alternates(&directed)
                .into_iter()
                .find(|&alt| can_take(alt, source_row, true))
            {
                return Some(RepairMove::Redirect {
                    edge: directed.edge,
                    to,
                });
            }
            if is_hub_pair(state, &directed) && can_take(directed.sink, source_row, true) {
                return Some(RepairMove::Reverse(directed.edge));
            }
        }
    }
    None
}

/// Both endpoints of the edge are hubs and the direction runs along it
fn is_hub_pair(state: &LoadState<'_>, directed: &DirectedEdge) -> bool {
    let edge = state.network.edge(directed.edge);
    edge.touches(directed.source) && edge.touches(directed.sink) && state.hubs.contains(directed.sink)
}

/// Move one edge out of a heavily loaded row into a lighter one.
///
/// Rows at the peak or above the average are tried heaviest first. Each
/// move lowers the source row by one and leaves the target row strictly
/// below it, so the sum of squared row loads always drops.
fn redistribute_move(state: &LoadState<'_>, limits: BalanceLimits) -> Option<(EdgeId, NodeId)> {
    let peak = state.max_row_load();
    if peak == 0 {
        return None;
    }
    let loaded: Vec<u32> = state.row_loads.iter().copied().filter(|&l| l > 0).collect();
    let average = loaded.iter().sum::<u32>() as f64 / loaded.len() as f64;

    let mut heavy: Vec<(RowId, u32)> = state
        .row_loads
        .iter()
        .enumerate()
        .map(|(i, &load)| (RowId(i), load))
        .filter(|&(_, load)| load > 0 && (load as f64 > average || load == peak))
        .collect();
    heavy.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    for (row, load) in heavy {
        let is_neighbour = |other: RowId| other.0 + 1 == row.0 || row.0 + 1 == other.0;

        for directed in state.sourced_in_row(row) {
            let mut best: Option<(i64, NodeId)> = None;
            for alt in state.alternates(&directed) {
                let alt_row = state.row_of(alt);
                let alt_load = state.row_loads[alt_row.0];
                if alt_row == row
                    || alt_load >= limits.amp_limit
                    || state.outputs[alt.0] >= limits.port_limit
                    || alt_load + 1 >= load
                {
                    continue;
                }
                let bonus = if is_neighbour(alt_row) {
                    NEIGHBOUR_ROW_BONUS
                } else {
                    0
                };
                let priority = bonus - i64::from(alt_load);
                if best.map_or(true, |(p, _)| priority > p) {
                    best = Some((priority, alt));
                }
            }
            if let Some((_, alt)) = best {
                return Some((directed.edge, alt));
            }
        }
    }
    None
}

/// Flip a hub-to-hub edge out of a peak row
fn reverse_move(state: &LoadState<'_>, limits: BalanceLimits) -> Option<EdgeId> {
    let peak = state.max_row_load();
    if peak == 0 {
        return None;
    }

    for (i, &load) in state.row_loads.iter().enumerate() {
        if load != peak {
            continue;
        }
        for directed in state.sourced_in_row(RowId(i)) {
            if !is_hub_pair(state, &directed) {
                continue;
            }
            let target_load = state.row_loads[state.row_of(directed.sink).0];
            if target_load + 1 < load
                && target_load < limits.amp_limit
                && state.outputs[directed.sink.0] < limits.port_limit
            {
                return Some(directed.edge);
            }
        }
    }
    None
}
