//! # Progress Reporting & Cancellation
//!
//! Stages never print. They emit [`ProgressEvent`]s to a [`ProgressObserver`]
//! and poll a [`CancelFlag`] between iterations.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::balancer::BalancePhase;
use crate::domain::NodeId;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Coverage,
    Balance,
    Routing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageStarted {
        stage: Stage,
    },
    StageFinished {
        stage: Stage,
        elapsed_ms: u64,
    },
    HubAdded {
        node: NodeId,
        covered: usize,
        remaining: usize,
    },
    CoverageIncomplete {
        uncovered: usize,
    },
    BalancePhaseChanged {
        phase: BalancePhase,
        iteration: usize,
    },
    BalanceProgress {
        phase: BalancePhase,
        iteration: usize,
        max_row_load: u32,
        port_violations: usize,
        row_violations: usize,
    },
    SupplySearch {
        tested: usize,
        total: usize,
    },
    NewBest {
        source: &'static str,
        step: usize,
        length: f64,
    },
    Fallback {
        from: &'static str,
        to: &'static str,
        reason: String,
    },
    Refined {
        before: f64,
        after: f64,
    },
}

/// Receives progress events from the planning stages
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StageStarted { stage } => info!(%stage, "stage started"),
            ProgressEvent::StageFinished { stage, elapsed_ms } => {
                info!(%stage, elapsed_ms, "stage finished")
            }
            ProgressEvent::HubAdded {
                node,
                covered,
                remaining,
            } => debug!(node = node.0, covered, remaining, "hub added"),
            ProgressEvent::CoverageIncomplete { uncovered } => {
                warn!(uncovered, "edges left without a hub endpoint")
            }
            ProgressEvent::BalancePhaseChanged { phase, iteration } => {
                info!(%phase, iteration, "balancing phase")
            }
            ProgressEvent::BalanceProgress {
                phase,
                iteration,
                max_row_load,
                port_violations,
                row_violations,
            } => debug!(
                %phase,
                iteration,
                max_row_load,
                port_violations,
                row_violations,
                "balancing"
            ),
            ProgressEvent::SupplySearch { tested, total } => {
                debug!(tested, total, "supply point search")
            }
            ProgressEvent::NewBest {
                source,
                step,
                length,
            } => debug!(source, step, length, "new best"),
            ProgressEvent::Fallback { from, to, reason } => {
                warn!(from, to, %reason, "routing strategy fell back")
            }
            ProgressEvent::Refined { before, after } => {
                info!(before, after, "2-opt refinement")
            }
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }
}

impl ProgressObserver for CollectingObserver {
    fn on_event(&self, event: &ProgressEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Shared cancellation flag, polled between iterations
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
