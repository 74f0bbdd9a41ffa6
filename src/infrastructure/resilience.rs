//! Per-analyzer circuit breakers.
//!
//! One [`BreakerCell`] per analyzer, owned by the [`BreakerRegistry`] — the
//! only state shared across requests. Each cell is internally synchronised;
//! the registry never funnels requests through a single lock, and no lock is
//! held across an outbound call: callers take a [`Ticket`] at admission and
//! report the outcome when the call completes.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::BreakerConfig;
use crate::domain::Analyzer;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Healthy; calls admitted.
    Closed,
    /// Degraded; calls rejected immediately.
    Open,
    /// Probing; exactly one call admitted at a time.
    HalfOpen,
}

#[derive(Debug)]
struct CellInner {
    state: BreakerState,
    /// Trailing completion window; `true` records a failure.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// The breaker for a single analyzer.
#[derive(Debug)]
pub struct BreakerCell {
    config: BreakerConfig,
    inner: Mutex<CellInner>,
}

impl BreakerCell {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CellInner {
                state: BreakerState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Ask to place a call. `None` means the circuit refuses (short-circuit).
    pub fn admit(self: &Arc<Self>) -> Option<Ticket> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");

        match inner.state {
            BreakerState::Closed => Some(Ticket::new(Arc::clone(self), false)),
            BreakerState::Open => {
                let cooled_down = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.cooldown());
                if cooled_down {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    Some(Ticket::new(Arc::clone(self), true))
                } else {
                    None
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    None
                } else {
                    inner.probe_in_flight = true;
                    Some(Ticket::new(Arc::clone(self), true))
                }
            }
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    fn record(&self, probe: bool, success: bool) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");

        if probe {
            inner.probe_in_flight = false;
            if success {
                inner.state = BreakerState::Closed;
                inner.window.clear();
            } else {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            return;
        }

        inner.window.push_back(!success);
        while inner.window.len() > self.config.window {
            inner.window.pop_front();
        }

        if inner.state == BreakerState::Closed && self.should_trip(&inner) {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    /// A cancelled probe never reported back; return the cell to `Open` and
    /// restart the cooldown so the slot is not stuck.
    fn abandon(&self, probe: bool) {
        if !probe {
            return;
        }
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.probe_in_flight = false;
        inner.state = BreakerState::Open;
        inner.opened_at = Some(Instant::now());
    }

    fn should_trip(&self, inner: &CellInner) -> bool {
        let completions = inner.window.len();
        let failures = inner.window.iter().filter(|&&failed| failed).count();

        if failures as u32 >= self.config.failure_threshold {
            return true;
        }
        completions >= self.config.minimum_samples
            && failures as f64 / completions as f64 > self.config.ratio_threshold
    }
}

/// Admission token for one outbound call.
///
/// Callers must consume the ticket with [`Ticket::record`]; a ticket dropped
/// unresolved (cancelled call) releases its probe slot via `Drop`.
#[derive(Debug)]
pub struct Ticket {
    cell: Arc<BreakerCell>,
    probe: bool,
    resolved: bool,
}

impl Ticket {
    fn new(cell: Arc<BreakerCell>, probe: bool) -> Self {
        Self {
            cell,
            probe,
            resolved: false,
        }
    }

    /// Report the call outcome and transition the breaker.
    pub fn record(mut self, success: bool) {
        self.resolved = true;
        self.cell.record(self.probe, success);
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.resolved {
            self.cell.abandon(self.probe);
        }
    }
}

/// Holds one breaker per analyzer.
#[derive(Debug)]
pub struct BreakerRegistry {
    cells: BTreeMap<Analyzer, Arc<BreakerCell>>,
}

impl BreakerRegistry {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            cells: Analyzer::ALL
                .into_iter()
                .map(|a| (a, Arc::new(BreakerCell::new(config.clone()))))
                .collect(),
        }
    }

    pub fn admit(&self, analyzer: Analyzer) -> Option<Ticket> {
        self.cells
            .get(&analyzer)
            .expect("registry covers every analyzer")
            .admit()
    }

    /// Point-in-time view of every breaker, for `/health`. May be slightly
    /// stale by the time it is serialized.
    pub fn snapshot(&self) -> BTreeMap<Analyzer, BreakerState> {
        self.cells
            .iter()
            .map(|(&analyzer, cell)| (analyzer, cell.state()))
            .collect()
    }
}
