//! Change signal lifecycle tracking.
//!
//! Every change signal moves through `Unborn -> Live -> Retired` exactly
//! once. The [`SignalLedger`] is reconciled against the record store after
//! each replay and rejects any history that breaks exactly-once consumption.
//!
//! Record handles are generation-counted, so a retired handle cannot be
//! reused. The ledger keeps a retired entry only through the tick after its
//! retirement and counts it from then on.

use std::collections::HashMap;

use crate::engine::entity::Entity;
use crate::engine::error::{ECSResult, ExecutionError};
use crate::engine::types::Tick;

/// Lifecycle state of one change signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalLifecycle {
    /// Not yet replayed into the store.
    Unborn,
    /// Present in the store since the given tick's replay.
    Live {
        /// Tick whose replay created it.
        since: Tick,
    },
    /// Destroyed by the given tick's replay.
    Retired {
        /// Tick whose replay destroyed it.
        at: Tick,
    },
}

/// Transitions observed by one reconciliation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerDelta {
    /// Signals that became live.
    pub raised: Vec<Entity>,
    /// Signals that were retired.
    pub retired: Vec<Entity>,
}

/// Exactly-once bookkeeping for change signals.
#[derive(Clone, Debug, Default)]
pub struct SignalLedger {
    states: HashMap<Entity, SignalLifecycle>,
    retired: usize,
}

impl SignalLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `signal`. Unknown handles, and those retired before the
    /// previous reconciliation's tick, are reported `Unborn`.
    pub fn state(&self, signal: Entity) -> SignalLifecycle {
        self.states.get(&signal).copied().unwrap_or(SignalLifecycle::Unborn)
    }

    /// Signals currently `Live`.
    pub fn live(&self) -> impl Iterator<Item = Entity> + '_ {
        self.states
            .iter()
            .filter(|(_, state)| matches!(state, SignalLifecycle::Live { .. }))
            .map(|(&entity, _)| entity)
    }

    /// Number of signals retired so far.
    pub fn retired_count(&self) -> usize {
        self.retired
    }

    /// Signals the ledger still holds an entry for.
    pub fn tracked(&self) -> usize {
        self.states.len()
    }

    /// Reconciles the ledger with the signals live in the store after `tick`'s replay.
    ///
    /// Fails with an ordering violation if
    /// * more than one signal is live,
    /// * a retired signal is live again, or
    /// * a signal survived past the tick after the one that raised it.
    pub fn reconcile(&mut self, tick: Tick, live_now: &[Entity]) -> ECSResult<LedgerDelta> {
        if live_now.len() > 1 {
            return Err(violation(tick, format!("{} change signals live at once", live_now.len())));
        }

        self.states
            .retain(|_, state| !matches!(state, SignalLifecycle::Retired { at } if *at + 1 < tick));

        let mut delta = LedgerDelta::default();
        for &signal in live_now {
            match self.state(signal) {
                SignalLifecycle::Unborn => {
                    self.states.insert(signal, SignalLifecycle::Live { since: tick });
                    delta.raised.push(signal);
                }
                SignalLifecycle::Live { since } if tick > since + 1 => {
                    return Err(violation(tick, format!("change signal {signal} raised at tick {since} was never retired")));
                }
                SignalLifecycle::Live { .. } => {}
                SignalLifecycle::Retired { at } => {
                    return Err(violation(tick, format!("change signal {signal} retired at tick {at} is live again")));
                }
            }
        }

        let mut vanished: Vec<Entity> = self.live().filter(|signal| !live_now.contains(signal)).collect();
        vanished.sort();
        for signal in vanished {
            self.states.insert(signal, SignalLifecycle::Retired { at: tick });
            self.retired += 1;
            delta.retired.push(signal);
        }
        Ok(delta)
    }
}

fn violation(tick: Tick, detail: String) -> crate::engine::error::ECSError {
    ExecutionError::OrderingViolation { tick, detail }.into()
}
