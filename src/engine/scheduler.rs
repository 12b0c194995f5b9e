//! System scheduling and execution.
//!
//! This module is responsible for:
//! * ordering systems by their declared run-after edges,
//! * grouping systems into execution stages based on access compatibility,
//! * running the systems of a stage in parallel using Rayon,
//! * replaying deferred commands once, after the last stage of the tick.
//!
//! ## Scheduling model
//!
//! Systems are assigned to **stages** such that:
//! * a system is placed strictly after every system it names in
//!   [`System::after`],
//! * systems within the same stage do **not** conflict on component access,
//! * stages are executed sequentially.
//!
//! ## Structural synchronization
//!
//! Deferred commands are applied exactly once per tick, after every stage
//! has returned. A system therefore never observes a structural change made
//! earlier in the same tick. If any system fails, the tick's commands are
//! discarded and the error is returned.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, debug_span, info_span, warn, Span};

use crate::engine::commands::ReplayReport;
use crate::engine::error::{ECSResult, ExecutionError};
use crate::engine::manager::ECSManager;
use crate::engine::systems::System;
use crate::engine::types::{SystemID, Tick};

/// Indices of systems that can be executed in parallel.
///
/// ## Invariants
/// * All systems within a `Stage` have non-conflicting access sets.
/// * No system in a stage names another system of the same or a later
///   stage in its run-after list.
#[derive(Clone, Debug, Default)]
pub struct Stage {
    systems: Vec<usize>,
}

/// Outcome of one executed tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickSummary {
    /// Tick that was executed.
    pub tick: Tick,
    /// Number of stages run.
    pub stages: usize,
    /// Number of systems run.
    pub systems: usize,
    /// Effect of the end-of-tick replay.
    pub report: ReplayReport,
}

/// Owns systems and runs them tick by tick.
#[derive(Default)]
pub struct Scheduler {
    systems: Vec<Box<dyn System>>,
    stages: Option<Vec<Stage>>,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Scheduler {
    /// Creates an empty scheduler using the global Rayon pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs stages on a dedicated pool of `threads` workers. `0` keeps the
    /// global pool.
    pub fn with_worker_threads(mut self, threads: usize) -> ECSResult<Self> {
        if threads == 0 {
            self.pool = None;
            return Ok(self);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("stage-worker-{index}"))
            .build()
            .map_err(|e| ExecutionError::ThreadPool(e.to_string()))?;
        self.pool = Some(Arc::new(pool));
        Ok(self)
    }

    /// Registers a system. The stage plan is rebuilt on the next run.
    pub fn add_system<S: System + 'static>(&mut self, system: S) {
        self.systems.push(Box::new(system));
        self.stages = None;
    }

    /// Number of registered systems.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if no system is registered.
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Builds (or returns the cached) stage plan as system ids.
    pub fn stage_plan(&mut self) -> ECSResult<Vec<Vec<SystemID>>> {
        self.ensure_stages()?;
        Ok(self
            .stages
            .iter()
            .flatten()
            .map(|stage| stage.systems.iter().map(|&i| self.systems[i].id()).collect())
            .collect())
    }

    fn ensure_stages(&mut self) -> ECSResult<()> {
        if self.stages.is_none() {
            let stages = make_stages(&self.systems)?;
            debug!(stages = stages.len(), systems = self.systems.len(), "built stage plan");
            self.stages = Some(stages);
        }
        Ok(())
    }

    /// Executes one tick: every stage in order, then one replay.
    pub fn run(&mut self, ecs: &mut ECSManager) -> ECSResult<TickSummary> {
        self.ensure_stages()?;
        let stages = self.stages.as_deref().unwrap_or_default();

        let tick = ecs.begin_tick();
        let tick_span = info_span!("tick", tick);
        let _entered = tick_span.enter();

        if let Err(e) = run_stages(&self.systems, stages, self.pool.as_deref(), ecs) {
            let dropped = ecs.commands().discard();
            warn!(error = %e, dropped, "tick abandoned; deferred commands discarded");
            return Err(e);
        }

        let report = ecs.apply_deferred_commands()?;
        Ok(TickSummary {
            tick,
            stages: stages.len(),
            systems: self.systems.len(),
            report,
        })
    }
}

fn run_stages(
    systems: &[Box<dyn System>],
    stages: &[Stage],
    pool: Option<&rayon::ThreadPool>,
    ecs: &ECSManager,
) -> ECSResult<()> {
    for (index, stage) in stages.iter().enumerate() {
        let stage_span = debug_span!("stage", index, systems = stage.systems.len());
        let _entered = stage_span.enter();

        let run = || {
            stage
                .systems
                .par_iter()
                .try_for_each(|&i| run_system(systems[i].as_ref(), ecs, &stage_span))
        };
        match pool {
            Some(pool) => pool.install(run)?,
            None => run()?,
        }
    }
    Ok(())
}

fn run_system(system: &dyn System, ecs: &ECSManager, parent: &Span) -> ECSResult<()> {
    let access = system.access();
    let _producer = ecs.commands().producer();
    let span = debug_span!(parent: parent, "system", id = system.id(), name = system.name());
    let _entered = span.enter();
    system.run(ecs.system_ref(system.id(), &access))
}

/// Partitions systems into ordered, parallel execution stages.
///
/// ## Algorithm
/// Systems are visited in topological order of their run-after edges, ties
/// broken by system id. Each system is placed into the first stage that
/// * comes after the stages of all its predecessors, and
/// * holds no system with conflicting access.
///
/// If no such stage exists, a new stage is created.
///
/// ## Errors
/// * [`ExecutionError::DuplicateSystem`] if two systems share an id.
/// * [`ExecutionError::UnknownDependency`] for an edge to a missing system.
/// * [`ExecutionError::DependencyCycle`] if the edges are not acyclic.
pub fn make_stages(systems: &[Box<dyn System>]) -> ECSResult<Vec<Stage>> {
    let mut by_id: BTreeMap<SystemID, usize> = BTreeMap::new();
    for (index, system) in systems.iter().enumerate() {
        if by_id.insert(system.id(), index).is_some() {
            return Err(ExecutionError::DuplicateSystem(system.id()).into());
        }
    }

    let mut pending: HashMap<SystemID, usize> = HashMap::new();
    let mut successors: HashMap<SystemID, Vec<SystemID>> = HashMap::new();
    for system in systems {
        let predecessors: BTreeSet<SystemID> = system.after().into_iter().collect();
        for &dependency in &predecessors {
            if !by_id.contains_key(&dependency) {
                return Err(ExecutionError::UnknownDependency { system: system.id(), dependency }.into());
            }
            successors.entry(dependency).or_default().push(system.id());
        }
        pending.insert(system.id(), predecessors.len());
    }

    let mut ready: BTreeSet<SystemID> = pending
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut placed: HashMap<SystemID, usize> = HashMap::new();
    let mut stages: Vec<Stage> = Vec::new();

    while let Some(id) = ready.pop_first() {
        let index = by_id[&id];
        let system = &systems[index];
        let access = system.access();

        let earliest = system
            .after()
            .iter()
            .filter_map(|dependency| placed.get(dependency))
            .map(|&stage| stage + 1)
            .max()
            .unwrap_or(0);

        let slot = (earliest..stages.len()).find(|&s| {
            !stages[s]
                .systems
                .iter()
                .any(|&other| access.conflicts_with(&systems[other].access()))
        });
        let slot = match slot {
            Some(slot) => slot,
            None => {
                stages.push(Stage::default());
                stages.len() - 1
            }
        };
        stages[slot].systems.push(index);
        placed.insert(id, slot);

        for successor in successors.get(&id).into_iter().flatten() {
            if let Some(count) = pending.get_mut(successor) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*successor);
                }
            }
        }
    }

    if placed.len() != systems.len() {
        let cycle: Vec<SystemID> = by_id.keys().copied().filter(|id| !placed.contains_key(id)).collect();
        return Err(ExecutionError::DependencyCycle(cycle).into());
    }
    Ok(stages)
}
