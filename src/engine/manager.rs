//! Record store management and execution layer.
//!
//! This module defines the orchestration layer of the engine:
//!
//! * [`ECSData`] owns archetypes and the record allocator and exposes the
//!   exclusive (`&mut`) structural API used at synchronization points,
//! * [`ECSManager`] pairs the data with the tick's [`CommandBuffer`] and the
//!   tick counter,
//! * [`ECSReference`] is what a running system sees: shared access to
//!   component columns, parallel iteration helpers and `defer`.
//!
//! ## Concurrency model
//!
//! * Systems only ever hold `&ECSData`. Component columns sit behind
//!   `RwLock`s, so a writing system takes an exclusive column guard while
//!   readers of other columns proceed in parallel.
//! * Structural mutation needs `&mut ECSData`, which is only reachable from
//!   [`ECSManager::apply_deferred_commands`], after every stage has returned.
//! * Per-record parallel work is partitioned by row: each rayon job owns a
//!   disjoint `&mut` sub-slice of the written column.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::debug;

use crate::engine::archetype::Archetype;
use crate::engine::commands::{Command, CommandBuffer, ReplayReport};
use crate::engine::component::Bundle;
use crate::engine::entity::{Entities, Entity, EntityLocation};
use crate::engine::error::{ECSResult, ExecutionError, SpawnError};
use crate::engine::query::{Query, QueryBuilder};
use crate::engine::scheduler::{Scheduler, TickSummary};
use crate::engine::storage::{Column, TypeErasedColumn};
use crate::engine::types::{AccessSets, ArchetypeID, ComponentID, QuerySignature, RowID, Signature, SystemID, Tick};

/// Core storage: archetypes plus the record allocator.
///
/// ## Invariants
/// * `signature_map` and `archetypes` stay consistent.
/// * Every live record's location points at its row.
#[derive(Default)]
pub struct ECSData {
    archetypes: Vec<Archetype>,
    signature_map: HashMap<Signature, ArchetypeID>,
    entities: Entities,
}

impl ECSData {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create_archetype(&mut self, signature: &Signature) -> ECSResult<ArchetypeID> {
        if let Some(&id) = self.signature_map.get(signature) {
            return Ok(id);
        }
        let id = ArchetypeID::try_from(self.archetypes.len()).map_err(|_| SpawnError::Capacity)?;
        self.archetypes.push(Archetype::new(id, *signature)?);
        self.signature_map.insert(*signature, id);
        Ok(id)
    }

    #[inline]
    fn get_archetype_pair_mut(
        archetypes: &mut [Archetype],
        a: ArchetypeID,
        b: ArchetypeID,
    ) -> (&mut Archetype, &mut Archetype) {
        assert!(a != b, "source and destination archetype must differ");
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = archetypes.split_at_mut(high as usize);
        let left = &mut head[low as usize];
        let right = &mut tail[0];
        if a < b { (left, right) } else { (right, left) }
    }

    fn relocate(&mut self, archetype: ArchetypeID, row: usize, moved: Option<Entity>) {
        if let Some(moved) = moved {
            self.entities.set_location(moved, EntityLocation { archetype, row: row as RowID });
        }
    }

    /// Creates a record from `bundle`.
    pub fn spawn(&mut self, bundle: Bundle) -> ECSResult<Entity> {
        if bundle.is_empty() {
            return Err(SpawnError::EmptyBundle.into());
        }
        let archetype_id = self.get_or_create_archetype(&bundle.signature())?;
        let row = self.archetypes[archetype_id as usize].len();
        let entity = self.entities.alloc(EntityLocation { archetype: archetype_id, row: row as RowID })?;

        if let Err(e) = self.archetypes[archetype_id as usize].push_bundle(entity, bundle) {
            self.entities.free(entity);
            return Err(e);
        }
        Ok(entity)
    }

    /// Destroys a record. Returns `false` if it was already gone.
    pub fn despawn(&mut self, entity: Entity) -> ECSResult<bool> {
        let Some(location) = self.entities.location(entity) else {
            return Ok(false);
        };
        let row = location.row as usize;
        let swapped = self.archetypes[location.archetype as usize].swap_remove(row)?;
        self.relocate(location.archetype, row, swapped.moved);
        self.entities.free(entity);
        Ok(true)
    }

    /// Adds or overwrites a component, migrating the record if its signature changes.
    ///
    /// Returns `false` if the record is gone.
    pub fn add_component(
        &mut self,
        entity: Entity,
        component_id: ComponentID,
        value: Box<dyn std::any::Any + Send>,
    ) -> ECSResult<bool> {
        let Some(location) = self.entities.location(entity) else {
            return Ok(false);
        };
        let source_id = location.archetype;
        let row = location.row as usize;

        if self.archetypes[source_id as usize].has(component_id) {
            self.archetypes[source_id as usize]
                .column_mut(component_id)?
                .replace_boxed(row, component_id, value)?;
            return Ok(true);
        }

        let mut signature = *self.archetypes[source_id as usize].signature();
        signature.set(component_id);
        let destination_id = self.get_or_create_archetype(&signature)?;

        let (source, destination) = Self::get_archetype_pair_mut(&mut self.archetypes, source_id, destination_id);
        let (destination_row, swapped) = source.move_row_to(destination, row, vec![(component_id, value)])?;

        self.entities.set_location(entity, EntityLocation { archetype: destination_id, row: destination_row as RowID });
        self.relocate(source_id, row, swapped.moved);
        Ok(true)
    }

    /// Removes a component, migrating the record. Removing the last component
    /// destroys the record.
    ///
    /// Returns `false` if the record is gone or lacks the component.
    pub fn remove_component(&mut self, entity: Entity, component_id: ComponentID) -> ECSResult<bool> {
        let Some(location) = self.entities.location(entity) else {
            return Ok(false);
        };
        let source_id = location.archetype;
        let row = location.row as usize;
        if !self.archetypes[source_id as usize].has(component_id) {
            return Ok(false);
        }

        let mut signature = *self.archetypes[source_id as usize].signature();
        signature.clear(component_id);
        if signature.is_empty() {
            return self.despawn(entity);
        }

        let destination_id = self.get_or_create_archetype(&signature)?;
        let (source, destination) = Self::get_archetype_pair_mut(&mut self.archetypes, source_id, destination_id);
        let (destination_row, swapped) = source.move_row_to(destination, row, Vec::new())?;

        self.entities.set_location(entity, EntityLocation { archetype: destination_id, row: destination_row as RowID });
        self.relocate(source_id, row, swapped.moved);
        Ok(true)
    }

    /// Applies commands in order.
    pub fn apply(&mut self, commands: Vec<Command>) -> ECSResult<ReplayReport> {
        let mut report = ReplayReport::default();
        for command in commands {
            match command {
                Command::Spawn { bundle } => report.spawned.push(self.spawn(bundle)?),
                Command::Despawn { entity } => {
                    if self.despawn(entity)? {
                        report.despawned.push(entity);
                    } else {
                        debug!(%entity, "despawn of absent record ignored");
                        report.ignored += 1;
                    }
                }
                Command::Add { entity, component_id, value } => {
                    if self.add_component(entity, component_id, value)? {
                        report.added += 1;
                    } else {
                        debug!(%entity, component_id, "add on absent record ignored");
                        report.ignored += 1;
                    }
                }
                Command::Remove { entity, component_id } => {
                    if self.remove_component(entity, component_id)? {
                        report.removed += 1;
                    } else {
                        debug!(%entity, component_id, "remove on absent record or component ignored");
                        report.ignored += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    /// Returns `true` if `entity` is live.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Number of live records.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.entities.live_count()
    }

    /// Returns a copy of component `T` on `entity`.
    pub fn get<T: 'static + Send + Sync + Clone>(&self, entity: Entity) -> ECSResult<Option<T>> {
        let component_id = crate::engine::component::component_id_of::<T>()?;
        let Some(location) = self.entities.location(entity) else {
            return Ok(None);
        };
        let archetype = &self.archetypes[location.archetype as usize];
        let Some(column) = archetype.read_column(component_id)? else {
            return Ok(None);
        };
        Ok(typed::<T>(&**column, component_id)?.get(location.row as usize).cloned())
    }

    /// Returns a mutable reference to component `T` on `entity`.
    pub fn get_mut<T: 'static + Send + Sync>(&mut self, entity: Entity) -> ECSResult<Option<&mut T>> {
        let component_id = crate::engine::component::component_id_of::<T>()?;
        let Some(location) = self.entities.location(entity) else {
            return Ok(None);
        };
        let archetype = &mut self.archetypes[location.archetype as usize];
        if !archetype.has(component_id) {
            return Ok(None);
        }
        let column = archetype.column_mut(component_id)?;
        Ok(typed_mut::<T>(&mut **column, component_id)?.get_mut(location.row as usize))
    }

    /// Archetypes matching a query signature.
    pub fn matching_archetypes<'a>(&'a self, query: &'a QuerySignature) -> impl Iterator<Item = &'a Archetype> + 'a {
        self.archetypes.iter().filter(move |a| query.requires_all(a.signature()))
    }

    /// Number of records matching `query`.
    pub fn count(&self, query: &Query) -> usize {
        self.matching_archetypes(query.signature()).map(Archetype::len).sum()
    }

    /// Records matching `query`, in archetype then row order.
    pub fn entities_matching(&self, query: &Query) -> Vec<Entity> {
        self.matching_archetypes(query.signature())
            .flat_map(|a| a.entities().iter().copied())
            .collect()
    }

    /// Verifies row alignment of every archetype.
    pub fn check_integrity(&self) -> ECSResult<()> {
        self.archetypes.iter().try_for_each(Archetype::check_alignment)
    }
}

fn typed<T: 'static>(column: &dyn TypeErasedColumn, component_id: ComponentID) -> ECSResult<&Column<T>> {
    let expected = column.element_type();
    column.as_any().downcast_ref::<Column<T>>().ok_or_else(|| {
        SpawnError::TypeMismatch { component_id, expected, actual: std::any::TypeId::of::<T>() }.into()
    })
}

fn typed_mut<T: 'static>(column: &mut dyn TypeErasedColumn, component_id: ComponentID) -> ECSResult<&mut Column<T>> {
    let expected = column.element_type();
    column.as_any_mut().downcast_mut::<Column<T>>().ok_or_else(|| {
        SpawnError::TypeMismatch { component_id, expected, actual: std::any::TypeId::of::<T>() }.into()
    })
}

/// Owner of the record store, its command buffer and the tick counter.
pub struct ECSManager {
    data: ECSData,
    commands: CommandBuffer,
    tick: Tick,
    min_batch_len: usize,
}

impl Default for ECSManager {
    fn default() -> Self {
        Self::new(ECSData::new())
    }
}

impl ECSManager {
    /// Wraps existing data. The tick counter starts at `0` (setup).
    pub fn new(data: ECSData) -> Self {
        Self {
            data,
            commands: CommandBuffer::new(),
            tick: 0,
            min_batch_len: 1,
        }
    }

    /// Sets the minimum number of records each parallel job processes.
    pub fn with_min_batch_len(mut self, min_batch_len: usize) -> Self {
        self.min_batch_len = min_batch_len.max(1);
        self
    }

    /// Current tick: the one running, or the last one completed.
    #[inline]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Shared view of the data.
    #[inline]
    pub fn data(&self) -> &ECSData {
        &self.data
    }

    /// Exclusive access for setup and inspection outside of a tick.
    #[inline]
    pub fn data_mut(&mut self) -> &mut ECSData {
        &mut self.data
    }

    /// Pending deferred commands.
    #[inline]
    pub fn commands(&self) -> &CommandBuffer {
        &self.commands
    }

    /// Unrestricted reference, for setup code and tests.
    pub fn world_ref(&self) -> ECSReference<'_> {
        ECSReference {
            data: &self.data,
            commands: &self.commands,
            tick: self.tick,
            system: None,
            min_batch_len: self.min_batch_len,
        }
    }

    pub(crate) fn system_ref<'a>(&'a self, system: SystemID, access: &'a AccessSets) -> ECSReference<'a> {
        ECSReference {
            data: &self.data,
            commands: &self.commands,
            tick: self.tick,
            system: Some((system, access)),
            min_batch_len: self.min_batch_len,
        }
    }

    pub(crate) fn begin_tick(&mut self) -> Tick {
        self.tick += 1;
        self.tick
    }

    /// Replays all deferred commands. This is the tick's synchronization point.
    pub fn apply_deferred_commands(&mut self) -> ECSResult<ReplayReport> {
        let commands = self.commands.drain(self.tick)?;
        if commands.is_empty() {
            return Ok(ReplayReport::default());
        }
        let report = self.data.apply(commands)?;
        debug!(
            tick = self.tick,
            spawned = report.spawned.len(),
            despawned = report.despawned.len(),
            ignored = report.ignored,
            "replayed deferred commands"
        );
        Ok(report)
    }

    /// Runs one tick of `scheduler`.
    pub fn run(&mut self, scheduler: &mut Scheduler) -> ECSResult<TickSummary> {
        scheduler.run(self)
    }
}

/// Handle given to running systems.
///
/// Column access goes through locks; structural change goes through
/// [`ECSReference::defer`].
#[derive(Clone, Copy)]
pub struct ECSReference<'a> {
    data: &'a ECSData,
    commands: &'a CommandBuffer,
    tick: Tick,
    system: Option<(SystemID, &'a AccessSets)>,
    min_batch_len: usize,
}

impl<'a> ECSReference<'a> {
    /// Starts a query.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Tick currently executing.
    #[inline]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Shared data view.
    #[inline]
    pub fn data(&self) -> &'a ECSData {
        self.data
    }

    /// Records a structural command for the next synchronization point.
    pub fn defer(&self, command: Command) -> ECSResult<()> {
        self.commands.push(command)
    }

    /// Number of records matching `query`.
    pub fn count(&self, query: &Query) -> ECSResult<usize> {
        self.check_access(query)?;
        Ok(self.data.count(query))
    }

    fn check_access(&self, query: &Query) -> ECSResult<()> {
        match self.system {
            Some((system, access)) if !access.covers(query.signature()) => {
                Err(ExecutionError::UndeclaredAccess { system }.into())
            }
            _ => Ok(()),
        }
    }

    /// Visits every matching record with two read-only components and one
    /// mutable component, in parallel.
    ///
    /// Returns the number of records visited.
    pub fn for_each_read2_write1<A, B, C, F>(&self, query: &Query, f: F) -> ECSResult<usize>
    where
        A: 'static + Send + Sync,
        B: 'static + Send + Sync,
        C: 'static + Send + Sync,
        F: Fn(&A, &B, &mut C) + Send + Sync,
    {
        self.check_access(query)?;
        let (&[a_id, b_id], &[c_id]) = (query.reads(), query.writes()) else {
            return Err(ExecutionError::QueryShape { expected: "two reads and one write" }.into());
        };
        if c_id == a_id || c_id == b_id {
            return Err(ExecutionError::QueryShape { expected: "disjoint read and write components" }.into());
        }

        let mut visited = 0;
        for archetype in self.data.matching_archetypes(query.signature()) {
            if archetype.is_empty() {
                continue;
            }
            let a_guard = archetype.read_column(a_id)?.ok_or(SpawnError::MissingComponent(a_id))?;
            let b_guard = archetype.read_column(b_id)?.ok_or(SpawnError::MissingComponent(b_id))?;
            let mut c_guard = archetype.write_column(c_id)?.ok_or(SpawnError::MissingComponent(c_id))?;

            let a = typed::<A>(&**a_guard, a_id)?.as_slice();
            let b = typed::<B>(&**b_guard, b_id)?.as_slice();
            let c = typed_mut::<C>(&mut **c_guard, c_id)?.as_mut_slice();

            visited += c.len();
            c.par_iter_mut()
                .zip(a.par_iter())
                .zip(b.par_iter())
                .with_min_len(self.min_batch_len)
                .for_each(|((c, a), b)| f(a, b, c));
        }
        Ok(visited)
    }

    /// Visits every matching record with one read-only and one mutable
    /// component, in parallel.
    pub fn for_each_read_write<A, C, F>(&self, query: &Query, f: F) -> ECSResult<usize>
    where
        A: 'static + Send + Sync,
        C: 'static + Send + Sync,
        F: Fn(&A, &mut C) + Send + Sync,
    {
        self.check_access(query)?;
        let (&[a_id], &[c_id]) = (query.reads(), query.writes()) else {
            return Err(ExecutionError::QueryShape { expected: "one read and one write" }.into());
        };
        if a_id == c_id {
            return Err(ExecutionError::QueryShape { expected: "disjoint read and write components" }.into());
        }

        let mut visited = 0;
        for archetype in self.data.matching_archetypes(query.signature()) {
            if archetype.is_empty() {
                continue;
            }
            let a_guard = archetype.read_column(a_id)?.ok_or(SpawnError::MissingComponent(a_id))?;
            let mut c_guard = archetype.write_column(c_id)?.ok_or(SpawnError::MissingComponent(c_id))?;
            let a = typed::<A>(&**a_guard, a_id)?.as_slice();
            let c = typed_mut::<C>(&mut **c_guard, c_id)?.as_mut_slice();

            visited += c.len();
            c.par_iter_mut()
                .zip(a.par_iter())
                .with_min_len(self.min_batch_len)
                .for_each(|(c, a)| f(a, c));
        }
        Ok(visited)
    }

    /// Visits every matching record serially, passing its handle and its
    /// first read component. Stops at the first error.
    pub fn for_each_entity_read<A, F>(&self, query: &Query, mut f: F) -> ECSResult<usize>
    where
        A: 'static + Send + Sync,
        F: FnMut(Entity, &A) -> ECSResult<()>,
    {
        self.check_access(query)?;
        let Some(&a_id) = query.reads().first() else {
            return Err(ExecutionError::QueryShape { expected: "at least one read" }.into());
        };

        let mut visited = 0;
        for archetype in self.data.matching_archetypes(query.signature()) {
            if archetype.is_empty() {
                continue;
            }
            let a_guard = archetype.read_column(a_id)?.ok_or(SpawnError::MissingComponent(a_id))?;
            let a = typed::<A>(&**a_guard, a_id)?.as_slice();
            for (&entity, value) in archetype.entities().iter().zip(a) {
                f(entity, value)?;
                visited += 1;
            }
        }
        Ok(visited)
    }
}
