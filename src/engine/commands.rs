//! # Commands
//!
//! Deferred structural mutations and the buffer that collects them.
//!
//! ## Purpose
//! Systems never create, destroy or reshape records while a stage is
//! running. They record a [`Command`] into the shared [`CommandBuffer`]
//! instead, and the manager replays the buffer serially once every producer
//! of the tick has finished.
//!
//! ## Invariants
//! - Commands are replayed in the order they were recorded.
//! - The buffer is replayed at most once per tick; replaying while a
//!   [`ProducerGuard`] is alive is an ordering violation.
//! - Targets of `Despawn`, `Add` and `Remove` may have vanished by replay
//!   time. Such commands are no-ops and are only counted.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::engine::component::Bundle;
use crate::engine::entity::Entity;
use crate::engine::error::{ECSError, ECSResult, ExecutionError};
use crate::engine::types::{ComponentID, Tick};

/// A deferred structural mutation.
pub enum Command {
    /// Creates a new record from a bundle of component values.
    Spawn {
        /// Component values of the new record.
        bundle: Bundle,
    },

    /// Destroys a record. A no-op if the record is already gone.
    Despawn {
        /// Record to destroy.
        entity: Entity,
    },

    /// Adds (or overwrites) a component on an existing record.
    Add {
        /// Target record.
        entity: Entity,
        /// Component to add.
        component_id: ComponentID,
        /// Value; must match the registered type of `component_id`.
        value: Box<dyn Any + Send>,
    },

    /// Removes a component from an existing record.
    ///
    /// Removing the last component destroys the record.
    Remove {
        /// Target record.
        entity: Entity,
        /// Component to remove.
        component_id: ComponentID,
    },
}

impl Command {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Spawn { .. } => "spawn",
            Command::Despawn { .. } => "despawn",
            Command::Add { .. } => "add",
            Command::Remove { .. } => "remove",
        }
    }

    /// Convenience constructor for [`Command::Add`].
    pub fn add<T: Any + Send>(entity: Entity, component_id: ComponentID, value: T) -> Self {
        Command::Add { entity, component_id, value: Box::new(value) }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Spawn { bundle } => f.debug_struct("Spawn").field("bundle", bundle).finish(),
            Command::Despawn { entity } => f.debug_struct("Despawn").field("entity", entity).finish(),
            Command::Add { entity, component_id, .. } => f
                .debug_struct("Add")
                .field("entity", entity)
                .field("component_id", component_id)
                .finish(),
            Command::Remove { entity, component_id } => f
                .debug_struct("Remove")
                .field("entity", entity)
                .field("component_id", component_id)
                .finish(),
        }
    }
}

/// What a replay did to the record store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Records created, in replay order.
    pub spawned: Vec<Entity>,
    /// Records destroyed, in replay order.
    pub despawned: Vec<Entity>,
    /// Components added to existing records.
    pub added: usize,
    /// Components removed from existing records.
    pub removed: usize,
    /// Commands whose target record no longer existed.
    pub ignored: usize,
}

impl ReplayReport {
    /// Total number of commands consumed.
    pub fn total(&self) -> usize {
        self.spawned.len() + self.despawned.len() + self.added + self.removed + self.ignored
    }
}

/// Thread-safe, append-only queue of deferred commands.
///
/// `push` may be called concurrently from any number of rayon workers.
/// Draining requires that no producer is still registered.
#[derive(Default)]
pub struct CommandBuffer {
    queue: Mutex<Vec<Command>>,
    producers: AtomicUsize,
}

impl CommandBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a command.
    pub fn push(&self, command: Command) -> ECSResult<()> {
        self.queue
            .lock()
            .map_err(|_| ECSError::LockPoisoned("command buffer"))?
            .push(command);
        Ok(())
    }

    /// Number of pending commands.
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no commands are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a running producer until the returned guard is dropped.
    pub fn producer(&self) -> ProducerGuard<'_> {
        self.producers.fetch_add(1, Ordering::AcqRel);
        ProducerGuard { buffer: self }
    }

    /// Number of producers currently registered.
    pub fn open_producers(&self) -> usize {
        self.producers.load(Ordering::Acquire)
    }

    /// Removes every pending command in enqueue order.
    ///
    /// Fails with an ordering violation if a producer is still running.
    pub fn drain(&self, tick: Tick) -> ECSResult<Vec<Command>> {
        let open = self.open_producers();
        if open != 0 {
            return Err(ExecutionError::OrderingViolation {
                tick,
                detail: format!("command replay requested while {open} producer(s) are still running"),
            }
            .into());
        }
        let mut queue = self.queue.lock().map_err(|_| ECSError::LockPoisoned("command buffer"))?;
        Ok(std::mem::take(&mut *queue))
    }

    /// Drops every pending command without applying it.
    ///
    /// A poisoned queue is recovered and cleared; abandoned commands never
    /// survive a discard.
    pub fn discard(&self) -> usize {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = queue.len();
        queue.clear();
        self.queue.clear_poison();
        dropped
    }
}

/// Marks a stage as an active producer for the lifetime of the guard.
pub struct ProducerGuard<'a> {
    buffer: &'a CommandBuffer,
}

impl Drop for ProducerGuard<'_> {
    fn drop(&mut self) {
        self.buffer.producers.fetch_sub(1, Ordering::AcqRel);
    }
}
