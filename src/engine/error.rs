//! Error types for record storage, deferred commands and scheduling.
//!
//! Low-level failures (registry misuse, storage type mismatches, stale
//! handles) are small dedicated enums. [`ECSError`] aggregates them so that
//! systems and the scheduler can bubble anything up with `?`.
//!
//! ## Fatal versus recoverable
//! * [`ExecutionError::OrderingViolation`] means the stage dependency contract
//!   was broken. It aborts the tick and is never swallowed.
//! * Despawning an already-absent record is *not* an error: replay counts it
//!   and moves on.

use std::any::TypeId;

use thiserror::Error;

use crate::engine::types::{ComponentID, SystemID, Tick};

/// Convenience alias used across the engine.
pub type ECSResult<T> = Result<T, ECSError>;

/// Failures raised by the process-wide component registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A registration was attempted after `freeze_components`.
    #[error("component registry is frozen; cannot register {name}")]
    Frozen {
        /// Rust type name of the rejected component.
        name: &'static str,
    },

    /// More than `COMPONENT_CAP` component types were registered.
    #[error("component capacity of {cap} exceeded")]
    CapacityExceeded {
        /// Configured capacity.
        cap: usize,
    },

    /// A component type was used before being registered.
    #[error("component not registered: {name}")]
    NotRegistered {
        /// Rust type name of the missing component.
        name: &'static str,
    },

    /// No storage factory exists for the given id.
    #[error("no storage factory for component id {0}")]
    MissingFactory(ComponentID),
}

/// Failures while materialising records and their component rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpawnError {
    /// A spawn bundle carried no components.
    #[error("cannot spawn a record with no components")]
    EmptyBundle,

    /// A value's dynamic type did not match the column it was written into.
    #[error("type mismatch for component {component_id}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        /// Component column being written.
        component_id: ComponentID,
        /// Column element type.
        expected: TypeId,
        /// Provided value type.
        actual: TypeId,
    },

    /// A component required by the destination archetype was not supplied.
    #[error("missing value for component {0}")]
    MissingComponent(ComponentID),

    /// Columns of an archetype disagreed on their row count.
    #[error("archetype columns misaligned: expected {expected} rows, found {found}")]
    MisalignedStorage {
        /// Row count tracked by the archetype.
        expected: usize,
        /// Row count reported by the column.
        found: usize,
    },

    /// The record allocator ran out of slots.
    #[error("record capacity exhausted")]
    Capacity,
}

/// Failures raised while building or running a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// A system declared a run-after edge to a system that was never added.
    #[error("system {system} depends on unknown system {dependency}")]
    UnknownDependency {
        /// System declaring the edge.
        system: SystemID,
        /// Missing predecessor.
        dependency: SystemID,
    },

    /// Run-after edges form a cycle.
    #[error("dependency cycle involving systems {0:?}")]
    DependencyCycle(Vec<SystemID>),

    /// Two systems were registered under the same id.
    #[error("duplicate system id {0}")]
    DuplicateSystem(SystemID),

    /// A query touched components outside the running system's declaration.
    #[error("system {system} accessed components outside its declared access sets")]
    UndeclaredAccess {
        /// Offending system.
        system: SystemID,
    },

    /// A query's read/write shape did not match the iteration helper used.
    #[error("query shape mismatch: expected {expected}")]
    QueryShape {
        /// Description of the expected shape.
        expected: &'static str,
    },

    /// The dedicated worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    /// A stage observed state it must not yet see, or commands were replayed
    /// while their producers were still running.
    #[error("ordering violation at tick {tick}: {detail}")]
    OrderingViolation {
        /// Tick during which the violation was detected.
        tick: Tick,
        /// Human-readable description.
        detail: String,
    },
}

/// Aggregate error for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ECSError {
    /// Component registry failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Record construction failure.
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// Scheduling or execution failure.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// A handle referred to a despawned record.
    #[error("stale or dead record reference")]
    StaleEntity,

    /// A lock guarding engine state was poisoned by a panicking thread.
    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// A system failed with a domain-specific reason.
    #[error("system {system} failed: {reason}")]
    SystemFailed {
        /// Failing system.
        system: SystemID,
        /// Failure description.
        reason: String,
    },
}

impl ECSError {
    /// Returns `true` if this error reports a broken stage ordering contract.
    pub fn is_ordering_violation(&self) -> bool {
        matches!(self, ECSError::Execution(ExecutionError::OrderingViolation { .. }))
    }
}
