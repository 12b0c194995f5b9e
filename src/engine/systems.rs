//! System abstractions.
//!
//! A **system** is a unit of logic run once per tick. Systems:
//! - declare which components they read and write ([`AccessSets`]),
//! - declare which systems must finish before they start ([`System::after`]),
//! - operate through an [`ECSReference`], never through exclusive world access.
//!
//! The scheduler derives stages from these declarations: systems with
//! non-conflicting access and no ordering edge between them share a stage
//! and run in parallel.
//!
//! Structural changes are never applied by a system directly; they are
//! recorded with [`ECSReference::defer`] and replayed after the last stage.

use crate::engine::error::ECSResult;
use crate::engine::manager::ECSReference;
use crate::engine::types::{AccessSets, SystemID};

/// A unit of executable logic operating on the record store.
pub trait System: Send + Sync {
    /// Stable identifier, also used to break scheduling ties.
    fn id(&self) -> SystemID;

    /// Human-readable name for logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Component access required by this system.
    fn access(&self) -> AccessSets;

    /// Systems that must complete before this one starts in the same tick.
    fn after(&self) -> Vec<SystemID> {
        Vec::new()
    }

    /// Executes the system.
    fn run(&self, world: ECSReference<'_>) -> ECSResult<()>;
}

/// A [`System`] backed by a closure.
pub struct FnSystem<F>
where
    F: Fn(ECSReference<'_>) -> ECSResult<()> + Send + Sync + 'static,
{
    id: SystemID,
    name: &'static str,
    access: AccessSets,
    after: Vec<SystemID>,
    f: F,
}

impl<F> FnSystem<F>
where
    F: Fn(ECSReference<'_>) -> ECSResult<()> + Send + Sync + 'static,
{
    /// Creates a new closure-backed system.
    pub fn new(id: SystemID, name: &'static str, access: AccessSets, f: F) -> Self {
        Self { id, name, access, after: Vec::new(), f }
    }

    /// Adds run-after edges.
    pub fn after(mut self, predecessors: &[SystemID]) -> Self {
        self.after.extend_from_slice(predecessors);
        self
    }
}

impl<F> System for FnSystem<F>
where
    F: Fn(ECSReference<'_>) -> ECSResult<()> + Send + Sync + 'static,
{
    fn id(&self) -> SystemID {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn access(&self) -> AccessSets {
        self.access.clone()
    }

    fn after(&self) -> Vec<SystemID> {
        self.after.clone()
    }

    fn run(&self, world: ECSReference<'_>) -> ECSResult<()> {
        (self.f)(world)
    }
}
