//! Change signal retirement.

use crate::engine::commands::Command;
use crate::engine::error::{ECSResult, ExecutionError};
use crate::engine::manager::ECSReference;
use crate::engine::query::{Query, QueryBuilder};
use crate::engine::systems::System;
use crate::engine::types::{AccessSets, SystemID};
use crate::scaling::components::{ChangeSignal, RaisedAt};
use crate::scaling::scale::ScaleComputer;

/// Defers the destruction of every live change signal, every tick.
///
/// Runs after [`ScaleComputer`], but since structural changes are replayed
/// at the end of the tick it only ever sees signals raised by earlier ticks.
/// Seeing one raised in the current tick is an ordering violation.
pub struct EventRetirer {
    query: Query,
}

impl EventRetirer {
    /// System id.
    pub const ID: SystemID = 3;

    /// Creates the stage. Scaling components must be registered.
    pub fn new() -> ECSResult<Self> {
        let query = QueryBuilder::new().read::<RaisedAt>()?.read::<ChangeSignal>()?.build();
        Ok(Self { query })
    }
}

impl System for EventRetirer {
    fn id(&self) -> SystemID {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "event_retirer"
    }

    fn access(&self) -> AccessSets {
        self.query.access_sets()
    }

    fn after(&self) -> Vec<SystemID> {
        vec![ScaleComputer::ID]
    }

    fn run(&self, world: ECSReference<'_>) -> ECSResult<()> {
        let tick = world.tick();
        world.for_each_entity_read::<RaisedAt, _>(&self.query, |entity, raised| {
            if raised.0 >= tick {
                return Err(ExecutionError::OrderingViolation {
                    tick,
                    detail: format!("change signal {entity} raised at tick {} visible to its own tick", raised.0),
                }
                .into());
            }
            world.defer(Command::Despawn { entity })
        })?;
        Ok(())
    }
}
