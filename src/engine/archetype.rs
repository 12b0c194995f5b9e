//! Archetype storage.
//!
//! An [`Archetype`] stores every record sharing one exact component
//! [`Signature`]: one locked column per component plus the row → record map.
//!
//! ## Invariants
//! - All columns hold exactly `entities.len()` rows.
//! - Row `i` of every column belongs to `entities[i]`.
//! - Structural operations (push, swap-remove, row moves) require `&mut self`
//!   and therefore never overlap parallel iteration, which only holds `&self`.

use std::collections::BTreeMap;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use crate::engine::component::{make_empty_column, Bundle};
use crate::engine::entity::Entity;
use crate::engine::error::{ECSError, ECSResult, SpawnError};
use crate::engine::storage::{LockedColumn, TypeErasedColumn};
use crate::engine::types::{ArchetypeID, ComponentID, Signature};

/// Outcome of removing a row by swap-remove.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapRemoved {
    /// Record that was moved into the vacated row, if any.
    pub moved: Option<Entity>,
}

/// Records sharing one component signature.
pub struct Archetype {
    archetype_id: ArchetypeID,
    signature: Signature,
    columns: BTreeMap<ComponentID, LockedColumn>,
    entities: Vec<Entity>,
}

impl Archetype {
    /// Creates an empty archetype with one column per component in `signature`.
    pub fn new(archetype_id: ArchetypeID, signature: Signature) -> ECSResult<Self> {
        let mut columns = BTreeMap::new();
        for component_id in signature.iterate_over_components() {
            columns.insert(component_id, LockedColumn::new(make_empty_column(component_id)?));
        }
        Ok(Self {
            archetype_id,
            signature,
            columns,
            entities: Vec::new(),
        })
    }

    /// Identifier of this archetype.
    #[inline]
    pub fn archetype_id(&self) -> ArchetypeID {
        self.archetype_id
    }

    /// Component signature of this archetype.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Returns `true` if the archetype stores `component_id`.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        self.signature.has(component_id)
    }

    /// Number of stored records.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the archetype stores no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Records in row order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Takes a shared lock on a column.
    pub fn read_column(&self, component_id: ComponentID) -> ECSResult<Option<RwLockReadGuard<'_, Box<dyn TypeErasedColumn>>>> {
        match self.columns.get(&component_id) {
            None => Ok(None),
            Some(column) => column
                .read()
                .map(Some)
                .map_err(|_| ECSError::LockPoisoned("component column")),
        }
    }

    /// Takes an exclusive lock on a column.
    pub fn write_column(&self, component_id: ComponentID) -> ECSResult<Option<RwLockWriteGuard<'_, Box<dyn TypeErasedColumn>>>> {
        match self.columns.get(&component_id) {
            None => Ok(None),
            Some(column) => column
                .write()
                .map(Some)
                .map_err(|_| ECSError::LockPoisoned("component column")),
        }
    }

    /// Exclusive access to a column without locking; needs `&mut self`.
    pub(crate) fn column_mut(&mut self, component_id: ComponentID) -> ECSResult<&mut Box<dyn TypeErasedColumn>> {
        self.columns
            .get_mut(&component_id)
            .ok_or(SpawnError::MissingComponent(component_id))?
            .get_mut()
            .map_err(|_| ECSError::LockPoisoned("component column"))
    }

    /// Appends a record whose values come from `bundle`.
    ///
    /// The bundle must hold exactly the components of this archetype. On a
    /// type mismatch the partially written row is rolled back.
    pub fn push_bundle(&mut self, entity: Entity, mut bundle: Bundle) -> ECSResult<usize> {
        let row = self.entities.len();
        let component_ids: Vec<ComponentID> = self.signature.iterate_over_components().collect();

        for (written, &component_id) in component_ids.iter().enumerate() {
            let pushed = match bundle.take(component_id) {
                Some(value) => self.column_mut(component_id)?.push_boxed(component_id, value).map_err(ECSError::from),
                None => Err(SpawnError::MissingComponent(component_id).into()),
            };
            if let Err(e) = pushed {
                for &undo in &component_ids[..written] {
                    self.column_mut(undo)?.swap_remove(row);
                }
                return Err(e);
            }
        }

        self.entities.push(entity);
        Ok(row)
    }

    /// Removes `row`, dropping its values.
    pub fn swap_remove(&mut self, row: usize) -> ECSResult<SwapRemoved> {
        let component_ids: Vec<ComponentID> = self.columns.keys().copied().collect();
        for component_id in component_ids {
            self.column_mut(component_id)?.swap_remove(row);
        }
        Ok(self.finish_swap_remove(row))
    }

    fn finish_swap_remove(&mut self, row: usize) -> SwapRemoved {
        self.entities.swap_remove(row);
        SwapRemoved { moved: self.entities.get(row).copied() }
    }

    /// Moves `row` into `destination`.
    ///
    /// Components shared by both archetypes are transferred, components only
    /// present in `self` are dropped and components only present in
    /// `destination` must be supplied by `extra`.
    pub fn move_row_to(
        &mut self,
        destination: &mut Archetype,
        row: usize,
        mut extra: Vec<(ComponentID, Box<dyn std::any::Any + Send>)>,
    ) -> ECSResult<(usize, SwapRemoved)> {
        let entity = *self.entities.get(row).ok_or(ECSError::StaleEntity)?;
        let destination_row = destination.entities.len();

        let destination_ids: Vec<ComponentID> = destination.columns.keys().copied().collect();
        for component_id in destination_ids {
            if let Some(index) = extra.iter().position(|(cid, _)| *cid == component_id) {
                let (_, value) = extra.swap_remove(index);
                destination.column_mut(component_id)?.push_boxed(component_id, value)?;
            } else if self.has(component_id) {
                let source = self.column_mut(component_id)?;
                let target = destination.column_mut(component_id)?;
                source.move_row_into(row, &mut **target)?;
            } else {
                return Err(SpawnError::MissingComponent(component_id).into());
            }
        }

        let source_only: Vec<ComponentID> = self
            .columns
            .keys()
            .copied()
            .filter(|cid| !destination.has(*cid))
            .collect();
        for component_id in source_only {
            self.column_mut(component_id)?.swap_remove(row);
        }

        destination.entities.push(entity);
        Ok((destination_row, self.finish_swap_remove(row)))
    }

    /// Verifies that every column holds one row per record.
    pub fn check_alignment(&self) -> ECSResult<()> {
        for column in self.columns.values() {
            let len = column.read().map_err(|_| ECSError::LockPoisoned("component column"))?.len();
            if len != self.entities.len() {
                return Err(SpawnError::MisalignedStorage { expected: self.entities.len(), found: len }.into());
            }
        }
        Ok(())
    }
}
