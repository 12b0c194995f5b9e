//! Record handles and their allocator.
//!
//! An [`Entity`] packs a slot index and a version. Releasing a slot bumps its
//! version, so a handle to a destroyed record can never resolve to whatever
//! later reuses the slot. This is what makes "retire an already-retired
//! record" a detectable no-op instead of a use-after-free.

use crate::engine::error::SpawnError;
use crate::engine::types::{ArchetypeID, EntityID, IndexID, RowID, VersionID, INDEX_BITS, INDEX_MASK};

/// Opaque, generation-counted record handle.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Entity(pub EntityID);

impl Entity {
    #[inline]
    const fn from_parts(index: IndexID, version: VersionID) -> Self {
        Entity(((version as EntityID) << INDEX_BITS) | (index as EntityID))
    }

    /// Slot index of this handle.
    #[inline]
    pub fn index(self) -> IndexID {
        (self.0 & INDEX_MASK) as IndexID
    }

    /// Generation of this handle.
    #[inline]
    pub fn version(self) -> VersionID {
        (self.0 >> INDEX_BITS) as VersionID
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index(), self.version())
    }
}

/// Where a live record's row is stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityLocation {
    /// Archetype holding the record.
    pub archetype: ArchetypeID,
    /// Row inside that archetype.
    pub row: RowID,
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    version: VersionID,
    location: Option<EntityLocation>,
}

/// Allocator and location table for records.
#[derive(Debug, Default)]
pub struct Entities {
    slots: Vec<Slot>,
    free: Vec<IndexID>,
    live: usize,
}

impl Entities {
    /// Creates an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a handle placed at `location`.
    pub fn alloc(&mut self, location: EntityLocation) -> Result<Entity, SpawnError> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = IndexID::try_from(self.slots.len()).map_err(|_| SpawnError::Capacity)?;
                self.slots.push(Slot { version: 0, location: None });
                index
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.location = Some(location);
        self.live += 1;
        Ok(Entity::from_parts(index, slot.version))
    }

    /// Releases a handle. Returns `false` if it was already dead or stale.
    pub fn free(&mut self, entity: Entity) -> bool {
        match self.slots.get_mut(entity.index() as usize) {
            Some(slot) if slot.version == entity.version() && slot.location.is_some() => {
                slot.version = slot.version.wrapping_add(1);
                slot.location = None;
                self.free.push(entity.index());
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    /// Returns `true` if `entity` refers to a live record.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.location(entity).is_some()
    }

    /// Returns the storage location of a live record.
    pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
        let slot = self.slots.get(entity.index() as usize)?;
        if slot.version == entity.version() {
            slot.location
        } else {
            None
        }
    }

    /// Updates the location of a live record.
    pub fn set_location(&mut self, entity: Entity, location: EntityLocation) {
        debug_assert!(self.is_alive(entity), "set_location on dead record {entity}");
        if let Some(slot) = self.slots.get_mut(entity.index() as usize) {
            if slot.version == entity.version() {
                slot.location = Some(location);
            }
        }
    }

    /// Number of live records.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live
    }
}
