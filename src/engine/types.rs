//! Core identifiers, bit layouts and access declarations.
//!
//! These types are shared by every layer of the engine: the record allocator,
//! archetype storage, query matching and the scheduler.
//!
//! ## Record representation
//!
//! Records are encoded as a packed 64-bit integer:
//!
//! ```text
//! | version (32) | index (32) |
//! ```
//!
//! The version is bumped every time a slot is released so stale handles are
//! detected instead of aliasing a newer record.
//!
//! ## Signatures
//!
//! Component sets are fixed-size bitsets ([`Signature`]). They identify
//! archetypes, drive query matching through [`QuerySignature`] and let the
//! scheduler detect read/write conflicts through [`AccessSets`].

/// Packed record identifier.
pub type EntityID = u64;
/// Slot index within the record allocator.
pub type IndexID = u32;
/// Generation counter used to detect stale records.
pub type VersionID = u32;

/// Unique identifier for a system.
pub type SystemID = u16;
/// Scheduling tick counter.
pub type Tick = u64;

/// Number of bits reserved for the slot index.
pub const INDEX_BITS: u32 = 32;
/// Mask selecting the index portion of an [`EntityID`].
pub const INDEX_MASK: EntityID = (1 << INDEX_BITS) - 1;

/// Unique identifier for an archetype.
pub type ArchetypeID = u16;
/// Row index within an archetype.
pub type RowID = u32;

/// Unique identifier for a component type.
pub type ComponentID = u16;

/// Maximum number of registered component types.
pub const COMPONENT_CAP: usize = 256;
/// Number of `u64` words required to represent a full component signature.
pub const SIGNATURE_SIZE: usize = COMPONENT_CAP.div_ceil(64);

/// Bitset representing a set of components.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Packed component bitset.
    pub components: [u64; SIGNATURE_SIZE],
}

impl Signature {
    /// Sets the bit corresponding to `component_id`.
    #[inline]
    pub fn set(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] |= 1u64 << bits;
    }

    /// Clears the bit corresponding to `component_id`.
    #[inline]
    pub fn clear(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] &= !(1u64 << bits);
    }

    /// Returns `true` if `component_id` is present in this signature.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        (self.components[index] >> bits) & 1 == 1
    }

    /// Returns `true` if no component bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.iter().all(|&word| word == 0)
    }

    /// Returns `true` if all components in `signature` are present.
    #[inline]
    pub fn contains_all(&self, signature: &Signature) -> bool {
        self.components
            .iter()
            .zip(signature.components.iter())
            .all(|(a, b)| (a & b) == *b)
    }

    /// Returns `true` if the two signatures share at least one component.
    #[inline]
    pub fn intersects(&self, other: &Signature) -> bool {
        self.components
            .iter()
            .zip(other.components.iter())
            .any(|(a, b)| (a & b) != 0)
    }

    /// Iterates over all component IDs set in this signature.
    pub fn iterate_over_components(&self) -> impl Iterator<Item = ComponentID> + '_ {
        self.components
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let base = word_index * 64;
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some((base + tz) as ComponentID)
                })
            })
    }
}

/// Builds a component signature from a list of component IDs.
pub fn build_signature(component_ids: &[ComponentID]) -> Signature {
    let mut signature = Signature::default();
    for &component_id in component_ids {
        signature.set(component_id);
    }
    signature
}

/// Component signature used for query matching.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuerySignature {
    /// Components read by the query.
    pub read: Signature,

    /// Components written by the query.
    pub write: Signature,

    /// Components explicitly excluded from the query.
    pub without: Signature,
}

impl QuerySignature {
    /// Returns `true` if an archetype satisfies this query.
    pub fn requires_all(&self, archetype_signature: &Signature) -> bool {
        archetype_signature.contains_all(&self.read)
            && archetype_signature.contains_all(&self.write)
            && !archetype_signature.intersects(&self.without)
    }
}

/// Declares the component access set of a system.
#[derive(Clone, Debug, Default)]
pub struct AccessSets {
    /// Components read by the system.
    pub read: Signature,
    /// Components written by the system.
    pub write: Signature,
}

impl AccessSets {
    /// Returns `true` if this access set conflicts with another.
    #[inline]
    pub fn conflicts_with(&self, other: &AccessSets) -> bool {
        // W∩W, W∩R, R∩W
        self.write.intersects(&other.write)
            || self.write.intersects(&other.read)
            || self.read.intersects(&other.write)
    }

    /// Returns `true` if every component touched by `query` is covered by
    /// this access declaration.
    pub fn covers(&self, query: &QuerySignature) -> bool {
        let mut granted = self.read;
        for (word, write) in granted.components.iter_mut().zip(self.write.components.iter()) {
            *word |= write;
        }
        granted.contains_all(&query.read) && self.write.contains_all(&query.write)
    }
}
