//! # Component Registry
//!
//! Process-wide registry assigning stable [`ComponentID`]s to Rust component
//! types, plus the storage factories archetypes use to allocate columns.
//!
//! ## Design
//! - Components are registered once and assigned a compact id in `[0, COMPONENT_CAP)`.
//! - Registering an already-known type returns its existing id.
//! - The registry can be frozen to reject late registrations once the world is
//!   set up.
//!
//! ## Concurrency
//! The registry sits behind an `RwLock`: lookups take shared locks,
//! registrations take the exclusive lock.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::engine::error::{ECSError, ECSResult, RegistryError};
use crate::engine::storage::{Column, TypeErasedColumn};
use crate::engine::types::{ComponentID, Signature, COMPONENT_CAP};

type FactoryFn = fn() -> Box<dyn TypeErasedColumn>;

fn new_column<T: 'static + Send + Sync>() -> Box<dyn TypeErasedColumn> {
    Box::new(Column::<T>::default())
}

/// Metadata kept for every registered component.
#[derive(Copy, Clone, Debug)]
pub struct ComponentDesc {
    /// Runtime identifier assigned to this component type.
    pub component_id: ComponentID,
    /// Rust type name for diagnostics.
    pub name: &'static str,
    /// Runtime `TypeId` of the component.
    pub type_id: TypeId,
    factory: FactoryFn,
}

struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentID>,
    by_id: Vec<ComponentDesc>,
    frozen: bool,
}

impl ComponentRegistry {
    fn register<T: 'static + Send + Sync>(&mut self) -> Result<ComponentID, RegistryError> {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return Ok(existing);
        }
        if self.frozen {
            return Err(RegistryError::Frozen { name: type_name::<T>() });
        }
        if self.by_id.len() >= COMPONENT_CAP {
            return Err(RegistryError::CapacityExceeded { cap: COMPONENT_CAP });
        }

        let component_id = self.by_id.len() as ComponentID;
        self.by_type.insert(type_id, component_id);
        self.by_id.push(ComponentDesc {
            component_id,
            name: type_name::<T>(),
            type_id,
            factory: new_column::<T>,
        });
        Ok(component_id)
    }
}

static REGISTRY: OnceLock<RwLock<ComponentRegistry>> = OnceLock::new();

fn component_registry() -> &'static RwLock<ComponentRegistry> {
    REGISTRY.get_or_init(|| {
        RwLock::new(ComponentRegistry {
            by_type: HashMap::new(),
            by_id: Vec::new(),
            frozen: false,
        })
    })
}

/// Registers component type `T` and returns its `ComponentID`.
///
/// Idempotent: registering a known type returns the id it already has, even
/// after the registry is frozen.
pub fn register_component<T: 'static + Send + Sync>() -> ECSResult<ComponentID> {
    let mut registry = component_registry()
        .write()
        .map_err(|_| ECSError::LockPoisoned("component registry"))?;
    Ok(registry.register::<T>()?)
}

/// Freezes the registry; later registrations of new types fail.
pub fn freeze_components() -> ECSResult<()> {
    let mut registry = component_registry()
        .write()
        .map_err(|_| ECSError::LockPoisoned("component registry"))?;
    registry.frozen = true;
    Ok(())
}

/// Returns the registered `ComponentID` for type `T`.
pub fn component_id_of<T: 'static>() -> ECSResult<ComponentID> {
    let registry = component_registry()
        .read()
        .map_err(|_| ECSError::LockPoisoned("component registry"))?;
    registry
        .by_type
        .get(&TypeId::of::<T>())
        .copied()
        .ok_or_else(|| RegistryError::NotRegistered { name: type_name::<T>() }.into())
}

/// Returns a copy of the descriptor for `component_id`, if registered.
pub fn component_description(component_id: ComponentID) -> Option<ComponentDesc> {
    let registry = component_registry().read().ok()?;
    registry.by_id.get(component_id as usize).copied()
}

/// Creates an empty storage column for `component_id`.
pub fn make_empty_column(component_id: ComponentID) -> ECSResult<Box<dyn TypeErasedColumn>> {
    let registry = component_registry()
        .read()
        .map_err(|_| ECSError::LockPoisoned("component registry"))?;
    let desc = registry
        .by_id
        .get(component_id as usize)
        .ok_or(RegistryError::MissingFactory(component_id))?;
    Ok((desc.factory)())
}

/// Heterogeneous set of component values used to spawn a record.
///
/// Values are keyed by component id; inserting the same id twice keeps the
/// latest value.
#[derive(Default)]
pub struct Bundle {
    signature: Signature,
    values: Vec<(ComponentID, Box<dyn Any + Send>)>,
}

impl Bundle {
    /// Creates an empty bundle.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value under an explicit component id.
    pub fn insert<T: Any + Send>(&mut self, component_id: ComponentID, value: T) {
        self.values.retain(|(cid, _)| *cid != component_id);
        self.signature.set(component_id);
        self.values.push((component_id, Box::new(value)));
    }

    /// Inserts a registered component, resolving its id from the registry.
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> ECSResult<Self> {
        let component_id = component_id_of::<T>()?;
        self.insert(component_id, value);
        Ok(self)
    }

    /// Components present in this bundle.
    #[inline]
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Number of component values held.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the bundle holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Removes and returns the value for `component_id`, if present.
    pub fn take(&mut self, component_id: ComponentID) -> Option<Box<dyn Any + Send>> {
        let index = self.values.iter().position(|(cid, _)| *cid == component_id)?;
        self.signature.clear(component_id);
        let (_, value) = self.values.swap_remove(index);
        Some(value)
    }
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<ComponentID> = self.values.iter().map(|(cid, _)| *cid).collect();
        f.debug_struct("Bundle").field("components", &ids).finish()
    }
}
