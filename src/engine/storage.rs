//! Column storage for component data.
//!
//! Each archetype owns one [`Column`] per component type. Columns are dense
//! `Vec<T>`s kept row-aligned with the archetype's record list; rows are
//! removed with swap-remove so iteration stays contiguous.
//!
//! [`TypeErasedColumn`] lets archetypes hold heterogeneous columns and move
//! rows between archetypes without knowing the element types.

use std::any::{Any, TypeId};
use std::sync::RwLock;

use crate::engine::error::SpawnError;
use crate::engine::types::ComponentID;

/// Dense storage for a single component type.
#[derive(Debug)]
pub struct Column<T> {
    values: Vec<T>,
}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<T> Column<T> {
    /// Returns all stored values.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    /// Returns all stored values mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Returns the value at `row`.
    #[inline]
    pub fn get(&self, row: usize) -> Option<&T> {
        self.values.get(row)
    }

    /// Returns the value at `row` mutably.
    #[inline]
    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        self.values.get_mut(row)
    }

    /// Appends a value.
    #[inline]
    pub fn push(&mut self, value: T) {
        self.values.push(value);
    }
}

/// Type-erased interface over [`Column`].
///
/// ## Invariants
/// Implementations must keep `len()` equal to the owning archetype's row
/// count after every structural operation.
pub trait TypeErasedColumn: Any + Send + Sync {
    /// Number of stored rows.
    fn len(&self) -> usize;

    /// Returns `true` if no rows are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type of this column.
    fn element_type(&self) -> TypeId;

    /// Appends a boxed value, checking its dynamic type.
    fn push_boxed(&mut self, component_id: ComponentID, value: Box<dyn Any + Send>) -> Result<(), SpawnError>;

    /// Overwrites the value at `row`, checking its dynamic type.
    fn replace_boxed(&mut self, row: usize, component_id: ComponentID, value: Box<dyn Any + Send>) -> Result<(), SpawnError>;

    /// Removes `row` by swapping the last row into its place; the value is dropped.
    fn swap_remove(&mut self, row: usize);

    /// Removes `row` by swap-remove and appends its value to `destination`.
    ///
    /// `destination` must hold the same element type.
    fn move_row_into(&mut self, row: usize, destination: &mut dyn TypeErasedColumn) -> Result<(), SpawnError>;

    /// Upcast for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static + Send + Sync> TypeErasedColumn for Column<T> {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn element_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn push_boxed(&mut self, component_id: ComponentID, value: Box<dyn Any + Send>) -> Result<(), SpawnError> {
        let actual = (*value).type_id();
        match value.downcast::<T>() {
            Ok(value) => {
                self.values.push(*value);
                Ok(())
            }
            Err(_) => Err(SpawnError::TypeMismatch {
                component_id,
                expected: TypeId::of::<T>(),
                actual,
            }),
        }
    }

    fn replace_boxed(&mut self, row: usize, component_id: ComponentID, value: Box<dyn Any + Send>) -> Result<(), SpawnError> {
        let actual = (*value).type_id();
        let value = value.downcast::<T>().map_err(|_| SpawnError::TypeMismatch {
            component_id,
            expected: TypeId::of::<T>(),
            actual,
        })?;
        let found = self.values.len();
        let slot = self
            .values
            .get_mut(row)
            .ok_or(SpawnError::MisalignedStorage { expected: row + 1, found })?;
        *slot = *value;
        Ok(())
    }

    fn swap_remove(&mut self, row: usize) {
        if row < self.values.len() {
            self.values.swap_remove(row);
        }
    }

    fn move_row_into(&mut self, row: usize, destination: &mut dyn TypeErasedColumn) -> Result<(), SpawnError> {
        let expected = destination.element_type();
        let Some(destination) = destination.as_any_mut().downcast_mut::<Column<T>>() else {
            return Err(SpawnError::TypeMismatch {
                component_id: ComponentID::MAX,
                expected,
                actual: TypeId::of::<T>(),
            });
        };
        if row >= self.values.len() {
            return Err(SpawnError::MisalignedStorage { expected: row + 1, found: self.values.len() });
        }
        let value = self.values.swap_remove(row);
        destination.values.push(value);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A column behind a reader/writer lock.
///
/// Parallel systems take read guards on columns they read and write guards on
/// columns they write; the scheduler guarantees no two systems in a stage
/// hold conflicting guards, so these locks never contend within a stage.
pub type LockedColumn = RwLock<Box<dyn TypeErasedColumn>>;
