//! Query construction.
//!
//! A [`QueryBuilder`] collects read / write / without intents and produces an
//! immutable [`Query`]. Queries are matched against archetype signatures and
//! checked against the running system's declared [`AccessSets`] before any
//! column is touched.
//!
//! ```ignore
//! let query = world.query()
//!     .read::<ReferenceResolution>()?
//!     .read::<AxisBlendWeight>()?
//!     .write::<Transform>()?
//!     .build();
//! ```

use crate::engine::component::component_id_of;
use crate::engine::error::ECSResult;
use crate::engine::types::{AccessSets, ComponentID, QuerySignature};

/// Builder for component queries.
#[derive(Clone, Debug, Default)]
pub struct QueryBuilder {
    signature: QuerySignature,
    reads: Vec<ComponentID>,
    writes: Vec<ComponentID>,
}

impl QueryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a read-only dependency on component `T`.
    pub fn read<T: 'static + Send + Sync>(mut self) -> ECSResult<Self> {
        let component_id = component_id_of::<T>()?;
        self.signature.read.set(component_id);
        self.reads.push(component_id);
        Ok(self)
    }

    /// Declares a mutable dependency on component `T`.
    pub fn write<T: 'static + Send + Sync>(mut self) -> ECSResult<Self> {
        let component_id = component_id_of::<T>()?;
        self.signature.write.set(component_id);
        self.writes.push(component_id);
        Ok(self)
    }

    /// Excludes records carrying component `T`.
    pub fn without<T: 'static + Send + Sync>(mut self) -> ECSResult<Self> {
        self.signature.without.set(component_id_of::<T>()?);
        Ok(self)
    }

    /// Finalises the query.
    pub fn build(self) -> Query {
        Query {
            signature: self.signature,
            reads: self.reads,
            writes: self.writes,
        }
    }
}

/// An immutable, reusable query description.
#[derive(Clone, Debug)]
pub struct Query {
    signature: QuerySignature,
    reads: Vec<ComponentID>,
    writes: Vec<ComponentID>,
}

impl Query {
    /// Matching signature.
    #[inline]
    pub fn signature(&self) -> &QuerySignature {
        &self.signature
    }

    /// Components read, in declaration order.
    #[inline]
    pub fn reads(&self) -> &[ComponentID] {
        &self.reads
    }

    /// Components written, in declaration order.
    #[inline]
    pub fn writes(&self) -> &[ComponentID] {
        &self.writes
    }

    /// Access sets this query needs; used for scheduling and validation.
    pub fn access_sets(&self) -> AccessSets {
        AccessSets { read: self.signature.read, write: self.signature.write }
    }
}
