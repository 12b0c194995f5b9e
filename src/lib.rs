//! # Canvas Scaler
//!
//! Viewport-driven rescaling of records on a parallel, archetype-based
//! record store.
//!
//! ## Design Goals
//! - Archetype-based storage for cache efficiency
//! - Deterministic, dependency-aware scheduling
//! - Parallel per-record computation with Rayon
//! - Structural changes deferred to one replay per tick
//! - Exactly-once consumption of change signals

#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;
pub mod scaling;
pub mod render_group;
pub mod config;
pub mod logging;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::manager::{
    ECSData,
    ECSManager,
    ECSReference,
};

pub use engine::entity::Entity;

pub use engine::component::{
    Bundle,
    register_component,
    freeze_components,
    component_id_of,
};

pub use engine::query::{Query, QueryBuilder};

pub use engine::systems::{FnSystem, System};
pub use engine::scheduler::{Scheduler, TickSummary};

pub use engine::commands::{Command, CommandBuffer, ReplayReport};

pub use engine::error::{
    ECSResult,
    ECSError,
    SpawnError,
    RegistryError,
    ExecutionError,
};

pub use engine::types::{
    AccessSets,
    ComponentID,
    Signature,
    SystemID,
    Tick,
};

pub use config::{ConfigError, LoggingConfig, PipelineConfig};
pub use logging::init_logging;
pub use render_group::{group_by_key, RenderGroupKey};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use canvas_scaler::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Bundle,
        Command,
        ECSManager,
        ECSReference,
        ECSResult,
        Entity,
        FnSystem,
        PipelineConfig,
        QueryBuilder,
        Scheduler,
        System,
        register_component,
        component_id_of,
    };
    pub use crate::scaling::{
        AxisBlendWeight,
        ManualViewport,
        ReferenceResolution,
        RescalePipeline,
        Transform,
        ViewportSource,
    };
}
