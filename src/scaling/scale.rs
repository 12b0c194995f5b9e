//! Scale computation.
//!
//! The blended scale interpolates the horizontal and vertical resize ratios
//! in the log domain and maps the result back with `exp2`, which makes the
//! blend geometric and symmetric in the two axes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::Vec3;
use tracing::debug;

use crate::engine::commands::Command;
use crate::engine::component::Bundle;
use crate::engine::error::ECSResult;
use crate::engine::manager::ECSReference;
use crate::engine::query::{Query, QueryBuilder};
use crate::engine::systems::System;
use crate::engine::types::{AccessSets, SystemID};
use crate::scaling::components::{AxisBlendWeight, ChangeSignal, RaisedAt, ReferenceResolution, Transform};
use crate::scaling::viewport::{ChangeDetector, RescaleTrigger, ViewportSize};

/// `2 ^ lerp(log2(vw / rw), log2(vh / rh), weight)`.
pub fn blended_scale(reference: &ReferenceResolution, weight: AxisBlendWeight, viewport: ViewportSize) -> f32 {
    let log_width = (viewport.width() as f32 / reference.width()).log2();
    let log_height = (viewport.height() as f32 / reference.height()).log2();
    let blended = log_width + (log_height - log_width) * weight.get();
    blended.exp2()
}

/// Re-centers `current` on the viewport and replaces its scale, keeping its
/// rotation.
///
/// The center uses integer halves of the viewport dimensions.
pub fn rescaled_transform(
    current: &Transform,
    reference: &ReferenceResolution,
    weight: AxisBlendWeight,
    viewport: ViewportSize,
) -> Transform {
    let center = Vec3::new((viewport.width() / 2) as f32, (viewport.height() / 2) as f32, 0.0);
    Transform::from_parts(center, current.rotation(), blended_scale(reference, weight, viewport))
}

/// Counters published by [`ScaleComputer`].
#[derive(Debug, Default)]
pub struct RescaleStats {
    runs: AtomicUsize,
    last_records: AtomicUsize,
}

impl RescaleStats {
    /// Number of triggered runs so far.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::Acquire)
    }

    /// Records updated by the most recent triggered run.
    pub fn last_records(&self) -> usize {
        self.last_records.load(Ordering::Acquire)
    }

    fn record(&self, records: usize) {
        self.last_records.store(records, Ordering::Release);
        self.runs.fetch_add(1, Ordering::AcqRel);
    }
}

/// Rewrites the transform of every scalable record when triggered, then
/// defers the creation of one change signal.
pub struct ScaleComputer {
    trigger: Arc<RescaleTrigger>,
    stats: Arc<RescaleStats>,
    query: Query,
}

impl ScaleComputer {
    /// System id.
    pub const ID: SystemID = 2;

    /// Creates the stage. Scaling components must be registered.
    pub fn new(trigger: Arc<RescaleTrigger>, stats: Arc<RescaleStats>) -> ECSResult<Self> {
        let query = QueryBuilder::new()
            .read::<ReferenceResolution>()?
            .read::<AxisBlendWeight>()?
            .write::<Transform>()?
            .build();
        Ok(Self { trigger, stats, query })
    }
}

impl System for ScaleComputer {
    fn id(&self) -> SystemID {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "scale_computer"
    }

    fn access(&self) -> AccessSets {
        self.query.access_sets()
    }

    fn after(&self) -> Vec<SystemID> {
        vec![ChangeDetector::ID]
    }

    fn run(&self, world: ECSReference<'_>) -> ECSResult<()> {
        let Some(viewport) = self.trigger.take()? else {
            return Ok(());
        };

        let records = world.for_each_read2_write1::<ReferenceResolution, AxisBlendWeight, Transform, _>(
            &self.query,
            |reference, weight, transform| {
                *transform = rescaled_transform(transform, reference, *weight, viewport);
            },
        )?;

        let signal = Bundle::new().with(ChangeSignal)?.with(RaisedAt(world.tick()))?;
        world.defer(Command::Spawn { bundle: signal })?;

        self.stats.record(records);
        debug!(tick = world.tick(), viewport = %viewport, records, "rescaled records");
        Ok(())
    }
}
