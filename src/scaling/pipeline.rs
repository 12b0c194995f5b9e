//! The detect → rescale → retire pipeline.
//!
//! ```ignore
//! let viewport = Arc::new(ManualViewport::new(800, 600));
//! let mut pipeline = RescalePipeline::new(viewport.clone(), &PipelineConfig::default())?;
//! pipeline.spawn_scalable(reference, weight, Transform::default())?;
//!
//! viewport.set(1600, 600);
//! let report = pipeline.tick()?;
//! assert!(report.rescaled);
//! ```

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::engine::component::Bundle;
use crate::engine::entity::Entity;
use crate::engine::manager::{ECSData, ECSManager};
use crate::engine::query::{Query, QueryBuilder};
use crate::engine::scheduler::Scheduler;
use crate::engine::systems::System;
use crate::engine::types::{SystemID, Tick};
use crate::scaling::components::{
    register_scaling_components, AxisBlendWeight, ChangeSignal, ReferenceResolution, Transform,
};
use crate::scaling::error::ScalingResult;
use crate::scaling::retire::EventRetirer;
use crate::scaling::scale::{RescaleStats, ScaleComputer};
use crate::scaling::signal::SignalLedger;
use crate::scaling::viewport::{ChangeDetector, RescaleTrigger, ViewportSize, ViewportSource, ViewportWatch};

/// What one tick did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick that ran.
    pub tick: Tick,
    /// Whether the rescale stage ran.
    pub rescaled: bool,
    /// Viewport rescaled to, when `rescaled`.
    pub viewport: Option<ViewportSize>,
    /// Records whose transform was rewritten.
    pub records_rescaled: usize,
    /// Change signals that became live at this tick's replay.
    pub signals_raised: usize,
    /// Change signals destroyed at this tick's replay.
    pub signals_retired: usize,
    /// Replayed commands whose target was already gone.
    pub ignored: usize,
    /// Change signals live after the tick.
    pub live_signals: usize,
}

/// Owns the record store, the three stages and the signal ledger.
pub struct RescalePipeline {
    ecs: ECSManager,
    scheduler: Scheduler,
    ledger: SignalLedger,
    stats: Arc<RescaleStats>,
    viewport: ViewportWatch,
    signals: Query,
}

impl RescalePipeline {
    /// Builds the pipeline. The detector's state starts at `source`'s
    /// current reading.
    pub fn new(source: Arc<dyn ViewportSource>, config: &PipelineConfig) -> ScalingResult<Self> {
        config.validate()?;
        register_scaling_components()?;

        let trigger = Arc::new(RescaleTrigger::new());
        let stats = Arc::new(RescaleStats::default());
        let detector = ChangeDetector::new(source, Arc::clone(&trigger));
        let viewport = detector.watch();

        let mut scheduler = Scheduler::new().with_worker_threads(config.worker_threads)?;
        scheduler.add_system(detector);
        scheduler.add_system(ScaleComputer::new(trigger, Arc::clone(&stats))?);
        scheduler.add_system(EventRetirer::new()?);
        let plan = scheduler.stage_plan()?;
        let initial = viewport.last()?;

        info!(
            stages = plan.len(),
            worker_threads = config.worker_threads,
            min_batch_len = config.min_batch_len,
            viewport = ?initial,
            "rescale pipeline ready"
        );

        Ok(Self {
            ecs: ECSManager::default().with_min_batch_len(config.min_batch_len),
            scheduler,
            ledger: SignalLedger::new(),
            stats,
            viewport,
            signals: QueryBuilder::new().read::<ChangeSignal>()?.build(),
        })
    }

    /// Adds a system to run alongside the pipeline stages.
    pub fn add_system<S: System + 'static>(&mut self, system: S) {
        self.scheduler.add_system(system);
    }

    /// Stage plan as system ids.
    pub fn stage_plan(&mut self) -> ScalingResult<Vec<Vec<SystemID>>> {
        Ok(self.scheduler.stage_plan()?)
    }

    /// Creates a scalable record immediately. Only valid between ticks.
    pub fn spawn_scalable(
        &mut self,
        reference: ReferenceResolution,
        weight: AxisBlendWeight,
        transform: Transform,
    ) -> ScalingResult<Entity> {
        let bundle = Bundle::new().with(reference)?.with(weight)?.with(transform)?;
        Ok(self.ecs.data_mut().spawn(bundle)?)
    }

    /// Runs one tick and reconciles the signal ledger.
    ///
    /// If the tick is abandoned, the detected viewport change is rolled back
    /// so the next tick rescales and raises its signal again.
    pub fn tick(&mut self) -> ScalingResult<TickReport> {
        let runs_before = self.stats.runs();
        let summary = match self.ecs.run(&mut self.scheduler) {
            Ok(summary) => summary,
            Err(e) => {
                if let Some(dropped) = self.viewport.rollback()? {
                    warn!(viewport = %dropped, "rescale rolled back with abandoned tick");
                }
                return Err(e.into());
            }
        };
        self.viewport.commit()?;
        let rescaled = self.stats.runs() > runs_before;

        let live = self.ecs.data().entities_matching(&self.signals);
        let delta = self.ledger.reconcile(summary.tick, &live)?;

        Ok(TickReport {
            tick: summary.tick,
            rescaled,
            viewport: if rescaled { self.viewport.last()? } else { None },
            records_rescaled: if rescaled { self.stats.last_records() } else { 0 },
            signals_raised: delta.raised.len(),
            signals_retired: delta.retired.len(),
            ignored: summary.report.ignored,
            live_signals: live.len(),
        })
    }

    /// Last completed tick.
    pub fn current_tick(&self) -> Tick {
        self.ecs.tick()
    }

    /// Last viewport observed by the detector.
    pub fn viewport(&self) -> ScalingResult<Option<ViewportSize>> {
        Ok(self.viewport.last()?)
    }

    /// Change signals currently in the store.
    pub fn live_signals(&self) -> Vec<Entity> {
        self.ecs.data().entities_matching(&self.signals)
    }

    /// Signal lifecycle history.
    pub fn ledger(&self) -> &SignalLedger {
        &self.ledger
    }

    /// Read access to the record store.
    pub fn world(&self) -> &ECSData {
        self.ecs.data()
    }

    /// Exclusive access to the record store. Only valid between ticks.
    pub fn world_mut(&mut self) -> &mut ECSData {
        self.ecs.data_mut()
    }
}
