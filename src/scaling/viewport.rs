//! Viewport observation and change detection.
//!
//! The environment is polled once per tick through a [`ViewportSource`].
//! [`ChangeDetector`] compares the reading to its [`ViewportState`] and hands
//! its decision to the rescale stage through a shared [`RescaleTrigger`].
//!
//! A non-positive reading never reaches the rescale math: the detector logs
//! it, keeps the previous state and reports no trigger for the tick.
//!
//! A detected resize stays provisional until the tick's replay succeeds. The
//! owner of the schedule commits it through [`ViewportWatch::commit`], or
//! rolls it back after an abandoned tick so the next tick detects it again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::engine::error::{ECSError, ECSResult};
use crate::engine::manager::ECSReference;
use crate::engine::systems::System;
use crate::engine::types::{AccessSets, SystemID};
use crate::scaling::error::{ScalingError, ScalingResult};

/// Validated viewport dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewportSize {
    width: u32,
    height: u32,
}

impl ViewportSize {
    /// Validates raw environment dimensions.
    pub fn new(width: i32, height: i32) -> ScalingResult<Self> {
        match (u32::try_from(width), u32::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok(Self { width: w, height: h }),
            _ => Err(ScalingError::InvalidViewport { width, height }),
        }
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }
}

impl std::fmt::Display for ViewportSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Read-only getter for the current viewport dimensions.
pub trait ViewportSource: Send + Sync {
    /// Current `(width, height)`. May be non-positive, e.g. while minimized.
    fn dimensions(&self) -> (i32, i32);
}

/// A viewport source set by the host, e.g. from window resize events.
///
/// Both dimensions are stored in one atomic word so a reader never sees a
/// width from one resize paired with a height from another.
#[derive(Debug)]
pub struct ManualViewport {
    packed: AtomicU64,
}

impl ManualViewport {
    /// Creates a source reporting `(width, height)`.
    pub fn new(width: i32, height: i32) -> Self {
        Self { packed: AtomicU64::new(pack(width, height)) }
    }

    /// Replaces the reported dimensions.
    pub fn set(&self, width: i32, height: i32) {
        self.packed.store(pack(width, height), Ordering::Release);
    }
}

impl ViewportSource for ManualViewport {
    fn dimensions(&self) -> (i32, i32) {
        let packed = self.packed.load(Ordering::Acquire);
        ((packed >> 32) as u32 as i32, packed as u32 as i32)
    }
}

fn pack(width: i32, height: i32) -> u64 {
    ((width as u32 as u64) << 32) | height as u32 as u64
}

/// Result of comparing one reading against the last observed viewport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Detection {
    /// Same as last observed.
    Unchanged,
    /// Differs from the last committed observation; pending until commit.
    Resized(ViewportSize),
    /// Non-positive reading; state retained.
    Invalid {
        /// Reported width.
        width: i32,
        /// Reported height.
        height: i32,
    },
}

/// Last committed viewport plus the change detected this tick, if any.
/// `last` is `None` until a valid reading is committed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewportState {
    last: Option<ViewportSize>,
    pending: Option<ViewportSize>,
}

impl ViewportState {
    /// Starts from a known viewport.
    pub fn new(initial: Option<ViewportSize>) -> Self {
        Self { last: initial, pending: None }
    }

    /// Starts from the source's current reading; an invalid reading leaves
    /// the state unknown so the first valid reading triggers.
    pub fn from_source(source: &dyn ViewportSource) -> Self {
        let (width, height) = source.dimensions();
        Self::new(ViewportSize::new(width, height).ok())
    }

    /// Last committed viewport.
    #[inline]
    pub fn last(&self) -> Option<ViewportSize> {
        self.last
    }

    /// Change detected by the latest `observe` and not yet committed.
    #[inline]
    pub fn pending(&self) -> Option<ViewportSize> {
        self.pending
    }

    /// Compares a raw reading to the last committed viewport. A change is
    /// held as pending; it replaces any earlier uncommitted one.
    pub fn observe(&mut self, width: i32, height: i32) -> Detection {
        self.pending = None;
        let Ok(size) = ViewportSize::new(width, height) else {
            return Detection::Invalid { width, height };
        };
        if self.last == Some(size) {
            return Detection::Unchanged;
        }
        self.pending = Some(size);
        Detection::Resized(size)
    }

    /// Makes the pending change the committed viewport.
    pub fn commit(&mut self) -> Option<ViewportSize> {
        let committed = self.pending.take();
        if committed.is_some() {
            self.last = committed;
        }
        committed
    }

    /// Forgets the pending change so the next reading is compared against
    /// the committed viewport again.
    pub fn rollback(&mut self) -> Option<ViewportSize> {
        self.pending.take()
    }
}

/// Decision handed from the detector to the rescale stage for one tick.
///
/// Holds the new viewport when a rescale is due. The detector overwrites it
/// every tick; the rescale stage takes it, so it is consumed at most once.
#[derive(Debug, Default)]
pub struct RescaleTrigger {
    pending: Mutex<Option<ViewportSize>>,
}

impl RescaleTrigger {
    /// Creates an empty trigger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets this tick's decision.
    pub fn set(&self, decision: Option<ViewportSize>) -> ECSResult<()> {
        *self.pending.lock().map_err(|_| ECSError::LockPoisoned("rescale trigger"))? = decision;
        Ok(())
    }

    /// Takes this tick's decision, leaving no trigger behind.
    pub fn take(&self) -> ECSResult<Option<ViewportSize>> {
        Ok(self.pending.lock().map_err(|_| ECSError::LockPoisoned("rescale trigger"))?.take())
    }
}

/// Shared handle to a detector's [`ViewportState`].
#[derive(Clone, Debug)]
pub struct ViewportWatch(Arc<Mutex<ViewportState>>);

impl ViewportWatch {
    /// Last committed viewport.
    pub fn last(&self) -> ECSResult<Option<ViewportSize>> {
        Ok(self.lock()?.last())
    }

    /// Commits the change detected this tick. Call after a successful replay.
    pub fn commit(&self) -> ECSResult<Option<ViewportSize>> {
        Ok(self.lock()?.commit())
    }

    /// Drops the change detected this tick. Call after an abandoned tick.
    pub fn rollback(&self) -> ECSResult<Option<ViewportSize>> {
        Ok(self.lock()?.rollback())
    }

    fn lock(&self) -> ECSResult<std::sync::MutexGuard<'_, ViewportState>> {
        self.0.lock().map_err(|_| ECSError::LockPoisoned("viewport state"))
    }
}

/// Polls the environment and decides whether this tick rescales.
///
/// Whoever runs the schedule must commit or roll back the detection through
/// [`ChangeDetector::watch`] once the tick finishes; otherwise the same
/// change triggers again on every tick.
pub struct ChangeDetector {
    source: Arc<dyn ViewportSource>,
    state: Arc<Mutex<ViewportState>>,
    trigger: Arc<RescaleTrigger>,
}

impl ChangeDetector {
    /// System id.
    pub const ID: SystemID = 1;

    /// Creates a detector whose state starts at the source's current reading.
    pub fn new(source: Arc<dyn ViewportSource>, trigger: Arc<RescaleTrigger>) -> Self {
        let state = ViewportState::from_source(source.as_ref());
        Self {
            source,
            state: Arc::new(Mutex::new(state)),
            trigger,
        }
    }

    /// Read-only handle to the detector's state.
    pub fn watch(&self) -> ViewportWatch {
        ViewportWatch(Arc::clone(&self.state))
    }
}

impl System for ChangeDetector {
    fn id(&self) -> SystemID {
        Self::ID
    }

    fn name(&self) -> &'static str {
        "change_detector"
    }

    fn access(&self) -> AccessSets {
        AccessSets::default()
    }

    fn run(&self, world: ECSReference<'_>) -> ECSResult<()> {
        let (width, height) = self.source.dimensions();
        let detection = self
            .state
            .lock()
            .map_err(|_| ECSError::LockPoisoned("viewport state"))?
            .observe(width, height);

        match detection {
            Detection::Resized(size) => {
                info!(tick = world.tick(), viewport = %size, "viewport changed");
                self.trigger.set(Some(size))
            }
            Detection::Unchanged => self.trigger.set(None),
            Detection::Invalid { width, height } => {
                warn!(tick = world.tick(), width, height, "ignoring non-positive viewport reading");
                self.trigger.set(None)
            }
        }
    }
}
