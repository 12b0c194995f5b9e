//! # Scaling Module
//!
//! Viewport-driven rescaling built on the engine:
//! - `ChangeDetector` polls the viewport and decides whether to rescale,
//! - `ScaleComputer` rewrites transforms in parallel and defers one change signal,
//! - `EventRetirer` defers the destruction of signals raised by earlier ticks.
//!
//! `RescalePipeline` wires the three stages together.

pub mod error;
pub mod components;
pub mod viewport;
pub mod scale;
pub mod retire;
pub mod signal;
pub mod pipeline;

pub use components::{register_scaling_components, AxisBlendWeight, ChangeSignal, RaisedAt, ReferenceResolution, Transform};
pub use error::{ScalingError, ScalingResult};
pub use pipeline::{RescalePipeline, TickReport};
pub use retire::EventRetirer;
pub use scale::{blended_scale, rescaled_transform, RescaleStats, ScaleComputer};
pub use signal::{LedgerDelta, SignalLedger, SignalLifecycle};
pub use viewport::{ChangeDetector, Detection, ManualViewport, RescaleTrigger, ViewportSize, ViewportSource, ViewportState, ViewportWatch};
