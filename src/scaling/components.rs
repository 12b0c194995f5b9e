//! Components carried by scalable records and change signals.
//!
//! A record takes part in rescaling when it carries all of
//! [`ReferenceResolution`], [`AxisBlendWeight`] and [`Transform`]. Change
//! signals are records carrying [`ChangeSignal`] and [`RaisedAt`].

use glam::{Mat4, Quat, Vec3};

use crate::engine::component::register_component;
use crate::engine::error::ECSResult;
use crate::engine::types::Tick;
use crate::scaling::error::{ScalingError, ScalingResult};

/// Resolution a record was authored against. Immutable after creation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceResolution {
    width: f32,
    height: f32,
}

impl ReferenceResolution {
    /// Creates a reference resolution; both sides must be finite and positive.
    pub fn new(width: f32, height: f32) -> ScalingResult<Self> {
        let valid = |v: f32| v.is_finite() && v > 0.0;
        if !valid(width) || !valid(height) {
            return Err(ScalingError::InvalidReference { width, height });
        }
        Ok(Self { width, height })
    }

    /// Authored width.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// Authored height.
    #[inline]
    pub fn height(&self) -> f32 {
        self.height
    }
}

/// How much the vertical ratio dominates the blended scale.
///
/// `0.0` follows width only, `1.0` follows height only.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisBlendWeight(f32);

impl AxisBlendWeight {
    /// Creates a weight in `[0, 1]`.
    pub fn new(weight: f32) -> ScalingResult<Self> {
        if !(0.0..=1.0).contains(&weight) {
            return Err(ScalingError::InvalidWeight(weight));
        }
        Ok(Self(weight))
    }

    /// The weight value.
    #[inline]
    pub fn get(&self) -> f32 {
        self.0
    }
}

/// Local-to-world pose of a record. Written only by the rescale stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform(pub Mat4);

impl Default for Transform {
    fn default() -> Self {
        Self(Mat4::IDENTITY)
    }
}

impl Transform {
    /// Builds a transform from translation, rotation and uniform scale.
    pub fn from_parts(translation: Vec3, rotation: Quat, scale: f32) -> Self {
        Self(Mat4::from_scale_rotation_translation(Vec3::splat(scale), rotation, translation))
    }

    /// Rotation component.
    pub fn rotation(&self) -> Quat {
        let (_, rotation, _) = self.0.to_scale_rotation_translation();
        rotation
    }

    /// Translation component.
    pub fn translation(&self) -> Vec3 {
        self.0.w_axis.truncate()
    }

    /// Per-axis scale component.
    pub fn scale(&self) -> Vec3 {
        let (scale, _, _) = self.0.to_scale_rotation_translation();
        scale
    }
}

/// Marker for the transient record announcing that a rescale happened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeSignal;

/// Tick during which a change signal was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct RaisedAt(pub Tick);

/// Registers every component used by the pipeline. Idempotent.
pub fn register_scaling_components() -> ECSResult<()> {
    register_component::<ReferenceResolution>()?;
    register_component::<AxisBlendWeight>()?;
    register_component::<Transform>()?;
    register_component::<ChangeSignal>()?;
    register_component::<RaisedAt>()?;
    Ok(())
}
