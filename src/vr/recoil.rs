//! Recoil accumulation, decay and blending for held tools.
//!
//! Impulses add into a saturating `target` offset.  Every tick the target
//! relaxes exponentially toward rest and the applied `current` offset
//! follows it.

use std::ops::{Add, Mul};

use glam::{EulerRot, Quat, Vec3};
use tracing::debug;

use super::transform::Transform;

// ── RecoilOffset ───────────────────────────────────────────

/// A recoil pose offset.
///
/// Rotation is stored as Euler angles in degrees (x = pitch, y = yaw,
/// z = roll) so per-axis limits can be applied exactly.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RecoilOffset {
    /// Translation offset in local units.
    pub translation: Vec3,
    /// Pitch/yaw/roll offset in degrees.
    pub rotation: Vec3,
}

impl RecoilOffset {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Vec3::ZERO,
    };

    pub fn new(translation: Vec3, rotation: Vec3) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Vec3::ZERO)
    }

    /// Clamp every axis into `[-limit, limit]`.
    pub fn clamp_abs(&self, limit: &RecoilOffset) -> Self {
        let t = limit.translation.abs();
        let r = limit.rotation.abs();
        Self {
            translation: self.translation.clamp(-t, t),
            rotation: self.rotation.clamp(-r, r),
        }
    }

    pub fn lerp(&self, other: &RecoilOffset, t: f32) -> Self {
        Self {
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.lerp(other.rotation, t),
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Equivalent local transform (yaw, then pitch, then roll).
    pub fn to_transform(&self) -> Transform {
        let r = self.rotation;
        let rotation = Quat::from_euler(
            EulerRot::YXZ,
            r.y.to_radians(),
            r.x.to_radians(),
            r.z.to_radians(),
        );
        Transform::from_rotation_translation(rotation, self.translation)
    }

    /// Generate s-expression for IPC.
    pub fn to_sexp(&self) -> String {
        let t = self.translation;
        let r = self.rotation;
        format!(
            "(:x {:.4} :y {:.4} :z {:.4} :pitch {:.3} :yaw {:.3} :roll {:.3})",
            t.x, t.y, t.z, r.x, r.y, r.z,
        )
    }
}

impl Add for RecoilOffset {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            translation: self.translation + rhs.translation,
            rotation: self.rotation + rhs.rotation,
        }
    }
}

impl Mul<f32> for RecoilOffset {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self {
            translation: self.translation * rhs,
            rotation: self.rotation * rhs,
        }
    }
}

// ── Config ─────────────────────────────────────────────────

/// Recoil limits and rates.
#[derive(Debug, Clone)]
pub struct RecoilConfig {
    /// Per-axis ceiling on the accumulated target (absolute values).
    pub max_recoil: RecoilOffset,
    /// Exponential decay rate of the target toward rest (1/s).
    pub decay_rate: f32,
    /// Rate at which the applied recoil follows the target (1/s); 0 snaps.
    pub lerp_rate: f32,
}

impl Default for RecoilConfig {
    fn default() -> Self {
        Self {
            max_recoil: RecoilOffset::new(Vec3::splat(10.0), Vec3::splat(30.0)),
            decay_rate: 8.0,
            lerp_rate: 0.0,
        }
    }
}

// ── Blender ────────────────────────────────────────────────

/// Current/target recoil pair advanced once per tick.
#[derive(Debug, Clone, Default)]
pub struct RecoilBlender {
    /// Configuration.
    pub config: RecoilConfig,
    current: RecoilOffset,
    target: RecoilOffset,
}

impl RecoilBlender {
    pub fn new(config: RecoilConfig) -> Self {
        Self {
            config,
            current: RecoilOffset::IDENTITY,
            target: RecoilOffset::IDENTITY,
        }
    }

    /// Offset currently applied to the pose.
    pub fn current(&self) -> RecoilOffset {
        self.current
    }

    /// Offset the applied recoil is moving toward.
    pub fn target(&self) -> RecoilOffset {
        self.target
    }

    /// Applied recoil as a local transform.
    pub fn current_transform(&self) -> Transform {
        self.current.to_transform()
    }

    /// Add an impulse to the target, saturating at `max_recoil`.
    pub fn add_recoil_instance(&mut self, impulse: &RecoilOffset) {
        self.target = (self.target + *impulse).clamp_abs(&self.config.max_recoil);
        debug!("Recoil impulse: target now {}", self.target.to_sexp());
    }

    /// Drop all recoil immediately.
    pub fn reset_recoil(&mut self) {
        self.current = RecoilOffset::IDENTITY;
        self.target = RecoilOffset::IDENTITY;
    }

    /// Decay the target and move the applied recoil toward it.
    pub fn update(&mut self, delta_time_s: f32) {
        if delta_time_s.is_nan() || delta_time_s <= 0.0 {
            return;
        }

        let decay = (-self.config.decay_rate.max(0.0) * delta_time_s).exp();
        self.target = self.target * decay;

        let alpha = if self.config.lerp_rate <= 0.0 {
            1.0
        } else {
            1.0 - (-self.config.lerp_rate * delta_time_s).exp()
        };
        self.current = self.current.lerp(&self.target, alpha);
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:current {} :target {} :decay-rate {:.3} :lerp-rate {:.3} :max {})",
            self.current.to_sexp(),
            self.target.to_sexp(),
            self.config.decay_rate,
            self.config.lerp_rate,
            self.config.max_recoil.to_sexp(),
        )
    }
}

// ── Tests ──────────────────────────────────────────────────
