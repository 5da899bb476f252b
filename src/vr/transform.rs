//! Rigid transforms (translation, rotation, scale) used for grip pose
//! composition.
//!
//! Composition follows parent-then-child order: `parent.compose(&child)`
//! maps a point through `child` first, then through `parent`.

use glam::{Quat, Vec3};

/// A scaled rigid transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Translation in world units.
    pub translation: Vec3,
    /// Orientation (unit quaternion).
    pub rotation: Quat,
    /// Per-axis scale.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        Self {
            translation,
            rotation: rotation.normalize(),
            scale: Vec3::ONE,
        }
    }

    /// Map a point from this transform's local space into its parent space.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.translation + self.rotation * (self.scale * point)
    }

    /// Compose with a child transform expressed in this transform's local space.
    pub fn compose(&self, child: &Transform) -> Transform {
        Transform {
            translation: self.transform_point(child.translation),
            rotation: (self.rotation * child.rotation).normalize(),
            scale: self.scale * child.scale,
        }
    }

    /// Inverse transform.  Exact for uniform scale; zero scale axes stay zero.
    pub fn inverse(&self) -> Transform {
        let inv_rotation = self.rotation.inverse();
        let inv_scale = Vec3::new(
            recip_or_zero(self.scale.x),
            recip_or_zero(self.scale.y),
            recip_or_zero(self.scale.z),
        );
        Transform {
            translation: -(inv_scale * (inv_rotation * self.translation)),
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }

    /// Whether translation, rotation and scale all match `other` within `tolerance`.
    pub fn approx_eq(&self, other: &Transform, tolerance: f32) -> bool {
        self.translation.abs_diff_eq(other.translation, tolerance)
            && self.scale.abs_diff_eq(other.scale, tolerance)
            // q and -q are the same rotation
            && self.rotation.dot(other.rotation).abs() >= 1.0 - tolerance
    }

    /// Generate s-expression for IPC.
    pub fn to_sexp(&self) -> String {
        let t = self.translation;
        let r = self.rotation;
        format!(
            "(:x {:.4} :y {:.4} :z {:.4} :qx {:.4} :qy {:.4} :qz {:.4} :qw {:.4})",
            t.x, t.y, t.z, r.x, r.y, r.z, r.w,
        )
    }
}

fn recip_or_zero(v: f32) -> f32 {
    if v.abs() <= f32::EPSILON {
        0.0
    } else {
        1.0 / v
    }
}

// ── Tests ──────────────────────────────────────────────────
