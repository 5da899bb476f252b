//! Two-handed "gun tool" grip behavior: pivot offset, recoil, and
//! shoulder-mount alignment.
//!
//! The world transform each tick is `parent ⊗ pivot ⊗ recoil`.  When a
//! shoulder mount is bound and engaged, the object is instead aimed from
//! the mount toward the grip, with the stock (relative transform or socket)
//! seated on the mount and recoil applied on top.

use std::rc::{Rc, Weak};

use glam::{Quat, Vec3};
use tracing::{debug, info};

use super::recoil::{RecoilBlender, RecoilConfig, RecoilOffset};
use super::transform::Transform;

// ── External lookups ───────────────────────────────────────

/// A scene object the tool can brace against.  Owned by the host.
pub trait ShoulderMount {
    /// World transform of the mount, or `None` if it cannot be resolved.
    fn world_transform(&self) -> Option<Transform>;
}

/// Socket resolution on the gripped object, provided by the host.
pub trait SocketLookup {
    /// Transform of `socket` relative to the gripped object's origin.
    fn socket_relative_transform(&self, socket: &str) -> Option<Transform>;
}

/// A mount at a fixed world transform.
#[derive(Debug, Clone, Copy)]
pub struct FixedShoulderMount {
    pub transform: Transform,
}

impl FixedShoulderMount {
    pub fn at(position: Vec3) -> Self {
        Self {
            transform: Transform::from_translation(position),
        }
    }
}

impl ShoulderMount for FixedShoulderMount {
    fn world_transform(&self) -> Option<Transform> {
        Some(self.transform)
    }
}

/// Per-tick pose inputs.
#[derive(Clone, Copy)]
pub struct PoseInput<'a> {
    /// World transform of the grip before tool adjustments.
    pub parent: Transform,
    /// Socket lookup for the shoulder socket override, if available.
    pub sockets: Option<&'a dyn SocketLookup>,
}

impl<'a> PoseInput<'a> {
    pub fn new(parent: Transform) -> Self {
        Self {
            parent,
            sockets: None,
        }
    }
}

// ── Config ─────────────────────────────────────────────────

/// Gun tool grip settings.
#[derive(Debug, Clone)]
pub struct GunToolsConfig {
    /// Offset applied to the pivot in the object's local space.
    pub pivot_offset: Vec3,
    /// Whether recoil impulses are accepted and applied.
    pub has_recoil: bool,
    /// Snap to the shoulder mount by distance instead of always.
    pub use_distance_based_shoulder_snapping: bool,
    /// Grip-to-mount distance below which the mount engages.
    pub shoulder_snap_distance: f32,
    /// Extra distance beyond the snap distance before the mount releases.
    pub shoulder_release_margin: f32,
    /// Stock transform on the object that is kept on the shoulder mount.
    pub shoulder_mount_relative_transform: Transform,
    /// Socket on the object used instead of the relative transform.
    pub shoulder_mount_socket_override: Option<String>,
}

impl Default for GunToolsConfig {
    fn default() -> Self {
        Self {
            pivot_offset: Vec3::ZERO,
            has_recoil: true,
            use_distance_based_shoulder_snapping: true,
            shoulder_snap_distance: 0.25,
            shoulder_release_margin: 0.0,
            shoulder_mount_relative_transform: Transform::IDENTITY,
            shoulder_mount_socket_override: None,
        }
    }
}

// ── GunTools ───────────────────────────────────────────────

/// Grip behavior state for one held tool.
pub struct GunTools {
    /// Configuration.
    pub config: GunToolsConfig,
    /// Recoil state.
    pub recoil: RecoilBlender,
    shoulder_mount: Option<Weak<dyn ShoulderMount>>,
    shoulder_engaged: bool,
}

impl std::fmt::Debug for GunTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GunTools")
            .field("config", &self.config)
            .field("recoil", &self.recoil)
            .field("shoulder_mount_bound", &self.has_shoulder_mount())
            .field("shoulder_engaged", &self.shoulder_engaged)
            .finish()
    }
}

impl Default for GunTools {
    fn default() -> Self {
        Self::new(GunToolsConfig::default(), RecoilConfig::default())
    }
}

impl GunTools {
    pub fn new(config: GunToolsConfig, recoil: RecoilConfig) -> Self {
        Self {
            config,
            recoil: RecoilBlender::new(recoil),
            shoulder_mount: None,
            shoulder_engaged: false,
        }
    }

    /// Bind (or unbind with `None`) the shoulder mount.  Only a weak
    /// reference is kept.
    pub fn set_shoulder_mount(&mut self, mount: Option<&Rc<dyn ShoulderMount>>) {
        self.shoulder_mount = mount.map(Rc::downgrade);
        self.shoulder_engaged = false;
        info!(
            "Gun tools: shoulder mount {}",
            if mount.is_some() { "bound" } else { "cleared" }
        );
    }

    /// Whether a mount is bound and still alive.
    pub fn has_shoulder_mount(&self) -> bool {
        self.shoulder_mount
            .as_ref()
            .map(|w| w.strong_count() > 0)
            .unwrap_or(false)
    }

    pub fn is_shoulder_engaged(&self) -> bool {
        self.shoulder_engaged
    }

    /// Add a recoil impulse.  Ignored when recoil is disabled.
    pub fn add_recoil_instance(&mut self, impulse: &RecoilOffset) {
        if self.config.has_recoil {
            self.recoil.add_recoil_instance(impulse);
        }
    }

    pub fn reset_recoil(&mut self) {
        self.recoil.reset_recoil();
    }

    /// Advance recoil by `delta_time_s` and compute the tool's world transform.
    pub fn world_transform(&mut self, delta_time_s: f32, input: &PoseInput<'_>) -> Transform {
        let recoil = if self.config.has_recoil {
            self.recoil.update(delta_time_s);
            self.recoil.current_transform()
        } else {
            Transform::IDENTITY
        };

        let mount = self
            .shoulder_mount
            .as_ref()
            .and_then(Weak::upgrade)
            .and_then(|m| m.world_transform());

        let Some(mount) = mount else {
            if self.shoulder_engaged {
                debug!("Gun tools: shoulder mount lost, releasing");
            }
            self.shoulder_engaged = false;
            return self.baseline(&input.parent).compose(&recoil);
        };

        let grip_location = input.parent.translation;
        self.update_engagement(grip_location.distance(mount.translation));
        if !self.shoulder_engaged {
            return self.baseline(&input.parent).compose(&recoil);
        }

        let stock = self.stock_transform(input);
        let aim = grip_location - mount.translation;
        let rotation = if aim.length_squared() > f32::EPSILON {
            Quat::from_rotation_arc(Vec3::X, aim.normalize())
        } else {
            input.parent.rotation
        };
        let shoulder_frame = Transform::from_rotation_translation(rotation, mount.translation);
        shoulder_frame.compose(&stock.inverse()).compose(&recoil)
    }

    fn baseline(&self, parent: &Transform) -> Transform {
        parent.compose(&Transform::from_translation(self.config.pivot_offset))
    }

    fn update_engagement(&mut self, distance: f32) {
        if !self.config.use_distance_based_shoulder_snapping {
            self.shoulder_engaged = true;
            return;
        }
        let snap = self.config.shoulder_snap_distance;
        let release = snap + self.config.shoulder_release_margin.max(0.0);
        let was = self.shoulder_engaged;
        if was && distance > release {
            self.shoulder_engaged = false;
        } else if !was && distance < snap {
            self.shoulder_engaged = true;
        }
        if was != self.shoulder_engaged {
            debug!(
                "Gun tools: shoulder {} at distance {:.3}",
                if self.shoulder_engaged { "snapped" } else { "released" },
                distance
            );
        }
    }

    fn stock_transform(&self, input: &PoseInput<'_>) -> Transform {
        self.config
            .shoulder_mount_socket_override
            .as_deref()
            .and_then(|socket| {
                input
                    .sockets
                    .and_then(|lookup| lookup.socket_relative_transform(socket))
            })
            .unwrap_or(self.config.shoulder_mount_relative_transform)
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:has-recoil {} :shoulder-mount {} :shoulder-engaged {} :recoil {})",
            if self.config.has_recoil { "t" } else { "nil" },
            if self.has_shoulder_mount() { "t" } else { "nil" },
            if self.shoulder_engaged { "t" } else { "nil" },
            self.recoil.status_sexp(),
        )
    }

    /// Generate s-expression for IPC config.
    pub fn config_sexp(&self) -> String {
        let p = self.config.pivot_offset;
        format!(
            "(:pivot (:x {:.4} :y {:.4} :z {:.4}) :has-recoil {} :distance-snapping {} :snap-distance {:.3} :release-margin {:.3} :socket-override {})",
            p.x,
            p.y,
            p.z,
            if self.config.has_recoil { "t" } else { "nil" },
            if self.config.use_distance_based_shoulder_snapping { "t" } else { "nil" },
            self.config.shoulder_snap_distance,
            self.config.shoulder_release_margin,
            self.config
                .shoulder_mount_socket_override
                .as_ref()
                .map(|s| format!("\"{}\"", s))
                .unwrap_or_else(|| "nil".to_string()),
        )
    }
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
fn mount_at(x: f32, y: f32, z: f32) -> Rc<dyn ShoulderMount> {
    Rc::new(FixedShoulderMount::at(Vec3::new(x, y, z)))
}

#[cfg(test)]
fn grip_at(x: f32, y: f32, z: f32) -> Transform {
    Transform::from_translation(Vec3::new(x, y, z))
}

// ── Tests ──────────────────────────────────────────────────
