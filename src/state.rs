//! Grip tool state — the central struct driven once per tick.
//!
//! A single `GripState` owns the gesture recorder, the bound gesture
//! database, the gun tool, and the shoulder mount.  IPC handlers and the
//! driver loop get it as `&mut`.

use std::rc::Rc;

use glam::Vec3;
use tracing::{debug, info};

use crate::ipc::format_event;
use crate::vr::{
    FixedShoulderMount, GestureDatabase, GestureMatch, GestureRecorder, GunTools, PoseInput,
    SampleBuffer, ShoulderMount, Transform,
};

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct TickOutput {
    /// Gestures recognized this tick, in sample order.
    pub matches: Vec<GestureMatch>,
    /// World transform of the held tool.
    pub world_transform: Transform,
}

/// Central grip tool state.
pub struct GripState {
    /// Gesture recording and detection.
    pub recorder: GestureRecorder,
    /// Bound reference database.  `None` disables matching and saving.
    pub database: Option<GestureDatabase>,
    /// Held tool pose behavior.
    pub gun: GunTools,
    /// Tool world transform from the most recent tick.
    pub last_world_transform: Transform,
    /// Ticks processed.
    pub ticks: u64,
    /// Simulated time in seconds (sum of tick deltas).
    pub elapsed_s: f64,
    // Result of the last `end_recording`, dropped when a new session
    // begins or the buffer is cleared.
    last_recording: Option<SampleBuffer>,
    // Owning handle for the mount; the gun only keeps a weak reference.
    shoulder_mount: Option<Rc<dyn ShoulderMount>>,
    pending_events: Vec<String>,
}

impl Default for GripState {
    fn default() -> Self {
        Self::new()
    }
}

impl GripState {
    pub fn new() -> Self {
        Self {
            recorder: GestureRecorder::new(),
            database: Some(GestureDatabase::new()),
            gun: GunTools::default(),
            last_recording: None,
            last_world_transform: Transform::IDENTITY,
            ticks: 0,
            elapsed_s: 0.0,
            shoulder_mount: None,
            pending_events: Vec::new(),
        }
    }

    /// Advance every component by `delta_time_s`.
    ///
    /// `position` feeds the gesture recorder; `grip` is the parent
    /// transform of the held tool.
    pub fn tick(&mut self, delta_time_s: f32, position: Vec3, grip: Transform) -> TickOutput {
        self.ticks += 1;
        if delta_time_s > 0.0 {
            self.elapsed_s += delta_time_s as f64;
        }

        let matches = self
            .recorder
            .capture_frame(position, delta_time_s, self.database.as_ref());
        for m in &matches {
            let name = format!("\"{}\"", crate::ipc::escape_string(&m.name));
            let index = m.index.to_string();
            let distance = format!("{:.4}", m.distance);
            self.pending_events.push(format_event(
                "gesture-detected",
                &[("index", &index), ("name", &name), ("distance", &distance)],
            ));
        }

        let world = self.gun.world_transform(delta_time_s, &PoseInput::new(grip));
        self.last_world_transform = world;

        TickOutput {
            matches,
            world_transform: world,
        }
    }

    /// Start a recorder session.  Returns false if one is already active.
    pub fn begin_recording(
        &mut self,
        run_detection: bool,
        sampling_rate_hz: u32,
        buffer_capacity: usize,
        clamp_tolerance: f32,
        start_position: Vec3,
    ) -> bool {
        let started = self.recorder.begin_recording(
            run_detection,
            sampling_rate_hz,
            buffer_capacity,
            clamp_tolerance,
            start_position,
        );
        if started {
            self.last_recording = None;
        }
        started
    }

    /// Start a recorder session with the recorder's configured defaults.
    pub fn begin_with_defaults(&mut self, run_detection: bool, start_position: Vec3) -> bool {
        let started = self
            .recorder
            .begin_with_defaults(run_detection, start_position);
        if started {
            self.last_recording = None;
        }
        started
    }

    /// Drop the recorder's samples and any ended recording.
    pub fn clear_recording(&mut self) {
        self.recorder.clear_recording();
        self.last_recording = None;
    }

    /// End the active session, keeping the result for a later save.
    pub fn end_recording(&mut self) -> Option<&SampleBuffer> {
        let recording = self.recorder.end_recording()?;
        self.last_recording = Some(recording);
        self.last_recording.as_ref()
    }

    /// Save the last ended recording (or the live buffer if none) under
    /// `name`.  Returns the database index, or `None` when unbound.
    pub fn save_recording(&mut self, name: &str) -> Option<usize> {
        let mut recording = self
            .last_recording
            .take()
            .unwrap_or_else(|| self.recorder.recording().clone());
        let index =
            GestureRecorder::save_recording(&mut recording, name, self.database.as_mut());
        self.last_recording = Some(recording);
        if index.is_none() {
            debug!("Save of \"{}\" ignored: no gesture database bound", name);
        }
        index
    }

    /// Bind a fresh database if none is bound, and return it.
    pub fn database_or_bind(&mut self) -> &mut GestureDatabase {
        self.database.get_or_insert_with(|| {
            info!("Gesture database bound");
            GestureDatabase::new()
        })
    }

    pub fn unbind_database(&mut self) -> Option<GestureDatabase> {
        let db = self.database.take();
        if db.is_some() {
            info!("Gesture database unbound");
        }
        db
    }

    /// Place a fixed shoulder mount at `transform`, replacing any previous one.
    pub fn set_shoulder_mount(&mut self, transform: Transform) {
        let mount: Rc<dyn ShoulderMount> = Rc::new(FixedShoulderMount { transform });
        self.gun.set_shoulder_mount(Some(&mount));
        self.shoulder_mount = Some(mount);
    }

    /// Drop the owned mount.  The gun notices the dead handle on its next tick.
    pub fn clear_shoulder_mount(&mut self) {
        self.shoulder_mount = None;
    }

    pub fn has_shoulder_mount(&self) -> bool {
        self.shoulder_mount.is_some()
    }

    /// Take all queued event s-expressions.
    pub fn drain_events(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_events)
    }

    /// Generate s-expression for the bound database.
    pub fn database_sexp(&self) -> String {
        match &self.database {
            Some(db) => format!("(:bound t :count {})", db.len()),
            None => "(:bound nil :count 0)".to_string(),
        }
    }
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
fn line_state() -> GripState {
    let mut state = GripState::new();
    let mut line = SampleBuffer::from_samples(
        "line",
        [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 0.0),
        ],
    );
    line.minimum_length = 3;
    state.database_or_bind().add(line);
    state
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vr::GestureSessionState;

    const DT: f32 = 0.02;

    #[test]
    fn test_tick_detects_and_queues_event() {
        let mut state = line_state();
        assert!(state.begin_with_defaults(true, Vec3::ZERO));

        let mut found = Vec::new();
        for x in [1.0, 2.0, 3.0] {
            let out = state.tick(DT, Vec3::new(x, 0.0, 0.0), Transform::IDENTITY);
            found.extend(out.matches);
        }

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].index, 0);
        assert_eq!(found[0].name, "line");
        assert!(found[0].distance.abs() < 1e-6);

        let events = state.drain_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].starts_with("(:type :event :event :gesture-detected"));
        assert!(events[0].contains(":name \"line\""));
        assert!(state.drain_events().is_empty());
    }

    #[test]
    fn test_unbound_database_still_samples() {
        let mut state = line_state();
        state.unbind_database();
        state.begin_with_defaults(true, Vec3::ZERO);
        for x in [1.0, 2.0, 3.0] {
            let out = state.tick(DT, Vec3::new(x, 0.0, 0.0), Transform::IDENTITY);
            assert!(out.matches.is_empty());
        }
        assert_eq!(state.recorder.recording().len(), 3);
        assert_eq!(state.save_recording("lost"), None);
    }

    #[test]
    fn test_end_then_save() {
        let mut state = GripState::new();
        state.begin_with_defaults(false, Vec3::new(1.0, 1.0, 1.0));
        state.tick(DT, Vec3::new(1.5, 1.0, 1.0), Transform::IDENTITY);
        state.tick(DT, Vec3::new(2.0, 1.0, 1.0), Transform::IDENTITY);

        let ended = state.end_recording().map(|r| r.len());
        assert_eq!(ended, Some(2));
        assert_eq!(state.recorder.state(), GestureSessionState::Idle);
        assert!(state.end_recording().is_none());

        let index = state.save_recording("swipe");
        assert_eq!(index, Some(0));
        let db = state.database.as_ref().expect("database bound");
        assert_eq!(db.get(0).map(|g| g.name.as_str()), Some("swipe"));
        assert_eq!(db.get(0).and_then(|g| g.get(0)), Some(Vec3::new(0.5, 0.0, 0.0)));
    }

    #[test]
    fn test_save_after_restart_uses_new_samples() {
        let mut state = GripState::new();
        state.begin_with_defaults(false, Vec3::ZERO);
        state.tick(DT, Vec3::new(9.0, 0.0, 0.0), Transform::IDENTITY);
        assert_eq!(state.end_recording().map(|r| r.len()), Some(1));

        // Second session is saved while still running.
        assert!(state.begin_with_defaults(false, Vec3::ZERO));
        for x in [1.0, 2.0, 3.0, 4.0] {
            state.tick(DT, Vec3::new(x, 0.0, 0.0), Transform::IDENTITY);
        }
        assert_eq!(state.save_recording("fresh"), Some(0));

        let saved = state.database.as_ref().and_then(|db| db.get(0));
        assert_eq!(saved.map(|g| g.len()), Some(4));
        assert_eq!(saved.and_then(|g| g.get(0)), Some(Vec3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_clear_drops_ended_recording() {
        let mut state = GripState::new();
        state.begin_with_defaults(false, Vec3::ZERO);
        state.tick(DT, Vec3::X, Transform::IDENTITY);
        state.end_recording();

        state.clear_recording();
        assert!(state.recorder.recording().is_empty());
        assert_eq!(state.save_recording("blank"), Some(0));
        let saved = state.database.as_ref().and_then(|db| db.get(0));
        assert_eq!(saved.map(|g| g.len()), Some(0));
    }

    #[test]
    fn test_tick_reports_world_transform() {
        let mut state = GripState::new();
        state.gun.config.pivot_offset = Vec3::new(0.0, 0.1, 0.0);
        let out = state.tick(DT, Vec3::ZERO, Transform::from_translation(Vec3::X));
        assert!(out
            .world_transform
            .translation
            .abs_diff_eq(Vec3::new(1.0, 0.1, 0.0), 1e-6));
        assert_eq!(state.last_world_transform, out.world_transform);
        assert_eq!(state.ticks, 1);
    }

    #[test]
    fn test_clearing_mount_releases_gun() {
        let mut state = GripState::new();
        state.set_shoulder_mount(Transform::IDENTITY);
        let grip = Transform::from_translation(Vec3::new(0.1, 0.0, 0.0));
        state.tick(DT, Vec3::ZERO, grip);
        assert!(state.gun.is_shoulder_engaged());

        state.clear_shoulder_mount();
        let out = state.tick(DT, Vec3::ZERO, grip);
        assert!(!state.gun.is_shoulder_engaged());
        assert!(out.world_transform.approx_eq(&grip, 1e-6));
    }

    #[test]
    fn test_database_sexp() {
        let mut state = line_state();
        assert_eq!(state.database_sexp(), "(:bound t :count 1)");
        state.unbind_database();
        assert_eq!(state.database_sexp(), "(:bound nil :count 0)");
    }
}
