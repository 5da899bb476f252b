//! Gesture recording and continuous detection.
//!
//! Samples a tracked position at a fixed rate into a ring buffer, skipping
//! samples that have not moved beyond a tolerance.  In detecting mode the
//! buffer is matched against the gesture database after every appended
//! sample, and matches are pushed to registered listeners and the hook.

use glam::Vec3;
use tracing::{debug, info, warn};

use super::dtw::{GestureMatch, GestureMatcher, MatcherConfig};
use super::gesture_db::GestureDatabase;
use super::sample_buffer::SampleBuffer;

// ── State ──────────────────────────────────────────────────

/// Externally visible recorder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureSessionState {
    Idle,
    Recording,
    Detecting,
}

impl GestureSessionState {
    /// String representation for IPC.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Detecting => "detecting",
        }
    }
}

/// What an active session does with its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Collect samples only.
    Recording,
    /// Collect samples and match after every append.
    Detecting,
}

/// Per-session sampling parameters and timers.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub mode: SessionMode,
    /// Sampling frequency (Hz, at least 1).
    pub sampling_rate_hz: u32,
    /// Minimum displacement (units) for a new sample to be kept.
    pub clamp_tolerance: f32,
    /// World position at session start; samples are stored relative to it.
    pub start: Vec3,
    /// Time accumulated toward the next sample (seconds).
    elapsed_s: f32,
}

impl ActiveSession {
    fn interval_s(&self) -> f32 {
        1.0 / self.sampling_rate_hz as f32
    }
}

#[derive(Debug, Clone)]
enum RecorderState {
    Idle,
    Active(ActiveSession),
}

// ── Config ─────────────────────────────────────────────────

/// Default sampling parameters for `begin_recording`.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Sampling frequency in Hz.
    pub sampling_rate_hz: u32,
    /// Number of samples kept during a session.
    pub buffer_capacity: usize,
    /// Displacement (units) below which a sample is treated as a duplicate.
    pub clamp_tolerance: f32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: 60,
            buffer_capacity: 120,
            clamp_tolerance: 0.01,
        }
    }
}

// ── Notification ───────────────────────────────────────────

/// Handle returned by [`GestureRecorder::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback invoked synchronously for every detected gesture.
pub type GestureListener = Box<dyn FnMut(&GestureMatch, &GestureDatabase)>;

/// Per-recorder detection hook.  Override `on_gesture_detected` to react
/// to matches without registering a listener.
pub trait GestureHook {
    fn on_gesture_detected(&mut self, detected: &GestureMatch, database: &GestureDatabase) {
        let _ = (detected, database);
    }
}

// ── Recorder ───────────────────────────────────────────────

/// Tick-driven gesture recorder.
pub struct GestureRecorder {
    /// Defaults used by IPC-initiated sessions.
    pub config: RecorderConfig,
    /// Recognition engine used in detecting mode.
    pub matcher: GestureMatcher,
    state: RecorderState,
    log: SampleBuffer,
    listeners: Vec<(ListenerId, GestureListener)>,
    next_listener_id: u64,
    hook: Option<Box<dyn GestureHook>>,
    /// Most recent match, for status reporting.
    last_match: Option<GestureMatch>,
}

impl std::fmt::Debug for GestureRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GestureRecorder")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("samples", &self.log.len())
            .field("listeners", &self.listeners.len())
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl Default for GestureRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl GestureRecorder {
    /// Create an idle recorder with default configuration.
    pub fn new() -> Self {
        Self::with_config(RecorderConfig::default(), MatcherConfig::default())
    }

    pub fn with_config(config: RecorderConfig, matcher: MatcherConfig) -> Self {
        let log = SampleBuffer::with_capacity(config.buffer_capacity);
        Self {
            config,
            matcher: GestureMatcher::new(matcher),
            state: RecorderState::Idle,
            log,
            listeners: Vec::new(),
            next_listener_id: 1,
            hook: None,
            last_match: None,
        }
    }

    pub fn state(&self) -> GestureSessionState {
        match &self.state {
            RecorderState::Idle => GestureSessionState::Idle,
            RecorderState::Active(s) => match s.mode {
                SessionMode::Recording => GestureSessionState::Recording,
                SessionMode::Detecting => GestureSessionState::Detecting,
            },
        }
    }

    /// Active session parameters, if any.
    pub fn session(&self) -> Option<&ActiveSession> {
        match &self.state {
            RecorderState::Idle => None,
            RecorderState::Active(s) => Some(s),
        }
    }

    /// Samples collected so far.
    pub fn recording(&self) -> &SampleBuffer {
        &self.log
    }

    pub fn last_match(&self) -> Option<&GestureMatch> {
        self.last_match.as_ref()
    }

    /// Start a session from `start_position`.
    ///
    /// Returns false (and changes nothing) if a session is already active;
    /// switching between recording and detecting requires ending first.
    pub fn begin_recording(
        &mut self,
        run_detection: bool,
        sampling_rate_hz: u32,
        buffer_capacity: usize,
        clamp_tolerance: f32,
        start_position: Vec3,
    ) -> bool {
        if let RecorderState::Active(s) = &self.state {
            warn!(
                "Gesture recorder: begin ignored, session already {:?}",
                s.mode
            );
            return false;
        }

        if sampling_rate_hz == 0 || buffer_capacity == 0 || clamp_tolerance < 0.0 {
            warn!(
                "Gesture recorder: clamping rate={} capacity={} tolerance={}",
                sampling_rate_hz, buffer_capacity, clamp_tolerance
            );
        }

        let mode = if run_detection {
            SessionMode::Detecting
        } else {
            SessionMode::Recording
        };
        self.log.reset(Some(buffer_capacity.max(1)));
        self.last_match = None;
        self.state = RecorderState::Active(ActiveSession {
            mode,
            sampling_rate_hz: sampling_rate_hz.max(1),
            clamp_tolerance: clamp_tolerance.max(0.0),
            start: start_position,
            elapsed_s: 0.0,
        });
        info!(
            "Gesture recorder: {:?} at {} Hz, buffer {}",
            mode,
            sampling_rate_hz.max(1),
            buffer_capacity.max(1)
        );
        true
    }

    /// Start a session using the configured defaults.
    pub fn begin_with_defaults(&mut self, run_detection: bool, start_position: Vec3) -> bool {
        let RecorderConfig {
            sampling_rate_hz,
            buffer_capacity,
            clamp_tolerance,
        } = self.config;
        self.begin_recording(
            run_detection,
            sampling_rate_hz,
            buffer_capacity,
            clamp_tolerance,
            start_position,
        )
    }

    /// Advance the sampling clock by `delta_time_s` and sample `position`.
    ///
    /// Returns the matches produced this frame (detecting mode only).  With
    /// no database bound, sampling proceeds and matching is skipped.
    pub fn capture_frame(
        &mut self,
        position: Vec3,
        delta_time_s: f32,
        database: Option<&GestureDatabase>,
    ) -> Vec<GestureMatch> {
        let mut matches = Vec::new();

        let RecorderState::Active(session) = &mut self.state else {
            return matches;
        };
        if !delta_time_s.is_finite() || delta_time_s <= 0.0 {
            debug!("Gesture recorder: ignoring frame with dt={}", delta_time_s);
            return matches;
        }

        session.elapsed_s += delta_time_s;
        let interval = session.interval_s();
        if session.elapsed_s < interval {
            return matches;
        }
        // Every interval due this frame would sample the same position, and
        // all but the first would be deduplicated, so take one sample.
        session.elapsed_s %= interval;

        let sample = position - session.start;
        let reference = self.log.last().unwrap_or(Vec3::ZERO);
        if sample.distance(reference) <= session.clamp_tolerance {
            return matches;
        }
        let mode = session.mode;

        self.log.push(sample);
        debug!(
            "Gesture sample {}: ({:.3}, {:.3}, {:.3})",
            self.log.len(),
            sample.x,
            sample.y,
            sample.z
        );

        if mode == SessionMode::Detecting {
            if let Some(db) = database {
                if let Some(found) = self.matcher.recognize(&self.log, db) {
                    self.notify(&found, db);
                    matches.push(found);
                }
            }
        }

        matches
    }

    /// Stop the session and return a copy of the recorded samples.
    ///
    /// The buffer is kept so it can still be saved.  No-op while idle.
    pub fn end_recording(&mut self) -> Option<SampleBuffer> {
        if matches!(self.state, RecorderState::Idle) {
            debug!("Gesture recorder: end ignored while idle");
            return None;
        }
        self.state = RecorderState::Idle;
        info!("Gesture recorder: ended with {} samples", self.log.len());
        Some(self.log.clone())
    }

    /// Drop all samples without changing state.
    pub fn clear_recording(&mut self) {
        self.log.clear();
    }

    /// Name `recording` and append it to `database`.
    ///
    /// Returns the new index, or `None` if no database is bound.
    pub fn save_recording(
        recording: &mut SampleBuffer,
        name: &str,
        database: Option<&mut GestureDatabase>,
    ) -> Option<usize> {
        let db = database?;
        recording.name = name.to_string();
        Some(db.add(recording.clone()))
    }

    // ── Listeners ─────────────────────────────────────────

    /// Register a detection callback.
    pub fn add_listener(&mut self, listener: GestureListener) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Unregister a callback.  Returns true if it was registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() < before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn set_hook(&mut self, hook: Box<dyn GestureHook>) {
        self.hook = Some(hook);
    }

    fn notify(&mut self, detected: &GestureMatch, database: &GestureDatabase) {
        if let Some(hook) = self.hook.as_mut() {
            hook.on_gesture_detected(detected, database);
        }
        for (_, listener) in self.listeners.iter_mut() {
            listener(detected, database);
        }
        self.last_match = Some(detected.clone());
    }

    // ── IPC ───────────────────────────────────────────────

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        let (rate, tolerance) = match self.session() {
            Some(s) => (s.sampling_rate_hz, s.clamp_tolerance),
            None => (self.config.sampling_rate_hz, self.config.clamp_tolerance),
        };
        let last = self
            .last_match
            .as_ref()
            .map(|m| m.to_sexp())
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:state :{} :samples {} :capacity {} :rate-hz {} :tolerance {:.3} :listeners {} :last-match {})",
            self.state().as_str(),
            self.log.len(),
            self.log.capacity().unwrap_or(0),
            rate,
            tolerance,
            self.listeners.len(),
            last,
        )
    }

    /// Generate s-expression for IPC config.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:rate-hz {} :capacity {} :tolerance {:.3} :matcher {})",
            self.config.sampling_rate_hz,
            self.config.buffer_capacity,
            self.config.clamp_tolerance,
            self.matcher.config_sexp(),
        )
    }
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
fn line_database() -> GestureDatabase {
    let mut db = GestureDatabase::new();
    db.add(SampleBuffer::from_samples(
        "line",
        [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 0.0),
        ],
    ));
    db
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn test_new_is_idle() {
        let rec = GestureRecorder::new();
        assert_eq!(rec.state(), GestureSessionState::Idle);
        assert!(rec.recording().is_empty());
        assert!(rec.session().is_none());
    }

    #[test]
    fn test_begin_enters_mode() {
        let mut rec = GestureRecorder::new();
        assert!(rec.begin_recording(false, 60, 120, 0.01, Vec3::ZERO));
        assert_eq!(rec.state(), GestureSessionState::Recording);
        rec.end_recording();

        assert!(rec.begin_recording(true, 60, 120, 0.01, Vec3::ZERO));
        assert_eq!(rec.state(), GestureSessionState::Detecting);
    }

    #[test]
    fn test_no_direct_mode_switch() {
        let mut rec = GestureRecorder::new();
        rec.begin_recording(false, 60, 120, 0.01, Vec3::ZERO);
        assert!(!rec.begin_recording(true, 60, 120, 0.01, Vec3::ZERO));
        assert_eq!(rec.state(), GestureSessionState::Recording);
    }

    #[test]
    fn test_end_while_idle_is_noop() {
        let mut rec = GestureRecorder::new();
        assert!(rec.end_recording().is_none());
        assert_eq!(rec.state(), GestureSessionState::Idle);
    }

    #[test]
    fn test_capture_while_idle_is_noop() {
        let mut rec = GestureRecorder::new();
        rec.capture_frame(Vec3::new(5.0, 0.0, 0.0), 1.0, None);
        assert!(rec.recording().is_empty());
    }

    #[test]
    fn test_samples_relative_to_start() {
        let mut rec = GestureRecorder::new();
        let start = Vec3::new(10.0, 10.0, 10.0);
        rec.begin_recording(false, 60, 120, 0.01, start);
        rec.capture_frame(Vec3::new(11.0, 10.0, 10.0), DT, None);
        assert_eq!(rec.recording().last(), Some(Vec3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_dedup_within_tolerance() {
        let mut rec = GestureRecorder::new();
        rec.begin_recording(false, 60, 120, 0.05, Vec3::ZERO);
        rec.capture_frame(Vec3::new(1.0, 0.0, 0.0), DT, None);
        for i in 0..50 {
            let jitter = (i % 5) as f32 * 0.005;
            rec.capture_frame(Vec3::new(1.0 + jitter, 0.0, jitter), DT, None);
        }
        assert_eq!(rec.recording().len(), 1);
    }

    #[test]
    fn test_stationary_at_start_records_nothing() {
        let mut rec = GestureRecorder::new();
        rec.begin_recording(false, 60, 120, 0.01, Vec3::ONE);
        for _ in 0..30 {
            rec.capture_frame(Vec3::ONE, DT, None);
        }
        assert!(rec.recording().is_empty());
    }

    #[test]
    fn test_recording_rate_bound() {
        let rate = 30;
        let mut rec = GestureRecorder::new();
        rec.begin_recording(false, rate, 1000, 0.0, Vec3::ZERO);

        // 2 seconds of 90 Hz ticks with a moving position.
        let ticks = 180;
        let dt = 2.0 / ticks as f32;
        for i in 0..ticks {
            rec.capture_frame(Vec3::new(i as f32 + 1.0, 0.0, 0.0), dt, None);
        }
        let bound = (2.0 * rate as f32).floor() as usize;
        assert!(rec.recording().len() <= bound, "{} > {}", rec.recording().len(), bound);
        assert!(rec.recording().len() >= bound - 1);
    }

    #[test]
    fn test_catch_up_consumes_multiple_intervals() {
        let mut rec = GestureRecorder::new();
        rec.begin_recording(false, 10, 120, 0.01, Vec3::ZERO);
        // One long frame spanning three intervals stores a single sample.
        rec.capture_frame(Vec3::new(1.0, 0.0, 0.0), 0.35, None);
        assert_eq!(rec.recording().len(), 1);
        assert!(rec.session().map(|s| s.elapsed_s < 0.1).unwrap_or(false));
    }

    #[test]
    fn test_huge_delta_samples_once() {
        let mut rec = GestureRecorder::new();
        rec.begin_recording(false, 60, 120, 0.01, Vec3::ZERO);
        rec.capture_frame(Vec3::new(1.0, 0.0, 0.0), 1.0e6, None);
        assert_eq!(rec.recording().len(), 1);
        let interval = 1.0 / 60.0;
        assert!(rec.session().map(|s| s.elapsed_s < interval).unwrap_or(false));

        // The clock keeps running normally afterwards.
        rec.capture_frame(Vec3::new(2.0, 0.0, 0.0), interval, None);
        assert_eq!(rec.recording().len(), 2);
    }

    #[test]
    fn test_non_finite_delta_ignored() {
        let mut rec = GestureRecorder::new();
        rec.begin_recording(false, 60, 120, 0.01, Vec3::ZERO);
        rec.capture_frame(Vec3::X, f32::INFINITY, None);
        rec.capture_frame(Vec3::X, f32::NAN, None);
        rec.capture_frame(Vec3::X, f32::NEG_INFINITY, None);
        assert!(rec.recording().is_empty());
        assert!(rec.session().map(|s| s.elapsed_s == 0.0).unwrap_or(false));
    }

    #[test]
    fn test_ring_buffer_capacity() {
        let mut rec = GestureRecorder::new();
        rec.begin_recording(false, 60, 4, 0.0, Vec3::ZERO);
        for i in 0..10 {
            rec.capture_frame(Vec3::new(i as f32 + 1.0, 0.0, 0.0), DT, None);
        }
        assert_eq!(rec.recording().len(), 4);
        assert_eq!(rec.recording().last(), Some(Vec3::new(10.0, 0.0, 0.0)));
    }

    #[test]
    fn test_end_keeps_buffer_and_clear_empties() {
        let mut rec = GestureRecorder::new();
        rec.begin_recording(false, 60, 120, 0.01, Vec3::ZERO);
        rec.capture_frame(Vec3::X, DT, None);
        let out = rec.end_recording().expect("expected recording");
        assert_eq!(out.len(), 1);
        assert_eq!(rec.recording().len(), 1);
        assert_eq!(rec.state(), GestureSessionState::Idle);

        rec.clear_recording();
        assert!(rec.recording().is_empty());
        assert_eq!(rec.state(), GestureSessionState::Idle);
    }

    #[test]
    fn test_save_recording() {
        let mut rec = GestureRecorder::new();
        let mut db = GestureDatabase::new();
        rec.begin_recording(false, 60, 120, 0.01, Vec3::ZERO);
        rec.capture_frame(Vec3::X, DT, None);
        let mut out = rec.end_recording().expect("expected recording");

        let idx = GestureRecorder::save_recording(&mut out, "flick", Some(&mut db));
        assert_eq!(idx, Some(0));
        assert_eq!(out.name, "flick");
        assert_eq!(db.get(0).map(|g| g.name.as_str()), Some("flick"));
        assert_eq!(db.get(0).and_then(|g| g.capacity()), None);
    }

    #[test]
    fn test_save_without_database_is_noop() {
        let mut out = SampleBuffer::new();
        assert_eq!(GestureRecorder::save_recording(&mut out, "flick", None), None);
        assert!(out.name.is_empty());
    }

    #[test]
    fn test_detecting_emits_match_and_notifies() {
        let db = line_database();
        let mut rec = GestureRecorder::new();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        rec.add_listener(Box::new(move |m: &GestureMatch, db: &GestureDatabase| {
            sink.borrow_mut().push((m.index, db.len()));
        }));

        rec.begin_recording(true, 60, 120, 0.01, Vec3::ZERO);
        let mut matches = Vec::new();
        for x in [1.0, 2.0, 3.0] {
            matches.extend(rec.capture_frame(Vec3::new(x, 0.0, 0.0), DT, Some(&db)));
        }

        let exact = matches.last().expect("expected a match");
        assert_eq!(exact.index, 0);
        assert_eq!(exact.distance, 0.0);
        assert_eq!(seen.borrow().len(), matches.len());
        assert_eq!(seen.borrow().last(), Some(&(0, 1)));
        assert_eq!(rec.last_match().map(|m| m.index), Some(0));
    }

    #[test]
    fn test_detecting_without_database_still_samples() {
        let mut rec = GestureRecorder::new();
        rec.begin_recording(true, 60, 120, 0.01, Vec3::ZERO);
        let matches = rec.capture_frame(Vec3::X, DT, None);
        assert!(matches.is_empty());
        assert_eq!(rec.recording().len(), 1);
    }

    #[test]
    fn test_recording_mode_never_matches() {
        let db = line_database();
        let mut rec = GestureRecorder::new();
        rec.begin_recording(false, 60, 120, 0.01, Vec3::ZERO);
        for x in [1.0, 2.0, 3.0] {
            assert!(rec.capture_frame(Vec3::new(x, 0.0, 0.0), DT, Some(&db)).is_empty());
        }
        assert_eq!(rec.matcher.dtw_evaluations(), 0);
    }

    #[test]
    fn test_hook_receives_matches() {
        struct Counter(Rc<RefCell<u32>>);
        impl GestureHook for Counter {
            fn on_gesture_detected(&mut self, _: &GestureMatch, _: &GestureDatabase) {
                *self.0.borrow_mut() += 1;
            }
        }

        let db = line_database();
        let hits = Rc::new(RefCell::new(0));
        let mut rec = GestureRecorder::new();
        rec.set_hook(Box::new(Counter(Rc::clone(&hits))));
        rec.begin_recording(true, 60, 120, 0.01, Vec3::ZERO);
        for x in [1.0, 2.0, 3.0] {
            rec.capture_frame(Vec3::new(x, 0.0, 0.0), DT, Some(&db));
        }
        assert!(*hits.borrow() >= 1);
    }

    #[test]
    fn test_remove_listener() {
        let mut rec = GestureRecorder::new();
        let id = rec.add_listener(Box::new(|_: &GestureMatch, _: &GestureDatabase| {}));
        assert_eq!(rec.listener_count(), 1);
        assert!(rec.remove_listener(id));
        assert!(!rec.remove_listener(id));
        assert_eq!(rec.listener_count(), 0);
    }

    #[test]
    fn test_begin_clamps_parameters() {
        let mut rec = GestureRecorder::new();
        rec.begin_recording(false, 0, 0, -1.0, Vec3::ZERO);
        let s = rec.session().expect("expected session");
        assert_eq!(s.sampling_rate_hz, 1);
        assert_eq!(s.clamp_tolerance, 0.0);
        assert_eq!(rec.recording().capacity(), Some(1));
    }

    #[test]
    fn test_status_sexp() {
        let rec = GestureRecorder::new();
        let s = rec.status_sexp();
        assert!(s.contains(":state :idle"));
        assert!(s.contains(":rate-hz 60"));
        assert!(s.contains(":last-match nil"));
    }

    #[test]
    fn test_config_sexp() {
        let rec = GestureRecorder::new();
        let s = rec.config_sexp();
        assert!(s.contains(":capacity 120"));
        assert!(s.contains(":tolerance 0.010"));
        assert!(s.contains(":max-slope 3"));
    }
}
