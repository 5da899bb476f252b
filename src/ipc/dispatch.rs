//! IPC message dispatch — parse s-expressions and route to handlers.

use crate::state::GripState;
use crate::vr::{RecoilOffset, SampleBuffer, Transform, MAX_BUFFER_CAPACITY};
use glam::{Quat, Vec3};
use lexpr::Value;
use tracing::{debug, warn};

/// Parse an s-expression message and dispatch to the appropriate handler.
/// Returns an optional response string (s-expression).
pub fn handle_message(state: &mut GripState, raw: &str) -> Option<String> {
    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("malformed s-expression: {}", e);
            return Some(error_response(0, &format!("malformed s-expression: {e}")));
        }
    };

    let msg_type = get_keyword(&value, "type");
    let msg_id = get_int(&value, "id").unwrap_or(0);
    debug!(msg_id, "ipc message: {:?}", msg_type);

    match msg_type.as_deref() {
        Some("ping") => handle_ping(state, msg_id, &value),
        Some("tick") => handle_tick(state, msg_id, &value),
        // Gesture recording
        Some("gesture-record-begin") => handle_gesture_record_begin(state, msg_id, &value),
        Some("gesture-record-end") => handle_gesture_record_end(state, msg_id),
        Some("gesture-record-clear") => handle_gesture_record_clear(state, msg_id),
        Some("gesture-save") => handle_gesture_save(state, msg_id, &value),
        Some("gesture-status") => handle_gesture_status(state, msg_id),
        Some("gesture-config") => handle_gesture_config(state, msg_id, &value),
        // Gesture database
        Some("gesture-db-add") => handle_gesture_db_add(state, msg_id, &value),
        Some("gesture-db-list") => handle_gesture_db_list(state, msg_id),
        Some("gesture-db-unbind") => handle_gesture_db_unbind(state, msg_id),
        // Recoil
        Some("recoil-add") => handle_recoil_add(state, msg_id, &value),
        Some("recoil-reset") => handle_recoil_reset(state, msg_id),
        Some("recoil-status") => handle_recoil_status(state, msg_id),
        // Gun tools
        Some("gun-status") => handle_gun_status(state, msg_id),
        Some("gun-config") => handle_gun_config(state, msg_id, &value),
        Some("shoulder-mount-set") => handle_shoulder_mount_set(state, msg_id, &value),
        Some("shoulder-mount-clear") => handle_shoulder_mount_clear(state, msg_id),
        Some(other) => Some(error_response(
            msg_id,
            &format!("unknown message type: {other}"),
        )),
        None => Some(error_response(msg_id, "missing :type field")),
    }
}

// ── Handlers ────────────────────────────────────────────────

fn handle_ping(state: &mut GripState, msg_id: i64, value: &Value) -> Option<String> {
    let client_ts = get_int(value, "timestamp").unwrap_or(0);
    Some(format!(
        "(:type :response :id {} :status :ok :client-timestamp {} :ticks {} :elapsed {:.4})",
        msg_id, client_ts, state.ticks, state.elapsed_s
    ))
}

fn handle_tick(state: &mut GripState, msg_id: i64, value: &Value) -> Option<String> {
    let dt = match get_float(value, "dt") {
        Some(dt) => dt as f32,
        None => return Some(error_response(msg_id, "missing :dt")),
    };
    let position = get_vec3(value, "position").unwrap_or(Vec3::ZERO);
    let grip_location = get_vec3(value, "grip").unwrap_or(position);
    let grip_rotation = get_quat(value, "grip-rotation").unwrap_or(Quat::IDENTITY);
    let grip = Transform::from_rotation_translation(grip_rotation, grip_location);

    let out = state.tick(dt, position, grip);
    let matches = if out.matches.is_empty() {
        "nil".to_string()
    } else {
        let items: Vec<String> = out.matches.iter().map(|m| m.to_sexp()).collect();
        format!("({})", items.join(" "))
    };
    Some(format!(
        "(:type :response :id {} :status :ok :tick {} :state :{} :matches {} :world {})",
        msg_id,
        state.ticks,
        state.recorder.state().as_str(),
        matches,
        out.world_transform.to_sexp(),
    ))
}

fn handle_gesture_record_begin(
    state: &mut GripState,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let detect = get_bool(value, "detect").unwrap_or(false);
    let defaults = state.recorder.config.clone();
    let rate = get_int(value, "rate")
        .map(|r| r.clamp(0, u32::MAX as i64) as u32)
        .unwrap_or(defaults.sampling_rate_hz);
    let capacity = match get_int(value, "capacity") {
        Some(c) => match buffer_capacity(c) {
            Some(c) => c,
            None => return Some(capacity_error(msg_id, c)),
        },
        None => defaults.buffer_capacity,
    };
    let tolerance = get_float(value, "tolerance")
        .map(|t| t as f32)
        .unwrap_or(defaults.clamp_tolerance);
    let start = get_vec3(value, "start").unwrap_or(Vec3::ZERO);

    if !state.begin_recording(detect, rate, capacity, tolerance, start) {
        return Some(error_response(msg_id, "gesture session already active"));
    }
    Some(format!(
        "(:type :response :id {} :status :ok :gesture {})",
        msg_id,
        state.recorder.status_sexp()
    ))
}

fn handle_gesture_record_end(state: &mut GripState, msg_id: i64) -> Option<String> {
    match state.end_recording() {
        Some(recording) => Some(format!(
            "(:type :response :id {} :status :ok :samples {})",
            msg_id,
            recording.len()
        )),
        None => Some(error_response(msg_id, "no active gesture session")),
    }
}

fn handle_gesture_record_clear(state: &mut GripState, msg_id: i64) -> Option<String> {
    state.clear_recording();
    Some(ok_response(msg_id))
}

fn handle_gesture_save(state: &mut GripState, msg_id: i64, value: &Value) -> Option<String> {
    let name = match get_string(value, "name") {
        Some(n) => n,
        None => return Some(error_response(msg_id, "missing :name")),
    };
    match state.save_recording(&name) {
        Some(index) => Some(format!(
            "(:type :response :id {} :status :ok :index {} :name \"{}\")",
            msg_id,
            index,
            escape_string(&name)
        )),
        None => Some(error_response(msg_id, "no gesture database bound")),
    }
}

fn handle_gesture_status(state: &mut GripState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :gesture {} :database {} :dtw-evaluations {})",
        msg_id,
        state.recorder.status_sexp(),
        state.database_sexp(),
        state.recorder.matcher.dtw_evaluations(),
    ))
}

fn handle_gesture_config(
    state: &mut GripState,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let capacity = match get_int(value, "capacity") {
        Some(c) => match buffer_capacity(c) {
            Some(c) => Some(c.max(1)),
            None => return Some(capacity_error(msg_id, c)),
        },
        None => None,
    };

    let recorder = &mut state.recorder;
    if let Some(rate) = get_int(value, "rate") {
        recorder.config.sampling_rate_hz = rate.clamp(1, u32::MAX as i64) as u32;
    }
    if let Some(capacity) = capacity {
        recorder.config.buffer_capacity = capacity;
    }
    if let Some(tolerance) = get_float(value, "tolerance") {
        recorder.config.clamp_tolerance = (tolerance as f32).max(0.0);
    }
    if let Some(threshold) = get_float(value, "threshold") {
        recorder.matcher.config.global_threshold = threshold as f32;
    }
    if let Some(slope) = get_int(value, "max-slope") {
        recorder.matcher.config.max_slope = slope.max(0) as usize;
    }
    if let Some(floor) = get_int(value, "min-length-floor") {
        recorder.matcher.config.minimum_length_floor = floor.max(1) as usize;
    }

    Some(format!(
        "(:type :response :id {} :status :ok :config {})",
        msg_id,
        state.recorder.config_sexp()
    ))
}

fn handle_gesture_db_add(
    state: &mut GripState,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let name = match get_string(value, "name") {
        Some(n) => n,
        None => return Some(error_response(msg_id, "missing :name")),
    };
    if state
        .database
        .as_ref()
        .is_some_and(|db| db.find(&name).is_some())
    {
        return Some(error_response(msg_id, "gesture name already exists"));
    }
    let coords = match get_floats(value, "samples") {
        Some(c) if c.len() % 3 == 0 => c,
        _ => {
            return Some(error_response(
                msg_id,
                "missing or malformed :samples (expected ((x y z) ...))",
            ))
        }
    };

    let mut gesture = SampleBuffer::from_samples(
        &name,
        coords.chunks_exact(3).map(|c| Vec3::new(c[0], c[1], c[2])),
    );
    if let Some(min_len) = get_int(value, "min-length") {
        gesture.minimum_length = min_len.max(1) as usize;
    }
    if let Some(threshold) = get_float(value, "first-threshold") {
        gesture.first_threshold = threshold as f32;
    }
    if let Some(enabled) = get_bool(value, "enabled") {
        gesture.enabled = enabled;
    }

    let index = state.database_or_bind().add(gesture);
    Some(format!(
        "(:type :response :id {} :status :ok :index {})",
        msg_id, index
    ))
}

fn handle_gesture_db_list(state: &mut GripState, msg_id: i64) -> Option<String> {
    match &state.database {
        Some(db) => Some(format!(
            "(:type :response :id {} :status :ok :gestures {})",
            msg_id,
            db.list_sexp()
        )),
        None => Some(error_response(msg_id, "no gesture database bound")),
    }
}

fn handle_gesture_db_unbind(state: &mut GripState, msg_id: i64) -> Option<String> {
    state.unbind_database();
    Some(ok_response(msg_id))
}

fn handle_recoil_add(state: &mut GripState, msg_id: i64, value: &Value) -> Option<String> {
    if !state.gun.config.has_recoil {
        return Some(error_response(msg_id, "recoil disabled"));
    }
    let axis = |key: &str| get_float(value, key).unwrap_or(0.0) as f32;
    let impulse = RecoilOffset::new(
        Vec3::new(axis("x"), axis("y"), axis("z")),
        Vec3::new(axis("pitch"), axis("yaw"), axis("roll")),
    );
    state.gun.add_recoil_instance(&impulse);
    Some(format!(
        "(:type :response :id {} :status :ok :recoil {})",
        msg_id,
        state.gun.recoil.status_sexp()
    ))
}

fn handle_recoil_reset(state: &mut GripState, msg_id: i64) -> Option<String> {
    state.gun.reset_recoil();
    Some(ok_response(msg_id))
}

fn handle_recoil_status(state: &mut GripState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :recoil {})",
        msg_id,
        state.gun.recoil.status_sexp()
    ))
}

fn handle_gun_status(state: &mut GripState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :gun {} :world {})",
        msg_id,
        state.gun.status_sexp(),
        state.last_world_transform.to_sexp()
    ))
}

fn handle_gun_config(state: &mut GripState, msg_id: i64, value: &Value) -> Option<String> {
    let gun = &mut state.gun;
    if let Some(pivot) = get_vec3(value, "pivot") {
        gun.config.pivot_offset = pivot;
    }
    if let Some(has_recoil) = get_bool(value, "has-recoil") {
        gun.config.has_recoil = has_recoil;
    }
    if let Some(snapping) = get_bool(value, "distance-snapping") {
        gun.config.use_distance_based_shoulder_snapping = snapping;
    }
    if let Some(distance) = get_float(value, "snap-distance") {
        gun.config.shoulder_snap_distance = (distance as f32).max(0.0);
    }
    if let Some(margin) = get_float(value, "release-margin") {
        gun.config.shoulder_release_margin = (margin as f32).max(0.0);
    }
    if let Some(offset) = get_vec3(value, "shoulder-offset") {
        gun.config.shoulder_mount_relative_transform = Transform::from_translation(offset);
    }
    if let Some(socket) = get_string(value, "socket-override") {
        gun.config.shoulder_mount_socket_override = (socket != "nil").then_some(socket);
    }
    if let Some(rate) = get_float(value, "decay-rate") {
        gun.recoil.config.decay_rate = (rate as f32).max(0.0);
    }
    if let Some(rate) = get_float(value, "lerp-rate") {
        gun.recoil.config.lerp_rate = rate as f32;
    }
    if let Some(max) = get_vec3(value, "max-translation") {
        gun.recoil.config.max_recoil.translation = max.abs();
    }
    if let Some(max) = get_vec3(value, "max-rotation") {
        gun.recoil.config.max_recoil.rotation = max.abs();
    }

    Some(format!(
        "(:type :response :id {} :status :ok :config {})",
        msg_id,
        state.gun.config_sexp()
    ))
}

fn handle_shoulder_mount_set(
    state: &mut GripState,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let position = match get_vec3(value, "position") {
        Some(p) => p,
        None => return Some(error_response(msg_id, "missing :position (x y z)")),
    };
    let rotation = get_quat(value, "rotation").unwrap_or(Quat::IDENTITY);
    state.set_shoulder_mount(Transform::from_rotation_translation(rotation, position));
    Some(ok_response(msg_id))
}

fn handle_shoulder_mount_clear(state: &mut GripState, msg_id: i64) -> Option<String> {
    state.clear_shoulder_mount();
    Some(ok_response(msg_id))
}

// ── Helpers ────────────────────────────────────────────────

fn ok_response(id: i64) -> String {
    format!("(:type :response :id {} :status :ok)", id)
}

fn error_response(id: i64, reason: &str) -> String {
    format!(
        "(:type :response :id {} :status :error :reason \"{}\")",
        id,
        escape_string(reason)
    )
}

/// Ring capacity from a `:capacity` value; `None` above `MAX_BUFFER_CAPACITY`.
fn buffer_capacity(requested: i64) -> Option<usize> {
    let capacity = requested.max(0) as u64;
    if capacity > MAX_BUFFER_CAPACITY as u64 {
        return None;
    }
    Some(capacity as usize)
}

fn capacity_error(id: i64, requested: i64) -> String {
    warn!("rejecting buffer capacity {}", requested);
    error_response(
        id,
        &format!(":capacity {requested} exceeds {MAX_BUFFER_CAPACITY}"),
    )
}

/// Escape a string for s-expression output.
pub fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Find the value following `:key` in an s-expression plist.
/// Handles both `Value::Keyword("key")` (elisp parser) and
/// `Value::Symbol(":key")` (default parser) forms.
fn get_value<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            // Value is the car of the next cons cell
            return match pair.cdr() {
                Value::Cons(next) => Some(next.car()),
                _ => None,
            };
        }
        current = pair.cdr();
    }
    None
}

/// Extract a keyword value from an s-expression plist as a string.
fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let val = get_value(value, key)?;
    Some(match val {
        Value::Keyword(v) => v.to_string(),
        Value::Symbol(v) => {
            let s = v.to_string();
            s.strip_prefix(':').unwrap_or(&s).to_string()
        }
        Value::String(v) => v.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => (if *b { "t" } else { "nil" }).to_string(),
        Value::Null | Value::Nil => "nil".to_string(),
        _ => val.to_string(),
    })
}

/// Extract an integer value from an s-expression plist.
fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// Extract a string value from an s-expression plist.
fn get_string(value: &Value, key: &str) -> Option<String> {
    get_keyword(value, key)
}

/// Extract a boolean value from an s-expression plist.
/// Treats "t" as true, "nil" as false.
fn get_bool(value: &Value, key: &str) -> Option<bool> {
    get_keyword(value, key).map(|s| s != "nil")
}

/// Extract a floating-point value from an s-expression plist.
fn get_float(value: &Value, key: &str) -> Option<f64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// Extract every number under `key`, flattening nested lists.
/// `None` if the key is missing or any leaf is not a number.
fn get_floats(value: &Value, key: &str) -> Option<Vec<f32>> {
    let v = get_value(value, key)?;
    flatten_list(v)
        .into_iter()
        .map(|leaf| leaf.as_f64().map(|f| f as f32))
        .collect()
}

/// Extract an `(x y z)` triple.
fn get_vec3(value: &Value, key: &str) -> Option<Vec3> {
    match get_floats(value, key)?.as_slice() {
        [x, y, z] => Some(Vec3::new(*x, *y, *z)),
        _ => None,
    }
}

/// Extract an `(x y z w)` quaternion, normalized.
fn get_quat(value: &Value, key: &str) -> Option<Quat> {
    match get_floats(value, key)?.as_slice() {
        [x, y, z, w] => {
            let q = Quat::from_xyzw(*x, *y, *z, *w);
            (q.length_squared() > f32::EPSILON).then(|| q.normalize())
        }
        _ => None,
    }
}

/// Flatten a possibly nested list/cons structure into a Vec of leaf values.
fn flatten_list(value: &Value) -> Vec<&Value> {
    let mut result = Vec::new();
    fn walk<'a>(v: &'a Value, out: &mut Vec<&'a Value>) {
        match v {
            Value::Cons(pair) => {
                walk(pair.car(), out);
                walk(pair.cdr(), out);
            }
            Value::Null => {} // end of list
            other => out.push(other),
        }
    }
    walk(value, &mut result);
    result
}

/// Format an IPC event s-expression.
pub fn format_event(event_type: &str, fields: &[(&str, &str)]) -> String {
    let mut s = format!("(:type :event :event :{}", event_type);
    for (key, val) in fields {
        s.push_str(&format!(" :{} {}", key, val));
    }
    s.push(')');
    s
}
