//! VR interaction core — gesture recognition and held-tool poses.
//!
//! Provides:
//! - `transform`: rigid transform math on top of glam
//! - `sample_buffer` / `gesture_db`: gesture samples and the reference database
//! - `dtw` / `gesture_recorder`: DTW matching and the recording state machine
//! - `recoil` / `gun_tools`: recoil blending and pivot/shoulder pose composition

pub mod transform;
pub mod sample_buffer;
pub mod gesture_db;
pub mod dtw;
pub mod gesture_recorder;
pub mod recoil;
pub mod gun_tools;

pub use dtw::{dtw, GestureMatch, GestureMatcher, MatcherConfig};
pub use gesture_db::GestureDatabase;
pub use gesture_recorder::{
    GestureHook, GestureListener, GestureRecorder, GestureSessionState, ListenerId,
    RecorderConfig,
};
pub use gun_tools::{
    FixedShoulderMount, GunTools, GunToolsConfig, PoseInput, ShoulderMount, SocketLookup,
};
pub use recoil::{RecoilBlender, RecoilConfig, RecoilOffset};
pub use sample_buffer::{Sample, SampleBuffer, MAX_BUFFER_CAPACITY};
pub use transform::Transform;
