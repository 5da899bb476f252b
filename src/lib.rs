//! vr-grip-tools - DTW gesture recognition and recoil-blended grip poses
//! for VR interaction.

pub mod ipc;
pub mod state;
pub mod vr;

pub use state::{GripState, TickOutput};
