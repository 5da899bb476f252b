//! Ordered 3D sample sequences for recorded and reference gestures.
//!
//! A buffer with a capacity behaves as a ring (oldest sample dropped on
//! overflow) and is used for live recording.  Stored references are
//! unbounded.

use std::collections::VecDeque;

use glam::Vec3;

/// A single sampled position.
pub type Sample = Vec3;

/// Default minimum gesture length before a reference is considered.
pub const DEFAULT_MINIMUM_LENGTH: usize = 1;

/// Default maximum distance between last samples before a reference is skipped.
pub const DEFAULT_FIRST_THRESHOLD: f32 = 10.0;

/// Largest ring capacity accepted from the command surface.
pub const MAX_BUFFER_CAPACITY: usize = 1 << 16;

/// Upper bound on storage reserved up front; larger rings grow on push.
const INITIAL_RESERVE: usize = 256;

/// A gesture: ordered samples plus recognition metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Gesture name (empty until saved).
    pub name: String,
    /// Minimum input length before this gesture is matched against.
    pub minimum_length: usize,
    /// Maximum distance between the last samples of input and reference.
    pub first_threshold: f32,
    /// Whether this gesture takes part in recognition.
    pub enabled: bool,
    samples: VecDeque<Sample>,
    capacity: Option<usize>,
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleBuffer {
    /// Create an unbounded, empty buffer with default metadata.
    pub fn new() -> Self {
        Self {
            name: String::new(),
            minimum_length: DEFAULT_MINIMUM_LENGTH,
            first_threshold: DEFAULT_FIRST_THRESHOLD,
            enabled: true,
            samples: VecDeque::new(),
            capacity: None,
        }
    }

    /// Create a ring buffer holding at most `capacity` samples (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(INITIAL_RESERVE)),
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Build an unbounded named reference from a list of points.
    pub fn from_samples(name: &str, samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            name: name.to_string(),
            samples: samples.into_iter().collect(),
            ..Self::new()
        }
    }

    /// Append a sample, dropping the oldest one if the buffer is full.
    pub fn push(&mut self, sample: Sample) {
        if let Some(cap) = self.capacity {
            while self.samples.len() >= cap {
                self.samples.pop_front();
            }
        }
        self.samples.push_back(sample);
    }

    /// Remove all samples, keeping capacity and metadata.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Remove all samples and switch to a new capacity bound.
    pub fn reset(&mut self, capacity: Option<usize>) {
        let capacity = capacity.map(|c| c.max(1));
        self.samples.clear();
        if let Some(cap) = capacity {
            self.samples.reserve(cap.min(INITIAL_RESERVE));
        }
        self.capacity = capacity;
    }

    /// Copy of this buffer with the capacity bound removed (for storage).
    pub fn to_unbounded(&self) -> Self {
        Self {
            capacity: None,
            ..self.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Most recent sample.
    pub fn last(&self) -> Option<Sample> {
        self.samples.back().copied()
    }

    pub fn get(&self, index: usize) -> Option<Sample> {
        self.samples.get(index).copied()
    }

    /// Samples in temporal order (oldest first).
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Generate s-expression summary for IPC.
    pub fn summary_sexp(&self) -> String {
        format!(
            "(:name \"{}\" :samples {} :min-length {} :first-threshold {:.3} :enabled {})",
            self.name.replace('\\', "\\\\").replace('"', "\\\""),
            self.samples.len(),
            self.minimum_length,
            self.first_threshold,
            if self.enabled { "t" } else { "nil" },
        )
    }
}

// ── Tests ──────────────────────────────────────────────────
