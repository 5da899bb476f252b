//! Dynamic time warping distance and best-match gesture recognition.
//!
//! The recognizer always assumes the gesture ends on the last sample of
//! both sequences.  References are pre-filtered on the distance between
//! last samples before paying for a full DTW pass.

use tracing::{debug, warn};

use super::gesture_db::GestureDatabase;
use super::sample_buffer::{Sample, SampleBuffer};

// ── DTW ────────────────────────────────────────────────────

/// Minimum cumulative alignment cost between `a` and `b`.
///
/// `max_slope` bounds how many consecutive steps may advance only one of
/// the two sequences; `0` leaves the warping path unconstrained.  Returns
/// infinity if either sequence is empty or no path satisfies the slope
/// bound.  The bound applies to single-sample inputs too: one sample
/// against a reference longer than `max_slope + 1` is infinite.
pub fn dtw<'s, A, B>(a: A, b: B, max_slope: usize) -> f32
where
    A: IntoIterator<Item = &'s Sample>,
    A::IntoIter: ExactSizeIterator,
    B: IntoIterator<Item = &'s Sample>,
    B::IntoIter: ExactSizeIterator + Clone,
{
    let a = a.into_iter();
    let b = b.into_iter();
    if a.len() == 0 || b.len() == 0 {
        return f32::INFINITY;
    }

    let slope_ok = |run: usize| max_slope == 0 || run < max_slope;
    let cols = b.len() + 1;

    // Two rolling rows of the (len_a + 1) x (len_b + 1) grid, plus the
    // length of the single-sequence run that ends in each cell.  Runs along
    // `b` only look back within the current row.
    let mut prev_cost = vec![f32::INFINITY; cols];
    let mut prev_run_a = vec![0usize; cols];
    let mut cur_cost = vec![f32::INFINITY; cols];
    let mut cur_run_a = vec![0usize; cols];
    let mut cur_run_b = vec![0usize; cols];
    prev_cost[0] = 0.0;

    for sample_a in a {
        cur_cost[0] = f32::INFINITY;
        cur_run_a[0] = 0;
        cur_run_b[0] = 0;

        for (j, sample_b) in b.clone().enumerate().map(|(j, s)| (j + 1, s)) {
            let diagonal = prev_cost[j - 1];
            // `b` advances while `a` holds
            let horizontal = if slope_ok(cur_run_b[j - 1]) {
                cur_cost[j - 1]
            } else {
                f32::INFINITY
            };
            // `a` advances while `b` holds
            let vertical = if slope_ok(prev_run_a[j]) {
                prev_cost[j]
            } else {
                f32::INFINITY
            };

            let (best, run_a, run_b) = if diagonal <= horizontal && diagonal <= vertical {
                (diagonal, 0, 0)
            } else if horizontal <= vertical {
                (horizontal, 0, cur_run_b[j - 1] + 1)
            } else {
                (vertical, prev_run_a[j] + 1, 0)
            };

            cur_cost[j] = if best.is_finite() {
                sample_a.distance(*sample_b) + best
            } else {
                f32::INFINITY
            };
            cur_run_a[j] = run_a;
            cur_run_b[j] = run_b;
        }

        std::mem::swap(&mut prev_cost, &mut cur_cost);
        std::mem::swap(&mut prev_run_a, &mut cur_run_a);
    }

    prev_cost[cols - 1]
}

// ── Config ─────────────────────────────────────────────────

/// Recognition thresholds.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Maximum DTW distance for a reference to count as a match.
    pub global_threshold: f32,
    /// Maximum consecutive single-sequence warping steps (0 = unbounded).
    pub max_slope: usize,
    /// Absolute floor on the input length before recognition runs.
    pub minimum_length_floor: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            global_threshold: 2.0,
            max_slope: 3,
            minimum_length_floor: 1,
        }
    }
}

// ── Match ──────────────────────────────────────────────────

/// Best reference found for an input sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureMatch {
    /// DTW distance to the reference.
    pub distance: f32,
    /// Index of the reference in the database.
    pub index: usize,
    /// Name of the reference.
    pub name: String,
}

impl GestureMatch {
    /// Generate s-expression for IPC.
    pub fn to_sexp(&self) -> String {
        format!(
            "(:index {} :name \"{}\" :distance {:.4})",
            self.index,
            self.name.replace('\\', "\\\\").replace('"', "\\\""),
            self.distance,
        )
    }
}

// ── Matcher ────────────────────────────────────────────────

/// Classifies sample sequences against a gesture database.
#[derive(Debug, Clone, Default)]
pub struct GestureMatcher {
    /// Configuration.
    pub config: MatcherConfig,
    /// Number of full DTW evaluations performed so far.
    dtw_evaluations: u64,
}

impl GestureMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            config,
            dtw_evaluations: 0,
        }
    }

    /// Number of full DTW passes run since creation.
    pub fn dtw_evaluations(&self) -> u64 {
        self.dtw_evaluations
    }

    /// Input length below which recognition is skipped, or `None` if the
    /// database has no enabled gestures.
    pub fn global_minimum_length(&self, database: &GestureDatabase) -> Option<usize> {
        database
            .shortest_minimum_length()
            .map(|len| len.max(self.config.minimum_length_floor))
    }

    /// Find the closest enabled reference under the global threshold.
    ///
    /// Ties are resolved in favor of the lowest index.
    pub fn recognize(
        &mut self,
        input: &SampleBuffer,
        database: &GestureDatabase,
    ) -> Option<GestureMatch> {
        let min_len = self.global_minimum_length(database)?;
        if input.len() < min_len {
            return None;
        }
        let input_last = input.last()?;

        let mut best: Option<(usize, f32)> = None;

        for (index, reference) in database.enabled() {
            let Some(reference_last) = reference.last() else {
                warn!(
                    "Gesture \"{}\" at index {} has no samples, skipping",
                    reference.name, index
                );
                continue;
            };

            if input.len() < reference.minimum_length {
                continue;
            }

            let end_distance = input_last.distance(reference_last);
            if end_distance > reference.first_threshold {
                continue;
            }

            self.dtw_evaluations += 1;
            let distance = dtw(input.iter(), reference.iter(), self.config.max_slope);

            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((index, distance));
            }
        }

        let (index, distance) = best?;
        if distance > self.config.global_threshold {
            return None;
        }

        let name = database
            .get(index)
            .map(|g| g.name.clone())
            .unwrap_or_default();
        debug!(
            "Gesture recognized: \"{}\" (index {}) dtw={:.4}",
            name, index, distance
        );
        Some(GestureMatch {
            distance,
            index,
            name,
        })
    }

    /// Generate s-expression for IPC config.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:global-threshold {:.3} :max-slope {} :min-length-floor {} :dtw-evaluations {})",
            self.config.global_threshold,
            self.config.max_slope,
            self.config.minimum_length_floor,
            self.dtw_evaluations,
        )
    }
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
fn points(coords: &[[f32; 3]]) -> Vec<Sample> {
    coords.iter().map(|c| Sample::from_array(*c)).collect()
}

#[cfg(test)]
fn reference(name: &str, coords: &[[f32; 3]]) -> SampleBuffer {
    SampleBuffer::from_samples(name, points(coords))
}

// ── Tests ──────────────────────────────────────────────────
