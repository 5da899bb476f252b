//! Reference gesture database.
//!
//! An ordered list of named gestures.  A gesture's index is its identity in
//! match reports, so entries are only ever appended.

use tracing::info;

use super::sample_buffer::SampleBuffer;

/// Ordered collection of reference gestures.
#[derive(Debug, Clone, Default)]
pub struct GestureDatabase {
    gestures: Vec<SampleBuffer>,
}

impl GestureDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a gesture and return its index.  Stored copies are unbounded.
    pub fn add(&mut self, gesture: SampleBuffer) -> usize {
        let gesture = gesture.to_unbounded();
        info!(
            "Gesture database: added \"{}\" ({} samples) at index {}",
            gesture.name,
            gesture.len(),
            self.gestures.len()
        );
        self.gestures.push(gesture);
        self.gestures.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&SampleBuffer> {
        self.gestures.get(index)
    }

    /// Index of the first gesture with the given name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.gestures.iter().position(|g| g.name == name)
    }

    pub fn len(&self) -> usize {
        self.gestures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gestures.is_empty()
    }

    /// All gestures with their indices, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &SampleBuffer)> + '_ {
        self.gestures.iter().enumerate()
    }

    /// Enabled gestures with their indices, in insertion order.
    pub fn enabled(&self) -> impl Iterator<Item = (usize, &SampleBuffer)> + '_ {
        self.iter().filter(|(_, g)| g.enabled)
    }

    /// Smallest minimum length among enabled gestures.
    pub fn shortest_minimum_length(&self) -> Option<usize> {
        self.enabled().map(|(_, g)| g.minimum_length).min()
    }

    /// Generate s-expression listing all gestures.
    pub fn list_sexp(&self) -> String {
        if self.gestures.is_empty() {
            return "nil".to_string();
        }
        let mut s = String::from("(");
        for (i, g) in self.iter() {
            if i > 0 {
                s.push(' ');
            }
            s.push_str(&format!("(:index {} :gesture {})", i, g.summary_sexp()));
        }
        s.push(')');
        s
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn gesture(name: &str, min_len: usize, enabled: bool) -> SampleBuffer {
        let mut g = SampleBuffer::from_samples(name, [Vec3::ZERO, Vec3::X]);
        g.minimum_length = min_len;
        g.enabled = enabled;
        g
    }

    #[test]
    fn test_add_returns_sequential_indices() {
        let mut db = GestureDatabase::new();
        assert_eq!(db.add(gesture("a", 1, true)), 0);
        assert_eq!(db.add(gesture("b", 1, true)), 1);
        assert_eq!(db.len(), 2);
        assert_eq!(db.get(1).map(|g| g.name.as_str()), Some("b"));
    }

    #[test]
    fn test_add_strips_capacity() {
        let mut db = GestureDatabase::new();
        let mut live = SampleBuffer::with_capacity(2);
        live.push(Vec3::ONE);
        let idx = db.add(live);
        assert_eq!(db.get(idx).and_then(|g| g.capacity()), None);
    }

    #[test]
    fn test_find_by_name() {
        let mut db = GestureDatabase::new();
        db.add(gesture("swipe", 1, true));
        db.add(gesture("circle", 1, true));
        assert_eq!(db.find("circle"), Some(1));
        assert_eq!(db.find("zigzag"), None);
    }

    #[test]
    fn test_enabled_filter_and_shortest_minimum() {
        let mut db = GestureDatabase::new();
        db.add(gesture("a", 8, true));
        db.add(gesture("b", 2, false));
        db.add(gesture("c", 5, true));
        let enabled: Vec<usize> = db.enabled().map(|(i, _)| i).collect();
        assert_eq!(enabled, vec![0, 2]);
        assert_eq!(db.shortest_minimum_length(), Some(5));
    }

    #[test]
    fn test_shortest_minimum_none_when_all_disabled() {
        let mut db = GestureDatabase::new();
        db.add(gesture("a", 3, false));
        assert_eq!(db.shortest_minimum_length(), None);
    }

    #[test]
    fn test_list_sexp() {
        let mut db = GestureDatabase::new();
        assert_eq!(db.list_sexp(), "nil");
        db.add(gesture("a", 1, true));
        let s = db.list_sexp();
        assert!(s.starts_with("((:index 0 :gesture (:name \"a\""));
    }
}
