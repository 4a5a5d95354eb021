//! Sample store: calibration points in the order they were collected.

use crate::model::CalibrationPoint;

/// Calibration samples held as parallel distance/focus sequences.
///
/// Insertion order is calibration order; nothing here sorts or dedups.
/// Duplicate and out-of-range distances are accepted as-is.
#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    distances: Vec<f64>,
    focals: Vec<i32>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-loaded with `points`, e.g. static `focus_mappings`.
    pub fn from_points(points: impl IntoIterator<Item = CalibrationPoint>) -> Self {
        let mut store = Self::new();
        for point in points {
            store.add(point.distance, point.focus);
        }
        store
    }

    /// Append one sample.
    pub fn add(&mut self, distance: f64, focus: i32) {
        self.distances.push(distance);
        self.focals.push(focus);
    }

    /// Drop every sample.
    pub fn clear(&mut self) {
        self.distances.clear();
        self.focals.clear();
    }

    /// Replace the whole contents with `points`.
    pub fn replace(&mut self, points: &[CalibrationPoint]) {
        self.clear();
        for point in points {
            self.add(point.distance, point.focus);
        }
    }

    /// Owned copy of all samples, in insertion order.
    pub fn snapshot(&self) -> Vec<CalibrationPoint> {
        self.distances
            .iter()
            .zip(&self.focals)
            .map(|(&distance, &focus)| CalibrationPoint { distance, focus })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }
}
