//! Focus mapper: piecewise-linear distance -> focus function.
//!
//! A mapper is an immutable snapshot of the sample store sorted by distance.
//! Whenever the samples change a new mapper is built and swapped in; an
//! existing mapper is never modified.

use crate::model::CalibrationPoint;

/// Sorted calibration points plus a pure evaluation function.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusMapper {
    points: Vec<CalibrationPoint>,
}

impl FocusMapper {
    /// Fewest samples that define a mapping.
    pub const MIN_POINTS: usize = 2;

    /// Build a mapper from unsorted samples.
    ///
    /// Returns `None` with fewer than [`Self::MIN_POINTS`] samples. Sorting is
    /// stable, so samples sharing a distance keep their collection order.
    pub fn build(points: &[CalibrationPoint]) -> Option<Self> {
        if points.len() < Self::MIN_POINTS {
            return None;
        }
        let mut sorted = points.to_vec();
        sorted.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Some(Self { points: sorted })
    }

    /// Map a distance to a focus value.
    ///
    /// Walks the sorted samples looking for the first one farther than
    /// `distance` and interpolates linearly from the sample before it; the
    /// result is truncated toward zero. Distances at or below the first sample
    /// return the first focus, distances at or beyond the last sample return
    /// the last focus. A zero-width segment (two samples at one distance)
    /// returns the later sample's focus.
    pub fn evaluate(&self, distance: f64) -> i32 {
        let mut prev = &self.points[0];
        for point in &self.points {
            if distance < point.distance {
                let width = point.distance - prev.distance;
                if width == 0.0 {
                    return point.focus;
                }
                let fraction = (distance - prev.distance) / width;
                let delta = f64::from(point.focus) - f64::from(prev.focus);
                let focus = f64::from(prev.focus) + fraction * delta;
                return focus as i32;
            }
            prev = point;
        }
        prev.focus
    }

    /// Samples in ascending distance order.
    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Smallest and largest sampled distance.
    pub fn domain(&self) -> (f64, f64) {
        let first = self.points[0].distance;
        let last = self.points[self.points.len() - 1].distance;
        (first, last)
    }

    /// Evaluate `count` evenly spaced distances across `[from, to]`.
    pub fn sample(&self, from: f64, to: f64, count: usize) -> Vec<(f64, i32)> {
        match count {
            0 => Vec::new(),
            1 => vec![(from, self.evaluate(from))],
            n => {
                let step = (to - from) / (n - 1) as f64;
                (0..n)
                    .map(|i| {
                        let d = from + step * i as f64;
                        (d, self.evaluate(d))
                    })
                    .collect()
            }
        }
    }
}
