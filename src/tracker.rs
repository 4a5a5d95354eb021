//! Position tracker: machine position -> scalar focus distance.

use crate::error::{Error, Result};
use crate::model::{Axis, Position};
use crate::motion::Motion;

/// How a 3-axis position is reduced to the distance the mapper is keyed on.
#[derive(Debug, Clone, PartialEq)]
pub enum DistancePolicy {
    /// `sqrt(sum(((p_i - camera_i) * weight_i)^2))`. A zero weight removes an
    /// axis that does not change the focus distance.
    WeightedEuclidean {
        camera_position: Position,
        focal_axis: [f64; 3],
    },
    /// `(p_axis - min) / (max - min)` clamped to `[0, 1]`. Without an explicit
    /// range the axis travel limits are used.
    NormalizedAxis {
        axis: Axis,
        range: Option<(f64, f64)>,
    },
}

impl Default for DistancePolicy {
    fn default() -> Self {
        DistancePolicy::WeightedEuclidean {
            camera_position: [0.0; 3],
            focal_axis: [1.0; 3],
        }
    }
}

impl DistancePolicy {
    /// Axes whose position changes the reduced distance.
    pub fn contributing_axes(&self) -> Vec<Axis> {
        match self {
            DistancePolicy::WeightedEuclidean { focal_axis, .. } => Axis::ALL
                .into_iter()
                .filter(|axis| focal_axis[axis.index()] != 0.0)
                .collect(),
            DistancePolicy::NormalizedAxis { axis, .. } => vec![*axis],
        }
    }

    /// Fix any range left open by the configuration.
    pub fn resolve<M: Motion + ?Sized>(&self, motion: &M) -> Result<DistanceReducer> {
        match *self {
            DistancePolicy::WeightedEuclidean {
                camera_position,
                focal_axis,
            } => Ok(DistanceReducer::WeightedEuclidean {
                camera_position,
                focal_axis,
            }),
            DistancePolicy::NormalizedAxis { axis, range } => {
                let (min, max) = range.unwrap_or_else(|| motion.axis_limits(axis));
                if min >= max {
                    return Err(Error::Config(format!(
                        "normalized distance range for axis {axis} is empty ({min}..{max})"
                    )));
                }
                Ok(DistanceReducer::NormalizedAxis { axis, min, max })
            }
        }
    }
}

/// A [`DistancePolicy`] with every parameter fixed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceReducer {
    WeightedEuclidean {
        camera_position: Position,
        focal_axis: [f64; 3],
    },
    NormalizedAxis {
        axis: Axis,
        min: f64,
        max: f64,
    },
}

impl DistanceReducer {
    pub fn reduce(&self, position: &Position) -> f64 {
        match self {
            DistanceReducer::WeightedEuclidean {
                camera_position,
                focal_axis,
            } => position
                .iter()
                .zip(camera_position)
                .zip(focal_axis)
                .map(|((p, c), w)| ((p - c) * w).powi(2))
                .sum::<f64>()
                .sqrt(),
            DistanceReducer::NormalizedAxis { axis, min, max } => {
                ((position[axis.index()] - min) / (max - min)).clamp(0.0, 1.0)
            }
        }
    }
}

/// Latest toolhead position and its reduced distance.
///
/// Only the position poll writes here; everyone else reads.
#[derive(Debug, Clone)]
pub struct PositionTracker {
    policy: DistancePolicy,
    reducer: Option<DistanceReducer>,
    position: Option<Position>,
    distance: Option<f64>,
}

impl PositionTracker {
    pub fn new(policy: DistancePolicy) -> Self {
        Self {
            policy,
            reducer: None,
            position: None,
            distance: None,
        }
    }

    pub fn policy(&self) -> &DistancePolicy {
        &self.policy
    }

    /// Resolve the distance policy against the motion subsystem. Called once
    /// the host reports ready; polling before that fails.
    pub fn attach<M: Motion + ?Sized>(&mut self, motion: &M) -> Result<DistanceReducer> {
        let reducer = self.policy.resolve(motion)?;
        self.reducer = Some(reducer);
        Ok(reducer)
    }

    pub fn reducer(&self) -> Option<DistanceReducer> {
        self.reducer
    }

    /// Read the commanded stepper positions, run forward kinematics and
    /// reduce to a distance.
    pub fn poll<M: Motion + ?Sized>(&mut self, motion: &M) -> Result<f64> {
        let reducer = self
            .reducer
            .ok_or_else(|| Error::Motion("position tracker not attached".to_string()))?;
        let raw = motion.raw_positions()?;
        let position = motion.forward_kinematics(&raw)?;
        let distance = reducer.reduce(&position);
        self.position = Some(position);
        self.distance = Some(distance);
        Ok(distance)
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn distance(&self) -> Option<f64> {
        self.distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_euclidean_ignores_zero_weight_axes() {
        let reducer = DistanceReducer::WeightedEuclidean {
            camera_position: [100.0, 0.0, 0.0],
            focal_axis: [0.0, 1.0, 0.0],
        };
        assert_eq!(reducer.reduce(&[250.0, 30.0, 80.0]), 30.0);
    }

    #[test]
    fn weighted_euclidean_combines_axes() {
        let reducer = DistanceReducer::WeightedEuclidean {
            camera_position: [0.0, 0.0, 0.0],
            focal_axis: [1.0, 1.0, 0.0],
        };
        assert!((reducer.reduce(&[3.0, 4.0, 99.0]) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn normalized_axis_clamps_to_unit_range() {
        let reducer = DistanceReducer::NormalizedAxis {
            axis: Axis::Y,
            min: 0.0,
            max: 400.0,
        };
        assert_eq!(reducer.reduce(&[0.0, 100.0, 0.0]), 0.25);
        assert_eq!(reducer.reduce(&[0.0, -10.0, 0.0]), 0.0);
        assert_eq!(reducer.reduce(&[0.0, 500.0, 0.0]), 1.0);
    }

    #[test]
    fn contributing_axes_follow_policy() {
        let weighted = DistancePolicy::WeightedEuclidean {
            camera_position: [0.0; 3],
            focal_axis: [0.0, 1.0, 0.5],
        };
        assert_eq!(weighted.contributing_axes(), vec![Axis::Y, Axis::Z]);

        let normalized = DistancePolicy::NormalizedAxis {
            axis: Axis::X,
            range: None,
        };
        assert_eq!(normalized.contributing_axes(), vec![Axis::X]);
    }
}
