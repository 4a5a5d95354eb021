//! Motion subsystem collaborator.
//!
//! The host firmware owns the toolhead. This crate only reads positions and
//! homing state, and asks for plain moves and dwells during calibration.

pub mod sim;

use std::collections::BTreeMap;
use std::future::Future;

use crate::error::Result;
use crate::model::{Axis, Position};

/// Commanded stepper positions keyed by stepper name (`stepper_x`, ...).
pub type RawPositions = BTreeMap<String, f64>;

/// A move request: `None` leaves that axis where it is.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoveTarget {
    pub coords: [Option<f64>; 3],
}

impl MoveTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, axis: Axis, value: f64) -> Self {
        self.coords[axis.index()] = Some(value);
        self
    }

    /// Fill the unspecified axes from `current`.
    pub fn resolve(&self, current: &Position) -> Position {
        let mut out = *current;
        for (slot, coord) in out.iter_mut().zip(self.coords) {
            if let Some(value) = coord {
                *slot = value;
            }
        }
        out
    }
}

impl std::fmt::Display for MoveTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for axis in Axis::ALL {
            if let Some(value) = self.coords[axis.index()] {
                if !first {
                    write!(f, " ")?;
                }
                write!(f, "{}={value:.3}", axis.letter())?;
                first = false;
            }
        }
        Ok(())
    }
}

/// What the focus controller needs from the printer's motion subsystem.
///
/// Queries are synchronous snapshots of host state. Moves and dwells
/// resolve once the toolhead has physically finished them, suspending only
/// the awaiting task.
pub trait Motion {
    /// Commanded stepper positions.
    fn raw_positions(&self) -> Result<RawPositions>;

    /// Convert stepper positions into machine coordinates.
    fn forward_kinematics(&self, raw: &RawPositions) -> Result<Position>;

    /// `(min, max)` travel of an axis.
    fn axis_limits(&self, axis: Axis) -> (f64, f64);

    fn is_axis_homed(&self, axis: Axis) -> bool;

    fn manual_move(&self, target: MoveTarget, speed: f64) -> impl Future<Output = Result<()>>;

    fn wait_for_moves(&self) -> impl Future<Output = Result<()>>;

    fn dwell(&self, seconds: f64) -> impl Future<Output = Result<()>>;

    /// Current machine position.
    fn current_position(&self) -> Result<Position> {
        let raw = self.raw_positions()?;
        self.forward_kinematics(&raw)
    }
}
