//! Simulated cartesian toolhead.
//!
//! One stepper per axis (`stepper_x`, `stepper_y`, `stepper_z`), so forward
//! kinematics is the identity. Moves are checked against rail limits and
//! homing state, then take `distance / speed` seconds of wall time to finish.

use std::sync::Mutex;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{Motion, MoveTarget, RawPositions};
use crate::error::{Error, Result};
use crate::model::{Axis, Position};

/// Rail limits for the simulated machine (`[sim]` config section).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    #[serde(default = "default_xz_range")]
    pub x: [f64; 2],
    #[serde(default = "default_y_range")]
    pub y: [f64; 2],
    #[serde(default = "default_xz_range")]
    pub z: [f64; 2],
}

fn default_xz_range() -> [f64; 2] {
    [0.0, 300.0]
}

fn default_y_range() -> [f64; 2] {
    [0.0, 450.0]
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            x: default_xz_range(),
            y: default_y_range(),
            z: default_xz_range(),
        }
    }
}

#[derive(Debug)]
struct SimState {
    position: Position,
    homed: [bool; 3],
    /// Seconds of queued motion not yet waited for.
    pending: f64,
}

/// In-process toolhead used by the `serve` binary.
#[derive(Debug)]
pub struct SimToolhead {
    limits: [(f64, f64); 3],
    state: Mutex<SimState>,
}

impl SimToolhead {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            limits: [
                (config.x[0], config.x[1]),
                (config.y[0], config.y[1]),
                (config.z[0], config.z[1]),
            ],
            state: Mutex::new(SimState {
                position: [0.0; 3],
                homed: [false; 3],
                pending: 0.0,
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SimState>> {
        self.state
            .lock()
            .map_err(|_| Error::Motion("simulated toolhead state poisoned".to_string()))
    }

    /// Home the given axes: they snap to their minimum and become movable.
    pub fn home(&self, axes: &[Axis]) -> Result<()> {
        let mut state = self.lock()?;
        for &axis in axes {
            state.homed[axis.index()] = true;
            state.position[axis.index()] = self.limits[axis.index()].0;
            debug!(%axis, "simulated axis homed");
        }
        Ok(())
    }

    fn check_move(&self, state: &SimState, target: &MoveTarget) -> Result<()> {
        for axis in Axis::ALL {
            let Some(value) = target.coords[axis.index()] else {
                continue;
            };
            if !state.homed[axis.index()] {
                return Err(Error::Motion(format!(
                    "{} axis must be homed first",
                    axis.letter()
                )));
            }
            let (min, max) = self.limits[axis.index()];
            if value < min || value > max {
                return Err(Error::Motion(format!(
                    "Move out of range: {} {value:.3} (min: {min:.3}, max: {max:.3})",
                    axis.letter()
                )));
            }
        }
        Ok(())
    }
}

impl Motion for SimToolhead {
    fn raw_positions(&self) -> Result<RawPositions> {
        let state = self.lock()?;
        Ok(Axis::ALL
            .iter()
            .map(|axis| (format!("stepper_{axis}"), state.position[axis.index()]))
            .collect())
    }

    fn forward_kinematics(&self, raw: &RawPositions) -> Result<Position> {
        let mut position = [0.0; 3];
        for axis in Axis::ALL {
            let name = format!("stepper_{axis}");
            position[axis.index()] = *raw
                .get(&name)
                .ok_or_else(|| Error::Motion(format!("missing stepper {name}")))?;
        }
        Ok(position)
    }

    fn axis_limits(&self, axis: Axis) -> (f64, f64) {
        self.limits[axis.index()]
    }

    fn is_axis_homed(&self, axis: Axis) -> bool {
        self.lock()
            .map(|state| state.homed[axis.index()])
            .unwrap_or(false)
    }

    async fn manual_move(&self, target: MoveTarget, speed: f64) -> Result<()> {
        if speed <= 0.0 {
            return Err(Error::Motion(format!("invalid move speed {speed}")));
        }
        let mut state = self.lock()?;
        self.check_move(&state, &target)?;
        let end = target.resolve(&state.position);
        let travel = state
            .position
            .iter()
            .zip(end)
            .map(|(a, b)| (b - a).powi(2))
            .sum::<f64>()
            .sqrt();
        state.position = end;
        state.pending += travel / speed;
        debug!(%target, travel, "simulated move queued");
        Ok(())
    }

    async fn wait_for_moves(&self) -> Result<()> {
        let pending = {
            let mut state = self.lock()?;
            std::mem::take(&mut state.pending)
        };
        if pending > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(pending)).await;
        }
        Ok(())
    }

    async fn dwell(&self, seconds: f64) -> Result<()> {
        self.wait_for_moves().await?;
        if seconds > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        }
        Ok(())
    }
}
