//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use webcam_focus::camera::{CameraControl, CameraError};
use webcam_focus::command::Console;
use webcam_focus::config::FocusConfig;
use webcam_focus::engine::WebcamFocus;
use webcam_focus::error::{Error, Result};
use webcam_focus::model::{Axis, CalibrationPoint, Position};
use webcam_focus::motion::{Motion, MoveTarget, RawPositions};
use webcam_focus::tracker::DistancePolicy;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Motion
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MotionState {
    position: Position,
    homed: [bool; 3],
    moves: Vec<MoveTarget>,
    dwells: Vec<f64>,
    /// Test positions (scan-axis coordinate) whose move fails.
    fail_moves_to: Vec<f64>,
}

/// Cartesian toolhead whose moves finish instantly and whose dwells sleep
/// on the tokio clock.
#[derive(Debug)]
pub struct FakeMotion {
    limits: [(f64, f64); 3],
    state: Mutex<MotionState>,
}

impl FakeMotion {
    pub fn new() -> Self {
        Self {
            limits: [(0.0, 300.0), (0.0, 400.0), (0.0, 300.0)],
            state: Mutex::new(MotionState::default()),
        }
    }

    pub fn home_all(&self) {
        self.state.lock().unwrap().homed = [true; 3];
    }

    pub fn home(&self, axis: Axis) {
        self.state.lock().unwrap().homed[axis.index()] = true;
    }

    pub fn set_position(&self, position: Position) {
        self.state.lock().unwrap().position = position;
    }

    pub fn fail_move_to(&self, y: f64) {
        self.state.lock().unwrap().fail_moves_to.push(y);
    }

    pub fn moves(&self) -> Vec<MoveTarget> {
        self.state.lock().unwrap().moves.clone()
    }

    pub fn dwells(&self) -> Vec<f64> {
        self.state.lock().unwrap().dwells.clone()
    }
}

impl Motion for FakeMotion {
    fn raw_positions(&self) -> Result<RawPositions> {
        let state = self.state.lock().unwrap();
        Ok(Axis::ALL
            .iter()
            .map(|axis| (format!("stepper_{axis}"), state.position[axis.index()]))
            .collect())
    }

    fn forward_kinematics(&self, raw: &RawPositions) -> Result<Position> {
        let mut position = [0.0; 3];
        for axis in Axis::ALL {
            position[axis.index()] = raw[&format!("stepper_{axis}")];
        }
        Ok(position)
    }

    fn axis_limits(&self, axis: Axis) -> (f64, f64) {
        self.limits[axis.index()]
    }

    fn is_axis_homed(&self, axis: Axis) -> bool {
        self.state.lock().unwrap().homed[axis.index()]
    }

    async fn manual_move(&self, target: MoveTarget, _speed: f64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(y) = target.coords[Axis::Y.index()] {
            if state.fail_moves_to.contains(&y) {
                return Err(Error::Motion(format!("move to y={y} refused")));
            }
        }
        state.position = target.resolve(&state.position);
        state.moves.push(target);
        Ok(())
    }

    async fn wait_for_moves(&self) -> Result<()> {
        Ok(())
    }

    async fn dwell(&self, seconds: f64) -> Result<()> {
        self.state.lock().unwrap().dwells.push(seconds);
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CameraState {
    sets: Vec<(String, i64)>,
    /// Scripted query results; `None` is an unreadable value. An empty
    /// script reports the control as unknown.
    queries: VecDeque<Option<i64>>,
    fail_sets: bool,
}

#[derive(Debug, Default)]
pub struct FakeCamera {
    state: Mutex<CameraState>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_queries(&self, values: impl IntoIterator<Item = Option<i64>>) {
        self.state.lock().unwrap().queries.extend(values);
    }

    pub fn fail_sets(&self, fail: bool) {
        self.state.lock().unwrap().fail_sets = fail;
    }

    pub fn sets(&self) -> Vec<(String, i64)> {
        self.state.lock().unwrap().sets.clone()
    }

    /// Values set on one property, in order.
    pub fn values_of(&self, property: &str) -> Vec<i64> {
        self.sets()
            .into_iter()
            .filter(|(p, _)| p == property)
            .map(|(_, v)| v)
            .collect()
    }

    pub fn clear_sets(&self) {
        self.state.lock().unwrap().sets.clear();
    }
}

impl CameraControl for FakeCamera {
    async fn set(&self, property: &str, value: i64) -> std::result::Result<(), CameraError> {
        let mut state = self.state.lock().unwrap();
        state.sets.push((property.to_string(), value));
        if state.fail_sets {
            return Err(CameraError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "VIDIOC_S_EXT_CTRLS: failed".to_string(),
            });
        }
        Ok(())
    }

    async fn query(&self, property: &str) -> std::result::Result<i64, CameraError> {
        match self.state.lock().unwrap().queries.pop_front() {
            Some(Some(value)) => Ok(value),
            Some(None) => Err(CameraError::Unparsable(format!("{property} value missing"))),
            None => Err(CameraError::UnknownControl(property.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub const FOCUS: &str = "focus_absolute";
pub const AUTOFOCUS: &str = "focus_auto";

/// Distance is the Y coordinate normalized over the 0..400 travel.
pub fn config() -> FocusConfig {
    let mut config = FocusConfig::default();
    config.distance = DistancePolicy::NormalizedAxis {
        axis: Axis::Y,
        range: None,
    };
    config.calibration.wipe_dwell = 1.0;
    config.calibration.focus_dwell = 8.0;
    config.calibration.hold = [Some(250.0), None, None];
    config
}

pub fn sample_points() -> Vec<CalibrationPoint> {
    vec![
        CalibrationPoint::new(0.16, 250),
        CalibrationPoint::new(0.34, 80),
        CalibrationPoint::new(0.5, 77),
        CalibrationPoint::new(0.65, 55),
        CalibrationPoint::new(0.8, 53),
        CalibrationPoint::new(1.0, 50),
    ]
}

pub struct Harness {
    pub motion: Arc<FakeMotion>,
    pub camera: Arc<FakeCamera>,
    pub responses: mpsc::UnboundedReceiver<String>,
}

impl Harness {
    /// Every response emitted so far.
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(line) = self.responses.try_recv() {
            out.push(line);
        }
        out
    }
}

pub fn engine(config: FocusConfig) -> (WebcamFocus<FakeMotion, FakeCamera>, Harness) {
    let motion = Arc::new(FakeMotion::new());
    let camera = Arc::new(FakeCamera::new());
    let (console, responses) = Console::channel();
    let focus = WebcamFocus::new(config, Arc::clone(&motion), Arc::clone(&camera), console);
    (
        focus,
        Harness {
            motion,
            camera,
            responses,
        },
    )
}
