//! Calibration driver: scan the toolhead along one axis and record the focus
//! the camera's own auto-focus settles on at each stop.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tokio::sync::watch;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

use crate::camera::{CameraControl, CameraError};
use crate::command::{CommandLine, Console};
use crate::config::CalibrationConfig;
use crate::error::{Error, Result};
use crate::model::{Axis, CalibrationPoint};
use crate::motion::{Motion, MoveTarget};
use crate::telemetry::focus::start_calibration_span;
use crate::telemetry::metrics;
use crate::tracker::DistanceReducer;

/// Where and how to scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    pub axis: Axis,
    /// Test positions on the scan axis, in visiting order.
    pub positions: Vec<f64>,
    pub move_speed: f64,
    pub wipe_dwell: f64,
    pub focus_dwell: f64,
    /// Wipe moves go to whichever end of this range is farther away.
    pub wipe_range: (f64, f64),
    pub hold: [Option<f64>; 3],
}

impl ScanPlan {
    /// Build a plan from `{AXIS}_MIN`, `{AXIS}_MAX`, `{AXIS}_STEP` and
    /// `MOVE_SPEED`, falling back to the axis travel `limits` and the
    /// configured defaults. The scan range must lie within `limits`.
    pub fn new(config: &CalibrationConfig, limits: (f64, f64), cmd: &CommandLine) -> Result<Self> {
        let axis = config.axis;
        let letter = axis.letter();
        let param = |suffix: &str| -> Result<Option<f64>> {
            Ok(cmd.get_int(&format!("{letter}_{suffix}"))?.map(|v| v as f64))
        };

        let (lo, hi) = limits;
        let min = param("MIN")?.unwrap_or(lo);
        let max = param("MAX")?.unwrap_or(hi);
        for (name, value) in [("MIN", min), ("MAX", max)] {
            if value < lo || value > hi {
                return Err(Error::Command(format!(
                    "{letter}_{name} ({value}) is outside the {letter} axis travel {lo}..{hi}"
                )));
            }
        }
        if min >= max {
            return Err(Error::Command(format!(
                "{letter}_MIN ({min}) must be less than {letter}_MAX ({max})"
            )));
        }
        let step = param("STEP")?.unwrap_or((max - min) / f64::from(config.steps));
        if step <= 0.0 {
            return Err(Error::Command(format!(
                "{letter}_STEP must be positive, got {step}"
            )));
        }
        let move_speed = match cmd.get_int("MOVE_SPEED")? {
            Some(speed) if speed <= 0 => {
                return Err(Error::Command(format!(
                    "MOVE_SPEED must be positive, got {speed}"
                )));
            }
            Some(speed) => speed as f64,
            None => config.move_speed,
        };

        let positions: Vec<f64> = (0u32..)
            .map(|i| min + step * f64::from(i))
            .take_while(|p| *p < max)
            .collect();

        let wipe_range = if hi - lo > 2.0 * config.wipe_margin {
            (lo + config.wipe_margin, hi - config.wipe_margin)
        } else {
            limits
        };

        Ok(Self {
            axis,
            positions,
            move_speed,
            wipe_dwell: config.wipe_dwell,
            focus_dwell: config.focus_dwell,
            wipe_range,
            hold: config.hold,
        })
    }

    /// Scan-axis coordinate of the wipe stop for test position `p`.
    pub fn wipe_position(&self, p: f64) -> f64 {
        let (lo, hi) = self.wipe_range;
        if (p - lo).abs() > (hi - p).abs() {
            lo
        } else {
            hi
        }
    }

    pub fn wipe_target(&self, p: f64) -> MoveTarget {
        self.held().with(self.axis, self.wipe_position(p))
    }

    pub fn test_target(&self, p: f64) -> MoveTarget {
        self.held().with(self.axis, p)
    }

    fn held(&self) -> MoveTarget {
        MoveTarget { coords: self.hold }
    }
}

/// What a calibration run produced. Committing it is the caller's job.
#[derive(Debug, Clone)]
pub struct CalibrationOutcome {
    pub run_id: Uuid,
    /// Points in scan order.
    pub points: Vec<CalibrationPoint>,
    pub skipped: usize,
    /// Stopped early by a shutdown.
    pub aborted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Runs one scan. Owns its collaborators so it can make progress while the
/// periodic ticks keep running.
pub struct CalibrationDriver<M, C> {
    motion: Arc<M>,
    camera: Arc<C>,
    console: Console,
    reducer: DistanceReducer,
    focus_property: String,
    halt: watch::Receiver<bool>,
    run_id: Uuid,
}

impl<M: Motion, C: CameraControl> CalibrationDriver<M, C> {
    pub fn new(
        motion: Arc<M>,
        camera: Arc<C>,
        console: Console,
        reducer: DistanceReducer,
        focus_property: impl Into<String>,
        halt: watch::Receiver<bool>,
    ) -> Self {
        Self {
            motion,
            camera,
            console,
            reducer,
            focus_property: focus_property.into(),
            halt,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Visit every test position. Failed steps are skipped; a halt signal
    /// stops the scan before the next step.
    pub async fn run(self, plan: ScanPlan) -> CalibrationOutcome {
        let span = start_calibration_span(&self.run_id, &plan.axis.to_string(), plan.positions.len());
        async {
            let started_at = Utc::now();
            let start = Instant::now();
            let mut points = Vec::new();
            let mut skipped = 0;
            let mut aborted = false;
            info!(positions = plan.positions.len(), speed = plan.move_speed, "calibration started");

            for &p in &plan.positions {
                if *self.halt.borrow() {
                    warn!("calibration abandoned by shutdown");
                    aborted = true;
                    break;
                }
                match self.step(&plan, p).await {
                    Ok(point) => {
                        self.console.respond(format!("  focus {point}"));
                        metrics::calibration_points().add(1, &[KeyValue::new("result", "ok")]);
                        points.push(point);
                    }
                    Err(e) => {
                        warn!(position = p, "calibration step skipped: {e}");
                        metrics::calibration_points()
                            .add(1, &[KeyValue::new("result", "skipped")]);
                        skipped += 1;
                    }
                }
            }

            tracing::Span::current().record("calibration.points", points.len());
            metrics::calibration_duration_s().record(start.elapsed().as_secs_f64(), &[]);
            info!(points = points.len(), skipped, aborted, "calibration scan done");

            CalibrationOutcome {
                run_id: self.run_id,
                points,
                skipped,
                aborted,
                started_at,
                finished_at: Utc::now(),
            }
        }
        .instrument(span)
        .await
    }

    async fn step(&self, plan: &ScanPlan, p: f64) -> Result<CalibrationPoint> {
        let wipe = plan.wipe_target(p);
        self.motion.manual_move(wipe, plan.move_speed).await?;
        self.motion.wait_for_moves().await?;
        self.motion.dwell(plan.wipe_dwell).await?;

        let test = plan.test_target(p);
        self.motion.manual_move(test, plan.move_speed).await?;
        self.motion.wait_for_moves().await?;
        self.motion.dwell(plan.focus_dwell).await?;

        let focus = self.camera.query(&self.focus_property).await.inspect_err(|_| {
            metrics::camera_errors().add(1, &[KeyValue::new("operation", "query")]);
        })?;
        let focus = i32::try_from(focus).map_err(|_| {
            CameraError::Unparsable(format!("{} out of range: {focus}", self.focus_property))
        })?;

        let position = test.resolve(&self.motion.current_position()?);
        let distance = self.reducer.reduce(&position);
        debug!(position = p, distance, focus, "calibration point");
        Ok(CalibrationPoint::new(distance, focus))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CalibrationConfig {
        CalibrationConfig {
            wipe_margin: 50.0,
            steps: 10,
            ..CalibrationConfig::default()
        }
    }

    #[test]
    fn default_plan_covers_axis_travel() {
        let cmd = CommandLine::parse("WEBCAM_FOCUS_CALIBRATE").unwrap();
        let plan = ScanPlan::new(&config(), (0.0, 400.0), &cmd).unwrap();
        assert_eq!(plan.positions.len(), 10);
        assert_eq!(plan.positions[0], 0.0);
        assert_eq!(plan.positions[9], 360.0);
        assert_eq!(plan.wipe_range, (50.0, 350.0));
    }

    #[test]
    fn explicit_range_excludes_max() {
        let cmd =
            CommandLine::parse("WEBCAM_FOCUS_CALIBRATE Y_MIN=100 Y_MAX=200 Y_STEP=20 MOVE_SPEED=50")
                .unwrap();
        let plan = ScanPlan::new(&config(), (0.0, 400.0), &cmd).unwrap();
        assert_eq!(plan.positions, vec![100.0, 120.0, 140.0, 160.0, 180.0]);
        assert_eq!(plan.move_speed, 50.0);
    }

    #[test]
    fn rejects_empty_ranges() {
        for line in [
            "WEBCAM_FOCUS_CALIBRATE Y_MIN=200 Y_MAX=100",
            "WEBCAM_FOCUS_CALIBRATE Y_STEP=0",
            "WEBCAM_FOCUS_CALIBRATE Y_STEP=-5",
            "WEBCAM_FOCUS_CALIBRATE MOVE_SPEED=0",
        ] {
            let cmd = CommandLine::parse(line).unwrap();
            assert!(ScanPlan::new(&config(), (0.0, 400.0), &cmd).is_err(), "{line}");
        }
    }

    #[test]
    fn rejects_ranges_outside_axis_travel() {
        for (line, message) in [
            (
                "WEBCAM_FOCUS_CALIBRATE Y_MIN=0 Y_MAX=10000000000 Y_STEP=1",
                "Y_MAX (10000000000) is outside the Y axis travel 0..400",
            ),
            (
                "WEBCAM_FOCUS_CALIBRATE Y_MIN=-10 Y_MAX=200",
                "Y_MIN (-10) is outside the Y axis travel 0..400",
            ),
        ] {
            let cmd = CommandLine::parse(line).unwrap();
            let err = ScanPlan::new(&config(), (0.0, 400.0), &cmd).unwrap_err();
            assert_eq!(err.to_string(), message);
        }
    }

    #[test]
    fn range_may_span_the_whole_travel() {
        let cmd = CommandLine::parse("WEBCAM_FOCUS_CALIBRATE Y_MIN=0 Y_MAX=400 Y_STEP=100").unwrap();
        let plan = ScanPlan::new(&config(), (0.0, 400.0), &cmd).unwrap();
        assert_eq!(plan.positions, vec![0.0, 100.0, 200.0, 300.0]);
    }

    #[test]
    fn wipe_goes_to_the_far_end() {
        let cmd = CommandLine::parse("WEBCAM_FOCUS_CALIBRATE").unwrap();
        let plan = ScanPlan::new(&config(), (0.0, 400.0), &cmd).unwrap();
        assert_eq!(plan.wipe_position(80.0), 350.0);
        assert_eq!(plan.wipe_position(300.0), 50.0);
    }

    #[test]
    fn hold_coordinates_apply_to_both_stops() {
        let mut config = config();
        config.hold = [Some(250.0), None, None];
        let cmd = CommandLine::parse("WEBCAM_FOCUS_CALIBRATE").unwrap();
        let plan = ScanPlan::new(&config, (0.0, 400.0), &cmd).unwrap();
        assert_eq!(
            plan.test_target(120.0),
            MoveTarget::new().with(Axis::X, 250.0).with(Axis::Y, 120.0)
        );
        assert_eq!(plan.wipe_target(120.0).coords[0], Some(250.0));
    }
}
