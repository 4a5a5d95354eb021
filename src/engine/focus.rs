//! Webcam focus engine: sample store, mapper, tracker and controller wired to
//! the camera, the toolhead and the command surface.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tokio::sync::watch;
use tracing::{Span, debug, info, warn};

use crate::camera::CameraControl;
use crate::command::{self, CommandLine, Console};
use crate::config::FocusConfig;
use crate::error::{Error, Result};
use crate::mapper::FocusMapper;
use crate::model::{CalibrationPoint, ControlState, FocusStatus};
use crate::motion::Motion;
use crate::plot;
use crate::store::SampleStore;
use crate::telemetry::focus::{record_state_transition, start_focus_span};
use crate::telemetry::metrics;
use crate::tracker::PositionTracker;

use super::calibrate::{CalibrationDriver, CalibrationOutcome, ScanPlan};
use super::controller::{ArmOutcome, FocusController};

/// A calibration scan handed to the control loop to drive.
pub type CalibrationTask = Pin<Box<dyn Future<Output = CalibrationOutcome>>>;

pub struct WebcamFocus<M, C> {
    config: FocusConfig,
    motion: Arc<M>,
    camera: Arc<C>,
    console: Console,
    store: SampleStore,
    mapper: Option<Arc<FocusMapper>>,
    tracker: PositionTracker,
    controller: FocusController,
    last_manual_focus: Option<i32>,
    last_update: Option<DateTime<Utc>>,
    ready: bool,
    calibrating: bool,
    halt: watch::Sender<bool>,
    span: Span,
}

impl<M, C> WebcamFocus<M, C>
where
    M: Motion + 'static,
    C: CameraControl + 'static,
{
    /// Seed the sample store from the configured mappings. Nothing talks to
    /// the camera or the toolhead until [`Self::handle_ready`].
    pub fn new(config: FocusConfig, motion: Arc<M>, camera: Arc<C>, console: Console) -> Self {
        let store = SampleStore::from_points(config.focus_mappings.iter().copied());
        let tracker = PositionTracker::new(config.distance.clone());
        let controller = FocusController::new(config.min_focus, config.max_focus);
        let span = start_focus_span(&config.device.display().to_string());
        let (halt, _) = watch::channel(false);
        let mut focus = Self {
            config,
            motion,
            camera,
            console,
            store,
            mapper: None,
            tracker,
            controller,
            last_manual_focus: None,
            last_update: None,
            ready: false,
            calibrating: false,
            halt,
            span,
        };
        focus.rebuild_mapper();
        focus
    }

    pub fn config(&self) -> &FocusConfig {
        &self.config
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn mapper(&self) -> Option<&FocusMapper> {
        self.mapper.as_deref()
    }

    pub fn state(&self) -> ControlState {
        self.controller.state()
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrating
    }

    pub fn is_shut_down(&self) -> bool {
        self.controller.is_shut_down()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn status(&self) -> FocusStatus {
        FocusStatus {
            state: self.controller.state(),
            focus: self.controller.last_sent(),
            distance: self.tracker.distance(),
            points: self.store.len(),
            mapper_ready: self.mapper.is_some(),
            calibrating: self.calibrating,
            last_update: self.last_update,
        }
    }

    // -----------------------------------------------------------------------
    // Host lifecycle
    // -----------------------------------------------------------------------

    /// The host is up: resolve the distance policy, hand focus to the camera
    /// until homing completes, then try to take over.
    pub async fn handle_ready(&mut self) -> Result<()> {
        let reducer = self.tracker.attach(self.motion.as_ref())?;
        debug!(?reducer, "position tracker attached");
        self.ready = true;
        self.set_autofocus(true).await;
        self.try_enable_focus_control().await;
        Ok(())
    }

    pub async fn handle_home_complete(&mut self) {
        self.try_enable_focus_control().await;
    }

    /// Stop everything. Any running calibration is abandoned at its next step.
    pub fn handle_shutdown(&mut self) {
        let from = self.controller.state();
        self.controller.shutdown();
        self.halt.send_replace(true);
        self.calibrating = false;
        self.transition(from);
        info!("webcam focus shut down");
    }

    // -----------------------------------------------------------------------
    // Periodic work
    // -----------------------------------------------------------------------

    /// Refresh the tracked position. Runs on the position interval.
    pub fn poll_position(&mut self) {
        if !self.ready || self.is_shut_down() {
            return;
        }
        if let Err(e) = self.tracker.poll(self.motion.as_ref()) {
            warn!("position poll failed: {e}");
        }
    }

    /// Push the mapped focus to the camera if it changed. Runs on the focus
    /// interval.
    pub async fn update_focus(&mut self) {
        let Some(focus) = self
            .controller
            .tick(self.mapper.as_deref(), self.tracker.distance())
        else {
            return;
        };
        self.last_update = Some(Utc::now());
        debug!(focus, distance = ?self.tracker.distance(), "updating focus");
        self.set_focus(focus, "mapper").await;
    }

    /// Contributing axes are all homed.
    pub fn homed(&self) -> bool {
        self.ready
            && self
                .tracker
                .policy()
                .contributing_axes()
                .into_iter()
                .all(|axis| self.motion.is_axis_homed(axis))
    }

    pub async fn try_enable_focus_control(&mut self) -> ArmOutcome {
        if self.calibrating {
            debug!("calibration in progress, not arming focus control");
            return ArmOutcome::Calibrating;
        }
        let from = self.controller.state();
        let (mapper_ready, homed) = (self.mapper.is_some(), self.homed());
        let outcome = self.controller.try_arm(mapper_ready, homed);
        self.transition(from);
        if outcome == ArmOutcome::Activated {
            self.set_autofocus(false).await;
            self.console
                .respond("enabling position derived webcam focus");
        }
        outcome
    }

    fn disable_focus_control(&mut self) {
        let from = self.controller.state();
        self.controller.disable();
        self.transition(from);
    }

    fn transition(&self, from: ControlState) {
        let to = self.controller.state();
        if from != to {
            record_state_transition(&self.span, from, to);
        }
    }

    /// Build a fresh mapper from the store and swap it in.
    fn rebuild_mapper(&mut self) {
        self.mapper = FocusMapper::build(&self.store.snapshot()).map(Arc::new);
        debug!(
            points = self.store.len(),
            ready = self.mapper.is_some(),
            "focus mapper rebuilt"
        );
    }

    // -----------------------------------------------------------------------
    // Camera helpers: failures are logged and counted, never fatal
    // -----------------------------------------------------------------------

    async fn set_control(&self, property: &str, value: i64) -> bool {
        match self.camera.set(property, value).await {
            Ok(()) => true,
            Err(e) => {
                warn!(property, value, "camera set failed: {e}");
                metrics::camera_errors().add(1, &[KeyValue::new("operation", "set")]);
                false
            }
        }
    }

    async fn query_control(&self, property: &str) -> Option<i64> {
        match self.camera.query(property).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(property, "camera query failed: {e}");
                metrics::camera_errors().add(1, &[KeyValue::new("operation", "query")]);
                None
            }
        }
    }

    async fn set_focus(&self, focus: i32, source: &'static str) {
        if self
            .set_control(&self.config.focus_property, i64::from(focus))
            .await
        {
            metrics::focus_commands().add(1, &[KeyValue::new("source", source)]);
        }
    }

    async fn set_autofocus(&self, enabled: bool) {
        self.set_control(&self.config.autofocus_property, i64::from(enabled))
            .await;
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Parse and run one command line, reporting any failure on the console.
    /// Returns a calibration scan for the caller to drive, if one was started.
    pub async fn handle_line(&mut self, line: &str) -> Option<CalibrationTask> {
        let result = match CommandLine::parse(line) {
            Ok(cmd) => self.dispatch(&cmd).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            debug!(line, "command failed: {e}");
            self.console.respond_error(&e);
            None
        })
    }

    pub async fn dispatch(&mut self, cmd: &CommandLine) -> Result<Option<CalibrationTask>> {
        if self.is_shut_down() {
            return Err(Error::Command("webcam focus is shut down".to_string()));
        }
        match cmd.name.as_str() {
            command::WEBCAM_SETTINGS => self.cmd_settings(cmd).await?,
            command::WEBCAM_FOCUS_CLEAR => self.cmd_clear(),
            command::WEBCAM_FOCUS_SAVE => self.cmd_save(cmd)?,
            command::WEBCAM_FOCUS_MAPPER => self.cmd_mapper(cmd)?,
            command::WEBCAM_FOCUS_CALIBRATE => return self.cmd_calibrate(cmd).await.map(Some),
            command::WEBCAM_FOCUS_ENABLE => self.cmd_enable().await,
            command::WEBCAM_FOCUS_STATUS => self.cmd_status()?,
            other => return Err(Error::Command(format!("Unknown command: \"{other}\""))),
        }
        Ok(None)
    }

    async fn cmd_settings(&mut self, cmd: &CommandLine) -> Result<()> {
        let focus = focus_param(cmd)?;
        let auto = cmd.get_int("FOCUS_AUTO")?;

        if focus.is_none() && auto.is_none() {
            let value = self
                .query_control(&self.config.focus_property)
                .await
                .ok_or_else(|| Error::Command("unable to read the camera focus".to_string()))?;
            self.console.respond(format!("focus {value}"));
            return Ok(());
        }

        self.disable_focus_control();
        if let Some(auto) = auto {
            self.console.respond(if auto != 0 {
                "enabling auto-focus"
            } else {
                "disabling auto-focus"
            });
            self.set_control(&self.config.autofocus_property, auto).await;
        }
        if let Some(value) = focus {
            self.last_manual_focus = Some(value);
            self.console.respond(format!("Setting focus to {value}"));
            self.set_focus(value, "manual").await;
        }
        Ok(())
    }

    fn cmd_clear(&mut self) {
        self.disable_focus_control();
        self.store.clear();
        self.rebuild_mapper();
        self.console.respond("focus mappings cleared");
    }

    fn cmd_save(&mut self, cmd: &CommandLine) -> Result<()> {
        let focus = match focus_param(cmd)? {
            Some(f) => f,
            None => self.last_manual_focus.ok_or_else(|| {
                Error::Command(
                    "Missing FOCUS_ABSOLUTE parameter and no previous setting has been made"
                        .to_string(),
                )
            })?,
        };
        let distance = match cmd.get_float("D")? {
            Some(d) => d,
            None => self.tracker.distance().ok_or_else(|| {
                Error::Command(
                    "Missing D parameter (probably you have not homed yet)".to_string(),
                )
            })?,
        };

        self.store.add(distance, focus);
        self.rebuild_mapper();
        let point = CalibrationPoint::new(distance, focus);
        info!(%point, points = self.store.len(), "focus mapping saved");
        self.console.respond(format!("saved focus mapping {point}"));
        Ok(())
    }

    fn cmd_mapper(&self, cmd: &CommandLine) -> Result<()> {
        let graph = cmd.get_int("GRAPH")?.unwrap_or(0);
        if let Some(distance) = cmd.get_float("D")? {
            let mapper = self
                .mapper
                .as_deref()
                .ok_or_else(|| Error::Command("focus mapper not ready".to_string()))?;
            let value = mapper.evaluate(distance);
            self.console
                .respond(format!("focal distance {distance:.6} value {value}"));
            return Ok(());
        }

        let points = self.store.snapshot();
        let listed: Vec<String> = points.iter().map(ToString::to_string).collect();
        self.console
            .respond(format!("focus_mappings: {}", listed.join(", ")));

        if graph > 0 {
            match plot::render_mapper(&self.config.graph_path, &points, self.mapper.as_deref()) {
                Ok(()) => self.console.respond(format!(
                    "focus mapper graph written to {}",
                    self.config.graph_path.display()
                )),
                Err(e) => {
                    warn!("focus mapper graph failed: {e}");
                    self.console.respond_error(&e);
                }
            }
        }
        Ok(())
    }

    async fn cmd_enable(&mut self) {
        match self.try_enable_focus_control().await {
            ArmOutcome::Activated => {}
            ArmOutcome::AlreadyActive => self
                .console
                .respond("position derived webcam focus already enabled"),
            ArmOutcome::Armed => self
                .console
                .respond("focus mapper ready, waiting for homing"),
            ArmOutcome::NotReady => self.console.respond("focus mapper not ready"),
            ArmOutcome::Calibrating => self.console.respond("calibration in progress"),
        }
    }

    fn cmd_status(&self) -> Result<()> {
        let status = serde_json::to_string(&self.status())
            .map_err(|e| Error::Other(format!("serialize status: {e}")))?;
        self.console.respond(status);
        Ok(())
    }

    async fn cmd_calibrate(&mut self, cmd: &CommandLine) -> Result<CalibrationTask> {
        let plan = self.prepare_calibration(cmd).await?;
        let reducer = self
            .tracker
            .reducer()
            .ok_or_else(|| Error::Command("printer is not ready".to_string()))?;
        let driver = CalibrationDriver::new(
            Arc::clone(&self.motion),
            Arc::clone(&self.camera),
            self.console.clone(),
            reducer,
            self.config.focus_property.clone(),
            self.halt.subscribe(),
        );
        info!(run_id = %driver.run_id(), positions = plan.positions.len(), "starting calibration");
        Ok(Box::pin(driver.run(plan)))
    }

    /// Validate the scan and put the camera in charge of focus.
    async fn prepare_calibration(&mut self, cmd: &CommandLine) -> Result<ScanPlan> {
        if self.calibrating {
            return Err(Error::Command("calibration already in progress".to_string()));
        }
        if !self.ready {
            return Err(Error::Command("printer is not ready".to_string()));
        }
        let limits = self.motion.axis_limits(self.config.calibration.axis);
        let plan = ScanPlan::new(&self.config.calibration, limits, cmd)?;

        self.calibrating = true;
        self.disable_focus_control();
        self.console.respond("enabling auto-focus");
        for (property, value) in &self.config.calibration.pre_scan_controls {
            self.set_control(property, *value).await;
        }
        self.set_autofocus(true).await;
        Ok(plan)
    }

    /// Commit a finished scan and hand focus back to the mapper. With too few
    /// points the existing samples and mapper stay as they were.
    pub async fn finish_calibration(&mut self, outcome: CalibrationOutcome) {
        self.calibrating = false;
        if self.is_shut_down() {
            return;
        }
        if outcome.points.len() >= FocusMapper::MIN_POINTS {
            self.store.replace(&outcome.points);
            self.rebuild_mapper();
        } else {
            warn!(
                run_id = %outcome.run_id,
                points = outcome.points.len(),
                "too few calibration points, keeping previous focus mappings"
            );
        }
        self.try_enable_focus_control().await;
        info!(
            run_id = %outcome.run_id,
            points = outcome.points.len(),
            skipped = outcome.skipped,
            aborted = outcome.aborted,
            elapsed_s = (outcome.finished_at - outcome.started_at).num_milliseconds() as f64 / 1000.0,
            "calibration finished"
        );
        self.console.respond("finished auto-focus calibration");
    }
}

/// `FOCUS_ABSOLUTE` rounded to the nearest integer. Values that do not fit a
/// focus are refused rather than saturated.
fn focus_param(cmd: &CommandLine) -> Result<Option<i32>> {
    let Some(raw) = cmd.get_float("FOCUS_ABSOLUTE")? else {
        return Ok(None);
    };
    let rounded = raw.round();
    if rounded < f64::from(i32::MIN) || rounded > f64::from(i32::MAX) {
        return Err(Error::Command(format!(
            "FOCUS_ABSOLUTE ({raw}) is outside the focus range {}..={}",
            i32::MIN,
            i32::MAX
        )));
    }
    Ok(Some(rounded as i32))
}
