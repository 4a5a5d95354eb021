//! Control loop: one task interleaving the position poll, the focus tick,
//! host events, commands and at most one calibration scan.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{Instrument, error, info, warn};

use crate::camera::CameraControl;
use crate::error::Result;
use crate::motion::Motion;

use super::focus::{CalibrationTask, WebcamFocus};

/// Lifecycle signals from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    Ready,
    HomeComplete,
    /// Printer shutdown. Focus control stops for good.
    Shutdown,
}

/// Feeds the control loop from other tasks.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    commands: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedSender<HostEvent>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ControlHandle {
    /// Queue a command line. Returns false once the loop is gone.
    pub fn command(&self, line: impl Into<String>) -> bool {
        self.commands.send(line.into()).is_ok()
    }

    pub fn event(&self, event: HostEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Stop the loop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

pub struct ControlLoop<M, C> {
    focus: WebcamFocus<M, C>,
    commands: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedReceiver<HostEvent>,
    shutdown: watch::Receiver<bool>,
}

impl<M, C> ControlLoop<M, C>
where
    M: Motion + 'static,
    C: CameraControl + 'static,
{
    pub fn new(focus: WebcamFocus<M, C>) -> (Self, ControlHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown) = watch::channel(false);
        let handle = ControlHandle {
            commands: commands_tx,
            events: events_tx,
            shutdown: Arc::new(shutdown_tx),
        };
        let control = Self {
            focus,
            commands,
            events,
            shutdown,
        };
        (control, handle)
    }

    pub fn focus(&self) -> &WebcamFocus<M, C> {
        &self.focus
    }

    /// Run until [`ControlHandle::shutdown`] or until every handle is dropped.
    /// Returns the engine so callers can inspect its final state.
    pub async fn run(mut self) -> Result<WebcamFocus<M, C>> {
        let span = self.focus.span().clone();
        async move {
            let mut position_tick = time::interval(self.focus.config().position_poll_interval);
            position_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut focus_tick = time::interval(self.focus.config().update_interval);
            focus_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut calibration: Option<CalibrationTask> = None;
            let mut events_open = true;

            info!("webcam focus control loop started");

            loop {
                tokio::select! {
                    changed = self.shutdown.changed() => {
                        if changed.is_err() || *self.shutdown.borrow() {
                            info!("webcam focus control loop shutting down");
                            break;
                        }
                    }
                    event = self.events.recv(), if events_open => {
                        match event {
                            Some(HostEvent::Ready) => {
                                if let Err(e) = self.focus.handle_ready().await {
                                    error!("ready handling failed: {e}");
                                    self.focus.console().respond_error(&e);
                                }
                            }
                            Some(HostEvent::HomeComplete) => self.focus.handle_home_complete().await,
                            Some(HostEvent::Shutdown) => {
                                self.focus.handle_shutdown();
                                if calibration.take().is_some() {
                                    warn!("calibration dropped by shutdown");
                                }
                            }
                            None => events_open = false,
                        }
                    }
                    line = self.commands.recv() => {
                        let Some(line) = line else {
                            info!("command channel closed, stopping");
                            break;
                        };
                        if let Some(task) = self.focus.handle_line(&line).await {
                            calibration = Some(task);
                        }
                    }
                    outcome = async {
                        match calibration.as_mut() {
                            Some(task) => task.await,
                            None => std::future::pending().await,
                        }
                    }, if calibration.is_some() => {
                        calibration = None;
                        self.focus.finish_calibration(outcome).await;
                    }
                    _ = position_tick.tick() => self.focus.poll_position(),
                    _ = focus_tick.tick() => self.focus.update_focus().await,
                }
            }

            Ok(self.focus)
        }
        .instrument(span)
        .await
    }
}
