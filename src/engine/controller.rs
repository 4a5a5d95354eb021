//! Focus controller state machine.
//!
//! Pure state: whether position-derived focus is in charge, and the last
//! value handed to the camera. The engine feeds it readiness facts and
//! mapper evaluations and performs whatever side effects it asks for.

use crate::mapper::FocusMapper;
use crate::model::ControlState;

/// Result of an arm attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// Just became active. The caller turns camera auto-focus off and
    /// announces the switch.
    Activated,
    AlreadyActive,
    /// Mapper ready, waiting for the contributing axes to home.
    Armed,
    /// No mapper. Nothing to arm.
    NotReady,
    /// A calibration scan owns the camera. The scan re-arms when it ends.
    Calibrating,
}

#[derive(Debug, Clone)]
pub struct FocusController {
    state: ControlState,
    last_sent: Option<i32>,
    min_focus: i32,
    max_focus: i32,
    shut_down: bool,
}

impl FocusController {
    pub fn new(min_focus: i32, max_focus: i32) -> Self {
        Self {
            state: ControlState::Disabled,
            last_sent: None,
            min_focus,
            max_focus,
            shut_down: false,
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Last value the controller decided to send.
    pub fn last_sent(&self) -> Option<i32> {
        self.last_sent
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Move towards `Active` as far as readiness allows.
    ///
    /// Without a mapper an active controller falls back to `Disabled`; a
    /// disabled or armed one is left alone.
    pub fn try_arm(&mut self, mapper_ready: bool, homed: bool) -> ArmOutcome {
        if self.shut_down {
            return ArmOutcome::NotReady;
        }
        match (mapper_ready, homed) {
            (false, _) => {
                if self.state.is_active() {
                    self.state = ControlState::Disabled;
                }
                ArmOutcome::NotReady
            }
            (true, false) => {
                if self.state.is_active() {
                    return ArmOutcome::AlreadyActive;
                }
                self.state = ControlState::Armed;
                ArmOutcome::Armed
            }
            (true, true) => {
                if self.state.is_active() {
                    return ArmOutcome::AlreadyActive;
                }
                self.state = ControlState::Active;
                self.last_sent = None;
                ArmOutcome::Activated
            }
        }
    }

    /// Hand focus back to the camera or the user.
    pub fn disable(&mut self) {
        self.state = ControlState::Disabled;
    }

    /// Stop for good. Later ticks and arm attempts do nothing.
    pub fn shutdown(&mut self) {
        self.shut_down = true;
        self.state = ControlState::Disabled;
    }

    pub fn clamp(&self, focus: i32) -> i32 {
        focus.clamp(self.min_focus, self.max_focus)
    }

    /// Decide the focus value for this tick.
    ///
    /// Returns `Some(value)` when the camera should be told something new.
    /// The value is recorded as sent before it is returned, so a failing
    /// camera is not retried with the same value.
    pub fn tick(&mut self, mapper: Option<&FocusMapper>, distance: Option<f64>) -> Option<i32> {
        if self.shut_down || !self.state.is_active() {
            return None;
        }
        let focus = self.clamp(mapper?.evaluate(distance?));
        if self.last_sent == Some(focus) {
            return None;
        }
        self.last_sent = Some(focus);
        Some(focus)
    }
}
