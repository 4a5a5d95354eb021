//! Focus engine: controller state machine, calibration scans and the loop
//! that drives them.

pub mod calibrate;
pub mod control;
pub mod controller;
pub mod focus;

pub use calibrate::{CalibrationDriver, CalibrationOutcome, ScanPlan};
pub use control::{ControlHandle, ControlLoop, HostEvent};
pub use controller::{ArmOutcome, FocusController};
pub use focus::{CalibrationTask, WebcamFocus};
