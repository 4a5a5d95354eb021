//! Core data model.
//!
//! A calibration point pairs a scalar toolhead distance with the camera focus
//! value that was sharp at that distance. The controller state tracks who owns
//! the camera's focus: the camera itself, or the position-derived mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Axes and positions
// ---------------------------------------------------------------------------

/// A cartesian machine axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Index of this axis in a [`Position`].
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Upper-case letter used in command parameter names (`Y_MIN`, ...).
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(format!("unknown axis '{other}'")),
        }
    }
}

/// Machine coordinates in millimetres, indexed by [`Axis::index`].
pub type Position = [f64; 3];

// ---------------------------------------------------------------------------
// Calibration point
// ---------------------------------------------------------------------------

/// One (distance, focus) sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub distance: f64,
    pub focus: i32,
}

impl CalibrationPoint {
    pub fn new(distance: f64, focus: i32) -> Self {
        Self { distance, focus }
    }
}

/// Formats as `distance:focus`, the same shape `focus_mappings` accepts.
impl std::fmt::Display for CalibrationPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.distance, self.focus)
    }
}

// ---------------------------------------------------------------------------
// Control state
// ---------------------------------------------------------------------------

/// Who is driving the camera focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    /// Camera auto-focus (or the user) owns focus.
    Disabled,
    /// Mapper is ready, waiting for the contributing axes to be homed.
    Armed,
    /// Focus follows the toolhead position.
    Active,
}

impl ControlState {
    pub fn is_active(self) -> bool {
        matches!(self, ControlState::Active)
    }
}

impl std::fmt::Display for ControlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ControlState::Disabled => "disabled",
            ControlState::Armed => "armed",
            ControlState::Active => "active",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Snapshot reported by `WEBCAM_FOCUS_STATUS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusStatus {
    pub state: ControlState,
    /// Last focus value sent to the camera by the controller.
    pub focus: Option<i32>,
    /// Last tracked toolhead distance.
    pub distance: Option<f64>,
    pub points: usize,
    pub mapper_ready: bool,
    pub calibrating: bool,
    pub last_update: Option<DateTime<Utc>>,
}
