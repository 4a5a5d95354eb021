//! Typed configuration.
//!
//! Process settings come from environment variables; the focus setup comes
//! from a TOML file. Both load once at startup and fail fast on anything
//! malformed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{Axis, CalibrationPoint};
use crate::motion::sim::SimConfig;
use crate::tracker::DistancePolicy;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Config {
    pub config_path: PathBuf,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load process settings from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let config_path = match std::env::var("WEBCAM_FOCUS_CONFIG") {
            Ok(path) if path.trim().is_empty() => {
                return Err(Error::Config(
                    "WEBCAM_FOCUS_CONFIG is set but empty".to_string(),
                ));
            }
            Ok(path) => PathBuf::from(path),
            Err(_) => PathBuf::from("webcam_focus.toml"),
        };
        Ok(Self {
            config_path,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Focus configuration
// ---------------------------------------------------------------------------

/// Validated `[webcam_focus]` section.
#[derive(Debug, Clone)]
pub struct FocusConfig {
    pub device: PathBuf,
    pub utility: PathBuf,
    pub min_focus: i32,
    pub max_focus: i32,
    pub focus_property: String,
    pub autofocus_property: String,
    /// Static calibration points loaded into the sample store at startup.
    pub focus_mappings: Vec<CalibrationPoint>,
    pub distance: DistancePolicy,
    pub position_poll_interval: Duration,
    pub update_interval: Duration,
    pub graph_path: PathBuf,
    pub calibration: CalibrationConfig,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/video0"),
            utility: PathBuf::from("v4l2-ctl"),
            min_focus: 0,
            max_focus: 255,
            focus_property: "focus_absolute".to_string(),
            autofocus_property: "focus_auto".to_string(),
            focus_mappings: Vec::new(),
            distance: DistancePolicy::default(),
            position_poll_interval: Duration::from_millis(500),
            update_interval: Duration::from_secs(1),
            graph_path: PathBuf::from("focus_mapper.svg"),
            calibration: CalibrationConfig::default(),
        }
    }
}

/// Validated `[webcam_focus.calibration]` section.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// Axis the scan steps along.
    pub axis: Axis,
    pub move_speed: f64,
    /// Settle time at the wipe position.
    pub wipe_dwell: f64,
    /// Settle time at the test position; long enough for auto-focus to converge.
    pub focus_dwell: f64,
    /// Distance the wipe position keeps from the axis end.
    pub wipe_margin: f64,
    /// Default scan step is `(max - min) / steps`.
    pub steps: u32,
    /// Fixed coordinates for axes other than the scan axis.
    pub hold: [Option<f64>; 3],
    /// Camera controls applied before a scan.
    pub pre_scan_controls: BTreeMap<String, i64>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            axis: Axis::Y,
            move_speed: 300.0,
            wipe_dwell: 1.0,
            focus_dwell: 8.0,
            wipe_margin: 50.0,
            steps: 10,
            hold: [None; 3],
            pre_scan_controls: BTreeMap::new(),
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub focus: FocusConfig,
    pub sim: SimConfig,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawConfigFile =
            toml::from_str(content).map_err(|e| Error::Config(format!("bad config: {e}")))?;
        Ok(Self {
            focus: raw.webcam_focus.validate()?,
            sim: raw.sim.unwrap_or_default(),
        })
    }
}

impl FocusConfig {
    /// Parse and validate a TOML document containing a `[webcam_focus]` section.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        ConfigFile::from_toml_str(content).map(|file| file.focus)
    }
}

/// Parse `focus_mappings`: comma separated `distance:focus` pairs.
///
/// Empty entries (from a trailing comma) are ignored; anything else that is
/// not `<float>:<int>` is an error naming the entry.
pub fn parse_focus_mappings(s: &str) -> Result<Vec<CalibrationPoint>> {
    s.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let bad = || Error::Config(format!("invalid focus_mappings entry '{entry}'"));
            let (distance, focus) = entry.split_once(':').ok_or_else(bad)?;
            let distance: f64 = distance.trim().parse().map_err(|_| bad())?;
            let focus: i32 = focus.trim().parse().map_err(|_| bad())?;
            if !distance.is_finite() {
                return Err(bad());
            }
            Ok(CalibrationPoint::new(distance, focus))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Raw TOML shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfigFile {
    webcam_focus: RawFocusSection,
    sim: Option<SimConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFocusSection {
    device: Option<PathBuf>,
    utility: Option<PathBuf>,
    min_focus: Option<i32>,
    max_focus: Option<i32>,
    focus_property: Option<String>,
    autofocus_property: Option<String>,
    focus_mappings: Option<String>,
    position_poll_interval: Option<f64>,
    update_interval: Option<f64>,
    graph_path: Option<PathBuf>,
    distance: Option<RawDistance>,
    calibration: Option<RawCalibration>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
enum RawDistance {
    WeightedEuclidean {
        #[serde(default)]
        camera_position: Vec<f64>,
        focal_axis: Option<Vec<f64>>,
    },
    NormalizedAxis {
        axis: Axis,
        range: Option<[f64; 2]>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCalibration {
    axis: Option<Axis>,
    move_speed: Option<f64>,
    wipe_dwell: Option<f64>,
    focus_dwell: Option<f64>,
    wipe_margin: Option<f64>,
    steps: Option<u32>,
    hold: Option<RawHold>,
    #[serde(default)]
    pre_scan_controls: BTreeMap<String, i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHold {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
}

impl RawFocusSection {
    fn validate(self) -> Result<FocusConfig> {
        let defaults = FocusConfig::default();

        let min_focus = self.min_focus.unwrap_or(defaults.min_focus);
        let max_focus = self.max_focus.unwrap_or(defaults.max_focus);
        if min_focus > max_focus {
            return Err(Error::Config(format!(
                "min_focus ({min_focus}) must be <= max_focus ({max_focus})"
            )));
        }

        let focus_mappings = match self.focus_mappings {
            Some(s) => parse_focus_mappings(&s)?,
            None => Vec::new(),
        };

        let distance = match self.distance {
            Some(raw) => raw.validate()?,
            None => defaults.distance,
        };

        let calibration = match self.calibration {
            Some(raw) => raw.validate()?,
            None => defaults.calibration,
        };

        Ok(FocusConfig {
            device: self.device.unwrap_or(defaults.device),
            utility: self.utility.unwrap_or(defaults.utility),
            min_focus,
            max_focus,
            focus_property: non_empty(
                "focus_property",
                self.focus_property,
                defaults.focus_property,
            )?,
            autofocus_property: non_empty(
                "autofocus_property",
                self.autofocus_property,
                defaults.autofocus_property,
            )?,
            focus_mappings,
            distance,
            position_poll_interval: interval(
                "position_poll_interval",
                self.position_poll_interval,
                defaults.position_poll_interval,
            )?,
            update_interval: interval(
                "update_interval",
                self.update_interval,
                defaults.update_interval,
            )?,
            graph_path: self.graph_path.unwrap_or(defaults.graph_path),
            calibration,
        })
    }
}

impl RawDistance {
    fn validate(self) -> Result<DistancePolicy> {
        match self {
            RawDistance::WeightedEuclidean {
                camera_position,
                focal_axis,
            } => {
                let camera_position = xyz("camera_position", &camera_position)?;
                let focal_axis = match focal_axis {
                    Some(v) => xyz("focal_axis", &v)?,
                    None => [1.0; 3],
                };
                if focal_axis.iter().all(|w| *w == 0.0) {
                    return Err(Error::Config(
                        "focal_axis needs at least one nonzero weight".to_string(),
                    ));
                }
                Ok(DistancePolicy::WeightedEuclidean {
                    camera_position,
                    focal_axis,
                })
            }
            RawDistance::NormalizedAxis { axis, range } => {
                let range = match range {
                    Some([min, max]) if min < max => Some((min, max)),
                    Some([min, max]) => {
                        return Err(Error::Config(format!(
                            "normalized range must have min < max (got {min}..{max})"
                        )));
                    }
                    None => None,
                };
                Ok(DistancePolicy::NormalizedAxis { axis, range })
            }
        }
    }
}

impl RawCalibration {
    fn validate(self) -> Result<CalibrationConfig> {
        let defaults = CalibrationConfig::default();
        let move_speed = self.move_speed.unwrap_or(defaults.move_speed);
        if move_speed <= 0.0 || !move_speed.is_finite() {
            return Err(Error::Config(format!(
                "calibration move_speed must be positive (got {move_speed})"
            )));
        }
        let steps = self.steps.unwrap_or(defaults.steps);
        if steps == 0 {
            return Err(Error::Config("calibration steps must be >= 1".to_string()));
        }

        let hold = self
            .hold
            .map(|h| [h.x, h.y, h.z])
            .unwrap_or_default();

        Ok(CalibrationConfig {
            axis: self.axis.unwrap_or(defaults.axis),
            move_speed,
            wipe_dwell: non_negative("wipe_dwell", self.wipe_dwell, defaults.wipe_dwell)?,
            focus_dwell: non_negative("focus_dwell", self.focus_dwell, defaults.focus_dwell)?,
            wipe_margin: non_negative("wipe_margin", self.wipe_margin, defaults.wipe_margin)?,
            steps,
            hold,
            pre_scan_controls: self.pre_scan_controls,
        })
    }
}

/// Pad a 1..=3 component vector with zeros.
fn xyz(name: &str, values: &[f64]) -> Result<[f64; 3]> {
    if values.len() > 3 {
        return Err(Error::Config(format!(
            "{name} takes at most 3 values (got {})",
            values.len()
        )));
    }
    let mut out = [0.0; 3];
    out[..values.len()].copy_from_slice(values);
    Ok(out)
}

fn interval(name: &str, value: Option<f64>, default: Duration) -> Result<Duration> {
    match value {
        None => Ok(default),
        Some(secs) if secs > 0.0 && secs.is_finite() => Ok(Duration::from_secs_f64(secs)),
        Some(secs) => Err(Error::Config(format!(
            "{name} must be a positive number of seconds (got {secs})"
        ))),
    }
}

fn non_negative(name: &str, value: Option<f64>, default: f64) -> Result<f64> {
    match value {
        None => Ok(default),
        Some(v) if v >= 0.0 && v.is_finite() => Ok(v),
        Some(v) => Err(Error::Config(format!("{name} must be >= 0 (got {v})"))),
    }
}

fn non_empty(name: &str, value: Option<String>, default: String) -> Result<String> {
    match value {
        None => Ok(default),
        Some(s) if !s.trim().is_empty() => Ok(s),
        Some(_) => Err(Error::Config(format!("{name} must not be empty"))),
    }
}
