//! `v4l2-ctl` backed camera control.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Output;

use tokio::process::Command;
use tracing::debug;

use super::{CameraControl, CameraError};

/// One line of `v4l2-ctl --list-ctrls` output, e.g.
///
/// ```text
/// focus_absolute 0x009a090a (int)    : min=0 max=255 step=5 default=0 value=30 flags=inactive
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub name: String,
    pub id: String,
    pub kind: String,
    pub properties: BTreeMap<String, String>,
}

impl Control {
    /// The `value=` field as an integer, if present and numeric.
    pub fn value(&self) -> Option<i64> {
        self.properties.get("value")?.parse().ok()
    }
}

/// Parse `--list-ctrls` output. Section headers, menu entries and anything
/// else not shaped like a control line are skipped.
pub fn parse_controls(output: &str) -> Vec<Control> {
    output.lines().filter_map(parse_control_line).collect()
}

fn parse_control_line(line: &str) -> Option<Control> {
    let (left, right) = line.split_once(':')?;
    let mut head = left.split_whitespace();
    let (name, id, kind) = (head.next()?, head.next()?, head.next()?);
    if head.next().is_some() || !kind.starts_with('(') || !kind.ends_with(')') {
        return None;
    }
    let properties = right
        .split_whitespace()
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Some(Control {
        name: name.to_string(),
        id: id.to_string(),
        kind: kind.trim_matches(|c| c == '(' || c == ')').to_string(),
        properties,
    })
}

/// Drives one video device through the `v4l2-ctl` utility.
#[derive(Debug, Clone)]
pub struct V4l2Ctl {
    program: PathBuf,
    device: PathBuf,
}

impl V4l2Ctl {
    pub fn new(program: impl Into<PathBuf>, device: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            device: device.into(),
        }
    }

    pub fn device(&self) -> &Path {
        &self.device
    }

    /// All controls the device reports.
    pub async fn list_controls(&self) -> Result<Vec<Control>, CameraError> {
        let output = self.run(&["--list-ctrls".to_string()]).await?;
        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| CameraError::Unparsable(format!("non-utf8 output: {e}")))?;
        let controls = parse_controls(&stdout);
        if controls.is_empty() && !stdout.trim().is_empty() {
            return Err(CameraError::Unparsable(stdout.trim().to_string()));
        }
        Ok(controls)
    }

    async fn run(&self, args: &[String]) -> Result<Output, CameraError> {
        debug!(
            program = %self.program.display(),
            device = %self.device.display(),
            ?args,
            "running camera utility"
        );
        let output = Command::new(&self.program)
            .arg("-d")
            .arg(&self.device)
            .args(args)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    CameraError::NotFound(self.program.display().to_string())
                }
                _ => CameraError::Io(e),
            })?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(CameraError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl CameraControl for V4l2Ctl {
    async fn set(&self, property: &str, value: i64) -> Result<(), CameraError> {
        self.run(&["-c".to_string(), format!("{property}={value}")])
            .await
            .map(|_| ())
    }

    async fn query(&self, property: &str) -> Result<i64, CameraError> {
        let controls = self.list_controls().await?;
        let control = controls
            .iter()
            .find(|c| c.name == property)
            .ok_or_else(|| CameraError::UnknownControl(property.to_string()))?;
        control.value().ok_or_else(|| {
            CameraError::Unparsable(format!("control {property} has no integer value"))
        })
    }
}
