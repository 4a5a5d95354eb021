//! Command surface plumbing: `NAME KEY=VALUE ...` lines and the response sink.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};

pub const WEBCAM_SETTINGS: &str = "WEBCAM_SETTINGS";
pub const WEBCAM_FOCUS_CLEAR: &str = "WEBCAM_FOCUS_CLEAR";
pub const WEBCAM_FOCUS_SAVE: &str = "WEBCAM_FOCUS_SAVE";
pub const WEBCAM_FOCUS_MAPPER: &str = "WEBCAM_FOCUS_MAPPER";
pub const WEBCAM_FOCUS_CALIBRATE: &str = "WEBCAM_FOCUS_CALIBRATE";
pub const WEBCAM_FOCUS_ENABLE: &str = "WEBCAM_FOCUS_ENABLE";
pub const WEBCAM_FOCUS_STATUS: &str = "WEBCAM_FOCUS_STATUS";

/// Registered commands and their help text.
pub const COMMANDS: &[(&str, &str)] = &[
    (WEBCAM_SETTINGS, "Set settings on your webcam"),
    (WEBCAM_FOCUS_CLEAR, "Clear any remembered focal points"),
    (
        WEBCAM_FOCUS_SAVE,
        "Add the current focus and position into the focus mapper",
    ),
    (WEBCAM_FOCUS_MAPPER, "Show the points in the focus mapper"),
    (
        WEBCAM_FOCUS_CALIBRATE,
        "Calibrate focus automatically using a focus pattern on the toolhead",
    ),
    (
        WEBCAM_FOCUS_ENABLE,
        "Re-enable position derived focus after a manual override",
    ),
    (WEBCAM_FOCUS_STATUS, "Report focus control status"),
];

/// A parsed command: upper-cased name plus `KEY=VALUE` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    pub name: String,
    params: BTreeMap<String, String>,
}

impl CommandLine {
    /// Parse `NAME KEY=VALUE ...`. Keys are case-insensitive; a `;` starts a
    /// comment.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.split(';').next().unwrap_or_default().trim();
        let mut words = line.split_whitespace();
        let name = words
            .next()
            .ok_or_else(|| Error::Command("empty command".to_string()))?
            .to_ascii_uppercase();

        let mut params = BTreeMap::new();
        for word in words {
            let (key, value) = word.split_once('=').ok_or_else(|| {
                Error::Command(format!("malformed parameter '{word}' in {name}"))
            })?;
            if key.is_empty() {
                return Err(Error::Command(format!(
                    "malformed parameter '{word}' in {name}"
                )));
            }
            params.insert(key.to_ascii_uppercase(), value.to_string());
        }
        Ok(Self { name, params })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn get_float(&self, key: &str) -> Result<Option<f64>> {
        self.get(key)
            .map(|raw| {
                raw.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| self.parse_error(key, raw, "float"))
            })
            .transpose()
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        self.get(key)
            .map(|raw| {
                raw.parse::<i64>()
                    .map_err(|_| self.parse_error(key, raw, "integer"))
            })
            .transpose()
    }

    fn parse_error(&self, key: &str, raw: &str, kind: &str) -> Error {
        Error::Command(format!(
            "Error on '{}': unable to parse {key}='{raw}' as {kind}",
            self.name
        ))
    }
}

/// Where command responses go. Each message is one line of text.
#[derive(Debug, Clone)]
pub struct Console {
    tx: mpsc::UnboundedSender<String>,
}

impl Console {
    /// A console plus the receiving end the host reads responses from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn respond(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(%message, "respond");
        // Nobody listening is not an error for the sender.
        let _ = self.tx.send(message);
    }

    /// Report an error the way the host renders command failures.
    pub fn respond_error(&self, error: &Error) {
        self.respond(format!("!! {error}"));
    }
}
