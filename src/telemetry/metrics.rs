//! Metric instrument factories for webcam-focus.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"webcam-focus"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for webcam-focus instruments.
fn meter() -> Meter {
    opentelemetry::global::meter(super::SCOPE)
}

/// Counter: focus values sent to the camera.
/// Labels: `source` ("mapper" | "manual").
pub fn focus_commands() -> Counter<u64> {
    meter()
        .u64_counter("webcam_focus.focus.commands")
        .with_description("Number of focus values sent to the camera")
        .build()
}

/// Counter: failed camera utility invocations.
/// Labels: `operation` ("set" | "query").
pub fn camera_errors() -> Counter<u64> {
    meter()
        .u64_counter("webcam_focus.camera.errors")
        .with_description("Number of failed camera utility invocations")
        .build()
}

/// Counter: calibration steps.
/// Labels: `result` ("ok" | "skipped").
pub fn calibration_points() -> Counter<u64> {
    meter()
        .u64_counter("webcam_focus.calibration.points")
        .with_description("Number of calibration steps by result")
        .build()
}

/// Histogram: calibration run duration in seconds.
pub fn calibration_duration_s() -> Histogram<f64> {
    meter()
        .f64_histogram("webcam_focus.calibration.duration_s")
        .with_description("Calibration run duration in seconds")
        .with_unit("s")
        .build()
}

/// Counter: control state transitions.
/// Labels: `from`, `to`.
pub fn control_transitions() -> Counter<u64> {
    meter()
        .u64_counter("webcam_focus.control.transitions")
        .with_description("Number of focus control state transitions")
        .build()
}
