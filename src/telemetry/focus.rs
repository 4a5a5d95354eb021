//! Focus control span helpers.
//!
//! Provides span creation and state-transition recording for the focus
//! controller and calibration runs.

use tracing::Span;
use uuid::Uuid;

use crate::model::ControlState;

/// Start the long-lived span the focus controller runs inside.
pub fn start_focus_span(device: &str) -> Span {
    tracing::info_span!(
        "webcam_focus.control",
        "camera.device" = device,
        "focus.state" = tracing::field::Empty,
    )
}

/// Start a span for one calibration run.
pub fn start_calibration_span(run_id: &Uuid, axis: &str, steps: usize) -> Span {
    tracing::info_span!(
        "webcam_focus.calibrate",
        "calibration.id" = %run_id,
        "calibration.axis" = axis,
        "calibration.steps" = steps,
        "calibration.points" = tracing::field::Empty,
    )
}

/// Record a control state transition on the given span.
///
/// Updates the span's `focus.state` field, emits a tracing `info` event
/// scoped to the span and bumps the transition counter.
pub fn record_state_transition(span: &Span, from: ControlState, to: ControlState) {
    span.record("focus.state", tracing::field::display(to));
    span.in_scope(|| {
        tracing::info!(%from, %to, "state_transition");
    });
    super::metrics::control_transitions().add(
        1,
        &[
            opentelemetry::KeyValue::new("from", from.to_string()),
            opentelemetry::KeyValue::new("to", to.to_string()),
        ],
    );
}
