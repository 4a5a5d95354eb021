//! Integration tests for the focus controller state machine.

use webcam_focus::engine::{ArmOutcome, FocusController};
use webcam_focus::mapper::FocusMapper;
use webcam_focus::model::{CalibrationPoint, ControlState};

fn mapper() -> FocusMapper {
    FocusMapper::build(&[
        CalibrationPoint::new(0.0, 40),
        CalibrationPoint::new(1.0, 240),
    ])
    .unwrap()
}

#[test]
fn arm_transitions_from_every_state() {
    // (start, mapper_ready, homed) -> (outcome, end)
    let cases = [
        ((ControlState::Disabled, false, false), (ArmOutcome::NotReady, ControlState::Disabled)),
        ((ControlState::Disabled, false, true), (ArmOutcome::NotReady, ControlState::Disabled)),
        ((ControlState::Disabled, true, false), (ArmOutcome::Armed, ControlState::Armed)),
        ((ControlState::Disabled, true, true), (ArmOutcome::Activated, ControlState::Active)),
        ((ControlState::Armed, false, true), (ArmOutcome::NotReady, ControlState::Armed)),
        ((ControlState::Armed, true, false), (ArmOutcome::Armed, ControlState::Armed)),
        ((ControlState::Armed, true, true), (ArmOutcome::Activated, ControlState::Active)),
        ((ControlState::Active, false, true), (ArmOutcome::NotReady, ControlState::Disabled)),
        ((ControlState::Active, true, false), (ArmOutcome::AlreadyActive, ControlState::Active)),
        ((ControlState::Active, true, true), (ArmOutcome::AlreadyActive, ControlState::Active)),
    ];

    for ((start, mapper_ready, homed), (outcome, end)) in cases {
        let mut c = FocusController::new(0, 255);
        match start {
            ControlState::Disabled => {}
            ControlState::Armed => {
                c.try_arm(true, false);
            }
            ControlState::Active => {
                c.try_arm(true, true);
            }
        }
        assert_eq!(c.state(), start);
        assert_eq!(
            c.try_arm(mapper_ready, homed),
            outcome,
            "{start} ready={mapper_ready} homed={homed}"
        );
        assert_eq!(c.state(), end, "{start} ready={mapper_ready} homed={homed}");
    }
}

#[test]
fn sends_only_on_change() {
    let m = mapper();
    let mut c = FocusController::new(0, 255);
    c.try_arm(true, true);

    let sent: Vec<Option<i32>> = [0.5, 0.5, 0.501, 0.6, 0.6]
        .into_iter()
        .map(|d| c.tick(Some(&m), Some(d)))
        .collect();

    assert_eq!(sent, vec![Some(140), None, None, Some(160), None]);
    assert_eq!(c.last_sent(), Some(160));
}

#[test]
fn clamps_to_configured_bounds() {
    let m = mapper();
    let mut c = FocusController::new(60, 200);
    c.try_arm(true, true);

    assert_eq!(c.tick(Some(&m), Some(0.0)), Some(60));
    assert_eq!(c.tick(Some(&m), Some(1.0)), Some(200));
    assert_eq!(c.clamp(100), 100);
}

#[test]
fn disabled_controller_never_sends() {
    let m = mapper();
    let mut c = FocusController::new(0, 255);
    assert_eq!(c.tick(Some(&m), Some(0.5)), None);

    c.try_arm(true, false);
    assert_eq!(c.tick(Some(&m), Some(0.5)), None);

    c.try_arm(true, true);
    c.disable();
    assert_eq!(c.tick(Some(&m), Some(0.5)), None);
    assert_eq!(c.state(), ControlState::Disabled);
}
