//! Integration tests for the timer-driven control loop.

mod common;

use std::time::Duration;

use common::{FOCUS, config, engine, sample_points};
use tokio::time::sleep;
use webcam_focus::engine::{ControlLoop, HostEvent};
use webcam_focus::model::ControlState;

fn mapped_config() -> webcam_focus::config::FocusConfig {
    let mut config = config();
    config.focus_mappings = sample_points();
    config
}

#[tokio::test(start_paused = true)]
async fn ticks_follow_the_toolhead() {
    let (focus, mut h) = engine(mapped_config());
    let motion = h.motion.clone();
    let camera = h.camera.clone();
    let (control, handle) = ControlLoop::new(focus);

    let driver = async {
        handle.event(HostEvent::Ready);
        motion.set_position([250.0, 100.0, 0.0]);
        sleep(Duration::from_secs(2)).await;
        // Armed, tracking, but not sending until homed.
        assert!(camera.values_of(FOCUS).is_empty());

        motion.home_all();
        handle.event(HostEvent::HomeComplete);
        sleep(Duration::from_secs(2)).await;

        motion.set_position([250.0, 200.0, 0.0]);
        sleep(Duration::from_secs(2)).await;
        handle.shutdown();
    };

    let (result, ()) = tokio::join!(control.run(), driver);
    let focus = result.unwrap();

    assert_eq!(focus.state(), ControlState::Active);
    assert_eq!(camera.values_of(FOCUS), vec![165, 77]);
    assert_eq!(h.drain(), vec!["enabling position derived webcam focus"]);
}

#[tokio::test(start_paused = true)]
async fn commands_run_between_ticks() {
    let (focus, mut h) = engine(mapped_config());
    let (control, handle) = ControlLoop::new(focus);

    let driver = async {
        handle.event(HostEvent::Ready);
        handle.command("WEBCAM_FOCUS_MAPPER D=0.25");
        handle.command("WEBCAM_FOCUS_CLEAR");
        sleep(Duration::from_secs(1)).await;
        handle.shutdown();
    };

    let (result, ()) = tokio::join!(control.run(), driver);
    let focus = result.unwrap();

    assert!(focus.mapper().is_none());
    assert_eq!(
        h.drain(),
        vec!["focal distance 0.250000 value 165", "focus mappings cleared"]
    );
}

#[tokio::test(start_paused = true)]
async fn calibration_runs_alongside_ticks() {
    let (focus, mut h) = engine(config());
    let motion = h.motion.clone();
    let camera = h.camera.clone();
    camera.script_queries([Some(120), Some(80)]);
    let (control, handle) = ControlLoop::new(focus);

    let driver = async {
        motion.home_all();
        handle.event(HostEvent::Ready);
        sleep(Duration::from_millis(10)).await;
        handle.command("WEBCAM_FOCUS_CALIBRATE Y_MIN=100 Y_MAX=300 Y_STEP=100");
        sleep(Duration::from_secs(5)).await;
        handle.command("WEBCAM_FOCUS_STATUS");
        // Two steps of 1s + 8s dwell each.
        sleep(Duration::from_secs(20)).await;
        handle.shutdown();
    };

    let (result, ()) = tokio::join!(control.run(), driver);
    let focus = result.unwrap();

    let lines = h.drain();
    assert_eq!(lines[0], "enabling auto-focus");
    assert!(lines[1].contains("\"calibrating\":true"), "{}", lines[1]);
    assert_eq!(
        lines[2..].to_vec(),
        vec![
            "  focus 0.25:120",
            "  focus 0.5:80",
            "enabling position derived webcam focus",
            "finished auto-focus calibration",
        ]
    );

    assert_eq!(focus.state(), ControlState::Active);
    assert!(!focus.is_calibrating());
    // The toolhead ends the scan at y=200.
    assert_eq!(camera.values_of(FOCUS), vec![80]);
}

#[tokio::test(start_paused = true)]
async fn host_shutdown_drops_the_scan() {
    let (focus, mut h) = engine(config());
    let camera = h.camera.clone();
    camera.script_queries([Some(120), Some(80)]);
    let (control, handle) = ControlLoop::new(focus);

    let driver = async {
        handle.event(HostEvent::Ready);
        sleep(Duration::from_millis(10)).await;
        handle.command("WEBCAM_FOCUS_CALIBRATE Y_MIN=100 Y_MAX=300 Y_STEP=100");
        sleep(Duration::from_secs(3)).await;
        handle.event(HostEvent::Shutdown);
        sleep(Duration::from_secs(30)).await;
        handle.command("WEBCAM_FOCUS_STATUS");
        sleep(Duration::from_secs(1)).await;
        handle.shutdown();
    };

    let (result, ()) = tokio::join!(control.run(), driver);
    let focus = result.unwrap();

    assert!(focus.is_shut_down());
    assert!(!focus.is_calibrating());
    assert!(focus.store().is_empty());
    assert_eq!(
        h.drain(),
        vec!["enabling auto-focus", "!! webcam focus is shut down"]
    );
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_stops_the_loop() {
    let (focus, _h) = engine(config());
    let (control, handle) = ControlLoop::new(focus);
    drop(handle);

    let focus = control.run().await.unwrap();
    assert_eq!(focus.state(), ControlState::Disabled);
}
