//! # webcam-focus
//!
//! Drives a webcam's focus from a 3D printer's toolhead position.
//!
//! Calibration points pair a toolhead distance with the focus value that is
//! sharp there. A piecewise-linear mapper built from those points turns the
//! tracked distance into a focus value, which is pushed to the camera
//! whenever it changes. Points come from configuration, manual commands or an
//! automatic scan that lets the camera's own auto-focus settle at each stop.

pub mod camera;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod model;
pub mod motion;
pub mod plot;
pub mod store;
pub mod telemetry;
pub mod tracker;
