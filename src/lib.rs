//! Pointer-steered flight through an endless star stream.
//! - `steering`: damped height/yaw/pitch control of the ship.
//! - `camera_rig`: eased camera framing between the base and turbo views.
//! - `star_field` / `instancing`: the recycled star pool and its single draw.
//! - `velocity_blur`: turbo-driven post-process blur.
//! - `environment`: per-frame reflection cubemap for the hull.

pub mod camera_rig;
pub mod environment;
pub mod flight;
pub mod input;
pub mod instancing;
pub mod scene;
pub mod star_field;
pub mod steering;
pub mod ui;
pub mod velocity_blur;

use bevy::prelude::*;

pub use flight::{AppState, FlightMode, FlightPlugin, FlightSettings};

#[derive(Component)]
pub struct MainCamera;
