use bevy::prelude::*;

use crate::camera_rig::CameraRigPlugin;
use crate::environment::EnvironmentPlugin;
use crate::input::InputPlugin;
use crate::star_field::StarFieldPlugin;
use crate::steering::SteeringPlugin;
use crate::velocity_blur::VelocityBlurPlugin;

#[derive(States, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AppState {
    #[default]
    Loading,
    Flying,
    Closing,
}

/// Session-wide turbo flag. Written by input handling before `Update` runs
/// and only read by the flight systems.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlightMode {
    #[default]
    Manual,
    Turbo,
}

impl FlightMode {
    pub fn is_turbo(self) -> bool {
        self == FlightMode::Turbo
    }

    /// The 0/1 scalar the consumers scale their effects by.
    pub fn factor(self) -> f32 {
        match self {
            FlightMode::Manual => 0.0,
            FlightMode::Turbo => 1.0,
        }
    }
}

#[derive(Resource, Clone, Debug)]
pub struct FlightSettings {
    pub blur_samples: u32,
    pub smooth_blur: bool,
    pub environment_resolution: u32,
    pub star_seed: Option<u64>,
    pub show_hud: bool,
}

impl Default for FlightSettings {
    fn default() -> Self {
        Self {
            blur_samples: 12,
            smooth_blur: true,
            environment_resolution: 16,
            star_seed: None,
            show_hud: true,
        }
    }
}

/// Per-frame order inside `Update`. Everything after `Input` only reads the
/// flight mode.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlightSet {
    Input,
    Steer,
    Camera,
    Stars,
    Blur,
    Environment,
}

pub struct FlightPlugin;
impl Plugin for FlightPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<FlightMode>()
            .init_resource::<FlightSettings>()
            .configure_sets(
                Update,
                (
                    FlightSet::Input,
                    FlightSet::Steer,
                    FlightSet::Camera,
                    FlightSet::Stars,
                    FlightSet::Blur,
                    FlightSet::Environment,
                )
                    .chain()
                    .run_if(in_state(AppState::Flying)),
            )
            .add_plugins((
                InputPlugin,
                SteeringPlugin,
                CameraRigPlugin,
                StarFieldPlugin,
                VelocityBlurPlugin,
                EnvironmentPlugin,
            ))
            .add_systems(OnEnter(AppState::Flying), announce_mount)
            .add_systems(OnExit(AppState::Flying), reset_flight_mode)
            .add_systems(OnEnter(AppState::Closing), request_exit);
    }
}

fn announce_mount(settings: Res<FlightSettings>) {
    info!(
        "flight session mounted (blur samples {}, env map {}px)",
        settings.blur_samples, settings.environment_resolution
    );
}

fn reset_flight_mode(mut mode: ResMut<FlightMode>) {
    *mode = FlightMode::Manual;
}

fn request_exit(mut exit: EventWriter<AppExit>) {
    info!("flight session closed");
    exit.send(AppExit::Success);
}

/// Geometric ease toward `target` by `factor` of the remaining distance.
/// Shared by the camera rig and the blur intensity.
pub fn approach(current: f32, target: f32, factor: f32) -> f32 {
    current + (target - current) * factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_factor_is_binary() {
        assert_eq!(FlightMode::Manual.factor(), 0.0);
        assert_eq!(FlightMode::Turbo.factor(), 1.0);
        assert!(!FlightMode::default().is_turbo());
    }

    #[test]
    fn approach_never_overshoots() {
        let mut v = 40.0;
        for _ in 0..2000 {
            let next = approach(v, 55.0, 0.02);
            assert!(next >= v && next <= 55.0);
            v = next;
        }
        assert!((v - 55.0).abs() < 1e-3);
    }
}
