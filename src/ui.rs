use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPlugin};

use crate::camera_rig::CameraState;
use crate::environment::EnvironmentMaps;
use crate::flight::{AppState, FlightMode, FlightSettings};
use crate::input::Keybinds;
use crate::scene::LoadProgress;
use crate::steering::{ControlState, Ship};
use crate::velocity_blur::VelocityBlurSettings;

pub struct UiPlugin;
impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(EguiPlugin)
            .add_systems(Update, loading_ui.run_if(in_state(AppState::Loading)))
            .add_systems(
                Update,
                flight_hud
                    .run_if(in_state(AppState::Flying))
                    .run_if(|settings: Res<FlightSettings>| settings.show_hud),
            );
    }
}

fn loading_ui(mut contexts: EguiContexts, progress: Res<LoadProgress>) {
    egui::Window::new("Loading").show(contexts.ctx_mut(), |ui| {
        ui.add(
            egui::ProgressBar::new(progress.fraction())
                .text(format!("{} / {}", progress.loaded, progress.total)),
        );
    });
}

#[allow(clippy::too_many_arguments)]
fn flight_hud(
    mut contexts: EguiContexts,
    mode: Res<FlightMode>,
    mut settings: ResMut<FlightSettings>,
    keybinds: Res<Keybinds>,
    maps: Res<EnvironmentMaps>,
    diagnostics: Res<DiagnosticsStore>,
    ship_q: Query<&ControlState, With<Ship>>,
    cam_q: Query<(&CameraState, Option<&VelocityBlurSettings>)>,
) {
    egui::Window::new("Flight").show(contexts.ctx_mut(), |ui| {
        if let Some(fps) = diagnostics.get(&FrameTimeDiagnosticsPlugin::FPS) {
            if let Some(value) = fps.smoothed() {
                ui.label(format!("FPS: {:.1}", value));
            }
        }
        ui.label(format!("Mode: {:?}", *mode));

        ui.separator();

        if let Ok(control) = ship_q.get_single() {
            ui.label(format!("Height: {:.2}", control.position_y));
            ui.label(format!(
                "Yaw: {:.1}°  Pitch: {:.1}°",
                control.yaw.to_degrees(),
                control.pitch.to_degrees()
            ));
        }
        if let Ok((camera, blur)) = cam_q.get_single() {
            ui.label(format!("FOV: {:.1}°", camera.fov));
            if let Some(blur) = blur {
                ui.label(format!("Blur: {:.4}", blur.intensity));
            }
        }
        ui.label(format!("Env maps live: {}", maps.live()));

        ui.separator();

        ui.add(egui::Slider::new(&mut settings.blur_samples, 1..=32).text("Blur samples"));
        ui.checkbox(&mut settings.smooth_blur, "Smooth blur");
    });

    egui::Window::new("Help").show(contexts.ctx_mut(), |ui| {
        ui.label("Mouse: Steer");
        ui.label(format!("{:?} (hold): Turbo", keybinds.turbo));
        ui.label("H: Toggle HUD");
        ui.label("Esc: Quit");
    });
}
