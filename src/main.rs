use bevy::diagnostic::FrameTimeDiagnosticsPlugin;
use bevy::prelude::*;
use starwake::instancing::StarInstancingPlugin;
use starwake::scene::ScenePlugin;
use starwake::ui::UiPlugin;
use starwake::velocity_blur::VelocityBlurRenderPlugin;
use starwake::{AppState, FlightPlugin, FlightSettings};

fn main() {
    App::new()
        .insert_resource(ClearColor(Color::srgb(0.01, 0.01, 0.03)))
        .insert_resource(Msaa::Sample4)
        .add_plugins(FrameTimeDiagnosticsPlugin)
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "starwake".into(),
                resolution: (1280., 800.).into(),
                ..default()
            }),
            ..default()
        }))
        .init_state::<AppState>()
        .add_plugins((
            FlightPlugin,
            ScenePlugin,
            StarInstancingPlugin,
            VelocityBlurRenderPlugin,
            UiPlugin,
        ))
        .add_systems(Update, (hud_toggle, quit_trigger))
        .run();
}

fn hud_toggle(mut settings: ResMut<FlightSettings>, keys: Res<ButtonInput<KeyCode>>) {
    if keys.just_pressed(KeyCode::KeyH) {
        settings.show_hud = !settings.show_hud;
    }
}

fn quit_trigger(
    keys: Res<ButtonInput<KeyCode>>,
    state: Res<State<AppState>>,
    mut next_state: ResMut<NextState<AppState>>,
) {
    if keys.just_pressed(KeyCode::Escape) && *state.get() != AppState::Closing {
        next_state.set(AppState::Closing);
    }
}
