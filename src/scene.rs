use bevy::asset::UntypedAssetId;
use bevy::core_pipeline::bloom::BloomSettings;
use bevy::core_pipeline::tonemapping::Tonemapping;
use bevy::prelude::*;

use crate::camera_rig::BASE;
use crate::environment::ReflectionTargets;
use crate::flight::AppState;
use crate::instancing::STAR_SHADER_PATH;
use crate::steering::{ControlState, Ship};
use crate::velocity_blur::BLUR_SHADER_PATH;
use crate::MainCamera;

/// Assets that must be resident before the flight loop may start.
#[derive(Resource, Default)]
pub struct Preload {
    handles: Vec<UntypedHandle>,
}

#[derive(Resource, Default, Debug, Clone, Copy, PartialEq)]
pub struct LoadProgress {
    pub loaded: usize,
    pub total: usize,
}

impl LoadProgress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.loaded as f32 / self.total as f32
        }
    }

    pub fn is_ready(&self) -> bool {
        self.loaded >= self.total
    }
}

pub struct ScenePlugin;
impl Plugin for ScenePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Preload>()
            .init_resource::<LoadProgress>()
            .insert_resource(AmbientLight {
                color: Color::srgb(0.6, 0.7, 1.0),
                brightness: 120.0,
            })
            .add_systems(Startup, (setup_camera, setup_lights, spawn_ship, preload))
            .add_systems(Update, await_assets.run_if(in_state(AppState::Loading)));
    }
}

fn setup_camera(mut commands: Commands) {
    commands.spawn((
        Camera3dBundle {
            camera: Camera {
                hdr: true,
                ..default()
            },
            tonemapping: Tonemapping::TonyMcMapface,
            projection: Projection::Perspective(PerspectiveProjection {
                fov: BASE.fov.to_radians(),
                ..default()
            }),
            transform: Transform::from_translation(BASE.position)
                .looking_at(BASE.look_at, Vec3::Y),
            ..default()
        },
        BloomSettings::default(),
        MainCamera,
    ));
}

fn setup_lights(mut commands: Commands) {
    commands.spawn(DirectionalLightBundle {
        directional_light: DirectionalLight {
            illuminance: 4_000.0,
            ..default()
        },
        transform: Transform::from_xyz(-3.0, 6.0, 4.0).looking_at(Vec3::ZERO, Vec3::Y),
        ..default()
    });
    commands.spawn(PointLightBundle {
        point_light: PointLight {
            color: Color::srgb(0.4, 0.6, 1.0),
            intensity: 200_000.0,
            range: 30.0,
            ..default()
        },
        transform: Transform::from_xyz(3.0, -2.0, 0.0),
        ..default()
    });
}

/// Builds the ship from primitives with its nose along local +Z, and records
/// the hull materials for the reflection pass.
fn spawn_ship(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let hull = materials.add(StandardMaterial {
        base_color: Color::srgb(0.8, 0.82, 0.88),
        ..default()
    });
    let wing = materials.add(StandardMaterial {
        base_color: Color::srgb(0.55, 0.6, 0.7),
        ..default()
    });
    let canopy = materials.add(StandardMaterial {
        base_color: Color::srgb(0.1, 0.2, 0.35),
        emissive: LinearRgba::rgb(0.2, 0.6, 1.5),
        ..default()
    });

    let fuselage = meshes.add(Capsule3d::new(0.18, 1.0));
    let wings = meshes.add(Cuboid::new(1.6, 0.04, 0.45));
    let fin = meshes.add(Cuboid::new(0.04, 0.35, 0.3));
    let dome = meshes.add(Sphere::new(0.14));

    commands
        .spawn((
            SpatialBundle::default(),
            Ship,
            ControlState::default(),
            Name::new("ship"),
        ))
        .with_children(|ship| {
            ship.spawn(PbrBundle {
                mesh: fuselage,
                material: hull.clone(),
                transform: Transform::from_rotation(Quat::from_rotation_x(
                    std::f32::consts::FRAC_PI_2,
                )),
                ..default()
            });
            ship.spawn(PbrBundle {
                mesh: wings,
                material: wing.clone(),
                transform: Transform::from_xyz(0.0, 0.0, -0.15),
                ..default()
            });
            ship.spawn(PbrBundle {
                mesh: fin,
                material: wing.clone(),
                transform: Transform::from_xyz(0.0, 0.2, -0.45),
                ..default()
            });
            ship.spawn(PbrBundle {
                mesh: dome,
                material: canopy,
                transform: Transform::from_xyz(0.0, 0.12, 0.2),
                ..default()
            });
        });

    commands.insert_resource(ReflectionTargets {
        hull: vec![hull, wing],
    });
}

fn preload(asset_server: Res<AssetServer>, mut preload: ResMut<Preload>) {
    for path in [STAR_SHADER_PATH, BLUR_SHADER_PATH] {
        preload
            .handles
            .push(asset_server.load::<Shader>(path).untyped());
    }
}

fn await_assets(
    asset_server: Res<AssetServer>,
    preload: Res<Preload>,
    mut progress: ResMut<LoadProgress>,
    ships: Query<(), With<Ship>>,
    mut next_state: ResMut<NextState<AppState>>,
) {
    let ids: Vec<UntypedAssetId> = preload.handles.iter().map(|h| h.id()).collect();
    *progress = LoadProgress {
        loaded: ids
            .iter()
            .filter(|id| asset_server.is_loaded_with_dependencies(**id))
            .count(),
        total: ids.len(),
    };
    if progress.is_ready() && !ships.is_empty() {
        info!("assets ready ({} preloaded)", progress.total);
        next_state.set(AppState::Flying);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_fraction() {
        let p = LoadProgress {
            loaded: 1,
            total: 2,
        };
        assert_eq!(p.fraction(), 0.5);
        assert!(!p.is_ready());
        assert!(LoadProgress::default().is_ready());
        assert_eq!(LoadProgress::default().fraction(), 1.0);
    }
}
