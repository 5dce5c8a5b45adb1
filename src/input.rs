use crate::flight::{FlightMode, FlightSet};
use crate::MainCamera;
use bevy::prelude::*;
use bevy::window::CursorMoved;

#[derive(Resource)]
pub struct Keybinds {
    pub turbo: KeyCode,
}

impl Default for Keybinds {
    fn default() -> Self {
        Self {
            turbo: KeyCode::Space,
        }
    }
}

/// Last pointer position projected into the world, on the plane the ship
/// steers in. Starts at the origin so the ship holds level until the pointer
/// first moves.
#[derive(Resource, Default, Debug, Clone, Copy)]
pub struct PointerTarget(pub Vec3);

pub struct InputPlugin;
impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Keybinds>()
            .init_resource::<PointerTarget>()
            .add_systems(
                Update,
                (pointer_target, turbo_key).in_set(FlightSet::Input),
            );
    }
}

/// The ship moves in the x = 0 plane; the pointer ray is intersected with it.
pub fn pointer_on_flight_plane(ray: Ray3d) -> Option<Vec3> {
    let distance = ray.intersect_plane(Vec3::ZERO, InfinitePlane3d::new(Vec3::X))?;
    Some(ray.get_point(distance))
}

fn window_cursor_world(cursor_pos: Vec2, cam: (&Camera, &GlobalTransform)) -> Option<Vec3> {
    let ray = cam.0.viewport_to_world(cam.1, cursor_pos)?;
    pointer_on_flight_plane(ray)
}

fn pointer_target(
    mut cursor_evr: EventReader<CursorMoved>,
    q_cam: Query<(&Camera, &GlobalTransform), With<MainCamera>>,
    mut target: ResMut<PointerTarget>,
) {
    let Some(cursor) = cursor_evr.read().last() else {
        return;
    };
    let Ok(cam) = q_cam.get_single() else {
        return;
    };
    if let Some(world) = window_cursor_world(cursor.position, cam) {
        target.0 = world;
    }
}

/// Turbo lasts exactly as long as the key is held.
pub fn mode_for_key(held: bool) -> FlightMode {
    if held {
        FlightMode::Turbo
    } else {
        FlightMode::Manual
    }
}

fn turbo_key(
    keys: Res<ButtonInput<KeyCode>>,
    keybinds: Res<Keybinds>,
    mut mode: ResMut<FlightMode>,
) {
    let next = mode_for_key(keys.pressed(keybinds.turbo));
    if next != *mode {
        info!("turbo {}", if next.is_turbo() { "engaged" } else { "released" });
        *mode = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_key_means_turbo() {
        assert_eq!(mode_for_key(true), FlightMode::Turbo);
        assert_eq!(mode_for_key(false), FlightMode::Manual);
    }

    #[test]
    fn pointer_ray_hits_flight_plane() {
        let ray = Ray3d::new(Vec3::new(-4.0, 4.0, 6.0), Vec3::new(1.0, -0.5, -1.0));
        let hit = pointer_on_flight_plane(ray).unwrap();
        assert!(hit.x.abs() < 1e-4);
        assert!((hit.y - 2.0).abs() < 1e-4);
        assert!((hit.z - 2.0).abs() < 1e-4);
    }

    #[test]
    fn ray_parallel_to_plane_misses() {
        let ray = Ray3d::new(Vec3::new(-4.0, 0.0, 0.0), Vec3::Y);
        assert!(pointer_on_flight_plane(ray).is_none());
    }
}
