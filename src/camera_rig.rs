use bevy::prelude::*;

use crate::flight::{approach, AppState, FlightMode, FlightSet};
use crate::MainCamera;

const POSITION_EASE: f32 = 0.05;
pub const FOV_EASE: f32 = 0.02;

/// A fixed camera framing. `fov` is the vertical field of view in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewpoint {
    pub position: Vec3,
    pub look_at: Vec3,
    pub fov: f32,
}

pub const BASE: Viewpoint = Viewpoint {
    position: Vec3::new(-4.0, 4.0, 6.0),
    look_at: Vec3::ZERO,
    fov: 40.0,
};

pub const TURBO: Viewpoint = Viewpoint {
    position: Vec3::new(5.0, 1.0, 1.0),
    look_at: Vec3::new(-5.0, 0.0, 0.0),
    fov: 55.0,
};

impl Viewpoint {
    pub fn for_mode(mode: FlightMode) -> Self {
        match mode {
            FlightMode::Manual => BASE,
            FlightMode::Turbo => TURBO,
        }
    }
}

/// Live camera framing, eased toward the active viewpoint.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    pub look_at: Vec3,
    pub fov: f32,
}

impl CameraState {
    /// Starts exactly on the base framing so the first frame has no fly-in.
    pub fn mount() -> Self {
        Self {
            position: BASE.position,
            look_at: BASE.look_at,
            fov: BASE.fov,
        }
    }

    /// Position and FOV ease; the look-at point snaps to the new framing.
    pub fn step(self, mode: FlightMode) -> Self {
        let target = Viewpoint::for_mode(mode);
        Self {
            position: self.position + (target.position - self.position) * POSITION_EASE,
            look_at: target.look_at,
            fov: approach(self.fov, target.fov, FOV_EASE),
        }
    }

    pub fn transform(&self) -> Transform {
        Transform::from_translation(self.position).looking_at(self.look_at, Vec3::Y)
    }
}

pub struct CameraRigPlugin;
impl Plugin for CameraRigPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(OnEnter(AppState::Flying), mount_rig)
            .add_systems(Update, drive_rig.in_set(FlightSet::Camera))
            .add_systems(OnExit(AppState::Flying), unmount_rig);
    }
}

fn mount_rig(
    mut commands: Commands,
    mut q_cam: Query<(Entity, &mut Transform, &mut Projection), With<MainCamera>>,
) {
    let Ok((entity, mut transform, mut projection)) = q_cam.get_single_mut() else {
        warn!("no main camera to mount the rig on");
        return;
    };
    let state = CameraState::mount();
    apply(&state, &mut transform, &mut projection);
    commands.entity(entity).insert(state);
}

fn drive_rig(
    mode: Res<FlightMode>,
    mut q_cam: Query<(&mut CameraState, &mut Transform, &mut Projection), With<MainCamera>>,
) {
    let Ok((mut state, mut transform, mut projection)) = q_cam.get_single_mut() else {
        return;
    };
    *state = state.step(*mode);
    apply(&state, &mut transform, &mut projection);
}

fn unmount_rig(mut commands: Commands, q_cam: Query<Entity, With<CameraState>>) {
    for entity in &q_cam {
        commands.entity(entity).remove::<CameraState>();
    }
}

fn apply(state: &CameraState, transform: &mut Transform, projection: &mut Projection) {
    *transform = state.transform();
    if let Projection::Perspective(perspective) = projection {
        perspective.fov = state.fov.to_radians();
    }
}
