//! Damped steering for the piloted ship.
//!
//! Pointer input never moves the ship directly: it sets a target, and three
//! independent spring-dampers (height, yaw, pitch) chase their targets once per
//! frame. Turbo mode swaps every target for zero so the ship auto-centres.

use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;

use crate::flight::{AppState, FlightMode, FlightSet};
use crate::input::PointerTarget;

pub const HEIGHT_MIN: f32 = -3.0;
pub const HEIGHT_MAX: f32 = 1.0;
pub const MAX_YAW: f32 = 45.0_f32 * (std::f32::consts::PI / 180.0);
pub const MAX_PITCH: f32 = 30.0_f32 * (std::f32::consts::PI / 180.0);

const HEIGHT_K_MANUAL: f32 = 0.002;
const HEIGHT_K_TURBO: f32 = 0.01;
const HEIGHT_DAMPING: f32 = 0.95;
const PITCH_K: f32 = 0.01;
const PITCH_DAMPING: f32 = 0.85;
const PITCH_PER_UNIT: f32 = 0.5;
const YAW_K: f32 = 0.01;
const YAW_DAMPING: f32 = 0.75;

/// Marks the piloted entity.
#[derive(Component)]
pub struct Ship;

/// Integrator state for the piloted ship. Angles are radians.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlState {
    pub position_y: f32,
    pub velocity_y: f32,
    pub accel_y: f32,
    pub yaw: f32,
    pub yaw_vel: f32,
    /// Last yaw target; reused when the pointer sits exactly on the ship.
    pub yaw_target: f32,
    pub pitch: f32,
    pub pitch_vel: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringTargets {
    pub height: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl ControlState {
    pub fn translation(&self) -> Vec3 {
        Vec3::new(0.0, self.position_y, 0.0)
    }

    /// Pitch about local X, a fixed quarter turn about Y, then yaw about Z.
    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_x(self.pitch)
            * Quat::from_rotation_y(-FRAC_PI_2)
            * Quat::from_rotation_z(self.yaw)
    }
}

/// Yaw the ship should bank toward so it faces the pointer. Falls back to
/// `previous` when the pointer coincides with the ship.
pub fn yaw_toward(position_y: f32, pointer: Vec3, previous: f32) -> f32 {
    let Some(direction) = (pointer - Vec3::new(0.0, position_y, 0.0)).try_normalize() else {
        return previous;
    };
    let angle = direction.dot(Vec3::Y).clamp(-1.0, 1.0).acos() - FRAC_PI_2;
    angle.clamp(-MAX_YAW, MAX_YAW)
}

pub fn targets(state: &ControlState, pointer: Vec3, mode: FlightMode) -> SteeringTargets {
    match mode {
        FlightMode::Manual => SteeringTargets {
            height: pointer.y.clamp(HEIGHT_MIN, HEIGHT_MAX),
            yaw: yaw_toward(state.position_y, pointer, state.yaw_target),
            pitch: (pointer.z * PITCH_PER_UNIT).clamp(-MAX_PITCH, MAX_PITCH),
        },
        FlightMode::Turbo => SteeringTargets {
            height: 0.0,
            yaw: 0.0,
            pitch: 0.0,
        },
    }
}

/// One spring-damper tick. Returns `(accel, velocity, value)`.
///
/// The acceleration is recomputed from the current error every frame rather
/// than accumulated; an accumulating term makes the loop a third-order system
/// that diverges for every constant used here.
pub fn spring(value: f32, velocity: f32, target: f32, k: f32, damping: f32) -> (f32, f32, f32) {
    let accel = (target - value) * k;
    let velocity = (velocity + accel) * damping;
    (accel, velocity, value + velocity)
}

/// Advances the controller by one frame.
pub fn step(state: ControlState, pointer: Vec3, mode: FlightMode) -> ControlState {
    let target = targets(&state, pointer, mode);
    let height_k = if mode.is_turbo() {
        HEIGHT_K_TURBO
    } else {
        HEIGHT_K_MANUAL
    };

    let (accel_y, velocity_y, position_y) = spring(
        state.position_y,
        state.velocity_y,
        target.height,
        height_k,
        HEIGHT_DAMPING,
    );
    let (_, yaw_vel, yaw) = spring(state.yaw, state.yaw_vel, target.yaw, YAW_K, YAW_DAMPING);
    let (_, pitch_vel, pitch) = spring(
        state.pitch,
        state.pitch_vel,
        target.pitch,
        PITCH_K,
        PITCH_DAMPING,
    );

    ControlState {
        position_y,
        velocity_y,
        accel_y,
        yaw: yaw.clamp(-MAX_YAW, MAX_YAW),
        yaw_vel,
        yaw_target: target.yaw,
        pitch: pitch.clamp(-MAX_PITCH, MAX_PITCH),
        pitch_vel,
    }
}

pub struct SteeringPlugin;
impl Plugin for SteeringPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, steer_ship.in_set(FlightSet::Steer))
            .add_systems(OnExit(AppState::Flying), park_ship);
    }
}

fn steer_ship(
    pointer: Res<PointerTarget>,
    mode: Res<FlightMode>,
    mut ships: Query<(&mut ControlState, &mut Transform), With<Ship>>,
) {
    // Mesh not built yet: nothing to steer this frame.
    let Ok((mut control, mut transform)) = ships.get_single_mut() else {
        return;
    };
    *control = step(*control, pointer.0, *mode);
    transform.translation = control.translation();
    transform.rotation = control.rotation();
}

fn park_ship(mut ships: Query<(&mut ControlState, &mut Transform), With<Ship>>) {
    for (mut control, mut transform) in &mut ships {
        *control = ControlState::default();
        transform.translation = control.translation();
        transform.rotation = control.rotation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(mut state: ControlState, pointer: Vec3, mode: FlightMode, frames: usize) -> ControlState {
        for _ in 0..frames {
            state = step(state, pointer, mode);
        }
        state
    }

    #[test]
    fn height_target_is_clamped() {
        let state = ControlState::default();
        for y in [-50.0, -3.5, -1.0, 0.5, 1.5, 80.0] {
            let t = targets(&state, Vec3::new(0.0, y, 0.0), FlightMode::Manual);
            assert!((HEIGHT_MIN..=HEIGHT_MAX).contains(&t.height));
        }
        let t = targets(&state, Vec3::new(0.0, 5.0, 0.0), FlightMode::Manual);
        assert_eq!(t.height, HEIGHT_MAX);
    }

    #[test]
    fn angles_stay_in_bounds_for_extreme_pointers() {
        let mut state = ControlState::default();
        let pointers = [
            Vec3::new(0.0, 40.0, 90.0),
            Vec3::new(0.0, -40.0, -90.0),
            Vec3::new(0.0, 0.3, 12.0),
            Vec3::new(0.0, -9.0, -0.1),
        ];
        for (i, p) in pointers.iter().cycle().take(4000).enumerate() {
            let mode = if i % 700 < 350 {
                FlightMode::Manual
            } else {
                FlightMode::Turbo
            };
            state = step(state, *p, mode);
            assert!(state.yaw.abs() <= MAX_YAW + 1e-6);
            assert!(state.pitch.abs() <= MAX_PITCH + 1e-6);
        }
    }

    #[test]
    fn pointer_on_ship_keeps_previous_yaw_target() {
        let state = ControlState {
            position_y: 0.5,
            yaw_target: 0.3,
            ..default()
        };
        let t = targets(&state, Vec3::new(0.0, 0.5, 0.0), FlightMode::Manual);
        assert_eq!(t.yaw, 0.3);
        assert!(step(state, Vec3::new(0.0, 0.5, 0.0), FlightMode::Manual)
            .yaw
            .is_finite());
    }

    #[test]
    fn yaw_points_at_pointer() {
        // Level with the ship: no yaw.
        assert!(yaw_toward(0.0, Vec3::new(0.0, 0.0, 3.0), 0.0).abs() < 1e-6);
        // Straight up saturates at the clamp.
        assert!((yaw_toward(0.0, Vec3::new(0.0, 4.0, 0.0), 0.0) + MAX_YAW).abs() < 1e-6);
        assert!((yaw_toward(0.0, Vec3::new(0.0, -4.0, 0.0), 0.0) - MAX_YAW).abs() < 1e-6);
    }

    #[test]
    fn turbo_centres_then_manual_resumes() {
        let pointer = Vec3::new(0.0, -2.0, 0.8);
        let manual = run(ControlState::default(), pointer, FlightMode::Manual, 1500);
        assert!((manual.position_y + 2.0).abs() < 0.05);

        let t = targets(&manual, pointer, FlightMode::Turbo);
        assert_eq!((t.height, t.yaw, t.pitch), (0.0, 0.0, 0.0));
        let centred = run(manual, pointer, FlightMode::Turbo, 600);
        assert!(centred.position_y.abs() < 0.01);
        assert!(centred.yaw.abs() < 0.01);
        assert!(centred.pitch.abs() < 0.01);

        let back = run(centred, pointer, FlightMode::Manual, 1500);
        assert!((back.position_y + 2.0).abs() < 0.05);
        assert!((back.pitch - 0.4).abs() < 0.01);
    }

    #[test]
    fn spring_settles_without_sustained_oscillation() {
        for (k, damping) in [
            (HEIGHT_K_MANUAL, HEIGHT_DAMPING),
            (HEIGHT_K_TURBO, HEIGHT_DAMPING),
            (PITCH_K, PITCH_DAMPING),
            (YAW_K, YAW_DAMPING),
        ] {
            let (mut value, mut velocity) = (0.0, 0.0);
            for _ in 0..1000 {
                let (_, v, x) = spring(value, velocity, 1.0, k, damping);
                value = x;
                velocity = v;
            }
            assert!((value - 1.0).abs() < 1e-3, "k={k} damping={damping}");
            assert!(velocity.abs() < 1e-4);
        }
    }

    #[test]
    fn rotation_composes_pitch_turn_yaw() {
        let state = ControlState::default();
        let forward = state.rotation() * Vec3::X;
        assert!((forward - Vec3::Z).length() < 1e-5);

        let pitched = ControlState {
            pitch: 0.2,
            ..default()
        };
        let expected = Quat::from_rotation_x(0.2) * Quat::from_rotation_y(-FRAC_PI_2);
        assert!(pitched.rotation().abs_diff_eq(expected, 1e-6));
    }
}
