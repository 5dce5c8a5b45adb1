//! Endless star stream built from a fixed pool.
//!
//! Stars travel along +X past the ship and are recycled to the far plane once
//! they pass the camera. The pool is allocated once on mount; recycling only
//! rewrites the one instance that left the view.

use std::ops::RangeInclusive;

use bevy::prelude::*;
use bevy::render::view::NoFrustumCulling;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::flight::{AppState, FlightMode, FlightSet, FlightSettings};
use crate::instancing::{StarInstanceData, StarInstances};

pub const POOL_SIZE: usize = 250;
/// Stars move opposite to this axis.
pub const TRAVEL_AXIS: Vec3 = Vec3::NEG_X;
/// Depth (x) at which recycled stars re-enter.
pub const SPAWN_DEPTH: f32 = -60.0;
/// Depth (x) past which a star has left the view behind the camera.
pub const RECYCLE_DEPTH: f32 = 12.0;
pub const SIZE_RANGE: RangeInclusive<f32> = 1.5..=20.0;
pub const SPEED_RANGE: RangeInclusive<f32> = 19.5..=42.0;
pub const LANE_Y: RangeInclusive<f32> = -10.0..=10.0;
pub const LANE_Z: RangeInclusive<f32> = -16.0..=16.0;
const TURBO_SPEEDUP: f32 = 3.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StarColor {
    Frost,
    Azure,
    Violet,
    Rose,
    Gold,
}

impl StarColor {
    pub const PALETTE: [StarColor; 5] = [
        StarColor::Frost,
        StarColor::Azure,
        StarColor::Violet,
        StarColor::Rose,
        StarColor::Gold,
    ];

    pub fn color(&self) -> Color {
        match *self {
            StarColor::Frost => Color::srgb(0.85, 0.95, 1.0),
            StarColor::Azure => Color::srgb(0.35, 0.65, 1.0),
            StarColor::Violet => Color::srgb(0.65, 0.45, 1.0),
            StarColor::Rose => Color::srgb(1.0, 0.5, 0.75),
            StarColor::Gold => Color::srgb(1.0, 0.85, 0.45),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StarInstance {
    pub position: Vec3,
    pub color: StarColor,
    pub size: f32,
    pub speed: f32,
    /// (y, z) offset of the lane the star travels in.
    pub lane_offset: Vec2,
}

impl StarInstance {
    fn random(rng: &mut impl Rng, depth: f32) -> Self {
        let lane_offset = Vec2::new(rng.gen_range(LANE_Y), rng.gen_range(LANE_Z));
        Self {
            position: Vec3::new(depth, lane_offset.x, lane_offset.y),
            color: StarColor::PALETTE[rng.gen_range(0..StarColor::PALETTE.len())],
            size: rng.gen_range(SIZE_RANGE),
            speed: rng.gen_range(SPEED_RANGE),
            lane_offset,
        }
    }

    pub fn depth(&self) -> f32 {
        self.position.x
    }

    pub fn has_passed_viewer(&self) -> bool {
        self.depth() > RECYCLE_DEPTH
    }

    /// Re-enter at the far plane with freshly drawn attributes.
    pub fn recycle(&mut self, rng: &mut impl Rng) {
        *self = StarInstance::random(rng, SPAWN_DEPTH);
    }
}

/// Apparent speed for the current mode; turbo runs the stream four times faster.
pub fn effective_speed(speed: f32, mode: FlightMode) -> f32 {
    speed * (1.0 + TURBO_SPEEDUP * mode.factor())
}

#[derive(Component, Debug, Clone)]
pub struct StarField {
    stars: Vec<StarInstance>,
}

impl StarField {
    /// Fills the pool with stars spread over the whole visible depth so the
    /// first frame is already populated.
    pub fn new(rng: &mut impl Rng) -> Self {
        let stars = (0..POOL_SIZE)
            .map(|_| {
                let depth = rng.gen_range(SPAWN_DEPTH..=RECYCLE_DEPTH);
                StarInstance::random(rng, depth)
            })
            .collect();
        Self { stars }
    }

    pub fn stars(&self) -> &[StarInstance] {
        &self.stars
    }

    /// Moves every star and recycles the ones that left the view. Returns how
    /// many were recycled.
    pub fn advance(&mut self, dt: f32, mode: FlightMode, rng: &mut impl Rng) -> usize {
        let mut recycled = 0;
        for star in &mut self.stars {
            star.position -= TRAVEL_AXIS * effective_speed(star.speed, mode) * dt;
            if star.has_passed_viewer() {
                star.recycle(rng);
                recycled += 1;
            }
        }
        recycled
    }

    pub fn instance_data(&self) -> Vec<StarInstanceData> {
        self.stars.iter().map(StarInstanceData::from).collect()
    }
}

#[derive(Resource)]
pub struct StarRng(pub StdRng);

impl StarRng {
    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => StarRng(StdRng::seed_from_u64(seed)),
            None => StarRng(StdRng::from_entropy()),
        }
    }
}

pub struct StarFieldPlugin;
impl Plugin for StarFieldPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(OnEnter(AppState::Flying), spawn_star_field)
            .add_systems(Update, advance_star_field.in_set(FlightSet::Stars))
            .add_systems(OnExit(AppState::Flying), despawn_star_field);
    }
}

fn spawn_star_field(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    settings: Res<FlightSettings>,
) {
    let mut rng = StarRng::from_seed(settings.star_seed);
    let field = StarField::new(&mut rng.0);
    let instances = StarInstances(field.instance_data());
    commands.spawn((
        meshes.add(Cuboid::new(1.0, 1.0, 1.0)),
        SpatialBundle::INHERITED_IDENTITY,
        field,
        instances,
        // Instances are scattered far outside the unit cube's bounds.
        NoFrustumCulling,
    ));
    commands.insert_resource(rng);
    info!("star field mounted with {POOL_SIZE} instances");
}

fn advance_star_field(
    time: Res<Time>,
    mode: Res<FlightMode>,
    rng: Option<ResMut<StarRng>>,
    mut fields: Query<(&mut StarField, &mut StarInstances)>,
) {
    let Some(mut rng) = rng else {
        return;
    };
    let dt = time.delta_seconds();
    for (mut field, mut instances) in &mut fields {
        let recycled = field.advance(dt, *mode, &mut rng.0);
        if recycled > 0 {
            debug!("recycled {recycled} stars");
        }
        instances.0 = field.instance_data();
    }
}

fn despawn_star_field(mut commands: Commands, fields: Query<Entity, With<StarField>>) {
    for entity in &fields {
        commands.entity(entity).despawn_recursive();
    }
    commands.remove_resource::<StarRng>();
    info!("star field released");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(seed: u64) -> (StarField, StdRng) {
        let mut rng = StdRng::seed_from_u64(seed);
        (StarField::new(&mut rng), rng)
    }

    #[test]
    fn pool_is_fixed_and_in_range() {
        let (field, _) = field(7);
        assert_eq!(field.stars().len(), POOL_SIZE);
        for star in field.stars() {
            assert!(SIZE_RANGE.contains(&star.size));
            assert!(SPEED_RANGE.contains(&star.speed));
            assert!((SPAWN_DEPTH..=RECYCLE_DEPTH).contains(&star.depth()));
        }
    }

    #[test]
    fn recycled_stars_restart_at_far_plane() {
        let (mut field, mut rng) = field(11);
        let mut total = 0;
        for _ in 0..600 {
            let before = field.stars().to_vec();
            total += field.advance(0.016, FlightMode::Turbo, &mut rng);
            assert_eq!(field.stars().len(), POOL_SIZE);
            for (old, new) in before.iter().zip(field.stars()) {
                if new.depth() < old.depth() {
                    assert_eq!(new.depth(), SPAWN_DEPTH);
                    assert!(SIZE_RANGE.contains(&new.size));
                    assert!(SPEED_RANGE.contains(&new.speed));
                    assert_eq!(new.position.y, new.lane_offset.x);
                    assert_eq!(new.position.z, new.lane_offset.y);
                }
            }
        }
        assert!(total > POOL_SIZE);
    }

    #[test]
    fn recycling_leaves_other_stars_untouched() {
        let (mut field, mut rng) = field(3);
        field.stars[0].position.x = RECYCLE_DEPTH + 0.5;
        let before = field.stars().to_vec();
        let dt = 0.001;
        field.advance(dt, FlightMode::Manual, &mut rng);

        assert_eq!(field.stars()[0].depth(), SPAWN_DEPTH);
        for (old, new) in before.iter().zip(field.stars()).skip(1) {
            if new.depth() >= old.depth() {
                assert_eq!(new.color, old.color);
                assert_eq!(new.size, old.size);
                assert_eq!(new.speed, old.speed);
                assert_eq!(new.lane_offset, old.lane_offset);
                assert!((new.depth() - old.depth() - old.speed * dt).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn turbo_quadruples_speed() {
        assert_eq!(effective_speed(20.0, FlightMode::Manual), 20.0);
        assert_eq!(effective_speed(20.0, FlightMode::Turbo), 80.0);
    }

    #[test]
    fn turbo_advance_moves_each_star_four_times_its_speed() {
        let (mut field, mut rng) = field(21);
        let dt = 0.016;
        let before = field.stars().to_vec();
        field.advance(dt, FlightMode::Turbo, &mut rng);
        let mut moved = 0;
        for (old, new) in before.iter().zip(field.stars()) {
            if new.depth() < old.depth() {
                continue; // recycled to the far plane
            }
            let travelled = new.depth() - old.depth();
            assert!((travelled - 4.0 * old.speed * dt).abs() < 1e-4);
            assert_eq!(new.lane_offset, old.lane_offset);
            moved += 1;
        }
        assert!(moved > 0);
    }

    #[test]
    fn palette_draws_cover_all_colors() {
        let (field, _) = field(5);
        for color in StarColor::PALETTE {
            assert!(field.stars().iter().any(|s| s.color == color));
        }
    }
}
