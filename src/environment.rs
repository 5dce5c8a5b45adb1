//! Live reflections for the ship hull.
//!
//! A small cubemap is re-derived from the star stream every frame and handed
//! to the main camera's `EnvironmentMapLight`. Only one map may exist at a
//! time: the previous frame's image is removed from `Assets<Image>` before the
//! new one is added.

use bevy::pbr::environment_map::EnvironmentMapLight;
use bevy::prelude::*;
use bevy::render::render_asset::RenderAssetUsages;
use bevy::render::render_resource::{
    Extent3d, TextureDimension, TextureFormat, TextureViewDescriptor, TextureViewDimension,
};

use crate::flight::{AppState, FlightSet, FlightSettings};
use crate::star_field::{StarField, StarInstance};
use crate::steering::Ship;
use crate::MainCamera;

const SKY_ZENITH: Vec3 = Vec3::new(0.02, 0.03, 0.08);
const SKY_NADIR: Vec3 = Vec3::new(0.005, 0.005, 0.015);
const STAR_SPLAT: f32 = 0.08;
const ENVIRONMENT_INTENSITY: f32 = 900.0;

/// Owner of the single live environment map.
#[derive(Resource, Default, Debug)]
pub struct EnvironmentMaps {
    current: Option<Handle<Image>>,
    live: usize,
    generated: u64,
    release_failures: u64,
}

impl EnvironmentMaps {
    pub fn current(&self) -> Option<&Handle<Image>> {
        self.current.as_ref()
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn generated(&self) -> u64 {
        self.generated
    }

    pub fn release_failures(&self) -> u64 {
        self.release_failures
    }

    /// Releases the previous map, then stores `image` as the live one.
    pub fn replace(&mut self, images: &mut Assets<Image>, image: Image) -> Handle<Image> {
        self.release_all(images);
        let handle = images.add(image);
        self.current = Some(handle.clone());
        self.live += 1;
        self.generated += 1;
        handle
    }

    pub fn release_all(&mut self, images: &mut Assets<Image>) {
        let Some(previous) = self.current.take() else {
            return;
        };
        if images.remove(&previous).is_none() {
            // Already gone; count it and keep going.
            self.release_failures += 1;
            warn!("environment map {:?} was missing on release", previous.id());
        }
        self.live = self.live.saturating_sub(1);
    }
}

/// Hull materials that receive the live reflections. Filled when the ship is
/// assembled, so nothing has to search the scene for them by name.
#[derive(Resource, Default, Debug, Clone)]
pub struct ReflectionTargets {
    pub hull: Vec<Handle<StandardMaterial>>,
}

/// Cube face order expected by the GPU: +X, -X, +Y, -Y, +Z, -Z.
pub fn cube_face(direction: Vec3) -> (usize, Vec2) {
    let a = direction.abs();
    let (face, sc, tc, ma) = if a.x >= a.y && a.x >= a.z {
        if direction.x > 0.0 {
            (0, -direction.z, -direction.y, a.x)
        } else {
            (1, direction.z, -direction.y, a.x)
        }
    } else if a.y >= a.z {
        if direction.y > 0.0 {
            (2, direction.x, direction.z, a.y)
        } else {
            (3, direction.x, -direction.z, a.y)
        }
    } else if direction.z > 0.0 {
        (4, direction.x, -direction.y, a.z)
    } else {
        (5, -direction.x, -direction.y, a.z)
    };
    let uv = Vec2::new(sc / ma, tc / ma) * 0.5 + Vec2::splat(0.5);
    (face, uv)
}

/// Elevation of a texel's view ray, in [-1, 1].
fn texel_elevation(face: usize, uv: Vec2) -> f32 {
    let s = uv.x * 2.0 - 1.0;
    let t = uv.y * 2.0 - 1.0;
    let direction = match face {
        0 => Vec3::new(1.0, -t, -s),
        1 => Vec3::new(-1.0, -t, s),
        2 => Vec3::new(s, 1.0, t),
        3 => Vec3::new(s, -1.0, -t),
        4 => Vec3::new(s, -t, 1.0),
        _ => Vec3::new(-s, -t, -1.0),
    };
    direction.normalize().y
}

/// Derives a cubemap of the star stream as seen from `origin`.
pub fn render_environment(origin: Vec3, stars: &[StarInstance], resolution: u32) -> Image {
    let res = resolution.max(1) as usize;
    let face_len = res * res;
    let mut light = vec![Vec3::ZERO; face_len * 6];

    for face in 0..6 {
        for y in 0..res {
            for x in 0..res {
                let uv = Vec2::new((x as f32 + 0.5) / res as f32, (y as f32 + 0.5) / res as f32);
                let h = texel_elevation(face, uv) * 0.5 + 0.5;
                light[face * face_len + y * res + x] = SKY_NADIR.lerp(SKY_ZENITH, h);
            }
        }
    }

    for star in stars {
        let Some(direction) = (star.position - origin).try_normalize() else {
            continue;
        };
        let distance = star.position.distance(origin).max(1.0);
        let (face, uv) = cube_face(direction);
        let x = ((uv.x * res as f32) as usize).min(res - 1);
        let y = ((uv.y * res as f32) as usize).min(res - 1);
        let c = star.color.color().to_linear();
        let weight = STAR_SPLAT * star.size / distance;
        light[face * face_len + y * res + x] += Vec3::new(c.red, c.green, c.blue) * weight;
    }

    let data = light
        .iter()
        .flat_map(|l| {
            let srgb = Color::linear_rgb(l.x, l.y, l.z).to_srgba();
            [
                (srgb.red.clamp(0.0, 1.0) * 255.0) as u8,
                (srgb.green.clamp(0.0, 1.0) * 255.0) as u8,
                (srgb.blue.clamp(0.0, 1.0) * 255.0) as u8,
                255,
            ]
        })
        .collect();

    let mut image = Image::new(
        Extent3d {
            width: res as u32,
            height: res as u32,
            depth_or_array_layers: 6,
        },
        TextureDimension::D2,
        data,
        TextureFormat::Rgba8UnormSrgb,
        RenderAssetUsages::RENDER_WORLD,
    );
    image.texture_view_descriptor = Some(TextureViewDescriptor {
        dimension: Some(TextureViewDimension::Cube),
        ..default()
    });
    image
}

pub struct EnvironmentPlugin;
impl Plugin for EnvironmentPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<EnvironmentMaps>()
            .init_resource::<ReflectionTargets>()
            .add_systems(OnEnter(AppState::Flying), bind_reflection_targets)
            .add_systems(
                Update,
                refresh_environment_map.in_set(FlightSet::Environment),
            )
            .add_systems(OnExit(AppState::Flying), release_environment_map);
    }
}

fn bind_reflection_targets(
    targets: Res<ReflectionTargets>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    for handle in &targets.hull {
        if let Some(material) = materials.get_mut(handle) {
            material.metallic = 1.0;
            material.perceptual_roughness = 0.12;
        }
    }
    info!("{} hull materials bound to live reflections", targets.hull.len());
}

fn refresh_environment_map(
    mut commands: Commands,
    settings: Res<FlightSettings>,
    mut maps: ResMut<EnvironmentMaps>,
    mut images: ResMut<Assets<Image>>,
    fields: Query<&StarField>,
    ships: Query<&Transform, With<Ship>>,
    mut q_cam: Query<(Entity, Option<&mut EnvironmentMapLight>), With<MainCamera>>,
) {
    let origin = ships
        .get_single()
        .map(|t| t.translation)
        .unwrap_or(Vec3::ZERO);
    let stars = fields
        .get_single()
        .map(|field| field.stars())
        .unwrap_or_default();
    let image = render_environment(origin, stars, settings.environment_resolution);
    let handle = maps.replace(&mut images, image);

    for (entity, light) in &mut q_cam {
        match light {
            Some(mut light) => {
                light.diffuse_map = handle.clone();
                light.specular_map = handle.clone();
            }
            None => {
                commands.entity(entity).insert(EnvironmentMapLight {
                    diffuse_map: handle.clone(),
                    specular_map: handle.clone(),
                    intensity: ENVIRONMENT_INTENSITY,
                });
            }
        }
    }
}

fn release_environment_map(
    mut commands: Commands,
    mut maps: ResMut<EnvironmentMaps>,
    mut images: ResMut<Assets<Image>>,
    q_cam: Query<Entity, With<EnvironmentMapLight>>,
) {
    for entity in &q_cam {
        commands.entity(entity).remove::<EnvironmentMapLight>();
    }
    maps.release_all(&mut images);
    info!(
        "environment maps released after {} generations ({} release failures)",
        maps.generated(),
        maps.release_failures()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::star_field::StarColor;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn star_at(position: Vec3) -> StarInstance {
        StarInstance {
            position,
            color: StarColor::Gold,
            size: 20.0,
            speed: 20.0,
            lane_offset: Vec2::new(position.y, position.z),
        }
    }

    #[test]
    fn at_most_one_map_is_alive() {
        let mut images = Assets::<Image>::default();
        let mut maps = EnvironmentMaps::default();
        let mut rng = StdRng::seed_from_u64(1);
        let field = StarField::new(&mut rng);

        for _ in 0..120 {
            let image = render_environment(Vec3::ZERO, field.stars(), 8);
            let handle = maps.replace(&mut images, image);
            assert_eq!(maps.live(), 1);
            assert_eq!(images.len(), 1);
            assert!(images.contains(&handle));
        }
        assert_eq!(maps.generated(), 120);

        maps.release_all(&mut images);
        assert_eq!(maps.live(), 0);
        assert_eq!(images.len(), 0);
        assert!(maps.current().is_none());
    }

    #[test]
    fn missing_map_on_release_is_not_fatal() {
        let mut images = Assets::<Image>::default();
        let mut maps = EnvironmentMaps::default();
        let first = maps.replace(&mut images, render_environment(Vec3::ZERO, &[], 4));
        images.remove(&first);

        maps.replace(&mut images, render_environment(Vec3::ZERO, &[], 4));
        assert_eq!(maps.release_failures(), 1);
        assert_eq!(maps.live(), 1);
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn cubemap_has_six_faces() {
        let image = render_environment(Vec3::ZERO, &[], 16);
        assert_eq!(image.texture_descriptor.size.depth_or_array_layers, 6);
        assert_eq!(image.data.len(), 16 * 16 * 4 * 6);
        assert_eq!(
            image
                .texture_view_descriptor
                .as_ref()
                .and_then(|d| d.dimension),
            Some(TextureViewDimension::Cube)
        );
    }

    #[test]
    fn star_brightens_the_face_it_lies_on() {
        let dark = render_environment(Vec3::ZERO, &[], 8);
        let lit = render_environment(Vec3::ZERO, &[star_at(Vec3::new(-5.0, 0.0, 0.0))], 8);
        let face_bytes = 8 * 8 * 4;
        let neg_x = face_bytes..2 * face_bytes;
        let sum = |img: &Image| img.data[neg_x.clone()].iter().map(|b| *b as u32).sum::<u32>();
        assert!(sum(&lit) > sum(&dark));
        assert_eq!(lit.data[..face_bytes], dark.data[..face_bytes]);
    }

    #[test]
    fn star_on_the_ship_is_skipped() {
        let image = render_environment(Vec3::ONE, &[star_at(Vec3::ONE)], 4);
        assert_eq!(image.data, render_environment(Vec3::ONE, &[], 4).data);
    }

    #[test]
    fn major_axis_picks_face() {
        assert_eq!(cube_face(Vec3::X).0, 0);
        assert_eq!(cube_face(Vec3::NEG_X).0, 1);
        assert_eq!(cube_face(Vec3::Y).0, 2);
        assert_eq!(cube_face(Vec3::NEG_Y).0, 3);
        assert_eq!(cube_face(Vec3::Z).0, 4);
        assert_eq!(cube_face(Vec3::NEG_Z).0, 5);
        let (_, uv) = cube_face(Vec3::Z);
        assert!((uv - Vec2::splat(0.5)).length() < 1e-6);
    }
}
