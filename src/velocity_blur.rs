use bevy::{
    core_pipeline::{
        core_3d::graph::{Core3d, Node3d},
        fullscreen_vertex_shader::fullscreen_shader_vertex_state,
    },
    ecs::query::QueryItem,
    prelude::*,
    render::{
        extract_component::{
            ComponentUniforms, DynamicUniformIndex, ExtractComponent, ExtractComponentPlugin,
            UniformComponentPlugin,
        },
        render_graph::{
            NodeRunError, RenderGraphApp, RenderGraphContext, RenderLabel, ViewNode, ViewNodeRunner,
        },
        render_resource::{
            binding_types::{sampler, texture_2d, uniform_buffer},
            *,
        },
        renderer::{RenderContext, RenderDevice},
        view::ViewTarget,
        RenderApp,
    },
};

use crate::camera_rig::FOV_EASE;
use crate::flight::{approach, AppState, FlightMode, FlightSet, FlightSettings};
use crate::MainCamera;

pub const BLUR_SHADER_PATH: &str = "shaders/velocity_blur.wgsl";
/// Screen-space streak direction: the +X star stream seen from either framing.
pub const BLUR_DIRECTION: Vec2 = Vec2::X;
/// Half-length of the blur kernel in UV units at full turbo.
pub const BLUR_STRENGTH: f32 = 0.02;

/// Per-camera blur uniform, rewritten every frame from the flight mode.
#[derive(Component, Debug, Default, Clone, Copy, PartialEq, ExtractComponent, ShaderType)]
pub struct VelocityBlurSettings {
    pub direction: Vec2,
    pub intensity: f32,
    pub samples: u32,
}

pub fn target_intensity(mode: FlightMode) -> f32 {
    mode.factor() * BLUR_STRENGTH
}

impl VelocityBlurSettings {
    pub fn off(samples: u32) -> Self {
        Self {
            direction: BLUR_DIRECTION,
            intensity: 0.0,
            samples,
        }
    }

    /// Next frame's uniform. With `smooth` the intensity eases like the
    /// camera FOV; otherwise it jumps straight to 0 or full strength.
    pub fn next(self, mode: FlightMode, samples: u32, smooth: bool) -> Self {
        let target = target_intensity(mode);
        let intensity = if smooth {
            approach(self.intensity, target, FOV_EASE)
        } else {
            target
        };
        Self {
            direction: BLUR_DIRECTION,
            intensity,
            samples,
        }
    }
}

/// Drives the blur uniform on the main camera.
pub struct VelocityBlurPlugin;
impl Plugin for VelocityBlurPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(OnEnter(AppState::Flying), attach_blur)
            .add_systems(Update, drive_blur.in_set(FlightSet::Blur))
            .add_systems(OnExit(AppState::Flying), detach_blur);
    }
}

fn attach_blur(
    mut commands: Commands,
    settings: Res<FlightSettings>,
    q_cam: Query<Entity, With<MainCamera>>,
) {
    for entity in &q_cam {
        commands
            .entity(entity)
            .insert(VelocityBlurSettings::off(settings.blur_samples));
    }
}

fn drive_blur(
    mode: Res<FlightMode>,
    settings: Res<FlightSettings>,
    mut q_blur: Query<&mut VelocityBlurSettings, With<MainCamera>>,
) {
    for mut blur in &mut q_blur {
        *blur = blur.next(*mode, settings.blur_samples, settings.smooth_blur);
    }
}

fn detach_blur(mut commands: Commands, q_blur: Query<Entity, With<VelocityBlurSettings>>) {
    for entity in &q_blur {
        commands.entity(entity).remove::<VelocityBlurSettings>();
    }
}

/// Render-world half: a fullscreen pass after tonemapping.
pub struct VelocityBlurRenderPlugin;

impl Plugin for VelocityBlurRenderPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            ExtractComponentPlugin::<VelocityBlurSettings>::default(),
            UniformComponentPlugin::<VelocityBlurSettings>::default(),
        ));

        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app
            .add_render_graph_node::<ViewNodeRunner<VelocityBlurNode>>(Core3d, VelocityBlurLabel)
            .add_render_graph_edges(
                Core3d,
                (
                    Node3d::Tonemapping,
                    VelocityBlurLabel,
                    Node3d::EndMainPassPostProcessing,
                ),
            );
    }

    fn finish(&self, app: &mut App) {
        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };

        render_app.init_resource::<VelocityBlurPipeline>();
    }
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
struct VelocityBlurLabel;

#[derive(Default)]
struct VelocityBlurNode;

impl ViewNode for VelocityBlurNode {
    type ViewQuery = (
        &'static ViewTarget,
        &'static VelocityBlurSettings,
        &'static DynamicUniformIndex<VelocityBlurSettings>,
    );

    fn run(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext,
        (view_target, blur_settings, settings_index): QueryItem<Self::ViewQuery>,
        world: &World,
    ) -> Result<(), NodeRunError> {
        // Nothing to smear; skip the extra fullscreen pass.
        if blur_settings.intensity <= 0.0 {
            return Ok(());
        }

        let blur_pipeline = world.resource::<VelocityBlurPipeline>();
        let pipeline_cache = world.resource::<PipelineCache>();

        let Some(pipeline) = pipeline_cache.get_render_pipeline(blur_pipeline.pipeline_id) else {
            return Ok(());
        };

        let settings_uniforms = world.resource::<ComponentUniforms<VelocityBlurSettings>>();
        let Some(settings_binding) = settings_uniforms.uniforms().binding() else {
            return Ok(());
        };

        let post_process = view_target.post_process_write();

        let bind_group = render_context.render_device().create_bind_group(
            "velocity_blur_bind_group",
            &blur_pipeline.layout,
            &BindGroupEntries::sequential((
                post_process.source,
                &blur_pipeline.sampler,
                settings_binding.clone(),
            )),
        );

        let mut render_pass = render_context.begin_tracked_render_pass(RenderPassDescriptor {
            label: Some("velocity_blur_pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view: post_process.destination,
                resolve_target: None,
                ops: Operations::default(),
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_render_pipeline(pipeline);
        render_pass.set_bind_group(0, &bind_group, &[settings_index.index()]);
        render_pass.draw(0..3, 0..1);

        Ok(())
    }
}

#[derive(Resource)]
struct VelocityBlurPipeline {
    layout: BindGroupLayout,
    sampler: Sampler,
    pipeline_id: CachedRenderPipelineId,
}

impl FromWorld for VelocityBlurPipeline {
    fn from_world(world: &mut World) -> Self {
        let render_device = world.resource::<RenderDevice>();

        let layout = render_device.create_bind_group_layout(
            "velocity_blur_bind_group_layout",
            &BindGroupLayoutEntries::sequential(
                ShaderStages::FRAGMENT,
                (
                    texture_2d(TextureSampleType::Float { filterable: true }),
                    sampler(SamplerBindingType::Filtering),
                    uniform_buffer::<VelocityBlurSettings>(true),
                ),
            ),
        );

        let sampler = render_device.create_sampler(&SamplerDescriptor {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            ..default()
        });

        let shader = world.resource::<AssetServer>().load(BLUR_SHADER_PATH);

        let pipeline_id =
            world
                .resource_mut::<PipelineCache>()
                .queue_render_pipeline(RenderPipelineDescriptor {
                    label: Some("velocity_blur_pipeline".into()),
                    layout: vec![layout.clone()],
                    vertex: fullscreen_shader_vertex_state(),
                    fragment: Some(FragmentState {
                        shader,
                        shader_defs: vec![],
                        entry_point: "fragment".into(),
                        // The main camera renders in HDR; the pass runs before upscaling.
                        targets: vec![Some(ColorTargetState {
                            format: ViewTarget::TEXTURE_FORMAT_HDR,
                            blend: None,
                            write_mask: ColorWrites::ALL,
                        })],
                    }),
                    primitive: PrimitiveState::default(),
                    depth_stencil: None,
                    multisample: MultisampleState::default(),
                    push_constant_ranges: vec![],
                });

        Self {
            layout,
            sampler,
            pipeline_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intensity_is_binary_without_smoothing() {
        let off = VelocityBlurSettings::off(12);
        assert_eq!(off.next(FlightMode::Manual, 12, false).intensity, 0.0);
        let on = off.next(FlightMode::Turbo, 12, false);
        assert_eq!(on.intensity, BLUR_STRENGTH);
        assert_eq!(on.direction, BLUR_DIRECTION);
        assert_eq!(on.samples, 12);
        assert_eq!(on.next(FlightMode::Manual, 12, false).intensity, 0.0);
    }

    #[test]
    fn smoothed_intensity_eases_like_fov() {
        let mut blur = VelocityBlurSettings::off(8);
        blur = blur.next(FlightMode::Turbo, 8, true);
        assert!((blur.intensity - BLUR_STRENGTH * FOV_EASE).abs() < 1e-9);
        for _ in 0..500 {
            let next = blur.next(FlightMode::Turbo, 8, true);
            assert!(next.intensity >= blur.intensity);
            assert!(next.intensity <= BLUR_STRENGTH);
            blur = next;
        }
        assert!(blur.intensity > BLUR_STRENGTH * 0.99);
    }

    #[test]
    fn manual_mode_never_blurs() {
        let mut blur = VelocityBlurSettings::off(12);
        for _ in 0..100 {
            blur = blur.next(FlightMode::Manual, 12, true);
            assert_eq!(blur.intensity, 0.0);
        }
    }
}
