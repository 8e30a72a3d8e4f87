//! First pass of the chain: rasterizes the scene into an offscreen target.
//!
//! GPU copies of scene data are created lazily. The environment texture is
//! re-uploaded only when the scene's [`EnvironmentId`] changes and the old one
//! is destroyed right away; model meshes are uploaded once per [`ModelId`].

use std::mem;

use anyhow::anyhow;
use wgpu::util::DeviceExt;

use crate::{
    camera::CameraUniform,
    config::RenderConfig,
    context::{Context, TARGET_FORMAT},
    data_structures::{
        environment::{EnvironmentId, PrefilteredEnvironment},
        model::{ImageData, Material, ModelData, ModelVertex, Vertex},
        scene_graph::{ModelId, Scene},
        texture::{Texture, create_default_sampler},
        transform::TransformRaw,
    },
    pipelines::basic::{mk_render_pipeline, texture_entries, uniform_entry},
    render::Pass,
    viewport::Viewport,
};

/// Point lights beyond this count are ignored by the shader.
pub const MAX_LIGHTS: usize = 4;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneUniform {
    camera: CameraUniform,
    // exposure, highest environment mip, light count, environment present
    params: [f32; 4],
    light_positions: [[f32; 4]; MAX_LIGHTS],
    light_colours: [[f32; 4]; MAX_LIGHTS],
}

impl SceneUniform {
    pub fn new() -> Self {
        Self {
            camera: CameraUniform::new(),
            params: [1.0, 0.0, 0.0, 0.0],
            light_positions: [[0.0; 4]; MAX_LIGHTS],
            light_colours: [[0.0; 4]; MAX_LIGHTS],
        }
    }

    pub fn update(&mut self, scene: &Scene, exposure: f32) {
        self.camera.update_view_proj(&scene.camera);
        if scene.lights.len() > MAX_LIGHTS {
            log::debug!(
                "{} lights in the scene, only the first {MAX_LIGHTS} are drawn",
                scene.lights.len()
            );
        }
        self.light_positions = [[0.0; 4]; MAX_LIGHTS];
        self.light_colours = [[0.0; 4]; MAX_LIGHTS];
        for (i, light) in scene.lights.iter().take(MAX_LIGHTS).enumerate() {
            let [x, y, z] = light.position;
            let [r, g, b] = light.colour.map(|c| c * light.intensity);
            self.light_positions[i] = [x, y, z, 1.0];
            self.light_colours[i] = [r, g, b, 1.0];
        }
        let (max_lod, has_environment) = match scene.environment() {
            Some(environment) => (environment.levels().len().saturating_sub(1) as f32, 1.0),
            None => (0.0, 0.0),
        };
        self.params = [
            exposure,
            max_lod,
            scene.lights.len().min(MAX_LIGHTS) as f32,
            has_environment,
        ];
    }
}

impl Default for SceneUniform {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct MaterialUniform {
    base_colour: [f32; 4],
    // metallic, roughness
    params: [f32; 4],
    // rgb, w unused
    emissive: [f32; 4],
}

impl From<&Material> for MaterialUniform {
    fn from(material: &Material) -> Self {
        Self {
            base_colour: material.base_colour,
            params: [material.metallic, material.roughness, 0.0, 0.0],
            emissive: [material.emissive[0], material.emissive[1], material.emissive[2], 0.0],
        }
    }
}

struct GpuEnvironment {
    id: Option<EnvironmentId>,
    texture: Texture,
    bind_group: wgpu::BindGroup,
}

struct GpuMesh {
    name: String,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_elements: u32,
    material: usize,
}

struct GpuMaterial {
    _textures: [Texture; 3],
    bind_group: wgpu::BindGroup,
}

struct GpuModel {
    id: ModelId,
    meshes: Vec<GpuMesh>,
    materials: Vec<GpuMaterial>,
}

pub struct ScenePass {
    pipeline: wgpu::RenderPipeline,
    scene_layout: wgpu::BindGroupLayout,
    material_layout: wgpu::BindGroupLayout,
    uniform: SceneUniform,
    uniform_buffer: wgpu::Buffer,
    instance_buffer: wgpu::Buffer,
    environment: GpuEnvironment,
    model: Option<GpuModel>,
    fallback_material: GpuMaterial,
    target: Texture,
    depth: Texture,
    exposure: f32,
    clear_colour: wgpu::Color,
}

impl ScenePass {
    pub fn new(context: &Context, config: &RenderConfig) -> Self {
        let device = &context.device;

        let [env_texture, env_sampler] = texture_entries(1, wgpu::ShaderStages::FRAGMENT);
        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene_bind_group_layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
                env_texture,
                env_sampler,
            ],
        });
        let [base_texture, sampler] = texture_entries(1, wgpu::ShaderStages::FRAGMENT);
        let [metallic_roughness_texture, _] = texture_entries(3, wgpu::ShaderStages::FRAGMENT);
        let [emissive_texture, _] = texture_entries(4, wgpu::ShaderStages::FRAGMENT);
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material_bind_group_layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT),
                base_texture,
                sampler,
                metallic_roughness_texture,
                emissive_texture,
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&scene_layout, &material_layout],
            push_constant_ranges: &[],
        });
        let shader = wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("scene.wgsl").into()),
        };
        let pipeline = mk_render_pipeline(
            device,
            "Scene Pipeline",
            &layout,
            TARGET_FORMAT,
            Some(wgpu::BlendState::ALPHA_BLENDING),
            Some(Texture::DEPTH_FORMAT),
            &[ModelVertex::desc(), TransformRaw::desc()],
            shader,
        );

        let uniform = SceneUniform::new();
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Uniform Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance Buffer"),
            size: mem::size_of::<TransformRaw>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let placeholder = Texture::placeholder_environment(device, &context.queue);
        let environment = GpuEnvironment {
            id: None,
            bind_group: mk_scene_bind_group(device, &scene_layout, &uniform_buffer, &placeholder),
            texture: placeholder,
        };
        let fallback_material =
            mk_material(device, &context.queue, &material_layout, &Material::default(), "fallback");

        let size = context_size(context);
        let [r, g, b, a] = config.clear_colour;
        Self {
            pipeline,
            scene_layout,
            material_layout,
            uniform,
            uniform_buffer,
            instance_buffer,
            environment,
            model: None,
            fallback_material,
            target: Texture::create_render_target(device, size, TARGET_FORMAT, "scene target"),
            depth: Texture::create_depth_texture(device, size, "scene depth"),
            exposure: config.exposure,
            clear_colour: wgpu::Color { r, g, b, a },
        }
    }

    /// Upload `environment` unless it is the one already resident.
    fn sync_environment(&mut self, context: &Context, environment: &PrefilteredEnvironment) {
        if self.environment.id == Some(environment.id()) {
            return;
        }
        let texture = Texture::from_environment(&context.device, &context.queue, environment);
        let bind_group = mk_scene_bind_group(
            &context.device,
            &self.scene_layout,
            &self.uniform_buffer,
            &texture,
        );
        let old = mem::replace(
            &mut self.environment,
            GpuEnvironment {
                id: Some(environment.id()),
                texture,
                bind_group,
            },
        );
        old.texture.texture.destroy();
        log::info!(
            "environment {:?} uploaded with {} mip levels",
            environment.id(),
            environment.levels().len()
        );
    }

    fn sync_model(&mut self, context: &Context, id: ModelId, data: &ModelData) {
        if self.model.as_ref().is_some_and(|model| model.id == id) {
            return;
        }
        let device = &context.device;
        let materials = data
            .materials
            .iter()
            .map(|material| {
                mk_material(device, &context.queue, &self.material_layout, material, &material.name)
            })
            .collect();
        let meshes = data
            .meshes
            .iter()
            .filter(|mesh| !mesh.indices.is_empty())
            .map(|mesh| GpuMesh {
                name: mesh.name.clone(),
                vertex_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{} Vertex Buffer", mesh.name)),
                    contents: bytemuck::cast_slice(&mesh.vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                }),
                index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{} Index Buffer", mesh.name)),
                    contents: bytemuck::cast_slice(&mesh.indices),
                    usage: wgpu::BufferUsages::INDEX,
                }),
                num_elements: mesh.indices.len() as u32,
                material: mesh.material,
            })
            .collect::<Vec<_>>();
        log::info!("model {id:?} uploaded: {} meshes", meshes.len());
        self.model = Some(GpuModel {
            id,
            meshes,
            materials,
        });
    }
}

impl Pass<Context> for ScenePass {
    fn label(&self) -> &str {
        "scene"
    }

    fn resize(&mut self, context: &Context, viewport: &Viewport) {
        let size = viewport.physical_size();
        self.target =
            Texture::create_render_target(&context.device, size, TARGET_FORMAT, "scene target");
        self.depth = Texture::create_depth_texture(&context.device, size, "scene depth");
    }

    fn target_size(&self) -> [u32; 2] {
        self.target.size()
    }

    fn execute(
        &mut self,
        context: &mut Context,
        scene: &Scene,
        input: Option<&Texture>,
    ) -> anyhow::Result<&Texture> {
        if input.is_some() {
            return Err(anyhow!("the scene pass must run first"));
        }
        if let Some(environment) = scene.environment() {
            self.sync_environment(context, environment);
        }
        if let Some(node) = scene.model() {
            self.sync_model(context, node.id(), node.data());
            context.queue.write_buffer(
                &self.instance_buffer,
                0,
                bytemuck::cast_slice(&[node.transform.to_raw()]),
            );
        }
        self.uniform.update(scene, self.exposure);
        context
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[self.uniform]));

        let encoder = context.encoder()?;
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear_colour),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });

        // Nothing to draw until the model arrives; the cleared target still
        // flows down the chain.
        if let (Some(model), Some(_)) = (&self.model, scene.model()) {
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.environment.bind_group, &[]);
            render_pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
            for mesh in &model.meshes {
                let material = model
                    .materials
                    .get(mesh.material)
                    .unwrap_or(&self.fallback_material);
                render_pass.set_bind_group(1, &material.bind_group, &[]);
                render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..mesh.num_elements, 0, 0..1);
                log::trace!("drew mesh {}", mesh.name);
            }
        }
        drop(render_pass);

        Ok(&self.target)
    }
}

fn context_size(context: &Context) -> [u32; 2] {
    [context.config.width, context.config.height]
}

fn mk_scene_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniform_buffer: &wgpu::Buffer,
    environment: &Texture,
) -> wgpu::BindGroup {
    let sampler = environment.sampler.clone().unwrap_or_else(|| {
        crate::data_structures::texture::create_environment_sampler(device)
    });
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("scene_bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&environment.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&sampler),
            },
        ],
    })
}

fn mk_material(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    material: &Material,
    label: &str,
) -> GpuMaterial {
    // A missing map is white, which leaves its factor unchanged.
    let upload = |image: &Option<ImageData>, format| match image {
        Some(image) => Texture::from_image(device, queue, image, format, label),
        None => Texture::solid(device, queue, [255; 4], format, label),
    };
    let base_colour = upload(&material.base_colour_texture, Texture::COLOUR_FORMAT);
    let metallic_roughness =
        upload(&material.metallic_roughness_texture, Texture::LINEAR_FORMAT);
    let emissive = upload(&material.emissive_texture, Texture::COLOUR_FORMAT);
    let sampler = base_colour
        .sampler
        .clone()
        .unwrap_or_else(|| create_default_sampler(device));
    let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{label} Material Buffer")),
        contents: bytemuck::cast_slice(&[MaterialUniform::from(material)]),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&base_colour.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&sampler),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(&metallic_roughness.view),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::TextureView(&emissive.view),
            },
        ],
    });
    GpuMaterial {
        _textures: [base_colour, metallic_roughness, emissive],
        bind_group,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::PrefilterConfig,
        data_structures::{
            environment::{EquirectImage, prefilter},
            scene_graph::Light,
        },
    };

    #[test]
    fn uniform_matches_the_shader_block() {
        // vec4 + mat4 + vec4 + 2 * array<vec4, 4>
        assert_eq!(mem::size_of::<SceneUniform>(), 224);
        assert_eq!(mem::size_of::<MaterialUniform>(), 48);
    }

    #[test]
    fn material_uniform_carries_emission() {
        let material = Material {
            metallic: 0.25,
            roughness: 0.75,
            emissive: [1.0, 0.5, 0.0],
            ..Material::default()
        };
        let uniform = MaterialUniform::from(&material);
        assert_eq!(uniform.params, [0.25, 0.75, 0.0, 0.0]);
        assert_eq!(uniform.emissive, [1.0, 0.5, 0.0, 0.0]);
        assert_eq!(MaterialUniform::from(&Material::default()).emissive, [0.0; 4]);
    }

    #[test]
    fn lights_are_capped_and_premultiplied() {
        let mut scene = Scene::default();
        scene.lights = (0..6)
            .map(|i| Light {
                position: [i as f32, 0.0, 0.0],
                colour: [1.0, 0.5, 0.0],
                intensity: 2.0,
            })
            .collect();
        let mut uniform = SceneUniform::new();
        uniform.update(&scene, 1.5);
        assert_eq!(uniform.params[0], 1.5);
        assert_eq!(uniform.params[2], MAX_LIGHTS as f32);
        assert_eq!(uniform.light_colours[0], [2.0, 1.0, 0.0, 1.0]);
        assert_eq!(uniform.light_positions[3], [3.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn environment_mips_drive_the_lod_range() {
        let mut scene = Scene::default();
        let mut uniform = SceneUniform::new();
        uniform.update(&scene, 1.0);
        assert_eq!(uniform.params[3], 0.0);

        let raw = EquirectImage::new(64, 32, vec![[1.0; 4]; 64 * 32]).unwrap();
        let environment = prefilter(raw, "probe", &PrefilterConfig::default());
        let levels = environment.levels().len();
        scene.set_environment(Arc::new(environment));
        uniform.update(&scene, 1.0);
        assert_eq!(uniform.params[1], (levels - 1) as f32);
        assert_eq!(uniform.params[3], 1.0);
    }
}
