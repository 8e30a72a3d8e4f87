use anyhow::anyhow;
use wgpu::util::DeviceExt;

use crate::{
    config::RenderConfig,
    context::{Context, TARGET_FORMAT},
    data_structures::{scene_graph::Scene, texture::Texture},
    pipelines::basic::{input_layout, mk_fullscreen_pipeline},
    render::Pass,
    viewport::Viewport,
};

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShiftUniform {
    // amount, angle, unused, unused
    params: [f32; 4],
}

impl ShiftUniform {
    pub fn new(amount: f32, angle: f32) -> Self {
        Self {
            params: [amount, angle, 0.0, 0.0],
        }
    }

    /// Texture-space offset of the red channel; blue uses the negation.
    pub fn offset(&self) -> [f32; 2] {
        let [amount, angle, ..] = self.params;
        [amount * angle.cos(), amount * angle.sin()]
    }
}

pub struct RgbShiftPass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    target: Texture,
}

impl RgbShiftPass {
    pub fn new(context: &Context, config: &RenderConfig) -> Self {
        let device = &context.device;
        let layout = input_layout(device, "rgb_shift_bind_group_layout", true);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("RGB Shift Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = mk_fullscreen_pipeline(
            device,
            "RGB Shift Pipeline",
            &pipeline_layout,
            TARGET_FORMAT,
            wgpu::ShaderModuleDescriptor {
                label: Some("RGB Shift Shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("rgb_shift.wgsl").into()),
            },
        );
        let uniform = ShiftUniform::new(config.effect_amount, config.effect_angle);
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("RGB Shift Uniform Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let size = [context.config.width, context.config.height];
        Self {
            pipeline,
            layout,
            uniform_buffer,
            target: Texture::create_render_target(device, size, TARGET_FORMAT, "rgb shift target"),
        }
    }
}

impl Pass<Context> for RgbShiftPass {
    fn label(&self) -> &str {
        "rgb-shift"
    }

    fn resize(&mut self, context: &Context, viewport: &Viewport) {
        self.target = Texture::create_render_target(
            &context.device,
            viewport.physical_size(),
            TARGET_FORMAT,
            "rgb shift target",
        );
    }

    fn target_size(&self) -> [u32; 2] {
        self.target.size()
    }

    fn execute(
        &mut self,
        context: &mut Context,
        _scene: &Scene,
        input: Option<&Texture>,
    ) -> anyhow::Result<&Texture> {
        let input = input.ok_or_else(|| anyhow!("rgb shift needs the previous pass output"))?;
        let sampler = input
            .sampler
            .as_ref()
            .ok_or_else(|| anyhow!("rgb shift input has no sampler"))?;
        let bind_group = context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("rgb_shift_bind_group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&input.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let encoder = context.encoder()?;
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("RGB Shift Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        Ok(&self.target)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    #[test]
    fn zero_angle_shifts_horizontally() {
        let [x, y] = ShiftUniform::new(0.003, 0.0).offset();
        assert_eq!(x, 0.003);
        assert_eq!(y, 0.0);
    }

    #[test]
    fn quarter_turn_shifts_vertically() {
        let [x, y] = ShiftUniform::new(0.01, FRAC_PI_2).offset();
        assert!(x.abs() < 1e-6);
        assert!((y - 0.01).abs() < 1e-6);
    }

    #[test]
    fn zero_amount_is_identity() {
        assert_eq!(ShiftUniform::new(0.0, 1.3).offset(), [0.0, 0.0]);
    }
}
