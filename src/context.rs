use std::{iter, sync::Arc};

use anyhow::{Context as _, anyhow};
use winit::window::Window;

use crate::{
    data_structures::texture::Texture,
    pipelines::basic::{input_layout, mk_fullscreen_pipeline},
    render::Backend,
    viewport::Viewport,
};

/// Format of the images passes hand to each other. Writes encode to sRGB and
/// samples decode back to linear.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

struct Frame {
    surface: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

struct Blit {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
}

pub struct Context {
    pub(crate) window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    frame: Option<Frame>,
    blit: Blit,
}

impl Context {
    pub async fn new(window: Arc<Window>, viewport: &Viewport) -> anyhow::Result<Self> {
        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("cannot create a surface for the window")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no compatible GPU adapter")?;
        log::info!("device and queue");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features, so if
                // we're building for the web we'll have to disable some.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                ..Default::default()
            })
            .await
            .context("cannot open the GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow!("the surface supports no formats"))?;
        // The canvas is composited over the page, keep its alpha if we can.
        let alpha_mode = [
            wgpu::CompositeAlphaMode::PreMultiplied,
            wgpu::CompositeAlphaMode::PostMultiplied,
        ]
        .into_iter()
        .find(|mode| surface_caps.alpha_modes.contains(mode))
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let [width, height] = viewport.physical_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let layout = input_layout(&device, "blit_bind_group_layout", false);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = mk_fullscreen_pipeline(
            &device,
            "Blit Pipeline",
            &pipeline_layout,
            config.format,
            wgpu::ShaderModuleDescriptor {
                label: Some("Blit Shader"),
                source: wgpu::ShaderSource::Wgsl(include_str!("pipelines/blit.wgsl").into()),
            },
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            frame: None,
            blit: Blit { pipeline, layout },
        })
    }

    /// Encoder of the frame in flight.
    pub fn encoder(&mut self) -> anyhow::Result<&mut wgpu::CommandEncoder> {
        self.frame
            .as_mut()
            .map(|frame| &mut frame.encoder)
            .ok_or_else(|| anyhow!("no frame in flight"))
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }
}

impl Backend for Context {
    type Target = Texture;

    fn begin_frame(&mut self) -> anyhow::Result<bool> {
        // The surface image of an unfinished frame must be released first.
        self.abort_frame();
        let surface = match self.surface.get_current_texture() {
            Ok(surface) => surface,
            // Reconfigure the surface if it's lost or outdated
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost or outdated, reconfiguring");
                self.reconfigure();
                return Ok(false);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("timed out waiting for the next surface image");
                return Ok(false);
            }
            Err(e) => return Err(anyhow!("cannot acquire the next frame: {e}")),
        };
        let view = surface
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        self.frame = Some(Frame {
            surface,
            view,
            encoder,
        });
        Ok(true)
    }

    fn present(&mut self, output: &Texture) -> anyhow::Result<()> {
        let mut frame = self
            .frame
            .take()
            .ok_or_else(|| anyhow!("present without a frame in flight"))?;
        let sampler = output
            .sampler
            .as_ref()
            .ok_or_else(|| anyhow!("pass output has no sampler"))?;
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit_bind_group"),
            layout: &self.blit.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&output.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        {
            let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Blit Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
            render_pass.set_pipeline(&self.blit.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        self.queue.submit(iter::once(frame.encoder.finish()));
        self.window.pre_present_notify();
        frame.surface.present();
        Ok(())
    }

    fn abort_frame(&mut self) {
        if self.frame.take().is_some() {
            log::debug!("dropping an unfinished frame");
        }
    }

    fn resize(&mut self, viewport: &Viewport) {
        let [width, height] = viewport.physical_size();
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        // A frame acquired at the old size must not be presented.
        self.frame = None;
        self.reconfigure();
    }
}
