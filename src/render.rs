//! Render composition.
//!
//! A [`RenderChain`] is an ordered list of [`Pass`]es over a [`Backend`]. Every
//! frame runs every pass in declared order against the live [`Scene`]: the
//! first pass rasterizes the scene, each later pass reads the previous pass's
//! output and produces a new full-frame image. The backend presents the last
//! output.
//!
//! # Key types
//!
//! - [`Backend`] is the device a chain draws with (the wgpu [`crate::context::Context`] in production)
//! - [`Pass`] is one stage of the chain
//! - [`RenderChain`] owns the backend, the passes and the current viewport

use crate::{camera::Camera, data_structures::scene_graph::Scene, viewport::Viewport};

/// Device-level operations the chain needs around its passes.
pub trait Backend {
    /// Image type passes hand to each other.
    type Target;

    /// Prepare a frame. `Ok(false)` skips the frame, e.g. while the surface is
    /// being reconfigured.
    fn begin_frame(&mut self) -> anyhow::Result<bool>;

    /// Show the final image.
    fn present(&mut self, output: &Self::Target) -> anyhow::Result<()>;

    /// Drop a frame begun with [`Backend::begin_frame`] without showing it.
    fn abort_frame(&mut self);

    /// Resize frame-level resources such as the swap chain.
    fn resize(&mut self, viewport: &Viewport);
}

/// One stage of the chain.
pub trait Pass<B: Backend> {
    fn label(&self) -> &str;

    /// Reallocate internal buffers for `viewport`.
    fn resize(&mut self, backend: &B, viewport: &Viewport);

    /// Size of the pass output, `[width, height]` in device pixels.
    fn target_size(&self) -> [u32; 2];

    /// Draw. `input` is the previous pass's output, `None` for the first pass.
    fn execute(
        &mut self,
        backend: &mut B,
        scene: &Scene,
        input: Option<&B::Target>,
    ) -> anyhow::Result<&B::Target>;
}

pub struct RenderChain<B: Backend> {
    backend: B,
    passes: Vec<Box<dyn Pass<B>>>,
    viewport: Viewport,
    frames: u64,
}

impl<B: Backend> RenderChain<B> {
    pub fn new(backend: B, viewport: Viewport) -> Self {
        Self {
            backend,
            passes: Vec::new(),
            viewport,
            frames: 0,
        }
    }

    /// Replace the chain. Passes are sized for the current viewport before the
    /// next frame runs.
    pub fn configure(&mut self, passes: Vec<Box<dyn Pass<B>>>) {
        self.passes = passes;
        for pass in &mut self.passes {
            pass.resize(&self.backend, &self.viewport);
        }
        log::info!("render chain configured: {:?}", self.labels());
    }

    /// Apply a new viewport to the backend, every pass and `camera` together.
    ///
    /// Returns whether anything changed. Empty viewports are ignored.
    pub fn resize(&mut self, viewport: Viewport, camera: &mut Camera) -> bool {
        if viewport.is_empty() {
            log::warn!("ignoring resize to an empty viewport {viewport:?}");
            return false;
        }
        if viewport == self.viewport {
            return false;
        }
        self.backend.resize(&viewport);
        for pass in &mut self.passes {
            pass.resize(&self.backend, &viewport);
        }
        camera.set_aspect(viewport.aspect());
        self.viewport = viewport;
        true
    }

    /// Run every pass in order and present the last output.
    pub fn render(&mut self, scene: &Scene) -> anyhow::Result<()> {
        if !self.backend.begin_frame()? {
            return Ok(());
        }
        let mut output: Option<&B::Target> = None;
        for pass in &mut self.passes {
            let label = pass.label().to_string();
            match pass.execute(&mut self.backend, scene, output) {
                Ok(image) => output = Some(image),
                Err(err) => {
                    self.backend.abort_frame();
                    return Err(err.context(format!("pass {label} failed")));
                }
            }
        }
        if let Some(output) = output {
            self.backend.present(output)?;
        }
        self.frames += 1;
        Ok(())
    }

    pub fn labels(&self) -> Vec<&str> {
        self.passes.iter().map(|pass| pass.label()).collect()
    }

    pub fn target_sizes(&self) -> Vec<[u32; 2]> {
        self.passes.iter().map(|pass| pass.target_size()).collect()
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
