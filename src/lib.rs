//! flow-stage
//!
//! A cross-platform runtime for an interactive hero scene: an environment-lit
//! model rendered through a small post-processing chain, rotated by the
//! pointer, next to page elements scrubbed by scroll position. Runs natively
//! and in the browser through WASM.
//!
//! High-level modules
//! - `animation`: easing curves, retargetable tweens, scroll timelines and the interaction animator
//! - `camera`: perspective camera and its uniform
//! - `config`: TOML-backed runtime configuration
//! - `context`: wgpu device, surface and the production render backend
//! - `data_structures`: scene graph, model and environment data, transforms, textures
//! - `flow`: winit event loop and platform glue
//! - `input`: input events and listener subscriptions
//! - `pipelines`: the scene and RGB shift passes and their shaders
//! - `render`: render chain composition over a backend
//! - `resources`: asset fetching, decoding and the ordered resource pipeline
//! - `scheduler`: frame pacing
//! - `stage`: the per-page context tying scene, animator and viewport together
//! - `viewport`: viewport size and pixel ratio
//!

pub mod animation;
pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod flow;
pub mod input;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod scheduler;
pub mod stage;
pub mod viewport;

// Re-exports commonly used types for convenience in downstream code.
pub use animation::InteractionAnimator;
pub use config::StageConfig;
pub use data_structures::scene_graph::{Scene, SceneSink, SceneUpdate};
pub use render::{Backend, Pass, RenderChain};
pub use resources::{AssetLoader, AssetSource, LoadError, ResourcePipeline};
pub use scheduler::{FrameScheduler, FrameTick};
pub use stage::Stage;
pub use viewport::Viewport;
