pub mod environment;
pub mod model;
pub mod scene_graph;
pub mod texture;
pub mod transform;
