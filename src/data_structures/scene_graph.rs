//! The scene the render chain draws every frame.
//!
//! A [`Scene`] owns the camera, optional point lights, at most one prefiltered
//! environment and at most one model node. The resource pipeline fills the
//! environment and model slots through a [`SceneSink`]; the interaction
//! animator writes the model's pose; the render chain only reads.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use anyhow::anyhow;

use crate::{
    camera::Camera,
    data_structures::{
        environment::PrefilteredEnvironment, model::ModelData, transform::Transform,
    },
};

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(u64);

/// A loaded model placed in the scene.
#[derive(Clone, Debug)]
pub struct ModelNode {
    id: ModelId,
    pub name: String,
    pub transform: Transform,
    data: Arc<ModelData>,
}

impl ModelNode {
    /// A node at the origin with identity orientation.
    pub fn new(name: impl Into<String>, data: Arc<ModelData>) -> Self {
        Self {
            id: ModelId(NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            transform: Transform::new(),
            data,
        }
    }

    /// Unique per loaded model; GPU meshes are cached by it.
    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn data(&self) -> &ModelData {
        &self.data
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub position: [f32; 3],
    pub colour: [f32; 3],
    pub intensity: f32,
}

#[derive(Debug, Default)]
pub struct Scene {
    pub camera: Camera,
    pub lights: Vec<Light>,
    environment: Option<Arc<PrefilteredEnvironment>>,
    model: Option<ModelNode>,
}

impl Scene {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            ..Default::default()
        }
    }

    pub fn environment(&self) -> Option<&Arc<PrefilteredEnvironment>> {
        self.environment.as_ref()
    }

    /// Install a new environment. The previous one is handed back so the caller
    /// decides when it is released; dropping it is enough.
    pub fn set_environment(
        &mut self,
        environment: Arc<PrefilteredEnvironment>,
    ) -> Option<Arc<PrefilteredEnvironment>> {
        log::info!(
            "environment {:?} from {} installed",
            environment.id(),
            environment.source()
        );
        self.environment.replace(environment)
    }

    pub fn model(&self) -> Option<&ModelNode> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut ModelNode> {
        self.model.as_mut()
    }

    pub fn set_model(&mut self, model: ModelNode) -> Option<ModelNode> {
        log::info!("model {} ({:?}) added to the scene", model.name, model.id());
        self.model.replace(model)
    }

    pub fn apply(&mut self, update: SceneUpdate) {
        match update {
            SceneUpdate::Environment(environment) => {
                self.set_environment(environment);
            }
            SceneUpdate::Model(model) => {
                self.set_model(model);
            }
        }
    }
}

/// A mutation the resource pipeline hands to whoever owns the scene.
#[derive(Debug)]
pub enum SceneUpdate {
    Environment(Arc<PrefilteredEnvironment>),
    Model(ModelNode),
}

impl SceneUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Environment(_) => "environment",
            Self::Model(_) => "model",
        }
    }
}

/// Receiver of scene updates.
///
/// The pipeline never touches the scene directly: on native and web it runs as
/// a detached task and its updates travel back to the event loop, which applies
/// them between frames.
pub trait SceneSink {
    fn submit(&mut self, update: SceneUpdate) -> anyhow::Result<()>;
}

impl SceneSink for Scene {
    fn submit(&mut self, update: SceneUpdate) -> anyhow::Result<()> {
        self.apply(update);
        Ok(())
    }
}

impl SceneSink for Vec<SceneUpdate> {
    fn submit(&mut self, update: SceneUpdate) -> anyhow::Result<()> {
        self.push(update);
        Ok(())
    }
}

impl SceneSink for futures::channel::mpsc::UnboundedSender<SceneUpdate> {
    fn submit(&mut self, update: SceneUpdate) -> anyhow::Result<()> {
        self.unbounded_send(update)
            .map_err(|e| anyhow!("scene receiver is gone: {e}"))
    }
}

impl<S: SceneSink + ?Sized> SceneSink for &mut S {
    fn submit(&mut self, update: SceneUpdate) -> anyhow::Result<()> {
        (**self).submit(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::PrefilterConfig,
        data_structures::environment::{EquirectImage, prefilter},
    };

    fn environment() -> Arc<PrefilteredEnvironment> {
        let raw = EquirectImage::new(4, 2, vec![[1.0; 4]; 8]).unwrap();
        Arc::new(prefilter(raw, "probe", &PrefilterConfig::default()))
    }

    #[test]
    fn replacing_the_environment_returns_the_old_one() {
        let mut scene = Scene::default();
        let first = environment();
        let first_id = first.id();
        assert!(scene.set_environment(first).is_none());
        let old = scene.set_environment(environment()).unwrap();
        assert_eq!(old.id(), first_id);
        assert_ne!(scene.environment().unwrap().id(), first_id);
    }

    #[test]
    fn new_models_sit_at_the_origin() {
        let node = ModelNode::new("helmet", Arc::new(ModelData::default()));
        assert_eq!(node.transform, Transform::new());
        let other = ModelNode::new("helmet", Arc::new(ModelData::default()));
        assert_ne!(node.id(), other.id());
    }

    #[test]
    fn updates_apply_through_the_sink() {
        let mut scene = Scene::default();
        scene.submit(SceneUpdate::Environment(environment())).unwrap();
        scene
            .submit(SceneUpdate::Model(ModelNode::new(
                "helmet",
                Arc::new(ModelData::default()),
            )))
            .unwrap();
        assert!(scene.environment().is_some());
        assert_eq!(scene.model().map(|m| m.name.as_str()), Some("helmet"));
    }

    #[test]
    fn closed_channels_are_reported() {
        let (mut tx, rx) = futures::channel::mpsc::unbounded();
        drop(rx);
        assert!(tx.submit(SceneUpdate::Environment(environment())).is_err());
    }
}
