//! Ordered loading of the environment and the model.
//!
//! The model depends on ambient lighting, so it is only requested once the
//! prefiltered environment has been derived and handed to the scene. A failed
//! environment stops the pipeline; a failed model leaves an environment-only
//! scene. Neither failure reaches the frame loop.

use std::sync::Arc;

use crate::{
    config::{PrefilterConfig, StageConfig},
    data_structures::{
        environment::{EquirectImage, PrefilteredEnvironment, prefilter_async, yield_now},
        scene_graph::{ModelNode, SceneSink, SceneUpdate},
    },
    resources::{AssetSource, LoadError, model::decode_model},
};

#[derive(Clone, Debug, PartialEq)]
pub struct ResourcePipeline {
    pub environment_url: String,
    pub model_url: String,
    pub prefilter: PrefilterConfig,
}

impl ResourcePipeline {
    pub fn new(environment_url: impl Into<String>, model_url: impl Into<String>) -> Self {
        Self {
            environment_url: environment_url.into(),
            model_url: model_url.into(),
            prefilter: PrefilterConfig::default(),
        }
    }

    pub fn from_config(config: &StageConfig) -> Self {
        Self {
            environment_url: config.assets.environment_url.clone(),
            model_url: config.assets.model_url.clone(),
            prefilter: config.prefilter.clone(),
        }
    }

    /// Fetch, decode and prefilter the environment probe. The raw probe is
    /// dropped once the prefiltered levels exist.
    pub async fn load_environment<S: AssetSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<PrefilteredEnvironment, LoadError> {
        let url = self.environment_url.as_str();
        let bytes = source
            .fetch(url)
            .await
            .map_err(|e| LoadError::environment(url, e))?;
        let raw = EquirectImage::decode(&bytes).map_err(|e| LoadError::environment(url, e))?;
        drop(bytes);
        yield_now().await;
        log::info!(
            "environment {url} decoded ({}x{}), prefiltering",
            raw.width,
            raw.height
        );
        Ok(prefilter_async(raw, url, &self.prefilter).await)
    }

    /// Fetch and decode the model. The node is placed at the origin.
    pub async fn load_model<S: AssetSource + ?Sized>(
        &self,
        source: &S,
    ) -> Result<ModelNode, LoadError> {
        let url = self.model_url.as_str();
        let bytes = source
            .fetch(url)
            .await
            .map_err(|e| LoadError::model(url, e))?;
        let data = decode_model(&bytes, url, source)
            .await
            .map_err(|e| LoadError::model(url, e))?;
        log::info!(
            "model {url} decoded: {} meshes, {} vertices",
            data.meshes.len(),
            data.vertex_count()
        );
        Ok(ModelNode::new(url, Arc::new(data)))
    }

    /// Run both stages in order, delivering each result to `sink`.
    ///
    /// The model is not requested unless the environment was installed.
    pub async fn run<S, K>(&self, source: &S, sink: &mut K) -> Result<(), LoadError>
    where
        S: AssetSource + ?Sized,
        K: SceneSink + ?Sized,
    {
        log::info!("loading environment {}", self.environment_url);
        let environment = self.load_environment(source).await?;
        sink.submit(SceneUpdate::Environment(Arc::new(environment)))
            .map_err(|e| LoadError::environment(&self.environment_url, e))?;

        log::info!("loading model {}", self.model_url);
        let model = self.load_model(source).await?;
        sink.submit(SceneUpdate::Model(model))
            .map_err(|e| LoadError::model(&self.model_url, e))?;
        log::info!("resource pipeline finished");
        Ok(())
    }

    /// [`run`](Self::run), reporting a failure instead of returning it.
    pub async fn run_reported<S, K>(&self, source: &S, sink: &mut K)
    where
        S: AssetSource + ?Sized,
        K: SceneSink + ?Sized,
    {
        if let Err(err) = self.run(source, sink).await {
            log::error!("{err}");
            if let Some(cause) = std::error::Error::source(&err) {
                log::debug!("caused by: {cause:?}");
            }
        }
    }
}

impl Default for ResourcePipeline {
    fn default() -> Self {
        Self::from_config(&StageConfig::default())
    }
}
