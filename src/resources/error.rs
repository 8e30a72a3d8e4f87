use std::error::Error;

pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// A failed stage of the resource pipeline.
///
/// Both variants keep the URL that failed and the underlying cause. They are
/// reported where the pipeline task ends and never reach the frame loop.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("environment load failed for {url}: {source}")]
    Environment {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("model load failed for {url}: {source}")]
    Model {
        url: String,
        #[source]
        source: BoxError,
    },
}

/// Which pipeline stage an error belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStage {
    Environment,
    Model,
}

impl LoadError {
    pub fn environment(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Environment {
            url: url.into(),
            source: source.into(),
        }
    }

    pub fn model(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Model {
            url: url.into(),
            source: source.into(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Environment { url, .. } | Self::Model { url, .. } => url,
        }
    }

    pub fn stage(&self) -> LoadStage {
        match self {
            Self::Environment { .. } => LoadStage::Environment,
            Self::Model { .. } => LoadStage::Model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_stage_and_url() {
        let err = LoadError::environment("probe.hdr", anyhow::anyhow!("404"));
        let text = err.to_string();
        assert!(text.contains("environment load failed"));
        assert!(text.contains("probe.hdr"));
        assert!(text.contains("404"));
        assert_eq!(err.stage(), LoadStage::Environment);
    }

    #[test]
    fn source_is_preserved() {
        let err = LoadError::model("helmet.gltf", std::io::Error::other("boom"));
        assert_eq!(err.url(), "helmet.gltf");
        assert_eq!(err.source().map(|e| e.to_string()), Some("boom".into()));
    }
}
