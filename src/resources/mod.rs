use std::future::Future;

/**
 * Loading of external assets. An [`AssetSource`] fetches bytes; the submodules
 * decode them and order the environment before the model.
 */
pub mod error;
pub mod model;
pub mod pipeline;

pub use error::{LoadError, LoadStage};
pub use pipeline::ResourcePipeline;

use crate::config::AssetConfig;

/// Asynchronous byte fetch for a URL.
pub trait AssetSource {
    fn fetch(&self, url: &str) -> impl Future<Output = anyhow::Result<Vec<u8>>>;
}

impl<S: AssetSource + ?Sized> AssetSource for &S {
    fn fetch(&self, url: &str) -> impl Future<Output = anyhow::Result<Vec<u8>>> {
        (**self).fetch(url)
    }
}

/// Resolve `uri` relative to the file at `base`.
///
/// Absolute URLs and rooted paths are returned unchanged.
pub fn resolve_relative(base: &str, uri: &str) -> String {
    if uri.contains("://") || uri.starts_with('/') {
        return uri.to_string();
    }
    match base.rfind('/') {
        Some(idx) => format!("{}/{}", &base[..idx], uri),
        None => uri.to_string(),
    }
}

/// Reads assets from disk (native) or over HTTP (web).
#[derive(Clone, Debug)]
pub struct AssetLoader {
    #[cfg_attr(target_arch = "wasm32", allow(dead_code))]
    root: std::path::PathBuf,
}

impl AssetLoader {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &AssetConfig) -> Self {
        Self::new(&config.root)
    }
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::from_config(&AssetConfig::default())
    }
}

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    use anyhow::Context as _;

    let window = web_sys::window().context("no window")?;
    let origin = window
        .location()
        .origin()
        .map_err(|e| anyhow::anyhow!("cannot read the page origin: {e:?}"))?;
    let base = reqwest::Url::parse(&format!("{origin}/assets/"))?;
    Ok(base.join(file_name)?)
}

impl AssetSource for AssetLoader {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        #[cfg(target_arch = "wasm32")]
        let data = {
            let url = format_url(url)?;
            let response = reqwest::get(url).await?.error_for_status()?;
            response.bytes().await?.to_vec()
        };
        #[cfg(not(target_arch = "wasm32"))]
        let data = {
            use anyhow::Context as _;

            if url.contains("://") {
                anyhow::bail!("remote asset {url} can only be fetched by the web build");
            }
            let path = self.root.join(url.trim_start_matches('/'));
            tokio::fs::read(&path)
                .await
                .with_context(|| format!("cannot read {}", path.display()))?
        };

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_uris_resolve_next_to_the_base() {
        assert_eq!(
            resolve_relative("models/helmet.gltf", "helmet.bin"),
            "models/helmet.bin"
        );
        assert_eq!(resolve_relative("helmet.gltf", "tex/a.png"), "tex/a.png");
        assert_eq!(
            resolve_relative("models/helmet.gltf", "https://cdn/x.bin"),
            "https://cdn/x.bin"
        );
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[tokio::test]
    async fn missing_files_are_errors() {
        let loader = AssetLoader::new(std::env::temp_dir());
        let err = loader.fetch("definitely-not-here.hdr").await.unwrap_err();
        assert!(err.to_string().contains("definitely-not-here.hdr"));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[tokio::test]
    async fn files_are_read_from_the_root() {
        let dir = std::env::temp_dir().join("flow-stage-loader-test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("probe.bin"), [1u8, 2, 3]).unwrap();
        let loader = AssetLoader::new(&dir);
        assert_eq!(loader.fetch("probe.bin").await.unwrap(), vec![1, 2, 3]);
    }
}
