#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::HashMap,
    io::Cursor,
    rc::Rc,
};

use anyhow::{anyhow, bail};
use flow_stage::{
    AssetSource, Backend, Pass, Scene,
    config::StageConfig,
    resources::ResourcePipeline,
    viewport::Viewport,
};

pub(crate) const PROBE_URL: &str = "probe.png";
pub(crate) const MODEL_URL: &str = "models/tri.gltf";

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Serves assets from memory and remembers what was asked for.
#[derive(Default)]
pub(crate) struct MemorySource {
    files: HashMap<String, Vec<u8>>,
    requests: RefCell<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A probe image and a one-triangle model under the default test URLs.
    pub fn complete() -> Self {
        let (gltf, bin) = triangle_gltf();
        Self::new()
            .with(PROBE_URL, probe_png(64, 32))
            .with(MODEL_URL, gltf.into_bytes())
            .with("models/tri.bin", bin)
    }

    pub fn with(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), bytes);
        self
    }

    pub fn without(mut self, url: &str) -> Self {
        self.files.remove(url);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl AssetSource for MemorySource {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        self.requests.borrow_mut().push(url.to_string());
        match self.files.get(url) {
            Some(bytes) => Ok(bytes.clone()),
            None => bail!("404 {url}"),
        }
    }
}

pub(crate) fn pipeline() -> ResourcePipeline {
    let mut config = StageConfig::default();
    config.assets.environment_url = PROBE_URL.to_string();
    config.assets.model_url = MODEL_URL.to_string();
    ResourcePipeline::from_config(&config)
}

/// A PNG light probe with a bright band along the horizon.
pub(crate) fn probe_png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_fn(width, height, |_, y| {
        if y == height / 2 {
            image::Rgba([255, 240, 200, 255])
        } else {
            image::Rgba([20, 30, 60, 255])
        }
    });
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encoding a PNG into memory");
    bytes.into_inner()
}

/// A glTF document with one triangle and the 42 byte buffer it points at.
pub(crate) fn triangle_gltf() -> (String, Vec<u8>) {
    let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    let indices: [u16; 3] = [0, 1, 2];
    let mut bin: Vec<u8> = bytemuck::cast_slice(&positions).to_vec();
    bin.extend_from_slice(bytemuck::cast_slice(&indices));
    assert_eq!(bin.len(), 42);

    let gltf = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [ { "nodes": [0] } ],
        "nodes": [ { "mesh": 0, "translation": [0.0, 0.0, 1.0] } ],
        "meshes": [ {
            "name": "triangle",
            "primitives": [ { "attributes": { "POSITION": 0 }, "indices": 1 } ]
        } ],
        "buffers": [ { "uri": "tri.bin", "byteLength": 42 } ],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6, "target": 34963 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
            },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ]
    }"#;
    (gltf.to_string(), bin)
}

/// Image handed between recording passes.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RecordedImage {
    pub producer: String,
    pub size: [u32; 2],
}

pub(crate) type Journal = Rc<RefCell<Vec<String>>>;

/// A backend that writes every call into a shared journal.
pub(crate) struct RecordingBackend {
    pub journal: Journal,
    pub skip_frames: u32,
    pub presented: Vec<RecordedImage>,
    pub resizes: Vec<[u32; 2]>,
}

impl RecordingBackend {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            skip_frames: 0,
            presented: Vec::new(),
            resizes: Vec::new(),
        }
    }
}

impl Backend for RecordingBackend {
    type Target = RecordedImage;

    fn begin_frame(&mut self) -> anyhow::Result<bool> {
        if self.skip_frames > 0 {
            self.skip_frames -= 1;
            self.journal.borrow_mut().push("skip".to_string());
            return Ok(false);
        }
        self.journal.borrow_mut().push("begin".to_string());
        Ok(true)
    }

    fn present(&mut self, output: &RecordedImage) -> anyhow::Result<()> {
        self.journal
            .borrow_mut()
            .push(format!("present {}", output.producer));
        self.presented.push(output.clone());
        Ok(())
    }

    fn abort_frame(&mut self) {
        self.journal.borrow_mut().push("abort".to_string());
    }

    fn resize(&mut self, viewport: &Viewport) {
        self.resizes.push(viewport.physical_size());
    }
}

/// A pass that records what it consumed and whether a model was present.
pub(crate) struct RecordingPass {
    label: String,
    output: RecordedImage,
    journal: Journal,
    pub fail: Rc<RefCell<bool>>,
}

impl RecordingPass {
    pub fn new(label: &str, journal: Journal) -> Self {
        Self {
            label: label.to_string(),
            output: RecordedImage {
                producer: label.to_string(),
                size: [0, 0],
            },
            journal,
            fail: Rc::new(RefCell::new(false)),
        }
    }
}

impl Pass<RecordingBackend> for RecordingPass {
    fn label(&self) -> &str {
        &self.label
    }

    fn resize(&mut self, _backend: &RecordingBackend, viewport: &Viewport) {
        self.output.size = viewport.physical_size();
    }

    fn target_size(&self) -> [u32; 2] {
        self.output.size
    }

    fn execute(
        &mut self,
        _backend: &mut RecordingBackend,
        scene: &Scene,
        input: Option<&RecordedImage>,
    ) -> anyhow::Result<&RecordedImage> {
        if *self.fail.borrow() {
            return Err(anyhow!("{} exploded", self.label));
        }
        let input = input.map(|image| image.producer.as_str()).unwrap_or("none");
        let model = scene.model().map(|m| m.name.as_str()).unwrap_or("-");
        let environment = if scene.environment().is_some() { "env" } else { "-" };
        self.journal.borrow_mut().push(format!(
            "{} <- {input} [{environment} {model}]",
            self.label
        ));
        Ok(&self.output)
    }
}

/// A chain of `labels` over a recording backend sharing one journal.
pub(crate) fn recording_chain(
    labels: &[&str],
    viewport: Viewport,
) -> (flow_stage::RenderChain<RecordingBackend>, Journal) {
    let journal: Journal = Rc::new(RefCell::new(Vec::new()));
    let mut chain = flow_stage::RenderChain::new(RecordingBackend::new(journal.clone()), viewport);
    chain.configure(
        labels
            .iter()
            .map(|label| {
                Box::new(RecordingPass::new(label, journal.clone())) as Box<dyn Pass<RecordingBackend>>
            })
            .collect(),
    );
    (chain, journal)
}
