//! Runtime configuration with TOML support.

use std::{f32::consts::PI, path::Path};

use anyhow::{Context as _, ensure};
use serde::{Deserialize, Serialize};

use crate::animation::ease::Ease;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub assets: AssetConfig,
    pub camera: CameraConfig,
    pub render: RenderConfig,
    pub pointer: PointerConfig,
    pub prefilter: PrefilterConfig,
    pub scroll: Vec<ScrollSectionConfig>,
    pub hover: Vec<HoverConfig>,
}

impl StageConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text).context("invalid stage configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime can't turn into durations or pixel sizes.
    pub fn validate(&self) -> anyhow::Result<()> {
        check_secs("pointer.duration_secs", self.pointer.duration_secs)?;
        for hover in &self.hover {
            check_secs(&format!("hover {} duration_secs", hover.element), hover.duration_secs)?;
        }
        for section in &self.scroll {
            check_secs(&format!("scroll {} scrub_secs", section.section), section.scrub_secs)?;
            for tween in &section.tweens {
                check_secs(&format!("tween {} duration_secs", tween.element), tween.duration_secs)?;
                ensure!(
                    tween.offset_secs.is_finite(),
                    "tween {} offset_secs must be finite",
                    tween.element
                );
            }
        }
        ensure!(
            self.render.max_pixel_ratio.is_finite() && self.render.max_pixel_ratio > 0.0,
            "render.max_pixel_ratio must be positive, got {}",
            self.render.max_pixel_ratio
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration {}", path.display()))?;
        Self::from_toml_str(&text)
    }
}

fn check_secs(name: &str, secs: f32) -> anyhow::Result<()> {
    ensure!(
        secs.is_finite() && secs >= 0.0,
        "{name} must be a finite number of seconds, got {secs}"
    );
    Ok(())
}

impl Default for StageConfig {
    /// The page defaults: one scroll-scrubbed section and one hover button.
    fn default() -> Self {
        Self {
            assets: AssetConfig::default(),
            camera: CameraConfig::default(),
            render: RenderConfig::default(),
            pointer: PointerConfig::default(),
            prefilter: PrefilterConfig::default(),
            scroll: vec![ScrollSectionConfig::default()],
            hover: vec![HoverConfig::default()],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub environment_url: String,
    pub model_url: String,
    /// Directory native builds resolve relative URLs against.
    pub root: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            environment_url: "pond_bridge_night_1k.hdr".to_string(),
            model_url: "DamagedHelmet.gltf".to_string(),
            root: "assets".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 40.0,
            near: 0.1,
            far: 100.0,
            position: [0.0, 0.0, 3.5],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Strength of the RGB shift effect. Fixed once the chain is built.
    pub effect_amount: f32,
    /// Direction of the RGB shift in radians.
    pub effect_angle: f32,
    pub exposure: f32,
    pub max_pixel_ratio: f32,
    pub clear_colour: [f64; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            effect_amount: 0.003,
            effect_angle: 0.0,
            exposure: 1.0,
            max_pixel_ratio: crate::viewport::DEFAULT_MAX_PIXEL_RATIO,
            clear_colour: [0.0, 0.0, 0.0, 0.0],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerConfig {
    /// Full span of the orientation range in radians, centred on zero.
    pub angular_range: f32,
    pub duration_secs: f32,
    pub ease: Ease,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            angular_range: PI * 0.12,
            duration_secs: 0.9,
            ease: Ease::OutCubic,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefilterConfig {
    /// Width of the sharpest level; larger probes are box-filtered down to it.
    pub base_width: u32,
    pub levels: u32,
}

impl Default for PrefilterConfig {
    fn default() -> Self {
        Self {
            base_width: 256,
            levels: 6,
        }
    }
}

/// One "from" tween inside a scroll timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollTweenConfig {
    pub element: String,
    pub from_opacity: Option<f32>,
    pub from_offset_x: Option<f32>,
    pub from_offset_y: Option<f32>,
    pub duration_secs: f32,
    /// Shift relative to the end of the previous tween, `-0.45` means "-=0.45".
    pub offset_secs: f32,
    pub ease: Ease,
}

impl Default for ScrollTweenConfig {
    fn default() -> Self {
        Self {
            element: String::new(),
            from_opacity: None,
            from_offset_x: None,
            from_offset_y: None,
            duration_secs: 0.5,
            offset_secs: 0.0,
            ease: Ease::OutQuad,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollSectionConfig {
    pub section: String,
    /// Viewport fraction the section top must reach for progress 0.
    pub trigger_start: f32,
    /// Viewport fraction the section top must reach for progress 1.
    pub trigger_end: f32,
    /// Seconds the playhead needs to catch up with the scroll position.
    pub scrub_secs: f32,
    /// Top of the section in viewport heights, used by the native wheel-scroll demo.
    pub virtual_top: f32,
    pub tweens: Vec<ScrollTweenConfig>,
}

impl Default for ScrollSectionConfig {
    fn default() -> Self {
        Self {
            section: "section2".to_string(),
            trigger_start: 0.6,
            trigger_end: -0.1,
            scrub_secs: 2.0,
            virtual_top: 1.0,
            tweens: vec![
                ScrollTweenConfig {
                    element: "section2 .left".to_string(),
                    from_opacity: Some(0.0),
                    from_offset_y: Some(30.0),
                    ..Default::default()
                },
                ScrollTweenConfig {
                    element: "section2 .right".to_string(),
                    from_opacity: Some(0.0),
                    from_offset_x: Some(30.0),
                    offset_secs: -0.45,
                    ..Default::default()
                },
            ],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoverConfig {
    pub element: String,
    pub rest_colour: [f32; 4],
    pub hover_colour: [f32; 4],
    pub duration_secs: f32,
    pub ease: Ease,
}

impl Default for HoverConfig {
    fn default() -> Self {
        Self {
            element: "button".to_string(),
            rest_colour: [1.0, 1.0, 1.0, 1.0],
            // #00F0FF
            hover_colour: [0.0, 240.0 / 255.0, 1.0, 1.0],
            duration_secs: 0.5,
            ease: Ease::OutCubic,
        }
    }
}
