//! Equirectangular light probes and their prefiltered form.
//!
//! A raw probe is decoded from an HDR (or any `image`-supported) file, reduced
//! to a base resolution and then turned into a chain of progressively blurrier
//! levels. The scene shader picks a level by surface roughness. The raw probe is
//! consumed by the derivation and dropped when it finishes.

use std::{
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicU64, Ordering},
    task::{Context, Poll},
};

use anyhow::{Context as _, bail};

use crate::config::PrefilterConfig;

/// Levels narrower than this aren't worth sampling.
pub const MIN_LEVEL_WIDTH: u32 = 8;

static NEXT_ENVIRONMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a prefiltered map. GPU copies are cached by it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvironmentId(u64);

impl EnvironmentId {
    fn next() -> Self {
        Self(NEXT_ENVIRONMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Linear RGBA texels in an equirectangular layout, row-major from the north pole.
#[derive(Clone, Debug, PartialEq)]
pub struct EquirectImage {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

impl EquirectImage {
    pub fn new(width: u32, height: u32, texels: Vec<[f32; 4]>) -> anyhow::Result<Self> {
        if width == 0 || height == 0 {
            bail!("environment image has no pixels ({width}x{height})");
        }
        if texels.len() != width as usize * height as usize {
            bail!(
                "environment image is {width}x{height} but holds {} texels",
                texels.len()
            );
        }
        Ok(Self {
            width,
            height,
            texels,
        })
    }

    /// Decode a probe. HDR files keep their full range.
    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        let image = image::load_from_memory(bytes).context("cannot decode environment image")?;
        let rgba = image.into_rgba32f();
        let (width, height) = rgba.dimensions();
        let texels = rgba.pixels().map(|p| p.0).collect();
        Self::new(width, height, texels)
    }

    #[inline]
    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        self.texels[(y * self.width + x) as usize]
    }

    /// Halve both dimensions with a 2x2 box filter. Odd edges reuse the last
    /// row or column, a 1-texel axis stays 1 texel.
    pub fn downsample(&self) -> Self {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut texels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let y0 = (y * 2).min(self.height - 1);
            let y1 = (y * 2 + 1).min(self.height - 1);
            for x in 0..width {
                let x0 = (x * 2).min(self.width - 1);
                let x1 = (x * 2 + 1).min(self.width - 1);
                let samples = [
                    self.texel(x0, y0),
                    self.texel(x1, y0),
                    self.texel(x0, y1),
                    self.texel(x1, y1),
                ];
                texels.push(average(&samples));
            }
        }
        Self {
            width,
            height,
            texels,
        }
    }

    /// Box blur that wraps around the horizon and widens towards the poles,
    /// where a texel covers less solid angle.
    pub fn blur(&self) -> Self {
        let mut horizontal = Vec::with_capacity(self.texels.len());
        for y in 0..self.height {
            let latitude = ((y as f32 + 0.5) / self.height as f32 - 0.5) * std::f32::consts::PI;
            let stretch = 1.0 / latitude.cos().max(1e-3);
            let radius = (stretch.ceil() as u32).clamp(1, (self.width / 2).max(1));
            for x in 0..self.width {
                let samples: Vec<[f32; 4]> = (0..=2 * radius)
                    .map(|i| {
                        let sx = (x + self.width * 2 + i - radius) % self.width;
                        self.texel(sx, y)
                    })
                    .collect();
                horizontal.push(average(&samples));
            }
        }
        let horizontal = Self {
            width: self.width,
            height: self.height,
            texels: horizontal,
        };
        let mut texels = Vec::with_capacity(self.texels.len());
        for y in 0..self.height {
            let above = y.saturating_sub(1);
            let below = (y + 1).min(self.height - 1);
            for x in 0..self.width {
                texels.push(average(&[
                    horizontal.texel(x, above),
                    horizontal.texel(x, y),
                    horizontal.texel(x, below),
                ]));
            }
        }
        Self {
            width: self.width,
            height: self.height,
            texels,
        }
    }
}

fn average(samples: &[[f32; 4]]) -> [f32; 4] {
    let n = samples.len().max(1) as f32;
    let sum = samples.iter().fold([0.0f32; 4], |acc, s| {
        [acc[0] + s[0], acc[1] + s[1], acc[2] + s[2], acc[3] + s[3]]
    });
    sum.map(|c| c / n)
}

/// A chain of blurred levels, sharpest first. Level `i` is the `i`-th mip.
#[derive(Debug, PartialEq)]
pub struct PrefilteredEnvironment {
    id: EnvironmentId,
    source: String,
    levels: Vec<EquirectImage>,
}

impl PrefilteredEnvironment {
    pub fn id(&self) -> EnvironmentId {
        self.id
    }

    /// URL the probe was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn levels(&self) -> &[EquirectImage] {
        &self.levels
    }

    pub fn base(&self) -> &EquirectImage {
        &self.levels[0]
    }
}

/// Number of levels a base of `width` texels yields under `config`.
pub fn level_count(width: u32, config: &PrefilterConfig) -> u32 {
    let mut count = 1;
    let mut w = width;
    while count < config.levels.max(1) && w / 2 >= MIN_LEVEL_WIDTH {
        w /= 2;
        count += 1;
    }
    count
}

fn reduce_to_base(raw: EquirectImage, config: &PrefilterConfig) -> EquirectImage {
    let mut base = raw;
    while base.width > config.base_width.max(1) {
        base = base.downsample();
    }
    base
}

/// Derive the prefiltered map, consuming the raw probe.
pub fn prefilter(
    raw: EquirectImage,
    source: impl Into<String>,
    config: &PrefilterConfig,
) -> PrefilteredEnvironment {
    let base = reduce_to_base(raw, config);
    let count = level_count(base.width, config);
    let mut levels = vec![base];
    for _ in 1..count {
        if let Some(last) = levels.last() {
            let next = last.downsample().blur();
            levels.push(next);
        }
    }
    PrefilteredEnvironment {
        id: EnvironmentId::next(),
        source: source.into(),
        levels,
    }
}

/// [`prefilter`], yielding to the executor between levels so a single-threaded
/// host keeps producing frames during the derivation.
pub async fn prefilter_async(
    raw: EquirectImage,
    source: impl Into<String>,
    config: &PrefilterConfig,
) -> PrefilteredEnvironment {
    let base = reduce_to_base(raw, config);
    yield_now().await;
    let count = level_count(base.width, config);
    let mut levels = vec![base];
    for _ in 1..count {
        if let Some(last) = levels.last() {
            let next = last.downsample().blur();
            levels.push(next);
        }
        yield_now().await;
    }
    PrefilteredEnvironment {
        id: EnvironmentId::next(),
        source: source.into(),
        levels,
    }
}

/// Returns `Pending` once, waking itself, then completes.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(width: u32, height: u32, value: f32) -> EquirectImage {
        EquirectImage::new(
            width,
            height,
            vec![[value, value, value, 1.0]; (width * height) as usize],
        )
        .unwrap()
    }

    #[test]
    fn texel_count_is_validated() {
        assert!(EquirectImage::new(4, 2, vec![[0.0; 4]; 7]).is_err());
        assert!(EquirectImage::new(0, 2, vec![]).is_err());
    }

    #[test]
    fn downsample_averages_blocks() {
        let image = EquirectImage::new(
            2,
            2,
            vec![[0.0; 4], [1.0; 4], [2.0; 4], [3.0; 4]],
        )
        .unwrap();
        let half = image.downsample();
        assert_eq!((half.width, half.height), (1, 1));
        assert_eq!(half.texels[0], [1.5; 4]);
    }

    #[test]
    fn blur_preserves_flat_images() {
        let image = flat(16, 8, 0.25);
        let blurred = image.blur();
        for texel in blurred.texels {
            assert!((texel[0] - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn levels_follow_the_mip_chain() {
        let config = PrefilterConfig {
            base_width: 64,
            levels: 6,
        };
        let env = prefilter(flat(256, 128, 1.0), "probe.hdr", &config);
        let sizes: Vec<_> = env.levels().iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(64, 32), (32, 16), (16, 8), (8, 4)]);
        assert_eq!(env.source(), "probe.hdr");
    }

    #[test]
    fn every_derivation_gets_a_new_id() {
        let config = PrefilterConfig::default();
        let a = prefilter(flat(16, 8, 1.0), "a", &config);
        let b = prefilter(flat(16, 8, 1.0), "a", &config);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn async_derivation_matches_the_blocking_one() {
        let config = PrefilterConfig {
            base_width: 32,
            levels: 3,
        };
        let blocking = prefilter(flat(64, 32, 0.5), "p", &config);
        let deferred =
            futures::executor::block_on(prefilter_async(flat(64, 32, 0.5), "p", &config));
        assert_eq!(blocking.levels(), deferred.levels());
    }
}
