/// Default upper bound for the device pixel ratio.
pub const DEFAULT_MAX_PIXEL_RATIO: f32 = 2.0;

/**
 * Logical size and device pixel ratio of the frame surface. The ratio is
 * clamped so dense displays don't multiply the fill cost of every pass;
 * anything that allocates pixels reads [`Viewport::physical_size`].
 */
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub pixel_ratio: f32,
}

impl Viewport {
    /// Build a viewport from logical (CSS-like) dimensions.
    ///
    /// `pixel_ratio` is clamped to `(0, max_pixel_ratio]`.
    pub fn new(width: f32, height: f32, pixel_ratio: f32, max_pixel_ratio: f32) -> Self {
        let pixel_ratio = if pixel_ratio > 0.0 {
            pixel_ratio.min(max_pixel_ratio.max(f32::MIN_POSITIVE))
        } else {
            1.0
        };
        Self {
            width: width.max(0.0),
            height: height.max(0.0),
            pixel_ratio,
        }
    }

    /// Build a viewport from the physical size a window reports plus its scale factor.
    pub fn from_physical(width: u32, height: u32, scale_factor: f64, max_pixel_ratio: f32) -> Self {
        let scale = if scale_factor > 0.0 { scale_factor as f32 } else { 1.0 };
        Self::new(
            width as f32 / scale,
            height as f32 / scale,
            scale,
            max_pixel_ratio,
        )
    }

    /// Size of every pixel buffer in the chain: `[width, height]` in device pixels.
    pub fn physical_size(&self) -> [u32; 2] {
        [
            (self.width * self.pixel_ratio).round() as u32,
            (self.height * self.pixel_ratio).round() as u32,
        ]
    }

    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            1.0
        }
    }

    /// A viewport with no pixels can't back a render target.
    pub fn is_empty(&self) -> bool {
        let [w, h] = self.physical_size();
        w == 0 || h == 0
    }

    /// Map a physical cursor position into `[0,1] x [0,1]`.
    pub fn normalize(&self, physical_x: f64, physical_y: f64) -> (f32, f32) {
        let [w, h] = self.physical_size();
        if w == 0 || h == 0 {
            return (0.5, 0.5);
        }
        (
            (physical_x as f32 / w as f32).clamp(0.0, 1.0),
            (physical_y as f32 / h as f32).clamp(0.0, 1.0),
        )
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1280.0, 720.0, 1.0, DEFAULT_MAX_PIXEL_RATIO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_ratio_is_clamped() {
        let viewport = Viewport::new(800.0, 600.0, 3.0, 2.0);
        assert_eq!(viewport.pixel_ratio, 2.0);
        assert_eq!(viewport.physical_size(), [1600, 1200]);
    }

    #[test]
    fn from_physical_round_trips_size_below_the_clamp() {
        let viewport = Viewport::from_physical(1920, 1080, 1.5, 2.0);
        assert_eq!(viewport.physical_size(), [1920, 1080]);
        assert!((viewport.aspect() - 16.0 / 9.0).abs() < 1e-4);
    }

    #[test]
    fn high_density_windows_render_at_the_clamped_ratio() {
        let viewport = Viewport::from_physical(3000, 2000, 3.0, 2.0);
        assert_eq!(viewport.physical_size(), [2000, 1333]);
    }

    #[test]
    fn empty_viewports_are_detected() {
        assert!(Viewport::new(0.0, 600.0, 1.0, 2.0).is_empty());
        assert!(!Viewport::default().is_empty());
    }

    #[test]
    fn normalize_maps_into_unit_square() {
        let viewport = Viewport::new(200.0, 100.0, 1.0, 2.0);
        assert_eq!(viewport.normalize(100.0, 50.0), (0.5, 0.5));
        assert_eq!(viewport.normalize(400.0, -3.0), (1.0, 0.0));
    }
}
