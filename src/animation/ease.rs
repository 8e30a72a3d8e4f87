//! Easing curves for interpolation.

use serde::{Deserialize, Serialize};

/// Easing curve applied to normalized progress.
///
/// The `Out*` family starts fast and settles gently; `OutCubic` is the curve
/// pointer-driven rotation and hover colours use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ease {
    Linear,
    #[default]
    OutQuad,
    OutCubic,
    OutQuart,
    InOutCubic,
}

impl Ease {
    /// Evaluate the curve. `t` is clamped to `[0, 1]`, the result lies in `[0, 1]`.
    #[inline]
    pub fn apply(self, t: f32) -> f32 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match self {
            Self::Linear => t,
            Self::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            Self::OutCubic => 1.0 - (1.0 - t).powi(3),
            Self::OutQuart => 1.0 - (1.0 - t).powi(4),
            Self::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Ease; 5] = [
        Ease::Linear,
        Ease::OutQuad,
        Ease::OutCubic,
        Ease::OutQuart,
        Ease::InOutCubic,
    ];

    #[test]
    fn endpoints_are_stable() {
        for ease in ALL {
            assert_eq!(ease.apply(0.0), 0.0, "{ease:?}");
            assert!((ease.apply(1.0) - 1.0).abs() < 1e-6, "{ease:?}");
        }
    }

    #[test]
    fn out_curves_lead_linear_progress() {
        for ease in [Ease::OutQuad, Ease::OutCubic, Ease::OutQuart] {
            assert!(ease.apply(0.25) > 0.25, "{ease:?}");
        }
        assert!(Ease::OutCubic.apply(0.25) > Ease::OutQuad.apply(0.25));
    }

    #[test]
    fn input_is_clamped() {
        for ease in ALL {
            assert_eq!(ease.apply(-1.0), 0.0);
            assert!((ease.apply(7.0) - 1.0).abs() < 1e-6);
            assert_eq!(ease.apply(f32::NAN), 0.0);
        }
    }

    #[test]
    fn curves_are_monotonic() {
        for ease in ALL {
            let mut last = 0.0;
            for step in 1..=100 {
                let value = ease.apply(step as f32 / 100.0);
                assert!(value >= last, "{ease:?} dipped at step {step}");
                last = value;
            }
        }
    }
}
