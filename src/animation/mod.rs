//! Interpolation of model pose and page element styles.

pub mod animator;
pub mod ease;
pub mod timeline;
pub mod tween;

pub use animator::{InteractionAnimator, Property, Subject};
pub use ease::Ease;
pub use timeline::{ElementStyle, ScrollTimeline, ScrollTrigger};
pub use tween::{Lerp, Tween};
