//! Scroll-scrubbed timelines.
//!
//! A [`ScrollTimeline`] is a list of "from" tracks laid out on a local time
//! axis. Scroll progress in `[0, 1]` selects a position on that axis; instead of
//! jumping there, a playhead tween catches up over the configured scrub time so
//! fast scrolling still animates smoothly.

use instant::{Duration, Instant};

use super::{
    ease::Ease,
    tween::{Tween, secs_to_duration},
};
use crate::config::{ScrollSectionConfig, ScrollTweenConfig};

/// Ease of the playhead catching up with the scroll position.
pub const SCRUB_EASE: Ease = Ease::OutQuart;

/// Converts layout geometry into scroll progress for one section.
///
/// `start` and `end` are fractions of the viewport height that the section's
/// top edge has to reach for progress 0 and 1 respectively.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollTrigger {
    pub start: f32,
    pub end: f32,
}

impl ScrollTrigger {
    pub fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    /// Progress of a section whose top edge sits `section_top` pixels below the
    /// top of a viewport `viewport_height` pixels tall.
    pub fn progress(&self, section_top: f32, viewport_height: f32) -> f32 {
        let start = self.start * viewport_height;
        let end = self.end * viewport_height;
        let span = start - end;
        if viewport_height <= 0.0 || span.abs() <= f32::EPSILON {
            return 0.0;
        }
        // The end line itself is full progress, whatever the division rounds to.
        if span > 0.0 {
            if section_top >= start {
                return 0.0;
            }
            if section_top <= end {
                return 1.0;
            }
        }
        ((start - section_top) / span).clamp(0.0, 1.0)
    }
}

/// Style of a layout element as the host page should apply it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElementStyle {
    pub opacity: f32,
    /// Translation in CSS pixels.
    pub offset: [f32; 2],
    pub background: Option<[f32; 4]>,
}

impl Default for ElementStyle {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            offset: [0.0, 0.0],
            background: None,
        }
    }
}

/// One element animating from its configured start values to rest.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub element: String,
    pub from_opacity: Option<f32>,
    pub from_offset: [Option<f32>; 2],
    /// Start on the timeline's local axis, in seconds.
    pub start: f32,
    pub duration: f32,
    pub ease: Ease,
}

impl Track {
    pub fn end(&self) -> f32 {
        self.start + self.duration
    }

    /// Style at local time `time`: start values before the track begins, rest
    /// values after it ends.
    pub fn sample(&self, time: f32) -> ElementStyle {
        let t = if self.duration <= 0.0 {
            if time >= self.start { 1.0 } else { 0.0 }
        } else {
            self.ease.apply((time - self.start) / self.duration)
        };
        let rest = ElementStyle::default();
        let towards_rest = |from: Option<f32>, rest: f32| match from {
            Some(from) => from + (rest - from) * t,
            None => rest,
        };
        ElementStyle {
            opacity: towards_rest(self.from_opacity, rest.opacity),
            offset: [
                towards_rest(self.from_offset[0], rest.offset[0]),
                towards_rest(self.from_offset[1], rest.offset[1]),
            ],
            background: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScrollTimeline {
    section: String,
    pub trigger: ScrollTrigger,
    scrub: Duration,
    tracks: Vec<Track>,
    playhead: Tween<f32>,
}

impl ScrollTimeline {
    pub fn new(section: impl Into<String>, trigger: ScrollTrigger, scrub: Duration) -> Self {
        Self {
            section: section.into(),
            trigger,
            scrub,
            tracks: Vec::new(),
            playhead: Tween::new(0.0),
        }
    }

    pub fn from_config(config: &ScrollSectionConfig) -> Self {
        let scrub = secs_to_duration(config.scrub_secs);
        let trigger = ScrollTrigger::new(config.trigger_start, config.trigger_end);
        config.tweens.iter().fold(
            Self::new(config.section.clone(), trigger, scrub),
            |timeline, tween| timeline.with_tween(tween),
        )
    }

    /// Append a track. Its start is the current end of the timeline shifted by
    /// `offset_secs`, never earlier than zero.
    pub fn with_tween(mut self, tween: &ScrollTweenConfig) -> Self {
        let start = (self.duration() + tween.offset_secs).max(0.0);
        self.tracks.push(Track {
            element: tween.element.clone(),
            from_opacity: tween.from_opacity,
            from_offset: [tween.from_offset_x, tween.from_offset_y],
            start,
            duration: tween.duration_secs.max(0.0),
            ease: tween.ease,
        });
        self
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Length of the local time axis in seconds.
    pub fn duration(&self) -> f32 {
        self.tracks.iter().map(Track::end).fold(0.0, f32::max)
    }

    /// Feed a new scroll sample. The playhead retargets from wherever it is.
    pub fn set_progress(&mut self, progress: f32, now: Instant) {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        if self.scrub.is_zero() {
            self.playhead = Tween::new(progress);
        } else {
            self.playhead.retarget(progress, now, self.scrub, SCRUB_EASE);
        }
    }

    /// Scroll progress the playhead is heading to.
    pub fn target_progress(&self) -> f32 {
        self.playhead.goal()
    }

    /// Progress shown at `now`, lagging the target while scrubbing.
    pub fn progress_at(&self, now: Instant) -> f32 {
        self.playhead.value_at(now)
    }

    pub fn is_settled(&self, now: Instant) -> bool {
        !self.playhead.is_running(now)
    }

    /// Style of `element` at `now`, `None` if no track animates it.
    pub fn style(&self, element: &str, now: Instant) -> Option<ElementStyle> {
        let time = self.progress_at(now) * self.duration();
        self.tracks
            .iter()
            .find(|track| track.element == element)
            .map(|track| track.sample(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_progress_spans_start_to_end() {
        let trigger = ScrollTrigger::new(0.6, -0.1);
        assert_eq!(trigger.progress(600.0, 1000.0), 0.0);
        assert_eq!(trigger.progress(900.0, 1000.0), 0.0);
        assert!((trigger.progress(250.0, 1000.0) - 0.5).abs() < 1e-5);
        assert_eq!(trigger.progress(-100.0, 1000.0), 1.0);
        assert_eq!(trigger.progress(-900.0, 1000.0), 1.0);
        assert_eq!(trigger.progress(0.0, 0.0), 0.0);
    }

    #[test]
    fn reaching_the_end_line_is_full_progress() {
        let trigger = ScrollTrigger::new(0.6, -0.1);
        for height in [731.0, 977.0, 1000.0, 1080.0, 1333.0] {
            assert_eq!(trigger.progress(-0.1 * height, height), 1.0, "height {height}");
            assert_eq!(trigger.progress(0.6 * height, height), 0.0, "height {height}");
        }
    }

    #[test]
    fn negative_offsets_overlap_the_previous_track() {
        let timeline = ScrollTimeline::from_config(&ScrollSectionConfig::default());
        let [left, right] = timeline.tracks() else {
            panic!("expected two tracks");
        };
        assert_eq!(left.start, 0.0);
        assert!((right.start - 0.05).abs() < 1e-6);
        assert!((timeline.duration() - 0.55).abs() < 1e-6);
    }

    #[test]
    fn tracks_hold_from_values_until_they_start() {
        let timeline = ScrollTimeline::from_config(&ScrollSectionConfig::default());
        let right = &timeline.tracks()[1];
        let before = right.sample(0.0);
        assert_eq!(before.opacity, 0.0);
        assert_eq!(before.offset, [30.0, 0.0]);
        let after = right.sample(10.0);
        assert_eq!(after, ElementStyle::default());
    }

    #[test]
    fn unscrubbed_timelines_follow_progress_immediately() {
        let now = Instant::now();
        let mut config = ScrollSectionConfig::default();
        config.scrub_secs = 0.0;
        let mut timeline = ScrollTimeline::from_config(&config);
        timeline.set_progress(1.0, now);
        assert_eq!(timeline.progress_at(now), 1.0);
        assert_eq!(
            timeline.style("section2 .left", now),
            Some(ElementStyle::default())
        );
        assert_eq!(timeline.style("footer", now), None);
    }

    #[test]
    fn scrubbing_lags_behind_the_scroll_position() {
        let now = Instant::now();
        let mut timeline = ScrollTimeline::from_config(&ScrollSectionConfig::default());
        timeline.set_progress(1.0, now);
        let shortly_after = now + Duration::from_millis(100);
        assert!(timeline.progress_at(shortly_after) < 1.0);
        assert!(!timeline.is_settled(shortly_after));
        let later = now + Duration::from_secs(3);
        assert_eq!(timeline.progress_at(later), 1.0);
        assert!(timeline.is_settled(later));
    }

    #[test]
    fn progress_is_clamped() {
        let now = Instant::now();
        let mut timeline = ScrollTimeline::new("s", ScrollTrigger::new(0.6, -0.1), Duration::ZERO);
        timeline.set_progress(4.0, now);
        assert_eq!(timeline.target_progress(), 1.0);
        timeline.set_progress(-1.0, now);
        assert_eq!(timeline.target_progress(), 0.0);
    }
}
