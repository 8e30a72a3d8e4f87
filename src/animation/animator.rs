//! Input-driven animation of the model node and the page elements around it.
//!
//! Pointer samples, scroll samples and hover changes arrive at irregular times.
//! Each one retargets the tween of the (subject, property) pair it drives; a
//! frame then reads every tween at the frame's timestamp and writes the model
//! pose into the [`Scene`].

use std::collections::HashMap;

use cgmath::Rad;
use instant::Instant;

use super::{
    ease::Ease,
    timeline::{ElementStyle, ScrollTimeline},
    tween::{Tween, secs_to_duration},
};
use crate::{
    config::{HoverConfig, PointerConfig, StageConfig},
    data_structures::scene_graph::Scene,
};

/// What an interpolation animates.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Subject {
    Model,
    Element(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Property {
    RotationX,
    RotationY,
    Background,
}

pub type Key = (Subject, Property);

pub struct InteractionAnimator {
    pointer: PointerConfig,
    scalars: HashMap<Key, Tween<f32>>,
    colours: HashMap<Key, Tween<[f32; 4]>>,
    timelines: Vec<ScrollTimeline>,
    hover: Vec<HoverConfig>,
}

impl InteractionAnimator {
    pub fn new(pointer: PointerConfig) -> Self {
        Self {
            pointer,
            scalars: HashMap::new(),
            colours: HashMap::new(),
            timelines: Vec::new(),
            hover: Vec::new(),
        }
    }

    pub fn from_config(config: &StageConfig) -> Self {
        let mut animator = Self::new(config.pointer.clone());
        for section in &config.scroll {
            animator.add_timeline(ScrollTimeline::from_config(section));
        }
        for hover in &config.hover {
            animator.add_hover_target(hover.clone());
        }
        animator
    }

    pub fn add_timeline(&mut self, timeline: ScrollTimeline) {
        self.timelines.retain(|t| t.section() != timeline.section());
        self.timelines.push(timeline);
    }

    /// Register an element whose background follows hover state. It starts at
    /// its rest colour.
    pub fn add_hover_target(&mut self, hover: HoverConfig) {
        self.colours.insert(
            (Subject::Element(hover.element.clone()), Property::Background),
            Tween::new(hover.rest_colour),
        );
        self.hover.retain(|h| h.element != hover.element);
        self.hover.push(hover);
    }

    /// Orientation goals for a pointer position in `[0,1] x [0,1]`, as
    /// `(x_rotation, y_rotation)`.
    ///
    /// Horizontal movement turns the model about Y, vertical movement about X.
    /// Both stay within half the angular range either side of zero.
    pub fn orientation_goal(&self, x: f32, y: f32) -> (f32, f32) {
        let clamp = |v: f32| if v.is_nan() { 0.5 } else { v.clamp(0.0, 1.0) };
        let range = self.pointer.angular_range;
        ((clamp(y) - 0.5) * range, (clamp(x) - 0.5) * range)
    }

    /// Retarget the model's orientation. Without a model this does nothing.
    pub fn on_pointer_move(&mut self, scene: &Scene, x: f32, y: f32, now: Instant) {
        let Some(model) = scene.model() else {
            return;
        };
        let (goal_x, goal_y) = self.orientation_goal(x, y);
        let duration = secs_to_duration(self.pointer.duration_secs);
        let ease = self.pointer.ease;
        let rotation = model.transform.rotation;
        for (property, current, goal) in [
            (Property::RotationX, rotation.x.0, goal_x),
            (Property::RotationY, rotation.y.0, goal_y),
        ] {
            self.scalars
                .entry((Subject::Model, property))
                .or_insert_with(|| Tween::new(current))
                .retarget(goal, now, duration, ease);
        }
    }

    /// Feed scroll progress for `section`. Unknown sections are ignored.
    pub fn on_scroll_progress(&mut self, section: &str, progress: f32, now: Instant) {
        match self.timelines.iter_mut().find(|t| t.section() == section) {
            Some(timeline) => timeline.set_progress(progress, now),
            None => log::debug!("no scroll timeline for section {section}"),
        }
    }

    /// Retarget the background of a hover target. Unknown elements are ignored.
    pub fn on_hover(&mut self, element: &str, entered: bool, now: Instant) {
        let Some(hover) = self.hover.iter().find(|h| h.element == element) else {
            log::debug!("no hover animation for element {element}");
            return;
        };
        let goal = if entered {
            hover.hover_colour
        } else {
            hover.rest_colour
        };
        let duration = secs_to_duration(hover.duration_secs);
        let ease: Ease = hover.ease;
        self.colours
            .entry((Subject::Element(element.to_string()), Property::Background))
            .or_insert_with(|| Tween::new(goal))
            .retarget(goal, now, duration, ease);
    }

    /// Write the model orientation at `now` into the scene.
    pub fn update(&mut self, scene: &mut Scene, now: Instant) {
        let Some(model) = scene.model_mut() else {
            return;
        };
        if let Some(tween) = self.scalars.get_mut(&(Subject::Model, Property::RotationX)) {
            model.transform.rotation.x = Rad(tween.settle(now));
        }
        if let Some(tween) = self.scalars.get_mut(&(Subject::Model, Property::RotationY)) {
            model.transform.rotation.y = Rad(tween.settle(now));
        }
    }

    pub fn value(&self, key: &Key, now: Instant) -> Option<f32> {
        self.scalars.get(key).map(|tween| tween.value_at(now))
    }

    pub fn goal(&self, key: &Key) -> Option<f32> {
        self.scalars.get(key).map(Tween::goal)
    }

    pub fn is_animating(&self, now: Instant) -> bool {
        self.scalars.values().any(|t| t.is_running(now))
            || self.colours.values().any(|t| t.is_running(now))
            || self.timelines.iter().any(|t| !t.is_settled(now))
    }

    pub fn timeline(&self, section: &str) -> Option<&ScrollTimeline> {
        self.timelines.iter().find(|t| t.section() == section)
    }

    pub fn timelines(&self) -> &[ScrollTimeline] {
        &self.timelines
    }

    /// Ids of every element this animator styles.
    pub fn elements(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .timelines
            .iter()
            .flat_map(|t| t.tracks().iter().map(|track| track.element.as_str()))
            .chain(self.hover.iter().map(|h| h.element.as_str()))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Style of a layout element at `now`, `None` if nothing animates it.
    pub fn element_style(&self, element: &str, now: Instant) -> Option<ElementStyle> {
        let scrolled = self.timelines.iter().find_map(|t| t.style(element, now));
        let background = self
            .colours
            .get(&(Subject::Element(element.to_string()), Property::Background))
            .map(|tween| tween.value_at(now));
        match (scrolled, background) {
            (None, None) => None,
            (style, background) => Some(ElementStyle {
                background,
                ..style.unwrap_or_default()
            }),
        }
    }
}

impl Default for InteractionAnimator {
    fn default() -> Self {
        Self::from_config(&StageConfig::default())
    }
}
