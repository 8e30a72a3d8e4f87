//! The state one running page owns.

use instant::Instant;

use crate::{
    animation::animator::InteractionAnimator,
    camera::Camera,
    config::StageConfig,
    data_structures::scene_graph::{Scene, SceneUpdate},
    input::{EventHub, EventKind, InputEvent, Subscriptions},
    render::{Backend, RenderChain},
    scheduler::FrameTick,
    viewport::Viewport,
};

pub struct Stage {
    pub scene: Scene,
    pub animator: InteractionAnimator,
    viewport: Viewport,
    pending_resize: Option<Viewport>,
}

impl Stage {
    pub fn new(scene: Scene, animator: InteractionAnimator, viewport: Viewport) -> Self {
        Self {
            scene,
            animator,
            viewport,
            pending_resize: None,
        }
    }

    pub fn from_config(config: &StageConfig, viewport: Viewport) -> Self {
        let camera = Camera::from_config(&config.camera, viewport.aspect());
        Self::new(
            Scene::new(camera),
            InteractionAnimator::from_config(config),
            viewport,
        )
    }

    /// Latest viewport reported by the host, applied or not.
    pub fn viewport(&self) -> &Viewport {
        self.pending_resize.as_ref().unwrap_or(&self.viewport)
    }

    /// Queue a viewport for the next frame. A later request replaces an
    /// earlier one that hasn't been applied yet.
    pub fn request_resize(&mut self, viewport: Viewport) {
        self.pending_resize = Some(viewport);
    }

    pub fn has_pending_resize(&self) -> bool {
        self.pending_resize.is_some()
    }

    pub fn apply(&mut self, update: SceneUpdate) {
        log::debug!("applying {} update", update.kind());
        self.scene.apply(update);
    }

    /// Forward input events to the animator and the pending viewport.
    pub fn install(hub: &mut EventHub<Stage>) -> Subscriptions {
        let pointer = hub.subscribe(EventKind::Pointer, |stage, event, now| {
            if let InputEvent::PointerMoved { x, y } = event {
                stage.animator.on_pointer_move(&stage.scene, *x, *y, now);
            }
        });
        let scroll = hub.subscribe(EventKind::Scroll, |stage, event, now| {
            if let InputEvent::ScrollProgress { section, progress } = event {
                stage.animator.on_scroll_progress(section, *progress, now);
            }
        });
        let hover = hub.subscribe(EventKind::Hover, |stage, event, now| {
            if let InputEvent::Hover { element, entered } = event {
                stage.animator.on_hover(element, *entered, now);
            }
        });
        let resize = hub.subscribe(EventKind::Resize, |stage, event, _| {
            if let InputEvent::Resized(viewport) = event {
                stage.request_resize(*viewport);
            }
        });
        Subscriptions::new(vec![pointer, scroll, hover, resize])
    }

    /// Compose one frame: apply a pending viewport, advance the animations
    /// into the scene, render. Render errors are logged and the frame dropped.
    pub fn frame<B: Backend>(&mut self, chain: &mut RenderChain<B>, tick: &FrameTick) {
        if let Some(viewport) = self.pending_resize.take() {
            if chain.resize(viewport, &mut self.scene.camera) {
                log::debug!("frame {} resized to {:?}", tick.index, viewport.physical_size());
            }
            self.viewport = *chain.viewport();
        }
        self.animator.update(&mut self.scene, tick.now);
        if let Err(err) = chain.render(&self.scene) {
            log::error!("frame {} failed: {err:#}", tick.index);
        }
    }

    /// Element styles at `now`, for hosts that lay out the page.
    pub fn element_styles(
        &self,
        now: Instant,
    ) -> Vec<(&str, crate::animation::timeline::ElementStyle)> {
        self.animator
            .elements()
            .into_iter()
            .filter_map(|element| Some((element, self.animator.element_style(element, now)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data_structures::{model::ModelData, scene_graph::ModelNode};

    #[test]
    fn resize_requests_are_coalesced() {
        let mut stage = Stage::from_config(&StageConfig::default(), Viewport::default());
        let small = Viewport::new(400.0, 300.0, 1.0, 2.0);
        let large = Viewport::new(1600.0, 900.0, 1.0, 2.0);
        stage.request_resize(small);
        stage.request_resize(large);
        assert!(stage.has_pending_resize());
        assert_eq!(*stage.viewport(), large);
    }

    #[test]
    fn installed_listeners_drive_the_animator() {
        let mut hub = EventHub::new();
        let mut stage = Stage::from_config(&StageConfig::default(), Viewport::default());
        stage.apply(SceneUpdate::Model(ModelNode::new(
            "helmet",
            Arc::new(ModelData::default()),
        )));
        let subscriptions = Stage::install(&mut hub);
        assert_eq!(subscriptions.ids().len(), 4);

        let now = Instant::now();
        hub.dispatch(&mut stage, &InputEvent::PointerMoved { x: 1.0, y: 0.5 }, now);
        assert!(stage.animator.is_animating(now));

        hub.dispatch(
            &mut stage,
            &InputEvent::Resized(Viewport::new(640.0, 480.0, 1.0, 2.0)),
            now,
        );
        assert!(stage.has_pending_resize());

        assert_eq!(subscriptions.release(&mut hub), 4);
        assert!(hub.is_empty());
    }

    #[test]
    fn styles_cover_every_animated_element() {
        let stage = Stage::from_config(&StageConfig::default(), Viewport::default());
        let styles = stage.element_styles(Instant::now());
        let names: Vec<&str> = styles.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["button", "section2 .left", "section2 .right"]);
    }
}
