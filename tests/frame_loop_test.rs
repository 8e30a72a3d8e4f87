use std::{rc::Rc, task::Context};

use flow_stage::{
    FrameScheduler, SceneUpdate, Stage, StageConfig,
    input::{EventHub, InputEvent},
    viewport::Viewport,
};
use futures::{
    FutureExt, channel::mpsc, executor::LocalPool, task::LocalSpawnExt, task::noop_waker_ref,
};
use instant::{Duration, Instant};

use crate::common::test_utils::{
    MemorySource, PROBE_URL, init_logger, pipeline, recording_chain,
};

mod common;

fn drain(rx: &mut mpsc::UnboundedReceiver<SceneUpdate>, stage: &mut Stage) -> Vec<&'static str> {
    let mut kinds = Vec::new();
    while let Ok(Some(update)) = rx.try_next() {
        kinds.push(update.kind());
        stage.apply(update);
    }
    kinds
}

#[test]
fn frames_keep_coming_while_assets_load() {
    init_logger();
    let source = MemorySource::complete();
    let (mut tx, mut rx) = mpsc::unbounded();
    let pipeline = pipeline();
    let mut loading = Box::pin(async move {
        pipeline.run_reported(&source, &mut tx).await;
    });

    let (mut chain, journal) = recording_chain(&["scene", "rgb-shift"], Viewport::default());
    let mut stage = Stage::from_config(&StageConfig::default(), Viewport::default());
    let mut scheduler = FrameScheduler::new();
    scheduler.start();

    let mut cx = Context::from_waker(noop_waker_ref());
    let t0 = Instant::now();
    let mut arrivals = Vec::new();
    let mut done = false;
    for i in 0..20u64 {
        // one step of the loader, then one frame, on the same thread
        if !done {
            done = loading.poll_unpin(&mut cx).is_ready();
        }
        arrivals.extend(drain(&mut rx, &mut stage));
        let tick = scheduler.tick(t0 + Duration::from_millis(16 * i)).unwrap();
        stage.frame(&mut chain, &tick);
    }

    assert!(done);
    assert_eq!(arrivals, vec!["environment", "model"]);
    assert_eq!(chain.frames_rendered(), 20);

    let scene_lines: Vec<String> = journal
        .borrow()
        .iter()
        .filter(|line| line.starts_with("scene <-"))
        .cloned()
        .collect();
    assert!(scene_lines[0].ends_with("[- -]"));
    assert!(scene_lines.last().unwrap().ends_with("[env models/tri.gltf]"));
    // a model is never drawn without its lighting
    assert!(!scene_lines.iter().any(|line| line.ends_with("[- models/tri.gltf]")));
    let waiting = scene_lines.iter().filter(|line| line.ends_with("[- -]")).count();
    assert!(waiting >= 2, "only {waiting} frames rendered during loading");
}

#[test]
fn environment_failure_leaves_the_loop_running() {
    init_logger();
    let mut pool = LocalPool::new();
    let source = Rc::new(MemorySource::complete().without(PROBE_URL));
    let (mut tx, mut rx) = mpsc::unbounded();
    let pipeline = pipeline();
    let task_source = source.clone();
    pool.spawner()
        .spawn_local(async move {
            pipeline.run_reported(&*task_source, &mut tx).await;
        })
        .unwrap();

    let (mut chain, _) = recording_chain(&["scene"], Viewport::default());
    let mut stage = Stage::from_config(&StageConfig::default(), Viewport::default());
    let mut scheduler = FrameScheduler::new();
    scheduler.start();

    pool.run_until_stalled();
    assert!(drain(&mut rx, &mut stage).is_empty());
    assert_eq!(source.requests(), vec![PROBE_URL]);

    let t0 = Instant::now();
    for i in 0..5u64 {
        let tick = scheduler.tick(t0 + Duration::from_millis(16 * i)).unwrap();
        stage.frame(&mut chain, &tick);
    }
    assert!(scheduler.is_running());
    assert_eq!(chain.frames_rendered(), 5);
    assert!(stage.scene.environment().is_none());
    assert!(stage.scene.model().is_none());
}

#[test]
fn stopping_ends_the_ticks() {
    let (mut chain, _) = recording_chain(&["scene"], Viewport::default());
    let mut stage = Stage::from_config(&StageConfig::default(), Viewport::default());
    let mut scheduler = FrameScheduler::new();
    scheduler.start();
    let now = Instant::now();

    let tick = scheduler.tick(now).unwrap();
    stage.frame(&mut chain, &tick);
    scheduler.stop();
    scheduler.stop();

    assert!(scheduler.tick(now + Duration::from_millis(16)).is_none());
    assert_eq!(chain.frames_rendered(), 1);
}

#[test]
fn resizes_apply_to_chain_and_camera_on_the_next_frame() {
    let (mut chain, _) = recording_chain(&["scene", "rgb-shift"], Viewport::default());
    let mut stage = Stage::from_config(&StageConfig::default(), Viewport::default());
    let mut hub = EventHub::new();
    let subscriptions = Stage::install(&mut hub);
    let mut scheduler = FrameScheduler::new();
    scheduler.start();
    let now = Instant::now();

    let narrow = Viewport::new(600.0, 800.0, 1.0, 2.0);
    hub.dispatch(&mut stage, &InputEvent::Resized(narrow), now);
    // nothing changes between frames
    assert_eq!(chain.target_sizes(), vec![[1280, 720], [1280, 720]]);

    let tick = scheduler.tick(now).unwrap();
    stage.frame(&mut chain, &tick);
    assert_eq!(chain.target_sizes(), vec![[600, 800], [600, 800]]);
    assert_eq!(stage.scene.camera.aspect(), 0.75);
    assert_eq!(*stage.viewport(), narrow);
    assert!(!stage.has_pending_resize());

    // the same size again leaves everything as it was
    hub.dispatch(&mut stage, &InputEvent::Resized(narrow), now);
    let tick = scheduler.tick(now).unwrap();
    stage.frame(&mut chain, &tick);
    assert_eq!(chain.backend().resizes, vec![[600, 800]]);

    assert_eq!(subscriptions.release(&mut hub), 4);
}
