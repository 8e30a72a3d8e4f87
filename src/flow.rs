//! Application event loop.
//!
//! [`run`] opens a window (the `canvas` element on the web), builds the GPU
//! context and the render chain, starts the resource pipeline as a detached
//! task and then turns every display refresh into a frame.
//!
//! # Lifecycle
//!
//! 1. `resumed` creates the window and the GPU context (blocking on native,
//!    spawned on the web and delivered as [`AppEvent::Initialized`])
//! 2. the render chain, the [`Stage`] and its input listeners are installed and
//!    the [`FrameScheduler`] is started
//! 3. the resource pipeline runs concurrently and reports each stage back as an
//!    [`AppEvent::Scene`] which is applied between frames
//! 4. window events become [`InputEvent`]s dispatched through the hub
//! 5. `RedrawRequested` ticks the scheduler, composes a frame and asks for the
//!    next redraw
//! 6. closing the window stops the scheduler and releases the listeners

use std::sync::Arc;

use anyhow::anyhow;
use instant::Instant;
use winit::{
    application::ApplicationHandler,
    event::{MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::Window,
};

use crate::{
    config::StageConfig,
    context::Context,
    data_structures::scene_graph::{SceneSink, SceneUpdate},
    input::{EventHub, InputEvent, Subscriptions},
    pipelines::{rgb_shift::RgbShiftPass, scene::ScenePass},
    render::{Pass, RenderChain},
    resources::{AssetLoader, ResourcePipeline},
    scheduler::FrameScheduler,
    stage::Stage,
    viewport::Viewport,
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Pixels one wheel line scrolls the virtual page by.
const LINE_HEIGHT: f32 = 40.0;

pub enum AppEvent {
    /// The GPU context finished initializing on the web.
    Initialized(Box<Context>),
    Scene(SceneUpdate),
    /// Input reported by the host page.
    Input(InputEvent),
    Exit,
}

impl std::fmt::Debug for AppEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized(_) => f.write_str("Initialized"),
            Self::Scene(update) => f.debug_tuple("Scene").field(&update.kind()).finish(),
            Self::Input(event) => f.debug_tuple("Input").field(event).finish(),
            Self::Exit => f.write_str("Exit"),
        }
    }
}

impl SceneSink for EventLoopProxy<AppEvent> {
    fn submit(&mut self, update: SceneUpdate) -> anyhow::Result<()> {
        self.send_event(AppEvent::Scene(update))
            .map_err(|_| anyhow!("the event loop has shut down"))
    }
}

/// Where GPU initialization stands. On the web the context arrives some time
/// after `resumed`, which may fire again in between.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Startup {
    #[default]
    Idle,
    Pending,
    Ready,
}

impl Startup {
    /// Claim initialization. False while it is under way or already done.
    fn begin(&mut self) -> bool {
        if *self != Self::Idle {
            return false;
        }
        *self = Self::Pending;
        true
    }

    /// A failed attempt may be retried on the next `resumed`.
    fn finish(&mut self, succeeded: bool) {
        *self = if succeeded { Self::Ready } else { Self::Idle };
    }
}

/// Everything that exists once the GPU context is up.
struct Running {
    chain: RenderChain<Context>,
    stage: Stage,
    hub: EventHub<Stage>,
    subscriptions: Option<Subscriptions>,
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<AppEvent>,
    config: StageConfig,
    startup: Startup,
    running: Option<Running>,
    scheduler: FrameScheduler,
    /// Scroll position of the virtual page in logical pixels.
    scroll: f32,
}

impl App {
    fn new(event_loop: &EventLoop<AppEvent>, config: StageConfig) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        #[cfg(not(target_arch = "wasm32"))]
        let async_runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy,
            config,
            startup: Startup::Idle,
            running: None,
            scheduler: FrameScheduler::new(),
            scroll: 0.0,
        })
    }

    fn viewport_of(&self, window: &Window) -> Viewport {
        let size = window.inner_size();
        Viewport::from_physical(
            size.width,
            size.height,
            window.scale_factor(),
            self.config.render.max_pixel_ratio,
        )
    }

    /// Build the chain and the stage around a fresh context, then start
    /// loading and drawing.
    fn install(&mut self, context: Context) {
        let viewport = self.viewport_of(context.window());
        let passes: Vec<Box<dyn Pass<Context>>> = vec![
            Box::new(ScenePass::new(&context, &self.config.render)),
            Box::new(RgbShiftPass::new(&context, &self.config.render)),
        ];
        let window = context.window.clone();
        let mut chain = RenderChain::new(context, viewport);
        chain.configure(passes);

        let stage = Stage::from_config(&self.config, viewport);
        let mut hub = EventHub::new();
        let subscriptions = Stage::install(&mut hub);
        self.running = Some(Running {
            chain,
            stage,
            hub,
            subscriptions: Some(subscriptions),
        });

        self.spawn_resources();
        self.scheduler.start();
        window.request_redraw();
    }

    fn spawn_resources(&self) {
        let pipeline = ResourcePipeline::from_config(&self.config);
        let loader = AssetLoader::from_config(&self.config.assets);
        let mut proxy = self.proxy.clone();
        let task = async move {
            pipeline.run_reported(&loader, &mut proxy).await;
        };

        #[cfg(not(target_arch = "wasm32"))]
        self.async_runtime.spawn(task);

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(task);
    }

    fn dispatch(&mut self, event: InputEvent) {
        if let Some(running) = &mut self.running {
            running.hub.dispatch(&mut running.stage, &event, Instant::now());
        }
    }

    /// Map the wheel onto a virtual page so the scroll timelines can be
    /// scrubbed without a host page.
    fn scroll_by(&mut self, delta: f32) {
        let Some(running) = &self.running else {
            return;
        };
        let viewport_height = running.stage.viewport().height;
        let page_end = self
            .config
            .scroll
            .iter()
            .map(|section| section.virtual_top)
            .fold(1.0f32, f32::max)
            * viewport_height;
        self.scroll = (self.scroll + delta).clamp(0.0, page_end);

        let samples: Vec<InputEvent> = running
            .stage
            .animator
            .timelines()
            .iter()
            .filter_map(|timeline| {
                let section = self
                    .config
                    .scroll
                    .iter()
                    .find(|s| s.section == timeline.section())?;
                let top = section.virtual_top * viewport_height - self.scroll;
                Some(InputEvent::ScrollProgress {
                    section: timeline.section().to_string(),
                    progress: timeline.trigger.progress(top, viewport_height),
                })
            })
            .collect();
        for sample in samples {
            self.dispatch(sample);
        }
    }

    fn shutdown(&mut self) {
        self.scheduler.stop();
        if let Some(running) = &mut self.running
            && let Some(subscriptions) = running.subscriptions.take()
        {
            let released = subscriptions.release(&mut running.hub);
            log::info!("released {released} input listeners");
        }
    }

    fn redraw(&mut self) {
        let Some(running) = &mut self.running else {
            return;
        };
        let Some(tick) = self.scheduler.tick(Instant::now()) else {
            return;
        };
        running.stage.frame(&mut running.chain, &tick);

        #[cfg(target_arch = "wasm32")]
        web::publish_styles(&running.stage, tick.now);

        running.chain.backend().window().request_redraw();
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !self.startup.begin() {
            log::debug!("resumed while the GPU context is {:?}", self.startup);
            return;
        }

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title("flow-stage");

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document.get_element_by_id(CANVAS_ID).unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("cannot create the window: {e}");
                self.startup.finish(false);
                event_loop.exit();
                return;
            }
        };
        let viewport = self.viewport_of(&window);

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.async_runtime.block_on(Context::new(window, &viewport)) {
                Ok(context) => {
                    self.install(context);
                    self.startup.finish(true);
                }
                Err(e) => {
                    log::error!("GPU initialization failed: {e:#}");
                    self.startup.finish(false);
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            web::register(self.proxy.clone());
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match Context::new(window, &viewport).await {
                    Ok(context) => {
                        if proxy
                            .send_event(AppEvent::Initialized(Box::new(context)))
                            .is_err()
                        {
                            log::error!("event loop closed during initialization");
                        }
                    }
                    Err(e) => {
                        log::error!("GPU initialization failed: {e:#}");
                        let _ = proxy.send_event(AppEvent::Exit);
                    }
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::Initialized(context) => {
                if self.startup == Startup::Ready {
                    log::warn!("dropping a second GPU context");
                    return;
                }
                self.startup.finish(true);
                // The canvas may have been sized while the context was built.
                let viewport = self.viewport_of(context.window());
                self.install(*context);
                self.dispatch(InputEvent::Resized(viewport));
            }
            AppEvent::Scene(update) => match &mut self.running {
                Some(running) => running.stage.apply(update),
                None => log::warn!("dropping {} update before initialization", update.kind()),
            },
            AppEvent::Input(input) => self.dispatch(input),
            AppEvent::Exit => {
                if self.startup == Startup::Pending {
                    self.startup.finish(false);
                }
                self.shutdown();
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(running) = &self.running else {
            return;
        };
        let window = running.chain.backend().window.clone();

        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                let viewport = self.viewport_of(&window);
                self.dispatch(InputEvent::Resized(viewport));
            }
            WindowEvent::CursorMoved { position, .. } => {
                let size = window.inner_size();
                if size.width == 0 || size.height == 0 {
                    return;
                }
                let x = (position.x / size.width as f64) as f32;
                let y = (position.y / size.height as f64) as f32;
                self.dispatch(InputEvent::PointerMoved { x, y });
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let delta = match delta {
                    MouseScrollDelta::LineDelta(_, lines) => -lines * LINE_HEIGHT,
                    MouseScrollDelta::PixelDelta(pixels) => {
                        -(pixels.y / window.scale_factor()) as f32
                    }
                };
                self.scroll_by(delta);
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

#[cfg(target_arch = "wasm32")]
mod web {
    //! Bridge to the host page: scroll and hover samples come in through the
    //! exported functions, element styles go out after every frame.

    use std::{cell::RefCell, collections::HashMap};

    use instant::Instant;
    use wasm_bindgen::prelude::*;
    use winit::event_loop::EventLoopProxy;

    use super::AppEvent;
    use crate::{animation::timeline::ElementStyle, input::InputEvent, stage::Stage};

    thread_local! {
        static PROXY: RefCell<Option<EventLoopProxy<AppEvent>>> = const { RefCell::new(None) };
        static STYLES: RefCell<HashMap<String, ElementStyle>> = RefCell::new(HashMap::new());
    }

    pub(super) fn register(proxy: EventLoopProxy<AppEvent>) {
        PROXY.with(|slot| *slot.borrow_mut() = Some(proxy));
    }

    pub(super) fn publish_styles(stage: &Stage, now: Instant) {
        STYLES.with(|styles| {
            let mut styles = styles.borrow_mut();
            for (element, style) in stage.element_styles(now) {
                styles.insert(element.to_string(), style);
            }
        });
    }

    fn send(event: InputEvent) {
        PROXY.with(|slot| match slot.borrow().as_ref() {
            Some(proxy) => {
                if proxy.send_event(AppEvent::Input(event)).is_err() {
                    log::warn!("input reported after shutdown");
                }
            }
            None => log::warn!("input reported before the stage started"),
        });
    }

    #[wasm_bindgen]
    pub fn report_scroll_progress(section: String, progress: f32) {
        send(InputEvent::ScrollProgress { section, progress });
    }

    #[wasm_bindgen]
    pub fn report_hover(element: String, entered: bool) {
        send(InputEvent::Hover { element, entered });
    }

    /// `[opacity, offset_x, offset_y, r, g, b, a]` of an element as of the last
    /// frame. The colour is omitted when the element has no animated
    /// background.
    #[wasm_bindgen]
    pub fn element_style(element: String) -> Option<Vec<f32>> {
        STYLES.with(|styles| {
            styles.borrow().get(&element).map(|style| {
                let mut out = vec![style.opacity, style.offset[0], style.offset[1]];
                if let Some(colour) = style.background {
                    out.extend_from_slice(&colour);
                }
                out
            })
        })
    }
}

/// Entry point of the web build.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), wasm_bindgen::JsValue> {
    run(StageConfig::default()).map_err(|e| wasm_bindgen::JsValue::from_str(&e.to_string()))
}

pub fn run(config: StageConfig) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info)
            .map_err(|e| anyhow!("cannot initialize the console logger: {e}"))?;
    }

    let event_loop: EventLoop<AppEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, config)?;

    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Startup;

    #[test]
    fn initialization_is_claimed_once() {
        let mut startup = Startup::default();
        assert!(startup.begin());
        // resumed again before the context arrived
        assert!(!startup.begin());
        assert_eq!(startup, Startup::Pending);

        startup.finish(true);
        assert!(!startup.begin());
        assert_eq!(startup, Startup::Ready);
    }

    #[test]
    fn failed_initialization_can_be_retried() {
        let mut startup = Startup::default();
        assert!(startup.begin());
        startup.finish(false);
        assert_eq!(startup, Startup::Idle);
        assert!(startup.begin());
    }
}
