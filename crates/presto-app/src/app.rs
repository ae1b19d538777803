// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use presto_core::FpsCounter;
use presto_platform::winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow},
    keyboard::KeyCode,
    window::{Fullscreen, Window, WindowId},
};
use presto_platform::{surface_event, InputState, MinimizeWatch};
use presto_render::{PresentDriver, RenderSize, SurfaceEvent, TickOutcome};
use presto_vk::{BootstrapConfig, ClearStep, FrameTimeOverlay, NoOverlay, Overlay, VkPresenter, VulkanGpu};
use tracing::{error, info};

use crate::config::AppCfg;

type Presenter = VkPresenter<VulkanGpu, ClearStep<VulkanGpu>>;

pub struct App {
    cfg: AppCfg,
    // declared before `window` so the surface goes before the window does
    presenter: Option<Presenter>,
    driver: Option<PresentDriver>,
    window: Option<Window>,

    input: InputState,
    minimize: MinimizeWatch,
    fps: FpsCounter,
    fullscreen: bool,
    exiting: bool,
    error: Option<anyhow::Error>,
}

impl App {
    pub fn new(cfg: AppCfg) -> Self {
        Self {
            cfg,
            presenter: None,
            driver: None,
            window: None,
            input: InputState::new(),
            minimize: MinimizeWatch::default(),
            fps: FpsCounter::default(),
            fullscreen: false,
            exiting: false,
            error: None,
        }
    }

    /// The fatal error that ended the loop, if any.
    pub fn finish(self) -> Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let wc = &self.cfg.window;
        let window = event_loop
            .create_window(
                Window::default_attributes()
                    .with_title(wc.title.clone())
                    .with_inner_size(LogicalSize::new(wc.width, wc.height)),
            )
            .context("create window")?;
        let size = window.inner_size();
        let size = RenderSize::new(size.width, size.height);

        let gpu = VulkanGpu::new(
            &window,
            &window,
            &BootstrapConfig {
                app_name: wc.title.clone(),
                ..BootstrapConfig::default()
            },
        )
        .context("Vulkan bootstrap")?;

        let overlay: Box<dyn Overlay<VulkanGpu>> = if self.cfg.render.overlay {
            Box::new(FrameTimeOverlay::new())
        } else {
            Box::new(NoOverlay)
        };
        let base = self.cfg.render.clear_color;
        let presenter = VkPresenter::new(Arc::new(gpu), self.cfg.chain_config(), size, overlay, |queue, extent| {
            ClearStep::new(queue, extent, base)
        })
        .context("presenter setup")?;

        let mut driver = PresentDriver::new(
            presenter.built_size().unwrap_or(RenderSize::ZERO),
            self.cfg.driver_config(),
        );
        // schedules a rebuild if the chain came up at another size or not at all
        driver.on_surface_event(SurfaceEvent::Resized(size));

        self.presenter = Some(presenter);
        self.driver = Some(driver);
        self.window = Some(window);
        self.fps.reset(Instant::now());
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        let (Some(window), Some(presenter), Some(driver)) =
            (self.window.as_ref(), self.presenter.as_mut(), self.driver.as_mut())
        else {
            return Ok(());
        };
        if let Some(ev) = self.minimize.update(window.is_minimized()) {
            driver.on_surface_event(ev);
        }
        if driver.tick(presenter)? == TickOutcome::Presented {
            self.fps.frame();
        }
        if let Some(rate) = self.fps.poll(Instant::now()) {
            let s = driver.stats();
            info!(
                "fps ~ {:.0} (presented {}, skipped {}, suspended {}, rebuilds {})",
                rate, s.presented, s.skipped, s.suspended, s.rebuilds
            );
        }
        Ok(())
    }

    fn toggle_fullscreen(&mut self) {
        let Some(window) = &self.window else { return };
        self.fullscreen = !self.fullscreen;
        if self.fullscreen {
            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
        } else {
            window.set_fullscreen(None);
        }
        info!("fullscreen = {}", self.fullscreen);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.presenter = None;
        self.driver = None;
        self.window = None;
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("fatal: {e:#}");
        self.error = Some(e);
        self.shutdown(event_loop);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && !self.exiting {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        match &self.window {
            Some(window) if window.id() == window_id => {}
            _ => return,
        }
        if self.input.handle(&event) {
            return;
        }
        if let (Some(ev), Some(driver)) = (surface_event(&event), self.driver.as_mut()) {
            driver.on_surface_event(ev);
            return;
        }
        match event {
            WindowEvent::CloseRequested => {
                info!("close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::Focused(false) => self.input.flush_all(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if self.input.pressed(KeyCode::Escape) {
            info!("Escape pressed, exiting");
            self.shutdown(event_loop);
            return;
        }
        if self.input.pressed(KeyCode::F11) {
            self.toggle_fullscreen();
        }
        let ticked = self.tick();
        self.input.flush();
        if let Err(e) = ticked {
            self.fail(event_loop, e);
        }
    }
}
