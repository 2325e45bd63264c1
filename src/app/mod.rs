mod window;

use color_eyre::eyre::Report;
use color_eyre::Result;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};
use crate::app::window::WinitWindow;
use crate::renderer::config::{AppConfig, RenderConfig};
use crate::renderer::core::frame::FrameOutcome;
use crate::renderer::Renderer;

pub struct App {
    app_config: AppConfig,
    render_config: RenderConfig,

    // The renderer is declared first so it is dropped before the window it draws into
    renderer: Option<Renderer>,
    window: Option<WinitWindow>,

    // State
    close_requested: bool,
    error: Option<Report>,
}

impl App {
    pub fn new(app_config: AppConfig, render_config: RenderConfig) -> Self {
        Self {
            app_config,
            render_config,
            renderer: None,
            window: None,
            close_requested: false,
            error: None,
        }
    }

    /// Runs the event loop until the window closes or the renderer fails.
    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self)?;

        // Tear down GPU objects before the event loop's display connection goes away
        self.renderer = None;
        self.window = None;

        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title(self.app_config.title.clone())
            .with_inner_size(LogicalSize::new(self.app_config.width, self.app_config.height))
            .with_resizable(self.app_config.resizable);
        let window = WinitWindow::new(event_loop.create_window(attributes)?);

        let renderer = Renderer::new(&self.render_config, &window)?;
        log::info!("Renderer ready ({:?})", renderer.backend());

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn draw(&mut self) -> Result<()> {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return Ok(());
        };
        if window.is_minimized() {
            return Ok(());
        }

        if let FrameOutcome::Skipped = renderer.render_frame(window)? {
            log::debug!("Frame skipped while the swapchain was rebuilt");
        }
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Report) {
        log::error!("{:?}", err);
        self.error = Some(err);
        self.close_requested = true;
        event_loop.exit();
    }

    fn request_close(&mut self) {
        self.close_requested = true;
        if let Some(window) = self.window.as_ref() {
            window.request_close();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.error.is_some() {
            return;
        }

        if let Err(err) = self.init(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        if self.window.as_ref().is_none_or(|window| window.window.id() != window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.request_close();
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.request_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.draw() {
                    self.fail(event_loop, err);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: Key::Named(NamedKey::Escape),
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => {
                self.request_close();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            event_loop.exit();
            return;
        }

        if let Some(window) = self.window.as_ref() {
            window.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.renderer = None;
    }
}
