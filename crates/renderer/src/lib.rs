//! Renderer crate for flamewall.
//!
//! The module glues the preview window, the `wgpu` pipeline, and the flame
//! threshold effect together. The overall flow is:
//!
//! ```text
//!   CLI / flamewall
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ WindowState ──▶ winit event loop ──▶ render_frame()
//!          │                                      │
//!          │                                      └─▶ TimeSource ─▶ GPU UBO
//!          └──▶ (export policy) ──▶ offscreen target ──▶ PNG on disk
//! ```
//!
//! `GpuState` owns all GPU resources (surface, device, pipeline, uniforms,
//! noise texture), while `Renderer` is the thin entry point that chooses
//! between the interactive window and the headless export path. The noise
//! texture is fully uploaded before either path draws its first frame, and
//! the loop honours injectable stop conditions so runs can be bounded.

mod effect;
mod geometry;
mod gpu;
mod runtime;
mod texture;
mod types;
mod uniforms;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use gpu::GpuState;
use runtime::FramePacer;

pub use effect::{evaluate, scrolled_uv, shade, step_threshold, wrap, EffectParams};
pub use geometry::{PlaneMesh, PlaneVertex, DEFAULT_SEGMENTS};
pub use runtime::{
    time_source_for, BoxedTimeSource, ExportFormat, FixedStepTimeSource, FixedTimeSource,
    RenderPolicy, StopConditions, SystemTimeSource, TimePolicy, TimeSample, TimeSource,
    DEFAULT_TIME_STEP,
};
pub use texture::value_noise_tile;
pub use types::{Antialiasing, NoiseSource, RendererConfig};

/// High-level entry point that owns the chosen configuration.
///
/// The heavy lifting lives inside [`gpu::GpuState`]; `Renderer` simply selects
/// the presentation path and forwards the request.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    /// Builds a renderer for the supplied configuration.
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Launches the renderer: a preview window for animate/still policies, a
    /// headless offscreen pass for exports.
    pub fn run(&mut self) -> Result<()> {
        match &self.config.policy {
            RenderPolicy::Export { path, format, .. } => {
                self.run_export(path.clone(), *format)
            }
            _ => self.run_window(),
        }
    }

    /// Renders one frame offscreen and writes it to disk.
    fn run_export(&self, path: std::path::PathBuf, format: ExportFormat) -> Result<()> {
        let mut time_source = time_source_for(&self.config.policy, self.config.timing);
        let mut gpu = GpuState::offscreen(self.config.surface_size, &self.config)?;
        let sample = time_source.sample();
        let image = gpu.render_to_image(sample)?;
        match format {
            ExportFormat::Png => image
                .save(&path)
                .with_context(|| format!("failed to write export to {}", path.display()))?,
        }
        tracing::info!(
            path = %path.display(),
            time = sample.seconds,
            width = image.width(),
            height = image.height(),
            "exported still frame"
        );
        Ok(())
    }

    /// Opens the preview window and drives the `winit` event loop.
    ///
    /// A `WindowState` is created up-front and stored inside the event loop
    /// closure. `winit` delivers events one by one; we respond to them and
    /// draw another frame whenever a redraw is requested, until a stop
    /// condition fires or the window closes.
    fn run_window(&self) -> Result<()> {
        let event_loop = EventLoop::new().context("failed to initialize event loop")?;
        let window_size = PhysicalSize::new(self.config.surface_size.0, self.config.surface_size.1);
        let window = WindowBuilder::new()
            .with_title("Flamewall")
            .with_inner_size(window_size)
            .build(&event_loop)
            .context("failed to create preview window")?;
        let window = Arc::new(window);

        let mut state = WindowState::new(window.clone(), &self.config)?;
        state.window().request_redraw();

        event_loop
            .run(move |event, elwt| {
                // Drive redraws via vblank by waiting between events.
                elwt.set_control_flow(ControlFlow::Wait);

                match event {
                    Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
                        match event {
                            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                                elwt.exit();
                            }
                            WindowEvent::Resized(new_size) => {
                                state.resize(new_size);
                            }
                            WindowEvent::ScaleFactorChanged {
                                mut inner_size_writer,
                                ..
                            } => {
                                // Keep the current logical size when the scale factor changes.
                                let _ = inner_size_writer.request_inner_size(state.size());
                            }
                            WindowEvent::RedrawRequested => match state.render_frame() {
                                Ok(rendered) => {
                                    if rendered && state.finished() {
                                        tracing::info!(
                                            frames = state.frames_rendered,
                                            "stop condition reached; exiting"
                                        );
                                        elwt.exit();
                                    }
                                }
                                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                                    state.resize(state.size());
                                }
                                Err(wgpu::SurfaceError::OutOfMemory) => {
                                    tracing::error!("surface out of memory; exiting");
                                    elwt.exit();
                                }
                                Err(wgpu::SurfaceError::Timeout) => {
                                    tracing::warn!("surface timeout; retrying next frame");
                                }
                                Err(other) => {
                                    tracing::warn!("surface error: {other:?}; retrying next frame");
                                }
                            },
                            _ => {}
                        }
                    }
                    Event::AboutToWait => {
                        // Schedule the next frame once winit is about to wait for events again.
                        state.window().request_redraw();
                    }
                    _ => {}
                }
            })
            .map_err(|err| anyhow!("event loop error: {err}"))
    }
}

/// Aggregates every resource needed to present frames into the window.
struct WindowState {
    /// Shared handle to the window (`wgpu` requires it to create the surface).
    window: Arc<Window>,
    /// GPU resources backing the swapchain and flame pipeline.
    gpu: GpuState,
    /// Source of the time uniform, chosen by policy and clock.
    time_source: BoxedTimeSource,
    /// Optional FPS cap.
    pacer: FramePacer,
    /// Limits that end the loop.
    stop: StopConditions,
    started: Instant,
    frames_rendered: u64,
}

impl WindowState {
    /// Creates a fully initialised rendering state for the preview window.
    ///
    /// The method configures the swapchain, compiles the shader pair, builds
    /// the render pipeline, uploads the plane mesh and the noise texture, and
    /// seeds the uniform buffer. By the time this returns, every resource the
    /// first frame needs is resident.
    fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self> {
        let size = window.inner_size();
        let gpu = GpuState::for_window(window.as_ref(), size, config)?;

        let target_fps = match &config.policy {
            RenderPolicy::Animate { target_fps } => *target_fps,
            _ => None,
        };

        Ok(Self {
            window,
            gpu,
            time_source: time_source_for(&config.policy, config.timing),
            pacer: FramePacer::new(target_fps),
            stop: config.stop,
            started: Instant::now(),
            frames_rendered: 0,
        })
    }

    fn window(&self) -> &Window {
        self.window.as_ref()
    }

    /// Cached physical size of the swapchain surface.
    fn size(&self) -> PhysicalSize<u32> {
        self.gpu.size()
    }

    /// Reacts to platform resize events by updating the swapchain.
    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.gpu.resize(new_size);
    }

    /// Renders a frame unless the FPS cap says to skip this callback.
    ///
    /// Returns whether a frame was actually rendered.
    fn render_frame(&mut self) -> Result<bool, wgpu::SurfaceError> {
        if !self.pacer.should_render(Instant::now()) {
            return Ok(false);
        }
        let sample = self.time_source.sample();
        self.gpu.render_frame(sample)?;
        self.frames_rendered = self.frames_rendered.saturating_add(1);
        Ok(true)
    }

    /// Checks the injectable stop conditions.
    fn finished(&self) -> bool {
        self.stop
            .reached(self.frames_rendered, self.started, Instant::now())
    }
}
