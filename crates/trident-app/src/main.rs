// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};
use trident_core::{init_tracing, report_fatal};
use trident_platform::{drawable_size, render_size, window_attributes};
use trident_render::{RenderSize, Renderer};
use trident_render_vk::VkRenderer;

use trident_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    raw_window_handle::{HasDisplayHandle, HasWindowHandle},
    window::{Window, WindowId},
};

mod config;

use config::{load_cfg, AppCfg, ClearCycle, DEFAULT_CONFIG};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    /// Enable the Khronos validation layer
    #[arg(long)]
    validation: bool,
    /// Physical device index
    #[arg(long)]
    gpu: Option<usize>,
    /// Desired swapchain image count
    #[arg(long)]
    buffer_count: Option<u32>,
}

impl Args {
    fn apply(&self, cfg: &mut AppCfg) {
        if self.validation {
            cfg.render.validation = true;
        }
        if let Some(gpu) = self.gpu {
            cfg.render.gpu_index = Some(gpu);
        }
        if let Some(count) = self.buffer_count {
            cfg.render.buffer_count = count;
        }
    }
}

struct App {
    cfg: AppCfg,
    // renderer before window: the surface must go before the window it targets
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    render_size: RenderSize,
    cycle: Option<ClearCycle>,

    exiting: bool,
    paused: bool,
    occluded: bool,
    frames: u32,
    last_fps_instant: Instant,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(cfg: AppCfg) -> Self {
        let cycle = cfg
            .render
            .cycle_clear_color
            .then(|| ClearCycle::new(cfg.render.cycle_rate, cfg.render.clear_color[3]));
        App {
            cfg,
            renderer: None,
            window: None,
            render_size: RenderSize { width: 0, height: 0 },
            cycle,
            exiting: false,
            paused: false,
            occluded: false,
            frames: 0,
            last_fps_instant: Instant::now(),
            fatal: None,
        }
    }

    fn create_renderer(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = event_loop
            .create_window(window_attributes(&self.cfg.window_options()))
            .context("creating the window")?;
        self.render_size = drawable_size(&window);

        let options = self.cfg.render_options();
        let wh = window.window_handle().context("window handle")?;
        let dh = window.display_handle().context("display handle")?;
        let mut renderer = VkRenderer::new(&wh, &dh, self.render_size, &options)?;
        if let Some(cycle) = &self.cycle {
            renderer.set_clear_color(cycle.color());
        }

        info!(
            "window {}x{}, vsync {:?}, {} buffers requested",
            self.render_size.width,
            self.render_size.height,
            options.vsync,
            options.buffer_count
        );
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.fatal = Some(err);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }

    fn update_paused(&mut self) {
        let now_paused = self.occluded || self.render_size.is_empty();
        if self.paused != now_paused {
            self.paused = now_paused;
            info!("paused={}", self.paused);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(err) = self.create_renderer(event_loop) {
                self.fail(event_loop, err);
                return;
            }
        }

        self.update_paused();
        if !self.paused {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = render_size(new_size);
                debug!(
                    "Resized → {}x{}",
                    self.render_size.width, self.render_size.height
                );
                self.update_paused();

                if let Some(renderer) = &mut self.renderer {
                    if let Err(err) = renderer.resize(self.render_size) {
                        self.fail(event_loop, err.context("resizing"));
                        return;
                    }
                }
                if !self.paused {
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }

            WindowEvent::Occluded(occluded) => {
                self.occluded = occluded;
                self.update_paused();
            }

            WindowEvent::RedrawRequested => {
                if self.exiting || self.paused {
                    return;
                }
                let Some(renderer) = &mut self.renderer else {
                    return;
                };
                if let Some(cycle) = &mut self.cycle {
                    renderer.set_clear_color(cycle.step());
                }
                match renderer.render() {
                    Ok(()) => self.frames = self.frames.saturating_add(1),
                    Err(err) => self.fail(event_loop, err),
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        if self.paused {
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        // pacing comes from the present mode
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut cfg = load_cfg(&args.config)?;
    args.apply(&mut cfg);

    let event_loop: EventLoop<()> = EventLoop::new().context("creating the event loop")?;
    let mut app = App::new(cfg);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn main() {
    init_tracing();
    if let Err(err) = run(Args::parse()) {
        report_fatal(&err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_file_values() {
        let args = Args::try_parse_from([
            "trident",
            "--validation",
            "--gpu",
            "2",
            "--buffer-count",
            "4",
        ])
        .unwrap();
        let mut cfg = AppCfg::default();
        args.apply(&mut cfg);
        assert!(cfg.render.validation);
        assert_eq!(cfg.render.gpu_index, Some(2));
        assert_eq!(cfg.render.buffer_count, 4);
    }

    #[test]
    fn absent_flags_leave_the_file_alone() {
        let args = Args::try_parse_from(["trident"]).unwrap();
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG));

        let mut cfg = AppCfg::default();
        cfg.render.validation = true;
        cfg.render.buffer_count = 2;
        args.apply(&mut cfg);
        assert!(cfg.render.validation);
        assert_eq!(cfg.render.buffer_count, 2);
    }
}
