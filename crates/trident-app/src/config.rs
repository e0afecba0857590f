// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use serde::Deserialize;
use std::f32::consts::TAU;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;
use trident_platform::WindowOptions;
use trident_render::{GpuSelection, RenderOptions, VsyncMode};
use trident_render_vk::{BUILTIN_FRAGMENT_SHADER, BUILTIN_SHADER_DIR, BUILTIN_VERTEX_SHADER};

pub const DEFAULT_CONFIG: &str = "trident.toml";

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "trident".into(),
            width: 640,
            height: 480,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub buffer_count: u32,
    pub vsync_mode: VsyncMode,
    pub validation: bool,
    pub gpu_index: Option<usize>,
    /// Case-insensitive substring of the device name.
    pub gpu_name: Option<String>,
    /// Directory with `triangle.vert.spv` and `triangle.frag.spv`.
    pub shader_dir: Option<PathBuf>,
    pub clear_color: [f32; 4],
    pub cycle_clear_color: bool,
    /// Phase advance per rendered frame, in radians.
    pub cycle_rate: f32,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            buffer_count: 3,
            vsync_mode: VsyncMode::Mailbox,
            validation: false,
            gpu_index: None,
            gpu_name: None,
            shader_dir: None,
            clear_color: [0.02, 0.02, 0.04, 1.0],
            cycle_clear_color: true,
            cycle_rate: 0.001,
        }
    }
}

/// Reads `path`. A missing file means defaults; a malformed one is an error.
pub fn load_cfg(path: &Path) -> Result<AppCfg> {
    match fs::read_to_string(path) {
        Ok(text) => parse_cfg(&text).with_context(|| format!("parsing {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!("{} not found, using defaults", path.display());
            Ok(AppCfg::default())
        }
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

pub fn parse_cfg(text: &str) -> Result<AppCfg> {
    Ok(toml::from_str(text)?)
}

impl AppCfg {
    pub fn window_options(&self) -> WindowOptions {
        WindowOptions {
            title: self.window.title.clone(),
            width: self.window.width,
            height: self.window.height,
            resizable: true,
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        let r = &self.render;
        let gpu = match (r.gpu_index, &r.gpu_name) {
            (Some(i), _) => GpuSelection::Index(i),
            (None, Some(name)) => GpuSelection::Name(name.clone()),
            (None, None) => GpuSelection::First,
        };
        let shader_dir = r
            .shader_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(BUILTIN_SHADER_DIR));
        RenderOptions {
            buffer_count: r.buffer_count,
            vsync: r.vsync_mode,
            clear_color: r.clear_color,
            validation: r.validation,
            gpu,
            vertex_shader: shader_dir.join(BUILTIN_VERTEX_SHADER),
            fragment_shader: shader_dir.join(BUILTIN_FRAGMENT_SHADER),
        }
    }
}

/// Clear colour whose channels follow three sines a third of a turn apart.
#[derive(Clone, Copy, Debug)]
pub struct ClearCycle {
    phase: f32,
    rate: f32,
    alpha: f32,
}

impl ClearCycle {
    pub fn new(rate: f32, alpha: f32) -> Self {
        ClearCycle {
            phase: 0.0,
            rate,
            alpha,
        }
    }

    pub fn color(&self) -> [f32; 4] {
        let channel = |k: f32| (self.phase + k * TAU / 3.0).sin() * 0.5 + 0.5;
        [channel(0.0), channel(1.0), channel(2.0), self.alpha]
    }

    /// Advances one frame and returns the new colour.
    pub fn step(&mut self) -> [f32; 4] {
        self.phase = (self.phase + self.rate) % TAU;
        self.color()
    }
}
