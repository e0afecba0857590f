// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Present mode preference. Resolved once against the surface and kept for the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VsyncMode {
    Fifo,
    #[default]
    Mailbox,
    Immediate,
}

/// Which physical device to open when several qualify.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum GpuSelection {
    #[default]
    First,
    Index(usize),
    /// Case-insensitive substring of the device name.
    Name(String),
}

#[derive(Clone, Debug)]
pub struct RenderOptions {
    pub buffer_count: u32,
    pub vsync: VsyncMode,
    pub clear_color: [f32; 4],
    pub validation: bool,
    pub gpu: GpuSelection,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            buffer_count: 3,
            vsync: VsyncMode::default(),
            clear_color: [0.02, 0.02, 0.04, 1.0],
            validation: false,
            gpu: GpuSelection::First,
            vertex_shader: PathBuf::from("shaders/triangle.vert.spv"),
            fragment_shader: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        options: &RenderOptions,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self) -> Result<()>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimension_is_empty() {
        assert!(RenderSize { width: 0, height: 480 }.is_empty());
        assert!(RenderSize { width: 640, height: 0 }.is_empty());
        assert!(!RenderSize { width: 640, height: 480 }.is_empty());
    }

    #[test]
    fn default_options_target_three_buffers() {
        let opts = RenderOptions::default();
        assert_eq!(opts.buffer_count, 3);
        assert_eq!(opts.vsync, VsyncMode::Mailbox);
        assert_eq!(opts.gpu, GpuSelection::First);
    }
}
