// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
pub use winit;

use trident_render::RenderSize;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::window::{Window, WindowAttributes};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowOptions {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowOptions {
    fn default() -> Self {
        WindowOptions {
            title: "trident".into(),
            width: 640,
            height: 480,
            resizable: true,
        }
    }
}

pub fn window_attributes(options: &WindowOptions) -> WindowAttributes {
    Window::default_attributes()
        .with_title(options.title.clone())
        .with_inner_size(LogicalSize::new(options.width, options.height))
        .with_resizable(options.resizable)
}

/// Drawable size in pixels. Zero in either dimension while minimized.
pub fn render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize {
        width: size.width,
        height: size.height,
    }
}

pub fn drawable_size(window: &Window) -> RenderSize {
    render_size(window.inner_size())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimized_window_has_an_empty_drawable() {
        assert!(render_size(PhysicalSize::new(0, 0)).is_empty());
        assert!(render_size(PhysicalSize::new(1280, 0)).is_empty());
    }

    #[test]
    fn physical_size_maps_straight_through() {
        let size = render_size(PhysicalSize::new(800, 600));
        assert_eq!(size, RenderSize { width: 800, height: 600 });
    }

    #[test]
    fn default_window_is_640_by_480() {
        let options = WindowOptions::default();
        assert_eq!((options.width, options.height), (640, 480));
        assert!(options.resizable);
    }
}
