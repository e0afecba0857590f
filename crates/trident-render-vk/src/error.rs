// SPDX-License-Identifier: CEPL-1.0
use ash::prelude::VkResult;
use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

use crate::frame::FrameState;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error("no Vulkan device exposes the required extensions")]
    NoDeviceFound,

    #[error("device selection picked none of the {candidates} candidate device(s)")]
    DeviceNotSelected { candidates: usize },

    #[error("device `{0}` has no graphics-capable queue family")]
    NoGraphicsQueue(String),

    #[error("queue family {family} of `{device}` cannot present to the window surface")]
    SurfaceUnsupported { device: String, family: u32 },

    #[error("missing required extensions: {}", .0.join(", "))]
    MissingExtensions(Vec<String>),

    #[error("no depth/stencil format supports optimal-tiling attachment use")]
    NoSupportedDepthFormat,

    #[error("surface reports no formats")]
    NoSurfaceFormat,

    #[error("cannot read shader `{}`: {source}", path.display())]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot build shader module from `{}`: {reason}", path.display())]
    ShaderModule { path: PathBuf, reason: String },

    #[error("no memory type with {0:?}")]
    NoMemoryType(vk::MemoryPropertyFlags),

    #[error("graphics pipeline creation failed: {0}")]
    Pipeline(vk::Result),

    /// The device is gone. Nothing in place recovers it; the renderer must be rebuilt.
    #[error("device lost")]
    DeviceLost,

    #[error("frame loop is {found:?}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        found: FrameState,
    },

    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
}

impl RenderError {
    pub fn vk(call: &'static str, result: vk::Result) -> Self {
        if result == vk::Result::ERROR_DEVICE_LOST {
            RenderError::DeviceLost
        } else {
            RenderError::Vulkan { call, result }
        }
    }

    pub fn is_device_lost(&self) -> bool {
        matches!(self, RenderError::DeviceLost)
    }
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;

pub trait VkResultExt<T> {
    /// Tags a raw Vulkan failure with the call that produced it.
    fn during(self, call: &'static str) -> RenderResult<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn during(self, call: &'static str) -> RenderResult<T> {
        self.map_err(|e| RenderError::vk(call, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_lost_gets_its_own_kind() {
        let err = Err::<(), _>(vk::Result::ERROR_DEVICE_LOST)
            .during("queue_submit")
            .unwrap_err();
        assert!(err.is_device_lost());
    }

    #[test]
    fn other_results_keep_the_call_name() {
        let err = Err::<(), _>(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
            .during("create_image")
            .unwrap_err();
        match err {
            RenderError::Vulkan { call, result } => {
                assert_eq!(call, "create_image");
                assert_eq!(result, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unavailable_window_handle_converts_with_its_source() {
        let err = RenderError::from(raw_window_handle::HandleError::Unavailable);
        assert!(matches!(err, RenderError::WindowHandle(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn missing_extensions_are_listed() {
        let err = RenderError::MissingExtensions(vec!["VK_KHR_swapchain".into()]);
        assert_eq!(
            err.to_string(),
            "missing required extensions: VK_KHR_swapchain"
        );
    }
}
