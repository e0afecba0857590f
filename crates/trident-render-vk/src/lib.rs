// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan backend: device context, swapchain, render targets, frame sync and
//! the frame loop that drives them, plus the triangle that exercises it all.

pub mod command;
pub mod context;
pub mod debug;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod pipeline;
pub mod renderer;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod targets;
pub mod upload;

#[cfg(test)]
mod testing;

pub use context::{ContextOptions, DeviceCandidate, DeviceContext, DeviceSelection};
pub use debug::{DiagnosticSink, Severity, TracingSink};
pub use error::{RenderError, RenderResult};
pub use frame::{AcquireOutcome, FrameConfig, FrameLoop, FrameState, PresentOutcome, SkipReason};
pub use gpu::Gpu;
pub use renderer::VkRenderer;
pub use shader::ShaderRelease;

/// Directory holding the SPIR-V compiled from the built-in triangle shaders.
pub const BUILTIN_SHADER_DIR: &str = env!("OUT_DIR");
pub const BUILTIN_VERTEX_SHADER: &str = "triangle.vert.spv";
pub const BUILTIN_FRAGMENT_SHADER: &str = "triangle.frag.spv";
