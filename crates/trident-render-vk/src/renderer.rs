// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use trident_render::{RenderOptions, RenderSize, Renderer};

use crate::context::{ContextOptions, DeviceContext};
use crate::debug::TracingSink;
use crate::error::{RenderResult, VkResultExt};
use crate::frame::{AcquireOutcome, FrameConfig, FrameLoop, PresentOutcome, SkipReason};
use crate::gpu::Gpu;
use crate::pipeline::TrianglePipeline;
use crate::upload::{Vertex, VertexBuffer};

const TRIANGLE: [Vertex; 3] = [
    Vertex { pos: [0.0, -0.5], color: [1.0, 0.0, 0.0] },
    Vertex { pos: [0.5, 0.5], color: [0.0, 1.0, 0.0] },
    Vertex { pos: [-0.5, 0.5], color: [0.0, 0.0, 1.0] },
];

pub struct VkRenderer {
    clear_color: [f32; 4],
    paused: bool,
    cmd_bufs: Vec<vk::CommandBuffer>,

    // everything below holds the device; `Drop` idles it first
    triangle: VertexBuffer,
    pipeline: TrianglePipeline,
    frames: FrameLoop,
    ctx: Rc<DeviceContext>,
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        options: &RenderOptions,
    ) -> Result<Self> {
        let ctx_options = ContextOptions {
            app_name: "trident".into(),
            validation: options.validation,
            selection: (&options.gpu).into(),
            diagnostics: Arc::new(TracingSink),
        };
        let ctx = Rc::new(
            DeviceContext::new(window, display, &ctx_options)
                .context("creating the Vulkan device")?,
        );
        let gpu: Rc<dyn Gpu> = ctx.clone();

        let mut frames = FrameLoop::new(
            gpu,
            FrameConfig {
                buffer_count: options.buffer_count,
                drawable: vk::Extent2D {
                    width: size.width,
                    height: size.height,
                },
                vsync: options.vsync,
            },
        )
        .context("building the swapchain")?;

        let pipeline = TrianglePipeline::build(
            &ctx,
            &mut frames,
            &options.vertex_shader,
            &options.fragment_shader,
        )
        .context("building the triangle pipeline")?;
        let triangle = VertexBuffer::upload(&ctx, &mut frames, &TRIANGLE)
            .context("uploading triangle vertices")?;

        let cmd_bufs = frames.allocate_command_buffers(
            vk::CommandBufferLevel::PRIMARY,
            frames.image_count() as u32,
            None,
        )?;

        info!(
            "vk renderer ready: {} images, {}x{}",
            frames.image_count(),
            frames.extent().width,
            frames.extent().height
        );

        Ok(VkRenderer {
            clear_color: options.clear_color,
            paused: size.is_empty(),
            cmd_bufs,
            triangle,
            pipeline,
            frames,
            ctx,
        })
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        self.frames.set_drawable_size(size.width, size.height);
        if size.is_empty() {
            self.paused = true;
            return Ok(());
        }
        self.paused = false;
        self.frames.resize_viewports(size.width, size.height, None);
        self.frames.resize_scissors(size.width, size.height, None);
        if self.frames.resize_swapchain()? {
            self.sync_command_buffers()?;
        }
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        if self.paused {
            return Ok(());
        }

        let index = match self.frames.acquire()? {
            AcquireOutcome::Ready(index) => index,
            AcquireOutcome::Skipped(SkipReason::OutOfDate) => {
                self.sync_command_buffers()?;
                return Ok(());
            }
            AcquireOutcome::Skipped(reason) => {
                debug!("frame skipped: {reason:?}");
                return Ok(());
            }
        };

        let cmd = self
            .cmd_bufs
            .get(index as usize)
            .copied()
            .ok_or_else(|| anyhow!("no command buffer for swapchain image {index}"))?;
        self.record(cmd).context("recording the frame")?;

        let rebuilt = match self.frames.submit_and_present(cmd)? {
            PresentOutcome::Presented => false,
            PresentOutcome::Suboptimal => self.frames.resize_swapchain()?,
            PresentOutcome::Resized { rebuilt, .. } => rebuilt,
        };
        if rebuilt {
            self.sync_command_buffers()?;
        }
        Ok(())
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }
}

impl VkRenderer {
    pub fn device(&self) -> &DeviceContext {
        &self.ctx
    }

    pub fn frames(&self) -> &FrameLoop {
        &self.frames
    }

    fn record(&self, cmd: vk::CommandBuffer) -> RenderResult<()> {
        let device = self.ctx.device();
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe { device.begin_command_buffer(cmd, &begin) }.during("begin_command_buffer")?;

        self.frames.begin_render_pass(cmd, self.clear_color)?;
        self.frames.apply_dynamic_state(cmd)?;
        unsafe {
            device.cmd_set_line_width(cmd, 1.0);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.raw());
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.triangle.buffer()], &[0]);
            device.cmd_draw(cmd, self.triangle.len(), 1, 0, 0);
        }
        self.frames.end_render_pass(cmd)?;

        unsafe { device.end_command_buffer(cmd) }.during("end_command_buffer")
    }

    /// One command buffer per swapchain image; the count can move on rebuild.
    fn sync_command_buffers(&mut self) -> RenderResult<()> {
        let wanted = self.frames.image_count();
        if self.cmd_bufs.len() == wanted {
            return Ok(());
        }
        // a rebuild idles the device, so none of these are pending
        self.frames.free_command_buffers(&self.cmd_bufs, None);
        self.cmd_bufs = self.frames.allocate_command_buffers(
            vk::CommandBufferLevel::PRIMARY,
            wanted as u32,
            None,
        )?;
        debug!("command buffers reallocated for {wanted} images");
        Ok(())
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        if let Err(err) = self.ctx.device_wait_idle() {
            warn!("device_wait_idle on shutdown: {err}");
        }
        self.frames.free_command_buffers(&self.cmd_bufs, None);
    }
}
