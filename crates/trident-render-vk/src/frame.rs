// SPDX-License-Identifier: CEPL-1.0
//! Per-frame protocol: acquire, record, submit, present, and the rebuild path
//! that replaces the swapchain and everything derived from it.
//!
//! ```text
//! Idle -> Acquiring -> Recording -> Submitted -> Presenting -> Idle
//!            \                                      /
//!             `-------------> Resizing <-----------'
//! ```

use ash::vk;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info, warn};
use trident_render::VsyncMode;

use crate::command::CommandAllocator;
use crate::error::{RenderError, RenderResult, VkResultExt};
use crate::gpu::{Gpu, RenderPassBegin, Submission, SwapchainDesc};
use crate::shader::{ShaderCache, ShaderRelease};
use crate::swapchain::{
    choose_image_count, choose_present_mode, choose_surface_format, resolve_extent, same_extent,
    Swapchain,
};
use crate::sync::SyncSet;
use crate::targets::{probe_depth_format, RenderTargets};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Recording { index: u32 },
    Submitted,
    Presenting,
    Resizing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The swapchain no longer matches the surface; the resize path has run.
    OutOfDate,
    /// Timeout or not-ready.
    NotReady,
    /// Anything else short of device loss. Logged, then ignored.
    Error(vk::Result),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image `index` is ours; its fence has been waited on and reset.
    Ready(u32),
    Skipped(SkipReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented, but the surface would prefer a rebuilt swapchain.
    Suboptimal,
    /// Presentation failed with `result` and the resize path ran in its place.
    Resized { result: vk::Result, rebuilt: bool },
}

#[derive(Clone, Copy, Debug)]
pub struct FrameConfig {
    pub buffer_count: u32,
    /// Window size in pixels, used when the surface leaves the extent to us.
    pub drawable: vk::Extent2D,
    pub vsync: VsyncMode,
}

pub struct FrameLoop {
    state: FrameState,
    buffer_count: u32,
    drawable: vk::Extent2D,
    viewports: Vec<vk::Viewport>,
    scissors: Vec<vk::Rect2D>,

    // pinned at construction
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    depth_format: vk::Format,

    // drop order: sync, targets, swapchain, then the caches, then the device
    sync: SyncSet,
    targets: RenderTargets,
    swapchain: Swapchain,
    shaders: ShaderCache,
    commands: CommandAllocator,
    gpu: Rc<dyn Gpu>,
}

impl FrameLoop {
    pub fn new(gpu: Rc<dyn Gpu>, config: FrameConfig) -> RenderResult<Self> {
        let caps = gpu
            .surface_capabilities()
            .during("get_physical_device_surface_capabilities")?;
        let formats = gpu
            .surface_formats()
            .during("get_physical_device_surface_formats")?;
        let modes = gpu
            .surface_present_modes()
            .during("get_physical_device_surface_present_modes")?;

        let surface_format = choose_surface_format(&formats).ok_or(RenderError::NoSurfaceFormat)?;
        let present_mode = choose_present_mode(&modes, config.vsync);
        let depth_format = probe_depth_format(&*gpu)?;

        let desc = SwapchainDesc {
            image_count: choose_image_count(&caps, config.buffer_count),
            format: surface_format,
            present_mode,
            extent: resolve_extent(&caps, config.drawable),
            pre_transform: caps.current_transform,
            old_swapchain: vk::SwapchainKHR::null(),
        };
        let swapchain = Swapchain::create(&gpu, &desc)?;
        let targets = RenderTargets::build(&gpu, &swapchain, depth_format)?;
        let sync = SyncSet::new(&gpu, swapchain.image_count())?;

        let extent = swapchain.extent();
        info!(
            "swapchain ready: {}x{}, {} images, {:?} / {:?}, {:?}, depth {:?}",
            extent.width,
            extent.height,
            swapchain.image_count(),
            surface_format.format,
            surface_format.color_space,
            present_mode,
            depth_format
        );

        Ok(FrameLoop {
            state: FrameState::Idle,
            buffer_count: config.buffer_count,
            drawable: config.drawable,
            viewports: vec![full_viewport(extent)],
            scissors: vec![full_scissor(extent)],
            surface_format,
            present_mode,
            depth_format,
            sync,
            targets,
            swapchain,
            shaders: ShaderCache::new(),
            commands: CommandAllocator::new(),
            gpu,
        })
    }

    /// Acquires the next image and claims its slot.
    ///
    /// Only valid from `Idle`: the acquire semaphore is shared, so a frame must
    /// be submitted before the next acquire starts.
    pub fn acquire(&mut self) -> RenderResult<AcquireOutcome> {
        self.expect_idle()?;
        self.state = FrameState::Acquiring;

        let acquired = self.gpu.acquire_next_image(
            self.swapchain.handle(),
            u64::MAX,
            self.sync.image_available(),
        );

        match acquired {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    debug!("acquired image {index} from a suboptimal swapchain");
                }
                if let Err(err) = self.claim_slot(index) {
                    self.state = FrameState::Idle;
                    self.discard_acquire();
                    return Err(err);
                }
                self.state = FrameState::Recording { index };
                Ok(AcquireOutcome::Ready(index))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("swapchain out of date at acquire");
                self.run_resize()?;
                Ok(AcquireOutcome::Skipped(SkipReason::OutOfDate))
            }
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
                self.state = FrameState::Idle;
                debug!("no swapchain image ready; skipping frame");
                Ok(AcquireOutcome::Skipped(SkipReason::NotReady))
            }
            Err(vk::Result::ERROR_DEVICE_LOST) => {
                self.state = FrameState::Idle;
                Err(RenderError::DeviceLost)
            }
            Err(err) => {
                self.state = FrameState::Idle;
                warn!("acquire_next_image failed: {err}; skipping frame");
                Ok(AcquireOutcome::Skipped(SkipReason::Error(err)))
            }
        }
    }

    /// Blocks until the slot's previous submission retired, then re-arms its fence.
    fn claim_slot(&self, index: u32) -> RenderResult<()> {
        let fence = self.slot_fence(index)?;
        self.gpu
            .wait_for_fence(fence, u64::MAX)
            .during("wait_for_fences")?;
        self.gpu.reset_fence(fence).during("reset_fences")
    }

    /// Swaps in a fresh acquire semaphore after a frame was abandoned between
    /// acquire and submit; the old one is signaled and nothing will wait on it.
    fn discard_acquire(&mut self) {
        if let Err(err) = self.gpu.device_wait_idle() {
            warn!("device_wait_idle after an abandoned frame: {err}");
            return;
        }
        if let Err(err) = self.sync.renew_image_available(&self.gpu) {
            warn!("could not replace the acquire semaphore: {err}");
        }
    }

    fn slot_fence(&self, index: u32) -> RenderResult<vk::Fence> {
        self.sync
            .fence(index as usize)
            .ok_or(RenderError::vk("acquire_next_image", vk::Result::ERROR_UNKNOWN))
    }

    pub fn begin_render_pass(&self, cmd: vk::CommandBuffer, clear_color: [f32; 4]) -> RenderResult<()> {
        let index = self.recording_index()?;
        let framebuffer = self
            .targets
            .framebuffer(index as usize)
            .ok_or(RenderError::InvalidState {
                expected: "Recording with a framebuffer for the image",
                found: self.state,
            })?;

        let begin = RenderPassBegin {
            render_pass: self.targets.render_pass(),
            framebuffer,
            area: full_scissor(self.swapchain.extent()),
            clear_values: [
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                },
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: clear_color,
                    },
                },
            ],
        };
        self.gpu.cmd_begin_render_pass(cmd, &begin);
        Ok(())
    }

    /// Records the current viewports and scissors into `cmd`.
    pub fn apply_dynamic_state(&self, cmd: vk::CommandBuffer) -> RenderResult<()> {
        self.recording_index()?;
        self.gpu.cmd_set_viewports(cmd, &self.viewports);
        self.gpu.cmd_set_scissors(cmd, &self.scissors);
        Ok(())
    }

    pub fn end_render_pass(&self, cmd: vk::CommandBuffer) -> RenderResult<()> {
        self.recording_index()?;
        self.gpu.cmd_end_render_pass(cmd);
        Ok(())
    }

    /// Submits `cmd` for the acquired image and presents it.
    ///
    /// Present failures other than device loss run the resize path instead of
    /// surfacing as errors.
    pub fn submit_and_present(&mut self, cmd: vk::CommandBuffer) -> RenderResult<PresentOutcome> {
        let index = self.recording_index()?;
        let fence = self.slot_fence(index)?;

        self.state = FrameState::Submitted;
        let submission = Submission {
            command_buffer: cmd,
            wait: self.sync.image_available(),
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal: self.sync.render_finished(),
            fence,
        };
        if let Err(err) = self.gpu.queue_submit(&submission) {
            self.state = FrameState::Idle;
            // the fence was reset at acquire and nothing will signal it now
            self.sync.reset_slot(&self.gpu, index as usize)?;
            self.discard_acquire();
            return Err(RenderError::vk("queue_submit", err));
        }

        self.state = FrameState::Presenting;
        let presented = self.gpu.queue_present(
            self.swapchain.handle(),
            index,
            self.sync.render_finished(),
        );

        match presented {
            Ok(false) => {
                self.state = FrameState::Idle;
                Ok(PresentOutcome::Presented)
            }
            Ok(true) => {
                self.state = FrameState::Idle;
                Ok(PresentOutcome::Suboptimal)
            }
            Err(vk::Result::ERROR_DEVICE_LOST) => {
                self.state = FrameState::Idle;
                Err(RenderError::DeviceLost)
            }
            Err(result) => {
                debug!("queue_present returned {result}; rebuilding");
                let rebuilt = self.run_resize()?;
                Ok(PresentOutcome::Resized { result, rebuilt })
            }
        }
    }

    /// Rebuilds the swapchain if the surface extent moved away from ours.
    ///
    /// Returns whether anything was rebuilt. An unchanged extent is a no-op and
    /// a zero-area surface defers the rebuild until it has area again.
    pub fn resize_swapchain(&mut self) -> RenderResult<bool> {
        self.expect_idle()?;
        self.run_resize()
    }

    fn run_resize(&mut self) -> RenderResult<bool> {
        self.state = FrameState::Resizing;
        let result = self.recreate();
        self.state = FrameState::Idle;
        result
    }

    fn recreate(&mut self) -> RenderResult<bool> {
        let caps = self
            .gpu
            .surface_capabilities()
            .during("get_physical_device_surface_capabilities")?;
        let extent = resolve_extent(&caps, self.drawable);

        if extent.width == 0 || extent.height == 0 {
            debug!("surface has no area; deferring swapchain rebuild");
            return Ok(false);
        }
        if same_extent(extent, self.swapchain.extent()) {
            return Ok(false);
        }

        // nothing in flight may still reference what is about to be destroyed
        self.gpu.device_wait_idle().during("device_wait_idle")?;

        let desc = SwapchainDesc {
            image_count: choose_image_count(&caps, self.buffer_count),
            format: self.surface_format,
            present_mode: self.present_mode,
            extent,
            pre_transform: caps.current_transform,
            old_swapchain: self.swapchain.handle(),
        };
        let swapchain = Swapchain::create(&self.gpu, &desc)?;
        let targets = RenderTargets::build(&self.gpu, &swapchain, self.depth_format)?;
        // the device is idle, so the old fences can go now
        self.sync.rebuild_fences(&self.gpu, swapchain.image_count())?;

        // Old targets reference the old swapchain's views, so they go first.
        // The old swapchain outlives the construction of its successor.
        self.targets = targets;
        self.swapchain = swapchain;

        info!(
            "swapchain rebuilt: {}x{}, {} images",
            extent.width,
            extent.height,
            self.swapchain.image_count()
        );
        Ok(true)
    }

    /// Records the window's drawable size for the next rebuild.
    pub fn set_drawable_size(&mut self, width: u32, height: u32) {
        self.drawable = vk::Extent2D { width, height };
    }

    /// Resizes viewport `index`, or all of them when `None`. False if `index` is out of range.
    pub fn resize_viewports(&mut self, width: u32, height: u32, index: Option<usize>) -> bool {
        resize_each(&mut self.viewports, index, |v| {
            v.width = width as f32;
            v.height = height as f32;
        })
    }

    /// Resizes scissor `index`, or all of them when `None`. False if `index` is out of range.
    pub fn resize_scissors(&mut self, width: u32, height: u32, index: Option<usize>) -> bool {
        resize_each(&mut self.scissors, index, |s| {
            s.extent = vk::Extent2D { width, height };
        })
    }

    pub fn load_shader_module(&mut self, path: impl AsRef<Path>) -> RenderResult<vk::ShaderModule> {
        self.shaders.get_or_load(&self.gpu, path.as_ref())
    }

    pub fn release_shader_module(&mut self, which: ShaderRelease<'_>) -> usize {
        self.shaders.release(which)
    }

    /// Allocates from `pool`, or from the lazily created default pool on the graphics family.
    pub fn allocate_command_buffers(
        &mut self,
        level: vk::CommandBufferLevel,
        count: u32,
        pool: Option<vk::CommandPool>,
    ) -> RenderResult<Vec<vk::CommandBuffer>> {
        self.commands.allocate(&self.gpu, level, count, pool)
    }

    pub fn free_command_buffers(&self, buffers: &[vk::CommandBuffer], pool: Option<vk::CommandPool>) {
        self.commands.free(&*self.gpu, buffers, pool);
    }

    fn expect_idle(&self) -> RenderResult<()> {
        match self.state {
            FrameState::Idle => Ok(()),
            found => Err(RenderError::InvalidState {
                expected: "Idle",
                found,
            }),
        }
    }

    fn recording_index(&self) -> RenderResult<u32> {
        match self.state {
            FrameState::Recording { index } => Ok(index),
            found => Err(RenderError::InvalidState {
                expected: "Recording",
                found,
            }),
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn gpu(&self) -> &Rc<dyn Gpu> {
        &self.gpu
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    pub fn sync(&self) -> &SyncSet {
        &self.sync
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn viewports(&self) -> &[vk::Viewport] {
        &self.viewports
    }

    pub fn scissors(&self) -> &[vk::Rect2D] {
        &self.scissors
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        if let Err(err) = self.gpu.device_wait_idle() {
            warn!("device_wait_idle during teardown: {err}");
        }
    }
}

fn resize_each<T>(items: &mut [T], index: Option<usize>, mut apply: impl FnMut(&mut T)) -> bool {
    match index {
        None => {
            items.iter_mut().for_each(apply);
            true
        }
        Some(i) => match items.get_mut(i) {
            Some(item) => {
                apply(item);
                true
            }
            None => false,
        },
    }
}

fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}
