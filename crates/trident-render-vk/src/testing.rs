// SPDX-License-Identifier: CEPL-1.0
//! Recording [`Gpu`] double for unit tests.
//!
//! Handles are minted from a counter. Destroying a handle that is not live
//! panics, as does submitting against a fence that was not waited and reset,
//! or destroying a fence the "device" still owes a signal on.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::cell::{Ref, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::gpu::{Gpu, RenderPassBegin, RenderPassLayout, Submission, SwapchainDesc};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Swapchain,
    ImageView,
    Image,
    Memory,
    RenderPass,
    Framebuffer,
    Semaphore,
    Fence,
    CommandPool,
    ShaderModule,
    Pipeline,
    PipelineLayout,
    Buffer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceState {
    Signaled,
    Unsignaled,
    /// Submitted; signals on the next wait or idle.
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    Acquire(u64),
    WaitFence(u64),
    ResetFence(u64),
    Submit { fence: u64, cmd: u64 },
    Present { swapchain: u64, index: u32 },
    WaitIdle,
    Destroy(Kind, u64),
    BeginRenderPass { framebuffer: u64 },
    EndRenderPass,
}

#[derive(Clone, Copy, Debug)]
pub struct FramebufferInfo {
    pub render_pass: u64,
    pub depth_view: u64,
    pub color_view: u64,
    pub extent: vk::Extent2D,
}

pub struct MockState {
    next: u64,
    pub live: HashMap<u64, Kind>,
    pub caps: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub depth_support: Vec<vk::Format>,
    pub swapchains: HashMap<u64, SwapchainDesc>,
    pub swapchain_images: HashMap<u64, Vec<vk::Image>>,
    pub framebuffers: HashMap<u64, FramebufferInfo>,
    pub render_passes: HashMap<u64, RenderPassLayout>,
    pub images: HashMap<u64, (vk::Format, vk::Extent2D)>,
    pub view_aspects: HashMap<u64, vk::ImageAspectFlags>,
    pub fences: HashMap<u64, FenceState>,
    pub acquire_script: VecDeque<vk::Result>,
    pub present_script: VecDeque<vk::Result>,
    pub fail_submit: Option<vk::Result>,
    next_image: u32,
    pub log: Vec<Call>,
    pub clear_colors: Vec<[f32; 4]>,
    pub surface_queries: usize,
}

pub struct MockGpu {
    state: RefCell<MockState>,
    memory: vk::PhysicalDeviceMemoryProperties,
}

impl MockGpu {
    /// 640x480 surface, 2..=8 images, sRGB BGRA8, FIFO + MAILBOX, all depth formats.
    pub fn new() -> Self {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            ..Default::default()
        };
        memory.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        memory.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        MockGpu {
            state: RefCell::new(MockState {
                next: 0x1000,
                live: HashMap::new(),
                caps,
                formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
                depth_support: vec![
                    vk::Format::D32_SFLOAT_S8_UINT,
                    vk::Format::D32_SFLOAT,
                    vk::Format::D24_UNORM_S8_UINT,
                    vk::Format::D16_UNORM_S8_UINT,
                    vk::Format::D16_UNORM,
                ],
                swapchains: HashMap::new(),
                swapchain_images: HashMap::new(),
                framebuffers: HashMap::new(),
                render_passes: HashMap::new(),
                images: HashMap::new(),
                view_aspects: HashMap::new(),
                fences: HashMap::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                fail_submit: None,
                next_image: 0,
                log: Vec::new(),
                clear_colors: Vec::new(),
                surface_queries: 0,
            }),
            memory,
        }
    }

    pub fn state(&self) -> Ref<'_, MockState> {
        self.state.borrow()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.borrow_mut())
    }

    pub fn set_extent(&self, width: u32, height: u32) {
        self.with_state(|s| s.caps.current_extent = vk::Extent2D { width, height });
    }

    pub fn is_live(&self, raw: u64) -> bool {
        self.state().live.contains_key(&raw)
    }

    pub fn live_count(&self) -> usize {
        self.state().live.len()
    }

    pub fn live_of(&self, kind: Kind) -> usize {
        self.state().live.values().filter(|&&k| k == kind).count()
    }

    pub fn live_set(&self) -> HashSet<u64> {
        self.state().live.keys().copied().collect()
    }

    pub fn take_log(&self) -> Vec<Call> {
        std::mem::take(&mut self.state.borrow_mut().log)
    }

    fn mint<T: Handle>(&self, kind: Kind) -> T {
        let mut s = self.state.borrow_mut();
        s.next += 1;
        let raw = s.next;
        s.live.insert(raw, kind);
        T::from_raw(raw)
    }

    fn release(&self, raw: u64, kind: Kind) {
        let mut s = self.state.borrow_mut();
        match s.live.remove(&raw) {
            Some(k) if k == kind => {}
            Some(k) => panic!("destroying {raw:#x} as {kind:?} but it is a {k:?}"),
            None => panic!("double destroy or unknown {kind:?} handle {raw:#x}"),
        }
        s.log.push(Call::Destroy(kind, raw));
    }

    fn fence_state(&self, fence: vk::Fence) -> FenceState {
        *self
            .state()
            .fences
            .get(&fence.as_raw())
            .unwrap_or_else(|| panic!("unknown fence {:#x}", fence.as_raw()))
    }
}

impl Gpu for MockGpu {
    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory
    }

    fn graphics_family(&self) -> u32 {
        0
    }

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        let mut s = self.state.borrow_mut();
        s.surface_queries += 1;
        Ok(s.caps)
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.state().formats.clone())
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.state().present_modes.clone())
    }

    fn optimal_tiling_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        if self.state().depth_support.contains(&format) {
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::FormatFeatureFlags::empty()
        }
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        if desc.old_swapchain != vk::SwapchainKHR::null() {
            assert!(
                self.is_live(desc.old_swapchain.as_raw()),
                "predecessor swapchain already destroyed"
            );
        }
        let sc: vk::SwapchainKHR = self.mint(Kind::Swapchain);
        let images: Vec<vk::Image> = (0..desc.image_count)
            .map(|i| vk::Image::from_raw(0xF000_0000 + sc.as_raw() * 16 + i as u64))
            .collect();
        let mut s = self.state.borrow_mut();
        s.swapchains.insert(sc.as_raw(), *desc);
        s.swapchain_images.insert(sc.as_raw(), images);
        Ok(sc)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        Ok(self.state().swapchain_images[&swapchain.as_raw()].clone())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.release(swapchain.as_raw(), Kind::Swapchain);
    }

    fn create_image_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView> {
        let view: vk::ImageView = self.mint(Kind::ImageView);
        self.with_state(|s| s.view_aspects.insert(view.as_raw(), aspect));
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.release(view.as_raw(), Kind::ImageView);
    }

    fn create_attachment_image(
        &self,
        format: vk::Format,
        extent: vk::Extent2D,
        _usage: vk::ImageUsageFlags,
    ) -> VkResult<vk::Image> {
        let image: vk::Image = self.mint(Kind::Image);
        self.with_state(|s| s.images.insert(image.as_raw(), (format, extent)));
        Ok(image)
    }

    fn bind_image_memory(&self, _image: vk::Image) -> VkResult<vk::DeviceMemory> {
        Ok(self.mint(Kind::Memory))
    }

    fn destroy_image(&self, image: vk::Image) {
        self.release(image.as_raw(), Kind::Image);
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        self.release(memory.as_raw(), Kind::Memory);
    }

    fn create_render_pass(&self, layout: &RenderPassLayout) -> VkResult<vk::RenderPass> {
        let rp: vk::RenderPass = self.mint(Kind::RenderPass);
        self.with_state(|s| s.render_passes.insert(rp.as_raw(), layout.clone()));
        Ok(rp)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.release(render_pass.as_raw(), Kind::RenderPass);
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        assert_eq!(attachments.len(), 2, "framebuffer wants depth + color");
        assert!(self.is_live(render_pass.as_raw()));
        let fb: vk::Framebuffer = self.mint(Kind::Framebuffer);
        self.with_state(|s| {
            s.framebuffers.insert(
                fb.as_raw(),
                FramebufferInfo {
                    render_pass: render_pass.as_raw(),
                    depth_view: attachments[0].as_raw(),
                    color_view: attachments[1].as_raw(),
                    extent,
                },
            )
        });
        Ok(fb)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.release(framebuffer.as_raw(), Kind::Framebuffer);
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        Ok(self.mint(Kind::Semaphore))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.release(semaphore.as_raw(), Kind::Semaphore);
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let fence: vk::Fence = self.mint(Kind::Fence);
        let state = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        self.with_state(|s| s.fences.insert(fence.as_raw(), state));
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        assert_ne!(
            self.fence_state(fence),
            FenceState::Pending,
            "destroying a fence with work still in flight"
        );
        self.with_state(|s| s.fences.remove(&fence.as_raw()));
        self.release(fence.as_raw(), Kind::Fence);
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout: u64) -> VkResult<()> {
        match self.fence_state(fence) {
            FenceState::Unsignaled => panic!("waiting on a fence nothing will signal"),
            FenceState::Pending | FenceState::Signaled => {}
        }
        self.with_state(|s| {
            s.fences.insert(fence.as_raw(), FenceState::Signaled);
            s.log.push(Call::WaitFence(fence.as_raw()));
        });
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        assert_ne!(self.fence_state(fence), FenceState::Pending);
        self.with_state(|s| {
            s.fences.insert(fence.as_raw(), FenceState::Unsignaled);
            s.log.push(Call::ResetFence(fence.as_raw()));
        });
        Ok(())
    }

    fn create_command_pool(
        &self,
        _flags: vk::CommandPoolCreateFlags,
    ) -> VkResult<vk::CommandPool> {
        Ok(self.mint(Kind::CommandPool))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.release(pool.as_raw(), Kind::CommandPool);
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        _level: vk::CommandBufferLevel,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        assert!(self.is_live(pool.as_raw()));
        let mut s = self.state.borrow_mut();
        Ok((0..count)
            .map(|_| {
                s.next += 1;
                vk::CommandBuffer::from_raw(s.next)
            })
            .collect())
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, _buffers: &[vk::CommandBuffer]) {
        assert!(self.is_live(pool.as_raw()));
    }

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        assert!(!code.is_empty());
        Ok(self.mint(Kind::ShaderModule))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.release(module.as_raw(), Kind::ShaderModule);
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.release(pipeline.as_raw(), Kind::Pipeline);
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.release(layout.as_raw(), Kind::PipelineLayout);
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.release(buffer.as_raw(), Kind::Buffer);
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        _signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut s = self.state.borrow_mut();
        s.log.push(Call::Acquire(swapchain.as_raw()));
        if let Some(result) = s.acquire_script.pop_front() {
            return match result {
                vk::Result::SUBOPTIMAL_KHR => {
                    let count = s.swapchains[&swapchain.as_raw()].image_count;
                    let index = s.next_image % count;
                    s.next_image += 1;
                    Ok((index, true))
                }
                err => Err(err),
            };
        }
        let count = s.swapchains[&swapchain.as_raw()].image_count;
        let index = s.next_image % count;
        s.next_image += 1;
        Ok((index, false))
    }

    fn queue_submit(&self, submission: &Submission) -> VkResult<()> {
        if let Some(err) = self.state().fail_submit {
            return Err(err);
        }
        assert_eq!(
            self.fence_state(submission.fence),
            FenceState::Unsignaled,
            "submission fence was not waited and reset first"
        );
        self.with_state(|s| {
            s.fences.insert(submission.fence.as_raw(), FenceState::Pending);
            s.log.push(Call::Submit {
                fence: submission.fence.as_raw(),
                cmd: submission.command_buffer.as_raw(),
            });
        });
        Ok(())
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        _wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut s = self.state.borrow_mut();
        s.log.push(Call::Present {
            swapchain: swapchain.as_raw(),
            index: image_index,
        });
        match s.present_script.pop_front() {
            Some(vk::Result::SUBOPTIMAL_KHR) => Ok(true),
            Some(err) => Err(err),
            None => Ok(false),
        }
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        self.with_state(|s| {
            for state in s.fences.values_mut() {
                if *state == FenceState::Pending {
                    *state = FenceState::Signaled;
                }
            }
            s.log.push(Call::WaitIdle);
        });
        Ok(())
    }

    fn cmd_begin_render_pass(&self, _cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        assert!(self.is_live(begin.framebuffer.as_raw()));
        let color = unsafe { begin.clear_values[1].color.float32 };
        self.with_state(|s| {
            s.clear_colors.push(color);
            s.log.push(Call::BeginRenderPass {
                framebuffer: begin.framebuffer.as_raw(),
            });
        });
    }

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {
        self.with_state(|s| s.log.push(Call::EndRenderPass));
    }

    fn cmd_set_viewports(&self, _cmd: vk::CommandBuffer, viewports: &[vk::Viewport]) {
        assert!(!viewports.is_empty());
    }

    fn cmd_set_scissors(&self, _cmd: vk::CommandBuffer, scissors: &[vk::Rect2D]) {
        assert!(!scissors.is_empty());
    }
}
