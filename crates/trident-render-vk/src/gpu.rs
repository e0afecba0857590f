// SPDX-License-Identifier: CEPL-1.0
//! The device seam: every graphics-API call the frame loop makes goes through [`Gpu`].
//!
//! [`DeviceContext`](crate::DeviceContext) implements it on top of `ash`; tests
//! substitute a recording double. Handles stay plain `vk` handles so the two
//! sides agree on identity.

use ash::prelude::VkResult;
use ash::vk;
use std::fmt;
use std::rc::Rc;

/// What the swapchain is (re)built from. `old_swapchain` is the predecessor or null.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainDesc {
    pub image_count: u32,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub old_swapchain: vk::SwapchainKHR,
}

/// Single-subpass render pass shape.
#[derive(Clone, Debug)]
pub struct RenderPassLayout {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub color: vk::AttachmentReference,
    pub depth: vk::AttachmentReference,
    pub dependencies: Vec<vk::SubpassDependency>,
}

pub struct RenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub area: vk::Rect2D,
    /// Indexed by attachment: depth first, then color.
    pub clear_values: [vk::ClearValue; 2],
}

#[derive(Clone, Copy, Debug)]
pub struct Submission {
    pub command_buffer: vk::CommandBuffer,
    pub wait: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal: vk::Semaphore,
    pub fence: vk::Fence,
}

pub trait Gpu {
    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties;
    fn graphics_family(&self) -> u32;

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>>;
    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>>;
    fn optimal_tiling_features(&self, format: vk::Format) -> vk::FormatFeatureFlags;

    fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_attachment_image(
        &self,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
    ) -> VkResult<vk::Image>;
    /// Allocates device-local memory for `image` and binds it.
    fn bind_image_memory(&self, image: vk::Image) -> VkResult<vk::DeviceMemory>;
    fn destroy_image(&self, image: vk::Image);
    fn free_memory(&self, memory: vk::DeviceMemory);

    fn create_render_pass(&self, layout: &RenderPassLayout) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;

    fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags)
        -> VkResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn destroy_buffer(&self, buffer: vk::Buffer);

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    fn queue_submit(&self, submission: &Submission) -> VkResult<()>;
    /// Returns `true` when the swapchain is suboptimal.
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool>;
    fn device_wait_idle(&self) -> VkResult<()>;

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBegin);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    fn cmd_set_viewports(&self, cmd: vk::CommandBuffer, viewports: &[vk::Viewport]);
    fn cmd_set_scissors(&self, cmd: vk::CommandBuffer, scissors: &[vk::Rect2D]);
}

/// A handle type with a matching destroy call on [`Gpu`].
pub trait GpuObject: vk::Handle + Copy {
    fn destroy(self, gpu: &dyn Gpu);
}

macro_rules! gpu_object {
    ($($ty:ty => $destroy:ident),* $(,)?) => {
        $(impl GpuObject for $ty {
            fn destroy(self, gpu: &dyn Gpu) {
                gpu.$destroy(self)
            }
        })*
    };
}

gpu_object! {
    vk::SwapchainKHR => destroy_swapchain,
    vk::ImageView => destroy_image_view,
    vk::Image => destroy_image,
    vk::DeviceMemory => free_memory,
    vk::RenderPass => destroy_render_pass,
    vk::Framebuffer => destroy_framebuffer,
    vk::Semaphore => destroy_semaphore,
    vk::Fence => destroy_fence,
    vk::CommandPool => destroy_command_pool,
    vk::ShaderModule => destroy_shader_module,
    vk::Pipeline => destroy_pipeline,
    vk::PipelineLayout => destroy_pipeline_layout,
    vk::Buffer => destroy_buffer,
}

/// Exclusively owned device object, destroyed on drop.
///
/// Holding the `Rc` keeps the device alive for as long as anything created
/// from it, so teardown order between the device and its children is
/// structural rather than manual.
pub struct Owned<T: GpuObject> {
    raw: T,
    gpu: Rc<dyn Gpu>,
}

impl<T: GpuObject> Owned<T> {
    pub fn new(gpu: &Rc<dyn Gpu>, raw: T) -> Self {
        Owned {
            raw,
            gpu: Rc::clone(gpu),
        }
    }

    #[inline]
    pub fn raw(&self) -> T {
        self.raw
    }
}

impl<T: GpuObject> Drop for Owned<T> {
    fn drop(&mut self) {
        self.raw.destroy(&*self.gpu);
    }
}

impl<T: GpuObject + fmt::Debug> fmt::Debug for Owned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.raw).finish()
    }
}

/// First memory type allowed by `type_bits` that has all of `flags`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0
            && props.memory_types[i as usize]
                .property_flags
                .contains(flags)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGpu;
    use ash::vk::Handle;

    #[test]
    fn owned_destroys_exactly_once() {
        let mock = Rc::new(MockGpu::new());
        let gpu: Rc<dyn Gpu> = mock.clone();
        let sem = gpu.create_semaphore().unwrap();
        assert!(mock.is_live(sem.as_raw()));
        {
            let owned = Owned::new(&gpu, sem);
            assert_eq!(owned.raw(), sem);
        }
        assert!(!mock.is_live(sem.as_raw()));
    }

    #[test]
    fn memory_type_respects_mask_and_flags() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[2].property_flags =
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE;

        let local = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        assert_eq!(find_memory_type(&props, 0b111, local), Some(1));
        assert_eq!(find_memory_type(&props, 0b101, local), Some(2));
        assert_eq!(find_memory_type(&props, 0b001, local), None);
    }
}
