// SPDX-License-Identifier: CEPL-1.0
//! Depth buffer, render pass and per-image framebuffers.
//!
//! All three are derived from one swapchain and rebuilt with it. Attachment 0
//! is depth, attachment 1 is the swapchain color image.

use ash::vk;
use std::rc::Rc;

use crate::error::{RenderError, RenderResult, VkResultExt};
use crate::gpu::{Gpu, Owned, RenderPassLayout};
use crate::swapchain::Swapchain;

pub const DEPTH_ATTACHMENT: u32 = 0;
pub const COLOR_ATTACHMENT: u32 = 1;

/// Probed in order; the first format the device can attach wins.
pub const DEPTH_FORMAT_PREFERENCE: [vk::Format; 5] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];

pub fn pick_depth_format(supports: impl Fn(vk::Format) -> bool) -> RenderResult<vk::Format> {
    DEPTH_FORMAT_PREFERENCE
        .into_iter()
        .find(|&f| supports(f))
        .ok_or(RenderError::NoSupportedDepthFormat)
}

/// [`pick_depth_format`] against the device's optimal-tiling features.
pub fn probe_depth_format(gpu: &dyn Gpu) -> RenderResult<vk::Format> {
    pick_depth_format(|f| {
        gpu.optimal_tiling_features(f)
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::S8_UINT
    )
}

fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

pub fn render_pass_layout(depth: vk::Format, color: vk::Format) -> RenderPassLayout {
    let depth_att = vk::AttachmentDescription {
        format: depth,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::DONT_CARE,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::STORE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ..Default::default()
    };
    let color_att = vk::AttachmentDescription {
        format: color,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    };

    // Orders the acquire-semaphore wait (color output stage) and the previous
    // frame's depth writes against this subpass.
    let external = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        src_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ..Default::default()
    };

    RenderPassLayout {
        attachments: vec![depth_att, color_att],
        color: vk::AttachmentReference {
            attachment: COLOR_ATTACHMENT,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        },
        depth: vk::AttachmentReference {
            attachment: DEPTH_ATTACHMENT,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        },
        dependencies: vec![external],
    }
}

pub struct DepthBuffer {
    view: Owned<vk::ImageView>,
    image: Owned<vk::Image>,
    memory: Owned<vk::DeviceMemory>,
    format: vk::Format,
}

impl DepthBuffer {
    fn new(gpu: &Rc<dyn Gpu>, format: vk::Format, extent: vk::Extent2D) -> RenderResult<Self> {
        let image = Owned::new(
            gpu,
            gpu.create_attachment_image(
                format,
                extent,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            )
            .during("create_image")?,
        );
        let memory = Owned::new(
            gpu,
            gpu.bind_image_memory(image.raw())
                .during("bind_image_memory")?,
        );
        let view = Owned::new(
            gpu,
            gpu.create_image_view(image.raw(), format, depth_aspect(format))
                .during("create_image_view")?,
        );
        Ok(DepthBuffer {
            view,
            image,
            memory,
            format,
        })
    }

    pub fn view(&self) -> vk::ImageView {
        self.view.raw()
    }

    pub fn image(&self) -> vk::Image {
        self.image.raw()
    }

    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory.raw()
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }
}

/// Framebuffers reference both the render pass and the depth view, so they drop first.
pub struct RenderTargets {
    framebuffers: Vec<Owned<vk::Framebuffer>>,
    render_pass: Owned<vk::RenderPass>,
    depth: DepthBuffer,
    extent: vk::Extent2D,
}

impl RenderTargets {
    pub fn build(
        gpu: &Rc<dyn Gpu>,
        swapchain: &Swapchain,
        depth_format: vk::Format,
    ) -> RenderResult<Self> {
        let extent = swapchain.extent();
        let depth = DepthBuffer::new(gpu, depth_format, extent)?;

        let layout = render_pass_layout(depth_format, swapchain.format().format);
        let render_pass = Owned::new(
            gpu,
            gpu.create_render_pass(&layout).during("create_render_pass")?,
        );

        let mut framebuffers = Vec::with_capacity(swapchain.image_count());
        for color in swapchain.views() {
            let attachments = [depth.view(), color];
            let fb = gpu
                .create_framebuffer(render_pass.raw(), &attachments, extent)
                .during("create_framebuffer")?;
            framebuffers.push(Owned::new(gpu, fb));
        }

        Ok(RenderTargets {
            framebuffers,
            render_pass,
            depth,
            extent,
        })
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.raw()
    }

    pub fn framebuffer(&self, index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(index).map(Owned::raw)
    }

    pub fn framebuffers(&self) -> impl Iterator<Item = vk::Framebuffer> + '_ {
        self.framebuffers.iter().map(Owned::raw)
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn depth(&self) -> &DepthBuffer {
        &self.depth
    }
}
